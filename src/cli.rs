//! Box-model runner behind the `phlex_box` binary: argument handling, an interactive menu and
//! tabular output of the concentration history.
use crate::config::PhlexConfig;
use crate::error::{PhlexError, PhlexResult};
use crate::integrator::IntegrationStats;
use log::{error, info};
use prettytable::{Cell, Row, Table};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

pub const USAGE: &str = "usage:
  phlex_box                      interactive menu
  phlex_box <config.json>        run a box model and print the concentration history
  phlex_box --mechanism <config.json>
                                 print the reaction table and the Jacobian sparsity pattern
  phlex_box --template [path]    write an example configuration (default phlex_box.json)";

const DEFAULT_CONFIG: &str = "phlex_box.json";

/// concentration history of one box-model run
#[derive(Debug, Clone, PartialEq)]
pub struct BoxModelResult {
    pub species_names: Vec<String>,
    pub times: Vec<f64>,
    /// full state array at every output time
    pub states: Vec<Vec<f64>>,
    /// one entry per output interval
    pub stats: Vec<IntegrationStats>,
}

impl BoxModelResult {
    pub fn table(&self) -> Table {
        let mut table = Table::new();
        let mut header = vec![Cell::new("t (s)")];
        header.extend(self.species_names.iter().map(|name| Cell::new(name)));
        table.add_row(Row::new(header));
        for (t, state) in self.times.iter().zip(self.states.iter()) {
            let mut row = vec![Cell::new(&format!("{}", t))];
            row.extend(state.iter().map(|c| Cell::new(&format!("{:.6e}", c))));
            table.add_row(Row::new(row));
        }
        table
    }

    pub fn pretty_print(&self) {
        self.table().printstd();
    }

    pub fn total_steps(&self) -> usize {
        self.stats.iter().map(|s| s.n_steps).sum()
    }
}

/// Integrate the configured box model, recording the state at every output time.
pub fn run_box_model(config: &PhlexConfig) -> PhlexResult<BoxModelResult> {
    let mut solver = config.build_solver()?;
    let mut state = config.initial_state()?;
    let env = config.environment.as_array();
    let times = config.run.output_times();

    let mut states = Vec::with_capacity(times.len());
    let mut stats = Vec::with_capacity(times.len().saturating_sub(1));
    states.push(state.clone());
    for window in times.windows(2) {
        stats.push(solver.run(&mut state, &env, window[0], window[1])?);
        states.push(state.clone());
    }
    let result = BoxModelResult {
        species_names: config.species_names(),
        times,
        states,
        stats,
    };
    info!(
        "box model finished: {} output times, {} internal steps",
        result.times.len(),
        result.total_steps()
    );
    Ok(result)
}

pub fn run_from_file(path: &Path) -> PhlexResult<BoxModelResult> {
    let config = PhlexConfig::load_from_file(path)?;
    let result = run_box_model(&config)?;
    result.pretty_print();
    Ok(result)
}

pub fn show_mechanism(path: &Path) -> PhlexResult<()> {
    let config = PhlexConfig::load_from_file(path)?;
    let solver = config.build_solver()?;
    let names = config.species_names();
    solver.mechanism().pretty_print(Some(&names));
    if !solver.aero_reps().is_empty() {
        println!("Aerosol representations:");
        solver.aero_reps().pretty_print();
    }
    let solved: Vec<&str> = (0..solver.model().n_dep_var())
        .filter_map(|i| solver.model().state_map().full_index(i))
        .map(|i| names[i].as_str())
        .collect();
    println!("Jacobian sparsity over {}:", solved.join(", "));
    print!("{}", solver.jacobian_template());
    Ok(())
}

pub fn create_template(path: &Path) -> PhlexResult<()> {
    PhlexConfig::template().save_to_file(path)
}

/// non-interactive entry point, `args` without the program name
pub fn run_from_args(args: &[String]) -> PhlexResult<()> {
    match args {
        [flag] if flag == "--help" || flag == "-h" => {
            println!("{}", USAGE);
            Ok(())
        }
        [flag] if flag == "--template" => create_template(Path::new(DEFAULT_CONFIG)),
        [flag, path] if flag == "--template" => create_template(Path::new(path)),
        [flag, path] if flag == "--mechanism" => show_mechanism(Path::new(path)),
        [path] if !path.starts_with('-') => run_from_file(Path::new(path)).map(|_| ()),
        _ => Err(PhlexError::InvalidConfiguration(format!(
            "unrecognized arguments {:?}\n{}",
            args, USAGE
        ))),
    }
}

pub fn run_interactive_menu() {
    loop {
        show_main_menu();
        let Some(choice) = get_user_input() else {
            println!();
            break;
        };
        let outcome = match choice.trim() {
            "1" => prompt_path().and_then(|path| run_from_file(&path).map(|_| ())),
            "2" => auto_solve_problems(),
            "3" => prompt_path().and_then(|path| show_mechanism(&path)),
            "4" => create_template(Path::new(DEFAULT_CONFIG))
                .map(|_| println!("Template written to {}", DEFAULT_CONFIG)),
            "0" => {
                println!("Goodbye!");
                break;
            }
            _ => {
                println!("Invalid choice. Please try again.");
                Ok(())
            }
        };
        if let Err(e) = outcome {
            error!("{}", e);
        }
    }
}

fn show_main_menu() {
    println!("\x1b[34m\n phlex_box: chemical mechanism box model\n\x1b[0m");
    println!("\x1b[33m1. Run from file\x1b[0m");
    println!("\x1b[33m2. Auto-discover configuration files\x1b[0m");
    println!("\x1b[33m3. Show mechanism\x1b[0m");
    println!("\x1b[33m4. Generate template\x1b[0m");
    println!("\x1b[33m0. Exit\x1b[0m");
    print!("\x1b[36mEnter your choice: \x1b[0m");
    let _ = io::stdout().flush();
}

fn prompt_path() -> PhlexResult<PathBuf> {
    print!("\x1b[36mEnter file path: \x1b[0m");
    io::stdout().flush()?;
    let input = get_user_input().ok_or_else(|| {
        PhlexError::InvalidConfiguration("no file path given before end of input".to_string())
    })?;
    let path = PathBuf::from(input.trim());
    if !path.exists() {
        return Err(PhlexError::InvalidConfiguration(format!(
            "file not found: {}",
            path.display()
        )));
    }
    Ok(path)
}

/// run every `phlex*.json` file of the current directory
fn auto_solve_problems() -> PhlexResult<()> {
    let current_dir = std::env::current_dir()?;
    println!("Searching for configuration files in: {}", current_dir.display());
    let mut found = false;
    for entry in std::fs::read_dir(&current_dir)? {
        let path = entry?.path();
        let is_config = path
            .file_name()
            .map(|f| f.to_string_lossy())
            .is_some_and(|f| f.starts_with("phlex") && f.ends_with(".json"));
        if is_config && path.is_file() {
            println!("Found configuration file: {}", path.display());
            if let Err(e) = run_from_file(&path) {
                error!("{}: {}", path.display(), e);
            }
            found = true;
        }
    }
    if !found {
        println!("No phlex*.json files found in the current directory.");
    }
    Ok(())
}

fn get_user_input() -> Option<String> {
    read_line_from(&mut io::stdin().lock())
}

/// `None` at end of input or on a read error
fn read_line_from(reader: &mut impl BufRead) -> Option<String> {
    let mut input = String::new();
    match reader.read_line(&mut input) {
        Ok(0) => None,
        Ok(_) => Some(input),
        Err(e) => {
            error!("failed to read input: {}", e);
            None
        }
    }
}
