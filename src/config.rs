//! # Box-model configuration
//!
//! ## Purpose
//! JSON description of a box-model run: species and their classification, solver settings,
//! reactions written with species names, environment, photolysis rates, initial concentrations
//! and output times. Everything the mechanism compiler would otherwise pack into the wire buffer
//! can be written by hand here.
//!
//! ## Configuration Format
//! ```json
//! {
//!   "species": [
//!     { "name": "NO2", "type": "solved", "abs_tol": 1.0e-12 },
//!     { "name": "O2", "type": "constant" }
//!   ],
//!   "solver": { "rel_tol": 1.0e-4, "max_steps": 500, "max_conv_fails": 10 },
//!   "integrator": { "n_substeps": 10 },
//!   "environment": { "temperature_K": 298.15, "pressure_Pa": 101325.0 },
//!   "reactions": [
//!     { "type": "PHOTOLYSIS", "reactants": ["NO2"],
//!       "products": [{ "name": "NO" }, { "name": "O3" }], "photo_id": 1 },
//!     { "type": "ARRHENIUS", "reactants": ["NO", "O3"],
//!       "products": [{ "name": "NO2" }, { "name": "O2", "yield": 1.0 }], "A": 1.8e-12, "C": -1370.0 }
//!   ],
//!   "photolysis_rates": [{ "photo_id": 1, "base_rate": 8.0e-3 }],
//!   "initial_state": { "NO2": 1.0e-3, "O2": 0.21 },
//!   "run": { "t_initial": 0.0, "t_final": 3600.0, "n_output_steps": 12 },
//!   "aero_reps": [
//!     { "type": "SINGLE_PARTICLE", "aero_rep_id": 1, "radius": 1.0e-7, "number_conc": 500.0,
//!       "phases": [{ "name": "organic", "species": [{ "name": "SOA", "molecular_weight": 0.2 }] }] }
//!   ]
//! }
//! ```
use crate::aero_reps::AeroRepSet;
use crate::aero_reps::phase::AeroPhase;
use crate::aero_reps::single_particle::SingleParticle;
use crate::error::{PhlexError, PhlexResult};
use crate::integrator::{BackwardEuler, SolverSettings};
use crate::rxns::arrhenius::{ArrheniusParams, ArrheniusReaction};
use crate::rxns::photolysis::PhotolysisReaction;
use crate::rxns::species::RxnSpecies;
use crate::rxns::troe::{TroeParams, TroeReaction};
use crate::rxns::{Mechanism, Reaction, UpdateData};
use crate::solver::ChemSolver;
use crate::state::{EnvState, VarType};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

fn one() -> f64 {
    1.0
}

fn default_abs_tol() -> f64 {
    1.0e-12
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesConfig {
    pub name: String,
    #[serde(rename = "type", default = "default_var_type")]
    pub var_type: VarType,
    #[serde(default = "default_abs_tol")]
    pub abs_tol: f64,
}

fn default_var_type() -> VarType {
    VarType::Solved
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductConfig {
    pub name: String,
    #[serde(rename = "yield", default = "one")]
    pub yield_: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum ReactionConfig {
    Arrhenius {
        reactants: Vec<String>,
        #[serde(default)]
        products: Vec<ProductConfig>,
        #[serde(flatten)]
        params: ArrheniusParams,
        #[serde(default = "one")]
        conv: f64,
    },
    Troe {
        reactants: Vec<String>,
        #[serde(default)]
        products: Vec<ProductConfig>,
        #[serde(flatten)]
        params: TroeParams,
        #[serde(default = "one")]
        conv: f64,
    },
    Photolysis {
        reactants: Vec<String>,
        #[serde(default)]
        products: Vec<ProductConfig>,
        photo_id: i32,
        #[serde(default = "one")]
        scaling: f64,
    },
}

impl ReactionConfig {
    fn species_names(&self) -> (&[String], &[ProductConfig]) {
        match self {
            ReactionConfig::Arrhenius {
                reactants,
                products,
                ..
            }
            | ReactionConfig::Troe {
                reactants,
                products,
                ..
            }
            | ReactionConfig::Photolysis {
                reactants,
                products,
                ..
            } => (reactants.as_slice(), products.as_slice()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSpeciesConfig {
    pub name: String,
    /// kg mol⁻¹
    pub molecular_weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AeroPhaseConfig {
    pub name: String,
    pub species: Vec<PhaseSpeciesConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AeroRepConfig {
    SingleParticle {
        #[serde(default)]
        aero_rep_id: i32,
        /// m
        #[serde(default)]
        radius: f64,
        /// # cm⁻³
        #[serde(default)]
        number_conc: f64,
        phases: Vec<AeroPhaseConfig>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntegratorConfig {
    #[serde(default = "default_n_substeps")]
    pub n_substeps: usize,
}

fn default_n_substeps() -> usize {
    10
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            n_substeps: default_n_substeps(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhotolysisRateConfig {
    pub photo_id: i32,
    pub base_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub t_initial: f64,
    pub t_final: f64,
    /// number of equal output intervals between `t_initial` and `t_final`
    #[serde(default = "default_n_output_steps")]
    pub n_output_steps: usize,
}

fn default_n_output_steps() -> usize {
    1
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            t_initial: 0.0,
            t_final: 3600.0,
            n_output_steps: 12,
        }
    }
}

impl RunConfig {
    /// `n_output_steps + 1` times from `t_initial` to `t_final`
    pub fn output_times(&self) -> Vec<f64> {
        let n = self.n_output_steps.max(1);
        let dt = (self.t_final - self.t_initial) / n as f64;
        (0..=n)
            .map(|i| {
                if i == n {
                    self.t_final
                } else {
                    self.t_initial + dt * i as f64
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhlexConfig {
    pub species: Vec<SpeciesConfig>,
    #[serde(default)]
    pub solver: SolverSettings,
    #[serde(default)]
    pub integrator: IntegratorConfig,
    #[serde(default)]
    pub environment: EnvState,
    #[serde(default)]
    pub reactions: Vec<ReactionConfig>,
    #[serde(default)]
    pub photolysis_rates: Vec<PhotolysisRateConfig>,
    #[serde(default)]
    pub initial_state: HashMap<String, f64>,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aero_reps: Vec<AeroRepConfig>,
}

impl PhlexConfig {
    pub fn from_json_str(json: &str) -> PhlexResult<Self> {
        let config: PhlexConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> PhlexResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config = Self::from_json_str(&content)?;
        info!(
            "loaded configuration from {}: {} species, {} reactions",
            path.display(),
            config.species.len(),
            config.reactions.len()
        );
        Ok(config)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> PhlexResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), content)?;
        info!("configuration written to {}", path.as_ref().display());
        Ok(())
    }

    pub fn validate(&self) -> PhlexResult<()> {
        if self.species.is_empty() {
            return Err(PhlexError::InvalidConfiguration(
                "no species defined".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for sp in &self.species {
            if !seen.insert(sp.name.as_str()) {
                return Err(PhlexError::InvalidConfiguration(format!(
                    "species {} defined twice",
                    sp.name
                )));
            }
        }
        for rxn in &self.reactions {
            let (reactants, products) = rxn.species_names();
            for name in reactants.iter().chain(products.iter().map(|p| &p.name)) {
                self.species_index(name)?;
            }
        }
        for name in self.initial_state.keys() {
            self.species_index(name)?;
        }
        for AeroRepConfig::SingleParticle { phases, .. } in &self.aero_reps {
            for name in phases.iter().flat_map(|ph| ph.species.iter().map(|sp| &sp.name)) {
                self.species_index(name)?;
            }
        }
        self.solver.validate()?;
        self.environment.validate()?;
        if !(self.run.t_final >= self.run.t_initial) {
            return Err(PhlexError::InvalidConfiguration(format!(
                "t_final ({}) before t_initial ({})",
                self.run.t_final, self.run.t_initial
            )));
        }
        Ok(())
    }

    pub fn species_index(&self, name: &str) -> PhlexResult<usize> {
        self.species
            .iter()
            .position(|sp| sp.name == name)
            .ok_or_else(|| PhlexError::UnknownSpecies(name.to_string()))
    }

    pub fn species_names(&self) -> Vec<String> {
        self.species.iter().map(|sp| sp.name.clone()).collect()
    }

    pub fn var_types(&self) -> Vec<VarType> {
        self.species.iter().map(|sp| sp.var_type).collect()
    }

    pub fn abs_tol(&self) -> Vec<f64> {
        self.species.iter().map(|sp| sp.abs_tol).collect()
    }

    fn rxn_species(&self, reactants: &[String], products: &[ProductConfig]) -> PhlexResult<RxnSpecies> {
        let react = reactants
            .iter()
            .map(|name| self.species_index(name))
            .collect::<PhlexResult<Vec<_>>>()?;
        let prod = products
            .iter()
            .map(|p| self.species_index(&p.name))
            .collect::<PhlexResult<Vec<_>>>()?;
        let yields = products.iter().map(|p| p.yield_).collect();
        RxnSpecies::new(react, prod, yields)
    }

    pub fn build_mechanism(&self) -> PhlexResult<Mechanism> {
        let mut reactions = Vec::with_capacity(self.reactions.len());
        for rxn in &self.reactions {
            let reaction: Reaction = match rxn {
                ReactionConfig::Arrhenius {
                    reactants,
                    products,
                    params,
                    conv,
                } => ArrheniusReaction::new(*params, *conv, self.rxn_species(reactants, products)?)
                    .into(),
                ReactionConfig::Troe {
                    reactants,
                    products,
                    params,
                    conv,
                } => TroeReaction::new(*params, *conv, self.rxn_species(reactants, products)?).into(),
                ReactionConfig::Photolysis {
                    reactants,
                    products,
                    photo_id,
                    scaling,
                } => PhotolysisReaction::new(
                    *photo_id,
                    *scaling,
                    self.rxn_species(reactants, products)?,
                )
                .into(),
            };
            reactions.push(reaction);
        }
        Ok(Mechanism::from_reactions(reactions))
    }

    pub fn build_aero_reps(&self) -> PhlexResult<AeroRepSet> {
        let mut aero_reps = AeroRepSet::new();
        for rep in &self.aero_reps {
            let AeroRepConfig::SingleParticle {
                aero_rep_id,
                radius,
                number_conc,
                phases,
            } = rep;
            let phases = phases
                .iter()
                .map(|ph| {
                    let species = ph
                        .species
                        .iter()
                        .map(|sp| self.species_index(&sp.name))
                        .collect::<PhlexResult<Vec<_>>>()?;
                    let mw = ph.species.iter().map(|sp| sp.molecular_weight).collect();
                    AeroPhase::new(&ph.name, species, mw)
                })
                .collect::<PhlexResult<Vec<_>>>()?;
            aero_reps.push(
                SingleParticle::new(*aero_rep_id, phases)?
                    .with_radius(*radius)
                    .with_number_conc(*number_conc),
            );
        }
        Ok(aero_reps)
    }

    /// full state array; species missing from `initial_state` start at zero
    pub fn initial_state(&self) -> PhlexResult<Vec<f64>> {
        let mut state = vec![0.0; self.species.len()];
        for (name, value) in &self.initial_state {
            state[self.species_index(name)?] = *value;
        }
        Ok(state)
    }

    pub fn photolysis_updates(&self) -> Vec<UpdateData> {
        self.photolysis_rates
            .iter()
            .map(|r| UpdateData::PhotolysisRate {
                photo_id: r.photo_id,
                base_rate: r.base_rate,
            })
            .collect()
    }

    /// solver with the reference integrator, photolysis rates already applied
    pub fn build_solver(&self) -> PhlexResult<ChemSolver<BackwardEuler>> {
        let mut solver = ChemSolver::new(
            self.solver,
            self.var_types(),
            self.abs_tol(),
            self.build_mechanism()?,
            BackwardEuler::new(self.integrator.n_substeps),
        )?;
        if !self.aero_reps.is_empty() {
            solver = solver.with_aero_reps(self.build_aero_reps()?)?;
        }
        for update in self.photolysis_updates() {
            let n_updated = solver.update_data(&update);
            if n_updated == 0 {
                warn!("{:?} matched no reaction", update);
            }
        }
        Ok(solver)
    }

    /// small NO-NO2-O3 photostationary mechanism
    pub fn template() -> Self {
        let species = [
            ("NO2", VarType::Solved),
            ("NO", VarType::Solved),
            ("O3", VarType::Solved),
            ("O2", VarType::Constant),
        ]
        .into_iter()
        .map(|(name, var_type)| SpeciesConfig {
            name: name.to_string(),
            var_type,
            abs_tol: default_abs_tol(),
        })
        .collect();
        let product = |name: &str| ProductConfig {
            name: name.to_string(),
            yield_: 1.0,
        };
        let reactions = vec![
            ReactionConfig::Photolysis {
                reactants: vec!["NO2".to_string()],
                products: vec![product("NO"), product("O3")],
                photo_id: 1,
                scaling: 1.0,
            },
            ReactionConfig::Arrhenius {
                reactants: vec!["NO".to_string(), "O3".to_string()],
                products: vec![product("NO2"), product("O2")],
                params: ArrheniusParams {
                    a: 1.8e-12,
                    c: -1370.0,
                    ..ArrheniusParams::default()
                },
                // conv·P/T is the air number density in ppm⁻¹ molecules cm⁻³
                conv: 7.243e10,
            },
        ];
        let initial_state = [("NO2", 0.05), ("NO", 0.01), ("O3", 0.04), ("O2", 2.1e5)]
            .into_iter()
            .map(|(name, c)| (name.to_string(), c))
            .collect();
        Self {
            species,
            solver: SolverSettings::default(),
            integrator: IntegratorConfig::default(),
            environment: EnvState::default(),
            reactions,
            photolysis_rates: vec![PhotolysisRateConfig {
                photo_id: 1,
                base_rate: 8.0e-3,
            }],
            initial_state,
            run: RunConfig::default(),
            aero_reps: Vec::new(),
        }
    }
}
