//! # Aerosol representations
//!
//! An aerosol representation describes how condensed-phase species on the state array are
//! grouped into particles: which aerosol phases a particle holds, its effective radius and
//! number concentration, and the mass and average molecular weight of each phase. Reactions
//! that involve the condensed phase read these through [`AeroRepSolver`], together with the
//! partial derivatives of each property with respect to the phase species.
//!
//! Like reactions, representations of different kinds share one arena ([`AeroRepSet`]) and are
//! dispatched through the [`AeroRep`] enum. Radius and number concentration are environment data
//! owned by an outside microphysics model and arrive through [`UpdateData`].
pub mod phase;
pub mod single_particle;

use crate::error::{PhlexError, PhlexResult};
use crate::rxns::UpdateData;
use crate::state::EnvState;
use enum_dispatch::enum_dispatch;
use prettytable::{Cell, Row, Table};
use single_particle::SingleParticle;

/// how concentrations of the phase species are expressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AeroConcType {
    /// per particle
    PerParticle,
    /// per unit volume of air, summed over the particle population
    TotalParticle,
}

/// Operations every aerosol representation kind provides.
///
/// Partial derivative arrays have [`AeroRepSolver::n_jac_elem`] entries, laid out phase by
/// phase in the order the phase species are listed, and are overwritten.
#[enum_dispatch]
pub trait AeroRepSolver {
    /// id given by the host model; 0 means unregistered
    fn aero_rep_id(&self) -> i32;
    fn n_phase(&self) -> usize;
    fn n_jac_elem(&self) -> usize;
    fn check_indices(&self, n_state_var: usize) -> PhlexResult<()>;
    /// flag, on a per-state-variable array, every species a property of phase `i_phase` depends
    /// on; returns the number of elements flagged
    fn flag_jac_elements(&self, i_phase: usize, flags: &mut [bool]) -> PhlexResult<usize>;
    fn update_env_state(&mut self, env: &EnvState);
    /// recompute state-dependent properties (phase masses, average weights)
    fn update_state(&mut self, state: &[f64]);
    /// m
    fn effective_radius(&self, i_phase: usize, partial: Option<&mut [f64]>) -> PhlexResult<f64>;
    /// # cm⁻³
    fn number_conc(&self, i_phase: usize, partial: Option<&mut [f64]>) -> PhlexResult<f64>;
    fn aero_conc_type(&self, i_phase: usize) -> AeroConcType;
    /// µg m⁻³
    fn phase_mass(
        &self,
        i_phase: usize,
        state: &[f64],
        partial: Option<&mut [f64]>,
    ) -> PhlexResult<f64>;
    /// kg mol⁻¹
    fn phase_avg_mw(
        &self,
        i_phase: usize,
        state: &[f64],
        partial: Option<&mut [f64]>,
    ) -> PhlexResult<f64>;
    /// returns true if the update was meant for this representation
    fn update_data(&mut self, update: &UpdateData) -> bool;
    fn describe(&self) -> String;
}

#[derive(Debug, Clone, PartialEq)]
#[enum_dispatch(AeroRepSolver)]
pub enum AeroRep {
    SingleParticle(SingleParticle),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AeroRepSet {
    aero_reps: Vec<AeroRep>,
}

impl AeroRepSet {
    pub fn new() -> Self {
        Self {
            aero_reps: Vec::new(),
        }
    }

    pub fn push(&mut self, aero_rep: impl Into<AeroRep>) {
        self.aero_reps.push(aero_rep.into());
    }

    pub fn len(&self) -> usize {
        self.aero_reps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aero_reps.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AeroRep> {
        self.aero_reps.iter()
    }

    pub fn get(&self, i_aero_rep: usize) -> PhlexResult<&AeroRep> {
        self.aero_reps.get(i_aero_rep).ok_or_else(|| {
            PhlexError::InvalidConfiguration(format!(
                "aerosol representation {} requested, {} defined",
                i_aero_rep,
                self.aero_reps.len()
            ))
        })
    }

    pub fn check_indices(&self, n_state_var: usize) -> PhlexResult<()> {
        self.aero_reps
            .iter()
            .try_for_each(|rep| rep.check_indices(n_state_var))
    }

    pub fn flag_jac_elements(
        &self,
        i_aero_rep: usize,
        i_phase: usize,
        flags: &mut [bool],
    ) -> PhlexResult<usize> {
        self.get(i_aero_rep)?.flag_jac_elements(i_phase, flags)
    }

    pub fn update_env_state(&mut self, env: &EnvState) {
        for rep in &mut self.aero_reps {
            rep.update_env_state(env);
        }
    }

    pub fn update_state(&mut self, state: &[f64]) {
        for rep in &mut self.aero_reps {
            rep.update_state(state);
        }
    }

    /// number of representations that accepted the update
    pub fn update_data(&mut self, update: &UpdateData) -> usize {
        self.aero_reps
            .iter_mut()
            .map(|rep| rep.update_data(update))
            .filter(|applied| *applied)
            .count()
    }

    pub fn table(&self) -> Table {
        let mut table = Table::new();
        table.add_row(Row::new(vec![
            Cell::new("#"),
            Cell::new("id"),
            Cell::new("phases"),
            Cell::new("description"),
        ]));
        for (i, rep) in self.aero_reps.iter().enumerate() {
            table.add_row(Row::new(vec![
                Cell::new(&i.to_string()),
                Cell::new(&rep.aero_rep_id().to_string()),
                Cell::new(&rep.n_phase().to_string()),
                Cell::new(&rep.describe()),
            ]));
        }
        table
    }

    pub fn pretty_print(&self) {
        self.table().printstd();
    }
}
