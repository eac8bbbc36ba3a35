//! # Model data
//!
//! ## Purpose
//! Per-solver scratch aggregate: the live full state array, the environment, the reaction arena,
//! the aerosol representations and the sparsity template the integrator allocated against. The
//! integrator only sees the reduced vector of solved variables; every callback first scatters
//! that vector onto the full state array so reactions can read constant species too.
//!
//! ## Main Structures
//! - [`ModelData`]: the aggregate, implements [`OdeSystem`] for the integrator.
use crate::aero_reps::AeroRepSet;
use crate::error::{PhlexError, PhlexResult};
use crate::integrator::OdeSystem;
use crate::jacobian::{SparseJacobian, SparsityTemplate, build_jacobian_template};
use crate::rxns::{Mechanism, UpdateData};
use crate::state::{EnvState, StateMap, VarType};
use log::{debug, info};

#[derive(Debug, Clone)]
pub struct ModelData {
    state_map: StateMap,
    state: Vec<f64>,
    env: EnvState,
    mechanism: Mechanism,
    aero_reps: AeroRepSet,
    template: SparsityTemplate,
}

impl ModelData {
    /// Validate the mechanism against the classification and build the Jacobian template.
    pub fn new(var_type: Vec<VarType>, mut mechanism: Mechanism) -> PhlexResult<Self> {
        let state_map = StateMap::new(var_type);
        mechanism.check_indices(state_map.n_state_var())?;
        let template = build_jacobian_template(&mut mechanism, &state_map)?;
        info!(
            "model data ready: {} state variables ({} solved), {} reactions",
            state_map.n_state_var(),
            state_map.n_dep_var(),
            mechanism.len()
        );
        Ok(Self {
            state: vec![0.0; state_map.n_state_var()],
            state_map,
            env: EnvState::default(),
            mechanism,
            aero_reps: AeroRepSet::new(),
            template,
        })
    }

    /// Attach aerosol representations; their species must exist on the state array.
    pub fn with_aero_reps(mut self, aero_reps: AeroRepSet) -> PhlexResult<Self> {
        aero_reps.check_indices(self.n_state_var())?;
        info!("{} aerosol representations attached", aero_reps.len());
        self.aero_reps = aero_reps;
        Ok(self)
    }

    pub fn state_map(&self) -> &StateMap {
        &self.state_map
    }

    pub fn n_state_var(&self) -> usize {
        self.state_map.n_state_var()
    }

    pub fn n_dep_var(&self) -> usize {
        self.state_map.n_dep_var()
    }

    pub fn state(&self) -> &[f64] {
        &self.state
    }

    pub fn env(&self) -> &EnvState {
        &self.env
    }

    pub fn mechanism(&self) -> &Mechanism {
        &self.mechanism
    }

    pub fn aero_reps(&self) -> &AeroRepSet {
        &self.aero_reps
    }

    pub fn template(&self) -> &SparsityTemplate {
        &self.template
    }

    /// Take a caller's full state array as the live state. Constant and steady-state species
    /// keep these values for the whole run.
    pub fn load_state(&mut self, state: &[f64]) -> PhlexResult<()> {
        if state.len() != self.n_state_var() {
            return Err(PhlexError::DimensionMismatch {
                what: "full state array".to_string(),
                expected: self.n_state_var(),
                got: state.len(),
            });
        }
        self.state.copy_from_slice(state);
        self.aero_reps.update_state(&self.state);
        Ok(())
    }

    /// reduced vector → live state (Solved slots only), then refresh state-dependent aerosol
    /// properties
    pub fn scatter(&mut self, y: &[f64]) -> PhlexResult<()> {
        self.state_map.scatter(y, &mut self.state)?;
        self.aero_reps.update_state(&self.state);
        Ok(())
    }

    /// live state → reduced vector
    pub fn gather(&self, y: &mut [f64]) -> PhlexResult<()> {
        self.state_map.gather(&self.state, y)
    }

    /// Refresh every reaction's rate constant and every aerosol representation. The environment
    /// is taken as fixed until the next call.
    pub fn update_env_state(&mut self, env: EnvState) -> PhlexResult<()> {
        env.validate()?;
        self.env = env;
        self.aero_reps.update_env_state(&self.env);
        self.mechanism.update_env_state(&self.env);
        Ok(())
    }

    /// number of reactions and aerosol representations that accepted the update
    pub fn update_data(&mut self, update: &UpdateData) -> usize {
        let n_rxn = self.mechanism.update_data(update);
        let n_aero_rep = self.aero_reps.update_data(update);
        debug!(
            "{:?} applied to {} reactions, {} aerosol representations",
            update, n_rxn, n_aero_rep
        );
        n_rxn + n_aero_rep
    }

    /// `f(t, y)`: scatter, zero, accumulate every reaction in arena order
    pub fn calc_deriv(&mut self, y: &[f64], deriv: &mut [f64]) -> PhlexResult<()> {
        if deriv.len() != self.n_dep_var() {
            return Err(PhlexError::DimensionMismatch {
                what: "derivative vector".to_string(),
                expected: self.n_dep_var(),
                got: deriv.len(),
            });
        }
        self.scatter(y)?;
        deriv.iter_mut().for_each(|d| *d = 0.0);
        self.mechanism.calc_deriv(&self.state, deriv);
        Ok(())
    }

    /// `∂f/∂y`: scatter, reset the structure to the template, accumulate every reaction
    pub fn calc_jac(&mut self, y: &[f64], jac: &mut SparseJacobian) -> PhlexResult<()> {
        self.scatter(y)?;
        jac.reset_to(&self.template)?;
        self.mechanism.calc_jac(&self.state, jac.values_mut());
        Ok(())
    }
}

impl OdeSystem for ModelData {
    fn n_dep_var(&self) -> usize {
        self.state_map.n_dep_var()
    }

    fn rhs(&mut self, _t: f64, y: &[f64], deriv: &mut [f64]) -> PhlexResult<()> {
        self.calc_deriv(y, deriv)
    }

    fn jacobian(&mut self, _t: f64, y: &[f64], jac: &mut SparseJacobian) -> PhlexResult<()> {
        self.calc_jac(y, jac)
    }
}
