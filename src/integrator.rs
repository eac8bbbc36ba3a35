//! # Integrator boundary
//!
//! ## Purpose
//! The chemistry core does not step time itself. A stiff integrator is handed the reduced
//! vector of solved variables and calls back into an [`OdeSystem`] for `f(t, y)` and `∂f/∂y`,
//! the latter in the compressed sparse column structure published at initialization.
//!
//! ## Main Structures
//! - [`OdeSystem`]: the two callbacks.
//! - [`StiffIntegrator`]: what a time stepper has to provide.
//! - [`SolverSettings`]: relative tolerance, step limit and convergence-failure limit.
//! - [`BackwardEuler`]: small reference stepper (fixed substeps, modified Newton with a sparse LU
//!   of `I − h·J` on the template structure). Adequate for box models and tests, not a
//!   production BDF code.
use crate::error::{PhlexError, PhlexResult};
use crate::jacobian::{SparseJacobian, SparsityTemplate};
use faer::Mat;
use faer::linalg::solvers::Solve;
use log::{debug, warn};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// Callbacks a stiff integrator evaluates at every internal step.
pub trait OdeSystem {
    fn n_dep_var(&self) -> usize;
    /// `deriv = f(t, y)`; `deriv` is overwritten
    fn rhs(&mut self, t: f64, y: &[f64], deriv: &mut [f64]) -> PhlexResult<()>;
    /// `jac = ∂f/∂y`; structure reset to the published template and values overwritten
    fn jacobian(&mut self, t: f64, y: &[f64], jac: &mut SparseJacobian) -> PhlexResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverSettings {
    #[serde(default = "default_rel_tol")]
    pub rel_tol: f64,
    /// maximum number of internal steps per run
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// maximum number of nonlinear convergence failures per run
    #[serde(default = "default_max_conv_fails")]
    pub max_conv_fails: usize,
}

fn default_rel_tol() -> f64 {
    1.0e-4
}

fn default_max_steps() -> usize {
    500
}

fn default_max_conv_fails() -> usize {
    10
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            rel_tol: default_rel_tol(),
            max_steps: default_max_steps(),
            max_conv_fails: default_max_conv_fails(),
        }
    }
}

impl SolverSettings {
    pub fn validate(&self) -> PhlexResult<()> {
        if !(self.rel_tol > 0.0) {
            return Err(PhlexError::InvalidConfiguration(format!(
                "relative tolerance must be positive, got {}",
                self.rel_tol
            )));
        }
        if self.max_steps == 0 {
            return Err(PhlexError::InvalidConfiguration(
                "max_steps must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// counters of one `integrate` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntegrationStats {
    pub n_steps: usize,
    pub n_rhs_evals: usize,
    pub n_jac_evals: usize,
    pub n_newton_iters: usize,
    pub n_conv_fails: usize,
}

pub trait StiffIntegrator {
    /// Allocate for `n_dep_var` unknowns. `abs_tol` is per solved variable; the Jacobian
    /// structure is fixed to `template` from here on.
    fn initialize(
        &mut self,
        n_dep_var: usize,
        abs_tol: Vec<f64>,
        settings: &SolverSettings,
        template: &SparsityTemplate,
    ) -> PhlexResult<()>;

    /// Advance `y` from `t_initial` to `t_final` in place.
    fn integrate(
        &mut self,
        system: &mut dyn OdeSystem,
        t_initial: f64,
        t_final: f64,
        y: &mut DVector<f64>,
    ) -> PhlexResult<IntegrationStats>;
}

/// Fixed-substep implicit Euler.
///
/// Each substep solves `y − y_n − h·f(t + h, y) = 0` by modified Newton iteration: the Jacobian
/// is evaluated once per substep attempt and `I − h·J` is factorized with `faer`'s sparse LU. An
/// iteration converges once the weighted RMS norm of the update,
/// `Δ_i / (abs_tol_i + rel_tol·|y_i|)`, drops to 1 or below. A substep that does not converge is
/// retried at half the size and counted as a convergence failure; successful substeps grow back
/// toward the nominal size.
#[derive(Debug, Clone)]
pub struct BackwardEuler {
    n_substeps: usize,
    max_newton_iters: usize,
    settings: SolverSettings,
    abs_tol: DVector<f64>,
    jac: Option<SparseJacobian>,
}

impl Default for BackwardEuler {
    fn default() -> Self {
        Self::new(10)
    }
}

impl BackwardEuler {
    pub fn new(n_substeps: usize) -> Self {
        Self {
            n_substeps: n_substeps.max(1),
            max_newton_iters: 8,
            settings: SolverSettings::default(),
            abs_tol: DVector::zeros(0),
            jac: None,
        }
    }

    pub fn with_max_newton_iters(mut self, max_newton_iters: usize) -> Self {
        self.max_newton_iters = max_newton_iters.max(1);
        self
    }

    pub fn n_substeps(&self) -> usize {
        self.n_substeps
    }

    fn weighted_rms(&self, delta: &DVector<f64>, y: &DVector<f64>) -> f64 {
        let n = delta.len();
        if n == 0 {
            return 0.0;
        }
        let sum: f64 = delta
            .iter()
            .zip(y.iter())
            .zip(self.abs_tol.iter())
            .map(|((d, y), atol)| {
                let w = d / (atol + self.settings.rel_tol * y.abs());
                w * w
            })
            .sum();
        (sum / n as f64).sqrt()
    }

    /// One implicit substep from `(t, y_n)`; `None` if Newton did not converge.
    fn try_substep(
        &mut self,
        system: &mut dyn OdeSystem,
        t: f64,
        h: f64,
        y_n: &DVector<f64>,
        stats: &mut IntegrationStats,
    ) -> PhlexResult<Option<DVector<f64>>> {
        let n = y_n.len();
        let jac = self.jac.as_mut().ok_or_else(|| {
            PhlexError::IntegratorFailure("integrator used before initialize".to_string())
        })?;
        let t_new = t + h;
        let mut y = y_n.clone();
        system.jacobian(t_new, y.as_slice(), jac)?;
        stats.n_jac_evals += 1;
        let iteration_matrix = jac.shifted_identity(h)?;
        let lu = match iteration_matrix.as_ref().sp_lu() {
            Ok(lu) => lu,
            Err(e) => {
                debug!("sparse LU failed at t = {}, h = {}: {:?}", t, h, e);
                return Ok(None);
            }
        };

        let mut f = DVector::zeros(n);
        for _ in 0..self.max_newton_iters {
            system.rhs(t_new, y.as_slice(), f.as_mut_slice())?;
            stats.n_rhs_evals += 1;
            stats.n_newton_iters += 1;
            let residual = &y - y_n - &f * h;
            let mut rhs = Mat::from_fn(n, 1, |i, _| -residual[i]);
            lu.solve_in_place(rhs.as_mut());
            let delta = DVector::from_fn(n, |i, _| rhs[(i, 0)]);
            y += &delta;
            if !y.iter().all(|v| v.is_finite()) {
                return Ok(None);
            }
            if self.weighted_rms(&delta, &y) <= 1.0 {
                return Ok(Some(y));
            }
        }
        Ok(None)
    }
}

impl StiffIntegrator for BackwardEuler {
    fn initialize(
        &mut self,
        n_dep_var: usize,
        abs_tol: Vec<f64>,
        settings: &SolverSettings,
        template: &SparsityTemplate,
    ) -> PhlexResult<()> {
        settings.validate()?;
        if abs_tol.len() != n_dep_var {
            return Err(PhlexError::DimensionMismatch {
                what: "absolute tolerances".to_string(),
                expected: n_dep_var,
                got: abs_tol.len(),
            });
        }
        if let Some(bad) = abs_tol.iter().find(|a| !(**a > 0.0)) {
            return Err(PhlexError::InvalidConfiguration(format!(
                "absolute tolerances must be positive, got {}",
                bad
            )));
        }
        if template.n() != n_dep_var {
            return Err(PhlexError::SparsityMismatch(format!(
                "template is {}x{} for {} dependent variables",
                template.n(),
                template.n(),
                n_dep_var
            )));
        }
        self.settings = *settings;
        self.abs_tol = DVector::from_vec(abs_tol);
        self.jac = Some(SparseJacobian::from_template(template));
        Ok(())
    }

    fn integrate(
        &mut self,
        system: &mut dyn OdeSystem,
        t_initial: f64,
        t_final: f64,
        y: &mut DVector<f64>,
    ) -> PhlexResult<IntegrationStats> {
        let n = self.abs_tol.len();
        if self.jac.is_none() {
            return Err(PhlexError::IntegratorFailure(
                "integrator used before initialize".to_string(),
            ));
        }
        if y.len() != n || system.n_dep_var() != n {
            return Err(PhlexError::DimensionMismatch {
                what: "dependent variable vector".to_string(),
                expected: n,
                got: y.len(),
            });
        }
        if !(t_final >= t_initial) {
            return Err(PhlexError::InvalidConfiguration(format!(
                "t_final ({}) before t_initial ({})",
                t_final, t_initial
            )));
        }
        let mut stats = IntegrationStats::default();
        if t_final == t_initial || n == 0 {
            return Ok(stats);
        }

        let h_nominal = (t_final - t_initial) / self.n_substeps as f64;
        let mut h = h_nominal;
        let mut t = t_initial;
        while t < t_final {
            if stats.n_steps >= self.settings.max_steps {
                return Err(PhlexError::IntegratorFailure(format!(
                    "maximum of {} steps reached at t = {}",
                    self.settings.max_steps, t
                )));
            }
            // slack absorbs roundoff accumulated in t
            let last = h * (1.0 + 1.0e-10) >= t_final - t;
            if last {
                h = t_final - t;
            }
            match self.try_substep(system, t, h, y, &mut stats)? {
                Some(y_new) => {
                    *y = y_new;
                    t = if last { t_final } else { t + h };
                    stats.n_steps += 1;
                    h = (2.0 * h).min(h_nominal);
                }
                None => {
                    stats.n_conv_fails += 1;
                    if stats.n_conv_fails > self.settings.max_conv_fails {
                        return Err(PhlexError::IntegratorFailure(format!(
                            "{} convergence failures at t = {}, h = {:e}",
                            stats.n_conv_fails, t, h
                        )));
                    }
                    warn!(
                        "Newton iteration failed at t = {}, retrying with h = {:e}",
                        t,
                        0.5 * h
                    );
                    h *= 0.5;
                }
            }
        }
        debug!("{:?}", stats);
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jacobian::JacobianMask;
    use crate::model_data::ModelData;
    use crate::rxns::Mechanism;
    use crate::rxns::arrhenius::{ArrheniusParams, ArrheniusReaction};
    use crate::rxns::species::RxnSpecies;
    use crate::state::{EnvState, VarType};
    use approx::assert_relative_eq;

    /// A -> B with k = 1 s⁻¹
    fn decay_model() -> ModelData {
        let species = RxnSpecies::new(vec![0], vec![1], vec![1.0]).unwrap();
        let mut mech = Mechanism::new();
        mech.push(ArrheniusReaction::new(
            ArrheniusParams::default(),
            1.0,
            species,
        ));
        let mut model = ModelData::new(vec![VarType::Solved; 2], mech).unwrap();
        model.update_env_state(EnvState::default()).unwrap();
        model
    }

    fn initialized(model: &ModelData, settings: SolverSettings) -> BackwardEuler {
        let mut be = BackwardEuler::default();
        be.initialize(2, vec![1.0e-12; 2], &settings, model.template())
            .unwrap();
        be
    }

    /// dy/dt = NaN, never converges
    struct Poisoned {
        template: SparsityTemplate,
    }

    impl OdeSystem for Poisoned {
        fn n_dep_var(&self) -> usize {
            1
        }
        fn rhs(&mut self, _t: f64, _y: &[f64], deriv: &mut [f64]) -> PhlexResult<()> {
            deriv[0] = f64::NAN;
            Ok(())
        }
        fn jacobian(&mut self, _t: f64, _y: &[f64], jac: &mut SparseJacobian) -> PhlexResult<()> {
            jac.reset_to(&self.template)
        }
    }

    #[test]
    fn test_decay_conserves_mass() {
        let mut model = decay_model();
        let mut be = initialized(&model, SolverSettings::default());
        let mut y = DVector::from_vec(vec![1.0, 0.0]);
        let stats = be.integrate(&mut model, 0.0, 1.0, &mut y).unwrap();
        assert_eq!(stats.n_steps, 10);
        assert_eq!(stats.n_conv_fails, 0);
        assert_relative_eq!(y[0] + y[1], 1.0, max_relative = 1e-12);
        // implicit Euler with h = 0.1 on a linear problem
        assert_relative_eq!(y[0], (1.0f64 / 1.1).powi(10), max_relative = 1e-8);
        assert!((y[0] - (-1.0f64).exp()).abs() < 0.03);
    }

    /// A -> B -> C with k = 1 and 2 s⁻¹
    #[test]
    fn test_single_substep_solves_the_linear_system() {
        let mut mech = Mechanism::new();
        for (a, from, to) in [(1.0, 0, 1), (2.0, 1, 2)] {
            let species = RxnSpecies::new(vec![from], vec![to], vec![1.0]).unwrap();
            let params = ArrheniusParams {
                a,
                ..ArrheniusParams::default()
            };
            mech.push(ArrheniusReaction::new(params, 1.0, species));
        }
        let mut model = ModelData::new(vec![VarType::Solved; 3], mech).unwrap();
        model.update_env_state(EnvState::default()).unwrap();
        let mut be = BackwardEuler::new(1);
        be.initialize(3, vec![1.0e-12; 3], &SolverSettings::default(), model.template())
            .unwrap();
        let mut y = DVector::from_vec(vec![1.0, 0.0, 0.0]);
        let stats = be.integrate(&mut model, 0.0, 0.5, &mut y).unwrap();
        assert_eq!(stats.n_steps, 1);
        assert_eq!(stats.n_jac_evals, 1);
        // (I − hJ) y = y0 with h = 0.5
        assert_relative_eq!(y[0], 2.0 / 3.0, max_relative = 1e-12);
        assert_relative_eq!(y[1], 1.0 / 6.0, max_relative = 1e-12);
        assert_relative_eq!(y[2], 1.0 / 6.0, max_relative = 1e-12);
    }

    #[test]
    fn test_step_limit() {
        let mut model = decay_model();
        let settings = SolverSettings {
            max_steps: 3,
            ..SolverSettings::default()
        };
        let mut be = initialized(&model, settings);
        let mut y = DVector::from_vec(vec![1.0, 0.0]);
        assert!(matches!(
            be.integrate(&mut model, 0.0, 1.0, &mut y),
            Err(PhlexError::IntegratorFailure(_))
        ));
    }

    #[test]
    fn test_convergence_failure_limit() {
        let mut mask = JacobianMask::new(1);
        mask.set(0, 0).unwrap();
        let template = SparsityTemplate::from_mask(&mask);
        let mut system = Poisoned {
            template: template.clone(),
        };
        let settings = SolverSettings {
            max_conv_fails: 4,
            ..SolverSettings::default()
        };
        let mut be = BackwardEuler::new(2);
        be.initialize(1, vec![1.0e-8], &settings, &template).unwrap();
        let mut y = DVector::from_vec(vec![1.0]);
        let err = be.integrate(&mut system, 0.0, 1.0, &mut y).unwrap_err();
        assert!(matches!(err, PhlexError::IntegratorFailure(_)));
        // a failed run leaves y at the last accepted step
        assert_eq!(y[0], 1.0);
    }

    #[test]
    fn test_initialize_validation() {
        let model = decay_model();
        let mut be = BackwardEuler::default();
        let settings = SolverSettings::default();
        assert!(be
            .initialize(2, vec![1.0e-12], &settings, model.template())
            .is_err());
        assert!(be
            .initialize(2, vec![1.0e-12, 0.0], &settings, model.template())
            .is_err());
        assert!(matches!(
            be.initialize(3, vec![1.0e-12; 3], &settings, model.template()),
            Err(PhlexError::SparsityMismatch(_))
        ));
        let bad = SolverSettings {
            rel_tol: 0.0,
            ..SolverSettings::default()
        };
        assert!(be.initialize(2, vec![1.0e-12; 2], &bad, model.template()).is_err());
    }

    #[test]
    fn test_integrate_before_initialize() {
        let mut model = decay_model();
        let mut be = BackwardEuler::default();
        let mut y = DVector::from_vec(vec![1.0, 0.0]);
        assert!(be.integrate(&mut model, 0.0, 1.0, &mut y).is_err());
    }

    #[test]
    fn test_empty_interval_is_a_no_op() {
        let mut model = decay_model();
        let mut be = initialized(&model, SolverSettings::default());
        let mut y = DVector::from_vec(vec![0.4, 0.6]);
        let stats = be.integrate(&mut model, 5.0, 5.0, &mut y).unwrap();
        assert_eq!(stats, IntegrationStats::default());
        assert_eq!(y.as_slice(), &[0.4, 0.6]);
        assert!(be.integrate(&mut model, 5.0, 4.0, &mut y).is_err());
    }
}
