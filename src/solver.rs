//! # Chemistry solver
//!
//! ## Purpose
//! Initialization and run boundary of the chemistry core. A [`ChemSolver`] owns the model data
//! aggregate and a stiff integrator; one instance serves one column/grid cell at a time and
//! independent instances share nothing.
//!
//! ## Workflow
//! 1. `ChemSolver::new` (or `from_bytes` for a packed mechanism) validates the classification,
//!    builds the Jacobian template and initializes the integrator against it.
//! 2. `with_aero_reps` attaches aerosol representations, if any.
//! 3. `update_data` pushes externally computed values (photolysis rates, particle radius and
//!    number concentration) into the reactions and aerosol representations.
//! 4. `run` gathers the solved variables from the caller's state array, refreshes every rate
//!    constant for the environment, integrates, and writes the solved variables back.
use crate::aero_reps::AeroRepSet;
use crate::error::PhlexResult;
use crate::integrator::{IntegrationStats, SolverSettings, StiffIntegrator};
use crate::jacobian::SparsityTemplate;
use crate::model_data::ModelData;
use crate::rxns::{Mechanism, UpdateData};
use crate::state::{EnvState, VarType};
use log::{error, info};
use nalgebra::DVector;

pub struct ChemSolver<I: StiffIntegrator> {
    settings: SolverSettings,
    model: ModelData,
    integrator: I,
    y: DVector<f64>,
    last_stats: Option<IntegrationStats>,
}

impl<I: StiffIntegrator> ChemSolver<I> {
    /// `abs_tol` has one entry per state variable; only those of solved variables reach the
    /// integrator.
    pub fn new(
        settings: SolverSettings,
        var_type: Vec<VarType>,
        abs_tol: Vec<f64>,
        mechanism: Mechanism,
        mut integrator: I,
    ) -> PhlexResult<Self> {
        settings.validate()?;
        let model = ModelData::new(var_type, mechanism)?;
        let abs_tol = model.state_map().reduce(&abs_tol)?;
        let n_dep_var = model.n_dep_var();
        integrator.initialize(n_dep_var, abs_tol, &settings, model.template())?;
        info!(
            "chemistry solver initialized: rel_tol = {:e}, max_steps = {}, max_conv_fails = {}",
            settings.rel_tol, settings.max_steps, settings.max_conv_fails
        );
        Ok(Self {
            settings,
            model,
            integrator,
            y: DVector::zeros(n_dep_var),
            last_stats: None,
        })
    }

    /// Same as [`ChemSolver::new`] with the mechanism decoded from its packed form.
    pub fn from_bytes(
        settings: SolverSettings,
        var_type: Vec<VarType>,
        abs_tol: Vec<f64>,
        mechanism_bytes: &[u8],
        integrator: I,
    ) -> PhlexResult<Self> {
        let mechanism = Mechanism::from_bytes(mechanism_bytes)?;
        Self::new(settings, var_type, abs_tol, mechanism, integrator)
    }

    pub fn with_aero_reps(mut self, aero_reps: AeroRepSet) -> PhlexResult<Self> {
        self.model = self.model.with_aero_reps(aero_reps)?;
        Ok(self)
    }

    /// structure the integrator's sparse Jacobian was allocated against
    pub fn jacobian_template(&self) -> &SparsityTemplate {
        self.model.template()
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    pub fn model(&self) -> &ModelData {
        &self.model
    }

    pub fn mechanism(&self) -> &Mechanism {
        self.model.mechanism()
    }

    pub fn aero_reps(&self) -> &AeroRepSet {
        self.model.aero_reps()
    }

    pub fn integrator(&self) -> &I {
        &self.integrator
    }

    pub fn last_stats(&self) -> Option<&IntegrationStats> {
        self.last_stats.as_ref()
    }

    /// Number of reactions and aerosol representations that accepted the update. Rate updates
    /// take effect at the next `run`.
    pub fn update_data(&mut self, update: &UpdateData) -> usize {
        self.model.update_data(update)
    }

    /// Integrate `state` from `t_initial` to `t_final` under the environment `env`
    /// (`[temperature (K), pressure (Pa), ...]`).
    ///
    /// Only solved variables are written back. On failure `state` is left as it was passed in and
    /// the error is returned; the solver should be rebuilt before resuming.
    pub fn run(
        &mut self,
        state: &mut [f64],
        env: &[f64],
        t_initial: f64,
        t_final: f64,
    ) -> PhlexResult<IntegrationStats> {
        let env = EnvState::from_slice(env)?;
        self.model.load_state(state)?;
        self.model.gather(self.y.as_mut_slice())?;

        // environmental conditions are assumed constant over [t_initial, t_final]
        self.model.update_env_state(env)?;

        let result = self
            .integrator
            .integrate(&mut self.model, t_initial, t_final, &mut self.y);
        let stats = match result {
            Ok(stats) => stats,
            Err(e) => {
                error!(
                    "chemistry integration failed between t = {} and t = {}: {}",
                    t_initial, t_final, e
                );
                return Err(e);
            }
        };

        self.model.state_map().scatter(self.y.as_slice(), state)?;
        self.last_stats = Some(stats);
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PhlexError;
    use crate::integrator::BackwardEuler;
    use crate::rxns::arrhenius::{ArrheniusParams, ArrheniusReaction};
    use crate::rxns::photolysis::PhotolysisReaction;
    use crate::rxns::species::RxnSpecies;
    use approx::assert_relative_eq;

    /// 0: NO2, 1: NO, 2: O3, 3: O2 (constant)
    ///
    /// NO2 -> NO + O3 (photolysis, lumped), NO + O3 -> NO2 + O2
    fn nox_mechanism() -> Mechanism {
        let mut mech = Mechanism::new();
        let photo = RxnSpecies::new(vec![0], vec![1, 2], vec![1.0, 1.0]).unwrap();
        mech.push(PhotolysisReaction::new(1, 1.0, photo));
        let titration = RxnSpecies::new(vec![1, 2], vec![0, 3], vec![1.0, 1.0]).unwrap();
        mech.push(ArrheniusReaction::new(
            ArrheniusParams {
                a: 5.0,
                ..ArrheniusParams::default()
            },
            1.0,
            titration,
        ));
        mech
    }

    fn var_type() -> Vec<VarType> {
        vec![
            VarType::Solved,
            VarType::Solved,
            VarType::Solved,
            VarType::Constant,
        ]
    }

    fn solver() -> ChemSolver<BackwardEuler> {
        ChemSolver::new(
            SolverSettings::default(),
            var_type(),
            vec![1.0e-12; 4],
            nox_mechanism(),
            BackwardEuler::new(20),
        )
        .unwrap()
    }

    const ENV: [f64; 2] = [300.0, 300.0];

    #[test]
    fn test_run_without_light_is_titration_only() {
        let mut solver = solver();
        assert_eq!(solver.jacobian_template().n(), 3);
        let mut state = [0.0, 0.1, 0.1, 0.2];
        let stats = solver.run(&mut state, &ENV, 0.0, 10.0).unwrap();
        // NO + NO2 is conserved, O2 is a constant and never touched
        assert_relative_eq!(state[0] + state[1], 0.1, max_relative = 1e-10);
        assert_eq!(state[3], 0.2);
        assert!(state[0] > 0.0);
        assert_relative_eq!(state[1], state[2], max_relative = 1e-10);
        assert!(stats.n_steps >= 20);
        assert_eq!(solver.last_stats(), Some(&stats));
    }

    #[test]
    fn test_photolysis_update_applies_at_next_run() {
        let mut dark = solver();
        let mut lit = solver();
        let update = UpdateData::PhotolysisRate {
            photo_id: 1,
            base_rate: 0.5,
        };
        assert_eq!(lit.update_data(&update), 1);
        let mut state_dark = [0.1, 0.0, 0.0, 0.2];
        let mut state_lit = state_dark;
        dark.run(&mut state_dark, &ENV, 0.0, 1.0).unwrap();
        lit.run(&mut state_lit, &ENV, 0.0, 1.0).unwrap();
        assert_eq!(state_dark, [0.1, 0.0, 0.0, 0.2]);
        assert!(state_lit[0] < 0.1);
        assert!(state_lit[1] > 0.0);
        assert_relative_eq!(state_lit[0] + state_lit[1], 0.1, max_relative = 1e-10);
    }

    #[test]
    fn test_from_bytes_matches_typed_construction() {
        let bytes = nox_mechanism().to_bytes();
        let mut from_bytes = ChemSolver::from_bytes(
            SolverSettings::default(),
            var_type(),
            vec![1.0e-12; 4],
            &bytes,
            BackwardEuler::new(20),
        )
        .unwrap();
        let mut typed = solver();
        assert_eq!(from_bytes.jacobian_template(), typed.jacobian_template());

        let mut a = [0.05, 0.1, 0.08, 0.2];
        let mut b = a;
        from_bytes.run(&mut a, &ENV, 0.0, 2.0).unwrap();
        typed.run(&mut b, &ENV, 0.0, 2.0).unwrap();
        assert_eq!(a.map(f64::to_bits), b.map(f64::to_bits));
    }

    #[test]
    fn test_configuration_errors() {
        let short_tol = ChemSolver::new(
            SolverSettings::default(),
            var_type(),
            vec![1.0e-12; 3],
            nox_mechanism(),
            BackwardEuler::default(),
        );
        assert!(matches!(
            short_tol,
            Err(PhlexError::DimensionMismatch { .. })
        ));

        let mut bytes = nox_mechanism().to_bytes();
        bytes.push(0);
        let trailing = ChemSolver::from_bytes(
            SolverSettings::default(),
            var_type(),
            vec![1.0e-12; 4],
            &bytes,
            BackwardEuler::default(),
        );
        assert!(matches!(trailing, Err(PhlexError::TrailingBytes { .. })));

        let mut solver = solver();
        let mut state = [0.0; 4];
        assert!(solver.run(&mut state, &[300.0], 0.0, 1.0).is_err());
        assert!(solver.run(&mut [0.0; 3], &ENV, 0.0, 1.0).is_err());
    }

    #[test]
    fn test_failed_run_leaves_state_untouched() {
        let settings = SolverSettings {
            max_steps: 2,
            ..SolverSettings::default()
        };
        let mut solver = ChemSolver::new(
            settings,
            var_type(),
            vec![1.0e-12; 4],
            nox_mechanism(),
            BackwardEuler::new(20),
        )
        .unwrap();
        let mut state = [0.0, 0.1, 0.1, 0.2];
        let err = solver.run(&mut state, &ENV, 0.0, 10.0).unwrap_err();
        assert!(matches!(err, PhlexError::IntegratorFailure(_)));
        assert_eq!(state, [0.0, 0.1, 0.1, 0.2]);
    }

    #[test]
    fn test_aerosol_updates_reach_the_representation() {
        use crate::aero_reps::AeroRepSolver;
        use crate::aero_reps::phase::AeroPhase;
        use crate::aero_reps::single_particle::SingleParticle;

        let phase = AeroPhase::new("soot", vec![3], vec![0.012]).unwrap();
        let mut aero_reps = AeroRepSet::new();
        aero_reps.push(SingleParticle::new(2, vec![phase]).unwrap());
        let mut solver = solver().with_aero_reps(aero_reps).unwrap();
        let number = UpdateData::AeroRepNumber {
            aero_rep_id: 2,
            number_conc: 1.0e4,
        };
        assert_eq!(solver.update_data(&number), 1);
        let mut state = [0.0, 0.1, 0.1, 0.2];
        solver.run(&mut state, &ENV, 0.0, 1.0).unwrap();
        let rep = solver.aero_reps().get(0).unwrap();
        assert_eq!(rep.number_conc(0, None).unwrap(), 1.0e4);
        assert_eq!(rep.phase_mass(0, &state, None).unwrap(), 0.2);
    }

    #[test]
    fn test_solver_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<ChemSolver<BackwardEuler>>();
    }
}
