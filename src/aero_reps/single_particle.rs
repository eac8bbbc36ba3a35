//! # Single particle aerosol representation
//!
//! One particle (or a population of identical particles) made of one or more aerosol phases.
//! Radius (m) and number concentration (# cm⁻³) belong to an aerosol microphysics model outside
//! this crate. They are pushed in through [`UpdateData::AeroRepRadius`] and
//! [`UpdateData::AeroRepNumber`], matched on `aero_rep_id`, and are held fixed while the
//! chemistry is solved, so their partial derivatives with respect to the state are all zero.
//! An id of 0 means the representation was never registered and ignores every update.
//!
//! Phase masses and average molecular weights are recomputed from the state by `update_state`.
use super::phase::AeroPhase;
use super::{AeroConcType, AeroRepSolver};
use crate::error::{PhlexError, PhlexResult};
use crate::rxns::UpdateData;
use crate::state::EnvState;

#[derive(Debug, Clone, PartialEq)]
pub struct SingleParticle {
    pub aero_rep_id: i32,
    phases: Vec<AeroPhase>,
    /// m
    radius: f64,
    /// # cm⁻³
    number_conc: f64,
    /// µg m⁻³, per phase, as of the last `update_state`
    phase_mass: Vec<f64>,
    /// kg mol⁻¹, per phase, as of the last `update_state`
    phase_avg_mw: Vec<f64>,
}

impl SingleParticle {
    pub fn new(aero_rep_id: i32, phases: Vec<AeroPhase>) -> PhlexResult<Self> {
        if phases.is_empty() {
            return Err(PhlexError::InvalidConfiguration(format!(
                "single particle representation {} has no aerosol phases",
                aero_rep_id
            )));
        }
        for phase in &phases {
            phase.validate()?;
        }
        let n_phase = phases.len();
        Ok(Self {
            aero_rep_id,
            phases,
            radius: 0.0,
            number_conc: 0.0,
            phase_mass: vec![0.0; n_phase],
            phase_avg_mw: vec![0.0; n_phase],
        })
    }

    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = radius;
        self
    }

    pub fn with_number_conc(mut self, number_conc: f64) -> Self {
        self.number_conc = number_conc;
        self
    }

    pub fn phases(&self) -> &[AeroPhase] {
        &self.phases
    }

    fn phase_at(&self, i_phase: usize) -> PhlexResult<&AeroPhase> {
        self.phases.get(i_phase).ok_or_else(|| {
            PhlexError::InvalidConfiguration(format!(
                "aerosol phase {} requested from a representation with {} phases",
                i_phase,
                self.phases.len()
            ))
        })
    }

    fn check_partial_len(&self, partial: &[f64]) -> PhlexResult<()> {
        if partial.len() != self.n_jac_elem() {
            return Err(PhlexError::DimensionMismatch {
                what: "aerosol representation partial derivatives".to_string(),
                expected: self.n_jac_elem(),
                got: partial.len(),
            });
        }
        Ok(())
    }

    /// zero every partial, then let `fill` write the block of phase `i_phase`
    fn phase_block_partials(
        &self,
        i_phase: usize,
        partial: &mut [f64],
        fill: impl FnOnce(&AeroPhase, &mut [f64]),
    ) -> PhlexResult<()> {
        self.check_partial_len(partial)?;
        partial.iter_mut().for_each(|p| *p = 0.0);
        let start: usize = self.phases[..i_phase].iter().map(AeroPhase::n_species).sum();
        let phase = &self.phases[i_phase];
        fill(phase, &mut partial[start..start + phase.n_species()]);
        Ok(())
    }

    fn zero_partials(&self, partial: Option<&mut [f64]>) -> PhlexResult<()> {
        if let Some(partial) = partial {
            self.check_partial_len(partial)?;
            partial.iter_mut().for_each(|p| *p = 0.0);
        }
        Ok(())
    }
}

impl AeroRepSolver for SingleParticle {
    fn aero_rep_id(&self) -> i32 {
        self.aero_rep_id
    }

    fn n_phase(&self) -> usize {
        self.phases.len()
    }

    /// every phase species of every phase, phase by phase
    fn n_jac_elem(&self) -> usize {
        self.phases.iter().map(AeroPhase::n_species).sum()
    }

    fn check_indices(&self, n_state_var: usize) -> PhlexResult<()> {
        self.phases
            .iter()
            .try_for_each(|phase| phase.check_indices(n_state_var))
    }

    /// Every phase in the particle shares the same elements, so `i_phase` only has to exist.
    fn flag_jac_elements(&self, i_phase: usize, flags: &mut [bool]) -> PhlexResult<usize> {
        self.phase_at(i_phase)?;
        let mut n_flagged = 0;
        for phase in &self.phases {
            n_flagged += phase.flag_jac_elements(flags)?;
        }
        Ok(n_flagged)
    }

    fn update_env_state(&mut self, _env: &EnvState) {}

    fn update_state(&mut self, state: &[f64]) {
        for (i_phase, phase) in self.phases.iter().enumerate() {
            let (mass, mw) = phase.mass_and_mw(state);
            self.phase_mass[i_phase] = mass;
            self.phase_avg_mw[i_phase] = mw;
        }
    }

    fn effective_radius(&self, _i_phase: usize, partial: Option<&mut [f64]>) -> PhlexResult<f64> {
        self.zero_partials(partial)?;
        Ok(self.radius)
    }

    fn number_conc(&self, _i_phase: usize, partial: Option<&mut [f64]>) -> PhlexResult<f64> {
        self.zero_partials(partial)?;
        Ok(self.number_conc)
    }

    fn aero_conc_type(&self, _i_phase: usize) -> AeroConcType {
        AeroConcType::PerParticle
    }

    fn phase_mass(
        &self,
        i_phase: usize,
        _state: &[f64],
        partial: Option<&mut [f64]>,
    ) -> PhlexResult<f64> {
        self.phase_at(i_phase)?;
        if let Some(partial) = partial {
            self.phase_block_partials(i_phase, partial, |phase, block| {
                phase.mass_partials(block)
            })?;
        }
        Ok(self.phase_mass[i_phase])
    }

    fn phase_avg_mw(
        &self,
        i_phase: usize,
        state: &[f64],
        partial: Option<&mut [f64]>,
    ) -> PhlexResult<f64> {
        self.phase_at(i_phase)?;
        if let Some(partial) = partial {
            self.phase_block_partials(i_phase, partial, |phase, block| {
                phase.mw_partials(state, block)
            })?;
        }
        Ok(self.phase_avg_mw[i_phase])
    }

    fn update_data(&mut self, update: &UpdateData) -> bool {
        if self.aero_rep_id == 0 {
            return false;
        }
        match update {
            UpdateData::AeroRepRadius {
                aero_rep_id,
                radius,
            } if *aero_rep_id == self.aero_rep_id => {
                self.radius = *radius;
                true
            }
            UpdateData::AeroRepNumber {
                aero_rep_id,
                number_conc,
            } if *aero_rep_id == self.aero_rep_id => {
                self.number_conc = *number_conc;
                true
            }
            _ => false,
        }
    }

    fn describe(&self) -> String {
        let phases: Vec<&str> = self.phases.iter().map(|p| p.name.as_str()).collect();
        format!(
            "single particle, r = {:e} m, N = {:e} cm-3, phases: {}",
            self.radius,
            self.number_conc,
            phases.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// 0: gas, 1-2: organic phase, 3: aqueous phase
    fn particle(aero_rep_id: i32) -> SingleParticle {
        let organic = AeroPhase::new("organic", vec![1, 2], vec![0.2, 0.1]).unwrap();
        let aqueous = AeroPhase::new("aqueous", vec![3], vec![0.018]).unwrap();
        SingleParticle::new(aero_rep_id, vec![organic, aqueous])
            .unwrap()
            .with_radius(1.0e-7)
            .with_number_conc(5.0e2)
    }

    #[test]
    fn test_updates_match_the_representation_id() {
        let mut rep = particle(3);
        let radius = |aero_rep_id| UpdateData::AeroRepRadius {
            aero_rep_id,
            radius: 2.5e-6,
        };
        let number = |aero_rep_id| UpdateData::AeroRepNumber {
            aero_rep_id,
            number_conc: 1.0e3,
        };
        assert!(!rep.update_data(&radius(4)));
        assert!(!rep.update_data(&number(4)));
        assert!(rep.update_data(&radius(3)));
        assert!(rep.update_data(&number(3)));
        assert_eq!(rep.effective_radius(0, None).unwrap(), 2.5e-6);
        assert_eq!(rep.number_conc(1, None).unwrap(), 1.0e3);

        let photolysis = UpdateData::PhotolysisRate {
            photo_id: 3,
            base_rate: 1.0,
        };
        assert!(!rep.update_data(&photolysis));
    }

    #[test]
    fn test_unregistered_representation_ignores_updates() {
        let mut rep = particle(0);
        let update = UpdateData::AeroRepRadius {
            aero_rep_id: 0,
            radius: 1.0,
        };
        assert!(!rep.update_data(&update));
        assert_eq!(rep.effective_radius(0, None).unwrap(), 1.0e-7);
    }

    #[test]
    fn test_radius_and_number_have_zero_partials() {
        let rep = particle(1);
        assert_eq!(rep.n_jac_elem(), 3);
        let mut partial = [7.0; 3];
        assert_eq!(rep.effective_radius(0, Some(&mut partial[..])).unwrap(), 1.0e-7);
        assert_eq!(partial, [0.0; 3]);
        let mut partial = [7.0; 3];
        assert_eq!(rep.number_conc(1, Some(&mut partial[..])).unwrap(), 5.0e2);
        assert_eq!(partial, [0.0; 3]);
        let mut short = [0.0; 2];
        assert!(rep.number_conc(0, Some(&mut short[..])).is_err());
        assert_eq!(rep.aero_conc_type(0), AeroConcType::PerParticle);
    }

    #[test]
    fn test_phase_mass_and_weight_follow_the_state() {
        let mut rep = particle(1);
        let state = [1.0, 4.0, 1.0, 9.0];
        rep.update_state(&state);

        let mut partial = [7.0; 3];
        assert_eq!(rep.phase_mass(0, &state, Some(&mut partial[..])).unwrap(), 5.0);
        assert_eq!(partial, [1.0, 1.0, 0.0]);
        let mut partial = [7.0; 3];
        assert_eq!(rep.phase_mass(1, &state, Some(&mut partial[..])).unwrap(), 9.0);
        assert_eq!(partial, [0.0, 0.0, 1.0]);

        // 5 / (4/0.2 + 1/0.1)
        assert_relative_eq!(
            rep.phase_avg_mw(0, &state, None).unwrap(),
            5.0 / 30.0,
            max_relative = 1e-12
        );
        assert_relative_eq!(
            rep.phase_avg_mw(1, &state, None).unwrap(),
            0.018,
            max_relative = 1e-12
        );
        assert!(rep.phase_mass(2, &state, None).is_err());
    }

    #[test]
    fn test_every_phase_flags_the_whole_particle() {
        let rep = particle(1);
        let mut flags = [false; 4];
        assert_eq!(rep.flag_jac_elements(1, &mut flags).unwrap(), 3);
        assert_eq!(flags, [false, true, true, true]);
        assert!(rep.flag_jac_elements(2, &mut flags).is_err());
        assert!(rep.check_indices(4).is_ok());
        assert!(matches!(
            rep.check_indices(3),
            Err(PhlexError::StateIndexOutOfRange { index: 3, .. })
        ));
    }
}
