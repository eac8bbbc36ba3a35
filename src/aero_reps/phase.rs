//! Aerosol phase: a named set of condensed-phase species on the state array.
//!
//! Concentrations of phase species are mass concentrations (µg m⁻³), molecular weights are in
//! kg mol⁻¹. The phase mass is the plain sum of its species, the average molecular weight is
//! `mass / Σ(c_i / MW_i)`.
use crate::error::{PhlexError, PhlexResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AeroPhase {
    pub name: String,
    /// full-state indices of the phase species
    pub species: Vec<usize>,
    /// kg mol⁻¹, one per species
    pub molecular_weight: Vec<f64>,
}

impl AeroPhase {
    pub fn new(name: &str, species: Vec<usize>, molecular_weight: Vec<f64>) -> PhlexResult<Self> {
        let phase = Self {
            name: name.to_string(),
            species,
            molecular_weight,
        };
        phase.validate()?;
        Ok(phase)
    }

    pub fn validate(&self) -> PhlexResult<()> {
        if self.species.is_empty() {
            return Err(PhlexError::InvalidConfiguration(format!(
                "aerosol phase '{}' has no species",
                self.name
            )));
        }
        if self.molecular_weight.len() != self.species.len() {
            return Err(PhlexError::DimensionMismatch {
                what: format!("molecular weights of aerosol phase '{}'", self.name),
                expected: self.species.len(),
                got: self.molecular_weight.len(),
            });
        }
        if let Some(mw) = self.molecular_weight.iter().find(|mw| !(**mw > 0.0)) {
            return Err(PhlexError::InvalidConfiguration(format!(
                "aerosol phase '{}': molecular weight must be positive, got {}",
                self.name, mw
            )));
        }
        Ok(())
    }

    pub fn n_species(&self) -> usize {
        self.species.len()
    }

    pub fn check_indices(&self, n_state_var: usize) -> PhlexResult<()> {
        match self.species.iter().find(|i| **i >= n_state_var) {
            Some(&index) => Err(PhlexError::StateIndexOutOfRange { index, n_state_var }),
            None => Ok(()),
        }
    }

    /// Flag the phase species on a per-state-variable array; returns the number flagged.
    pub fn flag_jac_elements(&self, flags: &mut [bool]) -> PhlexResult<usize> {
        self.check_indices(flags.len())?;
        for &i_spec in &self.species {
            flags[i_spec] = true;
        }
        Ok(self.species.len())
    }

    /// `(mass, average molecular weight)`; the weight is 0 for an empty phase
    pub fn mass_and_mw(&self, state: &[f64]) -> (f64, f64) {
        let (mass, moles) = self.totals(state);
        let mw = if moles > 0.0 { mass / moles } else { 0.0 };
        (mass, mw)
    }

    /// ∂mass/∂c_i, one per phase species
    pub fn mass_partials(&self, partial: &mut [f64]) {
        partial.iter_mut().for_each(|p| *p = 1.0);
    }

    /// ∂MW/∂c_i = (1 − MW / MW_i) / Σ(c_j / MW_j), zero for an empty phase
    pub fn mw_partials(&self, state: &[f64], partial: &mut [f64]) {
        let (mass, moles) = self.totals(state);
        for (p, mw_i) in partial.iter_mut().zip(self.molecular_weight.iter()) {
            *p = if moles > 0.0 {
                (1.0 - mass / moles / mw_i) / moles
            } else {
                0.0
            };
        }
    }

    fn totals(&self, state: &[f64]) -> (f64, f64) {
        self.species
            .iter()
            .zip(self.molecular_weight.iter())
            .fold((0.0, 0.0), |(mass, moles), (&i_spec, mw)| {
                (mass + state[i_spec], moles + state[i_spec] / mw)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn organic() -> AeroPhase {
        AeroPhase::new("organic", vec![1, 3], vec![0.1, 0.3]).unwrap()
    }

    #[test]
    fn test_new_rejects_bad_phases() {
        assert!(AeroPhase::new("empty", vec![], vec![]).is_err());
        assert!(matches!(
            AeroPhase::new("short", vec![0, 1], vec![0.1]),
            Err(PhlexError::DimensionMismatch { .. })
        ));
        assert!(AeroPhase::new("zero mw", vec![0], vec![0.0]).is_err());
    }

    #[test]
    fn test_mass_and_average_weight() {
        let phase = organic();
        let state = [9.0, 2.0, 9.0, 3.0];
        let (mass, mw) = phase.mass_and_mw(&state);
        assert_eq!(mass, 5.0);
        // 5 / (2/0.1 + 3/0.3) = 5 / 30
        assert_relative_eq!(mw, 5.0 / 30.0, max_relative = 1e-12);

        let (mass, mw) = phase.mass_and_mw(&[0.0; 4]);
        assert_eq!((mass, mw), (0.0, 0.0));
    }

    #[test]
    fn test_mw_partials_match_differences() {
        let phase = organic();
        let state = [0.0, 2.0, 0.0, 3.0];
        let mut partial = [0.0; 2];
        phase.mw_partials(&state, &mut partial);
        let h = 1.0e-7;
        for (k, &i_spec) in phase.species.iter().enumerate() {
            let mut plus = state;
            plus[i_spec] += h;
            let mut minus = state;
            minus[i_spec] -= h;
            let fd = (phase.mass_and_mw(&plus).1 - phase.mass_and_mw(&minus).1) / (2.0 * h);
            assert_relative_eq!(partial[k], fd, max_relative = 1e-6);
        }
        let mut mass_partial = [0.0; 2];
        phase.mass_partials(&mut mass_partial);
        assert_eq!(mass_partial, [1.0, 1.0]);
    }

    #[test]
    fn test_flag_jac_elements() {
        let phase = organic();
        let mut flags = [false; 4];
        assert_eq!(phase.flag_jac_elements(&mut flags).unwrap(), 2);
        assert_eq!(flags, [false, true, false, true]);
        let mut short = [false; 2];
        assert!(phase.flag_jac_elements(&mut short).is_err());
    }
}
