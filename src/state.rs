//! # State variables and environment
//!
//! Every species owns one slot of the full state array. Only species classified as
//! [`VarType::Solved`] are advanced by the integrator; they form the reduced (dependent variable)
//! vector in the same relative order they have on the full state array.
//!
//! [`StateMap`] is the fixed full → reduced index map and performs the two translations done at the
//! start of every derivative/Jacobian evaluation:
//! - `scatter`: reduced vector → full state array (Solved slots only)
//! - `gather`: full state array → reduced vector
use crate::error::{PhlexError, PhlexResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// classification of a state variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarType {
    /// advanced by the integrator
    Solved,
    /// read by reactions, never advanced
    Constant,
    /// pseudo-steady-state approximated, never advanced by this core
    SteadyState,
}

impl VarType {
    /// integer code used by mechanism compilers: 1 variable, 2 constant, 3 PSSA
    pub fn code(&self) -> i32 {
        match self {
            VarType::Solved => 1,
            VarType::Constant => 2,
            VarType::SteadyState => 3,
        }
    }
}

impl TryFrom<i32> for VarType {
    type Error = PhlexError;
    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(VarType::Solved),
            2 => Ok(VarType::Constant),
            3 => Ok(VarType::SteadyState),
            _ => Err(PhlexError::InvalidVarType(code)),
        }
    }
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            VarType::Solved => "solved",
            VarType::Constant => "constant",
            VarType::SteadyState => "steady-state",
        };
        write!(f, "{}", s)
    }
}

/// Fixed map between the full state array and the integrator's reduced vector.
#[derive(Debug, Clone, PartialEq)]
pub struct StateMap {
    var_type: Vec<VarType>,
    full_to_reduced: Vec<Option<usize>>,
    reduced_to_full: Vec<usize>,
}

impl StateMap {
    pub fn new(var_type: Vec<VarType>) -> Self {
        let mut full_to_reduced = Vec::with_capacity(var_type.len());
        let mut reduced_to_full = Vec::new();
        for (i_spec, vt) in var_type.iter().enumerate() {
            if *vt == VarType::Solved {
                full_to_reduced.push(Some(reduced_to_full.len()));
                reduced_to_full.push(i_spec);
            } else {
                full_to_reduced.push(None);
            }
        }
        Self {
            var_type,
            full_to_reduced,
            reduced_to_full,
        }
    }

    /// build the map from the integer classification codes of a mechanism compiler
    pub fn from_codes(codes: &[i32]) -> PhlexResult<Self> {
        let var_type = codes
            .iter()
            .map(|&c| VarType::try_from(c))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(var_type))
    }

    pub fn n_state_var(&self) -> usize {
        self.var_type.len()
    }

    pub fn n_dep_var(&self) -> usize {
        self.reduced_to_full.len()
    }

    pub fn var_types(&self) -> &[VarType] {
        &self.var_type
    }

    pub fn var_type(&self, i_spec: usize) -> Option<VarType> {
        self.var_type.get(i_spec).copied()
    }

    /// reduced index of a full-state index, `None` for non-solved or out-of-range variables
    pub fn reduced_index(&self, i_spec: usize) -> Option<usize> {
        self.full_to_reduced.get(i_spec).copied().flatten()
    }

    pub fn full_index(&self, i_dep_var: usize) -> Option<usize> {
        self.reduced_to_full.get(i_dep_var).copied()
    }

    /// reduced vector → full state array, writing only Solved slots
    pub fn scatter(&self, y: &[f64], state: &mut [f64]) -> PhlexResult<()> {
        self.check_lengths(y.len(), state.len())?;
        for (i_dep_var, &i_spec) in self.reduced_to_full.iter().enumerate() {
            state[i_spec] = y[i_dep_var];
        }
        Ok(())
    }

    /// full state array → reduced vector
    pub fn gather(&self, state: &[f64], y: &mut [f64]) -> PhlexResult<()> {
        self.check_lengths(y.len(), state.len())?;
        for (i_dep_var, &i_spec) in self.reduced_to_full.iter().enumerate() {
            y[i_dep_var] = state[i_spec];
        }
        Ok(())
    }

    /// pick the Solved entries of a per-species array (e.g. absolute tolerances)
    pub fn reduce<T: Copy>(&self, full: &[T]) -> PhlexResult<Vec<T>> {
        if full.len() != self.n_state_var() {
            return Err(PhlexError::DimensionMismatch {
                what: "per-species array".to_string(),
                expected: self.n_state_var(),
                got: full.len(),
            });
        }
        Ok(self.reduced_to_full.iter().map(|&i| full[i]).collect())
    }

    fn check_lengths(&self, y_len: usize, state_len: usize) -> PhlexResult<()> {
        if y_len != self.n_dep_var() {
            return Err(PhlexError::DimensionMismatch {
                what: "reduced state vector".to_string(),
                expected: self.n_dep_var(),
                got: y_len,
            });
        }
        if state_len != self.n_state_var() {
            return Err(PhlexError::DimensionMismatch {
                what: "full state array".to_string(),
                expected: self.n_state_var(),
                got: state_len,
            });
        }
        Ok(())
    }
}

/// Environmental conditions of a grid cell.
///
/// Wire layout of the environment array: `[temperature (K), pressure (Pa), ...]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvState {
    #[serde(rename = "temperature_K")]
    pub temperature: f64,
    #[serde(rename = "pressure_Pa")]
    pub pressure: f64,
}

impl Default for EnvState {
    fn default() -> Self {
        Self {
            temperature: 298.15,
            pressure: 101325.0,
        }
    }
}

impl EnvState {
    pub fn new(temperature: f64, pressure: f64) -> Self {
        Self {
            temperature,
            pressure,
        }
    }

    pub fn from_slice(env: &[f64]) -> PhlexResult<Self> {
        if env.len() < 2 {
            return Err(PhlexError::DimensionMismatch {
                what: "environment array".to_string(),
                expected: 2,
                got: env.len(),
            });
        }
        let env_state = Self::new(env[0], env[1]);
        env_state.validate()?;
        Ok(env_state)
    }

    pub fn validate(&self) -> PhlexResult<()> {
        if !(self.temperature > 0.0) {
            return Err(PhlexError::InvalidConfiguration(format!(
                "temperature must be positive, got {}",
                self.temperature
            )));
        }
        if !(self.pressure >= 0.0) {
            return Err(PhlexError::InvalidConfiguration(format!(
                "pressure must be non-negative, got {}",
                self.pressure
            )));
        }
        Ok(())
    }

    pub fn as_array(&self) -> [f64; 2] {
        [self.temperature, self.pressure]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_classifications(n: usize) -> Vec<Vec<VarType>> {
        let kinds = [VarType::Solved, VarType::Constant, VarType::SteadyState];
        let mut out = vec![Vec::new()];
        for _ in 0..n {
            out = out
                .into_iter()
                .flat_map(|v| {
                    kinds.iter().map(move |k| {
                        let mut v = v.clone();
                        v.push(*k);
                        v
                    })
                })
                .collect();
        }
        out
    }

    #[test]
    fn test_reduced_index_is_increasing_injection() {
        let map = StateMap::new(vec![
            VarType::Constant,
            VarType::Solved,
            VarType::SteadyState,
            VarType::Solved,
            VarType::Solved,
        ]);
        assert_eq!(map.n_state_var(), 5);
        assert_eq!(map.n_dep_var(), 3);
        assert_eq!(map.reduced_index(0), None);
        assert_eq!(map.reduced_index(1), Some(0));
        assert_eq!(map.reduced_index(2), None);
        assert_eq!(map.reduced_index(3), Some(1));
        assert_eq!(map.reduced_index(4), Some(2));
        assert_eq!(map.reduced_index(17), None);
        assert_eq!(map.full_index(2), Some(4));
    }

    #[test]
    fn test_scatter_then_gather_is_identity_on_solved_slots() {
        for var_type in all_classifications(5) {
            let map = StateMap::new(var_type.clone());
            let before: Vec<f64> = (0..5).map(|i| 1.0 + i as f64 * 0.25).collect();
            let mut y = vec![0.0; map.n_dep_var()];
            map.gather(&before, &mut y).unwrap();

            let mut state = vec![-7.0; 5];
            map.scatter(&y, &mut state).unwrap();
            for (i, vt) in var_type.iter().enumerate() {
                if *vt == VarType::Solved {
                    assert_eq!(state[i], before[i]);
                } else {
                    // untouched
                    assert_eq!(state[i], -7.0);
                }
            }
            let mut y2 = vec![0.0; map.n_dep_var()];
            map.gather(&state, &mut y2).unwrap();
            assert_eq!(y, y2);
        }
    }

    #[test]
    fn test_scatter_rejects_wrong_lengths() {
        let map = StateMap::new(vec![VarType::Solved, VarType::Constant]);
        let mut state = vec![0.0; 2];
        let err = map.scatter(&[1.0, 2.0], &mut state).unwrap_err();
        assert!(matches!(err, PhlexError::DimensionMismatch { .. }));
        let mut y = vec![0.0; 1];
        assert!(map.gather(&[1.0], &mut y).is_err());
    }

    #[test]
    fn test_var_type_codes() {
        let map = StateMap::from_codes(&[1, 2, 3, 1]).unwrap();
        assert_eq!(map.n_dep_var(), 2);
        assert_eq!(map.var_type(2), Some(VarType::SteadyState));
        assert!(matches!(
            StateMap::from_codes(&[1, 0]),
            Err(PhlexError::InvalidVarType(0))
        ));
        for vt in [VarType::Solved, VarType::Constant, VarType::SteadyState] {
            assert_eq!(VarType::try_from(vt.code()).unwrap(), vt);
        }
    }

    #[test]
    fn test_reduce_per_species_array() {
        let map = StateMap::new(vec![VarType::Solved, VarType::Constant, VarType::Solved]);
        assert_eq!(map.reduce(&[1e-12, 1e-3, 1e-9]).unwrap(), vec![1e-12, 1e-9]);
        assert!(map.reduce(&[1e-12]).is_err());
    }

    #[test]
    fn test_env_state_from_slice() {
        let env = EnvState::from_slice(&[298.0, 101325.0, 0.5]).unwrap();
        assert_eq!(env.temperature, 298.0);
        assert_eq!(env.pressure, 101325.0);
        assert!(EnvState::from_slice(&[298.0]).is_err());
        assert!(EnvState::from_slice(&[0.0, 1.0]).is_err());
        assert!(EnvState::from_slice(&[f64::NAN, 1.0]).is_err());
    }
}
