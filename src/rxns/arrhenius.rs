//! # Arrhenius reaction
//!
//! Modified Arrhenius rate constant with pressure dependence:
//!
//! ```text
//! k = A · exp(C/T) · (T/D)^B · (1 + E·P) · (conv·P/T)^(n_react − 1)
//! ```
//!
//! `B == 0` and `E == 0` short-circuit to the multiplicative identity. The last factor converts a
//! mechanism written in mixed units into a number-density consistent rate constant.
//!
//! Record layout (byte compatible with the mechanism compiler):
//! - int: `n_react, n_prod, react[..], prod[..], deriv_id[..], jac_id[..]`,
//!   length `2 + (n_react + 2) · (n_react + n_prod)`
//! - float: `A, B, C, D, E, conv, rate_constant, yield[n_prod]`, length `7 + n_prod`
use super::codec::{RecordCursor, RecordWriter};
use super::species::{RxnSpecies, peek_record_bytes};
use super::{ReactionKind, RxnSolver, UpdateData};
use crate::error::PhlexResult;
use crate::jacobian::{JacobianMask, SparsityTemplate};
use crate::state::{EnvState, StateMap};
use serde::{Deserialize, Serialize};

const N_HEADER_INTS: usize = 0;
const N_FLOAT_PARAMS: usize = 7;

/// rate-law parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArrheniusParams {
    #[serde(rename = "A", default = "one")]
    pub a: f64,
    #[serde(rename = "B", default)]
    pub b: f64,
    #[serde(rename = "C", default)]
    pub c: f64,
    #[serde(rename = "D", default = "d_default")]
    pub d: f64,
    #[serde(rename = "E", default)]
    pub e: f64,
}

fn one() -> f64 {
    1.0
}

fn d_default() -> f64 {
    300.0
}

impl Default for ArrheniusParams {
    fn default() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 300.0,
            e: 0.0,
        }
    }
}

impl ArrheniusParams {
    /// rate constant before the reactant-order unit conversion
    pub fn k(&self, env: &EnvState) -> f64 {
        let t = env.temperature;
        let p = env.pressure;
        self.a
            * (self.c / t).exp()
            * if self.b == 0.0 { 1.0 } else { (t / self.d).powf(self.b) }
            * if self.e == 0.0 { 1.0 } else { 1.0 + self.e * p }
    }
}

/// `(conv·P/T)^(n_react − 1)`
pub fn order_conversion(conv: f64, env: &EnvState, n_react: usize) -> f64 {
    let n_pow = n_react as i32 - 1;
    if n_pow == 0 {
        return 1.0;
    }
    (conv * env.pressure / env.temperature).powi(n_pow)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrheniusReaction {
    pub params: ArrheniusParams,
    /// unit conversion factor for the reactant-order term
    pub conv: f64,
    rate_constant: f64,
    species: RxnSpecies,
}

impl ArrheniusReaction {
    pub fn new(params: ArrheniusParams, conv: f64, species: RxnSpecies) -> Self {
        Self {
            params,
            conv,
            rate_constant: 0.0,
            species,
        }
    }

    pub fn decode(cursor: &mut RecordCursor) -> PhlexResult<Self> {
        peek_record_bytes(cursor, N_HEADER_INTS, N_FLOAT_PARAMS)?;
        let n_react = cursor.read_index()?;
        let n_prod = cursor.read_index()?;
        let mut species = RxnSpecies::decode_indices(cursor, n_react, n_prod)?;
        let params = ArrheniusParams {
            a: cursor.read_float()?,
            b: cursor.read_float()?,
            c: cursor.read_float()?,
            d: cursor.read_float()?,
            e: cursor.read_float()?,
        };
        let conv = cursor.read_float()?;
        let rate_constant = cursor.read_float()?;
        species.decode_yields(cursor)?;
        Ok(Self {
            params,
            conv,
            rate_constant,
            species,
        })
    }

    /// advance past one record using its header only
    pub fn skip(cursor: &mut RecordCursor) -> PhlexResult<()> {
        let bytes = peek_record_bytes(cursor, N_HEADER_INTS, N_FLOAT_PARAMS)?;
        cursor.advance(bytes)
    }
}

impl RxnSolver for ArrheniusReaction {
    fn kind(&self) -> ReactionKind {
        ReactionKind::Arrhenius
    }

    fn species(&self) -> &RxnSpecies {
        &self.species
    }

    fn rate_constant(&self) -> f64 {
        self.rate_constant
    }

    fn int_section_len(&self) -> usize {
        self.species.int_section_len(N_HEADER_INTS)
    }

    fn float_section_len(&self) -> usize {
        self.species.float_section_len(N_FLOAT_PARAMS)
    }

    fn flag_jac_elements(&self, state_map: &StateMap, mask: &mut JacobianMask) -> PhlexResult<()> {
        self.species.flag_jac_elements(state_map, mask)
    }

    fn update_ids(&mut self, state_map: &StateMap, template: &SparsityTemplate) -> PhlexResult<()> {
        self.species.update_ids(state_map, template)
    }

    fn update_env_state(&mut self, env: &EnvState) {
        self.rate_constant =
            self.params.k(env) * order_conversion(self.conv, env, self.species.n_react());
    }

    fn calc_deriv_contrib(&self, state: &[f64], deriv: &mut [f64]) {
        self.species
            .calc_deriv_contrib(self.rate_constant, state, deriv);
    }

    fn calc_jac_contrib(&self, state: &[f64], jac: &mut [f64]) {
        self.species.calc_jac_contrib(self.rate_constant, state, jac);
    }

    fn update_data(&mut self, _update: &UpdateData) -> bool {
        false
    }

    fn encode(&self, w: &mut RecordWriter) {
        self.species.encode_counts(w);
        self.species.encode_indices(w);
        let p = &self.params;
        for v in [p.a, p.b, p.c, p.d, p.e, self.conv, self.rate_constant] {
            w.push_float(v);
        }
        self.species.encode_yields(w);
    }

    fn describe(&self) -> String {
        let p = &self.params;
        format!(
            "A={:e} B={} C={} D={} E={} conv={}",
            p.a, p.b, p.c, p.d, p.e, self.conv
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rate_constant_reduces_to_a() {
        let params = ArrheniusParams {
            a: 2.5e-12,
            b: 0.0,
            c: 0.0,
            d: 0.0,
            e: 0.0,
        };
        let species = RxnSpecies::new(vec![0, 1], vec![2], vec![1.0]).unwrap();
        // conv chosen so that conv·P/T = 1
        let env = EnvState::new(250.0, 100000.0);
        let mut rxn = ArrheniusReaction::new(params, 250.0 / 100000.0, species);
        rxn.update_env_state(&env);
        assert_relative_eq!(rxn.rate_constant(), 2.5e-12, max_relative = 1e-14);
    }

    #[test]
    fn test_full_rate_law() {
        let params = ArrheniusParams {
            a: 1.0e-11,
            b: 1.5,
            c: -500.0,
            d: 300.0,
            e: 2.0e-6,
        };
        let species = RxnSpecies::new(vec![0, 1, 2], vec![3], vec![1.0]).unwrap();
        let env = EnvState::new(280.0, 90000.0);
        let conv = 7.243e16;
        let mut rxn = ArrheniusReaction::new(params, conv, species);
        rxn.update_env_state(&env);
        let expected = 1.0e-11
            * (-500.0f64 / 280.0).exp()
            * (280.0f64 / 300.0).powf(1.5)
            * (1.0 + 2.0e-6 * 90000.0)
            * (conv * 90000.0 / 280.0).powi(2);
        assert_relative_eq!(rxn.rate_constant(), expected, max_relative = 1e-12);
    }

    #[test]
    fn test_zero_exponents_short_circuit() {
        // D = 0 would make (T/D)^B undefined; B = 0 must not evaluate it
        let params = ArrheniusParams {
            a: 3.0,
            b: 0.0,
            c: 0.0,
            d: 0.0,
            e: 0.0,
        };
        let env = EnvState::new(300.0, 0.0);
        assert_eq!(params.k(&env), 3.0);
        assert_eq!(order_conversion(0.0, &env, 1), 1.0);
    }

    #[test]
    fn test_record_sizes() {
        let species = RxnSpecies::new(vec![0, 1], vec![2], vec![1.0]).unwrap();
        let rxn = ArrheniusReaction::new(ArrheniusParams::default(), 1.0, species);
        // 2 + (2 + 2) * (2 + 1)
        assert_eq!(rxn.int_section_len(), 14);
        assert_eq!(rxn.float_section_len(), 8);
        assert_eq!(rxn.encoded_len(), 4 + 14 * 4 + 8 * 8);

        let mut w = RecordWriter::new();
        rxn.encode(&mut w);
        assert_eq!(w.len() + 4, rxn.encoded_len());
    }

    #[test]
    fn test_decode_restores_fields() {
        let species = RxnSpecies::new(vec![3], vec![1, 2], vec![0.4, 0.6]).unwrap();
        let mut rxn = ArrheniusReaction::new(
            ArrheniusParams {
                a: 4.0e-3,
                b: -0.5,
                c: 120.0,
                d: 298.0,
                e: 0.0,
            },
            1.0,
            species,
        );
        rxn.update_env_state(&EnvState::default());
        let mut w = RecordWriter::new();
        rxn.encode(&mut w);
        let bytes = w.into_bytes();
        let mut cursor = RecordCursor::new(&bytes);
        let decoded = ArrheniusReaction::decode(&mut cursor).unwrap();
        assert!(cursor.is_at_end());
        assert_eq!(decoded, rxn);

        let mut cursor = RecordCursor::new(&bytes);
        ArrheniusReaction::skip(&mut cursor).unwrap();
        assert_eq!(cursor.position(), bytes.len());
    }
}
