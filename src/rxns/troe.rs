//! # Troe fall-off reaction
//!
//! Pressure fall-off between a low-pressure limit `k0` and a high-pressure limit `kinf`,
//! both in the modified Arrhenius form referenced to 300 K:
//!
//! ```text
//! M    = conv · P / T
//! k0   = k0_A · exp(k0_C/T) · (T/300)^k0_B
//! kinf = kinf_A · exp(kinf_C/T) · (T/300)^kinf_B
//! k    = k0·M / (1 + k0·M/kinf) · Fc^(1 / (1 + (log10(k0·M/kinf) / N)^2)) · M^(n_react − 1)
//! ```
//!
//! Record layout: int as for Arrhenius; float
//! `k0_A, k0_B, k0_C, kinf_A, kinf_B, kinf_C, Fc, N, conv, rate_constant, yield[n_prod]`.
use super::arrhenius::order_conversion;
use super::codec::{RecordCursor, RecordWriter};
use super::species::{RxnSpecies, peek_record_bytes};
use super::{ReactionKind, RxnSolver, UpdateData};
use crate::error::PhlexResult;
use crate::jacobian::{JacobianMask, SparsityTemplate};
use crate::state::{EnvState, StateMap};
use serde::{Deserialize, Serialize};

const N_HEADER_INTS: usize = 0;
const N_FLOAT_PARAMS: usize = 10;
const T_REF: f64 = 300.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TroeParams {
    #[serde(default = "one")]
    pub k0_a: f64,
    #[serde(default)]
    pub k0_b: f64,
    #[serde(default)]
    pub k0_c: f64,
    #[serde(default = "one")]
    pub kinf_a: f64,
    #[serde(default)]
    pub kinf_b: f64,
    #[serde(default)]
    pub kinf_c: f64,
    #[serde(rename = "Fc", default = "fc_default")]
    pub fc: f64,
    #[serde(rename = "N", default = "one")]
    pub n: f64,
}

fn one() -> f64 {
    1.0
}

fn fc_default() -> f64 {
    0.6
}

impl Default for TroeParams {
    fn default() -> Self {
        Self {
            k0_a: 1.0,
            k0_b: 0.0,
            k0_c: 0.0,
            kinf_a: 1.0,
            kinf_b: 0.0,
            kinf_c: 0.0,
            fc: 0.6,
            n: 1.0,
        }
    }
}

fn limit(a: f64, b: f64, c: f64, t: f64) -> f64 {
    a * (c / t).exp() * if b == 0.0 { 1.0 } else { (t / T_REF).powf(b) }
}

impl TroeParams {
    /// fall-off rate constant for third-body number density `m`
    pub fn k(&self, t: f64, m: f64) -> f64 {
        let k0_m = limit(self.k0_a, self.k0_b, self.k0_c, t) * m;
        let kinf = limit(self.kinf_a, self.kinf_b, self.kinf_c, t);
        if k0_m == 0.0 || kinf == 0.0 {
            return 0.0;
        }
        let pr = k0_m / kinf;
        let broadening = 1.0 / (1.0 + (pr.log10() / self.n).powi(2));
        k0_m / (1.0 + pr) * self.fc.powf(broadening)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TroeReaction {
    pub params: TroeParams,
    pub conv: f64,
    rate_constant: f64,
    species: RxnSpecies,
}

impl TroeReaction {
    pub fn new(params: TroeParams, conv: f64, species: RxnSpecies) -> Self {
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
        let params = TroeParams {
            k0_a: cursor.read_float()?,
            k0_b: cursor.read_float()?,
            k0_c: cursor.read_float()?,
            kinf_a: cursor.read_float()?,
            kinf_b: cursor.read_float()?,
            kinf_c: cursor.read_float()?,
            fc: cursor.read_float()?,
            n: cursor.read_float()?,
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

    pub fn skip(cursor: &mut RecordCursor) -> PhlexResult<()> {
        let bytes = peek_record_bytes(cursor, N_HEADER_INTS, N_FLOAT_PARAMS)?;
        cursor.advance(bytes)
    }
}

impl RxnSolver for TroeReaction {
    fn kind(&self) -> ReactionKind {
        ReactionKind::Troe
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
        let m = self.conv * env.pressure / env.temperature;
        self.rate_constant = self.params.k(env.temperature, m)
            * order_conversion(self.conv, env, self.species.n_react());
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
        for v in [
            p.k0_a,
            p.k0_b,
            p.k0_c,
            p.kinf_a,
            p.kinf_b,
            p.kinf_c,
            p.fc,
            p.n,
            self.conv,
            self.rate_constant,
        ] {
            w.push_float(v);
        }
        self.species.encode_yields(w);
    }

    fn describe(&self) -> String {
        let p = &self.params;
        format!(
            "k0_A={:e} k0_B={} k0_C={} kinf_A={:e} kinf_B={} kinf_C={} Fc={} N={}",
            p.k0_a, p.k0_b, p.k0_c, p.kinf_a, p.kinf_b, p.kinf_c, p.fc, p.n
        )
    }
}
