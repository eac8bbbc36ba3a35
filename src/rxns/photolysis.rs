//! # Photolysis reaction
//!
//! `k = scaling · base_rate`. The base photolysis rate (s⁻¹) comes from a radiation model outside
//! this crate and is pushed in through [`UpdateData::PhotolysisRate`], matched on `photo_id`.
//! An id of 0 means the reaction was never registered and ignores every update.
//!
//! Record layout: int `n_react, n_prod, photo_id, react[..], prod[..], deriv_id[..], jac_id[..]`;
//! float `base_rate, scaling, rate_constant, yield[n_prod]`.
use super::codec::{RecordCursor, RecordWriter};
use super::species::{RxnSpecies, peek_record_bytes};
use super::{ReactionKind, RxnSolver, UpdateData};
use crate::error::PhlexResult;
use crate::jacobian::{JacobianMask, SparsityTemplate};
use crate::state::{EnvState, StateMap};

const N_HEADER_INTS: usize = 1;
const N_FLOAT_PARAMS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct PhotolysisReaction {
    pub photo_id: i32,
    pub base_rate: f64,
    pub scaling: f64,
    rate_constant: f64,
    species: RxnSpecies,
}

impl PhotolysisReaction {
    pub fn new(photo_id: i32, scaling: f64, species: RxnSpecies) -> Self {
        Self {
            photo_id,
            base_rate: 0.0,
            scaling,
            rate_constant: 0.0,
            species,
        }
    }

    pub fn decode(cursor: &mut RecordCursor) -> PhlexResult<Self> {
        peek_record_bytes(cursor, N_HEADER_INTS, N_FLOAT_PARAMS)?;
        let n_react = cursor.read_index()?;
        let n_prod = cursor.read_index()?;
        let photo_id = cursor.read_int()?;
        let mut species = RxnSpecies::decode_indices(cursor, n_react, n_prod)?;
        let base_rate = cursor.read_float()?;
        let scaling = cursor.read_float()?;
        let rate_constant = cursor.read_float()?;
        species.decode_yields(cursor)?;
        Ok(Self {
            photo_id,
            base_rate,
            scaling,
            rate_constant,
            species,
        })
    }

    pub fn skip(cursor: &mut RecordCursor) -> PhlexResult<()> {
        let bytes = peek_record_bytes(cursor, N_HEADER_INTS, N_FLOAT_PARAMS)?;
        cursor.advance(bytes)
    }
}

impl RxnSolver for PhotolysisReaction {
    fn kind(&self) -> ReactionKind {
        ReactionKind::Photolysis
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

    fn update_env_state(&mut self, _env: &EnvState) {
        self.rate_constant = self.scaling * self.base_rate;
    }

    fn calc_deriv_contrib(&self, state: &[f64], deriv: &mut [f64]) {
        self.species
            .calc_deriv_contrib(self.rate_constant, state, deriv);
    }

    fn calc_jac_contrib(&self, state: &[f64], jac: &mut [f64]) {
        self.species.calc_jac_contrib(self.rate_constant, state, jac);
    }

    fn update_data(&mut self, update: &UpdateData) -> bool {
        match update {
            UpdateData::PhotolysisRate {
                photo_id,
                base_rate,
            } if *photo_id == self.photo_id && self.photo_id != 0 => {
                self.base_rate = *base_rate;
                true
            }
            _ => false,
        }
    }

    fn encode(&self, w: &mut RecordWriter) {
        self.species.encode_counts(w);
        w.push_int(self.photo_id);
        self.species.encode_indices(w);
        w.push_float(self.base_rate);
        w.push_float(self.scaling);
        w.push_float(self.rate_constant);
        self.species.encode_yields(w);
    }

    fn describe(&self) -> String {
        format!(
            "photo_id={} base_rate={:e} scaling={}",
            self.photo_id, self.base_rate, self.scaling
        )
    }
}
