//! Reactant/product section shared by every reaction kind.
//!
//! Integer layout inside a record (after any kind specific header fields):
//! `react[n_react], prod[n_prod], deriv_id[n_react + n_prod], jac_id[n_react * (n_react + n_prod)]`.
//! The two counts themselves are the first two integers of every record. Yields close the
//! floating point section.
//!
//! Jacobian ids are ordered dependent-major: reactant rows first, then product rows, and within
//! each row one entry per reactant (the independent variable).
use super::codec::{RecordCursor, RecordWriter, record_bytes};
use crate::error::{PhlexError, PhlexResult};
use crate::jacobian::{JacobianMask, SparsityTemplate};
use crate::state::StateMap;

/// number of leading integers holding the two counts
pub const N_COUNT_INTS: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct RxnSpecies {
    /// full-state indices of reactants (repeated for higher stoichiometry, e.g. `2A`)
    pub react: Vec<usize>,
    /// full-state indices of products
    pub prod: Vec<usize>,
    /// one per product
    pub yields: Vec<f64>,
    deriv_ids: Vec<Option<usize>>,
    jac_ids: Vec<Option<usize>>,
}

impl RxnSpecies {
    pub fn new(react: Vec<usize>, prod: Vec<usize>, yields: Vec<f64>) -> PhlexResult<Self> {
        if react.is_empty() {
            return Err(PhlexError::InvalidConfiguration(
                "a reaction needs at least one reactant".to_string(),
            ));
        }
        if yields.len() != prod.len() {
            return Err(PhlexError::DimensionMismatch {
                what: "product yields".to_string(),
                expected: prod.len(),
                got: yields.len(),
            });
        }
        let n_out = react.len() + prod.len();
        let n_jac = react.len() * n_out;
        Ok(Self {
            react,
            prod,
            yields,
            deriv_ids: vec![None; n_out],
            jac_ids: vec![None; n_jac],
        })
    }

    pub fn n_react(&self) -> usize {
        self.react.len()
    }

    pub fn n_prod(&self) -> usize {
        self.prod.len()
    }

    pub fn deriv_ids(&self) -> &[Option<usize>] {
        &self.deriv_ids
    }

    pub fn jac_ids(&self) -> &[Option<usize>] {
        &self.jac_ids
    }

    /// integer section length given the number of kind specific header ints
    pub fn int_section_len(&self, n_header_ints: usize) -> usize {
        N_COUNT_INTS
            + n_header_ints
            + self.react.len()
            + self.prod.len()
            + self.deriv_ids.len()
            + self.jac_ids.len()
    }

    /// floating point section length given the number of kind specific parameters
    pub fn float_section_len(&self, n_float_params: usize) -> usize {
        n_float_params + self.n_prod()
    }

    /// reactants then products, the order derivative slots are recorded in
    fn outputs(&self) -> impl Iterator<Item = usize> + '_ {
        self.react.iter().chain(self.prod.iter()).copied()
    }

    pub fn check_indices(&self, n_state_var: usize) -> PhlexResult<()> {
        for index in self.outputs() {
            if index >= n_state_var {
                return Err(PhlexError::StateIndexOutOfRange { index, n_state_var });
            }
        }
        Ok(())
    }

    /// Flag every (dependent, independent) pair among (reactants ∪ products) × reactants whose
    /// variables are both solved.
    pub fn flag_jac_elements(&self, state_map: &StateMap, mask: &mut JacobianMask) -> PhlexResult<()> {
        for dep in self.outputs() {
            let Some(row) = state_map.reduced_index(dep) else {
                continue;
            };
            for &ind in &self.react {
                if let Some(col) = state_map.reduced_index(ind) {
                    mask.set(row, col)?;
                }
            }
        }
        Ok(())
    }

    /// Store derivative slots and Jacobian offsets for the published template.
    pub fn update_ids(&mut self, state_map: &StateMap, template: &SparsityTemplate) -> PhlexResult<()> {
        self.check_indices(state_map.n_state_var())?;
        let deriv_ids: Vec<Option<usize>> =
            self.outputs().map(|i| state_map.reduced_index(i)).collect();
        let mut jac_ids = Vec::with_capacity(self.jac_ids.len());
        for row in &deriv_ids {
            for &ind in &self.react {
                let id = match (row, state_map.reduced_index(ind)) {
                    (Some(row), Some(col)) => Some(template.offset(*row, col).ok_or_else(|| {
                        PhlexError::SparsityMismatch(format!(
                            "element ({}, {}) was not declared in the Jacobian template",
                            row, col
                        ))
                    })?),
                    _ => None,
                };
                jac_ids.push(id);
            }
        }
        self.deriv_ids = deriv_ids;
        self.jac_ids = jac_ids;
        Ok(())
    }

    /// `k · Π reactant concentrations`
    pub fn rate(&self, rate_constant: f64, state: &[f64]) -> f64 {
        self.react
            .iter()
            .fold(rate_constant, |rate, &i_spec| rate * state[i_spec])
    }

    /// ∂rate/∂c for the reactant at position `i_ind`, as the product of every other factor.
    /// Exact for a zero concentration, where `rate / c` would be 0/0.
    fn partial_rate(&self, rate_constant: f64, state: &[f64], i_ind: usize) -> f64 {
        self.react
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != i_ind)
            .fold(rate_constant, |p, (_, &i_spec)| p * state[i_spec])
    }

    pub fn calc_deriv_contrib(&self, rate_constant: f64, state: &[f64], deriv: &mut [f64]) {
        let rate = self.rate(rate_constant, state);
        if rate == 0.0 {
            return;
        }
        let n_react = self.n_react();
        for (i_out, id) in self.deriv_ids.iter().enumerate() {
            let Some(id) = id else { continue };
            if i_out < n_react {
                deriv[*id] -= rate;
            } else {
                deriv[*id] += rate * self.yields[i_out - n_react];
            }
        }
    }

    pub fn calc_jac_contrib(&self, rate_constant: f64, state: &[f64], jac: &mut [f64]) {
        if rate_constant == 0.0 {
            return;
        }
        let n_react = self.n_react();
        for i_ind in 0..n_react {
            let partial = self.partial_rate(rate_constant, state, i_ind);
            if partial == 0.0 {
                continue;
            }
            for i_dep in 0..self.deriv_ids.len() {
                let Some(id) = self.jac_ids[i_dep * n_react + i_ind] else {
                    continue;
                };
                let scale = if i_dep < n_react {
                    -1.0
                } else {
                    self.yields[i_dep - n_react]
                };
                jac[id] += scale * partial;
            }
        }
    }

    pub fn encode_counts(&self, w: &mut RecordWriter) {
        w.push_index(self.n_react());
        w.push_index(self.n_prod());
    }

    pub fn encode_indices(&self, w: &mut RecordWriter) {
        self.react.iter().for_each(|i| w.push_index(*i));
        self.prod.iter().for_each(|i| w.push_index(*i));
        self.deriv_ids.iter().for_each(|i| w.push_opt_index(*i));
        self.jac_ids.iter().for_each(|i| w.push_opt_index(*i));
    }

    pub fn encode_yields(&self, w: &mut RecordWriter) {
        self.yields.iter().for_each(|y| w.push_float(*y));
    }

    /// Read the index block; yields are filled in later by [`RxnSpecies::decode_yields`].
    pub fn decode_indices(cursor: &mut RecordCursor, n_react: usize, n_prod: usize) -> PhlexResult<Self> {
        if n_react == 0 {
            return Err(malformed(cursor, "record without reactants".to_string()));
        }
        let n_out = n_react
            .checked_add(n_prod)
            .ok_or_else(|| malformed(cursor, "species counts overflow".to_string()))?;
        let n_jac = n_react
            .checked_mul(n_out)
            .ok_or_else(|| malformed(cursor, "species counts overflow".to_string()))?;
        let react = (0..n_react)
            .map(|_| cursor.read_index())
            .collect::<PhlexResult<Vec<_>>>()?;
        let prod = (0..n_prod)
            .map(|_| cursor.read_index())
            .collect::<PhlexResult<Vec<_>>>()?;
        let deriv_ids = (0..n_out)
            .map(|_| cursor.read_opt_index())
            .collect::<PhlexResult<Vec<_>>>()?;
        let jac_ids = (0..n_jac)
            .map(|_| cursor.read_opt_index())
            .collect::<PhlexResult<Vec<_>>>()?;
        Ok(Self {
            react,
            prod,
            yields: Vec::new(),
            deriv_ids,
            jac_ids,
        })
    }

    pub fn decode_yields(&mut self, cursor: &mut RecordCursor) -> PhlexResult<()> {
        self.yields = (0..self.n_prod())
            .map(|_| cursor.read_float())
            .collect::<PhlexResult<Vec<_>>>()?;
        Ok(())
    }
}

fn malformed(cursor: &RecordCursor, reason: String) -> PhlexError {
    PhlexError::MalformedRecord {
        offset: cursor.position(),
        reason,
    }
}

/// `2 + n_header_ints + (n_react + 2) · (n_react + n_prod)`, `None` on overflow
pub fn int_section_len(n_react: usize, n_prod: usize, n_header_ints: usize) -> Option<usize> {
    let n_out = n_react.checked_add(n_prod)?;
    (n_react.checked_add(2)?)
        .checked_mul(n_out)?
        .checked_add(N_COUNT_INTS + n_header_ints)
}

/// Byte length of the record starting at `cursor`, read from its two count fields only.
/// Fails if the counts are unusable or the buffer does not hold the whole record.
pub fn peek_record_bytes(
    cursor: &RecordCursor,
    n_header_ints: usize,
    n_float_params: usize,
) -> PhlexResult<usize> {
    let n_react = cursor.peek_count(0)?;
    let n_prod = cursor.peek_count(1)?;
    if n_react == 0 {
        return Err(malformed(cursor, "record without reactants".to_string()));
    }
    let bytes = int_section_len(n_react, n_prod, n_header_ints)
        .zip(n_prod.checked_add(n_float_params))
        .and_then(|(n_int, n_float)| record_bytes(n_int, n_float))
        .ok_or_else(|| {
            malformed(
                cursor,
                format!("{} reactants and {} products overflow the record size", n_react, n_prod),
            )
        })?;
    cursor.require(bytes)?;
    Ok(bytes)
}
