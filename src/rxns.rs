//! # Reactions and their dispatch
//!
//! A mechanism holds reactions of different kinetic kinds in one contiguous arena
//! (`Vec<Reaction>`) and processes them uniformly. Every kind implements [`RxnSolver`]; the
//! [`Reaction`] enum forwards each operation to the concrete kind through `enum_dispatch`, so the
//! generic walks in [`Mechanism`] never look inside a record. A new kind is a new variant plus an
//! `RxnSolver` impl and a match arm in the wire decoder.
//!
//! The packed wire form (see [`codec`]) is decoded into the arena once, at construction. Walking
//! the wire buffer with `skip` only (no decoding) is available to verify record boundaries.
pub mod arrhenius;
pub mod codec;
pub mod photolysis;
pub mod species;
pub mod troe;

#[cfg(test)]
mod rxns_tests;

use crate::error::{PhlexError, PhlexResult};
use crate::jacobian::{JacobianMask, SparsityTemplate};
use crate::state::{EnvState, StateMap};
use arrhenius::ArrheniusReaction;
use codec::{FLOAT_SIZE, INT_SIZE, RecordCursor, RecordWriter};
pub use codec::ReactionKind;
use enum_dispatch::enum_dispatch;
use log::{debug, info};
use photolysis::PhotolysisReaction;
use prettytable::{Cell, Row, Table};
use species::RxnSpecies;
use troe::TroeReaction;

/// Data pushed into reactions and aerosol representations from outside the solver between runs.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateData {
    /// new base photolysis rate (s⁻¹) for reactions registered under `photo_id`
    PhotolysisRate { photo_id: i32, base_rate: f64 },
    /// new particle radius (m) for aerosol representations registered under `aero_rep_id`
    AeroRepRadius { aero_rep_id: i32, radius: f64 },
    /// new particle number concentration (# cm⁻³) for representations under `aero_rep_id`
    AeroRepNumber { aero_rep_id: i32, number_conc: f64 },
}

/// Operations every reaction kind provides.
#[enum_dispatch]
pub trait RxnSolver {
    fn kind(&self) -> ReactionKind;
    fn species(&self) -> &RxnSpecies;
    /// last value computed by `update_env_state`
    fn rate_constant(&self) -> f64;
    /// number of `i32` in the record's integer section
    fn int_section_len(&self) -> usize;
    /// number of `f64` in the record's floating point section
    fn float_section_len(&self) -> usize;
    /// wire size including the kind tag
    fn encoded_len(&self) -> usize {
        INT_SIZE + self.int_section_len() * INT_SIZE + self.float_section_len() * FLOAT_SIZE
    }
    /// declare-sparsity
    fn flag_jac_elements(&self, state_map: &StateMap, mask: &mut JacobianMask) -> PhlexResult<()>;
    /// receive derivative slots and Jacobian offsets once the template exists
    fn update_ids(&mut self, state_map: &StateMap, template: &SparsityTemplate) -> PhlexResult<()>;
    /// refresh-for-environment
    fn update_env_state(&mut self, env: &EnvState);
    fn calc_deriv_contrib(&self, state: &[f64], deriv: &mut [f64]);
    /// `jac` is the value array laid out by the sparsity template
    fn calc_jac_contrib(&self, state: &[f64], jac: &mut [f64]);
    /// returns true if the update was meant for this reaction
    fn update_data(&mut self, update: &UpdateData) -> bool;
    /// integer then floating point section, without the kind tag
    fn encode(&self, w: &mut RecordWriter);
    fn describe(&self) -> String;
}

#[derive(Debug, Clone, PartialEq)]
#[enum_dispatch(RxnSolver)]
pub enum Reaction {
    Arrhenius(ArrheniusReaction),
    Troe(TroeReaction),
    Photolysis(PhotolysisReaction),
}

/// decode one record whose kind tag has already been read
pub fn decode_reaction(kind: ReactionKind, cursor: &mut RecordCursor) -> PhlexResult<Reaction> {
    Ok(match kind {
        ReactionKind::Arrhenius => ArrheniusReaction::decode(cursor)?.into(),
        ReactionKind::Troe => TroeReaction::decode(cursor)?.into(),
        ReactionKind::Photolysis => PhotolysisReaction::decode(cursor)?.into(),
    })
}

/// advance past one record whose kind tag has already been read
pub fn skip_reaction(kind: ReactionKind, cursor: &mut RecordCursor) -> PhlexResult<()> {
    match kind {
        ReactionKind::Arrhenius => ArrheniusReaction::skip(cursor),
        ReactionKind::Troe => TroeReaction::skip(cursor),
        ReactionKind::Photolysis => PhotolysisReaction::skip(cursor),
    }
}

/// The reaction arena. Order is fixed at construction and is the order of every walk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mechanism {
    reactions: Vec<Reaction>,
}

impl Mechanism {
    pub fn new() -> Self {
        Self {
            reactions: Vec::new(),
        }
    }

    pub fn from_reactions(reactions: Vec<Reaction>) -> Self {
        Self { reactions }
    }

    pub fn push(&mut self, reaction: impl Into<Reaction>) {
        self.reactions.push(reaction.into());
    }

    pub fn len(&self) -> usize {
        self.reactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reactions.is_empty()
    }

    pub fn reactions(&self) -> &[Reaction] {
        &self.reactions
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Reaction> {
        self.reactions.iter()
    }

    /// every state index referenced by a reaction must exist
    pub fn check_indices(&self, n_state_var: usize) -> PhlexResult<()> {
        for rxn in &self.reactions {
            rxn.species().check_indices(n_state_var)?;
        }
        Ok(())
    }

    pub fn encoded_len(&self) -> usize {
        INT_SIZE + self.reactions.iter().map(|r| r.encoded_len()).sum::<usize>()
    }

    /// `[n_rxn] ([kind] [record])*`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = RecordWriter::with_capacity(self.encoded_len());
        w.push_index(self.reactions.len());
        for rxn in &self.reactions {
            w.push_int(rxn.kind().code());
            rxn.encode(&mut w);
        }
        w.into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> PhlexResult<Self> {
        let mut cursor = RecordCursor::new(bytes);
        let n_rxn = cursor.peek_count(0)?;
        cursor.advance(INT_SIZE)?;
        let mut reactions = Vec::with_capacity(n_rxn.min(bytes.len() / INT_SIZE));
        for _ in 0..n_rxn {
            let kind = ReactionKind::try_from(cursor.read_int()?)?;
            reactions.push(decode_reaction(kind, &mut cursor)?);
        }
        check_trailing(&cursor, n_rxn)?;
        info!(
            "decoded mechanism: {} reactions, {} bytes",
            n_rxn,
            bytes.len()
        );
        Ok(Self { reactions })
    }

    /// Byte length of every record (kind tag included) found by skipping through the buffer.
    pub fn record_lengths(bytes: &[u8]) -> PhlexResult<Vec<usize>> {
        let mut cursor = RecordCursor::new(bytes);
        let n_rxn = cursor.peek_count(0)?;
        cursor.advance(INT_SIZE)?;
        let mut lengths = Vec::with_capacity(n_rxn.min(bytes.len() / INT_SIZE));
        for _ in 0..n_rxn {
            let start = cursor.position();
            let kind = ReactionKind::try_from(cursor.read_int()?)?;
            skip_reaction(kind, &mut cursor)?;
            lengths.push(cursor.position() - start);
        }
        check_trailing(&cursor, n_rxn)?;
        Ok(lengths)
    }

    pub fn flag_jac_elements(&self, state_map: &StateMap, mask: &mut JacobianMask) -> PhlexResult<()> {
        for rxn in &self.reactions {
            rxn.flag_jac_elements(state_map, mask)?;
        }
        Ok(())
    }

    pub fn update_ids(&mut self, state_map: &StateMap, template: &SparsityTemplate) -> PhlexResult<()> {
        for rxn in &mut self.reactions {
            rxn.update_ids(state_map, template)?;
        }
        Ok(())
    }

    pub fn update_env_state(&mut self, env: &EnvState) {
        for rxn in &mut self.reactions {
            rxn.update_env_state(env);
        }
        debug!(
            "rate constants refreshed for T = {} K, P = {} Pa",
            env.temperature, env.pressure
        );
    }

    pub fn calc_deriv(&self, state: &[f64], deriv: &mut [f64]) {
        for rxn in &self.reactions {
            rxn.calc_deriv_contrib(state, deriv);
        }
    }

    pub fn calc_jac(&self, state: &[f64], jac: &mut [f64]) {
        for rxn in &self.reactions {
            rxn.calc_jac_contrib(state, jac);
        }
    }

    /// number of reactions that accepted the update
    pub fn update_data(&mut self, update: &UpdateData) -> usize {
        self.reactions
            .iter_mut()
            .map(|rxn| rxn.update_data(update))
            .filter(|applied| *applied)
            .count()
    }

    pub fn pretty_print(&self, species_names: Option<&[String]>) {
        self.table(species_names).printstd();
    }

    pub fn table(&self, species_names: Option<&[String]>) -> Table {
        let name = |i: usize| -> String {
            species_names
                .and_then(|names| names.get(i).cloned())
                .unwrap_or_else(|| format!("#{}", i))
        };
        let mut table = Table::new();
        table.add_row(Row::new(vec![
            Cell::new("#"),
            Cell::new("kind"),
            Cell::new("reactants"),
            Cell::new("products"),
            Cell::new("k"),
            Cell::new("parameters"),
        ]));
        for (i, rxn) in self.reactions.iter().enumerate() {
            let sp = rxn.species();
            let reactants: Vec<String> = sp.react.iter().map(|i| name(*i)).collect();
            let products: Vec<String> = sp
                .prod
                .iter()
                .zip(sp.yields.iter())
                .map(|(i, y)| {
                    if *y == 1.0 {
                        name(*i)
                    } else {
                        format!("{}*{}", y, name(*i))
                    }
                })
                .collect();
            table.add_row(Row::new(vec![
                Cell::new(&i.to_string()),
                Cell::new(rxn.kind().name()),
                Cell::new(&reactants.join(" + ")),
                Cell::new(&products.join(" + ")),
                Cell::new(&format!("{:e}", rxn.rate_constant())),
                Cell::new(&rxn.describe()),
            ]));
        }
        table
    }
}

fn check_trailing(cursor: &RecordCursor, n_rxn: usize) -> PhlexResult<()> {
    if !cursor.is_at_end() {
        return Err(PhlexError::TrailingBytes {
            n_rxn,
            remaining: cursor.remaining(),
        });
    }
    Ok(())
}
