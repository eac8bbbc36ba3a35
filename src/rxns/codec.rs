//! # Packed record codec
//!
//! Wire form of a mechanism, shared with external mechanism compilers:
//!
//! ```text
//! [n_rxn: i32] ( [kind: i32] [int section: i32 * n_int] [float section: f64 * n_float] ) * n_rxn
//! ```
//!
//! All values are little-endian. The integer and floating point section lengths of a record are
//! computed from header fields stored at fixed offsets at the start of its integer section
//! (reactant count, product count), so every record can be skipped without being decoded.
//! There is no self-recovery: a wrong length desynchronizes every following record, which is
//! why [`RecordCursor`] checks every read against the buffer end.
use crate::error::{PhlexError, PhlexResult};
use std::fmt;

pub const INT_SIZE: usize = 4;
pub const FLOAT_SIZE: usize = 8;

/// kind tags as written by the mechanism compiler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReactionKind {
    Arrhenius,
    Troe,
    Photolysis,
}

impl ReactionKind {
    pub fn code(&self) -> i32 {
        match self {
            ReactionKind::Arrhenius => 1,
            ReactionKind::Troe => 2,
            ReactionKind::Photolysis => 3,
        }
    }
    pub fn name(&self) -> &'static str {
        match self {
            ReactionKind::Arrhenius => "ARRHENIUS",
            ReactionKind::Troe => "TROE",
            ReactionKind::Photolysis => "PHOTOLYSIS",
        }
    }
}

impl TryFrom<i32> for ReactionKind {
    type Error = PhlexError;
    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(ReactionKind::Arrhenius),
            2 => Ok(ReactionKind::Troe),
            3 => Ok(ReactionKind::Photolysis),
            _ => Err(PhlexError::UnrecognizedReactionKind(code)),
        }
    }
}

impl fmt::Display for ReactionKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Appends records to a growing byte buffer.
#[derive(Debug, Default, Clone)]
pub struct RecordWriter {
    buf: Vec<u8>,
}

impl RecordWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn push_int(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// counts and state indices; mechanisms never come close to `i32::MAX` entries
    pub fn push_index(&mut self, value: usize) {
        self.push_int(value as i32);
    }

    /// unset ids are written as -1
    pub fn push_opt_index(&mut self, value: Option<usize>) {
        match value {
            Some(v) => self.push_index(v),
            None => self.push_int(-1),
        }
    }

    pub fn push_float(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Read position inside a packed mechanism buffer.
#[derive(Debug, Clone, Copy)]
pub struct RecordCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> RecordCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.pos == self.buf.len()
    }

    /// fail with `TruncatedBuffer` unless `n_bytes` are available from the current position
    pub fn require(&self, n_bytes: usize) -> PhlexResult<()> {
        if n_bytes > self.remaining() {
            return Err(PhlexError::TruncatedBuffer {
                offset: self.pos,
                needed: n_bytes,
                len: self.buf.len(),
            });
        }
        Ok(())
    }

    pub fn advance(&mut self, n_bytes: usize) -> PhlexResult<()> {
        self.require(n_bytes)?;
        self.pos += n_bytes;
        Ok(())
    }

    /// integer `i_int` positions after the cursor, without moving
    pub fn peek_int(&self, i_int: usize) -> PhlexResult<i32> {
        let start = i_int * INT_SIZE;
        self.require(start + INT_SIZE)?;
        let at = self.pos + start;
        let mut bytes = [0u8; INT_SIZE];
        bytes.copy_from_slice(&self.buf[at..at + INT_SIZE]);
        Ok(i32::from_le_bytes(bytes))
    }

    /// header count at a fixed integer offset; negative counts mean the record is corrupt
    pub fn peek_count(&self, i_int: usize) -> PhlexResult<usize> {
        let value = self.peek_int(i_int)?;
        usize::try_from(value).map_err(|_| PhlexError::MalformedRecord {
            offset: self.pos + i_int * INT_SIZE,
            reason: format!("negative count {}", value),
        })
    }

    pub fn read_int(&mut self) -> PhlexResult<i32> {
        let value = self.peek_int(0)?;
        self.pos += INT_SIZE;
        Ok(value)
    }

    pub fn read_index(&mut self) -> PhlexResult<usize> {
        let offset = self.pos;
        let value = self.read_int()?;
        usize::try_from(value).map_err(|_| PhlexError::MalformedRecord {
            offset,
            reason: format!("negative index {}", value),
        })
    }

    pub fn read_opt_index(&mut self) -> PhlexResult<Option<usize>> {
        let value = self.read_int()?;
        Ok(usize::try_from(value).ok())
    }

    pub fn read_float(&mut self) -> PhlexResult<f64> {
        self.require(FLOAT_SIZE)?;
        let mut bytes = [0u8; FLOAT_SIZE];
        bytes.copy_from_slice(&self.buf[self.pos..self.pos + FLOAT_SIZE]);
        self.pos += FLOAT_SIZE;
        Ok(f64::from_le_bytes(bytes))
    }
}

/// byte length of a record body from its section lengths, `None` on overflow
pub fn record_bytes(int_section_len: usize, float_section_len: usize) -> Option<usize> {
    int_section_len
        .checked_mul(INT_SIZE)?
        .checked_add(float_section_len.checked_mul(FLOAT_SIZE)?)
}
