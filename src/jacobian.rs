//! # Jacobian sparsity
//!
//! The Jacobian structure is fixed once per mechanism, before the integrator allocates its sparse
//! matrix, by an explicit two-pass algorithm:
//!
//! 1. **declare**: every reaction flags, on a dense boolean mask over the reduced (solved-only)
//!    variable space, each `(row, column)` its Jacobian contribution may touch. Declaring a
//!    superset of the entries actually written is fine, declaring a subset is a bug because the
//!    linear solver's structure is frozen from this mask.
//! 2. **compact**: the mask becomes a compressed sparse column skeleton. Columns are visited in
//!    increasing order and each emits its rows in strictly increasing order; the column pointer
//!    is the running element count.
//!
//! Afterwards every reaction is handed the linear offset of each of its `(row, column)` pairs in
//! the compacted structure, so Jacobian fills are O(1) writes.
use crate::error::{PhlexError, PhlexResult};
use crate::rxns::Mechanism;
use crate::state::StateMap;
use faer::sparse::{SparseColMat, SymbolicSparseColMat, Triplet};
use log::{debug, info};
use std::fmt;

/// dense `n × n` flags, `flags[row * n + col]`
#[derive(Debug, Clone, PartialEq)]
pub struct JacobianMask {
    n: usize,
    flags: Vec<bool>,
}

impl JacobianMask {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            flags: vec![false; n * n],
        }
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn set(&mut self, row: usize, col: usize) -> PhlexResult<()> {
        if row >= self.n || col >= self.n {
            return Err(PhlexError::SparsityMismatch(format!(
                "element ({}, {}) outside a {}x{} Jacobian",
                row, col, self.n, self.n
            )));
        }
        self.flags[row * self.n + col] = true;
        Ok(())
    }

    pub fn is_set(&self, row: usize, col: usize) -> bool {
        row < self.n && col < self.n && self.flags[row * self.n + col]
    }

    pub fn count(&self) -> usize {
        self.flags.iter().filter(|f| **f).count()
    }
}

/// Compressed sparse column skeleton over the reduced variable space.
#[derive(Debug, Clone, PartialEq)]
pub struct SparsityTemplate {
    n: usize,
    col_ptrs: Vec<usize>,
    row_indices: Vec<usize>,
}

impl SparsityTemplate {
    /// compaction pass
    pub fn from_mask(mask: &JacobianMask) -> Self {
        let n = mask.n();
        let mut col_ptrs = Vec::with_capacity(n + 1);
        let mut row_indices = Vec::with_capacity(mask.count());
        for col in 0..n {
            col_ptrs.push(row_indices.len());
            for row in 0..n {
                if mask.is_set(row, col) {
                    row_indices.push(row);
                }
            }
        }
        col_ptrs.push(row_indices.len());
        Self {
            n,
            col_ptrs,
            row_indices,
        }
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn nnz(&self) -> usize {
        self.row_indices.len()
    }

    pub fn col_ptrs(&self) -> &[usize] {
        &self.col_ptrs
    }

    pub fn row_indices(&self) -> &[usize] {
        &self.row_indices
    }

    /// linear offset of `(row, col)` in the value array, `None` if not part of the skeleton
    pub fn offset(&self, row: usize, col: usize) -> Option<usize> {
        if col >= self.n {
            return None;
        }
        let start = self.col_ptrs[col];
        let end = self.col_ptrs[col + 1];
        self.row_indices[start..end]
            .binary_search(&row)
            .ok()
            .map(|i| start + i)
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        self.offset(row, col).is_some()
    }

    /// `(row, col, offset)` in storage order
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
        (0..self.n).flat_map(move |col| {
            (self.col_ptrs[col]..self.col_ptrs[col + 1])
                .map(move |offset| (self.row_indices[offset], col, offset))
        })
    }
}

impl fmt::Display for SparsityTemplate {
    /// `*` for a structural entry, `.` otherwise
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for row in 0..self.n {
            let line: String = (0..self.n)
                .map(|col| if self.contains(row, col) { '*' } else { '.' })
                .collect();
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

/// Sparse Jacobian handed to the integrator, a `faer` CSC matrix whose symbolic structure is the
/// template's.
#[derive(Debug, Clone)]
pub struct SparseJacobian {
    matrix: SparseColMat<usize, f64>,
}

impl SparseJacobian {
    /// matrix with the template's structure and all values zero
    pub fn from_template(template: &SparsityTemplate) -> Self {
        let symbolic = SymbolicSparseColMat::new_checked(
            template.n,
            template.n,
            template.col_ptrs.clone(),
            None,
            template.row_indices.clone(),
        );
        Self {
            matrix: SparseColMat::new(symbolic, vec![0.0; template.nnz()]),
        }
    }

    /// matrix with no structural entries yet
    pub fn empty(n: usize) -> Self {
        let symbolic = SymbolicSparseColMat::new_checked(n, n, vec![0; n + 1], None, Vec::new());
        Self {
            matrix: SparseColMat::new(symbolic, Vec::new()),
        }
    }

    pub fn n(&self) -> usize {
        self.matrix.ncols()
    }

    pub fn nnz(&self) -> usize {
        self.values().len()
    }

    pub fn col_ptrs(&self) -> &[usize] {
        self.matrix.as_ref().symbolic().col_ptr()
    }

    pub fn row_indices(&self) -> &[usize] {
        self.matrix.as_ref().symbolic().row_idx()
    }

    pub fn values(&self) -> &[f64] {
        self.matrix.as_ref().val()
    }

    pub fn values_mut(&mut self) -> &mut [f64] {
        self.matrix.val_mut()
    }

    pub fn matrix(&self) -> &SparseColMat<usize, f64> {
        &self.matrix
    }

    /// true if the structure is exactly the template's
    pub fn matches(&self, template: &SparsityTemplate) -> bool {
        self.n() == template.n
            && self.col_ptrs() == template.col_ptrs.as_slice()
            && self.row_indices() == template.row_indices.as_slice()
            && self.nnz() == template.nnz()
    }

    /// Rebuild on the template structure if needed and zero every value.
    ///
    /// The dimension is fixed when the integrator allocates the matrix; a different dimension
    /// means the matrix belongs to another mechanism and is rejected. Element storage that went
    /// stale (e.g. shrunk by the integrator) is re-grown to the template.
    pub fn reset_to(&mut self, template: &SparsityTemplate) -> PhlexResult<()> {
        if self.n() != template.n {
            return Err(PhlexError::SparsityMismatch(format!(
                "Jacobian is {}x{}, template is {}x{}",
                self.n(),
                self.n(),
                template.n,
                template.n
            )));
        }
        if !self.matches(template) {
            debug!(
                "resetting Jacobian structure: nnz {} -> {}",
                self.nnz(),
                template.nnz()
            );
            *self = Self::from_template(template);
            return Ok(());
        }
        self.values_mut().iter_mut().for_each(|v| *v = 0.0);
        Ok(())
    }

    /// value at `(row, col)`, zero outside the structure
    pub fn get(&self, row: usize, col: usize) -> f64 {
        if row >= self.n() || col >= self.n() {
            return 0.0;
        }
        self.matrix.as_ref().get(row, col).copied().unwrap_or(0.0)
    }

    /// structural entries as `(row, col, value)` in storage order
    pub fn entries(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        let col_ptrs = self.col_ptrs();
        let row_indices = self.row_indices();
        let values = self.values();
        (0..self.n()).flat_map(move |col| {
            (col_ptrs[col]..col_ptrs[col + 1]).map(move |k| (row_indices[k], col, values[k]))
        })
    }

    /// `I − h·J` assembled from the structural entries plus the diagonal
    pub fn shifted_identity(&self, h: f64) -> PhlexResult<SparseColMat<usize, f64>> {
        let n = self.n();
        let mut triplets = Vec::with_capacity(n + self.nnz());
        triplets.extend((0..n).map(|i| Triplet::new(i, i, 1.0)));
        triplets.extend(
            self.entries()
                .map(|(row, col, value)| Triplet::new(row, col, -h * value)),
        );
        SparseColMat::try_new_from_triplets(n, n, triplets.as_slice()).map_err(|e| {
            PhlexError::IntegratorFailure(format!("cannot assemble I - hJ: {:?}", e))
        })
    }
}

/// Build the sparsity template of a mechanism and hand every reaction its Jacobian offsets.
pub fn build_jacobian_template(
    mechanism: &mut Mechanism,
    state_map: &StateMap,
) -> PhlexResult<SparsityTemplate> {
    let n_dep_var = state_map.n_dep_var();
    let mut mask = JacobianMask::new(n_dep_var);
    mechanism.flag_jac_elements(state_map, &mut mask)?;
    let template = SparsityTemplate::from_mask(&mask);
    mechanism.update_ids(state_map, &template)?;
    info!(
        "Jacobian template built: {} dependent variables, {} potentially non-zero elements",
        n_dep_var,
        template.nnz()
    );
    Ok(template)
}
