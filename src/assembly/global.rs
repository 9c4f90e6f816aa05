//! Scatter of local systems into global CSR matrices.
use crate::kernel::LocalSystem;
use crate::nalgebra::{DMatrix, DVector};
use nalgebra_sparse::csr::CsrRowMut;
use nalgebra_sparse::pattern::SparsityPattern;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rayon::slice::ParallelSliceMut;
use std::cell::RefCell;

/// An assembler for CSR matrices from local systems over arbitrary global dofs.
///
/// The pattern always contains the diagonal, so that Dirichlet rows and rows of dofs without
/// any contribution can be replaced by identity rows.
#[derive(Debug, Clone, Default)]
pub struct CsrAssembler {
    // Buffers reused between assemblies
    workspace: RefCell<CsrAssemblerWorkspace>,
}

#[derive(Debug, Clone, Default)]
struct CsrAssemblerWorkspace {
    sorted_permutation: Vec<usize>,
}

impl CsrAssembler {
    pub fn assemble_pattern(&self, num_dofs: usize, systems: &[LocalSystem]) -> SparsityPattern {
        let num_total_triplets = num_dofs + systems.iter().map(|s| s.dofs.len() * s.dofs.len()).sum::<usize>();
        let mut coordinates = Vec::with_capacity(num_total_triplets);
        coordinates.extend((0..num_dofs).map(|i| (i, i)));
        for system in systems {
            for &i in &system.dofs {
                for &j in &system.dofs {
                    coordinates.push((i, j));
                }
            }
        }
        coordinates.par_sort_unstable();
        pattern_from_sorted_coordinates(num_dofs, num_dofs, coordinates)
    }

    /// Assembles the matrix and right-hand side of the given local systems.
    pub fn assemble(&self, num_dofs: usize, systems: &[LocalSystem]) -> (CsrMatrix<f64>, DVector<f64>) {
        let pattern = self.assemble_pattern(num_dofs, systems);
        let values = vec![0.0; pattern.nnz()];
        let mut matrix = CsrMatrix::try_from_pattern_and_values(pattern, values)
            .expect("Values match the pattern by construction");
        let mut rhs = DVector::zeros(num_dofs);
        self.assemble_into_csr(&mut matrix, &mut rhs, systems);
        (matrix, rhs)
    }

    /// Adds the local systems to a matrix whose pattern contains all their entries.
    pub fn assemble_into_csr(&self, csr: &mut CsrMatrix<f64>, rhs: &mut DVector<f64>, systems: &[LocalSystem]) {
        let ws = &mut *self.workspace.borrow_mut();
        let permutation = &mut ws.sorted_permutation;

        for system in systems {
            let dofs = &system.dofs;
            permutation.clear();
            permutation.extend(0..dofs.len());
            permutation.sort_unstable_by_key(|&i| dofs[i]);

            for (local_row, &global_row) in dofs.iter().enumerate() {
                rhs[global_row] += system.rhs[local_row];
                let mut csr_row = csr.row_mut(global_row);
                add_local_row_to_csr_row(&mut csr_row, dofs, permutation, &system.matrix, local_row);
            }
        }
    }
}

/// Builds a pattern from coordinates sorted by row and column. Duplicates are merged.
fn pattern_from_sorted_coordinates(
    num_rows: usize,
    num_cols: usize,
    coordinates: Vec<(usize, usize)>,
) -> SparsityPattern {
    let mut row_offsets = Vec::with_capacity(num_rows + 1);
    let mut column_indices = Vec::new();
    row_offsets.push(0);

    let mut current_row = 0;
    let mut prev_col = None;
    for (i, j) in coordinates {
        assert!(i < num_rows, "Coordinates must be in bounds");
        while i > current_row {
            row_offsets.push(column_indices.len());
            current_row += 1;
            prev_col = None;
        }
        if Some(j) != prev_col {
            column_indices.push(j);
            prev_col = Some(j);
        }
    }
    for _ in current_row..num_rows {
        row_offsets.push(column_indices.len());
    }

    SparsityPattern::try_from_offsets_and_indices(num_rows, num_cols, row_offsets, column_indices)
        .expect("Coordinates are sorted and deduplicated")
}

/// Adds row `local_row` of `local_matrix` to the CSR row. `dofs` may contain duplicates.
fn add_local_row_to_csr_row(
    row: &mut CsrRowMut<f64>,
    dofs: &[usize],
    sorted_permutation: &[usize],
    local_matrix: &DMatrix<f64>,
    local_row: usize,
) {
    assert_eq!(dofs.len(), sorted_permutation.len());
    let (column_indices, values) = row.cols_and_values_mut();

    let mut csr_idx = 0;
    for &local_col in sorted_permutation {
        let global_col = dofs[local_col];
        while column_indices[csr_idx] < global_col {
            csr_idx += 1;
        }
        debug_assert_eq!(column_indices[csr_idx], global_col, "Column missing from CSR pattern");
        values[csr_idx] += local_matrix[(local_row, local_col)];
    }
}

/// Accumulates a dense local block into a COO matrix.
pub fn add_block_to_coo(
    coo: &mut CooMatrix<f64>,
    rows: &[usize],
    cols: &[usize],
    block: &DMatrix<f64>,
    skip_row: impl Fn(usize) -> bool,
) {
    for (i, &row) in rows.iter().enumerate() {
        if skip_row(row) {
            continue;
        }
        for (j, &col) in cols.iter().enumerate() {
            let value = block[(i, j)];
            if value != 0.0 {
                coo.push(row, col, value);
            }
        }
    }
}
