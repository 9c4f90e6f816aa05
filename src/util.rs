use crate::nalgebra::{DVector, Vector3};
use nalgebra_sparse::CsrMatrix;
use std::error::Error;
use std::fmt::LowerExp;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Disjoint-set forest with path halving and union by size.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl UnionFind {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    pub fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    pub fn union(&mut self, a: usize, b: usize) {
        let (mut a, mut b) = (self.find(a), self.find(b));
        if a == b {
            return;
        }
        if self.size[a] < self.size[b] {
            std::mem::swap(&mut a, &mut b);
        }
        self.parent[b] = a;
        self.size[a] += self.size[b];
    }

    /// Component label of every element, numbered consecutively in order of first appearance.
    pub fn labels(&mut self) -> (Vec<usize>, usize) {
        let mut root_label = vec![usize::MAX; self.len()];
        let mut labels = Vec::with_capacity(self.len());
        let mut count = 0;
        for i in 0..self.len() {
            let root = self.find(i);
            if root_label[root] == usize::MAX {
                root_label[root] = count;
                count += 1;
            }
            labels.push(root_label[root]);
        }
        (labels, count)
    }
}

/// Dumps a CSR matrix to a matrix market file.
pub fn dump_csr_matrix_to_mm_file<T: nalgebra::Scalar + LowerExp>(
    path: impl AsRef<Path>,
    matrix: &CsrMatrix<T>,
) -> Result<(), Box<dyn Error + Sync + Send>> {
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "%%MatrixMarket matrix coordinate real general")?;
    writeln!(writer, "{} {} {}", matrix.nrows(), matrix.ncols(), matrix.nnz())?;
    for (i, j, v) in matrix.triplet_iter() {
        // Indices have to be stored as 1-based
        writeln!(writer, "{} {} {:.e}", i + 1, j + 1, v)?;
    }
    writer.flush()?;

    Ok(())
}

/// Max norm of all stored entries of a CSR matrix.
pub fn csr_max_abs(matrix: &CsrMatrix<f64>) -> f64 {
    matrix.values().iter().fold(0.0, |acc: f64, v| acc.max(v.abs()))
}

/// The velocity stored in the dofs `4 * slot .. 4 * slot + 3`.
pub fn slot_velocity(u: &DVector<f64>, slot: usize) -> Vector3<f64> {
    Vector3::new(u[4 * slot], u[4 * slot + 1], u[4 * slot + 2])
}
