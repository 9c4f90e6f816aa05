use core::fmt;
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut, RealField, Scalar};
use nalgebra_sparse::ops::serial::spmm_csr_dense;
use nalgebra_sparse::ops::Op;
use nalgebra_sparse::CsrMatrix;
use num::Zero;
use std::error::Error;
use std::ops::{Deref, DerefMut};

pub trait LinearOperator<T: Scalar> {
    fn apply(&self, y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>>;
}

impl<'a, T, A> LinearOperator<T> for &'a A
where
    T: Scalar,
    A: ?Sized + LinearOperator<T>,
{
    fn apply(&self, y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        <A as LinearOperator<T>>::apply(self, y, x)
    }
}

impl<T: RealField + Copy> LinearOperator<T> for DMatrix<T> {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        y.gemv(T::one(), self, &x, T::zero());
        Ok(())
    }
}

impl<T> LinearOperator<T> for CsrMatrix<T>
where
    T: RealField + Copy,
{
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        spmm_csr_dense(T::zero(), &mut y, T::one(), Op::NoOp(self), Op::NoOp(&x));
        Ok(())
    }
}

pub struct IdentityOperator;

impl<T: Scalar> LinearOperator<T> for IdentityOperator {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        y.copy_from(&x);
        Ok(())
    }
}

/// y = Ax
fn apply_operator<'a, T, A>(
    y: impl Into<DVectorViewMut<'a, T>>,
    a: &A,
    x: impl Into<DVectorView<'a, T>>,
) -> Result<(), Box<dyn Error>>
where
    T: Scalar,
    A: ?Sized + LinearOperator<T>,
{
    a.apply(y.into(), x.into())
}

#[derive(Debug)]
#[non_exhaustive]
pub enum SolveErrorKind {
    OperatorError(Box<dyn Error>),
    PreconditionerError(Box<dyn Error>),
    IndefiniteOperator,
    IndefinitePreconditioner,
    Breakdown,
    MaxIterationsReached { max_iter: usize },
}

impl fmt::Display for SolveErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OperatorError(err) => {
                write!(f, "Error applying operator: ")?;
                err.fmt(f)
            }
            Self::PreconditionerError(err) => {
                write!(f, "Error applying preconditioner: ")?;
                err.fmt(f)
            }
            Self::IndefiniteOperator => write!(f, "Operator appears to be indefinite"),
            Self::IndefinitePreconditioner => write!(f, "Indefinite preconditioner"),
            Self::Breakdown => write!(f, "Krylov basis broke down"),
            Self::MaxIterationsReached { max_iter } => {
                write!(f, "Max iterations ({}) reached.", max_iter)
            }
        }
    }
}

#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct SolverOutput<T> {
    /// Number of updates made to the (initial) solution vector.
    pub num_iterations: usize,
    /// Estimated relative residual `||b - Ax|| / ||b||` at termination.
    pub relative_residual: T,
}

#[non_exhaustive]
#[derive(Debug)]
pub struct SolveError<T> {
    pub output: SolverOutput<T>,
    pub kind: SolveErrorKind,
}

impl<T> SolveError<T> {
    fn new(output: SolverOutput<T>, kind: SolveErrorKind) -> Self {
        Self { output, kind }
    }
}

impl<T> fmt::Display for SolveError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Krylov solve failed after {} iterations. ", self.output.num_iterations)?;
        write!(f, "Error: {}", self.kind)
    }
}

impl<T: fmt::Debug> std::error::Error for SolveError<T> {}

#[derive(Debug)]
enum OwnedOrMutRef<'a, T> {
    Owned(T),
    MutRef(&'a mut T),
}

impl<'a, T> Deref for OwnedOrMutRef<'a, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Owned(owned) => owned,
            Self::MutRef(mutref) => mutref,
        }
    }
}

impl<'a, T> DerefMut for OwnedOrMutRef<'a, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            Self::Owned(owned) => owned,
            Self::MutRef(mutref) => mutref,
        }
    }
}

#[derive(Debug, Clone)]
#[allow(non_snake_case)]
pub struct CgWorkspace<T: Scalar> {
    r: DVector<T>,
    z: DVector<T>,
    p: DVector<T>,
    Ap: DVector<T>,
}

impl<T: Scalar + Zero> Default for CgWorkspace<T> {
    fn default() -> Self {
        Self {
            r: DVector::zeros(0),
            z: DVector::zeros(0),
            p: DVector::zeros(0),
            Ap: DVector::zeros(0),
        }
    }
}

/// Preconditioned conjugate gradient for symmetric positive definite operators.
///
/// Terminates when the approximate residual satisfies `||r|| <= tol * ||b||`.
#[derive(Debug)]
pub struct ConjugateGradient<'a, T, A, P>
where
    T: Scalar,
{
    workspace: OwnedOrMutRef<'a, CgWorkspace<T>>,
    operator: A,
    preconditioner: P,
    tolerance: T,
    max_iter: Option<usize>,
}

impl<'a, T: RealField + Copy> ConjugateGradient<'a, T, (), IdentityOperator> {
    pub fn new() -> Self {
        Self {
            workspace: OwnedOrMutRef::Owned(CgWorkspace::default()),
            operator: (),
            preconditioner: IdentityOperator,
            tolerance: T::default_epsilon().sqrt(),
            max_iter: None,
        }
    }

    pub fn with_workspace(workspace: &'a mut CgWorkspace<T>) -> Self {
        Self {
            workspace: OwnedOrMutRef::MutRef(workspace),
            operator: (),
            preconditioner: IdentityOperator,
            tolerance: T::default_epsilon().sqrt(),
            max_iter: None,
        }
    }
}

impl<'a, T: Scalar, P> ConjugateGradient<'a, T, (), P> {
    pub fn with_operator<A>(self, operator: A) -> ConjugateGradient<'a, T, A, P> {
        ConjugateGradient {
            workspace: self.workspace,
            operator,
            preconditioner: self.preconditioner,
            tolerance: self.tolerance,
            max_iter: self.max_iter,
        }
    }
}

impl<'a, T: Scalar, A, P> ConjugateGradient<'a, T, A, P> {
    pub fn with_preconditioner<P2>(self, preconditioner: P2) -> ConjugateGradient<'a, T, A, P2> {
        ConjugateGradient {
            workspace: self.workspace,
            operator: self.operator,
            preconditioner,
            tolerance: self.tolerance,
            max_iter: self.max_iter,
        }
    }

    pub fn with_tolerance(self, tolerance: T) -> Self {
        Self { tolerance, ..self }
    }

    pub fn with_max_iter(self, max_iter: usize) -> Self {
        Self {
            max_iter: Some(max_iter),
            ..self
        }
    }
}

impl<'a, T, A, P> ConjugateGradient<'a, T, A, P>
where
    T: RealField + Copy,
    A: LinearOperator<T>,
    P: LinearOperator<T>,
{
    pub fn solve_with_guess<'b>(
        &mut self,
        b: impl Into<DVectorView<'b, T>>,
        x: impl Into<DVectorViewMut<'b, T>>,
    ) -> Result<SolverOutput<T>, SolveError<T>> {
        self.solve_with_guess_(b.into(), x.into())
    }

    #[allow(non_snake_case)]
    fn solve_with_guess_(
        &mut self,
        b: DVectorView<T>,
        mut x: DVectorViewMut<T>,
    ) -> Result<SolverOutput<T>, SolveError<T>> {
        use SolveErrorKind::*;
        assert_eq!(b.len(), x.len());

        let mut output = SolverOutput {
            num_iterations: 0,
            relative_residual: T::zero(),
        };

        let n = x.len();
        let CgWorkspace { r, z, p, Ap } = &mut *self.workspace;
        r.resize_vertically_mut(n, T::zero());
        z.resize_vertically_mut(n, T::zero());
        p.resize_vertically_mut(n, T::zero());
        Ap.resize_vertically_mut(n, T::zero());

        let b_norm = b.norm();
        if b_norm == T::zero() {
            x.fill(T::zero());
            return Ok(output);
        }

        // r = b - Ax
        if let Err(err) = apply_operator(&mut *r, &self.operator, &x) {
            return Err(SolveError::new(output, OperatorError(err)));
        }
        r.zip_apply(&b, |Ax_i, b_i| *Ax_i = b_i - *Ax_i);

        // z = Pr
        if let Err(err) = apply_operator(&mut *z, &self.preconditioner, &*r) {
            return Err(SolveError::new(output, PreconditionerError(err)));
        }
        p.copy_from(z);

        let mut zTr = z.dot(r);

        loop {
            output.relative_residual = r.norm() / b_norm;
            if output.relative_residual <= self.tolerance {
                break;
            } else if let Some(max_iter) = self.max_iter {
                if output.num_iterations >= max_iter {
                    return Err(SolveError::new(output, MaxIterationsReached { max_iter }));
                }
            }

            // Ap = A * p
            if let Err(err) = apply_operator(&mut *Ap, &self.operator, &*p) {
                return Err(SolveError::new(output, OperatorError(err)));
            }
            let pAp = p.dot(Ap);

            if pAp <= T::zero() {
                return Err(SolveError::new(output, IndefiniteOperator));
            }
            if zTr <= T::zero() {
                return Err(SolveError::new(output, IndefinitePreconditioner));
            }

            let alpha = zTr / pAp;
            x.zip_apply(&*p, |x_i, p_i| *x_i += alpha * p_i);
            r.zip_apply(&*Ap, |r_i, Ap_i| *r_i -= alpha * Ap_i);
            output.num_iterations += 1;

            if let Err(err) = apply_operator(&mut *z, &self.preconditioner, &*r) {
                return Err(SolveError::new(output, PreconditionerError(err)));
            }
            let zTr_next = z.dot(r);
            let beta = zTr_next / zTr;
            p.zip_apply(&*z, |p_i, z_i| *p_i = z_i + beta * *p_i);
            zTr = zTr_next;
        }

        Ok(output)
    }
}

/// Restarted GMRES(m) with right preconditioning.
///
/// Right preconditioning keeps the monitored residual equal to the true residual
/// of the unpreconditioned system.
#[derive(Debug)]
pub struct Gmres<T, A, P>
where
    T: Scalar,
{
    operator: A,
    preconditioner: P,
    restart: usize,
    tolerance: T,
    max_iter: usize,
}

impl<T: RealField + Copy> Gmres<T, (), IdentityOperator> {
    pub fn new() -> Self {
        Self {
            operator: (),
            preconditioner: IdentityOperator,
            restart: 50,
            tolerance: T::default_epsilon().sqrt(),
            max_iter: 1000,
        }
    }
}

impl<T: Scalar, P> Gmres<T, (), P> {
    pub fn with_operator<A>(self, operator: A) -> Gmres<T, A, P> {
        Gmres {
            operator,
            preconditioner: self.preconditioner,
            restart: self.restart,
            tolerance: self.tolerance,
            max_iter: self.max_iter,
        }
    }
}

impl<T: Scalar, A, P> Gmres<T, A, P> {
    pub fn with_preconditioner<P2>(self, preconditioner: P2) -> Gmres<T, A, P2> {
        Gmres {
            operator: self.operator,
            preconditioner,
            restart: self.restart,
            tolerance: self.tolerance,
            max_iter: self.max_iter,
        }
    }

    pub fn with_restart(self, restart: usize) -> Self {
        assert!(restart > 0, "Restart length must be positive");
        Self { restart, ..self }
    }

    pub fn with_tolerance(self, tolerance: T) -> Self {
        Self { tolerance, ..self }
    }

    pub fn with_max_iter(self, max_iter: usize) -> Self {
        Self { max_iter, ..self }
    }
}

impl<T, A, P> Gmres<T, A, P>
where
    T: RealField + Copy,
    A: LinearOperator<T>,
    P: LinearOperator<T>,
{
    pub fn solve_with_guess<'b>(
        &self,
        b: impl Into<DVectorView<'b, T>>,
        x: impl Into<DVectorViewMut<'b, T>>,
    ) -> Result<SolverOutput<T>, SolveError<T>> {
        self.solve_with_guess_(b.into(), x.into())
    }

    fn solve_with_guess_(
        &self,
        b: DVectorView<T>,
        mut x: DVectorViewMut<T>,
    ) -> Result<SolverOutput<T>, SolveError<T>> {
        use SolveErrorKind::*;
        assert_eq!(b.len(), x.len());
        let n = b.len();
        let m = self.restart.min(n.max(1));

        let mut output = SolverOutput {
            num_iterations: 0,
            relative_residual: T::zero(),
        };

        let b_norm = b.norm();
        if b_norm == T::zero() {
            x.fill(T::zero());
            return Ok(output);
        }

        let mut r = DVector::zeros(n);
        let mut w = DVector::zeros(n);
        let mut z = DVector::zeros(n);
        let mut basis: Vec<DVector<T>> = Vec::with_capacity(m + 1);
        let mut hessenberg = DMatrix::zeros(m + 1, m);
        let mut cs = vec![T::zero(); m];
        let mut sn = vec![T::zero(); m];
        let mut g = DVector::zeros(m + 1);

        loop {
            // r = b - Ax
            if let Err(err) = apply_operator(&mut r, &self.operator, &x) {
                return Err(SolveError::new(output, OperatorError(err)));
            }
            r.zip_apply(&b, |Ax_i, b_i| *Ax_i = b_i - *Ax_i);
            let beta = r.norm();
            output.relative_residual = beta / b_norm;
            if output.relative_residual <= self.tolerance {
                return Ok(output);
            }
            if output.num_iterations >= self.max_iter {
                return Err(SolveError::new(output, MaxIterationsReached { max_iter: self.max_iter }));
            }

            basis.clear();
            basis.push(&r / beta);
            hessenberg.fill(T::zero());
            g.fill(T::zero());
            g[0] = beta;

            let mut k = 0;
            while k < m && output.num_iterations < self.max_iter {
                // w = A M^{-1} v_k
                if let Err(err) = apply_operator(&mut z, &self.preconditioner, &basis[k]) {
                    return Err(SolveError::new(output, PreconditionerError(err)));
                }
                if let Err(err) = apply_operator(&mut w, &self.operator, &z) {
                    return Err(SolveError::new(output, OperatorError(err)));
                }

                // Modified Gram-Schmidt
                for (i, v_i) in basis.iter().enumerate() {
                    let h = w.dot(v_i);
                    hessenberg[(i, k)] = h;
                    w.axpy(-h, v_i, T::one());
                }
                let h_next = w.norm();
                hessenberg[(k + 1, k)] = h_next;

                for i in 0..k {
                    let (h_i, h_ip1) = (hessenberg[(i, k)], hessenberg[(i + 1, k)]);
                    hessenberg[(i, k)] = cs[i] * h_i + sn[i] * h_ip1;
                    hessenberg[(i + 1, k)] = -sn[i] * h_i + cs[i] * h_ip1;
                }

                let (h_kk, h_k1k) = (hessenberg[(k, k)], hessenberg[(k + 1, k)]);
                let denom = (h_kk * h_kk + h_k1k * h_k1k).sqrt();
                if denom == T::zero() {
                    return Err(SolveError::new(output, Breakdown));
                }
                cs[k] = h_kk / denom;
                sn[k] = h_k1k / denom;
                hessenberg[(k, k)] = denom;
                hessenberg[(k + 1, k)] = T::zero();
                g[k + 1] = -sn[k] * g[k];
                g[k] = cs[k] * g[k];

                output.num_iterations += 1;
                k += 1;
                output.relative_residual = g[k].abs() / b_norm;

                let happy_breakdown = h_next <= T::default_epsilon() * beta;
                if output.relative_residual <= self.tolerance || happy_breakdown {
                    break;
                }
                basis.push(&w / h_next);
            }

            // Solve the upper triangular least-squares system H y = g
            let mut y = DVector::zeros(k);
            for i in (0..k).rev() {
                let mut s = g[i];
                for j in (i + 1)..k {
                    s -= hessenberg[(i, j)] * y[j];
                }
                y[i] = s / hessenberg[(i, i)];
            }

            // x <- x + M^{-1} V y
            w.fill(T::zero());
            for (v_i, y_i) in basis.iter().zip(y.iter()) {
                w.axpy(*y_i, v_i, T::one());
            }
            if let Err(err) = apply_operator(&mut z, &self.preconditioner, &w) {
                return Err(SolveError::new(output, PreconditionerError(err)));
            }
            x += &z;
        }
    }
}

/// Solves `Ax = b` with a dense LU factorization, for small systems.
pub fn solve_dense_lu<T: RealField + Copy>(a: &CsrMatrix<T>, b: &DVector<T>) -> Option<DVector<T>> {
    let dense = DMatrix::from(a);
    dense.lu().solve(b)
}
