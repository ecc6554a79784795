//! Dense symmetric-indefinite LDLᵀ factorization.
//!
//! Bunch–Kaufman partial pivoting: `Pᵀ A P = L D Lᵀ` with `L` unit lower
//! triangular and `D` block diagonal with 1x1 and 2x2 blocks. Works for the
//! saddle-point matrices of constrained fits, where Cholesky does not apply.

use nalgebra::{DMatrix, DVector};

/// (1 + sqrt(17)) / 8, bounds element growth of the factorization.
const ALPHA: f64 = 0.640_388_203_202_207_6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pivot {
    One(f64),
    /// Symmetric 2x2 block stored as (d11, d21, d22).
    Two(f64, f64, f64),
}

impl Pivot {
    /// Eigenvalues of the block (one or two of them).
    fn eigenvalues(&self) -> (f64, Option<f64>) {
        match *self {
            Pivot::One(d) => (d, None),
            Pivot::Two(d11, d21, d22) => {
                let mean = 0.5 * (d11 + d22);
                let radius = (0.25 * (d11 - d22).powi(2) + d21 * d21).sqrt();
                (mean - radius, Some(mean + radius))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SymmetricFactorization {
    lower: DMatrix<f64>,
    pivots: Vec<(usize, Pivot)>,
    perm: Vec<usize>,
}

impl SymmetricFactorization {
    /// Factorize a square symmetric matrix. Only the symmetric part of
    /// `matrix` is used.
    pub fn new(matrix: &DMatrix<f64>) -> Self {
        let n = matrix.nrows();
        let mut a = DMatrix::from_fn(n, n, |i, j| 0.5 * (matrix[(i, j)] + matrix[(j, i)]));
        let mut lower = DMatrix::identity(n, n);
        let mut perm: Vec<usize> = (0..n).collect();
        let mut pivots = Vec::with_capacity(n);

        let mut k = 0;
        while k < n {
            let absakk = a[(k, k)].abs();
            let mut r = k;
            let mut colmax = 0.0;
            for i in k + 1..n {
                let v = a[(i, k)].abs();
                if v > colmax {
                    colmax = v;
                    r = i;
                }
            }

            if absakk.max(colmax) == 0.0 {
                // Nothing left to eliminate in this column.
                pivots.push((k, Pivot::One(0.0)));
                k += 1;
                continue;
            }

            let two_by_two = if absakk >= ALPHA * colmax {
                false
            } else {
                let rowmax = (k..n)
                    .filter(|&j| j != r)
                    .map(|j| a[(r, j)].abs())
                    .fold(0.0, f64::max);
                if absakk * rowmax >= ALPHA * colmax * colmax {
                    false
                } else if a[(r, r)].abs() >= ALPHA * rowmax {
                    symmetric_swap(&mut a, &mut lower, &mut perm, k, k, r);
                    false
                } else {
                    symmetric_swap(&mut a, &mut lower, &mut perm, k, k + 1, r);
                    true
                }
            };

            if two_by_two {
                let (d11, d21, d22) = (a[(k, k)], a[(k + 1, k)], a[(k + 1, k + 1)]);
                let det = d11 * d22 - d21 * d21;
                for i in k + 2..n {
                    let (c1, c2) = (a[(i, k)], a[(i, k + 1)]);
                    lower[(i, k)] = (c1 * d22 - c2 * d21) / det;
                    lower[(i, k + 1)] = (c2 * d11 - c1 * d21) / det;
                }
                for j in k + 2..n {
                    let (u1, u2) = (a[(k, j)], a[(k + 1, j)]);
                    for i in k + 2..n {
                        a[(i, j)] -= lower[(i, k)] * u1 + lower[(i, k + 1)] * u2;
                    }
                }
                pivots.push((k, Pivot::Two(d11, d21, d22)));
                k += 2;
            } else {
                let d = a[(k, k)];
                for i in k + 1..n {
                    lower[(i, k)] = a[(i, k)] / d;
                }
                for j in k + 1..n {
                    let u = a[(k, j)];
                    for i in k + 1..n {
                        a[(i, j)] -= lower[(i, k)] * u;
                    }
                }
                pivots.push((k, Pivot::One(d)));
                k += 1;
            }
        }

        Self { lower, pivots, perm }
    }

    pub fn dimension(&self) -> usize {
        self.perm.len()
    }

    pub fn pivots(&self) -> &[(usize, Pivot)] {
        &self.pivots
    }

    /// Smallest |eigenvalue| over the blocks of D.
    pub fn smallest_pivot(&self) -> f64 {
        self.pivots
            .iter()
            .map(|(_, pivot)| match pivot.eigenvalues() {
                (a, Some(b)) => a.abs().min(b.abs()),
                (a, None) => a.abs(),
            })
            .fold(f64::INFINITY, f64::min)
    }

    /// Numbers of positive, negative and zero eigenvalues of D, which by
    /// Sylvester's law are those of the factorized matrix.
    pub fn inertia(&self) -> (usize, usize, usize) {
        let mut counts = (0, 0, 0);
        let mut tally = |value: f64| {
            if value > 0.0 {
                counts.0 += 1;
            } else if value < 0.0 {
                counts.1 += 1;
            } else {
                counts.2 += 1;
            }
        };
        for (_, pivot) in &self.pivots {
            let (a, b) = pivot.eigenvalues();
            tally(a);
            if let Some(b) = b {
                tally(b);
            }
        }
        counts
    }

    /// Solve `A x = rhs` with the stored factors.
    pub fn solve(&self, rhs: &DVector<f64>) -> DVector<f64> {
        let n = self.dimension();
        let mut y = DVector::from_fn(n, |i, _| rhs[self.perm[i]]);

        for j in 0..n {
            let yj = y[j];
            if yj != 0.0 {
                for i in j + 1..n {
                    y[i] -= self.lower[(i, j)] * yj;
                }
            }
        }

        for &(k, pivot) in &self.pivots {
            match pivot {
                Pivot::One(d) => y[k] /= d,
                Pivot::Two(d11, d21, d22) => {
                    let det = d11 * d22 - d21 * d21;
                    let (y1, y2) = (y[k], y[k + 1]);
                    y[k] = (d22 * y1 - d21 * y2) / det;
                    y[k + 1] = (d11 * y2 - d21 * y1) / det;
                }
            }
        }

        for j in (0..n).rev() {
            let mut s = y[j];
            for i in j + 1..n {
                s -= self.lower[(i, j)] * y[i];
            }
            y[j] = s;
        }

        let mut x = DVector::zeros(n);
        for (i, &p) in self.perm.iter().enumerate() {
            x[p] = y[i];
        }
        x
    }
}

/// Interchange indices `p` and `q` (both in the active block starting at
/// `k`), carrying the already computed rows of L along.
fn symmetric_swap(
    a: &mut DMatrix<f64>,
    lower: &mut DMatrix<f64>,
    perm: &mut [usize],
    k: usize,
    p: usize,
    q: usize,
) {
    if p == q {
        return;
    }
    a.swap_rows(p, q);
    a.swap_columns(p, q);
    for j in 0..k {
        let tmp = lower[(p, j)];
        lower[(p, j)] = lower[(q, j)];
        lower[(q, j)] = tmp;
    }
    perm.swap(p, q);
}
