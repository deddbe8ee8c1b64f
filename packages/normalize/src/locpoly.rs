//! Kernel-weighted local-linear regression.
//!
//! Both fitters build their design once from the full data population and
//! evaluate at arbitrary query points with an Epanechnikov-style kernel
//! `0.75 * (1 - u^2)` on `|u| < 1`. They are immutable after construction,
//! so evaluations can fan out across tasks without synchronization.

use thiserror::Error;

/// Pivot threshold below which the normal equations count as singular.
const PIVOT_EPS: f64 = 1e-12;

/// The windowed normal-equations matrix has no usable pivot.
///
/// Recoverable: callers widen the bandwidth and refit.
#[derive(Debug, Error)]
#[error("singular local design matrix")]
pub struct SingularDesign;

/// One-dimensional local-linear smoother.
///
/// The design is sorted by the covariate so each evaluation only touches the
/// points inside the kernel window, found by binary search.
pub struct LocPoly {
    x: Vec<f64>,
    y: Vec<f64>,
}

impl LocPoly {
    /// Builds the smoother from `(x, y)` pairs; sorts them by `x`.
    #[must_use]
    pub fn new(mut xy: Vec<(f64, f64)>) -> Self {
        xy.sort_by(|a, b| a.0.total_cmp(&b.0));
        let (x, y) = xy.into_iter().unzip();
        Self { x, y }
    }

    /// Number of design points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Whether the design is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Local-linear fit evaluated at `x` with bandwidth `bw`.
    ///
    /// A window with no x-spread degrades to the weighted mean; an empty
    /// window yields 0 (it cannot occur when `x` is itself a design point).
    #[must_use]
    pub fn fit(&self, x: f64, bw: f64) -> f64 {
        let i0 = self.x.partition_point(|&v| v < x - bw);
        let i1 = self.x.partition_point(|&v| v < x + bw);

        let mut ybar = 0.0;
        let mut xbar = 0.0;
        let mut wt = 0.0;
        for i in i0..i1 {
            let u = (self.x[i] - x) / bw;
            if u <= -1.0 || u >= 1.0 {
                continue;
            }
            let w = 0.75 * (1.0 - u * u);
            wt += w;
            ybar += w * self.y[i];
            xbar += w * (self.x[i] - x);
        }
        if wt <= 0.0 {
            return 0.0;
        }
        ybar /= wt;
        xbar /= wt;

        let mut xycov = 0.0;
        let mut xvar = 0.0;
        for i in i0..i1 {
            let u = (self.x[i] - x) / bw;
            if u <= -1.0 || u >= 1.0 {
                continue;
            }
            let w = 0.75 * (1.0 - u * u);
            let d = self.x[i] - x - xbar;
            xycov += w * d * (self.y[i] - ybar);
            xvar += w * d * d;
        }
        xycov /= wt;
        xvar /= wt;

        if xvar <= 0.0 {
            return ybar;
        }
        let b = xycov / xvar;
        b.mul_add(-xbar, ybar)
    }
}

/// Three-covariate weighted local-linear smoother.
///
/// Design rows are `[1, z1, z2]`; evaluation points use 0 in the first slot
/// so the solved intercept coefficient is the fitted value. The kernel is
/// the product of the two covariate kernels.
pub struct LocPoly3 {
    x: Vec<[f64; 3]>,
    y: Vec<f64>,
}

impl LocPoly3 {
    /// Builds the smoother from parallel design rows and responses.
    #[must_use]
    pub fn new(x: Vec<[f64; 3]>, y: Vec<f64>) -> Self {
        debug_assert_eq!(x.len(), y.len());
        Self { x, y }
    }

    /// Weighted local-linear fit at `x` with bandwidth `bw`.
    ///
    /// # Errors
    ///
    /// [`SingularDesign`] when too few points fall inside the window for the
    /// 3x3 normal equations to be solvable; the caller retries wider.
    pub fn fit(&self, x: [f64; 3], bw: f64) -> Result<f64, SingularDesign> {
        let mut xyg = [0.0_f64; 3];
        let mut xxg = [[0.0_f64; 3]; 3];

        for (row, &yv) in self.x.iter().zip(&self.y) {
            let u1 = (row[1] - x[1]) / bw;
            if u1 <= -1.0 || u1 >= 1.0 {
                continue;
            }
            let mut w = 0.75 * (1.0 - u1 * u1);

            let u2 = (row[2] - x[2]) / bw;
            if u2 <= -1.0 || u2 >= 1.0 {
                continue;
            }
            w *= 0.75 * (1.0 - u2 * u2);

            for j1 in 0..3 {
                let d1 = row[j1] - x[j1];
                xyg[j1] += w * d1 * yv;
                for j2 in 0..3 {
                    xxg[j1][j2] += w * d1 * (row[j2] - x[j2]);
                }
            }
        }

        let beta = solve3(xxg, xyg)?;
        Ok(beta[0])
    }
}

/// Solves a 3x3 linear system by Gaussian elimination with partial pivoting.
fn solve3(mut a: [[f64; 3]; 3], mut b: [f64; 3]) -> Result<[f64; 3], SingularDesign> {
    for col in 0..3 {
        let mut pivot = col;
        for row in col + 1..3 {
            if a[row][col].abs() > a[pivot][col].abs() {
                pivot = row;
            }
        }
        if a[pivot][col].abs() < PIVOT_EPS {
            return Err(SingularDesign);
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..3 {
            let f = a[row][col] / a[col][col];
            for k in col..3 {
                a[row][k] -= f * a[col][k];
            }
            b[row] -= f * b[col];
        }
    }

    let mut x = [0.0_f64; 3];
    for row in (0..3).rev() {
        let mut s = b[row];
        for k in row + 1..3 {
            s -= a[row][k] * x[k];
        }
        x[row] = s / a[row][row];
    }
    Ok(x)
}
