//! Small dense solvers shared by the emulators

use ndarray::{Array1, Array2};

/// Lower-triangular Cholesky factor of a symmetric positive-definite matrix
pub(crate) fn cholesky(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    if n != a.ncols() {
        return None;
    }
    let mut l = Array2::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 || !diag.is_finite() {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }
    Some(l)
}

/// Cholesky factor, adding growing diagonal jitter until the matrix is positive definite
pub(crate) fn cholesky_with_jitter(a: &Array2<f64>) -> Option<Array2<f64>> {
    if let Some(l) = cholesky(a) {
        return Some(l);
    }
    let n = a.nrows();
    let scale = (a.diag().iter().map(|v| v.abs()).sum::<f64>() / n.max(1) as f64).max(1e-12);
    let mut jitter = 1e-10 * scale;
    for _ in 0..8 {
        let mut a_reg = a.clone();
        for k in 0..n {
            a_reg[[k, k]] += jitter;
        }
        if let Some(l) = cholesky(&a_reg) {
            return Some(l);
        }
        jitter *= 10.0;
    }
    None
}

/// Solve L y = b for lower-triangular L
pub(crate) fn forward_substitute(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = l.nrows();
    let mut y = Array1::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * y[j];
        }
        y[i] = (b[i] - sum) / l[[i, i]];
    }
    y
}

/// Solve L^T x = y for lower-triangular L
pub(crate) fn backward_substitute(l: &Array2<f64>, y: &Array1<f64>) -> Array1<f64> {
    let n = l.nrows();
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (y[i] - sum) / l[[i, i]];
    }
    x
}

/// Solve A x = b given the Cholesky factor of A
pub(crate) fn cholesky_solve_factored(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    backward_substitute(l, &forward_substitute(l, b))
}

/// Solve a general square system A X = B by Gaussian elimination with partial pivoting
pub(crate) fn lu_solve(a: &Array2<f64>, b: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.nrows() {
        return None;
    }
    let m = b.ncols();
    let mut a = a.clone();
    let mut x = b.clone();
    let scale = a.iter().fold(0.0f64, |acc, v| acc.max(v.abs())).max(1.0);

    for col in 0..n {
        let mut pivot_row = col;
        for row in col + 1..n {
            if a[[row, col]].abs() > a[[pivot_row, col]].abs() {
                pivot_row = row;
            }
        }
        if a[[pivot_row, col]].abs() < 1e-12 * scale {
            return None;
        }
        if pivot_row != col {
            for j in 0..n {
                a.swap([col, j], [pivot_row, j]);
            }
            for j in 0..m {
                x.swap([col, j], [pivot_row, j]);
            }
        }

        let pivot = a[[col, col]];
        for row in col + 1..n {
            let factor = a[[row, col]] / pivot;
            if factor == 0.0 {
                continue;
            }
            for j in col..n {
                a[[row, j]] -= factor * a[[col, j]];
            }
            for j in 0..m {
                x[[row, j]] -= factor * x[[col, j]];
            }
        }
    }

    for col in (0..n).rev() {
        for j in 0..m {
            let mut sum = x[[col, j]];
            for k in col + 1..n {
                sum -= a[[col, k]] * x[[k, j]];
            }
            x[[col, j]] = sum / a[[col, col]];
        }
    }
    Some(x)
}

/// Squared Euclidean distances between the rows of `a` and the rows of `b`
pub(crate) fn sq_distances(a: &Array2<f64>, b: &Array2<f64>) -> Array2<f64> {
    Array2::from_shape_fn((a.nrows(), b.nrows()), |(i, j)| {
        a.row(i)
            .iter()
            .zip(b.row(j).iter())
            .map(|(p, q)| (p - q).powi(2))
            .sum()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_cholesky_solve() {
        let a = array![[4.0, 2.0], [2.0, 3.0]];
        let b = array![2.0, 1.0];
        let l = cholesky_with_jitter(&a).unwrap();
        let x = cholesky_solve_factored(&l, &b);
        let back = a.dot(&x);
        assert!((back[0] - 2.0).abs() < 1e-10);
        assert!((back[1] - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_cholesky_rejects_indefinite() {
        let a = array![[1.0, 2.0], [2.0, 1.0]];
        assert!(cholesky(&a).is_none());
    }

    #[test]
    fn test_lu_solve_indefinite() {
        let a = array![[0.0, 1.0], [1.0, 0.0]];
        let b = array![[3.0], [5.0]];
        let x = lu_solve(&a, &b).unwrap();
        assert!((x[[0, 0]] - 5.0).abs() < 1e-12);
        assert!((x[[1, 0]] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_lu_solve_singular() {
        let a = array![[1.0, 2.0], [2.0, 4.0]];
        assert!(lu_solve(&a, &array![[1.0], [1.0]]).is_none());
    }
}
