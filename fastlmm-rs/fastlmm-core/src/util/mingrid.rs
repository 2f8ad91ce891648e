//! One-dimensional minimization: grid search refined with Brent's method.
//!
//! The objective is evaluated on an evenly spaced grid; every local minimum
//! of the grid (boundaries included) is then polished by bounded Brent
//! search inside its neighboring grid cells. The best point ever evaluated
//! is returned, so the answer is never worse than the best grid point.

/// Absolute x tolerance for the Brent refinement.
pub const BRENT_TOL: f64 = 1e-6;

/// Iteration cap for one Brent refinement.
pub const BRENT_MAX_ITER: usize = 100;

/// Minimize `f` over [min, max] using `n_grid` intervals (n_grid + 1 points).
///
/// Returns `(x, f(x))` of the best point seen. Errors from `f` abort the
/// search and are returned as-is.
pub fn minimize_1d<F, E>(mut f: F, n_grid: usize, min: f64, max: f64) -> Result<(f64, f64), E>
where
    F: FnMut(f64) -> Result<f64, E>,
{
    let n_grid = n_grid.max(1);
    let step = (max - min) / n_grid as f64;
    let grid: Vec<f64> = (0..=n_grid).map(|i| min + step * i as f64).collect();

    let mut best = (f64::NAN, f64::INFINITY);
    let mut eval = |x: f64, best: &mut (f64, f64)| -> Result<f64, E> {
        let fx = f(x)?;
        if best.0.is_nan() || fx < best.1 || (best.1.is_nan() && !fx.is_nan()) {
            *best = (x, fx);
        }
        Ok(fx)
    };

    let mut values = Vec::with_capacity(grid.len());
    for &x in &grid {
        values.push(eval(x, &mut best)?);
    }

    let last = grid.len() - 1;
    for i in 0..=last {
        let left_ok = i == 0 || values[i] <= values[i - 1];
        let right_ok = i == last || values[i] <= values[i + 1];
        if !(left_ok && right_ok) {
            continue;
        }
        let lo = grid[i.saturating_sub(1)];
        let hi = grid[(i + 1).min(last)];
        if hi <= lo {
            continue;
        }
        brent_bounded(|x| eval(x, &mut best), lo, hi, BRENT_TOL, BRENT_MAX_ITER)?;
    }

    Ok(best)
}

/// Bounded Brent minimization of `f` on [a, b].
///
/// Golden-section steps with parabolic interpolation when it stays inside
/// the bracket. Returns the best `(x, f(x))` found.
pub fn brent_bounded<F, E>(
    mut f: F,
    a: f64,
    b: f64,
    xatol: f64,
    max_iter: usize,
) -> Result<(f64, f64), E>
where
    F: FnMut(f64) -> Result<f64, E>,
{
    let golden = 0.5 * (3.0 - 5.0f64.sqrt());
    let sqrt_eps = f64::EPSILON.sqrt();

    let (mut a, mut b) = (a, b);
    let mut fulc = a + golden * (b - a);
    let mut nfc = fulc;
    let mut xf = fulc;
    let mut rat = 0.0f64;
    let mut e = 0.0f64;
    let mut fx = f(xf)?;
    let mut ffulc = fx;
    let mut fnfc = fx;
    let mut xm = 0.5 * (a + b);
    let mut tol1 = sqrt_eps * xf.abs() + xatol / 3.0;
    let mut tol2 = 2.0 * tol1;

    for _ in 0..max_iter {
        if (xf - xm).abs() <= tol2 - 0.5 * (b - a) {
            break;
        }
        let mut golden_step = true;

        if e.abs() > tol1 {
            golden_step = false;
            let mut r = (xf - nfc) * (fx - ffulc);
            let q0 = (xf - fulc) * (fx - fnfc);
            let mut p = (xf - fulc) * q0 - (xf - nfc) * r;
            let mut q = 2.0 * (q0 - r);
            if q > 0.0 {
                p = -p;
            }
            q = q.abs();
            r = e;
            e = rat;

            if p.abs() < (0.5 * q * r).abs() && p > q * (a - xf) && p < q * (b - xf) {
                rat = p / q;
                let x = xf + rat;
                if (x - a) < tol2 || (b - x) < tol2 {
                    rat = if xm - xf >= 0.0 { tol1 } else { -tol1 };
                }
            } else {
                golden_step = true;
            }
        }

        if golden_step {
            e = if xf >= xm { a - xf } else { b - xf };
            rat = golden * e;
        }

        let si = if rat >= 0.0 { 1.0 } else { -1.0 };
        let x = xf + si * rat.abs().max(tol1);
        let fu = f(x)?;

        if fu <= fx {
            if x >= xf {
                a = xf;
            } else {
                b = xf;
            }
            fulc = nfc;
            ffulc = fnfc;
            nfc = xf;
            fnfc = fx;
            xf = x;
            fx = fu;
        } else {
            if x < xf {
                a = x;
            } else {
                b = x;
            }
            if fu <= fnfc || nfc == xf {
                fulc = nfc;
                ffulc = fnfc;
                nfc = x;
                fnfc = fu;
            } else if fu <= ffulc || fulc == xf || fulc == nfc {
                fulc = x;
                ffulc = fu;
            }
        }

        xm = 0.5 * (a + b);
        tol1 = sqrt_eps * xf.abs() + xatol / 3.0;
        tol2 = 2.0 * tol1;
    }

    Ok((xf, fx))
}
