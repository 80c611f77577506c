//! Validation scores.

/// Fraction of positions where `predicted` equals `gold`.
///
/// # Returns
/// A value in `[0, 1]`, `0` for empty inputs.
pub fn accuracy<T: PartialEq>(predicted: &[T], gold: &[T]) -> f32 {
    let n = predicted.len().min(gold.len());
    if n == 0 {
        return 0.0;
    }

    let hits = predicted.iter().zip(gold).filter(|(p, g)| p == g).count();
    hits as f32 / n as f32
}

/// Pearson correlation coefficient between `x` and `y`.
///
/// Computed in `f64` so perfectly correlated inputs come out as exactly `1`.
///
/// # Returns
/// A value in `[-1, 1]`; `0` when either side has no variance or there are no pairs.
pub fn pearson(x: &[f32], y: &[f32]) -> f32 {
    let n = x.len().min(y.len());
    if n == 0 {
        return 0.0;
    }

    let mean = |v: &[f32]| v[..n].iter().map(|&a| a as f64).sum::<f64>() / n as f64;
    let (mx, my) = (mean(x), mean(y));

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (&a, &b) in x.iter().zip(y) {
        let (dx, dy) = (a as f64 - mx, b as f64 - my);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }

    if sxx == 0.0 || syy == 0.0 {
        return 0.0;
    }

    (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0) as f32
}
