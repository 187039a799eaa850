use statrs::statistics::{Data, Median as _, Statistics as _};

/**
Calculates the arithmetic mean of a slice of f64 values.

## Returns
The mean, or `None` for an empty slice.
 */
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.mean())
}

/**
Calculates the median of a slice of f64 values.

## Arguments
- `values`: A slice of f64 values.

## Returns
The median of the values, or `f64::NAN` if the slice is empty or holds a
non-finite value.
 */
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() || values.iter().any(|v| !v.is_finite()) {
        return f64::NAN;
    }
    Data::new(values.to_vec()).median()
}

/**
Calculates the sample standard deviation (n - 1 denominator) of a slice of f64 values.

## Arguments
- `values`: A slice of f64 values.

## Returns
The standard deviation, or `None` if calculation is not possible (fewer than
two values, or any non-finite value).
 */
pub fn std_deviation(values: &[f64]) -> Option<f64> {
    if values.len() < 2 || values.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Some(values.std_dev())
}

/**
Ordinary least squares fit of `y = slope * x + intercept`.

## Returns
`(slope, intercept)`, or `None` with fewer than two points or when every `x`
is identical.
 */
pub fn linear_regression(xs: &[f64], ys: &[f64]) -> Option<(f64, f64)> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);
    let x_mean = mean(xs)?;
    let y_mean = mean(ys)?;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        sxy += (x - x_mean) * (y - y_mean);
        sxx += (x - x_mean) * (x - x_mean);
    }
    if sxx == 0.0 {
        return None;
    }
    let slope = sxy / sxx;
    Some((slope, y_mean - slope * x_mean))
}

/// Coefficient of determination of a fitted line. A constant series has no
/// variance to explain and yields 0.
pub fn r_squared(xs: &[f64], ys: &[f64], slope: f64, intercept: f64) -> f64 {
    let Some(y_mean) = mean(ys) else {
        return 0.0;
    };
    let ss_tot: f64 = ys.iter().map(|y| (y - y_mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return 0.0;
    }
    let ss_res: f64 = xs
        .iter()
        .zip(ys)
        .map(|(x, y)| (y - (slope * x + intercept)).powi(2))
        .sum();
    1.0 - ss_res / ss_tot
}

/// Pearson correlation coefficient; `None` when either side has no variance.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);
    let x_mean = mean(xs)?;
    let y_mean = mean(ys)?;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        sxy += (x - x_mean) * (y - y_mean);
        sxx += (x - x_mean).powi(2);
        syy += (y - y_mean).powi(2);
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    let r = sxy / (sxx * syy).sqrt();
    r.is_finite().then_some(r)
}

/// Compound annual growth rate in percent.
pub fn cagr(start: f64, end: f64, years: f64) -> Option<f64> {
    if start <= 0.0 || end <= 0.0 || years <= 0.0 {
        return None;
    }
    Some(((end / start).powf(1.0 / years) - 1.0) * 100.0)
}

/// Percentile rank of every value, ties sharing their average rank.
pub fn percentile_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(std::cmp::Ordering::Equal));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        // 1-based ranks i+1..=j+1 share their average.
        let average = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = average / n as f64;
        }
        i = j + 1;
    }
    ranks
}
