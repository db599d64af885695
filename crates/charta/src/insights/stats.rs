// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

//! Statistics used by the insight engine. Column inputs hold finite, non-null values only.

use polars::prelude::{ChunkAgg, ChunkQuantile, ChunkVar, Float64Chunked, QuantileMethod};
use serde::{Deserialize, Serialize};

const EPSILON: f64 = 1e-12;

/// Linear interpolation between closest ranks.
pub fn quantile(values: &Float64Chunked, q: f64) -> Option<f64> {
    values
        .quantile(q.clamp(0.0, 1.0), QuantileMethod::Linear)
        .ok()
        .flatten()
}

fn paired_mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Moments {
    pub mean: f64,
    pub std_dev: f64,
    pub skewness: f64,
    pub excess_kurtosis: f64,
}

/// Biased sample moments. `None` below two values or for constant data.
pub fn moments(values: &Float64Chunked) -> Option<Moments> {
    if values.len() < 2 {
        return None;
    }
    let (mean, std_dev) = (values.mean()?, values.std(0)?);
    if std_dev * std_dev <= EPSILON {
        return None;
    }
    let n = values.len() as f64;
    let (third, fourth) = values
        .into_iter()
        .flatten()
        .map(|v| (v - mean) / std_dev)
        .fold((0.0, 0.0), |(m3, m4), z| (m3 + z.powi(3), m4 + z.powi(4)));
    Some(Moments {
        mean,
        std_dev,
        skewness: third / n,
        excess_kurtosis: fourth / n - 3.0,
    })
}

/// Pearson coefficient, `None` when either side has zero variance.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let (mx, my) = (paired_mean(x), paired_mean(y));
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        sxy += (a - mx) * (b - my);
        sxx += (a - mx).powi(2);
        syy += (b - my).powi(2);
    }
    if sxx <= EPSILON || syy <= EPSILON {
        return None;
    }
    if x == y {
        return Some(1.0);
    }
    Some((sxy / (sxx.sqrt() * syy.sqrt())).clamp(-1.0, 1.0))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Regression {
    pub slope: f64,
    pub intercept: f64,
    pub r: f64,
    pub r_squared: f64,
    pub p_value: f64,
    pub std_err: f64,
}

/// Ordinary least squares with a two-sided t-test on the slope.
pub fn linear_regression(x: &[f64], y: &[f64]) -> Option<Regression> {
    let n = x.len();
    if n != y.len() || n < 3 {
        return None;
    }
    let (mx, my) = (paired_mean(x), paired_mean(y));
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        sxy += (a - mx) * (b - my);
        sxx += (a - mx).powi(2);
        syy += (b - my).powi(2);
    }
    if sxx <= EPSILON {
        return None;
    }
    let slope = sxy / sxx;
    let intercept = my - slope * mx;
    let df = (n - 2) as f64;

    if syy <= EPSILON {
        return Some(Regression {
            slope: 0.0,
            intercept,
            r: 0.0,
            r_squared: 0.0,
            p_value: 1.0,
            std_err: 0.0,
        });
    }

    let r = (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0);
    let r_squared = r * r;
    let residual = (1.0 - r_squared).max(0.0);
    let std_err = (residual * syy / df / sxx).sqrt();
    let p_value = if residual <= EPSILON {
        0.0
    } else {
        let t = r * (df / residual).sqrt();
        student_t_two_sided(t, df)
    };
    Some(Regression {
        slope,
        intercept,
        r,
        r_squared,
        p_value,
        std_err,
    })
}

/// Two-sided p-value of Student's t with `df` degrees of freedom.
pub fn student_t_two_sided(t: f64, df: f64) -> f64 {
    if !t.is_finite() {
        return 0.0;
    }
    regularized_incomplete_beta(df / (df + t * t), df / 2.0, 0.5).clamp(0.0, 1.0)
}

pub fn ln_gamma(x: f64) -> f64 {
    const COEFFICIENTS: [f64; 6] = [
        76.180_091_729_471_46,
        -86.505_320_329_416_77,
        24.014_098_240_830_91,
        -1.231_739_572_450_155,
        0.001_208_650_973_866_179,
        -0.000_005_395_239_384_953,
    ];
    let mut y = x;
    let tmp = x + 5.5;
    let tmp = tmp - (x + 0.5) * tmp.ln();
    let mut series = 1.000_000_000_190_015;
    for coefficient in COEFFICIENTS {
        y += 1.0;
        series += coefficient / y;
    }
    -tmp + (2.506_628_274_631_000_5 * series / x).ln()
}

pub fn regularized_incomplete_beta(x: f64, a: f64, b: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let ln_front = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(x, a, b) / a
    } else {
        1.0 - front * beta_continued_fraction(1.0 - x, b, a) / b
    }
}

/// Modified Lentz evaluation of the incomplete beta continued fraction.
fn beta_continued_fraction(x: f64, a: f64, b: f64) -> f64 {
    const MAX_ITERATIONS: usize = 300;
    const TINY: f64 = 1e-300;
    const TOLERANCE: f64 = 3e-16;

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;
    let mut c = 1.0;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < TINY {
        d = TINY;
    }
    d = 1.0 / d;
    let mut h = d;
    for m in 1..=MAX_ITERATIONS {
        let m = m as f64;
        let m2 = 2.0 * m;
        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        h *= d * c;
        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;
        if (delta - 1.0).abs() < TOLERANCE {
            break;
        }
    }
    h
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

/// Equal-width buckets over `[min, max]`; the last bucket is closed.
pub fn histogram(values: &Float64Chunked, buckets: usize) -> Vec<Bucket> {
    let buckets = buckets.max(1);
    let (Some(min), Some(max)) = (values.min(), values.max()) else {
        return Vec::new();
    };
    if (max - min).abs() <= EPSILON {
        return vec![Bucket {
            lower: min,
            upper: max,
            count: values.len(),
        }];
    }
    let width = (max - min) / buckets as f64;
    let mut counts = vec![0usize; buckets];
    for value in values.into_iter().flatten() {
        let idx = (((value - min) / width) as usize).min(buckets - 1);
        counts[idx] += 1;
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| Bucket {
            lower: min + width * i as f64,
            upper: if i + 1 == buckets {
                max
            } else {
                min + width * (i + 1) as f64
            },
            count,
        })
        .collect()
}

pub fn correlation_strength(abs_r: f64) -> &'static str {
    match abs_r {
        r if r >= 0.8 => "very strong",
        r if r >= 0.6 => "strong",
        r if r >= 0.4 => "moderate",
        r if r >= 0.2 => "weak",
        _ => "very weak",
    }
}

pub fn distribution_shape(moments: Option<&Moments>) -> &'static str {
    let Some(m) = moments else {
        return "constant";
    };
    if m.skewness.abs() < 0.5 {
        if m.excess_kurtosis.abs() < 0.5 {
            "approximately normal"
        } else if m.excess_kurtosis > 0.5 {
            "heavy-tailed"
        } else {
            "light-tailed"
        }
    } else if m.skewness > 0.5 {
        "right-skewed"
    } else {
        "left-skewed"
    }
}

pub fn round_to(value: f64, decimal_places: usize) -> f64 {
    let factor = 10f64.powi(decimal_places.min(12) as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(values: &[f64]) -> Float64Chunked {
        Float64Chunked::from_vec("v".into(), values.to_vec())
    }

    #[test]
    fn test_quantile_interpolates() {
        let values = column(&[4.0, 1.0, 3.0, 2.0]);
        assert_eq!(quantile(&values, 0.0), Some(1.0));
        assert_eq!(quantile(&values, 1.0), Some(4.0));
        assert_eq!(quantile(&values, 0.5), Some(2.5));
        assert_eq!(quantile(&column(&[]), 0.5), None);
    }

    #[test]
    fn test_pearson_self_is_exactly_one() {
        let values = [0.1, 0.7, 1.3, 2.9, 3.3, 10.0];
        assert_eq!(pearson(&values, &values), Some(1.0));
        assert_eq!(pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]), None);
        let inverse: Vec<f64> = values.iter().map(|v| -v).collect();
        assert!((pearson(&values, &inverse).unwrap() + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_regression_perfect_line() {
        let x = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let fit = linear_regression(&x, &y).unwrap();
        assert!((fit.slope - 1.0).abs() < 1e-12);
        assert!((fit.intercept - 1.0).abs() < 1e-12);
        assert_eq!(fit.p_value, 0.0);
    }

    #[test]
    fn test_regression_noise_is_not_significant() {
        let x = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [3.0, 1.0, 4.0, 1.0, 5.0, 2.0];
        let fit = linear_regression(&x, &y).unwrap();
        assert!(fit.p_value > 0.05);
        assert!(fit.p_value < 1.0);
    }

    #[test]
    fn test_t_distribution_reference_values() {
        // t = 2.228 at 10 df is the 97.5th percentile
        let p = student_t_two_sided(2.228_138_851_986_5, 10.0);
        assert!((p - 0.05).abs() < 1e-6);
        assert!((student_t_two_sided(0.0, 7.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_histogram_counts_every_value() {
        let values = column(&(0..100).map(f64::from).collect::<Vec<_>>());
        let buckets = histogram(&values, 30);
        assert_eq!(buckets.len(), 30);
        assert_eq!(buckets.iter().map(|b| b.count).sum::<usize>(), 100);
        assert_eq!(buckets.last().unwrap().upper, 99.0);
        assert_eq!(histogram(&column(&[2.0, 2.0]), 30).len(), 1);
    }

    #[test]
    fn test_labels() {
        assert_eq!(correlation_strength(0.85), "very strong");
        assert_eq!(correlation_strength(0.1), "very weak");
        assert_eq!(distribution_shape(None), "constant");
        let skewed = moments(&column(&[1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 3.0, 10.0])).unwrap();
        assert_eq!(distribution_shape(Some(&skewed)), "right-skewed");
        assert_eq!(round_to(3.14159, 2), 3.14);
    }
}
