//! The sample an uncertainty analysis draws from its fitted surface.
//!
//! The file is a simple sample table with `%` comment lines. Each row holds
//! the variable inputs, then the surface mean followed by the lower and upper
//! three-sigma bounds.

use crate::simple::{SimpleSample, parse_simple};
use crate::{FormatResult, parse_error};
use std::path::Path;

/// File the solver leaves behind after `rs_ua`.
pub const RSUA_SAMPLE_FILE: &str = "rsua_sample";

/// Moments of the surface mean over the drawn sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleMoments {
    pub mean: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    /// Biased (moment) skewness.
    pub skewness: f64,
    /// Bias-corrected kurtosis, 3 for a normal sample.
    pub kurtosis: f64,
}

pub fn read_rsua_sample(path: &Path) -> FormatResult<SimpleSample> {
    parse_simple(&std::fs::read_to_string(path)?, false)
}

/// Moments of the first output column.
///
/// Needs at least four rows. A constant column has zero skewness and the
/// normal kurtosis.
pub fn mean_moments(sample: &SimpleSample) -> FormatResult<SampleMoments> {
    if sample.n_outputs == 0 {
        return Err(parse_error(1, "sample has no output columns"));
    }
    let values: Vec<f64> = sample.outputs.iter().map(|row| row[0]).collect();
    moments(&values)
}

pub fn moments(values: &[f64]) -> FormatResult<SampleMoments> {
    let n = values.len();
    if n < 4 {
        return Err(parse_error(1, format!("{} samples are too few for moments", n)));
    }
    let nf = n as f64;
    let mean = values.iter().sum::<f64>() / nf;
    let central = |power: i32| values.iter().map(|v| (v - mean).powi(power)).sum::<f64>() / nf;
    let (m2, m3, m4) = (central(2), central(3), central(4));
    if m2 == 0.0 {
        return Ok(SampleMoments {
            mean,
            std_dev: 0.0,
            skewness: 0.0,
            kurtosis: 3.0,
        });
    }
    let skewness = m3 / m2.powf(1.5);
    let excess = m4 / (m2 * m2) - 3.0;
    let corrected = ((nf + 1.0) * excess + 6.0) * (nf - 1.0) / ((nf - 2.0) * (nf - 3.0));
    Ok(SampleMoments {
        mean,
        std_dev: m2.sqrt(),
        skewness,
        kurtosis: corrected + 3.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
% rsua_sample: inputs, then mean and +/- 3 sigma
5 1 3
0.1 1.0 0.7 1.3
0.3 2.0 1.7 2.3
0.5 3.0 2.7 3.3
% interior comment
0.7 4.0 3.7 4.3
0.9 5.0 4.7 5.3
";

    #[test]
    fn moments_come_from_the_mean_column() {
        let sample = parse_simple(SAMPLE, false).unwrap();
        assert_eq!(sample.n_outputs, 3);
        let m = mean_moments(&sample).unwrap();
        assert!((m.mean - 3.0).abs() < 1e-12);
        assert!((m.std_dev - 2f64.sqrt()).abs() < 1e-12);
        assert!(m.skewness.abs() < 1e-12);
        assert!((m.kurtosis - 1.8).abs() < 1e-12);
    }

    #[test]
    fn skewed_sample_has_positive_skewness() {
        let m = moments(&[0.0, 0.0, 0.0, 0.0, 10.0]).unwrap();
        assert!(m.skewness > 0.5);
        assert!((m.mean - 2.0).abs() < 1e-12);
    }

    #[test]
    fn constant_and_tiny_samples() {
        let m = moments(&[2.0; 6]).unwrap();
        assert_eq!((m.std_dev, m.skewness, m.kurtosis), (0.0, 0.0, 3.0));
        assert!(moments(&[1.0, 2.0, 3.0]).is_err());
        let inputs_only = parse_simple("4 1\n0.1\n0.2\n0.3\n0.4\n", false).unwrap();
        assert!(mean_moments(&inputs_only).is_err());
    }
}
