//! Recovering numbers from the solver's free-text output.
//!
//! All regex scraping of solver output lives in this module. Each analysis
//! declares an [`ExpectedShape`]: a list of markers, each a pattern with one
//! capture group, and the field names its matches are zipped onto in order.

use crate::captured::{CapturedRun, ResultRecord, ResultValue};
use crate::error::{ParseError, ParseResult};
use regex::Regex;
use tracing::debug;
use uq_core::parse_value;

/// How many matches a marker must produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Take {
    /// Exactly one match per field.
    Exact,
    /// The first match fills the single field; later matches are ignored.
    First,
    /// Like `First`, but absence is not an error.
    Optional,
}

#[derive(Debug, Clone)]
pub struct Marker {
    regex: Regex,
    fields: Vec<&'static str>,
    take: Take,
    /// Characters dropped from the end of each capture, e.g. a closing paren.
    strip_suffix: usize,
}

impl Marker {
    pub fn new(pattern: &str, fields: &[&'static str]) -> ParseResult<Self> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            fields: fields.to_vec(),
            take: Take::Exact,
            strip_suffix: 0,
        })
    }

    pub fn first(pattern: &str, field: &'static str) -> ParseResult<Self> {
        Ok(Self {
            take: Take::First,
            ..Self::new(pattern, &[field])?
        })
    }

    pub fn optional(mut self) -> Self {
        self.take = Take::Optional;
        self
    }

    pub fn strip_suffix(mut self, chars: usize) -> Self {
        self.strip_suffix = chars;
        self
    }

    fn expected(&self) -> usize {
        match self.take {
            Take::Exact => self.fields.len(),
            Take::First | Take::Optional => 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExpectedShape {
    markers: Vec<Marker>,
}

impl ExpectedShape {
    pub fn new(markers: Vec<Marker>) -> Self {
        Self { markers }
    }

    /// Interpolation errors on the training set: each of avg, rms and max
    /// appears unscaled then scaled, followed by R-square.
    pub fn training_errors() -> ParseResult<Self> {
        Ok(Self::new(vec![
            Marker::new(r"avg error\s*=\s*(\S*)", &["train_avg", "train_avg_scaled"])?,
            Marker::new(r"rms error\s*=\s*(\S*)", &["train_rms", "train_rms_scaled"])?,
            Marker::new(r"max error\s*=\s*(\S*)", &["train_max", "train_max_scaled"])?,
            Marker::new(r"R-square    =\s*(\S*)", &["r_square"])?,
        ]))
    }

    pub fn cv_errors() -> ParseResult<Self> {
        Ok(Self::new(vec![Marker::new(
            r"final CV error\s*=\s*(\S*)",
            &[
                "cv_avg",
                "cv_avg_scaled",
                "cv_rms",
                "cv_rms_scaled",
                "cv_max",
                "cv_max_scaled",
            ],
        )?]))
    }

    /// Errors of a user regression on held-out data.
    pub fn test_errors() -> ParseResult<Self> {
        Ok(Self::new(vec![Marker::new(
            r"Prediction errors\s*=\s*(\S*)",
            &[
                "test_max",
                "test_max_scaled",
                "test_rms",
                "test_rms_scaled",
                "test_avg",
                "test_avg_scaled",
            ],
        )?]))
    }

    pub fn point_prediction() -> ParseResult<Self> {
        Ok(Self::new(vec![
            Marker::first(
                r"Interpolated Point\s*\d*:\s*output\s*\d*\s*=\s*(\S*)",
                "prediction",
            )?,
            // "stdev = 1.2e-01)"
            Marker::first(r"stdev\s*=\s*(\S*)", "stdev")?
                .optional()
                .strip_suffix(1),
        ]))
    }

    pub fn sample_moments() -> ParseResult<Self> {
        Ok(Self::new(vec![
            Marker::first(r"Sample mean\s*=\s*(\S*)", "mean")?,
            Marker::first(r"Sample std dev\s*=\s*(\S*)", "std_dev")?,
            Marker::first(r"Sample skewness\s*=\s*(\S*)", "skewness")?,
            Marker::first(r"Sample kurtosis\s*=\s*(\S*)", "kurtosis")?,
        ]))
    }
}

/// Scrape `captured` according to `shape`.
pub fn parse(captured: &CapturedRun, shape: &ExpectedShape) -> ParseResult<ResultRecord> {
    if captured.error {
        return Err(ParseError::SolverFailed {
            operation: captured.operation.clone(),
        });
    }
    let mut record = ResultRecord::new(&captured.operation);
    for marker in &shape.markers {
        let found: Vec<&str> = marker
            .regex
            .captures_iter(&captured.stdout)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();
        let ok = match marker.take {
            Take::Exact => found.len() == marker.fields.len(),
            Take::First => !found.is_empty(),
            Take::Optional => true,
        };
        if !ok {
            return Err(ParseError::UnexpectedOutputShape {
                operation: captured.operation.clone(),
                marker: marker.regex.as_str().to_string(),
                expected: marker.expected(),
                found: found.len(),
            });
        }
        for (field, text) in marker.fields.iter().zip(found) {
            let keep = text.chars().count().saturating_sub(marker.strip_suffix);
            let text: String = text.chars().take(keep).collect();
            let value = parse_value(&text).ok_or_else(|| ParseError::InvalidNumber {
                operation: captured.operation.clone(),
                field: field.to_string(),
                text: text.clone(),
            })?;
            record.insert(*field, ResultValue::Number(value));
        }
    }
    debug!(
        operation = %captured.operation,
        fields = record.fields.len(),
        "parsed solver output"
    );
    Ok(record)
}

/// Best design reported by `odoeu_foptn` / `odoeu_boptn`.
///
/// The solver prints `<cmd> best selection = i j` and later the line
/// `i j ===> output = v` carrying the criterion value for that selection.
pub fn parse_odoe_selection(captured: &CapturedRun, command: &str) -> ParseResult<ResultRecord> {
    if captured.error {
        return Err(ParseError::SolverFailed {
            operation: captured.operation.clone(),
        });
    }
    let selection = Regex::new(&format!(r"{} best selection = (\d+(?: \d+)*)", regex::escape(command)))?;
    let Some(indices_text) = selection
        .captures(&captured.stdout)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
    else {
        return Err(ParseError::UnexpectedOutputShape {
            operation: captured.operation.clone(),
            marker: selection.as_str().to_string(),
            expected: 1,
            found: 0,
        });
    };
    let indices = indices_text
        .split_whitespace()
        .map(|t| {
            t.parse::<usize>().map_err(|_| ParseError::InvalidNumber {
                operation: captured.operation.clone(),
                field: "best_indices".to_string(),
                text: t.to_string(),
            })
        })
        .collect::<ParseResult<Vec<usize>>>()?;

    let joined = indices_text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(r"\s*");
    let value_marker = Regex::new(&format!(r"{}\s*===> output = (\S*)", joined))?;
    let Some(value_text) = value_marker
        .captures(&captured.stdout)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
    else {
        return Err(ParseError::UnexpectedOutputShape {
            operation: captured.operation.clone(),
            marker: value_marker.as_str().to_string(),
            expected: 1,
            found: 0,
        });
    };
    let value = parse_value(&value_text).ok_or_else(|| ParseError::InvalidNumber {
        operation: captured.operation.clone(),
        field: "best_value".to_string(),
        text: value_text.clone(),
    })?;

    let mut record = ResultRecord::new(&captured.operation);
    record.insert("best_indices", ResultValue::Indices(indices));
    record.insert("best_value", ResultValue::Number(value));
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(stdout: &str) -> CapturedRun {
        CapturedRun::new("rscheck", stdout.to_string(), String::new(), Some(0))
    }

    const RSCHECK_OUT: &str = "\
 RSFA: avg error = 1.0e-02 (unscaled)
 RSFA: avg error = 2.0e-02 (scaled)
 RSFA: rms error = 3.0e-02 (unscaled)
 RSFA: rms error = 4.0e-02 (scaled)
 RSFA: max error = 5.0e-02 (unscaled)
 RSFA: max error = 6.0e-02 (scaled)
 RSFA: R-square    = 9.9e-01
 final CV error  = 1.1e-01 (avg unscaled)
 final CV error  = 1.2e-01 (avg scaled)
 final CV error  = 1.3e-01 (rms unscaled)
 final CV error  = 1.4e-01 (rms scaled)
 final CV error  = 1.5e-01 (max unscaled)
 final CV error  = 1.6e-01 (max scaled)
";

    #[test]
    fn training_and_cv_errors_zip_in_order() {
        let out = run(RSCHECK_OUT);
        let mut record = parse(&out, &ExpectedShape::training_errors().unwrap()).unwrap();
        record.merge(parse(&out, &ExpectedShape::cv_errors().unwrap()).unwrap());
        assert_eq!(record.number("train_avg"), Some(0.01));
        assert_eq!(record.number("train_max_scaled"), Some(0.06));
        assert_eq!(record.number("r_square"), Some(0.99));
        assert_eq!(record.number("cv_rms"), Some(0.13));
        assert_eq!(record.number("cv_max_scaled"), Some(0.16));
    }

    #[test]
    fn missing_marker_is_unexpected_shape() {
        let out = run(" RSFA: avg error = 1.0e-02\n");
        match parse(&out, &ExpectedShape::training_errors().unwrap()) {
            Err(ParseError::UnexpectedOutputShape {
                expected, found, ..
            }) => {
                assert_eq!(expected, 2);
                assert_eq!(found, 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn garbage_capture_is_invalid_number() {
        let out = run("Sample mean = abc\nSample std dev = 1\nSample skewness = 0\nSample kurtosis = 3\n");
        assert!(matches!(
            parse(&out, &ExpectedShape::sample_moments().unwrap()),
            Err(ParseError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn point_prediction_strips_paren_and_tolerates_no_stdev() {
        let out = run("Interpolated Point 1: output 1 = 4.2e+00 (stdev = 1.5e-01)\n");
        let r = parse(&out, &ExpectedShape::point_prediction().unwrap()).unwrap();
        assert_eq!(r.number("prediction"), Some(4.2));
        assert_eq!(r.number("stdev"), Some(0.15));

        let out = run("Interpolated Point 1: output 1 = 4.2e+00\n");
        let r = parse(&out, &ExpectedShape::point_prediction().unwrap()).unwrap();
        assert_eq!(r.number("stdev"), None);
    }

    #[test]
    fn failed_runs_are_refused() {
        let out = CapturedRun::new("ua", RSCHECK_OUT.to_string(), "err".to_string(), Some(0));
        assert!(matches!(
            parse(&out, &ExpectedShape::cv_errors().unwrap()),
            Err(ParseError::SolverFailed { .. })
        ));
    }

    #[test]
    fn odoe_selection_finds_value_for_best_design() {
        let out = CapturedRun::new(
            "odoeu_foptn",
            "candidate 3 7 ===> output = 2.5e+00\n\
             candidate 4 9 ===> output = 1.5e+00\n\
             odoeu_foptn best selection = 4 9\n"
                .to_string(),
            String::new(),
            Some(0),
        );
        let r = parse_odoe_selection(&out, "odoeu_foptn").unwrap();
        assert_eq!(r.fields["best_indices"], ResultValue::Indices(vec![4, 9]));
        assert_eq!(r.number("best_value"), Some(1.5));
    }
}
