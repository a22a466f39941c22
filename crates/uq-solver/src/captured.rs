//! What one solver invocation produced.

use crate::error::{SolverError, SolverResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Lines of stderr (or stdout, when stderr is empty) kept in runtime errors.
const EXCERPT_LINES: usize = 12;

const RANK_MARKER: &str = "Regression ERROR: true rank of sample";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedRun {
    pub operation: String,
    pub stdout: String,
    pub stderr: String,
    /// Non-empty stderr or a non-zero exit.
    pub error: bool,
    pub exit_code: Option<i32>,
}

impl CapturedRun {
    pub fn new(operation: impl Into<String>, stdout: String, stderr: String, exit_code: Option<i32>) -> Self {
        let error = !stderr.trim().is_empty() || exit_code != Some(0);
        Self {
            operation: operation.into(),
            stdout,
            stderr,
            error,
            exit_code,
        }
    }

    /// Turn a flagged run into [`SolverError::Runtime`].
    pub fn into_result(self) -> SolverResult<CapturedRun> {
        if !self.error {
            return Ok(self);
        }
        Err(SolverError::Runtime {
            excerpt: self.excerpt(),
            diagnosis: self.diagnosis(),
            operation: self.operation,
        })
    }

    fn excerpt(&self) -> String {
        let source = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        let lines: Vec<&str> = source.lines().filter(|l| !l.trim().is_empty()).collect();
        let start = lines.len().saturating_sub(EXCERPT_LINES);
        let mut out = lines[start..].join("\n");
        if out.is_empty() {
            out = match self.exit_code {
                Some(code) => format!("exit code {}", code),
                None => "terminated by signal".to_string(),
            };
        }
        out
    }

    fn diagnosis(&self) -> Option<String> {
        if self.stdout.contains(RANK_MARKER) || self.stderr.contains(RANK_MARKER) {
            Some(
                "the sample matrix is rank deficient for this regression; \
                 try a lower polynomial order or a larger ensemble"
                    .to_string(),
            )
        } else {
            None
        }
    }
}

/// One parsed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum ResultValue {
    Number(f64),
    Text(String),
    Path(PathBuf),
    Indices(Vec<usize>),
}

impl ResultValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ResultValue::Number(v) => Some(*v),
            _ => None,
        }
    }
}

/// Structured outcome of one analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ResultRecord {
    pub operation: String,
    pub fields: BTreeMap<String, ResultValue>,
    pub artifacts: Vec<PathBuf>,
}

impl ResultRecord {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Default::default()
        }
    }

    pub fn insert(&mut self, field: impl Into<String>, value: ResultValue) {
        self.fields.insert(field.into(), value);
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        self.fields.get(field).and_then(ResultValue::as_number)
    }

    /// Fold `other`'s fields and artifacts into this record.
    pub fn merge(&mut self, other: ResultRecord) {
        self.fields.extend(other.fields);
        self.artifacts.extend(other.artifacts);
    }
}
