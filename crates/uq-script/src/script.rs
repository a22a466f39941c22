//! A solver command script: ordered stdin lines plus the files the run leaves behind.

use std::fmt;
use uq_core::{WIRE_PRECISION, sci};

/// A file the solver writes into its working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedArtifact {
    pub file_name: String,
    /// Optional artifacts may legitimately be absent after a successful run.
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    operation: String,
    lines: Vec<String>,
    artifacts: Vec<ExpectedArtifact>,
}

impl Script {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            lines: Vec::new(),
            artifacts: Vec::new(),
        }
    }

    pub fn line(&mut self, line: impl Into<String>) -> &mut Self {
        self.lines.push(line.into());
        self
    }

    pub fn int(&mut self, value: usize) -> &mut Self {
        self.lines.push(value.to_string());
        self
    }

    /// Real-valued answer in wire notation.
    pub fn value(&mut self, value: f64) -> &mut Self {
        self.lines.push(sci(value, WIRE_PRECISION));
        self
    }

    pub fn expect(&mut self, file_name: impl Into<String>) -> &mut Self {
        self.artifacts.push(ExpectedArtifact {
            file_name: file_name.into(),
            required: true,
        });
        self
    }

    pub fn expect_optional(&mut self, file_name: impl Into<String>) -> &mut Self {
        self.artifacts.push(ExpectedArtifact {
            file_name: file_name.into(),
            required: false,
        });
        self
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn artifacts(&self) -> &[ExpectedArtifact] {
        &self.artifacts
    }

    /// Text fed to the solver's stdin, newline-terminated.
    pub fn stdin_text(&self) -> String {
        let mut out = String::with_capacity(self.lines.iter().map(|l| l.len() + 1).sum());
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    pub fn into_parts(self) -> (String, Vec<String>, Vec<ExpectedArtifact>) {
        (self.operation, self.lines, self.artifacts)
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stdin_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdin_text_terminates_every_line() {
        let mut s = Script::new("rscheck");
        s.line("load data").int(3).value(0.5).line("quit");
        assert_eq!(s.stdin_text(), "load data\n3\n5.0000000000000000e-01\nquit\n");
    }

    #[test]
    fn artifacts_keep_their_order_and_requirement() {
        let mut s = Script::new("rssobol1b");
        s.expect("matlabrssobol1b.m").expect_optional("matlabrssobol1.m");
        let names: Vec<_> = s.artifacts().iter().map(|a| (a.file_name.as_str(), a.required)).collect();
        assert_eq!(names, vec![("matlabrssobol1b.m", true), ("matlabrssobol1.m", false)]);
    }
}
