//! Solver version and optional-module detection (`solver --info`).

use crate::driver::ProcessDriver;
use crate::error::{SolverError, SolverResult};
use std::collections::BTreeMap;
use tracing::info;

/// Optional solver modules worth knowing about.
pub const KNOWN_MODULES: [&str; 4] = ["MARS", "TPROS", "SVM", "METIS"];

const VERSION_MARKER: &str = "PSUADE version";
const INSTALLED_MARKER: &str = "installed... true";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SolverInfo {
    pub version: Option<String>,
    pub modules: BTreeMap<String, bool>,
}

impl SolverInfo {
    pub fn has_module(&self, name: &str) -> bool {
        self.modules.get(name).copied().unwrap_or(false)
    }

    /// Fail unless the reported version is at least `required`.
    pub fn require_version(&self, required: &str) -> SolverResult<()> {
        let found = self.version.as_deref().unwrap_or("unknown");
        if version_satisfies(found, required) {
            Ok(())
        } else {
            Err(SolverError::IncompatibleVersion {
                found: found.to_string(),
                required: required.to_string(),
            })
        }
    }
}

pub fn parse_info(text: &str) -> SolverInfo {
    let mut info = SolverInfo {
        version: None,
        modules: KNOWN_MODULES.iter().map(|m| (m.to_string(), false)).collect(),
    };
    for line in text.lines() {
        if line.contains(VERSION_MARKER) {
            info.version = line.split_whitespace().last().map(str::to_string);
        } else if line.contains(INSTALLED_MARKER) {
            if let Some(module) = KNOWN_MODULES.iter().find(|m| line.contains(*m)) {
                info.modules.insert(module.to_string(), true);
            }
        }
    }
    info
}

/// Compare dotted versions left to right. Trailing letters in a component are ignored.
pub fn version_satisfies(found: &str, required: &str) -> bool {
    let number = |part: &str| -> Option<u64> {
        let digits: String = part
            .chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(|c| c.is_ascii_digit())
            .collect();
        digits.parse().ok()
    };
    let found: Vec<Option<u64>> = found.split('.').map(number).collect();
    let required: Vec<Option<u64>> = required.split('.').map(number).collect();
    if found.iter().any(Option::is_none) || required.iter().any(Option::is_none) {
        return false;
    }
    for (f, r) in found.iter().zip(&required) {
        match f.cmp(r) {
            std::cmp::Ordering::Less => return false,
            std::cmp::Ordering::Greater => return true,
            std::cmp::Ordering::Equal => {}
        }
    }
    true
}

impl ProcessDriver {
    /// Ask the solver for its version and installed modules.
    pub fn probe(&self) -> SolverResult<SolverInfo> {
        let info_arg = std::ffi::OsStr::new("--info");
        let captured = self.session().run_args("info", &[info_arg])?.into_result()?;
        let info = parse_info(&captured.stdout);
        info!(version = ?info.version, "probed solver");
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO: &str = "\
**********************************************
 PSUADE version 1.7.8a
 MARS    installed... true
 TPROS   installed... false
 METIS   installed... true
";

    #[test]
    fn info_lists_version_and_modules() {
        let info = parse_info(INFO);
        assert_eq!(info.version.as_deref(), Some("1.7.8a"));
        assert!(info.has_module("MARS"));
        assert!(info.has_module("METIS"));
        assert!(!info.has_module("TPROS"));
        assert!(!info.has_module("SVM"));
    }

    #[test]
    fn versions_compare_numerically() {
        assert!(version_satisfies("1.7.8a", "1.7.6"));
        assert!(version_satisfies("1.7.6", "1.7.6"));
        assert!(version_satisfies("2.0", "1.7.6"));
        assert!(version_satisfies("1.10.0", "1.7.6"));
        assert!(!version_satisfies("1.7.5", "1.7.6"));
        assert!(!version_satisfies("unknown", "1.7.6"));
    }

    #[test]
    fn old_version_is_rejected() {
        let info = parse_info(" PSUADE version 1.6.0\n");
        assert!(matches!(
            info.require_version("1.7.6"),
            Err(SolverError::IncompatibleVersion { .. })
        ));
    }
}
