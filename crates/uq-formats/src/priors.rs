//! Prior tables: one optional [`PriorSpec`] per variable input, stored as YAML or JSON.

use crate::FormatResult;
use std::path::Path;
use uq_core::PriorSpec;

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

pub fn load_priors(path: &Path) -> FormatResult<Vec<Option<PriorSpec>>> {
    let content = std::fs::read_to_string(path)?;
    let priors: Vec<Option<PriorSpec>> = if is_json(path) {
        serde_json::from_str(&content)?
    } else {
        serde_yaml::from_str(&content)?
    };
    for prior in priors.iter().flatten() {
        prior.validate()?;
    }
    Ok(priors)
}

pub fn save_priors(path: &Path, priors: &[Option<PriorSpec>]) -> FormatResult<()> {
    let content = if is_json(path) {
        serde_json::to_string_pretty(priors)?
    } else {
        serde_yaml::to_string(priors)?
    };
    std::fs::write(path, content)?;
    Ok(())
}
