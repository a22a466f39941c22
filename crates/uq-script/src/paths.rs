//! File paths as the solver must see them.
//!
//! Some platforms need paths rewritten before they can be typed at the
//! solver's prompt (no spaces, short forms). The builder routes every path it
//! emits through a [`PathNormalizer`].

use std::path::Path;

pub trait PathNormalizer: Send + Sync {
    fn normalize(&self, path: &Path) -> String;
}

/// Emits paths unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityPaths;

impl PathNormalizer for IdentityPaths {
    fn normalize(&self, path: &Path) -> String {
        path.display().to_string()
    }
}
