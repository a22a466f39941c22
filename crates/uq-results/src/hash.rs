//! Content hashes for ensembles and analyses.

use sha2::{Digest, Sha256};
use uq_core::Ensemble;
use uq_script::AnalysisRequest;

/// Length of the hash suffix that separates analyses started in the same second.
pub const SHORT_HASH_LEN: usize = 8;

pub fn compute_ensemble_fingerprint(ensemble: &Ensemble) -> String {
    let mut hasher = Sha256::new();
    let metadata_json = serde_json::to_string(&ensemble.metadata()).unwrap_or_default();
    hasher.update(metadata_json.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn compute_content_hash(fingerprint: &str, request: &AnalysisRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(fingerprint.as_bytes());

    let request_json = serde_json::to_string(request).unwrap_or_default();
    hasher.update(request_json.as_bytes());

    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uq_core::{SurfaceOptions, SurfaceType, Variable};

    fn ensemble(name: &str) -> Ensemble {
        Ensemble::new(
            name,
            vec![Variable::input("x", 0.0, 1.0)],
            vec![Variable::output("y")],
        )
        .unwrap()
    }

    fn ua(surface: SurfaceType) -> AnalysisRequest {
        AnalysisRequest::UncertaintyAnalysis {
            output: 1,
            surface,
            options: SurfaceOptions::default(),
            prior: vec![],
        }
    }

    #[test]
    fn fingerprint_stability() {
        let e = ensemble("a");
        assert_eq!(compute_ensemble_fingerprint(&e), compute_ensemble_fingerprint(&e));
        assert_eq!(compute_ensemble_fingerprint(&e).len(), 64);
    }

    #[test]
    fn fingerprint_differs_between_ensembles() {
        assert_ne!(
            compute_ensemble_fingerprint(&ensemble("a")),
            compute_ensemble_fingerprint(&ensemble("b"))
        );
    }

    #[test]
    fn content_hash_tracks_the_request() {
        let fp = compute_ensemble_fingerprint(&ensemble("a"));
        assert_ne!(
            compute_content_hash(&fp, &ua(SurfaceType::Linear)),
            compute_content_hash(&fp, &ua(SurfaceType::Quadratic))
        );
    }
}
