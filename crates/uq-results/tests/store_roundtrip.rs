use chrono::{Local, TimeZone};
use std::path::PathBuf;
use uq_core::{Ensemble, SurfaceOptions, SurfaceType, Variable};
use uq_results::{AnalysisStore, ResultsError};
use uq_script::AnalysisRequest;
use uq_solver::{ResultRecord, ResultValue};

fn ensemble() -> Ensemble {
    Ensemble::new(
        "study",
        vec![Variable::input("x", 0.0, 1.0)],
        vec![Variable::output("y")],
    )
    .unwrap()
    .with_samples(vec![vec![0.5]])
    .unwrap()
}

fn request() -> AnalysisRequest {
    AnalysisRequest::UncertaintyAnalysis {
        output: 1,
        surface: SurfaceType::Linear,
        options: SurfaceOptions::default(),
        prior: vec![],
    }
}

fn record() -> ResultRecord {
    let mut r = ResultRecord::new("rs_ua");
    r.insert("mean", ResultValue::Number(1.25));
    r.insert("best", ResultValue::Indices(vec![2, 5]));
    r.artifacts.push(PathBuf::from("/tmp/a/matlabrsua.m"));
    r
}

#[test]
fn record_list_load_delete() {
    let dir = tempfile::tempdir().unwrap();
    let store = AnalysisStore::for_working_dir(dir.path()).unwrap();
    let e = ensemble();
    let id = e.id.to_string();

    let manifest = store
        .record(&e, &request(), &[record()], Some("1.7.9"))
        .unwrap();
    assert!(manifest.analysis_id.starts_with("Analysis_"));
    assert_eq!(manifest.operation, "rs_ua");
    assert_eq!(manifest.artifacts, vec![PathBuf::from("/tmp/a/matlabrsua.m")]);
    assert!(store.has_analysis(&id, &manifest.analysis_id));

    let listed = store.list_analyses(&id).unwrap();
    assert_eq!(listed, vec![manifest.clone()]);
    assert_eq!(store.list_ensembles().unwrap(), vec![id.clone()]);

    let (loaded, records) = store.load(&id, &manifest.analysis_id).unwrap();
    assert_eq!(loaded.request, request());
    assert_eq!(records, vec![record()]);
    assert_eq!(records[0].number("mean"), Some(1.25));

    store.delete_analysis(&id, &manifest.analysis_id).unwrap();
    assert!(store.list_analyses(&id).unwrap().is_empty());
    assert!(matches!(
        store.load(&id, &manifest.analysis_id),
        Err(ResultsError::AnalysisNotFound { .. })
    ));
}

#[test]
fn same_second_ids_get_hash_suffixes() {
    let dir = tempfile::tempdir().unwrap();
    let store = AnalysisStore::new(dir.path().join("history")).unwrap();
    let at = Local.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
    let hash = "0123456789abcdef";

    let first = store.allocate_id("ens", at, hash);
    assert_eq!(first, "Analysis_260304050607");
    std::fs::create_dir_all(dir.path().join("history/ens").join(&first)).unwrap();

    let second = store.allocate_id("ens", at, hash);
    assert_eq!(second, "Analysis_260304050607_01234567");
    std::fs::create_dir_all(dir.path().join("history/ens").join(&second)).unwrap();

    assert_eq!(
        store.allocate_id("ens", at, hash),
        "Analysis_260304050607_01234567_2"
    );
}

#[test]
fn unknown_ensemble_has_no_history() {
    let dir = tempfile::tempdir().unwrap();
    let store = AnalysisStore::new(dir.path().to_path_buf()).unwrap();
    assert!(store.list_analyses("nobody").unwrap().is_empty());
}
