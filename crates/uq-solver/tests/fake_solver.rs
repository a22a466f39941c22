#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use uq_script::Script;
use uq_solver::{
    ArtifactKey, ArtifactManager, ExpectedShape, ProcessDriver, SolverError, TRANSCRIPT_FILE,
    WorkdirLocks, checksum, parse,
};

const SOLVER: &str = r#"#!/bin/sh
if [ "$1" = "--info" ]; then
  echo " PSUADE version 1.7.9"
  echo " MARS installed... true"
  exit 0
fi
if [ -n "$1" ]; then
  echo "input file $1"
  cp "$1" psuadeData
  exit 0
fi
input=$(cat)
case "$input" in
  *rank*)
    echo "Regression ERROR: true rank of sample = 2"
    echo "aborting" >&2
    exit 1
    ;;
esac
printf '%s\n' "$input" > matlabua.m
echo "Sample mean = 1.5e+00"
echo "Sample std dev = 2.0e-01"
echo "Sample skewness = 0.0e+00"
echo "Sample kurtosis = 3.0e+00"
"#;

fn install_solver(dir: &Path) -> PathBuf {
    let path = dir.join("fake_solver.sh");
    fs::write(&path, SOLVER).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

fn ua_script(tag: &str) -> Script {
    let mut s = Script::new("ua");
    s.line(format!("load {}", tag)).line("ua").int(1).line("quit");
    s.expect("matlabua.m");
    s
}

#[test]
fn invoke_captures_output_and_logs_transcript() {
    let bin = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let driver = ProcessDriver::new(
        install_solver(bin.path()),
        work.path(),
        &WorkdirLocks::new(),
    );

    let captured = driver.invoke(ua_script("data")).unwrap();
    assert!(!captured.error);
    let record = parse(&captured, &ExpectedShape::sample_moments().unwrap()).unwrap();
    assert_eq!(record.number("mean"), Some(1.5));
    assert_eq!(record.number("kurtosis"), Some(3.0));

    let log = fs::read_to_string(work.path().join(TRANSCRIPT_FILE)).unwrap();
    assert!(log.contains("==== ua ===="));
    assert!(log.contains("load data"));
}

#[test]
fn missing_executable_is_a_launch_failure() {
    let work = tempfile::tempdir().unwrap();
    let driver = ProcessDriver::new(
        work.path().join("no_such_solver"),
        work.path(),
        &WorkdirLocks::new(),
    );
    assert!(matches!(
        driver.invoke(ua_script("data")),
        Err(SolverError::Launch { .. })
    ));
}

#[test]
fn solver_error_becomes_runtime_error_with_hint() {
    let bin = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let driver = ProcessDriver::new(
        install_solver(bin.path()),
        work.path(),
        &WorkdirLocks::new(),
    );

    let mut s = Script::new("rscheck");
    s.line("rank").line("quit");
    let captured = driver.invoke(s).unwrap();
    assert!(captured.error);
    match captured.into_result() {
        Err(SolverError::Runtime { diagnosis, .. }) => assert!(diagnosis.is_some()),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn artifacts_relocate_across_sequential_invocations() {
    let bin = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let dest = tempfile::tempdir().unwrap();
    let driver = ProcessDriver::new(
        install_solver(bin.path()),
        work.path(),
        &WorkdirLocks::new(),
    );
    let artifacts = ArtifactManager::new(work.path());

    let key_a = ArtifactKey::new("ens-a", "ua");
    let (_, claimed_a) = driver
        .invoke_and_claim(ua_script("first"), &artifacts, dest.path(), &key_a)
        .unwrap();
    let sum_a = checksum(&claimed_a[0]).unwrap();

    let key_b = ArtifactKey::new("ens-b", "ua");
    let (_, claimed_b) = driver
        .invoke_and_claim(ua_script("second"), &artifacts, dest.path(), &key_b)
        .unwrap();
    let sum_b = checksum(&claimed_b[0]).unwrap();

    assert!(!work.path().join("matlabua.m").exists());
    assert_ne!(claimed_a[0], claimed_b[0]);
    assert_ne!(sum_a, sum_b);
    // the first artifact survived the second run untouched
    assert_eq!(checksum(&claimed_a[0]).unwrap(), sum_a);
    assert!(fs::read_to_string(&claimed_a[0]).unwrap().contains("load first"));
}

#[test]
fn input_file_mode_passes_the_path() {
    let bin = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let input = work.path().join("emulate.in");
    fs::write(&input, "PSUADE\nEND\n").unwrap();
    let driver = ProcessDriver::new(
        install_solver(bin.path()),
        work.path(),
        &WorkdirLocks::new(),
    );

    let captured = driver.invoke_file("emulate", &input).unwrap().into_result().unwrap();
    assert!(captured.stdout.contains("emulate.in"));
    assert!(work.path().join("psuadeData").exists());
}

#[test]
fn probe_reports_version() {
    let bin = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let driver = ProcessDriver::new(
        install_solver(bin.path()),
        work.path(),
        &WorkdirLocks::new(),
    );
    let info = driver.probe().unwrap();
    assert_eq!(info.version.as_deref(), Some("1.7.9"));
    assert!(info.has_module("MARS"));
    info.require_version("1.7.6").unwrap();
}

#[test]
fn shared_workdir_serializes_invocations() {
    let bin = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let dest = tempfile::tempdir().unwrap();
    let solver = install_solver(bin.path());
    let locks = WorkdirLocks::new();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let driver = ProcessDriver::new(&solver, work.path(), &locks);
            let artifacts = ArtifactManager::new(work.path());
            let dest = dest.path().to_path_buf();
            thread::spawn(move || {
                let key = ArtifactKey::new(format!("ens-{}", i), "ua");
                let (_, claimed) = driver
                    .invoke_and_claim(ua_script(&format!("tag{}", i)), &artifacts, &dest, &key)
                    .unwrap();
                fs::read_to_string(&claimed[0]).unwrap()
            })
        })
        .collect();

    for (i, h) in handles.into_iter().enumerate() {
        let content = h.join().unwrap();
        assert!(content.contains(&format!("load tag{}", i)));
    }
}

#[test]
fn owned_guard_holds_the_directory_until_dropped() {
    let work = tempfile::tempdir().unwrap();
    let locks = WorkdirLocks::new();
    let later = work.path().join("runs").join("first");
    let before = locks.lock_for(&later);
    fs::create_dir_all(&later).unwrap();
    assert!(Arc::ptr_eq(&before, &locks.lock_for(&later)));

    let driver = ProcessDriver::new("/bin/true", &later, &locks);
    let guard = driver.lock_owned();
    assert!(before.try_lock().is_none());
    drop(guard);
    assert!(before.try_lock().is_some());
}
