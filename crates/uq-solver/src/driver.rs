//! Running the solver executable.
//!
//! The solver reads and writes fixed file names in its working directory, so
//! two invocations in one directory must never overlap. Drivers are built
//! from a shared [`WorkdirLocks`] registry and hold the directory's lock for
//! the whole of an invoke-then-claim sequence.

use crate::artifacts::{ArtifactKey, ArtifactManager};
use crate::captured::CapturedRun;
use crate::error::{SolverError, SolverResult};
use parking_lot::{ArcMutexGuard, Mutex, MutexGuard, RawMutex};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};
use uq_script::{ExpectedArtifact, Script};

/// Transcript of every invocation, appended in the working directory.
pub const TRANSCRIPT_FILE: &str = "solverlog";

const SPAWN_RETRIES: u64 = 5;

/// Exclusive use of a working directory that is not tied to a borrow, for
/// child processes that outlive the call that started them.
pub type WorkdirGuard = ArcMutexGuard<RawMutex, ()>;

/// One lock per working directory, shared by every driver using it.
#[derive(Debug, Default)]
pub struct WorkdirLocks {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl WorkdirLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock for `workdir`. Paths that resolve to the same directory
    /// share one lock, whether or not the directory exists yet.
    pub fn lock_for(&self, workdir: &Path) -> Arc<Mutex<()>> {
        self.locks.lock().entry(lock_key(workdir)).or_default().clone()
    }
}

/// Canonical form of `workdir`: the deepest existing ancestor is resolved and
/// the missing tail appended.
fn lock_key(workdir: &Path) -> PathBuf {
    let absolute = std::path::absolute(workdir).unwrap_or_else(|_| workdir.to_path_buf());
    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    loop {
        if let Ok(real) = existing.canonicalize() {
            return missing.iter().rev().fold(real, |path, part| path.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return absolute,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessDriver {
    program: PathBuf,
    workdir: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl ProcessDriver {
    /// A driver for `program` in `workdir`, serialized against every other
    /// driver built from the same `locks`.
    pub fn new(
        program: impl Into<PathBuf>,
        workdir: impl Into<PathBuf>,
        locks: &WorkdirLocks,
    ) -> Self {
        let workdir = workdir.into();
        let lock = locks.lock_for(&workdir);
        Self {
            program: program.into(),
            workdir,
            lock,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Take the working directory until the returned guard is dropped.
    pub fn lock_owned(&self) -> WorkdirGuard {
        self.lock.lock_arc()
    }

    /// Take the working directory for a sequence of invocations.
    pub fn session(&self) -> SolverSession<'_> {
        SolverSession {
            driver: self,
            _guard: self.lock.lock(),
        }
    }

    /// Run `script` on the solver's stdin.
    pub fn invoke(&self, script: Script) -> SolverResult<CapturedRun> {
        self.session().invoke(script)
    }

    /// Run the solver in input-file mode.
    pub fn invoke_file(&self, operation: &str, input: &Path) -> SolverResult<CapturedRun> {
        self.session().invoke_file(operation, input)
    }

    /// Invoke, fail on a solver error, then claim every expected artifact.
    pub fn invoke_and_claim(
        &self,
        script: Script,
        artifacts: &ArtifactManager,
        destination: &Path,
        key: &ArtifactKey,
    ) -> SolverResult<(CapturedRun, Vec<PathBuf>)> {
        self.session()
            .invoke_and_claim(script, artifacts, destination, key)
    }

    /// Start a long-running input-file run without waiting for it.
    ///
    /// Output goes to `stdout` and `stderr` files in the working directory.
    pub fn spawn_file(&self, input: &Path) -> SolverResult<Child> {
        let stdout = fs::File::create(self.workdir.join("stdout"))?;
        let stderr = fs::File::create(self.workdir.join("stderr"))?;
        let mut command = Command::new(&self.program);
        command
            .arg(input)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr);
        let child = self.spawn(&mut command)?;
        info!(
            program = %self.program.display(),
            input = %input.display(),
            pid = child.id(),
            "spawned solver run"
        );
        Ok(child)
    }

    fn run(
        &self,
        operation: &str,
        args: &[&std::ffi::OsStr],
        stdin: Option<String>,
    ) -> SolverResult<CapturedRun> {
        debug!(
            operation,
            program = %self.program.display(),
            workdir = %self.workdir.display(),
            "invoking solver"
        );
        let mut command = Command::new(&self.program);
        command
            .args(args)
            .current_dir(&self.workdir)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = self.spawn(&mut command)?;

        // stdin is written while the output pipes drain
        let writer = match (stdin.as_ref(), child.stdin.take()) {
            (Some(text), Some(mut pipe)) => {
                let text = text.clone();
                Some(thread::spawn(move || -> io::Result<()> {
                    pipe.write_all(text.as_bytes())?;
                    pipe.flush()
                }))
            }
            _ => None,
        };

        let output = child.wait_with_output()?;
        let write_result = match writer {
            Some(handle) => handle
                .join()
                .unwrap_or_else(|_| Err(io::Error::other("stdin writer panicked"))),
            None => Ok(()),
        };

        let captured = CapturedRun::new(
            operation,
            String::from_utf8_lossy(&output.stdout).into_owned(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
            output.status.code(),
        );
        self.append_transcript(stdin.as_deref(), &captured);

        if let Err(source) = write_result {
            return Err(SolverError::ScriptWrite {
                operation: operation.to_string(),
                source,
            });
        }

        if captured.error {
            warn!(
                operation,
                exit_code = ?captured.exit_code,
                "solver reported an error"
            );
        } else {
            info!(operation, "solver finished");
        }
        Ok(captured)
    }

    fn spawn(&self, command: &mut Command) -> SolverResult<Child> {
        let mut attempt = 0;
        loop {
            match command.spawn() {
                Ok(child) => return Ok(child),
                // freshly written executables can be briefly busy on Linux
                Err(e) if e.kind() == io::ErrorKind::ExecutableFileBusy && attempt < SPAWN_RETRIES => {
                    attempt += 1;
                    thread::sleep(Duration::from_millis(20 * attempt));
                }
                Err(source) => {
                    return Err(SolverError::Launch {
                        program: self.program.clone(),
                        source,
                    });
                }
            }
        }
    }

    fn append_transcript(&self, stdin: Option<&str>, captured: &CapturedRun) {
        let path = self.workdir.join(TRANSCRIPT_FILE);
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut f| {
                writeln!(f, "==== {} ====", captured.operation)?;
                if let Some(text) = stdin {
                    writeln!(f, "---- script ----")?;
                    f.write_all(text.as_bytes())?;
                }
                writeln!(f, "---- stdout ----")?;
                f.write_all(captured.stdout.as_bytes())?;
                if !captured.stderr.is_empty() {
                    writeln!(f, "---- stderr ----")?;
                    f.write_all(captured.stderr.as_bytes())?;
                }
                writeln!(f, "---- exit {:?} ----", captured.exit_code)
            });
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "could not write solver transcript");
        }
    }
}

/// Exclusive use of a driver's working directory.
pub struct SolverSession<'a> {
    driver: &'a ProcessDriver,
    _guard: MutexGuard<'a, ()>,
}

impl SolverSession<'_> {
    pub fn invoke(&self, script: Script) -> SolverResult<CapturedRun> {
        let stdin = script.stdin_text();
        let (operation, _, _) = script.into_parts();
        self.driver.run(&operation, &[], Some(stdin))
    }

    pub fn invoke_file(&self, operation: &str, input: &Path) -> SolverResult<CapturedRun> {
        self.driver.run(operation, &[input.as_os_str()], None)
    }

    pub(crate) fn run_args(
        &self,
        operation: &str,
        args: &[&std::ffi::OsStr],
    ) -> SolverResult<CapturedRun> {
        self.driver.run(operation, args, None)
    }

    pub fn invoke_and_claim(
        &self,
        script: Script,
        artifacts: &ArtifactManager,
        destination: &Path,
        key: &ArtifactKey,
    ) -> SolverResult<(CapturedRun, Vec<PathBuf>)> {
        let expected = script.artifacts().to_vec();
        let captured = self.invoke(script)?.into_result()?;
        let claimed = self.claim(&captured.operation, &expected, artifacts, destination, key)?;
        Ok((captured, claimed))
    }

    /// Claim `expected` artifacts; required ones must exist.
    pub fn claim(
        &self,
        operation: &str,
        expected: &[ExpectedArtifact],
        artifacts: &ArtifactManager,
        destination: &Path,
        key: &ArtifactKey,
    ) -> SolverResult<Vec<PathBuf>> {
        let mut claimed = Vec::with_capacity(expected.len());
        for artifact in expected {
            if artifact.required {
                claimed.push(artifacts.claim(operation, &artifact.file_name, destination, key)?);
            } else if let Some(path) =
                artifacts.claim_optional(&artifact.file_name, destination, key)?
            {
                claimed.push(path);
            }
        }
        Ok(claimed)
    }
}
