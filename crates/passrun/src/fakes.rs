//! In-memory toolchain fake (testing only)
//!
//! `ScriptedToolchain` implements [`ProcessRunner`] without launching anything.
//! It plays compiler, linker and test binary, deciding each outcome from
//! markers in the test's source text:
//!
//! - `SYNTAX_ERROR` - compiler exits 1
//! - `NO_OBJECT` - compiler exits 0 but writes nothing
//! - `LINK_ERROR` - linker exits 1
//! - `NO_BINARY` - linker exits 0 but writes nothing
//! - `EXIT_CODE=<n>` - binary exits with `n`
//! - `HANG` - binary sleeps for an hour
//!
//! Artifacts are real files containing the source path, so a binary always
//! knows which source it was built from.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::ToolchainConfig;
use crate::process::{Invocation, ProcessError, ProcessOutcome, ProcessRunner};

/// Which role an invocation played.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Compiler,
    Linker,
    Binary,
}

/// One recorded call to the fake.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub role: Role,
    pub invocation: Invocation,
}

/// Scripted compiler + linker + test binaries.
#[derive(Debug)]
pub struct ScriptedToolchain {
    config: Arc<ToolchainConfig>,
    calls: Mutex<Vec<RecordedCall>>,
    writing: Mutex<HashSet<PathBuf>>,
    overlapping_writes: AtomicUsize,
    executing: AtomicUsize,
    max_executing: AtomicUsize,
}

impl ScriptedToolchain {
    pub fn new(config: Arc<ToolchainConfig>) -> Self {
        Self {
            config,
            calls: Mutex::new(Vec::new()),
            writing: Mutex::new(HashSet::new()),
            overlapping_writes: AtomicUsize::new(0),
            executing: AtomicUsize::new(0),
            max_executing: AtomicUsize::new(0),
        }
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls made in `role`.
    pub fn calls_for(&self, role: Role) -> Vec<Invocation> {
        self.calls()
            .into_iter()
            .filter(|c| c.role == role)
            .map(|c| c.invocation)
            .collect()
    }

    /// Calls whose arguments or program mention `needle`.
    pub fn calls_mentioning(&self, needle: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.invocation.display().contains(needle))
            .collect()
    }

    /// Times two invocations wrote the same output path at once.
    pub fn overlapping_writes(&self) -> usize {
        self.overlapping_writes.load(Ordering::SeqCst)
    }

    /// Highest number of test binaries running at the same moment.
    pub fn max_concurrent_executions(&self) -> usize {
        self.max_executing.load(Ordering::SeqCst)
    }

    fn role_of(&self, invocation: &Invocation) -> Role {
        if invocation.program == self.config.compiler {
            Role::Compiler
        } else if invocation.program == self.config.linker {
            Role::Linker
        } else {
            Role::Binary
        }
    }

    async fn write_artifact(&self, output: &Path, contents: &str) -> std::io::Result<()> {
        let overlapped = !self.writing.lock().unwrap().insert(output.to_path_buf());
        if overlapped {
            self.overlapping_writes.fetch_add(1, Ordering::SeqCst);
        }

        // Leave a window for any concurrent writer to collide.
        tokio::time::sleep(Duration::from_millis(5)).await;
        let result = tokio::fs::write(output, contents).await;

        if !overlapped {
            self.writing.lock().unwrap().remove(output);
        }
        result
    }

    async fn compile(&self, inv: &Invocation) -> ProcessOutcome {
        let source = inv.args.last().map(PathBuf::from).unwrap_or_default();
        let text = tokio::fs::read_to_string(&source).await.unwrap_or_default();

        if text.contains("SYNTAX_ERROR") {
            return outcome(1, "", &format!("{}:1:10: error: expected expression", source.display()));
        }
        if text.contains("NO_OBJECT") {
            return outcome(0, "", "");
        }
        match inv.arg_after("-o") {
            Some(object) => match self.write_artifact(object, &source.to_string_lossy()).await {
                Ok(()) => outcome(0, "", ""),
                Err(e) => outcome(1, "", &format!("error: cannot write object: {}", e)),
            },
            None => outcome(1, "", "error: no output file"),
        }
    }

    async fn link(&self, inv: &Invocation) -> ProcessOutcome {
        // Arguments end with `<object> <library>`.
        let object = inv
            .args
            .len()
            .checked_sub(2)
            .and_then(|i| inv.args.get(i))
            .map(PathBuf::from)
            .unwrap_or_default();
        let source = match tokio::fs::read_to_string(&object).await {
            Ok(source) => source,
            Err(_) => return outcome(1, "", &format!("ld: cannot open {}", object.display())),
        };
        let text = tokio::fs::read_to_string(&source).await.unwrap_or_default();

        if text.contains("LINK_ERROR") {
            return outcome(1, "", "ld: undefined reference to `missing_symbol'");
        }
        if text.contains("NO_BINARY") {
            return outcome(0, "", "");
        }
        match inv.arg_after("-o") {
            Some(binary) => match self.write_artifact(binary, &source).await {
                Ok(()) => outcome(0, "", ""),
                Err(e) => outcome(1, "", &format!("ld: cannot write binary: {}", e)),
            },
            None => outcome(1, "", "ld: no output file"),
        }
    }

    async fn execute(&self, inv: &Invocation) -> Result<ProcessOutcome, ProcessError> {
        let source = tokio::fs::read_to_string(&inv.program)
            .await
            .map_err(|source| ProcessError::Spawn {
                program: inv.program.display().to_string(),
                source,
            })?;
        let text = tokio::fs::read_to_string(&source).await.unwrap_or_default();

        let now = self.executing.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_executing.fetch_max(now, Ordering::SeqCst);
        let _running = Running(&self.executing);

        if text.contains("HANG") {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        } else {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        Ok(outcome(exit_code_marker(&text), &format!("ran {}", source), ""))
    }
}

#[async_trait]
impl ProcessRunner for ScriptedToolchain {
    async fn run(
        &self,
        invocation: &Invocation,
        timeout: Option<Duration>,
    ) -> Result<ProcessOutcome, ProcessError> {
        let role = self.role_of(invocation);
        self.calls.lock().unwrap().push(RecordedCall {
            role,
            invocation: invocation.clone(),
        });

        let work = async {
            match role {
                Role::Compiler => Ok(self.compile(invocation).await),
                Role::Linker => Ok(self.link(invocation).await),
                Role::Binary => self.execute(invocation).await,
            }
        };

        match timeout {
            Some(limit) => tokio::time::timeout(limit, work)
                .await
                .map_err(|_| ProcessError::TimedOut {
                    program: invocation.program.display().to_string(),
                    secs: limit.as_secs(),
                })?,
            None => work.await,
        }
    }
}

/// Decrements the running-binary count when dropped, including on timeout.
struct Running<'a>(&'a AtomicUsize);

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn exit_code_marker(text: &str) -> i32 {
    text.split_whitespace()
        .find_map(|token| token.strip_prefix("EXIT_CODE="))
        .and_then(|code| code.trim_end_matches(';').parse().ok())
        .unwrap_or(0)
}

fn outcome(code: i32, stdout: &str, stderr: &str) -> ProcessOutcome {
    ProcessOutcome {
        exit_code: Some(code),
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        duration_ms: 1,
    }
}
