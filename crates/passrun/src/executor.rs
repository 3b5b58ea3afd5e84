//! Running linked test binaries.

use crate::error::StageFailure;
use crate::process::{Invocation, ProcessRunner};
use crate::resolve::TestCase;
use crate::stage::Stage;
use crate::toolchain::failure_detail;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Runs a test binary with no arguments and maps its exit status.
#[derive(Clone)]
pub struct Executor {
    runner: Arc<dyn ProcessRunner>,
    timeout: Option<Duration>,
}

impl Executor {
    pub fn new(runner: Arc<dyn ProcessRunner>, timeout: Option<Duration>) -> Self {
        Self { runner, timeout }
    }

    /// Invocation used for `case`: the binary itself, run from its own directory.
    pub fn invocation(&self, case: &TestCase) -> Invocation {
        // A relative program path is ambiguous once the working directory changes.
        let binary = if case.binary_path.is_absolute() {
            case.binary_path.clone()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(&case.binary_path))
                .unwrap_or_else(|_| case.binary_path.clone())
        };

        let inv = Invocation::new(&binary);
        match binary.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(dir) => inv.current_dir(dir),
            None => inv,
        }
    }

    /// Run `case`'s binary. `Ok(0)` is a pass; anything else is a failure
    /// at the execute stage.
    pub async fn run(&self, case: &TestCase) -> Result<i32, StageFailure> {
        let inv = self.invocation(case);
        debug!(test = %case.name, binary = %case.binary_path.display(), "Executing test binary");

        let outcome = self
            .runner
            .run(&inv, self.timeout)
            .await
            .map_err(|e| {
                warn!(test = %case.name, error = %e, "Test binary did not run to completion");
                StageFailure::new(Stage::Execute, None, e.to_string())
            })?;

        match outcome.exit_code {
            Some(0) => Ok(0),
            code => {
                warn!(test = %case.name, exit_code = ?code, "Test binary failed");
                Err(StageFailure::new(Stage::Execute, code, failure_detail(&outcome)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolchainConfig;
    use crate::fakes::ScriptedToolchain;
    use crate::toolchain::ToolchainInvoker;
    use std::path::Path;

    async fn linked_case(dir: &Path, name: &str, body: &str) -> (Arc<ScriptedToolchain>, TestCase) {
        let config = Arc::new(
            ToolchainConfig::builder("x64")
                .unwrap()
                .with_output_dir(dir.join("out"))
                .build()
                .unwrap(),
        );
        let source = dir.join(format!("{}.pass.cpp", name));
        std::fs::write(&source, body).unwrap();

        let fake = Arc::new(ScriptedToolchain::new(config.clone()));
        let invoker = ToolchainInvoker::new(config.clone(), fake.clone());
        let case = TestCase::new(name, &source, &config);
        invoker.compile(&case).await.expect("compile");
        invoker.link(&case).await.expect("link");
        (fake, case)
    }

    #[tokio::test]
    async fn test_zero_exit_is_pass() {
        let dir = tempfile::tempdir().unwrap();
        let (fake, case) = linked_case(dir.path(), "add", "int main() { return 0; }").await;

        let executor = Executor::new(fake.clone(), None);
        assert_eq!(executor.run(&case).await, Ok(0));

        let runs = fake.calls_for(crate::fakes::Role::Binary);
        assert_eq!(runs.len(), 1);
        assert!(runs[0].args.is_empty(), "binaries run with no arguments");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_execution_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (fake, case) = linked_case(dir.path(), "crashes", "// EXIT_CODE=1\nint main() { return 1; }").await;

        let failure = Executor::new(fake, None).run(&case).await.unwrap_err();
        assert_eq!(failure.stage, Stage::Execute);
        assert_eq!(failure.exit_code, Some(1));
    }

    #[tokio::test]
    async fn test_missing_binary_is_execution_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (fake, case) = linked_case(dir.path(), "gone", "int main() {}").await;
        std::fs::remove_file(&case.binary_path).unwrap();

        let failure = Executor::new(fake, None).run(&case).await.unwrap_err();
        assert_eq!(failure.stage, Stage::Execute);
        assert_eq!(failure.exit_code, None);
    }

    #[tokio::test]
    async fn test_timeout_is_execution_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (fake, case) = linked_case(dir.path(), "hangs", "// HANG\nint main() { for(;;); }").await;

        let executor = Executor::new(fake, Some(Duration::from_millis(50)));
        let failure = executor.run(&case).await.unwrap_err();
        assert_eq!(failure.stage, Stage::Execute);
        assert!(failure.detail.contains("timed out"));
    }

    #[cfg(unix)]
    #[test]
    fn test_invocation_runs_in_binary_directory() {
        let config = ToolchainConfig::builder("x64")
            .unwrap()
            .with_output_dir("/tmp/out")
            .build()
            .unwrap();
        let case = TestCase::new("add", "/src/add.pass.cpp", &config);
        let fake = Arc::new(ScriptedToolchain::new(Arc::new(config.clone())));

        let inv = Executor::new(fake, None).invocation(&case);
        assert_eq!(inv.program, case.binary_path);
        assert_eq!(inv.cwd.as_deref(), case.binary_path.parent());
    }
}
