//! Compile and link stages.

use crate::config::ToolchainConfig;
use crate::error::StageFailure;
use crate::process::{Invocation, ProcessOutcome, ProcessRunner};
use crate::resolve::TestCase;
use crate::stage::Stage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Stderr kept in a failure detail, in bytes.
const MAX_DETAIL_BYTES: usize = 4096;

/// Runs the compiler and linker for one test case at a time.
#[derive(Clone)]
pub struct ToolchainInvoker {
    config: Arc<ToolchainConfig>,
    runner: Arc<dyn ProcessRunner>,
}

impl ToolchainInvoker {
    pub fn new(config: Arc<ToolchainConfig>, runner: Arc<dyn ProcessRunner>) -> Self {
        Self { config, runner }
    }

    /// Compiler command line for `case`.
    pub fn compile_invocation(&self, case: &TestCase) -> Invocation {
        let config = &self.config;

        let mut inv = Invocation::new(&config.compiler)
            .arg("-c")
            .arg(&config.optimization)
            .arg(format!("-std={}", config.language_standard))
            .arg(config.platform.arch_flag());

        for include in &config.include_paths {
            inv = inv.arg("-I").arg(include);
        }
        if config.debug_info {
            inv = inv.arg("-g");
        }
        inv = inv
            .arg(if config.exceptions { "-fexceptions" } else { "-fno-exceptions" })
            .arg(if config.rtti { "-frtti" } else { "-fno-rtti" });

        inv.args(&config.extra_compile_flags)
            .arg("-o")
            .arg(&case.object_path)
            .arg(&case.source)
    }

    /// Linker command line for `case`.
    pub fn link_invocation(&self, case: &TestCase) -> Invocation {
        let config = &self.config;

        Invocation::new(&config.linker)
            .arg(config.platform.arch_flag())
            .args(&config.extra_link_flags)
            .arg("-o")
            .arg(&case.binary_path)
            .arg(&case.object_path)
            .arg(&config.library_path)
    }

    /// Compile `case` to its object file.
    ///
    /// Succeeds only if the compiler exits 0 and the object exists afterwards.
    pub async fn compile(&self, case: &TestCase) -> Result<PathBuf, StageFailure> {
        let inv = self.compile_invocation(case);
        self.run_producing(Stage::Compile, case, inv, &case.object_path)
            .await
    }

    /// Link `case`'s object against the library artifact.
    ///
    /// Succeeds only if the linker exits 0 and the binary exists afterwards.
    pub async fn link(&self, case: &TestCase) -> Result<PathBuf, StageFailure> {
        let inv = self.link_invocation(case);
        self.run_producing(Stage::Link, case, inv, &case.binary_path)
            .await
    }

    async fn run_producing(
        &self,
        stage: Stage,
        case: &TestCase,
        inv: Invocation,
        artifact: &Path,
    ) -> Result<PathBuf, StageFailure> {
        if let Some(parent) = artifact.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StageFailure::new(
                    stage,
                    None,
                    format!("cannot create output directory {}: {}", parent.display(), e),
                )
            })?;
        }

        // The existence check below must only see what this invocation wrote.
        match tokio::fs::remove_file(artifact).await {
            Ok(()) => debug!(test = %case.name, %stage, artifact = %artifact.display(), "Removed stale artifact"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(StageFailure::new(
                    stage,
                    None,
                    format!("cannot remove stale {}: {}", artifact.display(), e),
                ))
            }
        }

        debug!(test = %case.name, %stage, command = %inv.display(), "Invoking toolchain");

        let outcome = self
            .runner
            .run(&inv, self.config.timeout())
            .await
            .map_err(|e| StageFailure::new(stage, None, e.to_string()))?;

        if !outcome.success() {
            warn!(test = %case.name, %stage, exit_code = ?outcome.exit_code, "Toolchain stage failed");
            return Err(StageFailure::new(
                stage,
                outcome.exit_code,
                failure_detail(&outcome),
            ));
        }

        // Some toolchains report success without writing their output.
        if !tokio::fs::try_exists(artifact).await.unwrap_or(false) {
            warn!(test = %case.name, %stage, artifact = %artifact.display(), "Expected artifact missing");
            return Err(StageFailure::new(
                stage,
                outcome.exit_code,
                format!("{} reported success but {} was not produced", stage, artifact.display()),
            ));
        }

        Ok(artifact.to_path_buf())
    }
}

/// Tail of stderr (or stdout when stderr is empty) for reporting.
pub(crate) fn failure_detail(outcome: &ProcessOutcome) -> String {
    let text = if outcome.stderr.trim().is_empty() {
        outcome.stdout.trim()
    } else {
        outcome.stderr.trim()
    };

    if text.is_empty() {
        return match outcome.exit_code {
            Some(code) => format!("exited with code {}", code),
            None => "terminated by signal".to_string(),
        };
    }

    if text.len() <= MAX_DETAIL_BYTES {
        return text.to_string();
    }

    let mut start = text.len() - MAX_DETAIL_BYTES;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedToolchain;
    use std::ffi::OsString;

    fn config(out: &Path) -> Arc<ToolchainConfig> {
        Arc::new(
            ToolchainConfig::builder("x64")
                .unwrap()
                .with_compiler("cc-fake")
                .with_linker("ld-fake")
                .with_include_path("/inc/a")
                .with_include_path("/inc/b")
                .with_library_dir("/lib")
                .with_library_file("libyl.a")
                .with_compile_flag("-Wall")
                .with_output_dir(out)
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_compile_invocation_shape() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let invoker = ToolchainInvoker::new(cfg.clone(), Arc::new(ScriptedToolchain::new(cfg.clone())));
        let case = TestCase::new("add", "/src/add.pass.cpp", &cfg);

        let inv = invoker.compile_invocation(&case);
        assert_eq!(inv.program, PathBuf::from("cc-fake"));

        let args: Vec<String> = inv.args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(&args[..4], ["-c", "-O0", "-std=c++17", "-m64"]);
        assert!(args.windows(2).any(|w| w == ["-I", "/inc/a"]));
        let a = args.iter().position(|x| x == "/inc/a").unwrap();
        let b = args.iter().position(|x| x == "/inc/b").unwrap();
        assert!(a < b, "include order must be preserved");
        assert!(inv.has_arg("-g"));
        assert!(inv.has_arg("-fexceptions"));
        assert!(inv.has_arg("-frtti"));
        assert!(inv.has_arg("-Wall"));
        assert_eq!(inv.arg_after("-o"), Some(case.object_path.as_path()));
        assert_eq!(inv.args.last(), Some(&OsString::from("/src/add.pass.cpp")));
    }

    #[test]
    fn test_link_invocation_shape() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let invoker = ToolchainInvoker::new(cfg.clone(), Arc::new(ScriptedToolchain::new(cfg.clone())));
        let case = TestCase::new("add", "/src/add.pass.cpp", &cfg);

        let inv = invoker.link_invocation(&case);
        assert_eq!(inv.program, PathBuf::from("ld-fake"));
        assert!(inv.has_arg("-m64"));
        assert!(inv.has_arg(&case.object_path));
        assert!(inv.has_arg("/lib/x64/libyl.a"));
        assert_eq!(inv.arg_after("-o"), Some(case.binary_path.as_path()));
    }

    #[tokio::test]
    async fn test_compile_and_link_produce_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&dir.path().join("out"));
        let source = dir.path().join("add.pass.cpp");
        std::fs::write(&source, "int main() { return 0; }").unwrap();

        let invoker = ToolchainInvoker::new(cfg.clone(), Arc::new(ScriptedToolchain::new(cfg.clone())));
        let case = TestCase::new("add", &source, &cfg);

        let object = invoker.compile(&case).await.expect("compile");
        assert!(object.exists());
        let binary = invoker.link(&case).await.expect("link");
        assert!(binary.exists());
    }

    #[tokio::test]
    async fn test_compile_failure_carries_exit_code_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&dir.path().join("out"));
        let source = dir.path().join("broken.pass.cpp");
        std::fs::write(&source, "int main( { SYNTAX_ERROR }").unwrap();

        let invoker = ToolchainInvoker::new(cfg.clone(), Arc::new(ScriptedToolchain::new(cfg.clone())));
        let case = TestCase::new("broken", &source, &cfg);

        let failure = invoker.compile(&case).await.unwrap_err();
        assert_eq!(failure.stage, Stage::Compile);
        assert_eq!(failure.exit_code, Some(1));
        assert!(failure.detail.contains("error"));
        assert!(!case.object_path.exists());
    }

    #[tokio::test]
    async fn test_silent_compiler_counts_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&dir.path().join("out"));
        let source = dir.path().join("ghost.pass.cpp");
        std::fs::write(&source, "// NO_OBJECT\nint main() {}").unwrap();

        let invoker = ToolchainInvoker::new(cfg.clone(), Arc::new(ScriptedToolchain::new(cfg.clone())));
        let case = TestCase::new("ghost", &source, &cfg);

        let failure = invoker.compile(&case).await.unwrap_err();
        assert_eq!(failure.stage, Stage::Compile);
        assert_eq!(failure.exit_code, Some(0));
        assert!(failure.detail.contains("was not produced"));
    }

    #[tokio::test]
    async fn test_silent_linker_counts_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&dir.path().join("out"));
        let source = dir.path().join("nobin.pass.cpp");
        std::fs::write(&source, "// NO_BINARY\nint main() {}").unwrap();

        let invoker = ToolchainInvoker::new(cfg.clone(), Arc::new(ScriptedToolchain::new(cfg.clone())));
        let case = TestCase::new("nobin", &source, &cfg);

        invoker.compile(&case).await.expect("compile");
        let failure = invoker.link(&case).await.unwrap_err();
        assert_eq!(failure.stage, Stage::Link);
        assert!(failure.detail.contains("was not produced"));
    }

    #[tokio::test]
    async fn test_leftover_object_does_not_satisfy_silent_compiler() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&dir.path().join("out"));
        let source = dir.path().join("stale.pass.cpp");
        std::fs::write(&source, "int main() { return 0; }").unwrap();

        let invoker = ToolchainInvoker::new(cfg.clone(), Arc::new(ScriptedToolchain::new(cfg.clone())));
        let case = TestCase::new("stale", &source, &cfg);
        invoker.compile(&case).await.expect("first compile");
        assert!(case.object_path.exists());

        std::fs::write(&source, "// NO_OBJECT\nint main() { return 0; }").unwrap();
        let failure = invoker.compile(&case).await.unwrap_err();
        assert_eq!(failure.stage, Stage::Compile);
        assert!(failure.detail.contains("was not produced"));
        assert!(!case.object_path.exists());
    }

    #[tokio::test]
    async fn test_missing_compiler_is_compile_failure() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Arc::new(
            ToolchainConfig::builder("x64")
                .unwrap()
                .with_compiler("/no/such/compiler")
                .with_output_dir(dir.path())
                .build()
                .unwrap(),
        );
        let invoker = ToolchainInvoker::new(cfg.clone(), Arc::new(crate::process::TokioProcessRunner::new()));
        let case = TestCase::new("x", dir.path().join("x.pass.cpp"), &cfg);

        let failure = invoker.compile(&case).await.unwrap_err();
        assert_eq!(failure.stage, Stage::Compile);
        assert_eq!(failure.exit_code, None);
        assert!(failure.detail.contains("failed to launch"));
    }

    #[test]
    fn test_failure_detail_prefers_stderr_and_truncates() {
        let outcome = ProcessOutcome {
            exit_code: Some(1),
            stdout: "noise".to_string(),
            stderr: "x".repeat(MAX_DETAIL_BYTES + 10),
            duration_ms: 1,
        };
        let detail = failure_detail(&outcome);
        assert!(detail.starts_with("..."));
        assert_eq!(detail.len(), MAX_DETAIL_BYTES + 3);

        let quiet = ProcessOutcome {
            exit_code: Some(3),
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 1,
        };
        assert_eq!(failure_detail(&quiet), "exited with code 3");
    }
}
