//! passrun - compile, link and run `*.pass.cpp` tests
//!
//! Walks a directory for test programs, builds each one against the
//! configured toolchain and library artifact, runs it, and prints which
//! stage every test reached. Exits nonzero if any test failed.

mod report;

use anyhow::{Context, Result};
use clap::Parser;
use passrun::config::default_library_file;
use passrun::{HarnessPipeline, NamingConvention, ToolchainConfig, TokioProcessRunner};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(name = "passrun")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Compile, link and execute single-file native test programs", long_about = None)]
struct Cli {
    /// Directory to scan for tests (default: current directory)
    #[arg(default_value = ".", env = "PASSRUN_ROOT")]
    root: PathBuf,

    /// Target platform (x86 or x64)
    #[arg(short, long, default_value = "x64", env = "PASSRUN_PLATFORM")]
    platform: String,

    /// Compiler executable
    #[arg(long, default_value = "clang++", env = "PASSRUN_CXX")]
    compiler: PathBuf,

    /// Linker executable
    #[arg(long, default_value = "clang++", env = "PASSRUN_LINKER")]
    linker: PathBuf,

    /// Directory holding per-platform library subdirectories (x86/, x64/)
    #[arg(long, default_value = "../Source/Library/Lib", env = "PASSRUN_LIBRARY_DIR")]
    library_dir: PathBuf,

    /// Library artifact file name (default depends on host OS)
    #[arg(long, env = "PASSRUN_LIBRARY_FILE")]
    library_file: Option<String>,

    /// Header search path (repeatable, order preserved)
    #[arg(short = 'I', long = "include", env = "PASSRUN_INCLUDE", value_delimiter = ',')]
    include: Vec<PathBuf>,

    /// Extra compiler flag (repeatable)
    #[arg(long = "flag", allow_hyphen_values = true)]
    flags: Vec<String>,

    /// Extra linker flag (repeatable)
    #[arg(long = "link-flag", allow_hyphen_values = true)]
    link_flags: Vec<String>,

    /// Language standard passed as -std=
    #[arg(long, default_value = "c++17")]
    std: String,

    /// Optimization flag
    #[arg(long, default_value = "-O0", allow_hyphen_values = true)]
    opt: String,

    /// Build without debug info
    #[arg(long)]
    no_debug: bool,

    /// Directory for objects and binaries
    #[arg(short, long, default_value = "build", env = "PASSRUN_OUTPUT_DIR")]
    output_dir: PathBuf,

    /// Separator between test name and suffix
    #[arg(long, default_value = ".")]
    separator: String,

    /// Suffix token marking a test file
    #[arg(long, default_value = "pass")]
    suffix: String,

    /// Accepted source extensions
    #[arg(long = "ext", default_value = "cpp,cc,cxx", value_delimiter = ',')]
    extensions: Vec<String>,

    /// Number of tests to build concurrently
    #[arg(short, long, default_value = "1", env = "PASSRUN_JOBS")]
    jobs: usize,

    /// Per-process timeout in seconds (0 = none)
    #[arg(long, default_value = "0", env = "PASSRUN_TIMEOUT_SECS")]
    timeout_secs: u64,

    /// Also write the run summary as JSON to this path
    #[arg(long)]
    report_json: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

impl Cli {
    /// Build the immutable toolchain configuration for this run.
    fn toolchain_config(&self) -> Result<ToolchainConfig> {
        let mut builder = ToolchainConfig::builder(&self.platform)?
            .with_compiler(&self.compiler)
            .with_linker(&self.linker)
            .with_library_dir(&self.library_dir)
            .with_library_file(
                self.library_file
                    .clone()
                    .unwrap_or_else(|| default_library_file().to_string()),
            )
            .with_language_standard(&self.std)
            .with_optimization(&self.opt)
            .with_debug_info(!self.no_debug)
            .with_output_dir(&self.output_dir)
            .with_naming(NamingConvention::new(
                &self.separator,
                &self.suffix,
                self.extensions.clone(),
            ))
            .with_timeout_secs(Some(self.timeout_secs).filter(|s| *s > 0))
            .with_jobs(self.jobs);

        for dir in &self.include {
            builder = builder.with_include_path(dir);
        }
        for flag in &self.flags {
            builder = builder.with_compile_flag(flag);
        }
        for flag in &self.link_flags {
            builder = builder.with_link_flag(flag);
        }

        Ok(builder.build()?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    passrun::init_tracing(cli.json, level);

    let config = Arc::new(cli.toolchain_config().context("Invalid harness configuration")?);
    info!(
        platform = %config.platform,
        compiler = %config.compiler.display(),
        library = %config.library_path.display(),
        "Toolchain configured"
    );

    if !config.library_path.exists() {
        tracing::warn!(
            library = %config.library_path.display(),
            "Library artifact not found; link stages will fail"
        );
    }

    let pipeline = HarnessPipeline::new(config, Arc::new(TokioProcessRunner::new()));
    let summary = pipeline
        .run(&cli.root)
        .await
        .with_context(|| format!("Harness run over {} failed", cli.root.display()))?;

    print!("{}", report::render(&summary));

    if let Some(path) = &cli.report_json {
        let json = summary.to_json().context("Failed to serialize run summary")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        println!("Report written to {}", path.display());
    }

    if summary.success() {
        Ok(())
    } else {
        anyhow::bail!("{} of {} tests failed", summary.failed, summary.discovered)
    }
}
