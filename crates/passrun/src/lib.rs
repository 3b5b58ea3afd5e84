//! passrun - pattern-driven compile/link/execute test harness
//!
//! Walks a directory tree for test programs named by convention
//! (`add.pass.cpp`), and for each one:
//! - Compiles it against a fixed toolchain configuration
//! - Links the object against a prebuilt library artifact
//! - Executes the produced binary and records its exit status
//!
//! Every test flows through its own pipeline; a failure at any stage only
//! stops that test. Results are collected into an ordered [`RunSummary`].

pub mod config;
pub mod discover;
pub mod error;
pub mod executor;
pub mod fakes;
pub mod pipeline;
pub mod process;
pub mod resolve;
pub mod stage;
pub mod summary;
pub mod telemetry;
pub mod toolchain;

// Re-export key types
pub use config::{NamingConvention, Platform, ToolchainConfig, ToolchainConfigBuilder};
pub use discover::{CandidateFile, Discoverer};
pub use error::{HarnessError, HarnessResult, StageFailure};
pub use executor::Executor;
pub use pipeline::HarnessPipeline;
pub use process::{Invocation, ProcessError, ProcessOutcome, ProcessRunner, TokioProcessRunner};
pub use resolve::{NameResolver, TestCase};
pub use stage::{Stage, StageResult};
pub use summary::{Aggregator, RunSummary, TestRecord};
pub use telemetry::init_tracing;
pub use toolchain::ToolchainInvoker;

/// passrun version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
