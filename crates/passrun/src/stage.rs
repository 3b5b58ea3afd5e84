//! Pipeline stages and the per-test stage result state machine.

use crate::error::{HarnessError, HarnessResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The three external-process stages a test passes through.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Compiler invocation producing an object file
    Compile,

    /// Linker invocation producing the test binary
    Link,

    /// Running the test binary
    Execute,
}

impl Stage {
    /// Get the stage name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Compile => "compile",
            Stage::Link => "link",
            Stage::Execute => "execute",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a test currently stands in its pipeline.
///
/// Only moves forward:
/// - `Pending -> CompileFailed`
/// - `Pending -> Compiled -> LinkFailed`
/// - `Pending -> Compiled -> Linked -> ExecutionFailed`
/// - `Pending -> Compiled -> Linked -> Ran(0)`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "status", content = "exit_code", rename_all = "snake_case")]
pub enum StageResult {
    #[default]
    Pending,
    CompileFailed,
    LinkFailed,
    Compiled,
    Linked,
    Ran(i32),
    ExecutionFailed,
}

impl StageResult {
    /// Move to `next`, rejecting anything outside the allowed transitions.
    pub fn advance(self, next: StageResult) -> HarnessResult<StageResult> {
        use StageResult::*;

        let allowed = matches!(
            (self, next),
            (Pending, Compiled)
                | (Pending, CompileFailed)
                | (Compiled, Linked)
                | (Compiled, LinkFailed)
                | (Linked, Ran(0))
                | (Linked, ExecutionFailed)
        );

        if allowed {
            Ok(next)
        } else {
            Err(HarnessError::InvalidTransition {
                current: self.to_string(),
                requested: next.to_string(),
            })
        }
    }

    /// No further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StageResult::CompileFailed
                | StageResult::LinkFailed
                | StageResult::ExecutionFailed
                | StageResult::Ran(_)
        )
    }

    /// Ran to completion with exit code 0.
    pub fn is_pass(&self) -> bool {
        matches!(self, StageResult::Ran(0))
    }

    /// The stage this result failed at, if it is a failure.
    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            StageResult::CompileFailed => Some(Stage::Compile),
            StageResult::LinkFailed => Some(Stage::Link),
            StageResult::ExecutionFailed => Some(Stage::Execute),
            _ => None,
        }
    }

    /// Compile stage succeeded (current state is at or past `Compiled`).
    pub fn reached_compiled(&self) -> bool {
        matches!(
            self,
            StageResult::Compiled
                | StageResult::Linked
                | StageResult::LinkFailed
                | StageResult::Ran(_)
                | StageResult::ExecutionFailed
        )
    }

    /// Link stage succeeded (current state is at or past `Linked`).
    pub fn reached_linked(&self) -> bool {
        matches!(
            self,
            StageResult::Linked | StageResult::Ran(_) | StageResult::ExecutionFailed
        )
    }

    /// The executor was attempted for this test.
    pub fn reached_execution(&self) -> bool {
        matches!(self, StageResult::Ran(_) | StageResult::ExecutionFailed)
    }
}

impl fmt::Display for StageResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageResult::Pending => f.write_str("pending"),
            StageResult::CompileFailed => f.write_str("compile_failed"),
            StageResult::LinkFailed => f.write_str("link_failed"),
            StageResult::Compiled => f.write_str("compiled"),
            StageResult::Linked => f.write_str("linked"),
            StageResult::Ran(code) => write!(f, "ran({})", code),
            StageResult::ExecutionFailed => f.write_str("execution_failed"),
        }
    }
}
