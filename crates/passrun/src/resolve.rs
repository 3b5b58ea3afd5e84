//! Filename convention matching and test case construction.

use crate::config::{NamingConvention, ToolchainConfig};
use crate::discover::CandidateFile;
use crate::error::HarnessResult;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Extracts canonical test names from file names.
///
/// The pattern is anchored at both ends: `<name><separator><suffix>.<ext>`.
/// Everything before the separator is the name, used verbatim.
#[derive(Debug, Clone)]
pub struct NameResolver {
    pattern: Regex,
}

impl NameResolver {
    pub fn new(naming: &NamingConvention) -> HarnessResult<Self> {
        let extensions = naming
            .extensions
            .iter()
            .map(|ext| regex::escape(ext.trim_start_matches('.')))
            .collect::<Vec<_>>()
            .join("|");

        let pattern = format!(
            r"^(?P<name>.+){}{}\.(?:{})$",
            regex::escape(&naming.separator),
            regex::escape(&naming.suffix),
            extensions
        );

        Ok(Self {
            pattern: Regex::new(&pattern)?,
        })
    }

    /// Canonical test name for `file_name`, or `None` if it is not a test.
    pub fn resolve_name(&self, file_name: &str) -> Option<String> {
        self.pattern
            .captures(file_name)
            .and_then(|caps| caps.name("name"))
            .map(|m| m.as_str().to_string())
            .filter(|name| !name.is_empty())
    }

    /// Canonical test name for a discovered candidate.
    pub fn resolve(&self, candidate: &CandidateFile) -> Option<String> {
        self.resolve_name(&candidate.file_name)
    }
}

/// One test program tracked through compile, link and execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// Canonical name derived from the file name.
    pub name: String,

    /// Source file to compile.
    pub source: PathBuf,

    /// Object file written by the compile stage.
    pub object_path: PathBuf,

    /// Executable written by the link stage.
    pub binary_path: PathBuf,
}

impl TestCase {
    /// Derive artifact paths for `name` from the configuration.
    pub fn new(name: impl Into<String>, source: impl Into<PathBuf>, config: &ToolchainConfig) -> Self {
        let name = name.into();
        let object_path = config.object_dir().join(format!("{}.o", name));
        let binary_path = config
            .binary_dir()
            .join(format!("{}{}", name, std::env::consts::EXE_SUFFIX));

        Self {
            name,
            source: source.into(),
            object_path,
            binary_path,
        }
    }

    /// Resolve a candidate into a test case, if it follows the naming convention.
    pub fn from_candidate(
        resolver: &NameResolver,
        candidate: &CandidateFile,
        config: &ToolchainConfig,
    ) -> Option<Self> {
        resolver
            .resolve(candidate)
            .map(|name| Self::new(name, candidate.path.clone(), config))
    }
}
