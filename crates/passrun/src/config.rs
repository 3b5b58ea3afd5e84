//! Toolchain configuration, selected once per run from a platform key.

use crate::error::{HarnessError, HarnessResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Target architecture of the produced test binaries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// 32-bit x86
    X86,

    /// 64-bit x86
    X64,
}

impl Platform {
    /// Get the platform name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            Platform::X86 => "x86",
            Platform::X64 => "x64",
        }
    }

    /// Compiler/linker flag selecting the architecture.
    pub fn arch_flag(&self) -> &'static str {
        match self {
            Platform::X86 => "-m32",
            Platform::X64 => "-m64",
        }
    }

    /// Subdirectory of the library dir holding this platform's artifact.
    pub fn library_subdir(&self) -> &'static str {
        match self {
            Platform::X86 => "x86",
            Platform::X64 => "x64",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Platform {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "x86" | "win32" | "i686" | "32" => Ok(Platform::X86),
            "x64" | "amd64" | "x86_64" | "64" => Ok(Platform::X64),
            _ => Err(HarnessError::UnknownPlatform(s.to_string())),
        }
    }
}

/// Filename convention marking a source file as a test:
/// `<name>` + separator + suffix + `.` + extension.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NamingConvention {
    /// Literal between the test name and the suffix (may be empty).
    pub separator: String,

    /// Suffix token, e.g. `pass`.
    pub suffix: String,

    /// Accepted source extensions without the leading dot.
    pub extensions: Vec<String>,
}

impl Default for NamingConvention {
    fn default() -> Self {
        Self {
            separator: ".".to_string(),
            suffix: "pass".to_string(),
            extensions: vec!["cpp".to_string(), "cc".to_string(), "cxx".to_string()],
        }
    }
}

impl NamingConvention {
    pub fn new(separator: impl Into<String>, suffix: impl Into<String>, extensions: Vec<String>) -> Self {
        Self {
            separator: separator.into(),
            suffix: suffix.into(),
            extensions,
        }
    }

    fn validate(&self) -> HarnessResult<()> {
        if self.suffix.is_empty() {
            return Err(HarnessError::InvalidConfig(
                "naming convention suffix must not be empty".to_string(),
            ));
        }
        if self.extensions.is_empty() || self.extensions.iter().any(|e| e.trim_start_matches('.').is_empty()) {
            return Err(HarnessError::InvalidConfig(
                "naming convention needs at least one non-empty extension".to_string(),
            ));
        }
        Ok(())
    }
}

/// Read-only toolchain parameters for one run.
///
/// Built once through [`ToolchainConfig::builder`] and shared by every
/// component behind an `Arc`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolchainConfig {
    pub platform: Platform,
    pub compiler: PathBuf,
    pub linker: PathBuf,
    /// Header search paths, in order.
    pub include_paths: Vec<PathBuf>,
    /// Resolved path of the prebuilt library artifact.
    pub library_path: PathBuf,
    pub language_standard: String,
    pub optimization: String,
    pub debug_info: bool,
    pub exceptions: bool,
    pub rtti: bool,
    /// Appended after the generated compiler flags, in order.
    pub extra_compile_flags: Vec<String>,
    pub extra_link_flags: Vec<String>,
    pub output_dir: PathBuf,
    pub naming: NamingConvention,
    /// Per-process timeout; `None` waits forever.
    pub timeout_secs: Option<u64>,
    /// Maximum number of test pipelines building at once.
    pub jobs: usize,
}

impl ToolchainConfig {
    /// Start a builder for the given platform key.
    ///
    /// Fails with [`HarnessError::UnknownPlatform`] if the key is not recognized.
    pub fn builder(platform_key: &str) -> HarnessResult<ToolchainConfigBuilder> {
        let platform = platform_key.parse::<Platform>()?;
        Ok(ToolchainConfigBuilder::new(platform))
    }

    /// Per-process timeout as a `Duration`.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.filter(|s| *s > 0).map(Duration::from_secs)
    }

    /// Directory tag separating artifacts per architecture and debug setting.
    pub fn artifact_tag(&self) -> String {
        let profile = if self.debug_info { "debug" } else { "release" };
        format!("{}-{}", self.platform, profile)
    }

    /// Directory receiving compiled objects.
    pub fn object_dir(&self) -> PathBuf {
        self.output_dir.join("obj").join(self.artifact_tag())
    }

    /// Directory receiving linked test binaries.
    pub fn binary_dir(&self) -> PathBuf {
        self.output_dir.join("bin").join(self.artifact_tag())
    }

    /// SHA-256 of the serialized configuration, used to identify runs.
    pub fn digest(&self) -> HarnessResult<String> {
        let bytes = serde_json::to_vec(self)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Default file name of the library artifact for the host OS.
pub fn default_library_file() -> &'static str {
    if cfg!(windows) {
        "YupeiLibrary.lib"
    } else {
        "libYupeiLibrary.a"
    }
}

/// Builder for [`ToolchainConfig`].
#[derive(Debug, Clone)]
pub struct ToolchainConfigBuilder {
    platform: Platform,
    compiler: PathBuf,
    linker: PathBuf,
    include_paths: Vec<PathBuf>,
    library_dir: PathBuf,
    library_file: String,
    language_standard: String,
    optimization: String,
    debug_info: bool,
    exceptions: bool,
    rtti: bool,
    extra_compile_flags: Vec<String>,
    extra_link_flags: Vec<String>,
    output_dir: PathBuf,
    naming: NamingConvention,
    timeout_secs: Option<u64>,
    jobs: usize,
}

impl ToolchainConfigBuilder {
    fn new(platform: Platform) -> Self {
        Self {
            platform,
            compiler: PathBuf::from("clang++"),
            linker: PathBuf::from("clang++"),
            include_paths: Vec::new(),
            library_dir: PathBuf::from("../Source/Library/Lib"),
            library_file: default_library_file().to_string(),
            language_standard: "c++17".to_string(),
            optimization: "-O0".to_string(),
            debug_info: true,
            exceptions: true,
            rtti: true,
            extra_compile_flags: Vec::new(),
            extra_link_flags: Vec::new(),
            output_dir: PathBuf::from("build"),
            naming: NamingConvention::default(),
            timeout_secs: None,
            jobs: 1,
        }
    }

    pub fn with_compiler(mut self, compiler: impl Into<PathBuf>) -> Self {
        self.compiler = compiler.into();
        self
    }

    pub fn with_linker(mut self, linker: impl Into<PathBuf>) -> Self {
        self.linker = linker.into();
        self
    }

    pub fn with_include_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.include_paths.push(path.into());
        self
    }

    /// Directory containing the per-platform library subdirectories.
    pub fn with_library_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.library_dir = dir.into();
        self
    }

    pub fn with_library_file(mut self, file: impl Into<String>) -> Self {
        self.library_file = file.into();
        self
    }

    pub fn with_language_standard(mut self, standard: impl Into<String>) -> Self {
        self.language_standard = standard.into();
        self
    }

    pub fn with_optimization(mut self, level: impl Into<String>) -> Self {
        self.optimization = level.into();
        self
    }

    pub fn with_debug_info(mut self, enabled: bool) -> Self {
        self.debug_info = enabled;
        self
    }

    pub fn with_exceptions(mut self, enabled: bool) -> Self {
        self.exceptions = enabled;
        self
    }

    pub fn with_rtti(mut self, enabled: bool) -> Self {
        self.rtti = enabled;
        self
    }

    pub fn with_compile_flag(mut self, flag: impl Into<String>) -> Self {
        self.extra_compile_flags.push(flag.into());
        self
    }

    pub fn with_link_flag(mut self, flag: impl Into<String>) -> Self {
        self.extra_link_flags.push(flag.into());
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_naming(mut self, naming: NamingConvention) -> Self {
        self.naming = naming;
        self
    }

    pub fn with_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    /// Validate and freeze the configuration.
    pub fn build(self) -> HarnessResult<ToolchainConfig> {
        if self.jobs == 0 {
            return Err(HarnessError::InvalidConfig("jobs must be at least 1".to_string()));
        }
        if self.library_file.is_empty() {
            return Err(HarnessError::InvalidConfig("library file name must not be empty".to_string()));
        }
        self.naming.validate()?;

        let library_path = library_path_for(&self.library_dir, self.platform, &self.library_file);

        Ok(ToolchainConfig {
            platform: self.platform,
            compiler: self.compiler,
            linker: self.linker,
            include_paths: self.include_paths,
            library_path,
            language_standard: self.language_standard,
            optimization: self.optimization,
            debug_info: self.debug_info,
            exceptions: self.exceptions,
            rtti: self.rtti,
            extra_compile_flags: self.extra_compile_flags,
            extra_link_flags: self.extra_link_flags,
            output_dir: self.output_dir,
            naming: self.naming,
            timeout_secs: self.timeout_secs,
            jobs: self.jobs,
        })
    }
}

fn library_path_for(library_dir: &Path, platform: Platform, file: &str) -> PathBuf {
    library_dir.join(platform.library_subdir()).join(file)
}
