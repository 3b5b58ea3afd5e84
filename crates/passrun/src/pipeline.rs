//! Harness orchestration: discover, resolve, compile, link, execute, aggregate.

use crate::config::ToolchainConfig;
use crate::discover::Discoverer;
use crate::error::HarnessResult;
use crate::executor::Executor;
use crate::process::ProcessRunner;
use crate::resolve::{NameResolver, TestCase};
use crate::stage::StageResult;
use crate::summary::{Aggregator, RunSummary, TestRecord};
use crate::toolchain::ToolchainInvoker;
use chrono::Utc;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Test cases sharing one canonical name, with their discovery positions.
type NameGroup = Vec<(usize, TestCase)>;

/// Runs every discovered test through compile, link and execute.
///
/// Tests with distinct names build concurrently (up to `jobs`). Tests that
/// share a name write the same artifacts, so they run one after another.
/// Binaries always execute one at a time.
#[derive(Clone)]
pub struct HarnessPipeline {
    config: Arc<ToolchainConfig>,
    invoker: ToolchainInvoker,
    executor: Executor,
    execution_lock: Arc<Mutex<()>>,
}

impl HarnessPipeline {
    pub fn new(config: Arc<ToolchainConfig>, runner: Arc<dyn ProcessRunner>) -> Self {
        let invoker = ToolchainInvoker::new(config.clone(), runner.clone());
        let executor = Executor::new(runner, config.timeout());
        Self {
            config,
            invoker,
            executor,
            execution_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn config(&self) -> &ToolchainConfig {
        &self.config
    }

    /// Run the harness over `root`.
    ///
    /// Fails only for run-level problems (bad root, bad naming pattern).
    /// Individual test failures are recorded in the returned summary.
    pub async fn run(&self, root: &Path) -> HarnessResult<RunSummary> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4().to_string();
        let config_digest = self.config.digest()?;

        let discoverer = Discoverer::new(root)?;
        let resolver = NameResolver::new(&self.config.naming)?;

        info!(
            run_id = %run_id,
            root = %discoverer.root().display(),
            platform = %self.config.platform,
            "Starting harness run"
        );

        let mut files_scanned = 0usize;
        let mut cases = Vec::new();
        for candidate in discoverer.candidates() {
            files_scanned += 1;
            match TestCase::from_candidate(&resolver, &candidate, &self.config) {
                Some(case) => {
                    debug!(test = %case.name, source = %case.source.display(), "Discovered test");
                    cases.push(case);
                }
                None => debug!(file = %candidate.path.display(), "Not a test"),
            }
        }

        info!(files_scanned, tests = cases.len(), "Discovery complete");

        let (groups, collisions) = group_by_name(cases.clone());
        for name in &collisions {
            warn!(test = %name, "Multiple sources share this test name; running them one at a time");
        }

        let semaphore = Arc::new(Semaphore::new(self.config.jobs));
        let mut tasks = JoinSet::new();

        for group in groups {
            let pipeline = self.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let mut records = Vec::with_capacity(group.len());
                for (index, case) in group {
                    let name = case.name.clone();
                    match pipeline.run_test(case).await {
                        Ok(record) => records.push((index, record)),
                        Err(e) => error!(test = %name, error = %e, "Test pipeline aborted"),
                    }
                }
                records
            });
        }

        let mut aggregator = Aggregator::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(records) => {
                    for (index, record) in records {
                        aggregator.record(index, record);
                    }
                }
                Err(e) => error!(error = %e, "Test pipeline task panicked"),
            }
        }

        // Anything without a record never finished its pipeline.
        if aggregator.len() < cases.len() {
            for (index, case) in cases.into_iter().enumerate() {
                if !aggregator.contains(index) {
                    aggregator.record(
                        index,
                        TestRecord {
                            case,
                            result: StageResult::Pending,
                            failure: None,
                            duration_ms: 0,
                        },
                    );
                }
            }
        }

        let summary = aggregator.finish(run_id, started_at, files_scanned, collisions, config_digest);

        info!(
            run_id = %summary.run_id,
            discovered = summary.discovered,
            passed = summary.passed,
            failed = summary.failed,
            duration_ms = summary.duration_ms,
            "Harness run finished"
        );

        Ok(summary)
    }

    /// Run one test through its pipeline, stopping at the first failed stage.
    pub async fn run_test(&self, case: TestCase) -> HarnessResult<TestRecord> {
        let start = Instant::now();
        let mut result = StageResult::Pending;
        let mut failure = None;

        info!(test = %case.name, "Compiling");
        match self.invoker.compile(&case).await {
            Err(f) => {
                result = result.advance(StageResult::CompileFailed)?;
                failure = Some(f);
            }
            Ok(_) => {
                result = result.advance(StageResult::Compiled)?;

                match self.invoker.link(&case).await {
                    Err(f) => {
                        result = result.advance(StageResult::LinkFailed)?;
                        failure = Some(f);
                    }
                    Ok(_) => {
                        result = result.advance(StageResult::Linked)?;

                        let _exclusive = self.execution_lock.lock().await;
                        match self.executor.run(&case).await {
                            Ok(code) => result = result.advance(StageResult::Ran(code))?,
                            Err(f) => {
                                result = result.advance(StageResult::ExecutionFailed)?;
                                failure = Some(f);
                            }
                        }
                    }
                }
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        match &failure {
            None => info!(test = %case.name, duration_ms, "Passed"),
            Some(f) => warn!(test = %case.name, stage = %f.stage, duration_ms, "Failed"),
        }

        Ok(TestRecord {
            case,
            result,
            failure,
            duration_ms,
        })
    }
}

/// Group cases by canonical name, keeping first-seen order, and list the
/// names claimed by more than one source.
///
/// Names are compared case-insensitively: `Add` and `add` map to the same
/// artifact on Windows and macOS filesystems.
fn group_by_name(cases: Vec<TestCase>) -> (Vec<NameGroup>, Vec<String>) {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<NameGroup> = Vec::new();

    for (index, case) in cases.into_iter().enumerate() {
        let key = artifact_key(&case.name);
        match slots.get(&key) {
            Some(&slot) => groups[slot].push((index, case)),
            None => {
                slots.insert(key, groups.len());
                groups.push(vec![(index, case)]);
            }
        }
    }

    let collisions = groups
        .iter()
        .filter(|g| g.len() > 1)
        .map(|g| g[0].1.name.clone())
        .collect();

    (groups, collisions)
}

fn artifact_key(name: &str) -> String {
    name.to_lowercase()
}
