//! Request execution and outcome reporting.
//!
//! The harness generates requests lazily and hands them to a
//! [`RequestRunner`] one at a time. A failing request is surfaced verbatim
//! and never aborts its siblings: the sweep runs to completion so every
//! variant/threshold combination is exercised. Skips are reported
//! distinctly from failures.

use std::path::{Path, PathBuf};
use std::process::Command;

use movnt_error::{HarnessError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backing::create_holey_file;
use crate::case::{CaseSpec, Instrumentation};
use crate::host::{HostProbe, SkipReason};
use crate::matrix::{TestMatrix, MATRIX_SCHEMA_VERSION};
use crate::plan::{materialize, ExecutionRequest, Materialization};

/// Outcome of one subject-binary invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestOutcome {
    Passed,
    /// Non-zero exit or instrumentation violation, surfaced verbatim.
    Failed {
        exit_code: Option<i32>,
        stderr: String,
    },
}

impl RequestOutcome {
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Per-request report inside a case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestReport {
    pub variant: String,
    pub threshold: Option<String>,
    pub outcome: RequestOutcome,
}

/// Terminal status of one case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Passed,
    Failed,
    Skipped,
}

/// Full report for one case: status, skip reason when skipped, and the
/// per-request outcomes when run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseReport {
    pub case_id: String,
    pub status: CaseStatus,
    pub skip_reason: Option<SkipReason>,
    pub requests: Vec<RequestReport>,
}

/// Matrix-level run summary artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub schema_version: u32,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cases: Vec<CaseReport>,
}

impl RunSummary {
    #[must_use]
    pub const fn all_passed(&self) -> bool {
        self.failed == 0
    }

    /// Serialize the summary in a deterministic pretty JSON format.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Executes one request. The subject binary invocation is a blocking
/// external call owned by the implementation; the harness itself never
/// blocks elsewhere.
pub trait RequestRunner {
    fn run(&mut self, request: &ExecutionRequest) -> Result<RequestOutcome>;
}

/// Runs requests by spawning the subject binary, optionally wrapped in
/// `valgrind --tool=pmemcheck`.
#[derive(Debug, Clone)]
pub struct SubprocessRunner {
    binary: PathBuf,
}

impl SubprocessRunner {
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self, request: &ExecutionRequest) -> Command {
        let mut cmd = match request.instrumentation {
            Some(Instrumentation::Pmemcheck) => {
                let mut cmd = Command::new("valgrind");
                cmd.arg("--tool=pmemcheck");
                cmd.arg(&self.binary);
                cmd
            }
            None => Command::new(&self.binary),
        };
        cmd.args(request.args());
        // Apply the request's delta on top of the inherited environment;
        // the harness process environment itself is never modified.
        for var in request.env.cleared() {
            cmd.env_remove(var.name());
        }
        for o in request.env.overrides() {
            cmd.env(o.var.name(), &o.value);
        }
        cmd
    }
}

impl RequestRunner for SubprocessRunner {
    fn run(&mut self, request: &ExecutionRequest) -> Result<RequestOutcome> {
        let mut cmd = self.command(request);
        debug!(
            case = %request.case_id,
            variant = %request.variant,
            threshold = ?request.threshold,
            binary = %self.binary.display(),
            "spawning subject binary"
        );
        let output = cmd.output().map_err(|source| HarnessError::Spawn {
            binary: self.binary.clone(),
            source,
        })?;
        if output.status.success() {
            Ok(RequestOutcome::Passed)
        } else {
            Ok(RequestOutcome::Failed {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }
}

/// Execute one case: establish the backing file, materialize, then run
/// every request to completion regardless of individual failures.
pub fn execute_case(
    spec: &CaseSpec,
    host: &HostProbe,
    scratch_root: &Path,
    runner: &mut dyn RequestRunner,
) -> Result<CaseReport> {
    let case_dir = scratch_root.join(&spec.id);
    std::fs::create_dir_all(&case_dir)?;
    let file_path = create_holey_file(&case_dir, spec.file_size)?;

    let requests = match materialize(spec, host, &file_path)? {
        Materialization::Skip(reason) => {
            info!(case = %spec.id, reason = %reason, "case skipped");
            return Ok(CaseReport {
                case_id: spec.id.clone(),
                status: CaseStatus::Skipped,
                skip_reason: Some(reason),
                requests: Vec::new(),
            });
        }
        Materialization::Run(requests) => requests,
    };

    let mut reports = Vec::with_capacity(requests.len());
    let mut failures = 0_usize;
    for request in &requests {
        let outcome = runner.run(request)?;
        if let RequestOutcome::Failed { exit_code, .. } = &outcome {
            failures += 1;
            warn!(
                case = %spec.id,
                variant = %request.variant,
                threshold = ?request.threshold,
                exit_code = ?exit_code,
                "request failed"
            );
        }
        reports.push(RequestReport {
            variant: request.variant.code().to_string(),
            threshold: request.threshold.clone(),
            outcome,
        });
    }

    let status = if failures == 0 {
        CaseStatus::Passed
    } else {
        CaseStatus::Failed
    };
    info!(
        case = %spec.id,
        requests = reports.len(),
        failures,
        status = ?status,
        "case finished"
    );
    Ok(CaseReport {
        case_id: spec.id.clone(),
        status,
        skip_reason: None,
        requests: reports,
    })
}

/// Execute every case of a matrix sequentially and summarize.
pub fn execute_matrix(
    matrix: &TestMatrix,
    host: &HostProbe,
    scratch_root: &Path,
    runner: &mut dyn RequestRunner,
) -> Result<RunSummary> {
    matrix.validate()?;
    let mut cases = Vec::with_capacity(matrix.cases.len());
    for spec in &matrix.cases {
        cases.push(execute_case(spec, host, scratch_root, runner)?);
    }
    let passed = cases.iter().filter(|c| c.status == CaseStatus::Passed).count();
    let failed = cases.iter().filter(|c| c.status == CaseStatus::Failed).count();
    let skipped = cases.iter().filter(|c| c.status == CaseStatus::Skipped).count();
    info!(passed, failed, skipped, "matrix run finished");
    Ok(RunSummary {
        schema_version: MATRIX_SCHEMA_VERSION,
        passed,
        failed,
        skipped,
        cases,
    })
}
