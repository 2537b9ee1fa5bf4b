//! Host preconditions: architecture and instrumentation-tool availability.
//!
//! Gating is an explicit predicate evaluated before a case materializes.
//! An unmet precondition yields a skip outcome distinguishable from a test
//! failure; it never turns into an execution attempt.

use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::case::{Arch, CaseSpec, Instrumentation};

/// Why a case was skipped rather than run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum SkipReason {
    /// The case selects an architecture-specific acceleration path the
    /// host does not have.
    UnsupportedArchitecture { required: Arch, host: String },
    /// The required memory-checking tool is not installed or not enabled.
    InstrumentationUnavailable { tool: String },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedArchitecture { required, host } => {
                write!(f, "architecture unsupported: requires {required}, host is {host}")
            }
            Self::InstrumentationUnavailable { tool } => {
                write!(f, "instrumentation tool unavailable: {tool}")
            }
        }
    }
}

/// Tri-state admission decision for one case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Admission {
    Run,
    Skip(SkipReason),
}

/// Point-in-time snapshot of the host capabilities a case may require.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostProbe {
    /// Host architecture, when it is one the matrix knows about.
    pub arch: Option<Arch>,
    /// Raw architecture string, for skip reporting on exotic hosts.
    pub arch_name: String,
    /// Whether valgrind with the pmemcheck tool answers on this host.
    pub pmemcheck_available: bool,
}

impl HostProbe {
    /// Probe the running host.
    #[must_use]
    pub fn detect() -> Self {
        let probe = Self {
            arch: Arch::host(),
            arch_name: std::env::consts::ARCH.to_string(),
            pmemcheck_available: pmemcheck_answers(),
        };
        info!(
            arch = %probe.arch_name,
            pmemcheck = probe.pmemcheck_available,
            "host probe"
        );
        probe
    }

    /// Fixed probe for tests and dry runs.
    #[must_use]
    pub fn fixed(arch: Option<Arch>, pmemcheck_available: bool) -> Self {
        let arch_name = arch.map_or_else(|| "unknown".to_string(), |a| a.as_str().to_string());
        Self {
            arch,
            arch_name,
            pmemcheck_available,
        }
    }

    fn tool_available(&self, instr: Instrumentation) -> bool {
        match instr {
            Instrumentation::Pmemcheck => self.pmemcheck_available,
        }
    }

    /// Evaluate a case's preconditions against this host.
    #[must_use]
    pub fn admit(&self, spec: &CaseSpec) -> Admission {
        if let Some(required) = spec.required_arch() {
            if self.arch != Some(required) {
                debug!(case = %spec.id, required = %required, host = %self.arch_name, "case skipped");
                return Admission::Skip(SkipReason::UnsupportedArchitecture {
                    required,
                    host: self.arch_name.clone(),
                });
            }
        }
        if let Some(instr) = spec.instrumentation {
            if !self.tool_available(instr) {
                debug!(case = %spec.id, tool = %instr, "case skipped");
                return Admission::Skip(SkipReason::InstrumentationUnavailable {
                    tool: instr.tool().to_string(),
                });
            }
        }
        Admission::Run
    }
}

/// Whether `valgrind --tool=pmemcheck` runs on this host. Plain valgrind
/// without the pmem tool does not count.
fn pmemcheck_answers() -> bool {
    Command::new("valgrind")
        .args(["--tool=pmemcheck", "--version"])
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}
