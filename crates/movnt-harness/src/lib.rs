//! Test harness for the non-temporal-store alignment suite.
//!
//! The harness expands a small set of case definitions into the execution
//! requests that exercise every store path of the copy primitive under
//! varying alignment, acceleration, and threshold settings. Cases carry
//! explicit environment deltas instead of mutating process state, and host
//! preconditions (architecture, instrumentation tooling) are evaluated
//! before anything runs.

pub mod backing;
pub mod case;
pub mod env;
pub mod host;
pub mod matrix;
pub mod plan;
pub mod runner;

pub use case::{AccelPatch, Arch, CaseSpec, Duration, Instrumentation, StorePathVariant};
pub use env::{EnvDelta, EnvOverride, EnvVar};
pub use host::{Admission, HostProbe, SkipReason};
pub use matrix::TestMatrix;
pub use plan::{materialize, ExecutionRequest, Materialization};
pub use runner::{
    execute_case, execute_matrix, CaseReport, CaseStatus, RequestOutcome, RequestReport,
    RequestRunner, RunSummary, SubprocessRunner,
};
