//! Materialization: turning one case definition into its execution requests.
//!
//! A case expands into one un-swept pass (no threshold override) followed by
//! one pass per sweep value; each pass issues one request per store-path
//! variant in the fixed C, F, B, S order. Expansion is pure and lazy-friendly:
//! no environment is mutated and no process is spawned here.

use std::path::{Path, PathBuf};

use movnt_error::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::case::{CaseSpec, Instrumentation, StorePathVariant};
use crate::env::{EnvDelta, EnvVar};
use crate::host::{Admission, HostProbe, SkipReason};

/// One concrete invocation of the subject binary.
///
/// Created on demand, consumed immediately by a runner, not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub case_id: String,
    pub file_path: PathBuf,
    pub variant: StorePathVariant,
    /// Sweep value this request runs under, `None` for the un-swept pass.
    pub threshold: Option<String>,
    /// Instrumentation wrapper for the invocation, if the case requires one.
    pub instrumentation: Option<Instrumentation>,
    /// Environment delta to apply on top of the ambient environment.
    pub env: EnvDelta,
}

impl ExecutionRequest {
    /// Positional arguments for the subject binary.
    #[must_use]
    pub fn args(&self) -> [String; 2] {
        [
            self.file_path.display().to_string(),
            self.variant.code().to_string(),
        ]
    }
}

/// Result of asking a case to materialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Materialization {
    /// Preconditions hold; here is the full request sequence.
    Run(Vec<ExecutionRequest>),
    /// A precondition failed; zero requests were produced.
    Skip(SkipReason),
}

/// Materialize a case against a host and a backing file.
///
/// Precondition failures return `Skip`; composition defects return `Err`
/// and abort the case before any request exists. The request sequence
/// always covers every (pass, variant) combination exactly once.
pub fn materialize(
    spec: &CaseSpec,
    host: &HostProbe,
    file_path: &Path,
) -> Result<Materialization> {
    if let Admission::Skip(reason) = host.admit(spec) {
        return Ok(Materialization::Skip(reason));
    }

    let base = spec.base_delta();
    base.check_accel_exclusive()?;

    let mut requests = Vec::with_capacity(spec.request_count());
    push_pass(&mut requests, spec, file_path, &base, None);
    for value in &spec.threshold_sweep {
        // Copy-on-extend: each swept pass gets its own child delta.
        let swept = base.extended(EnvVar::MovntThreshold, value.clone());
        push_pass(&mut requests, spec, file_path, &swept, Some(value.clone()));
    }

    debug!(
        case = %spec.id,
        requests = requests.len(),
        sweep = spec.threshold_sweep.len(),
        "case materialized"
    );
    Ok(Materialization::Run(requests))
}

fn push_pass(
    requests: &mut Vec<ExecutionRequest>,
    spec: &CaseSpec,
    file_path: &Path,
    env: &EnvDelta,
    threshold: Option<String>,
) {
    for variant in StorePathVariant::ALL {
        requests.push(ExecutionRequest {
            case_id: spec.id.clone(),
            file_path: file_path.to_path_buf(),
            variant: *variant,
            threshold: threshold.clone(),
            instrumentation: spec.instrumentation,
            env: env.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::collections::BTreeSet;

    use super::*;
    use crate::case::{AccelPatch, Arch, CaseSpec};
    use crate::env::{EnvOverride, ENABLE};

    fn x86_host() -> HostProbe {
        HostProbe::fixed(Some(Arch::X86_64), true)
    }

    fn file() -> PathBuf {
        PathBuf::from("/tmp/scratch/testfile")
    }

    fn requests_of(m: Materialization) -> Vec<ExecutionRequest> {
        match m {
            Materialization::Run(reqs) => reqs,
            Materialization::Skip(reason) => panic!("unexpected skip: {reason}"),
        }
    }

    #[test]
    fn base_case_expands_to_twelve_requests() {
        let spec = CaseSpec::builder("base").build().unwrap();
        let reqs = requests_of(materialize(&spec, &x86_host(), &file()).unwrap());
        assert_eq!(reqs.len(), 12);

        // First pass carries no threshold, in C, F, B, S order.
        let codes: Vec<&str> = reqs[..4].iter().map(|r| r.variant.code()).collect();
        assert_eq!(codes, vec!["C", "F", "B", "S"]);
        assert!(reqs[..4].iter().all(|r| r.threshold.is_none()));

        // Then one full pass per sweep value.
        assert!(reqs[4..8].iter().all(|r| r.threshold.as_deref() == Some("0")));
        assert!(
            reqs[8..]
                .iter()
                .all(|r| r.threshold.as_deref() == Some("99999"))
        );
    }

    #[test]
    fn swept_requests_are_pairwise_distinct() {
        let spec = CaseSpec::builder("base").build().unwrap();
        let reqs = requests_of(materialize(&spec, &x86_host(), &file()).unwrap());
        let swept: BTreeSet<(String, String)> = reqs
            .iter()
            .filter_map(|r| {
                r.threshold
                    .as_ref()
                    .map(|t| (r.variant.code().to_string(), t.clone()))
            })
            .collect();
        assert_eq!(swept.len(), 8);
    }

    #[test]
    fn no_sweep_case_expands_to_four_requests() {
        let spec = CaseSpec::builder("no-accel")
            .accel(AccelPatch::DisableAll)
            .no_sweep()
            .build()
            .unwrap();
        let reqs = requests_of(materialize(&spec, &x86_host(), &file()).unwrap());
        assert_eq!(reqs.len(), 4);
        assert!(reqs.iter().all(|r| r.threshold.is_none()));
    }

    #[test]
    fn all_requests_share_the_backing_file() {
        let spec = CaseSpec::builder("base").build().unwrap();
        let reqs = requests_of(materialize(&spec, &x86_host(), &file()).unwrap());
        assert!(reqs.iter().all(|r| r.file_path == file()));
        assert_eq!(reqs[0].args(), ["/tmp/scratch/testfile".to_string(), "C".to_string()]);
    }

    #[test]
    fn disable_pair_present_in_every_request_or_none() {
        let spec = CaseSpec::builder("pmemcheck-no-accel")
            .accel(AccelPatch::DisableAll)
            .instrumentation(Instrumentation::Pmemcheck)
            .build()
            .unwrap();
        let reqs = requests_of(materialize(&spec, &x86_host(), &file()).unwrap());
        assert_eq!(reqs.len(), 12);
        for r in &reqs {
            let resolved = r.env.resolve(&BTreeMap::new());
            assert_eq!(
                resolved.get("PMEM_NO_MOVNT").map(String::as_str),
                Some(ENABLE),
            );
            assert_eq!(
                resolved.get("PMEM_NO_GENERIC_MEMCPY").map(String::as_str),
                Some(ENABLE),
            );
        }

        let base = CaseSpec::builder("base").build().unwrap();
        let reqs = requests_of(materialize(&base, &x86_host(), &file()).unwrap());
        for r in &reqs {
            let resolved = r.env.resolve(&BTreeMap::new());
            assert!(!resolved.contains_key("PMEM_NO_MOVNT"));
            assert!(!resolved.contains_key("PMEM_NO_GENERIC_MEMCPY"));
        }
    }

    #[test]
    fn one_accel_path_never_enables_another() {
        for (id, patch, enabled, other) in [
            ("avx", AccelPatch::EnableAvx, "PMEM_AVX", "PMEM_AVX512F"),
            ("avx512f", AccelPatch::EnableAvx512f, "PMEM_AVX512F", "PMEM_AVX"),
        ] {
            let spec = CaseSpec::builder(id).accel(patch).build().unwrap();
            let reqs = requests_of(materialize(&spec, &x86_host(), &file()).unwrap());
            for r in &reqs {
                let resolved = r.env.resolve(&BTreeMap::new());
                assert_eq!(resolved.get(enabled).map(String::as_str), Some(ENABLE));
                assert_ne!(resolved.get(other).map(String::as_str), Some(ENABLE));
            }
        }
    }

    #[test]
    fn ambient_threshold_never_leaks_into_requests() {
        let ambient: BTreeMap<String, String> = [
            ("PMEM_MOVNT_THRESHOLD".to_string(), "777".to_string()),
            ("PATH".to_string(), "/usr/bin".to_string()),
        ]
        .into_iter()
        .collect();
        let clean: BTreeMap<String, String> =
            [("PATH".to_string(), "/usr/bin".to_string())].into_iter().collect();

        let spec = CaseSpec::builder("base").build().unwrap();
        let reqs = requests_of(materialize(&spec, &x86_host(), &file()).unwrap());
        for r in &reqs {
            // Identical resolution regardless of ambient pre-state.
            assert_eq!(r.env.resolve(&ambient), r.env.resolve(&clean));
            let resolved = r.env.resolve(&ambient);
            match &r.threshold {
                Some(t) => assert_eq!(resolved.get("PMEM_MOVNT_THRESHOLD"), Some(t)),
                None => assert!(!resolved.contains_key("PMEM_MOVNT_THRESHOLD")),
            }
        }
    }

    #[test]
    fn gated_case_on_wrong_host_produces_zero_requests() {
        let spec = CaseSpec::builder("avx")
            .accel(AccelPatch::EnableAvx)
            .build()
            .unwrap();
        let host = HostProbe::fixed(Some(Arch::Riscv64), true);
        match materialize(&spec, &host, &file()).unwrap() {
            Materialization::Skip(SkipReason::UnsupportedArchitecture { required, .. }) => {
                assert_eq!(required, Arch::X86_64);
            }
            other => panic!("expected architecture skip, got {other:?}"),
        }
    }

    #[test]
    fn instrumented_case_without_tool_is_skipped_not_run_bare() {
        let spec = CaseSpec::builder("pmemcheck-base")
            .instrumentation(Instrumentation::Pmemcheck)
            .build()
            .unwrap();
        let host = HostProbe::fixed(Some(Arch::X86_64), false);
        match materialize(&spec, &host, &file()).unwrap() {
            Materialization::Skip(SkipReason::InstrumentationUnavailable { tool }) => {
                assert_eq!(tool, "pmemcheck");
            }
            other => panic!("expected instrumentation skip, got {other:?}"),
        }
    }

    #[test]
    fn instrumented_requests_carry_wrapper_and_options() {
        let spec = CaseSpec::builder("pmemcheck-base")
            .instrumentation(Instrumentation::Pmemcheck)
            .build()
            .unwrap();
        let reqs = requests_of(materialize(&spec, &x86_host(), &file()).unwrap());
        for r in &reqs {
            assert_eq!(r.instrumentation, Some(Instrumentation::Pmemcheck));
            let resolved = r.env.resolve(&BTreeMap::new());
            assert_eq!(
                resolved.get("VALGRIND_OPTS").map(String::as_str),
                Some("--mult-stores=yes")
            );
        }
    }

    #[test]
    fn conflicting_case_aborts_before_any_request() {
        // Bypass the builder to simulate a hand-assembled defective case.
        let mut spec = CaseSpec::builder("bad")
            .accel(AccelPatch::EnableAvx512f)
            .build()
            .unwrap();
        spec.extra_overrides.push(EnvOverride::enable(EnvVar::Avx));
        let err = materialize(&spec, &x86_host(), &file()).unwrap_err();
        assert!(err.is_composition());
    }
}
