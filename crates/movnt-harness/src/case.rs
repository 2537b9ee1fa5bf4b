//! Test-case configuration: store-path variants, acceleration patches,
//! instrumentation requirements, and the `CaseSpec` they compose into.
//!
//! A case is a base configuration (backing-file size, store-path order,
//! canonical threshold sweep) plus ordered patches: exactly one acceleration
//! patch, then optional instrumentation gating on top. Patches are explicit
//! data, not a class hierarchy; a child's override always wins and the
//! "disable acceleration" pair is applied as one atomic patch.

use movnt_error::{HarnessError, Result};
use serde::{Deserialize, Serialize};

use crate::env::{EnvDelta, EnvOverride, EnvVar, ENABLE};

/// One mebibyte.
pub const MIB: u64 = 1 << 20;

/// Backing-file size used by the reference configuration.
pub const DEFAULT_FILE_SIZE: u64 = 4 * MIB;

/// Canonical two-value threshold sweep: never switch (a huge cutoff) and
/// always switch (zero cutoff).
pub const CANONICAL_SWEEP: [&str; 2] = ["0", "99999"];

/// Selectable internal code paths of the subject copy routine.
///
/// The single-letter codes are the subject binary's positional-argument
/// contract; the mapping from code to behavior is owned by the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorePathVariant {
    /// Generic cached copy.
    Cached,
    /// Flush-only copy.
    Flush,
    /// Non-temporal ("stream") copy.
    NonTemporal,
    /// Scalar byte-at-a-time fallback.
    Scalar,
}

impl StorePathVariant {
    /// Fixed expansion order. Reproducibility only; requests are
    /// independent of each other.
    pub const ALL: &[Self] = &[Self::Cached, Self::Flush, Self::NonTemporal, Self::Scalar];

    /// Positional-argument code handed to the subject binary.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Cached => "C",
            Self::Flush => "F",
            Self::NonTemporal => "B",
            Self::Scalar => "S",
        }
    }
}

impl std::fmt::Display for StorePathVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Expected runtime class of a case, for runner scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Duration {
    Short,
    Medium,
}

/// Host instruction-set architectures a case may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
    X86_64,
    Aarch64,
    Riscv64,
}

impl Arch {
    /// Spelling used by `std::env::consts::ARCH`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Aarch64 => "aarch64",
            Self::Riscv64 => "riscv64",
        }
    }

    /// Architecture of the running host, when it is one we know about.
    #[must_use]
    pub fn host() -> Option<Self> {
        match std::env::consts::ARCH {
            "x86_64" => Some(Self::X86_64),
            "aarch64" => Some(Self::Aarch64),
            "riscv64" => Some(Self::Riscv64),
            _ => None,
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Acceleration-path patch: exactly one per case.
///
/// `DisableAll` sets the non-temporal-store disable flag and the
/// generic-copy disable flag together; the pair is never applied partially.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccelPatch {
    /// No feature override; the binary picks its default path.
    #[default]
    Default,
    /// Force the AVX path.
    EnableAvx,
    /// Force the AVX512F path.
    EnableAvx512f,
    /// Disable non-temporal stores and the generic fallback, atomically.
    DisableAll,
}

impl AccelPatch {
    /// Apply this patch's overrides to a delta.
    pub fn apply(self, delta: &mut EnvDelta) {
        match self {
            Self::Default => {}
            Self::EnableAvx => delta.set(EnvVar::Avx, ENABLE),
            Self::EnableAvx512f => delta.set(EnvVar::Avx512f, ENABLE),
            Self::DisableAll => {
                delta.set(EnvVar::NoMovnt, ENABLE);
                delta.set(EnvVar::NoGenericMemcpy, ENABLE);
            }
        }
    }

    /// Host architecture this patch only makes sense on, if any.
    #[must_use]
    pub const fn required_arch(self) -> Option<Arch> {
        match self {
            Self::EnableAvx | Self::EnableAvx512f => Some(Arch::X86_64),
            Self::Default | Self::DisableAll => None,
        }
    }
}

/// Memory-correctness instrumentation a case may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Instrumentation {
    /// Valgrind's persistent-memory store checker.
    Pmemcheck,
}

impl Instrumentation {
    /// Tool name for availability probing and skip reporting.
    #[must_use]
    pub const fn tool(self) -> &'static str {
        match self {
            Self::Pmemcheck => "pmemcheck",
        }
    }

    /// Strictness options injected before any request of the case runs.
    /// Multiple stores to the same location are significant under pmemcheck.
    #[must_use]
    pub fn options(self) -> EnvOverride {
        match self {
            Self::Pmemcheck => EnvOverride::new(EnvVar::ValgrindOpts, "--mult-stores=yes"),
        }
    }
}

impl std::fmt::Display for Instrumentation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tool())
    }
}

/// A fully composed, validated test-case definition.
///
/// Constructed once at matrix-definition time via [`CaseSpecBuilder`];
/// immutable afterwards. Environment state is threaded through
/// materialization as copy-on-extend deltas, never by mutating the case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseSpec {
    pub id: String,
    pub duration: Duration,
    pub accel: AccelPatch,
    pub instrumentation: Option<Instrumentation>,
    /// Threshold sweep values. Empty means the case opts out of the sweep.
    pub threshold_sweep: Vec<String>,
    /// Extra overrides layered after the acceleration patch.
    pub extra_overrides: Vec<EnvOverride>,
    pub file_size: u64,
}

impl CaseSpec {
    /// Start from the base configuration: short duration, default path,
    /// canonical sweep, 4 MiB backing file.
    #[must_use]
    pub fn builder(id: impl Into<String>) -> CaseSpecBuilder {
        CaseSpecBuilder {
            spec: Self {
                id: id.into(),
                duration: Duration::Short,
                accel: AccelPatch::Default,
                instrumentation: None,
                threshold_sweep: CANONICAL_SWEEP.iter().map(|s| (*s).to_string()).collect(),
                extra_overrides: Vec::new(),
                file_size: DEFAULT_FILE_SIZE,
            },
        }
    }

    /// Architecture precondition, derived from the acceleration patch.
    #[must_use]
    pub const fn required_arch(&self) -> Option<Arch> {
        self.accel.required_arch()
    }

    /// The case-level delta: ambient threshold cleared, acceleration patch,
    /// instrumentation options, extra overrides, in that fixed order.
    /// Per-threshold deltas extend this one; they never mutate it.
    #[must_use]
    pub fn base_delta(&self) -> EnvDelta {
        let mut delta = EnvDelta::new();
        // Sweep values must be the sole source of truth for the threshold.
        delta.clear(EnvVar::MovntThreshold);
        self.accel.apply(&mut delta);
        if let Some(instr) = self.instrumentation {
            let opts = instr.options();
            delta.set(opts.var, opts.value);
        }
        for o in &self.extra_overrides {
            delta.set(o.var, o.value.clone());
        }
        delta
    }

    /// Number of execution requests this case materializes into.
    #[must_use]
    pub fn request_count(&self) -> usize {
        StorePathVariant::ALL.len() * (1 + self.threshold_sweep.len())
    }
}

/// Builder applying ordered patches on top of the base configuration.
#[derive(Debug)]
pub struct CaseSpecBuilder {
    spec: CaseSpec,
}

impl CaseSpecBuilder {
    #[must_use]
    pub fn accel(mut self, patch: AccelPatch) -> Self {
        self.spec.accel = patch;
        self
    }

    /// Require an instrumentation tool. Instrumented runs are slower.
    #[must_use]
    pub fn instrumentation(mut self, instr: Instrumentation) -> Self {
        self.spec.instrumentation = Some(instr);
        self.spec.duration = Duration::Medium;
        self
    }

    /// Replace the canonical sweep.
    #[must_use]
    pub fn threshold_sweep<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec.threshold_sweep = values.into_iter().map(Into::into).collect();
        self
    }

    /// Opt out of the threshold sweep entirely.
    #[must_use]
    pub fn no_sweep(mut self) -> Self {
        self.spec.threshold_sweep.clear();
        self
    }

    /// Layer an extra override after the acceleration patch.
    #[must_use]
    pub fn override_var(mut self, var: EnvVar, value: impl Into<String>) -> Self {
        self.spec.extra_overrides.push(EnvOverride::new(var, value));
        self
    }

    #[must_use]
    pub fn file_size(mut self, bytes: u64) -> Self {
        self.spec.file_size = bytes;
        self
    }

    /// Validate and freeze the case. Composition defects fail here, before
    /// any request can be issued.
    pub fn build(self) -> Result<CaseSpec> {
        for value in &self.spec.threshold_sweep {
            if value.parse::<u64>().is_err() {
                return Err(HarnessError::InvalidThreshold {
                    value: value.clone(),
                });
            }
        }
        self.spec.base_delta().check_accel_exclusive()?;
        Ok(self.spec)
    }
}
