//! Environment composition for subject-binary invocations.
//!
//! The subject binary selects its copy path through a handful of recognized
//! environment variables. This module models those variables as a closed
//! enum and the per-case configuration as an ordered delta (clears followed
//! by overrides) that is resolved against an ambient environment as a pure
//! function. The ambient map is never mutated; every case and every request
//! operates on its own copy-on-extend delta.

use std::collections::BTreeMap;

use movnt_error::{HarnessError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Value that turns a boolean flag variable on in the subject binary.
pub const ENABLE: &str = "1";

/// Environment variables recognized by the subject binary and its
/// instrumentation wrapper. Spelling must match the binary's contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvVar {
    /// Enable the AVX acceleration path.
    Avx,
    /// Enable the AVX512F acceleration path.
    Avx512f,
    /// Disable non-temporal stores entirely.
    NoMovnt,
    /// Disable the generic fallback copy.
    NoGenericMemcpy,
    /// Byte count above which non-temporal stores activate.
    MovntThreshold,
    /// Options handed to the instrumentation tool.
    ValgrindOpts,
}

impl EnvVar {
    /// All recognized variables in canonical order.
    pub const ALL: &[Self] = &[
        Self::Avx,
        Self::Avx512f,
        Self::NoMovnt,
        Self::NoGenericMemcpy,
        Self::MovntThreshold,
        Self::ValgrindOpts,
    ];

    /// Process-environment spelling of this variable.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Avx => "PMEM_AVX",
            Self::Avx512f => "PMEM_AVX512F",
            Self::NoMovnt => "PMEM_NO_MOVNT",
            Self::NoGenericMemcpy => "PMEM_NO_GENERIC_MEMCPY",
            Self::MovntThreshold => "PMEM_MOVNT_THRESHOLD",
            Self::ValgrindOpts => "VALGRIND_OPTS",
        }
    }

    /// Parse a process-environment spelling back into the enum.
    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|var| var.name() == name)
            .ok_or_else(|| HarnessError::UnknownVariable {
                name: name.to_string(),
            })
    }

    /// Whether this variable enables one specific acceleration path.
    /// At most one such variable may be enabled per request.
    #[must_use]
    pub const fn is_accel_enable(self) -> bool {
        matches!(self, Self::Avx | Self::Avx512f)
    }
}

impl std::fmt::Display for EnvVar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A single named override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvOverride {
    pub var: EnvVar,
    pub value: String,
}

impl EnvOverride {
    #[must_use]
    pub fn new(var: EnvVar, value: impl Into<String>) -> Self {
        Self {
            var,
            value: value.into(),
        }
    }

    /// Flag override set to the enabling value.
    #[must_use]
    pub fn enable(var: EnvVar) -> Self {
        Self::new(var, ENABLE)
    }
}

/// Ordered environment delta applied on top of an ambient environment.
///
/// Clears run before overrides; overrides apply in insertion order, so a
/// later override for the same variable shadows an earlier one. Extension
/// copies the parent delta, leaving it untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvDelta {
    cleared: Vec<EnvVar>,
    overrides: Vec<EnvOverride>,
}

impl EnvDelta {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `var` must be absent from the resolved environment
    /// unless a later override re-introduces it.
    pub fn clear(&mut self, var: EnvVar) {
        if !self.cleared.contains(&var) {
            self.cleared.push(var);
        }
    }

    /// Append an override. Later overrides shadow earlier ones.
    pub fn set(&mut self, var: EnvVar, value: impl Into<String>) {
        self.overrides.push(EnvOverride::new(var, value));
    }

    /// Copy-on-extend: a child delta with one more override, leaving the
    /// parent untouched.
    #[must_use]
    pub fn extended(&self, var: EnvVar, value: impl Into<String>) -> Self {
        let mut child = self.clone();
        child.set(var, value);
        child
    }

    /// Variables cleared by this delta.
    #[must_use]
    pub fn cleared(&self) -> &[EnvVar] {
        &self.cleared
    }

    /// Overrides in application order.
    #[must_use]
    pub fn overrides(&self) -> &[EnvOverride] {
        &self.overrides
    }

    /// Effective value this delta assigns to `var`, if any (last write wins).
    #[must_use]
    pub fn effective(&self, var: EnvVar) -> Option<&str> {
        self.overrides
            .iter()
            .rev()
            .find(|o| o.var == var)
            .map(|o| o.value.as_str())
    }

    /// Resolve the final environment: ambient, minus cleared variables,
    /// plus overrides in order. Pure; the ambient map is not modified.
    #[must_use]
    pub fn resolve(&self, ambient: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let mut resolved = ambient.clone();
        for var in &self.cleared {
            resolved.remove(var.name());
        }
        for o in &self.overrides {
            resolved.insert(o.var.name().to_string(), o.value.clone());
        }
        debug!(
            cleared = self.cleared.len(),
            overrides = self.overrides.len(),
            "resolved environment delta"
        );
        resolved
    }

    /// Acceleration-path enable flags effectively set to the enabling value.
    #[must_use]
    pub fn enabled_accel_paths(&self) -> Vec<EnvVar> {
        EnvVar::ALL
            .iter()
            .copied()
            .filter(|var| var.is_accel_enable() && self.effective(*var) == Some(ENABLE))
            .collect()
    }

    /// Fail if two different acceleration paths are enabled at once.
    pub fn check_accel_exclusive(&self) -> Result<()> {
        let enabled = self.enabled_accel_paths();
        if enabled.len() > 1 {
            return Err(HarnessError::ConflictingAcceleration {
                first: enabled[0].name().to_string(),
                second: enabled[1].name().to_string(),
            });
        }
        Ok(())
    }
}
