//! The canonical test matrix: the closure of all case definitions.
//!
//! Eight cases cover the cross-product of acceleration selection and
//! instrumentation wrapping: the default path, each x86 feature override,
//! the atomic disable pair, and the pmemcheck-wrapped version of each.

use std::collections::BTreeSet;
use std::path::Path;

use movnt_error::{HarnessError, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::case::{AccelPatch, CaseSpec, Instrumentation};

/// Serialization schema version for [`TestMatrix`].
pub const MATRIX_SCHEMA_VERSION: u32 = 1;

/// The full set of case definitions, expanded lazily one case at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestMatrix {
    pub schema_version: u32,
    pub cases: Vec<CaseSpec>,
}

impl TestMatrix {
    /// Build the canonical matrix. Fails on composition defects, never at
    /// execution time.
    pub fn canonical() -> Result<Self> {
        let cases = vec![
            CaseSpec::builder("base").build()?,
            CaseSpec::builder("avx512f")
                .accel(AccelPatch::EnableAvx512f)
                .build()?,
            CaseSpec::builder("avx").accel(AccelPatch::EnableAvx).build()?,
            // The disable-pair case exercises the scalar paths only once;
            // the threshold is irrelevant when non-temporal stores are off.
            CaseSpec::builder("no-accel")
                .accel(AccelPatch::DisableAll)
                .no_sweep()
                .build()?,
            CaseSpec::builder("pmemcheck-base")
                .instrumentation(Instrumentation::Pmemcheck)
                .build()?,
            CaseSpec::builder("pmemcheck-avx512f")
                .accel(AccelPatch::EnableAvx512f)
                .instrumentation(Instrumentation::Pmemcheck)
                .build()?,
            CaseSpec::builder("pmemcheck-avx")
                .accel(AccelPatch::EnableAvx)
                .instrumentation(Instrumentation::Pmemcheck)
                .build()?,
            CaseSpec::builder("pmemcheck-no-accel")
                .accel(AccelPatch::DisableAll)
                .instrumentation(Instrumentation::Pmemcheck)
                .build()?,
        ];
        let matrix = Self {
            schema_version: MATRIX_SCHEMA_VERSION,
            cases,
        };
        matrix.validate()?;
        info!(cases = matrix.cases.len(), "canonical matrix built");
        Ok(matrix)
    }

    /// Structural validation across cases. Per-case validation already ran
    /// in each builder; this catches matrix-level defects.
    pub fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for case in &self.cases {
            if !seen.insert(case.id.as_str()) {
                return Err(HarnessError::DuplicateCaseId {
                    id: case.id.clone(),
                });
            }
            case.base_delta().check_accel_exclusive()?;
        }
        Ok(())
    }

    /// Look up a case by id.
    #[must_use]
    pub fn case(&self, id: &str) -> Option<&CaseSpec> {
        self.cases.iter().find(|c| c.id == id)
    }

    /// Total requests the matrix expands into, before gating.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.cases.iter().map(CaseSpec::request_count).sum()
    }

    /// Serialize the matrix in a deterministic pretty JSON format.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Write the matrix JSON to a file path.
pub fn write_matrix_json(path: &Path, matrix: &TestMatrix) -> Result<()> {
    let payload = matrix
        .to_json()
        .map_err(|err| HarnessError::internal(format!("matrix serialization failed: {err}")))?;
    std::fs::write(path, payload)?;
    Ok(())
}
