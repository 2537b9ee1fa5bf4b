//! Backing-file management: one sparse file per case.

use std::fs::File;
use std::path::{Path, PathBuf};

use movnt_error::Result;
use tracing::debug;

/// Name of the backing file inside a case's scratch directory.
pub const BACKING_FILE_NAME: &str = "testfile";

/// Create a sparse (hole-punched) file of `size` bytes under `dir`.
///
/// The file is created fresh; a leftover from an earlier run is truncated.
/// Cleanup is owned by whoever owns `dir`.
pub fn create_holey_file(dir: &Path, size: u64) -> Result<PathBuf> {
    let path = dir.join(BACKING_FILE_NAME);
    let file = File::create(&path)?;
    file.set_len(size)?;
    debug!(path = %path.display(), size, "created holey backing file");
    Ok(path)
}
