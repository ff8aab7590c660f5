//! Loading a published cache entry into a live problem handle.
//!
//! The loader never builds: a stale or incomplete entry is an error, and
//! the decision to rebuild belongs to the cache manager's caller.

use crate::cache::{CacheEntry, ArtifactMeta, META_FILE, OK_MARKER};
use crate::module::{Binder, ABI_VERSION};
use crate::ordering::{OrderingFlags, OrderingMap};
use crate::problem::ProblemHandle;
use crate::types::Error;
use std::fs;
use std::time::Instant;
use tracing::debug;

/// Bind a published entry and construct its evaluation handle.
///
/// Verifies the entry on disk still matches what the cache manager handed
/// out (it may have been cleared or rebuilt since), checks ABI
/// compatibility, binds the module, and computes the orderings. The elapsed
/// time lands in the handle's report as setup time.
pub fn load_handle(entry: &CacheEntry, binder: &dyn Binder) -> Result<ProblemHandle, Error> {
    let start = Instant::now();

    if !entry.dir.join(OK_MARKER).is_file() {
        return Err(Error::Load(format!(
            "cache entry {} is incomplete",
            entry.dir.display()
        )));
    }
    let raw = fs::read(entry.dir.join(META_FILE)).map_err(|e| {
        Error::Load(format!(
            "cannot read metadata in {}: {e}",
            entry.dir.display()
        ))
    })?;
    let on_disk: ArtifactMeta = serde_json::from_slice(&raw)?;
    if on_disk != entry.meta {
        return Err(Error::Load(format!(
            "cache entry {} changed since it was fetched",
            entry.dir.display()
        )));
    }
    if on_disk.abi != ABI_VERSION {
        return Err(Error::Load(format!(
            "artifact ABI {} does not match this crate's ABI {ABI_VERSION}",
            on_disk.abi
        )));
    }

    let module = binder.bind(entry)?;
    let info = module.info().clone();
    debug!(problem = %on_disk.name, n = info.n, m = info.m, "module bound");

    let flags = OrderingFlags {
        efirst: on_disk.efirst,
        lfirst: on_disk.lfirst,
        nvfirst: on_disk.nvfirst,
        drop_fixed: on_disk.drop_fixed_variables,
    };
    let ordering = OrderingMap::new(&flags, &info)?;

    ProblemHandle::new(module, info, ordering, on_disk, start.elapsed())
}
