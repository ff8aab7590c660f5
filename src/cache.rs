//! The on-disk artifact cache: fingerprint-keyed, concurrency-safe.
//!
//! Every compiled problem lives in its own subdirectory of the cache root,
//! named from the descriptor's fingerprint. Builds happen in a hidden
//! temporary directory inside the same root and are published with a single
//! `rename`, so a cache entry either does not exist or is complete. Two
//! processes racing on the same problem both succeed; the loser of the
//! rename discards its build and fetches the winner's.

use crate::descriptor::ProblemDescriptor;
use crate::module::ABI_VERSION;
use crate::toolchain::Toolchain;
use crate::types::{Error, ParamValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Metadata record published alongside the module.
pub const META_FILE: &str = "meta.json";
/// Marker written last during a build; its presence means the entry is
/// complete. (The rename publish already guarantees this for readers of the
/// final directory; the marker additionally guards against a cache root
/// populated by other means.)
pub const OK_MARKER: &str = "ok";

// ─────────────────────────────────────────────────────────────
//  Artifact metadata
// ─────────────────────────────────────────────────────────────

/// Everything the loader needs to know about a published artifact, recorded
/// at build time. Serialized as `meta.json` next to the module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    /// Full fingerprint of the descriptor that produced this artifact.
    pub fingerprint: String,
    pub name: String,
    pub sif_params: BTreeMap<String, ParamValue>,
    pub sif_options: Vec<String>,
    pub efirst: bool,
    pub lfirst: bool,
    pub nvfirst: bool,
    pub drop_fixed_variables: bool,
    /// Identifier of the toolchain that built the artifact.
    pub toolchain: String,
    /// Evaluation ABI the module was built against.
    pub abi: u32,
    /// Publish time, nanoseconds since the Unix epoch.
    pub built_at_ns: u64,
    /// Module file name, relative to the entry directory.
    pub module: String,
}

impl ArtifactMeta {
    fn record(desc: &ProblemDescriptor, toolchain_id: &str, module: &Path) -> Self {
        let built_at_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos() as u64);
        Self {
            fingerprint: desc.fingerprint(),
            name: desc.name().to_owned(),
            sif_params: desc.sif_params().clone(),
            sif_options: desc.sif_options().to_vec(),
            efirst: desc.is_efirst(),
            lfirst: desc.is_lfirst(),
            nvfirst: desc.is_nvfirst(),
            drop_fixed_variables: desc.drops_fixed_variables(),
            toolchain: toolchain_id.to_owned(),
            abi: ABI_VERSION,
            built_at_ns,
            module: module.to_string_lossy().into_owned(),
        }
    }
}

/// A published, complete cache entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub fingerprint: String,
    /// Absolute path of the entry directory.
    pub dir: PathBuf,
    pub meta: ArtifactMeta,
}

// ─────────────────────────────────────────────────────────────
//  Cache manager
// ─────────────────────────────────────────────────────────────

/// Owner of one cache root directory.
///
/// The root is explicit: independent managers with different roots never
/// interact, and tests get hermetic caches from a temporary directory.
#[derive(Debug, Clone)]
pub struct CacheManager {
    root: PathBuf,
}

impl CacheManager {
    /// Open (creating if needed) a cache rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, Error> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// The conventional per-user cache: `$SIFTEST_CACHE` if set, otherwise
    /// the platform cache directory.
    pub fn from_env() -> Result<Self, Error> {
        let root = match std::env::var_os("SIFTEST_CACHE") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::cache_dir()
                .ok_or_else(|| Error::Load("no cache directory for this platform".into()))?
                .join("siftest"),
        };
        Self::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_dir(&self, desc: &ProblemDescriptor) -> PathBuf {
        self.root.join(desc.cache_dir_name())
    }

    /// Does a complete, readable entry exist for this descriptor?
    pub fn is_cached(&self, desc: &ProblemDescriptor) -> bool {
        read_entry(&self.entry_dir(desc)).is_some()
    }

    /// The compile-or-fetch operation. Returns the published entry,
    /// building it first if absent. Idempotent: a second call with the same
    /// descriptor does no toolchain work.
    pub fn compile_or_fetch(
        &self,
        desc: &ProblemDescriptor,
        toolchain: &dyn Toolchain,
    ) -> Result<CacheEntry, Error> {
        let dir = self.entry_dir(desc);
        if let Some(entry) = read_entry(&dir) {
            debug!(problem = %desc, "cache hit");
            return Ok(entry);
        }

        info!(problem = %desc, "cache miss, building");
        let tmp = tempfile::Builder::new()
            .prefix(".build-")
            .tempdir_in(&self.root)?;
        let built = toolchain.build(desc, tmp.path())?;

        let meta = ArtifactMeta::record(desc, toolchain.id(), &built.module);
        let json = serde_json::to_vec_pretty(&meta)?;
        fs::write(tmp.path().join(META_FILE), json)?;
        // Marker last: everything else in the directory is already in place.
        fs::write(tmp.path().join(OK_MARKER), b"")?;

        // Atomic publish. Keep the TempDir's cleanup disarmed only once the
        // rename path owns the directory.
        let staged = tmp.keep();
        match fs::rename(&staged, &dir) {
            Ok(()) => {}
            Err(rename_err) => {
                // Another process may have published first; their entry is
                // as good as ours.
                if let Some(entry) = read_entry(&dir) {
                    warn!(problem = %desc, "lost publish race, using existing entry");
                    let _ = fs::remove_dir_all(&staged);
                    return Ok(entry);
                }
                let _ = fs::remove_dir_all(&staged);
                return Err(rename_err.into());
            }
        }

        read_entry(&dir).ok_or_else(|| {
            Error::Load(format!("entry for {desc} vanished immediately after publish"))
        })
    }

    /// Remove this descriptor's entry. Idempotent: removing a missing entry
    /// succeeds.
    pub fn clear(&self, desc: &ProblemDescriptor) -> Result<(), Error> {
        let dir = self.entry_dir(desc);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                info!(problem = %desc, "cleared cache entry");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove every entry under the root, leaving the root itself.
    pub fn clear_all(&self) -> Result<(), Error> {
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(entry.path())?;
            }
        }
        Ok(())
    }

    /// Enumerate complete entries, sorted by directory name. Pure read:
    /// incomplete or foreign directories are skipped, never repaired.
    pub fn entries(&self) -> Result<Vec<CacheEntry>, Error> {
        let mut found = Vec::new();
        for item in fs::read_dir(&self.root)? {
            let item = item?;
            if !item.file_type()?.is_dir() {
                continue;
            }
            // In-flight build directories are dot-prefixed.
            if item.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            if let Some(entry) = read_entry(&item.path()) {
                found.push(entry);
            }
        }
        found.sort_by(|a, b| a.dir.cmp(&b.dir));
        Ok(found)
    }
}

/// Read a published entry, or `None` when the directory is absent or
/// incomplete. Completeness means: marker present, metadata parses, and the
/// module file is there.
fn read_entry(dir: &Path) -> Option<CacheEntry> {
    if !dir.join(OK_MARKER).is_file() {
        return None;
    }
    let raw = fs::read(dir.join(META_FILE)).ok()?;
    let meta: ArtifactMeta = serde_json::from_slice(&raw).ok()?;
    if !dir.join(&meta.module).is_file() {
        return None;
    }
    Some(CacheEntry {
        fingerprint: meta.fingerprint.clone(),
        dir: dir.to_path_buf(),
        meta,
    })
}
