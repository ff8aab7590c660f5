//! Problem descriptor resolution: canonical problem identity + fingerprint.
//!
//! A [`ProblemDescriptor`] names a SIF problem together with everything the
//! decoder needs to reproduce the exact compiled artifact: `-param` values,
//! extra decoder options, and the ordering/elimination flags. The descriptor
//! is immutable once built; its [`fingerprint`](ProblemDescriptor::fingerprint)
//! is the cache key.

use crate::types::ParamValue;
use std::collections::BTreeMap;
use std::fmt;

// ─────────────────────────────────────────────────────────────
//  Descriptor
// ─────────────────────────────────────────────────────────────

/// Canonical description of a problem build.
///
/// Construct with [`ProblemDescriptor::new`] and the chainable setters, then
/// treat as read-only. Parameters live in a `BTreeMap`, so two descriptors
/// that differ only in parameter insertion order are identical by
/// construction and hash identically.
#[derive(Debug, Clone, PartialEq)]
pub struct ProblemDescriptor {
    name: String,
    sif_params: BTreeMap<String, ParamValue>,
    sif_options: Vec<String>,
    efirst: bool,
    lfirst: bool,
    nvfirst: bool,
    quiet: bool,
    drop_fixed_variables: bool,
}

impl ProblemDescriptor {
    /// Start a descriptor for the named SIF problem with default options:
    /// no parameters, declaration ordering, fixed variables dropped, quiet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sif_params: BTreeMap::new(),
            sif_options: Vec::new(),
            efirst: false,
            lfirst: false,
            nvfirst: false,
            quiet: true,
            drop_fixed_variables: true,
        }
    }

    /// Add a `-param NAME=VALUE` decoder parameter.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.sif_params.insert(name.into(), value.into());
        self
    }

    /// Append an extra decoder command-line option (order-preserving).
    pub fn option(mut self, opt: impl Into<String>) -> Self {
        self.sif_options.push(opt.into());
        self
    }

    /// Order equality constraints before inequality constraints.
    pub fn efirst(mut self, yes: bool) -> Self {
        self.efirst = yes;
        self
    }

    /// Order linear constraints before nonlinear constraints.
    pub fn lfirst(mut self, yes: bool) -> Self {
        self.lfirst = yes;
        self
    }

    /// Order nonlinear variables before linear variables.
    pub fn nvfirst(mut self, yes: bool) -> Self {
        self.nvfirst = yes;
        self
    }

    /// Demote toolchain output to debug-level logging.
    pub fn quiet(mut self, yes: bool) -> Self {
        self.quiet = yes;
        self
    }

    /// Hide variables whose lower bound equals their upper bound from the
    /// evaluation interface.
    pub fn drop_fixed_variables(mut self, yes: bool) -> Self {
        self.drop_fixed_variables = yes;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sif_params(&self) -> &BTreeMap<String, ParamValue> {
        &self.sif_params
    }

    pub fn sif_options(&self) -> &[String] {
        &self.sif_options
    }

    pub fn is_efirst(&self) -> bool {
        self.efirst
    }

    pub fn is_lfirst(&self) -> bool {
        self.lfirst
    }

    pub fn is_nvfirst(&self) -> bool {
        self.nvfirst
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    pub fn drops_fixed_variables(&self) -> bool {
        self.drop_fixed_variables
    }

    // ── Fingerprint ────────────────────────────────────────

    /// Stable hash of the canonicalized descriptor, used as the cache key.
    ///
    /// Covers every field that can change the artifact or the handle built
    /// from it. `quiet` is pure verbosity and is excluded, so noisy and
    /// silent builds of the same problem share one cache entry.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.name.as_bytes());
        hasher.update(b"\0");
        for (key, value) in &self.sif_params {
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.to_string().as_bytes());
            hasher.update(b"\0");
        }
        hasher.update(b"\0");
        for opt in &self.sif_options {
            hasher.update(opt.as_bytes());
            hasher.update(b"\0");
        }
        let flags = [
            self.efirst,
            self.lfirst,
            self.nvfirst,
            self.drop_fixed_variables,
        ]
        .map(|b| b as u8);
        hasher.update(&flags);
        hasher.finalize().to_hex().to_string()
    }

    /// Cache subdirectory name: problem name plus a fingerprint prefix,
    /// human-readable and collision-free within a cache root.
    pub fn cache_dir_name(&self) -> String {
        format!("{}-{}", self.name, &self.fingerprint()[..12])
    }

    /// `NAME=VALUE` space-separated parameter summary, empty for default
    /// parameters. Used in logs and cache listings.
    pub fn params_summary(&self) -> String {
        self.sif_params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for ProblemDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sif_params.is_empty() {
            write!(f, "{} (default params)", self.name)
        } else {
            write!(f, "{} ({})", self.name, self.params_summary())
        }
    }
}
