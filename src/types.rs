use serde::{Deserialize, Serialize};
use std::fmt;

// ─────────────────────────────────────────────────────────────
//  Error type
// ─────────────────────────────────────────────────────────────

/// Unified error type for all fallible operations in the crate.
///
/// Every function in the public API returns `Result<T, Error>` instead of
/// panicking. The variants follow the recoverability boundaries of the
/// pipeline: `Parameter` and `Build` are toolchain-time, `Load` is
/// bind-time, `Dimension` and `UseAfterClose` are caller errors raised
/// before any native invocation, and `Structural` signals corrupted
/// artifact metadata (fatal, not retried).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The decoder rejected a parameter value. Carries the toolchain's
    /// diagnostic text verbatim.
    #[error("invalid SIF parameter: {diagnostic}")]
    Parameter { diagnostic: String },

    /// The decoder/compiler toolchain failed. `output` holds the captured
    /// toolchain output for inspection.
    #[error("toolchain build failed: {reason}")]
    Build { reason: String, output: String },

    /// The cache entry's artifact is missing, stale, or incompatible with
    /// this process. Rebuilding is the cache manager's decision, never the
    /// loader's.
    #[error("cannot load artifact: {0}")]
    Load(String),

    /// Caller input has the wrong length or an out-of-range index.
    /// Raised before the bound routine runs; call counters are untouched.
    #[error("{arg} has wrong dimension: got {got}, expected {expected}")]
    Dimension {
        arg: &'static str,
        expected: usize,
        got: usize,
    },

    /// An operation was invoked on a closed problem handle.
    #[error("operation on closed problem handle")]
    UseAfterClose,

    /// Internal consistency failure: the artifact's metadata contradicts
    /// itself. Signals cache corruption upstream.
    #[error("inconsistent problem metadata: {0}")]
    Structural(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata record error: {0}")]
    Meta(#[from] serde_json::Error),
}

// ─────────────────────────────────────────────────────────────
//  SIF parameter values
// ─────────────────────────────────────────────────────────────

/// A value passed to the decoder with `-param NAME=VALUE`.
///
/// SIF parameters are either integers (`IE`) or reals (`RE`); the decoder
/// distinguishes the two, so the descriptor keeps the distinction rather
/// than coercing everything to `f64`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Real(f64),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Int(i) => write!(f, "{i}"),
            // Integral reals print without a trailing ".0" so that the
            // decoder command line and cache directory names stay short.
            Self::Real(r) if r == r.trunc() && r.abs() < 1e15 => {
                write!(f, "{}", r as i64)
            }
            Self::Real(r) => write!(f, "{r}"),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

// ─────────────────────────────────────────────────────────────
//  Call statistics
// ─────────────────────────────────────────────────────────────

/// Cumulative usage statistics for one problem handle.
///
/// Counters are monotonically non-decreasing and reset only by loading a
/// fresh handle. A counter is bumped only after the bound routine actually
/// ran; precondition failures (`Error::Dimension`, `Error::UseAfterClose`)
/// leave the report untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Report {
    /// Objective evaluations.
    pub f: u64,
    /// Objective gradient evaluations.
    pub g: u64,
    /// Objective/Lagrangian Hessian evaluations.
    pub h: u64,
    /// Hessian-vector products.
    pub hprod: u64,
    /// Constraint evaluations.
    pub c: u64,
    /// Constraint gradient/Jacobian evaluations (including Jacobian
    /// products).
    pub cg: u64,
    /// Constraint Hessian evaluations.
    pub ch: u64,
    /// Wall-clock nanoseconds spent loading and binding the handle.
    pub setup_ns: u64,
    /// Accumulated wall-clock nanoseconds spent inside bound routines.
    pub run_ns: u64,
}
