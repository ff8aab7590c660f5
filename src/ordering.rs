//! Variable/constraint orderings and fixed-variable elimination.
//!
//! A pure function of the decode flags and the module's per-index type
//! vectors. The permutations are stable partitions: within any partition,
//! relative order matches declaration order. Fixed-variable elimination
//! produces a free-index subsequence of the variable order together with
//! the inverse map needed to reconstruct full-length vectors.

use crate::module::ModuleInfo;
use crate::types::Error;

/// Two bounds closer than this make a variable fixed.
pub const FIXED_VAR_TOL: f64 = 1e-15;

// ─────────────────────────────────────────────────────────────
//  Flags
// ─────────────────────────────────────────────────────────────

/// The decode options that shape the presented index spaces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderingFlags {
    /// Equality constraints before inequality constraints.
    pub efirst: bool,
    /// Linear constraints before nonlinear constraints.
    pub lfirst: bool,
    /// Nonlinear variables before linear variables.
    pub nvfirst: bool,
    /// Hide fixed variables from the presented variable space.
    pub drop_fixed: bool,
}

// ─────────────────────────────────────────────────────────────
//  Ordering map
// ─────────────────────────────────────────────────────────────

/// Deterministic permutations plus elimination maps for one loaded handle.
/// Computed once, immutable thereafter.
///
/// Index conventions: "declaration" is the module's native order,
/// "presented" is the permuted order seen by callers. `var_order[k]` is the
/// declaration index of presented position `k`; `free_to_full[r]` is the
/// presented-full position of reduced index `r`.
///
/// When `efirst` and `lfirst` are combined, `efirst` partitions first and
/// `lfirst` sub-partitions stably within the equality and the inequality
/// group. The interaction of the two flags is not pinned down by the
/// toolchain documentation; this composition is the one we commit to.
#[derive(Debug, Clone)]
pub struct OrderingMap {
    /// Presented position -> declaration index (variables).
    pub var_order: Vec<usize>,
    /// Declaration index -> presented position (variables).
    pub inv_var: Vec<usize>,
    /// Presented position -> declaration index (constraints).
    pub con_order: Vec<usize>,
    /// Declaration index -> presented position (constraints).
    pub inv_con: Vec<usize>,
    /// Per presented-full position: is the variable fixed? All false when
    /// fixed variables are not dropped, matching the presented space where
    /// every variable looks free.
    pub fixed: Vec<bool>,
    /// Reduced index -> presented-full position.
    pub free_to_full: Vec<usize>,
    /// Presented-full position -> reduced index (`None` for fixed).
    pub full_to_free: Vec<Option<usize>>,
}

impl OrderingMap {
    /// Compute the orderings for a loaded module. Side-effect-free and
    /// deterministic; fails only when the metadata's mask lengths disagree
    /// with the declared dimensions.
    pub fn new(flags: &OrderingFlags, info: &ModuleInfo) -> Result<Self, Error> {
        let (n, m) = (info.n, info.m);
        check_len("bl", info.bl.len(), n)?;
        check_len("bu", info.bu.len(), n)?;
        check_len("nonlinear_var", info.nonlinear_var.len(), n)?;
        check_len("equatn", info.equatn.len(), m)?;
        check_len("linear", info.linear.len(), m)?;

        // Variables: one stable key; nonlinear first when requested.
        let var_order = stable_order(n, |i| {
            if flags.nvfirst && !info.nonlinear_var[i] {
                1
            } else {
                0
            }
        });
        let inv_var = invert(&var_order);

        // Constraints: efirst partitions first, lfirst sub-partitions.
        let con_order = stable_order(m, |i| {
            let primary = if flags.efirst && !info.equatn[i] { 1 } else { 0 };
            let secondary = if flags.lfirst && !info.linear[i] { 1 } else { 0 };
            primary * 2 + secondary
        });
        let inv_con = invert(&con_order);

        // Fixed mask in presented order; elimination only when requested.
        let (fixed, free_to_full, full_to_free) = if flags.drop_fixed {
            let fixed: Vec<bool> = var_order
                .iter()
                .map(|&d| info.bu[d] - info.bl[d] <= FIXED_VAR_TOL)
                .collect();
            let free_to_full: Vec<usize> =
                (0..n).filter(|&k| !fixed[k]).collect();
            let mut full_to_free = vec![None; n];
            for (r, &k) in free_to_full.iter().enumerate() {
                full_to_free[k] = Some(r);
            }
            (fixed, free_to_full, full_to_free)
        } else {
            (
                vec![false; n],
                (0..n).collect(),
                (0..n).map(Some).collect(),
            )
        };

        Ok(Self {
            var_order,
            inv_var,
            con_order,
            inv_con,
            fixed,
            free_to_full,
            full_to_free,
        })
    }

    /// Number of variables in the reduced (free) space.
    pub fn n_free(&self) -> usize {
        self.free_to_full.len()
    }

    /// Number of variables eliminated as fixed.
    pub fn n_fixed(&self) -> usize {
        self.var_order.len() - self.free_to_full.len()
    }
}

// ─────────────────────────────────────────────────────────────
//  Helpers
// ─────────────────────────────────────────────────────────────

/// Stable partition of `0..len` by ascending key: a stable sort keeps
/// declaration order within every key class.
fn stable_order(len: usize, key: impl Fn(usize) -> u8) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    order.sort_by_key(|&i| key(i));
    order
}

fn invert(order: &[usize]) -> Vec<usize> {
    let mut inv = vec![0; order.len()];
    for (pos, &decl) in order.iter().enumerate() {
        inv[decl] = pos;
    }
    inv
}

fn check_len(what: &str, got: usize, expected: usize) -> Result<(), Error> {
    if got == expected {
        Ok(())
    } else {
        Err(Error::Structural(format!(
            "metadata field {what} has length {got}, dimensions say {expected}"
        )))
    }
}
