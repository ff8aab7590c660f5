//! The problem handle: the uniform evaluation interface.
//!
//! A [`ProblemHandle`] owns a bound evaluation module plus the ordering and
//! elimination maps, and presents the *presented* index spaces to callers:
//! constraints permuted by the decode flags, fixed variables hidden when
//! elimination is on. Every evaluation takes `&mut self`, so concurrent
//! calls into one handle are ruled out at compile time; separate handles
//! are independent.
//!
//! All caller input is validated before the native routine runs, and call
//! counters are bumped only after the routine returned successfully, so a
//! precondition failure is invisible in the report.

use crate::cache::ArtifactMeta;
use crate::module::{EvalModule, ModuleInfo, VarType};
use crate::ordering::OrderingMap;
use crate::types::{Error, ParamValue, Report};
use ndarray::Array2;
use sprs::TriMat;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;

// ─────────────────────────────────────────────────────────────
//  Handle
// ─────────────────────────────────────────────────────────────

/// A live, evaluable problem.
///
/// Vectors and matrices returned by the evaluation methods are in the
/// presented spaces: variables of length [`n`](Self::n) (free variables
/// only when elimination is on), constraints of length [`m`](Self::m) in
/// the permuted order. [`free_to_all`](Self::free_to_all) and
/// [`all_to_free`](Self::all_to_free) convert between the reduced and the
/// unreduced variable space.
pub struct ProblemHandle {
    module: Box<dyn EvalModule>,
    ordering: OrderingMap,
    name: String,
    sif_params: BTreeMap<String, ParamValue>,
    sif_options: Vec<String>,
    /// Declared variable count, fixed variables included.
    n_full: usize,
    /// Presented variable count.
    n: usize,
    m: usize,
    x0: Vec<f64>,
    bl: Vec<f64>,
    bu: Vec<f64>,
    v0: Vec<f64>,
    cl: Vec<f64>,
    cu: Vec<f64>,
    equatn: Vec<bool>,
    linear: Vec<bool>,
    vartype: Vec<VarType>,
    /// Lower bounds in presented-full order; fixed slots are padded from
    /// here when a reduced point is expanded.
    bl_full: Vec<f64>,
    nnzh: usize,
    nnzj: usize,
    counters: Report,
    closed: bool,
}

impl ProblemHandle {
    pub(crate) fn new(
        module: Box<dyn EvalModule>,
        info: ModuleInfo,
        ordering: OrderingMap,
        meta: ArtifactMeta,
        setup: Duration,
    ) -> Result<Self, Error> {
        let (n_full, m) = (info.n, info.m);
        check_len("x0", info.x0.len(), n_full)?;
        check_len("vartype", info.vartype.len(), n_full)?;
        check_len("v0", info.v0.len(), m)?;
        check_len("cl", info.cl.len(), m)?;
        check_len("cu", info.cu.len(), m)?;

        // Presented-space views of the static metadata, computed once.
        let reduce_var = |decl: &[f64]| -> Vec<f64> {
            ordering
                .free_to_full
                .iter()
                .map(|&k| decl[ordering.var_order[k]])
                .collect()
        };
        let permute_con = |decl: &[f64]| -> Vec<f64> {
            ordering.con_order.iter().map(|&d| decl[d]).collect()
        };

        let x0 = reduce_var(&info.x0);
        let bl = reduce_var(&info.bl);
        let bu = reduce_var(&info.bu);
        let vartype = ordering
            .free_to_full
            .iter()
            .map(|&k| info.vartype[ordering.var_order[k]])
            .collect();
        let bl_full = ordering
            .var_order
            .iter()
            .map(|&d| info.bl[d])
            .collect();
        let v0 = permute_con(&info.v0);
        let cl = permute_con(&info.cl);
        let cu = permute_con(&info.cu);
        let equatn = ordering.con_order.iter().map(|&d| info.equatn[d]).collect();
        let linear = ordering.con_order.iter().map(|&d| info.linear[d]).collect();

        let counters = Report {
            setup_ns: setup.as_nanos() as u64,
            ..Report::default()
        };
        debug!(
            problem = %meta.name,
            n_full,
            n_free = ordering.n_free(),
            m,
            "handle ready"
        );

        Ok(Self {
            module,
            name: meta.name,
            sif_params: meta.sif_params,
            sif_options: meta.sif_options,
            n_full,
            n: ordering.n_free(),
            m,
            x0,
            bl,
            bu,
            v0,
            cl,
            cu,
            equatn,
            linear,
            vartype,
            bl_full,
            nnzh: info.nnzh,
            nnzj: info.nnzj,
            ordering,
            counters,
            closed: false,
        })
    }

    // ── Accessors ──────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Presented variable count (free variables when elimination is on).
    pub fn n(&self) -> usize {
        self.n
    }

    pub fn m(&self) -> usize {
        self.m
    }

    /// Declared variable count, fixed variables included.
    pub fn n_full(&self) -> usize {
        self.n_full
    }

    pub fn n_free(&self) -> usize {
        self.ordering.n_free()
    }

    pub fn n_fixed(&self) -> usize {
        self.ordering.n_fixed()
    }

    pub fn sif_params(&self) -> &BTreeMap<String, ParamValue> {
        &self.sif_params
    }

    pub fn sif_options(&self) -> &[String] {
        &self.sif_options
    }

    /// Initial point, presented order.
    pub fn x0(&self) -> &[f64] {
        &self.x0
    }

    pub fn bl(&self) -> &[f64] {
        &self.bl
    }

    pub fn bu(&self) -> &[f64] {
        &self.bu
    }

    /// Initial multipliers, presented order.
    pub fn v0(&self) -> &[f64] {
        &self.v0
    }

    pub fn cl(&self) -> &[f64] {
        &self.cl
    }

    pub fn cu(&self) -> &[f64] {
        &self.cu
    }

    pub fn is_eq_cons(&self) -> &[bool] {
        &self.equatn
    }

    pub fn is_linear_cons(&self) -> &[bool] {
        &self.linear
    }

    pub fn vartype(&self) -> &[VarType] {
        &self.vartype
    }

    /// Declared upper bound on Hessian upper-triangle nonzeros (full
    /// variable space).
    pub fn nnzh(&self) -> usize {
        self.nnzh
    }

    /// Declared upper bound on Jacobian nonzeros (full variable space).
    pub fn nnzj(&self) -> usize {
        self.nnzj
    }

    /// Usage statistics so far.
    pub fn report(&self) -> Report {
        self.counters
    }

    /// Release the handle. Idempotent; any later evaluation fails with
    /// [`Error::UseAfterClose`].
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    // ── Space conversions ──────────────────────────────────

    /// Expand a reduced vector to the unreduced presented space. Fixed
    /// slots take their bound value, or zero with `use_zeros` (the right
    /// padding for direction vectors).
    pub fn free_to_all(&self, x: &[f64], use_zeros: bool) -> Result<Vec<f64>, Error> {
        check_dim("x", x.len(), self.n)?;
        let mut full: Vec<f64> = if use_zeros {
            vec![0.0; self.n_full]
        } else {
            self.bl_full.clone()
        };
        for (r, &k) in self.ordering.free_to_full.iter().enumerate() {
            full[k] = x[r];
        }
        Ok(full)
    }

    /// Restrict an unreduced presented vector to the reduced space.
    pub fn all_to_free(&self, x: &[f64]) -> Result<Vec<f64>, Error> {
        check_dim("x", x.len(), self.n_full)?;
        Ok(self
            .ordering
            .free_to_full
            .iter()
            .map(|&k| x[k])
            .collect())
    }

    // ── Dense evaluations ──────────────────────────────────

    /// Objective and constraint values.
    pub fn objcons(&mut self, x: &[f64]) -> Result<(f64, Vec<f64>), Error> {
        self.pre(x)?;
        let xd = self.to_decl_point(x);
        let (f, c) = self.timed(|m| m.objcons(&xd))?;
        self.counters.f += 1;
        if self.m > 0 {
            self.counters.c += 1;
        }
        Ok((f, self.from_decl_con_vec(&c)))
    }

    /// Objective value, optionally with its gradient.
    pub fn obj(&mut self, x: &[f64], want_gradient: bool) -> Result<(f64, Option<Vec<f64>>), Error> {
        self.pre(x)?;
        let xd = self.to_decl_point(x);
        let (f, g) = self.timed(|m| m.obj(&xd, want_gradient))?;
        self.counters.f += 1;
        let g = match g {
            Some(gd) => {
                self.counters.g += 1;
                Some(self.from_decl_var_vec(&gd))
            }
            None => None,
        };
        Ok((f, g))
    }

    /// Constraint values, optionally with the dense Jacobian.
    pub fn cons(
        &mut self,
        x: &[f64],
        want_jacobian: bool,
    ) -> Result<(Vec<f64>, Option<Array2<f64>>), Error> {
        self.pre(x)?;
        let xd = self.to_decl_point(x);
        let (c, jac) = self.timed(|m| m.cons(&xd, want_jacobian))?;
        self.counters.c += 1;
        let jac = match jac {
            Some(jd) => {
                self.counters.cg += 1;
                Some(self.from_decl_jac(&jd))
            }
            None => None,
        };
        Ok((self.from_decl_con_vec(&c), jac))
    }

    /// One constraint value, optionally with its gradient.
    pub fn cons_one(
        &mut self,
        x: &[f64],
        index: usize,
        want_gradient: bool,
    ) -> Result<(f64, Option<Vec<f64>>), Error> {
        self.pre(x)?;
        let decl_index = self.decl_con_index(index)?;
        let xd = self.to_decl_point(x);
        let (ci, gi) = self.timed(|m| m.cons_one(&xd, decl_index, want_gradient))?;
        self.counters.c += 1;
        let gi = match gi {
            Some(gd) => {
                self.counters.cg += 1;
                Some(self.from_decl_var_vec(&gd))
            }
            None => None,
        };
        Ok((ci, gi))
    }

    /// Gradient of the objective (`v` absent) or the Lagrangian, together
    /// with the dense constraint Jacobian.
    pub fn lagjac(
        &mut self,
        x: &[f64],
        v: Option<&[f64]>,
    ) -> Result<(Vec<f64>, Array2<f64>), Error> {
        self.pre(x)?;
        let vd = self.optional_multipliers(v)?;
        let xd = self.to_decl_point(x);
        let (g, jac) = self.timed(|m| m.lagjac(&xd, vd.as_deref()))?;
        self.counters.g += 1;
        if self.m > 0 {
            self.counters.cg += 1;
        }
        Ok((self.from_decl_var_vec(&g), self.from_decl_jac(&jac)))
    }

    /// Jacobian-vector product (`transpose == false`: `p` in variable
    /// space, result in constraint space) or its transpose.
    pub fn jprod(&mut self, x: &[f64], p: &[f64], transpose: bool) -> Result<Vec<f64>, Error> {
        self.pre(x)?;
        let (pd, out_con) = if transpose {
            check_dim("p", p.len(), self.m)?;
            (self.to_decl_multipliers(p), false)
        } else {
            check_dim("p", p.len(), self.n)?;
            (self.to_decl_direction(p), true)
        };
        let xd = self.to_decl_point(x);
        let r = self.timed(|m| m.jprod(&xd, &pd, transpose))?;
        self.counters.cg += 1;
        Ok(if out_con {
            self.from_decl_con_vec(&r)
        } else {
            self.from_decl_var_vec(&r)
        })
    }

    /// Dense Hessian of the objective (unconstrained) or the Lagrangian.
    pub fn hess(&mut self, x: &[f64], v: Option<&[f64]>) -> Result<Array2<f64>, Error> {
        self.pre(x)?;
        let vd = self.required_multipliers(v)?;
        let xd = self.to_decl_point(x);
        let h = self.timed(|m| m.hess(&xd, vd.as_deref()))?;
        self.counters.h += 1;
        Ok(self.from_decl_hess(&h))
    }

    /// Dense Hessian of the objective (`cons_index` absent) or of one
    /// constraint.
    pub fn ihess(&mut self, x: &[f64], cons_index: Option<usize>) -> Result<Array2<f64>, Error> {
        self.pre(x)?;
        let decl_index = cons_index.map(|i| self.decl_con_index(i)).transpose()?;
        let xd = self.to_decl_point(x);
        let h = self.timed(|m| m.ihess(&xd, decl_index))?;
        if cons_index.is_some() {
            self.counters.ch += 1;
        } else {
            self.counters.h += 1;
        }
        Ok(self.from_decl_hess(&h))
    }

    /// Hessian-vector product against the objective/Lagrangian Hessian.
    pub fn hprod(&mut self, x: &[f64], v: Option<&[f64]>, p: &[f64]) -> Result<Vec<f64>, Error> {
        self.pre(x)?;
        check_dim("p", p.len(), self.n)?;
        let vd = self.required_multipliers(v)?;
        let xd = self.to_decl_point(x);
        let pd = self.to_decl_direction(p);
        let r = self.timed(|m| m.hprod(&xd, vd.as_deref(), &pd))?;
        self.counters.hprod += 1;
        Ok(self.from_decl_var_vec(&r))
    }

    /// One-call bundle: gradient (objective by default, Lagrangian with
    /// `gradient_of_lagrangian`), Jacobian for constrained problems, and
    /// the objective/Lagrangian Hessian.
    pub fn gradhess(
        &mut self,
        x: &[f64],
        v: Option<&[f64]>,
        gradient_of_lagrangian: bool,
    ) -> Result<(Vec<f64>, Option<Array2<f64>>, Array2<f64>), Error> {
        self.pre(x)?;
        let vd = self.required_multipliers(v)?;
        let xd = self.to_decl_point(x);
        let (g, jac, h) = self.timed(|m| m.gradhess(&xd, vd.as_deref(), gradient_of_lagrangian))?;
        self.counters.g += 1;
        if self.m > 0 {
            self.counters.cg += 1;
        }
        self.counters.h += 1;
        Ok((
            self.from_decl_var_vec(&g),
            jac.as_ref().map(|j| self.from_decl_jac(j)),
            self.from_decl_hess(&h),
        ))
    }

    // ── Sparse evaluations ─────────────────────────────────

    /// Constraint values and sparse Jacobian (COO, presented indices).
    pub fn scons(&mut self, x: &[f64]) -> Result<(Vec<f64>, TriMat<f64>), Error> {
        self.pre(x)?;
        let xd = self.to_decl_point(x);
        let (c, jac) = self.timed(|m| m.scons(&xd))?;
        self.counters.c += 1;
        self.counters.cg += 1;
        Ok((self.from_decl_con_vec(&c), self.from_decl_sparse_jac(&jac)))
    }

    /// One constraint value and its sparse gradient.
    pub fn scons_one(&mut self, x: &[f64], index: usize) -> Result<(f64, Vec<(usize, f64)>), Error> {
        self.pre(x)?;
        let decl_index = self.decl_con_index(index)?;
        let xd = self.to_decl_point(x);
        let (ci, gi) = self.timed(|m| m.scons_one(&xd, decl_index))?;
        self.counters.c += 1;
        self.counters.cg += 1;
        Ok((ci, self.from_decl_sparse_vec(&gi)))
    }

    /// Sparse gradient of objective/Lagrangian plus sparse Jacobian.
    pub fn slagjac(
        &mut self,
        x: &[f64],
        v: Option<&[f64]>,
    ) -> Result<(Vec<(usize, f64)>, TriMat<f64>), Error> {
        self.pre(x)?;
        let vd = self.optional_multipliers(v)?;
        let xd = self.to_decl_point(x);
        let (g, jac) = self.timed(|m| m.slagjac(&xd, vd.as_deref()))?;
        self.counters.g += 1;
        if self.m > 0 {
            self.counters.cg += 1;
        }
        Ok((self.from_decl_sparse_vec(&g), self.from_decl_sparse_jac(&jac)))
    }

    /// Sparse Hessian of the objective/Lagrangian, upper triangle only.
    pub fn sphess(&mut self, x: &[f64], v: Option<&[f64]>) -> Result<TriMat<f64>, Error> {
        self.pre(x)?;
        let vd = self.required_multipliers(v)?;
        let xd = self.to_decl_point(x);
        let h = self.timed(|m| m.sphess(&xd, vd.as_deref()))?;
        self.counters.h += 1;
        Ok(self.from_decl_sparse_hess(&h))
    }

    /// Sparse Hessian of the objective or of one constraint.
    pub fn isphess(&mut self, x: &[f64], cons_index: Option<usize>) -> Result<TriMat<f64>, Error> {
        self.pre(x)?;
        let decl_index = cons_index.map(|i| self.decl_con_index(i)).transpose()?;
        let xd = self.to_decl_point(x);
        let h = self.timed(|m| m.isphess(&xd, decl_index))?;
        if cons_index.is_some() {
            self.counters.ch += 1;
        } else {
            self.counters.h += 1;
        }
        Ok(self.from_decl_sparse_hess(&h))
    }

    /// Sparse variant of [`gradhess`](Self::gradhess).
    pub fn gradsphess(
        &mut self,
        x: &[f64],
        v: Option<&[f64]>,
        gradient_of_lagrangian: bool,
    ) -> Result<(Vec<(usize, f64)>, Option<TriMat<f64>>, TriMat<f64>), Error> {
        self.pre(x)?;
        let vd = self.required_multipliers(v)?;
        let xd = self.to_decl_point(x);
        let (g, jac, h) =
            self.timed(|m| m.gradsphess(&xd, vd.as_deref(), gradient_of_lagrangian))?;
        self.counters.g += 1;
        if self.m > 0 {
            self.counters.cg += 1;
        }
        self.counters.h += 1;
        Ok((
            self.from_decl_sparse_vec(&g),
            jac.as_ref().map(|j| self.from_decl_sparse_jac(j)),
            self.from_decl_sparse_hess(&h),
        ))
    }

    // ── Preconditions ──────────────────────────────────────

    fn pre(&self, x: &[f64]) -> Result<(), Error> {
        if self.closed {
            return Err(Error::UseAfterClose);
        }
        check_dim("x", x.len(), self.n)
    }

    fn decl_con_index(&self, index: usize) -> Result<usize, Error> {
        if index < self.m {
            Ok(self.ordering.con_order[index])
        } else {
            Err(Error::Dimension {
                arg: "index",
                expected: self.m,
                got: index,
            })
        }
    }

    /// Multipliers mandatory for constrained problems, forbidden otherwise.
    fn required_multipliers(&self, v: Option<&[f64]>) -> Result<Option<Vec<f64>>, Error> {
        match (self.m, v) {
            (0, None) => Ok(None),
            (0, Some(v)) => Err(Error::Dimension {
                arg: "v",
                expected: 0,
                got: v.len(),
            }),
            (m, None) => Err(Error::Dimension {
                arg: "v",
                expected: m,
                got: 0,
            }),
            (m, Some(v)) => {
                check_dim("v", v.len(), m)?;
                Ok(Some(self.to_decl_multipliers(v)))
            }
        }
    }

    /// Multipliers optional: absent means "objective gradient".
    fn optional_multipliers(&self, v: Option<&[f64]>) -> Result<Option<Vec<f64>>, Error> {
        match v {
            None => Ok(None),
            Some(v) => {
                check_dim("v", v.len(), self.m)?;
                Ok(Some(self.to_decl_multipliers(v)))
            }
        }
    }

    /// Run one module call, accumulating wall time on success.
    fn timed<T>(
        &mut self,
        call: impl FnOnce(&mut dyn EvalModule) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let start = Instant::now();
        let out = call(self.module.as_mut())?;
        self.counters.run_ns += start.elapsed().as_nanos() as u64;
        Ok(out)
    }

    // ── Presented ↔ declaration conversions ────────────────

    /// Reduced point to a full declaration-order point; fixed slots take
    /// their bound value.
    fn to_decl_point(&self, x: &[f64]) -> Vec<f64> {
        let mut decl = vec![0.0; self.n_full];
        for (k, &d) in self.ordering.var_order.iter().enumerate() {
            decl[d] = match self.ordering.full_to_free[k] {
                Some(r) => x[r],
                None => self.bl_full[k],
            };
        }
        decl
    }

    /// Reduced direction to declaration order; fixed slots get zero, so a
    /// product never picks up contributions from eliminated variables.
    fn to_decl_direction(&self, p: &[f64]) -> Vec<f64> {
        let mut decl = vec![0.0; self.n_full];
        for (r, &k) in self.ordering.free_to_full.iter().enumerate() {
            decl[self.ordering.var_order[k]] = p[r];
        }
        decl
    }

    fn to_decl_multipliers(&self, v: &[f64]) -> Vec<f64> {
        let mut decl = vec![0.0; self.m];
        for (p, &d) in self.ordering.con_order.iter().enumerate() {
            decl[d] = v[p];
        }
        decl
    }

    fn from_decl_var_vec(&self, decl: &[f64]) -> Vec<f64> {
        self.ordering
            .free_to_full
            .iter()
            .map(|&k| decl[self.ordering.var_order[k]])
            .collect()
    }

    fn from_decl_con_vec(&self, decl: &[f64]) -> Vec<f64> {
        self.ordering.con_order.iter().map(|&d| decl[d]).collect()
    }

    fn from_decl_jac(&self, jac: &Array2<f64>) -> Array2<f64> {
        let mut out = Array2::zeros((self.m, self.n));
        for (p, &dc) in self.ordering.con_order.iter().enumerate() {
            for (r, &k) in self.ordering.free_to_full.iter().enumerate() {
                out[[p, r]] = jac[[dc, self.ordering.var_order[k]]];
            }
        }
        out
    }

    fn from_decl_hess(&self, h: &Array2<f64>) -> Array2<f64> {
        let mut out = Array2::zeros((self.n, self.n));
        for (r, &k) in self.ordering.free_to_full.iter().enumerate() {
            for (s, &l) in self.ordering.free_to_full.iter().enumerate() {
                out[[r, s]] = h[[self.ordering.var_order[k], self.ordering.var_order[l]]];
            }
        }
        out
    }

    /// Sparse gradient, declaration indices to reduced presented indices;
    /// entries on eliminated variables are dropped.
    fn from_decl_sparse_vec(&self, decl: &[(usize, f64)]) -> Vec<(usize, f64)> {
        let mut out: Vec<(usize, f64)> = decl
            .iter()
            .filter_map(|&(d, val)| {
                self.ordering.full_to_free[self.ordering.inv_var[d]].map(|r| (r, val))
            })
            .collect();
        out.sort_by_key(|&(r, _)| r);
        out
    }

    fn from_decl_sparse_jac(&self, jac: &TriMat<f64>) -> TriMat<f64> {
        let mut out = TriMat::new((self.m, self.n));
        for (val, (i, j)) in jac.triplet_iter() {
            if let Some(r) = self.ordering.full_to_free[self.ordering.inv_var[j]] {
                out.add_triplet(self.ordering.inv_con[i], r, *val);
            }
        }
        out
    }

    /// Sparse Hessian remap; the permutation can flip an upper-triangle
    /// entry below the diagonal, so indices are re-sorted per entry.
    fn from_decl_sparse_hess(&self, h: &TriMat<f64>) -> TriMat<f64> {
        let mut out = TriMat::new((self.n, self.n));
        for (val, (i, j)) in h.triplet_iter() {
            let ri = self.ordering.full_to_free[self.ordering.inv_var[i]];
            let rj = self.ordering.full_to_free[self.ordering.inv_var[j]];
            if let (Some(ri), Some(rj)) = (ri, rj) {
                let (lo, hi) = if ri <= rj { (ri, rj) } else { (rj, ri) };
                out.add_triplet(lo, hi, *val);
            }
        }
        out
    }
}

impl fmt::Debug for ProblemHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProblemHandle")
            .field("name", &self.name)
            .field("n_full", &self.n_full)
            .field("n", &self.n)
            .field("m", &self.m)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for ProblemHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "problem {}", self.name)?;
        if !self.sif_params.is_empty() {
            let params = self
                .sif_params
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(" ");
            write!(f, " ({params})")?;
        }
        write!(
            f,
            ": {} variables ({} free, {} fixed), {} constraints",
            self.n_full,
            self.n,
            self.n_fixed(),
            self.m
        )
    }
}

fn check_dim(arg: &'static str, got: usize, expected: usize) -> Result<(), Error> {
    if got == expected {
        Ok(())
    } else {
        Err(Error::Dimension { arg, expected, got })
    }
}

fn check_len(what: &'static str, got: usize, expected: usize) -> Result<(), Error> {
    if got == expected {
        Ok(())
    } else {
        Err(Error::Structural(format!(
            "metadata field {what} has length {got}, dimensions say {expected}"
        )))
    }
}
