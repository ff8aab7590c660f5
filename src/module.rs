//! The bound native evaluation module, modelled as a trait.
//!
//! The decoder toolchain is an opaque producer of a loadable evaluation
//! module; this crate only ever talks to it through [`EvalModule`], so test
//! doubles and alternate toolchain versions slot in without touching the
//! evaluation interface. All module operations work in the problem's
//! *declaration order* over the full variable space; permutation and
//! fixed-variable elimination happen one layer up, in the problem handle.
//!
//! Memory convention for the C ABI binder (mirrors the conventions of
//! hand-rolled native interfaces): the caller allocates flat arrays and
//! passes pointers; matrices cross the boundary row-major; every routine
//! returns an integer status, 0 on success.

use crate::cache::CacheEntry;
use crate::types::Error;
use libloading::Library;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use sprs::TriMat;
use std::path::Path;

/// Version of the `sif_*` entry-point contract. Recorded in every artifact's
/// metadata at build time and checked again at load time.
pub const ABI_VERSION: u32 = 1;

// ─────────────────────────────────────────────────────────────
//  Static problem metadata
// ─────────────────────────────────────────────────────────────

/// Variable type as declared in the SIF source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarType {
    Real,
    Boolean,
    Integer,
}

/// Static metadata read from the artifact's own metadata record.
///
/// Everything here is in declaration order and full dimension; the loader
/// never re-derives any of it from the SIF problem text. Constraint fields
/// (`v0`, `cl`, `cu`, `equatn`, `linear`) are empty for unconstrained
/// problems.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub name: String,
    /// Number of variables (free + fixed).
    pub n: usize,
    /// Number of constraints, excluding bounds.
    pub m: usize,
    pub x0: Vec<f64>,
    pub bl: Vec<f64>,
    pub bu: Vec<f64>,
    pub v0: Vec<f64>,
    pub cl: Vec<f64>,
    pub cu: Vec<f64>,
    /// Per-constraint: is this an equality constraint?
    pub equatn: Vec<bool>,
    /// Per-constraint: is this constraint linear?
    pub linear: Vec<bool>,
    /// Per-variable: does the variable enter nonlinearly?
    pub nonlinear_var: Vec<bool>,
    pub vartype: Vec<VarType>,
    /// Nonzeros in the upper triangle of the objective/Lagrangian Hessian.
    pub nnzh: usize,
    /// Nonzeros in the constraint Jacobian.
    pub nnzj: usize,
}

// ─────────────────────────────────────────────────────────────
//  The evaluation module trait
// ─────────────────────────────────────────────────────────────

/// A bound native evaluation module.
///
/// Dense operations are required; sparse and product operations have
/// default implementations derived from the dense core, so analytic test
/// doubles only implement a handful of methods. Native binders override the
/// products with the dedicated native routines.
///
/// Sign convention, fixed for every module: Lagrangian = objective +
/// multiplier-weighted constraint sum.
//
// TODO: bind the native sparse routines (csgr/csh families) in DylibModule
// directly instead of sparsifying the dense results.
pub trait EvalModule: Send {
    fn info(&self) -> &ModuleInfo;

    /// Objective and all constraint values (empty for unconstrained).
    fn objcons(&mut self, x: &[f64]) -> Result<(f64, Vec<f64>), Error>;

    /// Objective, optionally paired with its gradient.
    fn obj(&mut self, x: &[f64], want_gradient: bool) -> Result<(f64, Option<Vec<f64>>), Error>;

    /// All constraint values, optionally paired with the dense Jacobian
    /// (`m x n`, row-major semantics).
    fn cons(&mut self, x: &[f64], want_jacobian: bool)
        -> Result<(Vec<f64>, Option<Array2<f64>>), Error>;

    /// A single constraint value, optionally paired with its gradient.
    fn cons_one(
        &mut self,
        x: &[f64],
        index: usize,
        want_gradient: bool,
    ) -> Result<(f64, Option<Vec<f64>>), Error>;

    /// Gradient of the objective (`v` absent) or Lagrangian (`v` given),
    /// plus the dense constraint Jacobian.
    fn lagjac(&mut self, x: &[f64], v: Option<&[f64]>) -> Result<(Vec<f64>, Array2<f64>), Error>;

    /// Dense Hessian of the objective (`v` absent) or Lagrangian.
    fn hess(&mut self, x: &[f64], v: Option<&[f64]>) -> Result<Array2<f64>, Error>;

    /// Dense Hessian of the objective (`cons_index` absent) or of a single
    /// constraint's contribution.
    fn ihess(&mut self, x: &[f64], cons_index: Option<usize>) -> Result<Array2<f64>, Error>;

    /// Jacobian-vector (`transpose == false`) or Jacobian-transpose-vector
    /// product.
    fn jprod(&mut self, x: &[f64], p: &[f64], transpose: bool) -> Result<Vec<f64>, Error> {
        let (_, jac) = self.cons(x, true)?;
        let jac = jac.ok_or_else(|| Error::Structural("cons returned no Jacobian".into()))?;
        let (rows, cols) = jac.dim();
        let mut r = vec![0.0; if transpose { cols } else { rows }];
        if transpose {
            for i in 0..rows {
                for j in 0..cols {
                    r[j] += jac[[i, j]] * p[i];
                }
            }
        } else {
            for i in 0..rows {
                for j in 0..cols {
                    r[i] += jac[[i, j]] * p[j];
                }
            }
        }
        Ok(r)
    }

    /// Hessian-vector product against the objective/Lagrangian Hessian.
    fn hprod(&mut self, x: &[f64], v: Option<&[f64]>, p: &[f64]) -> Result<Vec<f64>, Error> {
        let h = self.hess(x, v)?;
        let n = h.nrows();
        let mut r = vec![0.0; n];
        for i in 0..n {
            for j in 0..n {
                r[i] += h[[i, j]] * p[j];
            }
        }
        Ok(r)
    }

    /// One-call bundle: gradient (of objective or Lagrangian), Jacobian
    /// (constrained problems only), and Lagrangian Hessian.
    fn gradhess(
        &mut self,
        x: &[f64],
        v: Option<&[f64]>,
        gradient_of_lagrangian: bool,
    ) -> Result<(Vec<f64>, Option<Array2<f64>>, Array2<f64>), Error> {
        let m = self.info().m;
        let (g, jac) = self.lagjac(x, if gradient_of_lagrangian { v } else { None })?;
        let h = self.hess(x, v)?;
        Ok((g, if m > 0 { Some(jac) } else { None }, h))
    }

    // ── Sparse operations (COO) ────────────────────────────

    /// Constraint values and sparse Jacobian.
    fn scons(&mut self, x: &[f64]) -> Result<(Vec<f64>, TriMat<f64>), Error> {
        let (c, jac) = self.cons(x, true)?;
        let jac = jac.ok_or_else(|| Error::Structural("cons returned no Jacobian".into()))?;
        Ok((c, dense_to_coo(&jac)))
    }

    /// A single constraint value and its sparse gradient.
    fn scons_one(&mut self, x: &[f64], index: usize) -> Result<(f64, Vec<(usize, f64)>), Error> {
        let (ci, gi) = self.cons_one(x, index, true)?;
        let gi = gi.ok_or_else(|| Error::Structural("cons_one returned no gradient".into()))?;
        Ok((ci, sparse_vector(&gi)))
    }

    /// Sparse gradient of objective/Lagrangian plus sparse Jacobian.
    fn slagjac(
        &mut self,
        x: &[f64],
        v: Option<&[f64]>,
    ) -> Result<(Vec<(usize, f64)>, TriMat<f64>), Error> {
        let (g, jac) = self.lagjac(x, v)?;
        Ok((sparse_vector(&g), dense_to_coo(&jac)))
    }

    /// Sparse Hessian of objective/Lagrangian, upper triangle only.
    fn sphess(&mut self, x: &[f64], v: Option<&[f64]>) -> Result<TriMat<f64>, Error> {
        let h = self.hess(x, v)?;
        Ok(dense_to_upper_coo(&h))
    }

    /// Sparse Hessian of objective or one constraint, upper triangle only.
    fn isphess(&mut self, x: &[f64], cons_index: Option<usize>) -> Result<TriMat<f64>, Error> {
        let h = self.ihess(x, cons_index)?;
        Ok(dense_to_upper_coo(&h))
    }

    /// Sparse variant of [`EvalModule::gradhess`].
    fn gradsphess(
        &mut self,
        x: &[f64],
        v: Option<&[f64]>,
        gradient_of_lagrangian: bool,
    ) -> Result<(Vec<(usize, f64)>, Option<TriMat<f64>>, TriMat<f64>), Error> {
        let (g, jac, h) = self.gradhess(x, v, gradient_of_lagrangian)?;
        Ok((
            sparse_vector(&g),
            jac.as_ref().map(dense_to_coo),
            dense_to_upper_coo(&h),
        ))
    }
}

// ─────────────────────────────────────────────────────────────
//  Dense → COO helpers
// ─────────────────────────────────────────────────────────────

/// Drop exact zeros from a dense matrix, keeping COO triplets.
pub(crate) fn dense_to_coo(a: &Array2<f64>) -> TriMat<f64> {
    let (rows, cols) = a.dim();
    let mut tri = TriMat::new((rows, cols));
    for i in 0..rows {
        for j in 0..cols {
            if a[[i, j]] != 0.0 {
                tri.add_triplet(i, j, a[[i, j]]);
            }
        }
    }
    tri
}

/// Upper triangle (including diagonal) of a symmetric dense matrix as COO.
pub(crate) fn dense_to_upper_coo(a: &Array2<f64>) -> TriMat<f64> {
    let n = a.nrows();
    let mut tri = TriMat::new((n, n));
    for i in 0..n {
        for j in i..n {
            if a[[i, j]] != 0.0 {
                tri.add_triplet(i, j, a[[i, j]]);
            }
        }
    }
    tri
}

/// Nonzero entries of a dense vector as (index, value) pairs.
pub(crate) fn sparse_vector(g: &[f64]) -> Vec<(usize, f64)> {
    g.iter()
        .enumerate()
        .filter(|(_, &v)| v != 0.0)
        .map(|(i, &v)| (i, v))
        .collect()
}

// ─────────────────────────────────────────────────────────────
//  Binder
// ─────────────────────────────────────────────────────────────

/// Binds a cache entry's artifact into the process as an [`EvalModule`].
pub trait Binder {
    fn bind(&self, entry: &CacheEntry) -> Result<Box<dyn EvalModule>, Error>;
}

/// Binder for shared-object artifacts produced by the decoder toolchain.
///
/// Loads the entry's module file with `libloading` and resolves the
/// `sif_*` entry points.
#[derive(Debug, Default)]
pub struct DylibBinder;

impl Binder for DylibBinder {
    fn bind(&self, entry: &CacheEntry) -> Result<Box<dyn EvalModule>, Error> {
        let path = entry.dir.join(&entry.meta.module);
        let module = DylibModule::open(&path, &entry.meta.name)?;
        Ok(Box::new(module))
    }
}

// ─────────────────────────────────────────────────────────────
//  Dylib-backed module
// ─────────────────────────────────────────────────────────────

type AbiFn = unsafe extern "C" fn() -> u32;
type DimsFn = unsafe extern "C" fn(*mut usize, *mut usize) -> i32;
#[allow(clippy::type_complexity)]
type SetupFn = unsafe extern "C" fn(
    *mut f64, // x0
    *mut f64, // bl
    *mut f64, // bu
    *mut f64, // v0
    *mut f64, // cl
    *mut f64, // cu
    *mut u8,  // equatn
    *mut u8,  // linear
    *mut u8,  // nonlinear_var
    *mut i32, // vartype
    *mut usize, // nnzh
    *mut usize, // nnzj
) -> i32;
type ObjconsFn = unsafe extern "C" fn(*const f64, *mut f64, *mut f64) -> i32;
type ObjFn = unsafe extern "C" fn(*const f64, i32, *mut f64, *mut f64) -> i32;
type ConsFn = unsafe extern "C" fn(*const f64, i32, *mut f64, *mut f64) -> i32;
type ConsOneFn = unsafe extern "C" fn(*const f64, usize, i32, *mut f64, *mut f64) -> i32;
type LagjacFn = unsafe extern "C" fn(*const f64, *const f64, *mut f64, *mut f64) -> i32;
type JprodFn = unsafe extern "C" fn(*const f64, i32, *const f64, *mut f64) -> i32;
type HessFn = unsafe extern "C" fn(*const f64, *const f64, *mut f64) -> i32;
type IhessFn = unsafe extern "C" fn(*const f64, i64, *mut f64) -> i32;
type HprodFn = unsafe extern "C" fn(*const f64, *const f64, *const f64, *mut f64) -> i32;

/// An evaluation module bound from a shared object.
///
/// Holds the library alongside the resolved function pointers; the pointers
/// stay valid exactly as long as `_lib` is alive.
pub struct DylibModule {
    _lib: Library,
    info: ModuleInfo,
    objcons_fn: ObjconsFn,
    obj_fn: ObjFn,
    cons_fn: ConsFn,
    cons_one_fn: ConsOneFn,
    lagjac_fn: LagjacFn,
    jprod_fn: JprodFn,
    hess_fn: HessFn,
    ihess_fn: IhessFn,
    hprod_fn: HprodFn,
}

impl DylibModule {
    /// Load the shared object and run the two-phase setup: query dimensions,
    /// then fill caller-allocated metadata buffers.
    pub fn open(path: &Path, name: &str) -> Result<Self, Error> {
        let lib = unsafe { Library::new(path) }
            .map_err(|e| Error::Load(format!("{}: {e}", path.display())))?;

        unsafe {
            let abi: AbiFn = *get_symbol(&lib, b"sif_abi\0")?;
            let got = abi();
            if got != ABI_VERSION {
                return Err(Error::Load(format!(
                    "module ABI {got} is incompatible with supported ABI {ABI_VERSION}"
                )));
            }

            let dims: DimsFn = *get_symbol(&lib, b"sif_dims\0")?;
            let mut n = 0usize;
            let mut m = 0usize;
            check_status("sif_dims", dims(&mut n, &mut m))?;

            let setup: SetupFn = *get_symbol(&lib, b"sif_setup\0")?;
            let mut x0 = vec![0.0; n];
            let mut bl = vec![0.0; n];
            let mut bu = vec![0.0; n];
            let mut v0 = vec![0.0; m];
            let mut cl = vec![0.0; m];
            let mut cu = vec![0.0; m];
            let mut equatn = vec![0u8; m];
            let mut linear = vec![0u8; m];
            let mut nonlinear_var = vec![0u8; n];
            let mut vartype = vec![0i32; n];
            let mut nnzh = 0usize;
            let mut nnzj = 0usize;
            check_status(
                "sif_setup",
                setup(
                    x0.as_mut_ptr(),
                    bl.as_mut_ptr(),
                    bu.as_mut_ptr(),
                    v0.as_mut_ptr(),
                    cl.as_mut_ptr(),
                    cu.as_mut_ptr(),
                    equatn.as_mut_ptr(),
                    linear.as_mut_ptr(),
                    nonlinear_var.as_mut_ptr(),
                    vartype.as_mut_ptr(),
                    &mut nnzh,
                    &mut nnzj,
                ),
            )?;

            let info = ModuleInfo {
                name: name.to_owned(),
                n,
                m,
                x0,
                bl,
                bu,
                v0,
                cl,
                cu,
                equatn: equatn.into_iter().map(|b| b != 0).collect(),
                linear: linear.into_iter().map(|b| b != 0).collect(),
                nonlinear_var: nonlinear_var.into_iter().map(|b| b != 0).collect(),
                vartype: vartype
                    .into_iter()
                    .map(|t| match t {
                        1 => VarType::Boolean,
                        2 => VarType::Integer,
                        _ => VarType::Real,
                    })
                    .collect(),
                nnzh,
                nnzj,
            };

            let objcons_fn: ObjconsFn = *get_symbol(&lib, b"sif_objcons\0")?;
            let obj_fn: ObjFn = *get_symbol(&lib, b"sif_obj\0")?;
            let cons_fn: ConsFn = *get_symbol(&lib, b"sif_cons\0")?;
            let cons_one_fn: ConsOneFn = *get_symbol(&lib, b"sif_cons_one\0")?;
            let lagjac_fn: LagjacFn = *get_symbol(&lib, b"sif_lagjac\0")?;
            let jprod_fn: JprodFn = *get_symbol(&lib, b"sif_jprod\0")?;
            let hess_fn: HessFn = *get_symbol(&lib, b"sif_hess\0")?;
            let ihess_fn: IhessFn = *get_symbol(&lib, b"sif_ihess\0")?;
            let hprod_fn: HprodFn = *get_symbol(&lib, b"sif_hprod\0")?;

            Ok(Self {
                objcons_fn,
                obj_fn,
                cons_fn,
                cons_one_fn,
                lagjac_fn,
                jprod_fn,
                hess_fn,
                ihess_fn,
                hprod_fn,
                info,
                _lib: lib,
            })
        }
    }

    fn opt_ptr(v: Option<&[f64]>) -> *const f64 {
        v.map_or(std::ptr::null(), |s| s.as_ptr())
    }
}

unsafe fn get_symbol<'l, T>(
    lib: &'l Library,
    name: &[u8],
) -> Result<libloading::Symbol<'l, T>, Error> {
    lib.get(name).map_err(|e| {
        Error::Load(format!(
            "missing entry point {}: {e}",
            String::from_utf8_lossy(&name[..name.len() - 1])
        ))
    })
}

fn check_status(routine: &str, status: i32) -> Result<(), Error> {
    if status == 0 {
        Ok(())
    } else {
        Err(Error::Structural(format!(
            "native routine {routine} returned status {status}"
        )))
    }
}

impl EvalModule for DylibModule {
    fn info(&self) -> &ModuleInfo {
        &self.info
    }

    fn objcons(&mut self, x: &[f64]) -> Result<(f64, Vec<f64>), Error> {
        let mut f = 0.0;
        let mut c = vec![0.0; self.info.m];
        check_status("sif_objcons", unsafe {
            (self.objcons_fn)(x.as_ptr(), &mut f, c.as_mut_ptr())
        })?;
        Ok((f, c))
    }

    fn obj(&mut self, x: &[f64], want_gradient: bool) -> Result<(f64, Option<Vec<f64>>), Error> {
        let mut f = 0.0;
        let mut g = vec![0.0; if want_gradient { self.info.n } else { 0 }];
        check_status("sif_obj", unsafe {
            (self.obj_fn)(
                x.as_ptr(),
                want_gradient as i32,
                &mut f,
                if want_gradient {
                    g.as_mut_ptr()
                } else {
                    std::ptr::null_mut()
                },
            )
        })?;
        Ok((f, want_gradient.then_some(g)))
    }

    fn cons(
        &mut self,
        x: &[f64],
        want_jacobian: bool,
    ) -> Result<(Vec<f64>, Option<Array2<f64>>), Error> {
        let (n, m) = (self.info.n, self.info.m);
        let mut c = vec![0.0; m];
        let mut jac = vec![0.0; if want_jacobian { m * n } else { 0 }];
        check_status("sif_cons", unsafe {
            (self.cons_fn)(
                x.as_ptr(),
                want_jacobian as i32,
                c.as_mut_ptr(),
                if want_jacobian {
                    jac.as_mut_ptr()
                } else {
                    std::ptr::null_mut()
                },
            )
        })?;
        let jac = if want_jacobian {
            Some(
                Array2::from_shape_vec((m, n), jac)
                    .map_err(|e| Error::Structural(e.to_string()))?,
            )
        } else {
            None
        };
        Ok((c, jac))
    }

    fn cons_one(
        &mut self,
        x: &[f64],
        index: usize,
        want_gradient: bool,
    ) -> Result<(f64, Option<Vec<f64>>), Error> {
        let mut ci = 0.0;
        let mut gi = vec![0.0; if want_gradient { self.info.n } else { 0 }];
        check_status("sif_cons_one", unsafe {
            (self.cons_one_fn)(
                x.as_ptr(),
                index,
                want_gradient as i32,
                &mut ci,
                if want_gradient {
                    gi.as_mut_ptr()
                } else {
                    std::ptr::null_mut()
                },
            )
        })?;
        Ok((ci, want_gradient.then_some(gi)))
    }

    fn lagjac(&mut self, x: &[f64], v: Option<&[f64]>) -> Result<(Vec<f64>, Array2<f64>), Error> {
        let (n, m) = (self.info.n, self.info.m);
        let mut g = vec![0.0; n];
        let mut jac = vec![0.0; m * n];
        check_status("sif_lagjac", unsafe {
            (self.lagjac_fn)(x.as_ptr(), Self::opt_ptr(v), g.as_mut_ptr(), jac.as_mut_ptr())
        })?;
        let jac =
            Array2::from_shape_vec((m, n), jac).map_err(|e| Error::Structural(e.to_string()))?;
        Ok((g, jac))
    }

    fn jprod(&mut self, x: &[f64], p: &[f64], transpose: bool) -> Result<Vec<f64>, Error> {
        let out_len = if transpose { self.info.n } else { self.info.m };
        let mut r = vec![0.0; out_len];
        check_status("sif_jprod", unsafe {
            (self.jprod_fn)(x.as_ptr(), transpose as i32, p.as_ptr(), r.as_mut_ptr())
        })?;
        Ok(r)
    }

    fn hess(&mut self, x: &[f64], v: Option<&[f64]>) -> Result<Array2<f64>, Error> {
        let n = self.info.n;
        let mut h = vec![0.0; n * n];
        check_status("sif_hess", unsafe {
            (self.hess_fn)(x.as_ptr(), Self::opt_ptr(v), h.as_mut_ptr())
        })?;
        Array2::from_shape_vec((n, n), h).map_err(|e| Error::Structural(e.to_string()))
    }

    fn ihess(&mut self, x: &[f64], cons_index: Option<usize>) -> Result<Array2<f64>, Error> {
        let n = self.info.n;
        let mut h = vec![0.0; n * n];
        let idx = cons_index.map_or(-1, |i| i as i64);
        check_status("sif_ihess", unsafe {
            (self.ihess_fn)(x.as_ptr(), idx, h.as_mut_ptr())
        })?;
        Array2::from_shape_vec((n, n), h).map_err(|e| Error::Structural(e.to_string()))
    }

    fn hprod(&mut self, x: &[f64], v: Option<&[f64]>, p: &[f64]) -> Result<Vec<f64>, Error> {
        let mut r = vec![0.0; self.info.n];
        check_status("sif_hprod", unsafe {
            (self.hprod_fn)(x.as_ptr(), Self::opt_ptr(v), p.as_ptr(), r.as_mut_ptr())
        })?;
        Ok(r)
    }
}
