//! Shared test fixtures: analytic evaluation modules with known closed-form
//! derivatives, plus a stub toolchain/binder pair that exercises the cache
//! and loader without any external decoder.

#![allow(dead_code)]

use ndarray::Array2;
use siftest::{
    Binder, BuiltModule, CacheEntry, Error, EvalModule, ModuleInfo, ProblemDescriptor, Toolchain,
    VarType,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const INF_BOUND: f64 = 1e20;

// ─────────────────────────────────────────────────────────────
//  ROSENBR: unconstrained, n = 2
// ─────────────────────────────────────────────────────────────

/// f(x) = 100 (x1 - x0^2)^2 + (1 - x0)^2, started at (-1.2, 1).
pub fn rosenbrock_info() -> ModuleInfo {
    ModuleInfo {
        name: "ROSENBR".into(),
        n: 2,
        m: 0,
        x0: vec![-1.2, 1.0],
        bl: vec![-INF_BOUND; 2],
        bu: vec![INF_BOUND; 2],
        v0: vec![],
        cl: vec![],
        cu: vec![],
        equatn: vec![],
        linear: vec![],
        nonlinear_var: vec![true, true],
        vartype: vec![VarType::Real; 2],
        nnzh: 3,
        nnzj: 0,
    }
}

pub struct Rosenbrock {
    info: ModuleInfo,
}

impl Rosenbrock {
    pub fn new() -> Self {
        Self {
            info: rosenbrock_info(),
        }
    }

    fn f(x: &[f64]) -> f64 {
        100.0 * (x[1] - x[0] * x[0]).powi(2) + (1.0 - x[0]).powi(2)
    }

    fn grad(x: &[f64]) -> Vec<f64> {
        vec![
            -400.0 * x[0] * (x[1] - x[0] * x[0]) - 2.0 * (1.0 - x[0]),
            200.0 * (x[1] - x[0] * x[0]),
        ]
    }

    fn hessian(x: &[f64]) -> Array2<f64> {
        Array2::from_shape_vec(
            (2, 2),
            vec![
                1200.0 * x[0] * x[0] - 400.0 * x[1] + 2.0,
                -400.0 * x[0],
                -400.0 * x[0],
                200.0,
            ],
        )
        .unwrap()
    }
}

impl EvalModule for Rosenbrock {
    fn info(&self) -> &ModuleInfo {
        &self.info
    }

    fn objcons(&mut self, x: &[f64]) -> Result<(f64, Vec<f64>), Error> {
        Ok((Self::f(x), vec![]))
    }

    fn obj(&mut self, x: &[f64], want_gradient: bool) -> Result<(f64, Option<Vec<f64>>), Error> {
        Ok((Self::f(x), want_gradient.then(|| Self::grad(x))))
    }

    fn cons(
        &mut self,
        _x: &[f64],
        want_jacobian: bool,
    ) -> Result<(Vec<f64>, Option<Array2<f64>>), Error> {
        Ok((vec![], want_jacobian.then(|| Array2::zeros((0, 2)))))
    }

    fn cons_one(
        &mut self,
        _x: &[f64],
        index: usize,
        _want_gradient: bool,
    ) -> Result<(f64, Option<Vec<f64>>), Error> {
        Err(Error::Dimension {
            arg: "index",
            expected: 0,
            got: index,
        })
    }

    fn lagjac(&mut self, x: &[f64], _v: Option<&[f64]>) -> Result<(Vec<f64>, Array2<f64>), Error> {
        Ok((Self::grad(x), Array2::zeros((0, 2))))
    }

    fn hess(&mut self, x: &[f64], _v: Option<&[f64]>) -> Result<Array2<f64>, Error> {
        Ok(Self::hessian(x))
    }

    fn ihess(&mut self, x: &[f64], cons_index: Option<usize>) -> Result<Array2<f64>, Error> {
        match cons_index {
            None => Ok(Self::hessian(x)),
            Some(i) => Err(Error::Dimension {
                arg: "index",
                expected: 0,
                got: i,
            }),
        }
    }
}

// ─────────────────────────────────────────────────────────────
//  ARGLALE: zero objective, m linear equality constraints
// ─────────────────────────────────────────────────────────────

/// c_i(x) = sum_j A_ij x_j - 1 with A_ij = delta(i mod n, j) - 2/m:
/// every constraint is a linear equation, the objective is identically
/// zero, so every Lagrangian Hessian vanishes.
pub fn arglale_info(n: usize, m: usize) -> ModuleInfo {
    ModuleInfo {
        name: "ARGLALE".into(),
        n,
        m,
        x0: vec![1.0; n],
        bl: vec![-INF_BOUND; n],
        bu: vec![INF_BOUND; n],
        v0: vec![0.0; m],
        cl: vec![0.0; m],
        cu: vec![0.0; m],
        equatn: vec![true; m],
        linear: vec![true; m],
        nonlinear_var: vec![false; n],
        vartype: vec![VarType::Real; n],
        nnzh: 0,
        nnzj: n * m,
    }
}

pub struct Arglale {
    info: ModuleInfo,
}

impl Arglale {
    pub fn new(n: usize, m: usize) -> Self {
        Self {
            info: arglale_info(n, m),
        }
    }

    pub fn coeff(&self, i: usize, j: usize) -> f64 {
        let base = -2.0 / self.info.m as f64;
        if i % self.info.n == j {
            base + 1.0
        } else {
            base
        }
    }

    fn constraints(&self, x: &[f64]) -> Vec<f64> {
        (0..self.info.m)
            .map(|i| (0..self.info.n).map(|j| self.coeff(i, j) * x[j]).sum::<f64>() - 1.0)
            .collect()
    }

    fn jacobian(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.info.m, self.info.n), |(i, j)| self.coeff(i, j))
    }
}

impl EvalModule for Arglale {
    fn info(&self) -> &ModuleInfo {
        &self.info
    }

    fn objcons(&mut self, x: &[f64]) -> Result<(f64, Vec<f64>), Error> {
        Ok((0.0, self.constraints(x)))
    }

    fn obj(&mut self, _x: &[f64], want_gradient: bool) -> Result<(f64, Option<Vec<f64>>), Error> {
        Ok((0.0, want_gradient.then(|| vec![0.0; self.info.n])))
    }

    fn cons(
        &mut self,
        x: &[f64],
        want_jacobian: bool,
    ) -> Result<(Vec<f64>, Option<Array2<f64>>), Error> {
        Ok((self.constraints(x), want_jacobian.then(|| self.jacobian())))
    }

    fn cons_one(
        &mut self,
        x: &[f64],
        index: usize,
        want_gradient: bool,
    ) -> Result<(f64, Option<Vec<f64>>), Error> {
        let c = self.constraints(x);
        let g = want_gradient
            .then(|| (0..self.info.n).map(|j| self.coeff(index, j)).collect());
        Ok((c[index], g))
    }

    fn lagjac(&mut self, _x: &[f64], v: Option<&[f64]>) -> Result<(Vec<f64>, Array2<f64>), Error> {
        let jac = self.jacobian();
        let mut g = vec![0.0; self.info.n];
        if let Some(v) = v {
            for i in 0..self.info.m {
                for j in 0..self.info.n {
                    g[j] += v[i] * jac[[i, j]];
                }
            }
        }
        Ok((g, jac))
    }

    fn hess(&mut self, _x: &[f64], _v: Option<&[f64]>) -> Result<Array2<f64>, Error> {
        Ok(Array2::zeros((self.info.n, self.info.n)))
    }

    fn ihess(&mut self, _x: &[f64], _cons_index: Option<usize>) -> Result<Array2<f64>, Error> {
        Ok(Array2::zeros((self.info.n, self.info.n)))
    }
}

// ─────────────────────────────────────────────────────────────
//  TOYCON: mixed constraints, one fixed variable
// ─────────────────────────────────────────────────────────────

/// n = 4 (x3 fixed at 0.5), m = 3 in declaration order:
///   c0: x0^2 + x1 - 1 <= 0      (nonlinear inequality)
///   c1: x1 + x2 + x3 - 1 = 0    (linear equality)
///   c2: x2^2 - x3 = 0           (nonlinear equality)
/// Objective f = x0^2 + 2 x1^2 + 3 x2^2 + 4 x3^2.
pub fn toycon_info() -> ModuleInfo {
    ModuleInfo {
        name: "TOYCON".into(),
        n: 4,
        m: 3,
        x0: vec![0.5, 0.5, 0.5, 0.5],
        bl: vec![-INF_BOUND, -INF_BOUND, -INF_BOUND, 0.5],
        bu: vec![INF_BOUND, INF_BOUND, INF_BOUND, 0.5],
        v0: vec![0.0; 3],
        cl: vec![-INF_BOUND, 0.0, 0.0],
        cu: vec![0.0, 0.0, 0.0],
        equatn: vec![false, true, true],
        linear: vec![false, true, false],
        nonlinear_var: vec![true, false, true, false],
        vartype: vec![VarType::Real; 4],
        nnzh: 4,
        nnzj: 9,
    }
}

pub struct ToyCon {
    info: ModuleInfo,
}

impl ToyCon {
    pub fn new() -> Self {
        Self { info: toycon_info() }
    }

    fn constraints(x: &[f64]) -> Vec<f64> {
        vec![
            x[0] * x[0] + x[1] - 1.0,
            x[1] + x[2] + x[3] - 1.0,
            x[2] * x[2] - x[3],
        ]
    }

    fn jacobian(x: &[f64]) -> Array2<f64> {
        Array2::from_shape_vec(
            (3, 4),
            vec![
                2.0 * x[0], 1.0, 0.0, 0.0,
                0.0, 1.0, 1.0, 1.0,
                0.0, 0.0, 2.0 * x[2], -1.0,
            ],
        )
        .unwrap()
    }

    fn obj_grad(x: &[f64]) -> Vec<f64> {
        vec![2.0 * x[0], 4.0 * x[1], 6.0 * x[2], 8.0 * x[3]]
    }

    fn obj_hess() -> Array2<f64> {
        Array2::from_diag(&ndarray::arr1(&[2.0, 4.0, 6.0, 8.0]))
    }

    fn con_hess(index: usize) -> Array2<f64> {
        let mut h = Array2::zeros((4, 4));
        match index {
            0 => h[[0, 0]] = 2.0,
            2 => h[[2, 2]] = 2.0,
            _ => {}
        }
        h
    }
}

impl EvalModule for ToyCon {
    fn info(&self) -> &ModuleInfo {
        &self.info
    }

    fn objcons(&mut self, x: &[f64]) -> Result<(f64, Vec<f64>), Error> {
        let f = x[0] * x[0] + 2.0 * x[1] * x[1] + 3.0 * x[2] * x[2] + 4.0 * x[3] * x[3];
        Ok((f, Self::constraints(x)))
    }

    fn obj(&mut self, x: &[f64], want_gradient: bool) -> Result<(f64, Option<Vec<f64>>), Error> {
        let (f, _) = self.objcons(x)?;
        Ok((f, want_gradient.then(|| Self::obj_grad(x))))
    }

    fn cons(
        &mut self,
        x: &[f64],
        want_jacobian: bool,
    ) -> Result<(Vec<f64>, Option<Array2<f64>>), Error> {
        Ok((
            Self::constraints(x),
            want_jacobian.then(|| Self::jacobian(x)),
        ))
    }

    fn cons_one(
        &mut self,
        x: &[f64],
        index: usize,
        want_gradient: bool,
    ) -> Result<(f64, Option<Vec<f64>>), Error> {
        let c = Self::constraints(x);
        let jac = Self::jacobian(x);
        let g = want_gradient.then(|| jac.row(index).to_vec());
        Ok((c[index], g))
    }

    fn lagjac(&mut self, x: &[f64], v: Option<&[f64]>) -> Result<(Vec<f64>, Array2<f64>), Error> {
        let jac = Self::jacobian(x);
        let mut g = Self::obj_grad(x);
        if let Some(v) = v {
            for i in 0..3 {
                for j in 0..4 {
                    g[j] += v[i] * jac[[i, j]];
                }
            }
        }
        Ok((g, jac))
    }

    fn hess(&mut self, _x: &[f64], v: Option<&[f64]>) -> Result<Array2<f64>, Error> {
        let mut h = Self::obj_hess();
        if let Some(v) = v {
            for (i, &vi) in v.iter().enumerate() {
                h = h + Self::con_hess(i).mapv(|e| e * vi);
            }
        }
        Ok(h)
    }

    fn ihess(&mut self, _x: &[f64], cons_index: Option<usize>) -> Result<Array2<f64>, Error> {
        Ok(match cons_index {
            None => Self::obj_hess(),
            Some(i) => Self::con_hess(i),
        })
    }
}

// ─────────────────────────────────────────────────────────────
//  Stub toolchain + binder
// ─────────────────────────────────────────────────────────────

pub const MODULE_JSON: &str = "module.json";

/// Toolchain double: "builds" by serializing the problem's metadata record
/// into the build directory, and counts how many builds actually ran.
#[derive(Clone, Default)]
pub struct StubToolchain {
    builds: Arc<AtomicUsize>,
}

impl StubToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    fn info_for(desc: &ProblemDescriptor) -> Result<ModuleInfo, Error> {
        match desc.name() {
            "ROSENBR" => Ok(rosenbrock_info()),
            "TOYCON" => Ok(toycon_info()),
            "ARGLALE" => {
                let mut n = 100usize;
                let mut m = 200usize;
                for (key, value) in desc.sif_params() {
                    match (key.as_str(), value.to_string().parse::<usize>()) {
                        ("N", Ok(v)) => n = v,
                        ("M", Ok(v)) => m = v,
                        _ => {
                            return Err(Error::Parameter {
                                diagnostic: format!("{key} does not appear to be settable"),
                            })
                        }
                    }
                }
                Ok(arglale_info(n, m))
            }
            other => Err(Error::Build {
                reason: format!("unknown problem {other}"),
                output: String::new(),
            }),
        }
    }
}

impl Toolchain for StubToolchain {
    fn id(&self) -> &str {
        "stub"
    }

    fn build(&self, desc: &ProblemDescriptor, build_dir: &Path) -> Result<BuiltModule, Error> {
        let info = Self::info_for(desc)?;
        let json = serde_json::to_vec(&info).map_err(Error::Meta)?;
        std::fs::write(build_dir.join(MODULE_JSON), json)?;
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(BuiltModule {
            module: MODULE_JSON.into(),
        })
    }

    fn show_params(&self, _name: &str) -> Result<String, Error> {
        Ok(String::new())
    }
}

/// Binder double: reads the serialized metadata back and hands out the
/// matching analytic module.
#[derive(Default)]
pub struct StubBinder;

impl Binder for StubBinder {
    fn bind(&self, entry: &CacheEntry) -> Result<Box<dyn EvalModule>, Error> {
        let raw = std::fs::read(entry.dir.join(&entry.meta.module))?;
        let info: ModuleInfo = serde_json::from_slice(&raw)?;
        match info.name.as_str() {
            "ROSENBR" => Ok(Box::new(Rosenbrock::new())),
            "TOYCON" => Ok(Box::new(ToyCon::new())),
            "ARGLALE" => Ok(Box::new(Arglale::new(info.n, info.m))),
            other => Err(Error::Load(format!("no analytic module for {other}"))),
        }
    }
}
