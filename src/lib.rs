//! **siftest** — build cache and uniform evaluation interface for
//! SIF-decoded optimization test problems.
//!
//! This crate implements the complete import-and-evaluate pipeline:
//!
//! 1. **Descriptor** (`descriptor`): canonical problem identity + fingerprint.
//! 2. **Cache** (`cache`): fingerprint-keyed artifact store, compile-or-fetch
//!    with atomic publish.
//! 3. **Toolchain** (`toolchain`): the external decoder/compiler behind a trait.
//! 4. **Module & binder** (`module`): the bound native evaluation module.
//! 5. **Ordering** (`ordering`): constraint/variable permutations and
//!    fixed-variable elimination.
//! 6. **Loader** (`loader`) and **handle** (`problem`): bind an artifact and
//!    evaluate through the presented index spaces.

pub mod cache;
pub mod descriptor;
pub mod loader;
pub mod module;
pub mod ordering;
pub mod problem;
pub mod toolchain;
pub mod types;

pub use cache::{ArtifactMeta, CacheEntry, CacheManager};
pub use descriptor::ProblemDescriptor;
pub use loader::load_handle;
pub use module::{Binder, DylibBinder, DylibModule, EvalModule, ModuleInfo, VarType, ABI_VERSION};
pub use ordering::{OrderingFlags, OrderingMap, FIXED_VAR_TOL};
pub use problem::ProblemHandle;
pub use toolchain::{
    available_params, parse_show_output, BuiltModule, SifDecode, SifParamInfo, Toolchain,
};
pub use types::{Error, ParamValue, Report};
