//! The external decoder/compiler toolchain, behind a trait.
//!
//! The toolchain is an opaque producer: it turns a descriptor into a
//! loadable evaluation module inside a build directory the cache manager
//! hands it. [`SifDecode`] is the real implementation (`sifdecoder` +
//! `gfortran`); tests substitute their own.

use crate::descriptor::ProblemDescriptor;
use crate::types::{Error, ParamValue};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

// ─────────────────────────────────────────────────────────────
//  Trait
// ─────────────────────────────────────────────────────────────

/// Result of a successful toolchain build.
#[derive(Debug, Clone)]
pub struct BuiltModule {
    /// Path of the loadable module, relative to the build directory.
    pub module: PathBuf,
}

/// An opaque decoder/compiler toolchain.
pub trait Toolchain {
    /// Short identifier recorded in artifact metadata.
    fn id(&self) -> &str;

    /// Decode and compile the descriptor's problem into `build_dir`.
    /// Everything the built module needs at load time must land inside
    /// `build_dir`; the cache manager publishes the directory atomically.
    fn build(&self, desc: &ProblemDescriptor, build_dir: &Path) -> Result<BuiltModule, Error>;

    /// Raw decoder output describing the problem's settable parameters.
    fn show_params(&self, name: &str) -> Result<String, Error>;
}

// ─────────────────────────────────────────────────────────────
//  SIFDecode implementation
// ─────────────────────────────────────────────────────────────

/// The standard toolchain: `sifdecoder` emits Fortran sources, `gfortran`
/// compiles them with `-fPIC`, and the objects are linked into a shared
/// object together with the evaluation shim.
///
/// Each command runs with `current_dir` set to the build directory; the
/// process working directory is never touched.
#[derive(Debug, Clone)]
pub struct SifDecode {
    sifdecoder: PathBuf,
    fortran: PathBuf,
    /// Pre-built object implementing the `sif_*` entry points, linked into
    /// every module.
    shim_object: Option<PathBuf>,
}

impl SifDecode {
    pub fn new(sifdecoder: impl Into<PathBuf>) -> Self {
        Self {
            sifdecoder: sifdecoder.into(),
            fortran: PathBuf::from("gfortran"),
            shim_object: None,
        }
    }

    /// Resolve the decoder from `$SIFDECODER`, falling back to `sifdecoder`
    /// on the search path.
    pub fn from_env() -> Self {
        let decoder = std::env::var_os("SIFDECODER")
            .map_or_else(|| PathBuf::from("sifdecoder"), PathBuf::from);
        Self::new(decoder)
    }

    pub fn fortran(mut self, compiler: impl Into<PathBuf>) -> Self {
        self.fortran = compiler.into();
        self
    }

    pub fn shim_object(mut self, object: impl Into<PathBuf>) -> Self {
        self.shim_object = Some(object.into());
        self
    }

    /// Run a toolchain command in `dir`, capturing stdout and stderr
    /// together, mirroring what a terminal user would see.
    fn run(&self, mut cmd: Command, dir: &Path, what: &str) -> Result<String, Error> {
        cmd.current_dir(dir);
        let out = cmd.output().map_err(|e| Error::Build {
            reason: format!("failed to spawn {what}: {e}"),
            output: String::new(),
        })?;
        let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&out.stderr));
        if !out.status.success() {
            return Err(Error::Build {
                reason: format!("{what} exited with {}", out.status),
                output: text,
            });
        }
        Ok(text)
    }
}

impl Toolchain for SifDecode {
    fn id(&self) -> &str {
        "sifdecode"
    }

    fn build(&self, desc: &ProblemDescriptor, build_dir: &Path) -> Result<BuiltModule, Error> {
        // 1. Decode: sifdecoder [-param k=v]... [options]... NAME
        let mut cmd = Command::new(&self.sifdecoder);
        for (key, value) in desc.sif_params() {
            cmd.arg("-param").arg(format!("{key}={value}"));
        }
        cmd.args(desc.sif_options());
        cmd.arg(desc.name());
        let text = self.run(cmd, build_dir, "sifdecoder")?;

        let mut param_error = None;
        for line in text.lines() {
            if desc.is_quiet() {
                debug!(target: "siftest::toolchain", "{line}");
            } else {
                info!(target: "siftest::toolchain", "{line}");
            }
            // The decoder reports out-of-domain parameters as warnings and
            // silently decodes with defaults instead; surface them as hard
            // parameter errors, diagnostic text kept verbatim.
            if line.contains("WARNING") {
                param_error = Some(
                    line.replace("WARNING: ", "")
                        .replace(" -- skipping", ""),
                );
            }
        }
        if let Some(diagnostic) = param_error {
            return Err(Error::Parameter { diagnostic });
        }

        // 2. Compile every decoded Fortran source.
        let sources = files_with_extension(build_dir, "f")?;
        if sources.is_empty() {
            return Err(Error::Build {
                reason: format!("sifdecoder produced no Fortran sources for {}", desc.name()),
                output: text,
            });
        }
        for src in &sources {
            let mut cc = Command::new(&self.fortran);
            cc.arg("-fPIC").arg("-c").arg(src);
            self.run(cc, build_dir, "gfortran")?;
        }

        // 3. Link objects (plus the shim) into the loadable module.
        let module = PathBuf::from("module.so");
        let objects = files_with_extension(build_dir, "o")?;
        let mut ld = Command::new(&self.fortran);
        ld.arg("-shared").args(&objects);
        if let Some(shim) = &self.shim_object {
            ld.arg(shim);
        }
        ld.arg("-lcutest").arg("-o").arg(&module);
        self.run(ld, build_dir, "link")?;

        Ok(BuiltModule { module })
    }

    fn show_params(&self, name: &str) -> Result<String, Error> {
        let out = Command::new(&self.sifdecoder)
            .arg("-show")
            .arg(name)
            .output()
            .map_err(|e| Error::Build {
                reason: format!("failed to spawn sifdecoder -show: {e}"),
                output: String::new(),
            })?;
        let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&out.stderr));
        Ok(text)
    }
}

/// File names (relative) in `dir` with the given extension, sorted for a
/// deterministic compile/link order.
fn files_with_extension(dir: &Path, ext: &str) -> Result<Vec<PathBuf>, Error> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().is_some_and(|e| e == ext) {
            found.push(PathBuf::from(entry.file_name()));
        }
    }
    found.sort();
    Ok(found)
}

// ─────────────────────────────────────────────────────────────
//  Parameter discovery
// ─────────────────────────────────────────────────────────────

/// One settable parameter reported by `sifdecoder -show`.
#[derive(Debug, Clone, PartialEq)]
pub struct SifParamInfo {
    pub name: String,
    pub value: ParamValue,
    pub comment: Option<String>,
    pub is_default: bool,
}

/// Discover a problem's settable parameters. This is the resolver-side
/// query surface consumed by external catalogs.
pub fn available_params(
    toolchain: &dyn Toolchain,
    name: &str,
) -> Result<Vec<SifParamInfo>, Error> {
    Ok(parse_show_output(&toolchain.show_params(name)?))
}

/// Parse `sifdecoder -show` output.
///
/// Lines look like
/// `N=100 (IE) uncommented` or
/// `M=200 (IE) comment: number of equations  default value`.
pub fn parse_show_output(text: &str) -> Vec<SifParamInfo> {
    let mut params = Vec::new();
    for line in text.lines() {
        if !line.contains('=') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let Some(assign) = fields.next() else { continue };
        let Some((name, raw_value)) = assign.split_once('=') else {
            continue;
        };
        let value = match fields.next() {
            Some("(IE)") => match raw_value.parse::<i64>() {
                Ok(v) => ParamValue::Int(v),
                Err(_) => continue,
            },
            Some("(RE)") => match raw_value.parse::<f64>() {
                Ok(v) => ParamValue::Real(v),
                Err(_) => continue,
            },
            other => {
                warn!(
                    "skipping parameter {name} with unrecognised type {:?}",
                    other
                );
                continue;
            }
        };
        let comment = if line.contains("uncommented") {
            None
        } else {
            line.find("comment:").map(|at| {
                line[at + "comment:".len()..]
                    .replace("default value", "")
                    .trim()
                    .to_owned()
            })
        };
        params.push(SifParamInfo {
            name: name.to_owned(),
            value,
            comment,
            is_default: line.contains("default value"),
        });
    }
    params
}
