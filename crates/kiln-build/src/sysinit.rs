//! Stage-ordered system initialization code
//!
//! Every package may register init functions, each at an integer stage. The
//! generated C source declares all of them and calls them stage by stage,
//! inside a function guarded for the loader or the app half of a split
//! image. Output is a pure function of the resolution so unchanged inputs
//! regenerate identical bytes, and [`ensure_written`] leaves such files
//! untouched.

use crate::error::{BuildError, BuildResult};
use kiln_package::{Package, Resolution, Variant};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// Header comment of every generated source file
pub const GENERATED_PREAMBLE: &str = concat!(
    "/**\n * This file was generated by kiln (version: ",
    env!("CARGO_PKG_VERSION"),
    ").\n */\n\n"
);

/// An init function registered by a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitFunc {
    pub stage: i32,
    pub name: String,
    pub package: String,
}

/// Stage number -> init functions in call order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageMap {
    stages: BTreeMap<i32, Vec<InitFunc>>,
}

impl StageMap {
    /// Collect init functions from `packages`.
    ///
    /// Within a stage, calls follow the order of `packages`, then function
    /// name. A function name registered by two packages is an error.
    pub fn build<'a, I>(packages: I) -> BuildResult<Self>
    where
        I: IntoIterator<Item = &'a Package>,
    {
        let mut owners: BTreeMap<&'a str, &'a str> = BTreeMap::new();
        let mut stages: BTreeMap<i32, Vec<InitFunc>> = BTreeMap::new();

        for pkg in packages {
            for (name, stage) in pkg.init() {
                if let Some(first) = owners.insert(name.as_str(), pkg.name()) {
                    return Err(BuildError::DuplicateEntryPoint {
                        name: name.clone(),
                        first: first.to_string(),
                        second: pkg.name().to_string(),
                    });
                }

                stages.entry(*stage).or_default().push(InitFunc {
                    stage: *stage,
                    name: name.clone(),
                    package: pkg.name().to_string(),
                });
            }
        }

        Ok(Self { stages })
    }

    /// Stages in ascending order
    pub fn stages(&self) -> impl Iterator<Item = (i32, &[InitFunc])> {
        self.stages
            .iter()
            .map(|(stage, funcs)| (*stage, funcs.as_slice()))
    }

    /// Total number of init functions
    pub fn len(&self) -> usize {
        self.stages.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

fn function_name(variant: Variant) -> &'static str {
    match variant {
        Variant::Loader => "sysinit_loader",
        Variant::App => "sysinit_app",
    }
}

fn guard(variant: Variant) -> &'static str {
    match variant {
        Variant::Loader => "#if SPLIT_LOADER",
        Variant::App => "#if !SPLIT_LOADER",
    }
}

/// Render the init source for one variant of a resolved target
pub fn generate(res: &Resolution, variant: Variant) -> BuildResult<Vec<u8>> {
    let stage_map = StageMap::build(res.ordered().map(|rpkg| rpkg.package().as_ref()))?;

    let mut out = String::from(GENERATED_PREAMBLE);
    let _ = write!(out, "{}\n\n", guard(variant));

    // Prototypes by owning package name
    for rpkg in res.packages() {
        for name in rpkg.package().init().keys() {
            let _ = writeln!(out, "void {}(void);", name);
        }
    }

    let _ = write!(out, "\nvoid\n{}(void)\n{{\n", function_name(variant));
    for (stage, funcs) in stage_map.stages() {
        out.push('\n');
        let _ = writeln!(out, "    /*** Stage {} */", stage);
        for (i, func) in funcs.iter().enumerate() {
            let _ = writeln!(out, "    /* {}.{}: {} */", stage, i, func.package);
            let _ = writeln!(out, "    {}();", func.name);
        }
    }
    out.push_str("}\n\n#endif\n");

    Ok(out.into_bytes())
}

/// Write `contents` to `path` unless the file already holds exactly those
/// bytes. Returns whether the file was written.
pub fn ensure_written(contents: &[u8], path: &Path) -> BuildResult<bool> {
    match fs::read(path) {
        Ok(existing) if existing == contents => {
            tracing::debug!("{} unchanged; not writing", path.display());
            return Ok(false);
        }
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(BuildError::io(path, e)),
    }

    tracing::debug!("{} changed; writing", path.display());
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
    }
    fs::write(path, contents).map_err(|e| BuildError::io(path, e))?;
    Ok(true)
}

/// `<dir>/<target leaf name>-sysinit-<variant>.c`
pub fn sysinit_path(dir: &Path, target: &str, variant: Variant) -> PathBuf {
    let leaf = target.rsplit('/').next().unwrap_or(target);
    dir.join(format!("{}-sysinit-{}.c", leaf, variant))
}
