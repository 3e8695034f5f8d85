//! Package descriptor (`pkg.toml`) and package syscfg (`syscfg.toml`) files
//!
//! Descriptors are TOML written with dotted keys (`pkg.name = "..."`). The
//! known `pkg.*` fields are typed; any `pkg.<x>flags` key is accepted as a
//! free-form list of build flags. Anything else is rejected at load time.

use crate::package::{parse_version, Dependency, Package, PackageDesc, PackageType};
use crate::{PackageError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// Descriptor file name inside every package directory
pub const PACKAGE_FILE_NAME: &str = "pkg.toml";

/// Optional per-package settings file
pub const SYSCFG_FILE_NAME: &str = "syscfg.toml";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DescriptorFile {
    #[serde(default)]
    pkg: PkgSection,
    #[serde(default)]
    target: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct PkgSection {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    vers: Option<String>,
    #[serde(default, rename = "type")]
    package_type: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    homepage: Option<String>,
    #[serde(default)]
    repository: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    deps: Vec<String>,
    #[serde(default)]
    apis: Vec<String>,
    #[serde(default)]
    req_apis: Vec<String>,
    #[serde(default)]
    init: BTreeMap<String, i32>,
    #[serde(flatten)]
    extra: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SyscfgFile {
    #[serde(default)]
    syscfg: SyscfgSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SyscfgSection {
    #[serde(default)]
    defs: BTreeMap<String, DefEntry>,
    #[serde(default)]
    vals: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DefEntry {
    value: toml::Value,
    #[serde(default)]
    description: String,
}

impl Package {
    /// Load the package rooted at `dir`
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let path = dir.join(PACKAGE_FILE_NAME);
        tracing::debug!("Loading package descriptor {}", path.display());

        let content = fs::read_to_string(&path).map_err(|e| PackageError::io(&path, e))?;
        let mut pkg = parse_descriptor(&content, dir, &path)?;

        let syscfg_path = dir.join(SYSCFG_FILE_NAME);
        if syscfg_path.is_file() {
            let content = fs::read_to_string(&syscfg_path)
                .map_err(|e| PackageError::io(&syscfg_path, e))?;
            apply_syscfg(&mut pkg, &content, &syscfg_path)?;
        }

        Ok(pkg)
    }

    /// Path of this package's descriptor file
    pub fn descriptor_path(&self) -> PathBuf {
        self.base_path().join(PACKAGE_FILE_NAME)
    }

    /// Path of this package's settings file
    pub fn syscfg_path(&self) -> PathBuf {
        self.base_path().join(SYSCFG_FILE_NAME)
    }

    /// Write the descriptor back to `pkg.toml` in a fixed field order, and
    /// the package settings to `syscfg.toml`
    pub fn save(&self) -> Result<()> {
        let dir = self.base_path();
        fs::create_dir_all(dir).map_err(|e| PackageError::io(dir, e))?;

        let path = self.descriptor_path();
        tracing::debug!("Writing package descriptor {}", path.display());
        fs::write(&path, render_descriptor(self)).map_err(|e| PackageError::io(&path, e))?;

        self.save_syscfg()
    }

    /// Write only `syscfg.toml`. A package without settings has no such
    /// file; a stale one is removed.
    pub fn save_syscfg(&self) -> Result<()> {
        let path = self.syscfg_path();

        if self.syscfg_defs().is_empty() && self.syscfg_vals().is_empty() {
            return match fs::remove_file(&path) {
                Ok(()) => {
                    tracing::debug!("Removed empty package syscfg {}", path.display());
                    Ok(())
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(PackageError::io(&path, e)),
            };
        }

        let dir = self.base_path();
        fs::create_dir_all(dir).map_err(|e| PackageError::io(dir, e))?;
        tracing::debug!("Writing package syscfg {}", path.display());
        fs::write(&path, render_syscfg(self)).map_err(|e| PackageError::io(&path, e))
    }
}

/// Parse descriptor text for a package located in `dir`
pub fn parse_descriptor(content: &str, dir: &Path, file: &Path) -> Result<Package> {
    let raw: DescriptorFile = toml::from_str(content).map_err(|error| PackageError::ParseError {
        file: file.to_path_buf(),
        error,
    })?;
    let section = raw.pkg;

    let name = section
        .name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| PackageError::MissingField {
            field: "pkg.name".to_string(),
            file: file.to_path_buf(),
        })?;

    let mut pkg = Package::new(name, dir);
    pkg.set_type(PackageType::from_tag(
        section.package_type.as_deref().unwrap_or_default(),
    ));
    if let Some(vers) = section.vers.as_deref() {
        pkg.set_version(parse_version(vers)?);
    }
    pkg.set_desc(PackageDesc {
        description: section.description.unwrap_or_default(),
        author: section.author.unwrap_or_default(),
        homepage: section.homepage.unwrap_or_default(),
        keywords: section.keywords,
    });
    pkg.set_repository(section.repository.unwrap_or_default());

    for dep in &section.deps {
        pkg.add_dep(dep.parse::<Dependency>()?);
    }
    for api in section.apis {
        pkg.add_api(api);
    }
    for api in section.req_apis {
        pkg.add_req_api(api);
    }
    for (entry_point, stage) in section.init {
        pkg.add_init(entry_point, stage);
    }

    for (key, value) in section.extra {
        if !key.ends_with("flags") {
            return Err(PackageError::UnknownField {
                field: format!("pkg.{}", key),
                file: file.to_path_buf(),
            });
        }
        pkg.set_flags(key.clone(), string_list(&format!("pkg.{}", key), value)?);
    }

    for (key, value) in raw.target {
        pkg.set_target_var(key, value);
    }

    Ok(pkg)
}

fn apply_syscfg(pkg: &mut Package, content: &str, file: &Path) -> Result<()> {
    let raw: SyscfgFile = toml::from_str(content).map_err(|error| PackageError::ParseError {
        file: file.to_path_buf(),
        error,
    })?;

    for (name, def) in raw.syscfg.defs {
        let value = setting_value(&format!("syscfg.defs.{}", name), &def.value)?;
        pkg.add_syscfg_def(name, value, def.description);
    }
    for (name, value) in raw.syscfg.vals {
        let value = setting_value(&format!("syscfg.vals.{}", name), &value)?;
        pkg.add_syscfg_val(name, value);
    }

    Ok(())
}

/// Convert a TOML setting value to its string form.
///
/// Booleans become `1`/`0`, numbers are printed as written.
pub fn setting_value(field: &str, value: &toml::Value) -> Result<String> {
    match value {
        toml::Value::String(s) => Ok(s.clone()),
        toml::Value::Integer(i) => Ok(i.to_string()),
        toml::Value::Float(f) => Ok(f.to_string()),
        toml::Value::Boolean(b) => Ok(if *b { "1" } else { "0" }.to_string()),
        other => Err(PackageError::invalid_field(
            field,
            format!("expected a string, number or boolean, found {}", other.type_str()),
        )),
    }
}

fn string_list(field: &str, value: toml::Value) -> Result<Vec<String>> {
    let toml::Value::Array(items) = value else {
        return Err(PackageError::invalid_field(field, "expected a list of strings"));
    };

    items
        .into_iter()
        .map(|item| match item {
            toml::Value::String(s) => Ok(s),
            other => Err(PackageError::invalid_field(
                field,
                format!("expected a string, found {}", other.type_str()),
            )),
        })
        .collect()
}

/// Quote a TOML string
pub fn toml_string(s: &str) -> String {
    toml::Value::String(s.to_string()).to_string()
}

/// Render a TOML key, quoting it unless it is a valid bare key
pub fn toml_key(key: &str) -> String {
    let bare = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if bare {
        key.to_string()
    } else {
        toml_string(key)
    }
}

fn toml_list(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|s| toml_string(s)).collect();
    format!("[{}]", quoted.join(", "))
}

/// Render a package descriptor.
///
/// Field order is fixed so regenerated descriptors diff cleanly.
pub fn render_descriptor(pkg: &Package) -> String {
    let mut out = String::new();
    let desc = pkg.desc();

    let _ = writeln!(out, "### Package: {}", pkg.name());
    out.push('\n');
    let _ = writeln!(out, "pkg.name = {}", toml_string(pkg.name()));
    let _ = writeln!(out, "pkg.vers = {}", toml_string(&pkg.version().to_string()));
    let _ = writeln!(out, "pkg.type = {}", toml_string(pkg.package_type().as_str()));
    let _ = writeln!(out, "pkg.description = {}", toml_string(&desc.description));
    let _ = writeln!(out, "pkg.author = {}", toml_string(&desc.author));
    let _ = writeln!(out, "pkg.homepage = {}", toml_string(&desc.homepage));
    let _ = writeln!(out, "pkg.repository = {}", toml_string(pkg.repository()));

    if !desc.keywords.is_empty() {
        let _ = writeln!(out, "pkg.keywords = {}", toml_list(&desc.keywords));
    }
    if !pkg.deps().is_empty() {
        let deps: Vec<String> = pkg.deps().iter().map(ToString::to_string).collect();
        let _ = writeln!(out, "pkg.deps = {}", toml_list(&deps));
    }
    if !pkg.apis().is_empty() {
        let _ = writeln!(out, "pkg.apis = {}", toml_list(pkg.apis()));
    }
    if !pkg.req_apis().is_empty() {
        let _ = writeln!(out, "pkg.req_apis = {}", toml_list(pkg.req_apis()));
    }
    if !pkg.init().is_empty() {
        let entries: Vec<String> = pkg
            .init()
            .iter()
            .map(|(name, stage)| format!("{} = {}", toml_key(name), stage))
            .collect();
        let _ = writeln!(out, "pkg.init = {{ {} }}", entries.join(", "));
    }
    for (key, flags) in pkg.flags() {
        let _ = writeln!(out, "pkg.{} = {}", toml_key(key), toml_list(flags));
    }

    if !pkg.target_vars().is_empty() {
        out.push('\n');
        for (key, value) in pkg.target_vars() {
            let _ = writeln!(out, "target.{} = {}", toml_key(key), toml_string(value));
        }
    }

    out
}

/// Render a package's settings file: every definition as its own
/// `[syscfg.defs.<NAME>]` table in name order, then `[syscfg.vals]`.
pub fn render_syscfg(pkg: &Package) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "### Syscfg: {}", pkg.name());

    for (name, def) in pkg.syscfg_defs() {
        out.push('\n');
        let _ = writeln!(out, "[syscfg.defs.{}]", toml_key(name));
        let _ = writeln!(out, "description = {}", toml_string(&def.description));
        let _ = writeln!(out, "value = {}", toml_string(&def.value));
    }

    if !pkg.syscfg_vals().is_empty() {
        out.push('\n');
        out.push_str("[syscfg.vals]\n");
        for (name, value) in pkg.syscfg_vals() {
            let _ = writeln!(out, "{} = {}", toml_key(name), toml_string(value));
        }
    }

    out
}
