//! Package model: identity, type, declared dependencies and capabilities

use crate::{hash, PackageError, Result};
use semver::Version;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

/// Package type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum PackageType {
    #[default]
    Lib,
    Bsp,
    Sdk,
    App,
    Unittest,
    Target,
    Compiler,
}

impl PackageType {
    /// Every known type with its descriptor tag
    pub const TAGS: &'static [(PackageType, &'static str)] = &[
        (PackageType::Lib, "lib"),
        (PackageType::Bsp, "bsp"),
        (PackageType::Sdk, "sdk"),
        (PackageType::App, "app"),
        (PackageType::Unittest, "unittest"),
        (PackageType::Target, "target"),
        (PackageType::Compiler, "compiler"),
    ];

    /// Map a descriptor tag to a type.
    ///
    /// Unknown tags fall back to [`PackageType::Lib`].
    pub fn from_tag(tag: &str) -> Self {
        Self::TAGS
            .iter()
            .find(|(_, name)| *name == tag)
            .map(|(ty, _)| *ty)
            .unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PackageType::Lib => "lib",
            PackageType::Bsp => "bsp",
            PackageType::Sdk => "sdk",
            PackageType::App => "app",
            PackageType::Unittest => "unittest",
            PackageType::Target => "target",
            PackageType::Compiler => "compiler",
        }
    }

    /// Configuration precedence: a package may silently override settings
    /// contributed by packages of a lower priority.
    pub fn priority(&self) -> u8 {
        match self {
            PackageType::Lib | PackageType::Sdk | PackageType::Compiler => 0,
            PackageType::Bsp => 1,
            PackageType::App | PackageType::Unittest => 2,
            PackageType::Target => 3,
        }
    }
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build variant of a split image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Variant {
    Loader,
    App,
}

impl Variant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Loader => "loader",
            Variant::App => "app",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variant {
    type Err = PackageError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "loader" => Ok(Variant::Loader),
            "app" => Ok(Variant::App),
            other => Err(PackageError::invalid_field(
                "variant",
                format!("unknown build variant '{}'", other),
            )),
        }
    }
}

/// Reference to another package, optionally limited to one build variant.
///
/// Written as `name` or `name:variant`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Dependency {
    pub name: String,
    pub variant: Option<Variant>,
}

impl Dependency {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variant: None,
        }
    }

    pub fn for_variant(name: impl Into<String>, variant: Variant) -> Self {
        Self {
            name: name.into(),
            variant: Some(variant),
        }
    }

    /// Whether this dependency is followed when resolving for `variant`.
    /// Without a variant every dependency is followed.
    pub fn applies_to(&self, variant: Option<Variant>) -> bool {
        match (self.variant, variant) {
            (None, _) | (Some(_), None) => true,
            (Some(wanted), Some(active)) => wanted == active,
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.variant {
            Some(v) => write!(f, "{}:{}", self.name, v),
            None => f.write_str(&self.name),
        }
    }
}

impl FromStr for Dependency {
    type Err = PackageError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (name, variant) = match s.rsplit_once(':') {
            Some((name, variant)) => (name, Some(variant.parse::<Variant>()?)),
            None => (s, None),
        };

        if name.is_empty() {
            return Err(PackageError::invalid_field(
                "pkg.deps",
                "dependency name cannot be empty",
            ));
        }

        Ok(Self {
            name: name.to_string(),
            variant,
        })
    }
}

/// Free-text description block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageDesc {
    pub description: String,
    pub author: String,
    pub homepage: String,
    pub keywords: Vec<String>,
}

/// A setting definition: default value plus documentation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingDef {
    pub value: String,
    pub description: String,
}

/// A package on disk
#[derive(Debug)]
pub struct Package {
    name: String,
    base_path: PathBuf,
    package_type: PackageType,
    version: Version,
    desc: PackageDesc,
    repository: String,
    deps: Vec<Dependency>,
    apis: Vec<String>,
    req_apis: Vec<String>,
    init: BTreeMap<String, i32>,
    flags: BTreeMap<String, Vec<String>>,
    target_vars: BTreeMap<String, String>,
    syscfg_defs: BTreeMap<String, SettingDef>,
    syscfg_vals: BTreeMap<String, String>,
    hash: OnceLock<String>,
}

impl Clone for Package {
    /// Clones drop the cached hash; the copy may end up in a new directory.
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            base_path: self.base_path.clone(),
            package_type: self.package_type,
            version: self.version.clone(),
            desc: self.desc.clone(),
            repository: self.repository.clone(),
            deps: self.deps.clone(),
            apis: self.apis.clone(),
            req_apis: self.req_apis.clone(),
            init: self.init.clone(),
            flags: self.flags.clone(),
            target_vars: self.target_vars.clone(),
            syscfg_defs: self.syscfg_defs.clone(),
            syscfg_vals: self.syscfg_vals.clone(),
            hash: OnceLock::new(),
        }
    }
}

impl PartialEq for Package {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.base_path == other.base_path
            && self.package_type == other.package_type
            && self.version == other.version
            && self.desc == other.desc
            && self.repository == other.repository
            && self.deps == other.deps
            && self.apis == other.apis
            && self.req_apis == other.req_apis
            && self.init == other.init
            && self.flags == other.flags
            && self.target_vars == other.target_vars
            && self.syscfg_defs == other.syscfg_defs
            && self.syscfg_vals == other.syscfg_vals
    }
}

impl Package {
    /// Create an empty library package rooted at `base_path`
    pub fn new(name: impl Into<String>, base_path: impl AsRef<Path>) -> Self {
        Self {
            name: name.into(),
            base_path: normalize(base_path.as_ref()),
            package_type: PackageType::Lib,
            version: Version::new(0, 0, 0),
            desc: PackageDesc::default(),
            repository: String::new(),
            deps: Vec::new(),
            apis: Vec::new(),
            req_apis: Vec::new(),
            init: BTreeMap::new(),
            flags: BTreeMap::new(),
            target_vars: BTreeMap::new(),
            syscfg_defs: BTreeMap::new(),
            syscfg_vals: BTreeMap::new(),
            hash: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last path component of the name (`targets/blinky` -> `blinky`)
    pub fn short_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn package_type(&self) -> PackageType {
        self.package_type
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn desc(&self) -> &PackageDesc {
        &self.desc
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn deps(&self) -> &[Dependency] {
        &self.deps
    }

    /// Capabilities this package exports
    pub fn apis(&self) -> &[String] {
        &self.apis
    }

    /// Capabilities this package requires
    pub fn req_apis(&self) -> &[String] {
        &self.req_apis
    }

    /// Initialization entry points mapped to their stage
    pub fn init(&self) -> &BTreeMap<String, i32> {
        &self.init
    }

    /// Free-form flag lists keyed by descriptor key (`cflags`, `lflags`, ...)
    pub fn flags(&self) -> &BTreeMap<String, Vec<String>> {
        &self.flags
    }

    pub fn flag_list(&self, key: &str) -> &[String] {
        self.flags.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn target_vars(&self) -> &BTreeMap<String, String> {
        &self.target_vars
    }

    pub fn syscfg_defs(&self) -> &BTreeMap<String, SettingDef> {
        &self.syscfg_defs
    }

    pub fn syscfg_vals(&self) -> &BTreeMap<String, String> {
        &self.syscfg_vals
    }

    pub fn has_dep(&self, dep: &Dependency) -> bool {
        self.deps.iter().any(|d| d.to_string() == dep.to_string())
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_base_path(&mut self, base_path: impl AsRef<Path>) {
        self.base_path = normalize(base_path.as_ref());
        self.hash = OnceLock::new();
    }

    pub fn set_type(&mut self, package_type: PackageType) {
        self.package_type = package_type;
    }

    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    pub fn set_desc(&mut self, desc: PackageDesc) {
        self.desc = desc;
    }

    pub fn set_repository(&mut self, repository: impl Into<String>) {
        self.repository = repository.into();
    }

    pub fn add_dep(&mut self, dep: Dependency) {
        if !self.has_dep(&dep) {
            self.deps.push(dep);
        }
    }

    pub fn add_api(&mut self, api: impl Into<String>) {
        self.apis.push(api.into());
    }

    pub fn add_req_api(&mut self, api: impl Into<String>) {
        self.req_apis.push(api.into());
    }

    pub fn add_init(&mut self, entry_point: impl Into<String>, stage: i32) {
        self.init.insert(entry_point.into(), stage);
    }

    pub fn set_flags(&mut self, key: impl Into<String>, flags: Vec<String>) {
        self.flags.insert(key.into(), flags);
    }

    pub fn set_target_var(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.target_vars.insert(key.into(), value.into());
    }

    pub fn add_syscfg_def(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        description: impl Into<String>,
    ) {
        self.syscfg_defs.insert(
            name.into(),
            SettingDef {
                value: value.into(),
                description: description.into(),
            },
        );
    }

    pub fn add_syscfg_val(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.syscfg_vals.insert(name.into(), value.into());
    }

    /// Replace the syscfg overrides wholesale (e.g. from a `A=1:B=0` string)
    pub fn set_syscfg_vals(&mut self, vals: BTreeMap<String, String>) {
        self.syscfg_vals = vals;
    }

    /// Content hash of the package directory.
    ///
    /// Computed on first use with the default ignore list and cached.
    pub fn hash(&self) -> Result<String> {
        if let Some(hash) = self.hash.get() {
            return Ok(hash.clone());
        }

        let digest = hash::hash_dir(&self.base_path, &hash::HashIgnore::default())?;
        Ok(self.hash.get_or_init(|| digest).clone())
    }

    /// Content hash with a caller-supplied ignore list; never cached.
    pub fn hash_with(&self, ignore: &hash::HashIgnore) -> Result<String> {
        hash::hash_dir(&self.base_path, ignore)
    }
}

/// Lenient version parsing: `1`, `1.2` and `1.2.3` are all accepted.
pub fn parse_version(s: &str) -> Result<Version> {
    let s = s.trim();
    let core_len = s.find(['-', '+']).unwrap_or(s.len());
    let dots = s[..core_len].matches('.').count();

    let padded = match dots {
        0 => format!("{}.0.0{}", &s[..core_len], &s[core_len..]),
        1 => format!("{}.0{}", &s[..core_len], &s[core_len..]),
        _ => s.to_string(),
    };

    Version::parse(&padded).map_err(|error| PackageError::InvalidVersion {
        version: s.to_string(),
        error,
    })
}

fn normalize(path: &Path) -> PathBuf {
    path.components().collect()
}
