//! The `[syscfg.vals]` file format and the compact `A=1:B=0` form

use crate::cfg::Cfg;
use crate::{Result, SyscfgError};
use kiln_package::descriptor::{setting_value, toml_key, toml_string};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
struct ValsFile {
    #[serde(default)]
    syscfg: ValsSection,
}

/// Definitions may share the file; only values are read here.
#[derive(Debug, Default, Deserialize)]
struct ValsSection {
    #[serde(default)]
    vals: BTreeMap<String, toml::Value>,
}

/// Render every effective value as a `[syscfg.vals]` block.
///
/// Settings are grouped under a `# <package>` comment naming the package
/// that introduced them; groups and settings are name sorted.
pub fn export(cfg: &Cfg) -> String {
    let mut out = String::from("[syscfg.vals]\n");

    for (i, (pkg, entries)) in cfg.entries_by_package().into_iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = writeln!(out, "# {}", pkg);
        for entry in entries {
            let _ = writeln!(
                out,
                "{} = {}",
                toml_key(entry.name()),
                toml_string(entry.value())
            );
        }
    }

    out
}

/// Read the `[syscfg.vals]` block of a syscfg file
pub fn import(content: &str) -> Result<BTreeMap<String, String>> {
    let file: ValsFile = toml::from_str(content)?;

    file.syscfg
        .vals
        .into_iter()
        .map(|(name, value)| {
            let value = setting_value(&name, &value).map_err(|e| SyscfgError::InvalidValue {
                name: name.clone(),
                reason: e.to_string(),
            })?;
            Ok((name, value))
        })
        .collect()
}

pub fn read_file(path: &Path) -> Result<BTreeMap<String, String>> {
    let content = fs::read_to_string(path).map_err(|e| SyscfgError::io(path, e))?;
    import(&content)
}

/// Export `cfg` to `path`, creating parent directories as needed
pub fn write_file(cfg: &Cfg, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| SyscfgError::io(parent, e))?;
    }
    fs::write(path, export(cfg)).map_err(|e| SyscfgError::io(path, e))?;
    tracing::debug!("Wrote syscfg values to {}", path.display());
    Ok(())
}

/// Parse `KEY=VALUE` pairs separated by colons
pub fn kv_from_str(s: &str) -> Result<BTreeMap<String, String>> {
    let mut values = BTreeMap::new();

    for pair in s.split(':').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .filter(|(key, _)| !key.trim().is_empty())
            .ok_or_else(|| SyscfgError::InvalidKeyValue {
                pair: pair.to_string(),
            })?;
        values.insert(key.trim().to_string(), value.trim().to_string());
    }

    Ok(values)
}

/// Inverse of [`kv_from_str`], keys sorted
pub fn kv_to_str(values: &BTreeMap<String, String>) -> String {
    values
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(":")
}
