//! Human-readable configuration listing

use crate::cfg::{Cfg, CfgEntry};
use std::fmt::Write as _;

/// Render the configuration of `target`, grouped by defining package
pub fn cfg_text(target: &str, cfg: &Cfg) -> String {
    let mut out = String::new();

    let errors = cfg.error_text();
    if !errors.is_empty() {
        let _ = write!(out, "!!! {}\n\n", errors);
    }

    let _ = writeln!(out, "Syscfg for {}:", target);
    for (i, (pkg, entries)) in cfg.entries_by_package().into_iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = writeln!(out, "* PACKAGE: {}", pkg);
        for entry in entries {
            setting_text(&mut out, entry);
        }
    }

    out
}

fn setting_text(out: &mut String, entry: &CfgEntry) {
    let _ = writeln!(out, "  * Setting: {}", entry.name());
    let _ = writeln!(out, "    * Description: {}", entry.description());
    let _ = writeln!(out, "    * Value: {}", entry.value());

    if entry.is_overridden() {
        out.push_str("    * Overridden: ");
        for source in entry.overriders() {
            let _ = write!(out, "{}, ", source);
        }
        let _ = writeln!(out, "default={}", entry.default_point().value);
    }
}
