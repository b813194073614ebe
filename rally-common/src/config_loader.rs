//! Layered loading of the `~/.rally/` directory.
//!
//! `config.json` holds every section. `screener.json` and `source.json` hold a
//! single section each and are merged over the matching key of `config.json`,
//! so thresholds can be tuned without touching connection settings.

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::config_dir;

/// Base file holding all sections.
pub const BASE_FILE: &str = "config.json";

/// Section files and the top-level key each one is merged into.
pub const SECTION_FILES: &[(&str, &str)] = &[("screener.json", "screener"), ("source.json", "source")];

/// Read a JSON document, `None` when the file is absent.
fn read_json(path: &Path) -> Result<Option<Value>> {
    if !path.is_file() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let doc = serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(doc))
}

/// Merge `overlay` into `base`. Objects merge key by key; anything else replaces.
fn overlay(base: &mut Value, overlay_doc: Value) {
    if let (Value::Object(base_map), Value::Object(over_map)) = (&mut *base, &overlay_doc) {
        for (key, value) in over_map {
            match base_map.get_mut(key) {
                Some(slot) => overlay(slot, value.clone()),
                None => {
                    base_map.insert(key.clone(), value.clone());
                }
            }
        }
        return;
    }
    *base = overlay_doc;
}

/// Drop editor annotations such as `$schema` or `_comment` from the top level.
fn without_annotations(doc: Value) -> Value {
    match doc {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(key, _)| !key.starts_with(['$', '_']))
                .collect(),
        ),
        other => other,
    }
}

/// Load `dir` (default `~/.rally`) into one JSON document.
///
/// Section files win over `config.json`; environment overrides are applied
/// later by [`crate::Config::apply_env_overrides`].
pub fn load_modular_config(dir: Option<PathBuf>) -> Result<Value> {
    let dir = dir.unwrap_or_else(config_dir);
    tracing::debug!(dir = %dir.display(), "Loading config directory");

    let mut doc = read_json(&dir.join(BASE_FILE))?
        .map(without_annotations)
        .unwrap_or_else(|| Value::Object(Map::new()));

    for (file, section) in SECTION_FILES {
        let Some(section_doc) = read_json(&dir.join(file))? else {
            continue;
        };
        if let Value::Object(root) = &mut doc {
            let slot = root.entry(section.to_string()).or_insert_with(|| Value::Object(Map::new()));
            overlay(slot, without_annotations(section_doc));
        }
        tracing::debug!(file, section, "Merged section file");
    }

    Ok(doc)
}

/// Which config files exist in `dir` (default `~/.rally`), base file first.
pub fn present_files(dir: Option<PathBuf>) -> Vec<(&'static str, bool)> {
    let dir = dir.unwrap_or_else(config_dir);
    std::iter::once(BASE_FILE)
        .chain(SECTION_FILES.iter().map(|(file, _)| *file))
        .map(|file| (file, dir.join(file).is_file()))
        .collect()
}
