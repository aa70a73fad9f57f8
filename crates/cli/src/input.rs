//! File loading for the CLI: YAML or JSON documents, guarded by size and node budgets.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value as Json;

pub fn max_input_bytes() -> usize {
    std::env::var("OVERLAY_MAX_INPUT_BYTES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(1_048_576) // 1 MiB
}

pub fn max_input_nodes() -> usize {
    std::env::var("OVERLAY_MAX_INPUT_NODES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(100_000)
}

/// Counts nodes up to `max` and reports whether the budget was reached.
fn node_budget_exceeded(v: &Json, max: usize) -> bool {
    fn count(v: &Json, seen: &mut usize, max: usize) {
        if *seen >= max { return; }
        *seen += 1;
        let children: Box<dyn Iterator<Item = &Json>> = match v {
            Json::Object(map) => Box::new(map.values()),
            Json::Array(arr) => Box::new(arr.iter()),
            _ => return,
        };
        for c in children {
            if *seen >= max { break; }
            count(c, seen, max);
        }
    }
    let mut seen = 0usize;
    count(v, &mut seen, max);
    seen >= max
}

/// Parse a YAML (or JSON) document into a JSON tree, enforcing the given budgets.
pub fn parse_document(text: &str, max_bytes: usize, max_nodes: usize) -> Result<Json> {
    if text.len() > max_bytes {
        return Err(anyhow!("input too large (>{} bytes)", max_bytes));
    }
    let val: serde_yaml::Value = serde_yaml::from_str(text).context("parsing YAML/JSON")?;
    let json = serde_json::to_value(val).context("converting YAML to JSON")?;
    if node_budget_exceeded(&json, max_nodes) {
        return Err(anyhow!("input too complex (>{} nodes)", max_nodes));
    }
    Ok(json)
}

pub fn load_json(path: &Path) -> Result<Json> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse_document(&text, max_input_bytes(), max_input_nodes()).with_context(|| format!("loading {}", path.display()))
}

pub fn load<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let json = load_json(path)?;
    serde_json::from_value(json).with_context(|| format!("decoding {}", path.display()))
}

/// Missing optional documents read as an empty object.
pub fn load_optional_json(path: Option<&Path>) -> Result<Json> {
    match path {
        Some(p) => load_json(p),
        None => Ok(Json::Object(Default::default())),
    }
}
