//! Overlay diff: path-qualified structural changes between two configuration trees.

#![forbid(unsafe_code)]

use std::str::FromStr;

use overlay_core::{Change, ChangeKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use tracing::trace;

/// How arrays are compared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrayMode {
    /// Arrays are compared as whole values.
    #[default]
    Opaque,
    /// Arrays are walked element by element; paths get an `[i]` suffix.
    Index,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown array mode {0:?} (expected \"opaque\" or \"index\")")]
pub struct ParseArrayModeError(String);

impl FromStr for ArrayMode {
    type Err = ParseArrayModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "opaque" => Ok(ArrayMode::Opaque),
            "index" => Ok(ArrayMode::Index),
            other => Err(ParseArrayModeError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffOptions {
    pub arrays: ArrayMode,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary { pub adds: usize, pub updates: usize, pub removes: usize }

impl DiffSummary {
    pub fn is_empty(&self) -> bool { self.adds == 0 && self.updates == 0 && self.removes == 0 }
}

/// Diff two trees with arrays treated as opaque values.
pub fn diff(before: &Json, after: &Json) -> Vec<Change> {
    diff_with(before, after, DiffOptions::default())
}

/// Diff two trees.
///
/// Keys of `before` are visited first (in map order), then keys only present in `after`.
/// Non-object roots are compared as a single value at the empty path.
pub fn diff_with(before: &Json, after: &Json, opts: DiffOptions) -> Vec<Change> {
    let mut out = Vec::new();
    walk(before, after, "", opts, &mut out);
    trace!(changes = out.len(), "diff computed");
    out
}

/// Serialize both sides and diff them.
pub fn diff_serialized<T: Serialize + ?Sized>(before: &T, after: &T, opts: DiffOptions) -> serde_json::Result<Vec<Change>> {
    let b = serde_json::to_value(before)?;
    let a = serde_json::to_value(after)?;
    Ok(diff_with(&b, &a, opts))
}

pub fn summarize(changes: &[Change]) -> DiffSummary {
    let mut s = DiffSummary::default();
    for c in changes {
        match c.kind {
            ChangeKind::Added => s.adds += 1,
            ChangeKind::Modified => s.updates += 1,
            ChangeKind::Removed => s.removes += 1,
        }
    }
    s
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() { key.to_string() } else { format!("{}.{}", prefix, key) }
}

fn walk(before: &Json, after: &Json, path: &str, opts: DiffOptions, out: &mut Vec<Change>) {
    match (before, after) {
        (Json::Object(b), Json::Object(a)) => walk_maps(b, a, path, opts, out),
        (Json::Array(b), Json::Array(a)) if opts.arrays == ArrayMode::Index => {
            for i in 0..b.len().max(a.len()) {
                let p = format!("{}[{}]", path, i);
                match (b.get(i), a.get(i)) {
                    (Some(bv), Some(av)) => walk(bv, av, &p, opts, out),
                    (Some(bv), None) => out.push(Change::removed(p, bv.clone())),
                    (None, Some(av)) => out.push(Change::added(p, av.clone())),
                    (None, None) => {}
                }
            }
        }
        // Scalars, opaque arrays, or type mismatch
        (bv, av) => {
            if !same_value(bv, av) {
                out.push(Change::modified(path, bv.clone(), av.clone()));
            }
        }
    }
}

/// Structural equality where `1` and `1.0` are the same number.
fn same_value(a: &Json, b: &Json) -> bool {
    match (a, b) {
        (Json::Number(x), Json::Number(y)) => {
            if x.is_f64() || y.is_f64() {
                x.as_f64() == y.as_f64()
            } else {
                x == y
            }
        }
        (Json::Array(x), Json::Array(y)) => x.len() == y.len() && x.iter().zip(y).all(|(a, b)| same_value(a, b)),
        (Json::Object(x), Json::Object(y)) => {
            x.len() == y.len() && x.iter().all(|(k, v)| y.get(k).map_or(false, |w| same_value(v, w)))
        }
        _ => a == b,
    }
}

fn walk_maps(b: &Map<String, Json>, a: &Map<String, Json>, prefix: &str, opts: DiffOptions, out: &mut Vec<Change>) {
    for (k, bv) in b.iter() {
        let path = join(prefix, k);
        match a.get(k) {
            Some(av) => walk(bv, av, &path, opts, out),
            None => out.push(Change::removed(path, bv.clone())),
        }
    }
    for (k, av) in a.iter() {
        if !b.contains_key(k) {
            out.push(Change::added(join(prefix, k), av.clone()));
        }
    }
}
