//! Pending trait changes: a working copy of a component's trait instances that is
//! edited locally and diffed against the fetched list before submission.

use once_cell::sync::Lazy;
use overlay_core::Change;
use overlay_diff::{diff_with, DiffOptions};
use regex::Regex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as Json};

static INSTANCE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("instance name pattern compiles")
});

const MAX_INSTANCE_NAME_LEN: usize = 63;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraitInstance {
    /// Trait type, e.g. `autoscaler`.
    pub name: String,
    pub instance_name: String,
    #[serde(default)]
    pub parameters: Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "problem", rename_all = "camelCase")]
pub enum TraitProblem {
    #[error("trait type is required")]
    MissingTraitName,
    #[error("instance name {name:?} must be a lowercase DNS label of at most 63 characters")]
    InvalidInstanceName { name: String },
    #[error("instance name {name:?} is already used by trait {first}")]
    DuplicateInstanceName { name: String, first: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraitIssue {
    pub index: usize,
    #[serde(flatten)]
    pub problem: TraitProblem,
}

fn valid_instance_name(name: &str) -> bool {
    name.len() <= MAX_INSTANCE_NAME_LEN && INSTANCE_NAME_RE.is_match(name)
}

/// Fetched trait instances plus the locally edited list.
#[derive(Debug, Clone, Default)]
pub struct PendingTraits {
    original: Vec<TraitInstance>,
    current: Vec<TraitInstance>,
}

impl PendingTraits {
    pub fn new(original: Vec<TraitInstance>) -> Self {
        Self { current: original.clone(), original }
    }

    pub fn original(&self) -> &[TraitInstance] { &self.original }
    pub fn current(&self) -> &[TraitInstance] { &self.current }
    pub fn has_changes(&self) -> bool { self.original != self.current }

    /// Appends and returns the index of the new instance.
    pub fn add(&mut self, instance: TraitInstance) -> usize {
        self.current.push(instance);
        self.current.len() - 1
    }

    /// Returns false when `index` is out of range.
    pub fn update(&mut self, index: usize, instance: TraitInstance) -> bool {
        match self.current.get_mut(index) {
            Some(slot) => {
                *slot = instance;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, index: usize) -> Option<TraitInstance> {
        if index < self.current.len() { Some(self.current.remove(index)) } else { None }
    }

    /// Drop all local edits.
    pub fn discard(&mut self) { self.current = self.original.clone(); }

    /// Adopt the working copy as the new baseline (after a successful save).
    pub fn commit(&mut self) { self.original = self.current.clone(); }

    /// Changes keyed by instance name, e.g. `cache.parameters.size`. A repeated instance
    /// name is keyed `name#index` by its list position so it still shows up.
    pub fn pending_changes(&self) -> Vec<Change> {
        diff_with(&Self::keyed(&self.original), &Self::keyed(&self.current), DiffOptions::default())
    }

    fn keyed(list: &[TraitInstance]) -> Json {
        let mut m = Map::new();
        for (i, t) in list.iter().enumerate() {
            let key = if m.contains_key(&t.instance_name) {
                format!("{}#{}", t.instance_name, i)
            } else {
                t.instance_name.clone()
            };
            m.insert(key, json!({ "name": t.name, "parameters": t.parameters }));
        }
        Json::Object(m)
    }

    pub fn validate(&self) -> Vec<TraitIssue> {
        let mut issues = Vec::new();
        let mut seen: FxHashMap<&str, usize> = FxHashMap::default();
        for (index, t) in self.current.iter().enumerate() {
            if t.name.trim().is_empty() {
                issues.push(TraitIssue { index, problem: TraitProblem::MissingTraitName });
            }
            if !valid_instance_name(&t.instance_name) {
                issues.push(TraitIssue { index, problem: TraitProblem::InvalidInstanceName { name: t.instance_name.clone() } });
                continue;
            }
            match seen.get(t.instance_name.as_str()) {
                Some(&first) => issues.push(TraitIssue {
                    index,
                    problem: TraitProblem::DuplicateInstanceName { name: t.instance_name.clone(), first },
                }),
                None => {
                    seen.insert(t.instance_name.as_str(), index);
                }
            }
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overlay_core::ChangeKind;

    fn inst(name: &str, instance: &str, params: Json) -> TraitInstance {
        TraitInstance { name: name.into(), instance_name: instance.into(), parameters: params }
    }

    #[test]
    fn pending_changes_track_add_update_remove() {
        let mut p = PendingTraits::new(vec![
            inst("autoscaler", "hpa", json!({ "min": 1, "max": 3 })),
            inst("volume", "data", json!({ "size": "1Gi" })),
        ]);
        assert!(p.pending_changes().is_empty());

        p.update(0, inst("autoscaler", "hpa", json!({ "min": 2, "max": 3 })));
        p.remove(1);
        p.add(inst("ingress", "public", json!({ "host": "api.example.com" })));
        assert!(p.has_changes());

        let changes = p.pending_changes();
        assert_eq!(changes.len(), 3);
        assert!(changes.contains(&Change::modified("hpa.parameters.min", json!(1), json!(2))));
        assert!(changes.iter().any(|c| c.path == "data" && c.kind == ChangeKind::Removed));
        assert!(changes.iter().any(|c| c.path == "public" && c.kind == ChangeKind::Added));

        p.discard();
        assert!(!p.has_changes());
    }

    #[test]
    fn repeated_instance_names_stay_visible() {
        let mut p = PendingTraits::new(vec![inst("autoscaler", "hpa", json!({ "max": 3 }))]);
        p.add(inst("autoscaler", "hpa", json!({ "max": 9 })));

        let changes = p.pending_changes();
        assert_eq!(changes.len(), 1, "changes={:?}", changes);
        assert_eq!(changes[0].path, "hpa#1");
        assert_eq!(changes[0].kind, ChangeKind::Added);
        assert!(!p.validate().is_empty());
    }

    #[test]
    fn commit_resets_baseline() {
        let mut p = PendingTraits::new(vec![]);
        p.add(inst("autoscaler", "hpa", json!({})));
        p.commit();
        assert!(p.pending_changes().is_empty());
        assert_eq!(p.original().len(), 1);
    }

    #[test]
    fn validation_reports_names() {
        let mut p = PendingTraits::new(vec![inst("volume", "data", json!({}))]);
        p.add(inst("volume", "data", json!({})));
        p.add(inst("", "Bad_Name", json!({})));
        let issues = p.validate();
        assert_eq!(
            issues,
            vec![
                TraitIssue { index: 1, problem: TraitProblem::DuplicateInstanceName { name: "data".into(), first: 0 } },
                TraitIssue { index: 2, problem: TraitProblem::MissingTraitName },
                TraitIssue { index: 2, problem: TraitProblem::InvalidInstanceName { name: "Bad_Name".into() } },
            ]
        );
    }

    #[test]
    fn instance_name_rules() {
        assert!(valid_instance_name("a"));
        assert!(valid_instance_name("cache-01"));
        assert!(!valid_instance_name(""));
        assert!(!valid_instance_name("-lead"));
        assert!(!valid_instance_name("trail-"));
        assert!(!valid_instance_name(&"a".repeat(64)));
    }

    #[test]
    fn out_of_range_edits_are_rejected() {
        let mut p = PendingTraits::new(vec![]);
        assert!(!p.update(0, inst("x", "y", json!({}))));
        assert!(p.remove(0).is_none());
        assert!(!p.has_changes());
    }
}
