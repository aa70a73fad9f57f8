//! Overlay schema: split a parameter schema into essential and advanced fragments,
//! generate display titles, and drop placeholder objects.

#![forbid(unsafe_code)]

use convert_case::{Case, Casing};
use rustc_hash::FxHashSet;
use serde::Serialize;
use serde_json::{Map, Value as Json};
use tracing::debug;

/// Property-level flag marking a field as advanced.
pub const ADVANCED_FLAG: &str = "x-advanced";
/// UI-schema flag marking a field as advanced.
pub const UI_ADVANCED_FLAG: &str = "ui:advanced";
pub const UI_TITLE: &str = "ui:title";

/// Declarative classification rules beyond the per-property flags.
#[derive(Debug, Clone, Default)]
pub struct PartitionRules {
    pub advanced_fields: FxHashSet<String>,
}

impl PartitionRules {
    pub fn new<I, S>(advanced_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { advanced_fields: advanced_fields.into_iter().map(Into::into).collect() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchemaFragment {
    pub properties: Map<String, Json>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

impl SchemaFragment {
    pub fn is_empty(&self) -> bool { self.properties.is_empty() }

    /// Render as a standalone object schema.
    pub fn to_schema(&self) -> Json {
        let mut m = Map::new();
        m.insert("type".into(), Json::String("object".into()));
        m.insert("properties".into(), Json::Object(self.properties.clone()));
        if !self.required.is_empty() {
            m.insert("required".into(), self.required.iter().cloned().map(Json::String).collect());
        }
        Json::Object(m)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchemaPartition {
    pub essential: SchemaFragment,
    pub advanced: SchemaFragment,
}

fn flag_set(v: Option<&Json>, flag: &str) -> bool {
    v.and_then(|v| v.get(flag)).and_then(Json::as_bool).unwrap_or(false)
}

fn required_keys(schema: &Json) -> Vec<&str> {
    schema
        .get("required")
        .and_then(Json::as_array)
        .map(|arr| arr.iter().filter_map(Json::as_str).collect())
        .unwrap_or_default()
}

fn is_advanced(key: &str, prop: &Json, ui_schema: &Json, rules: &PartitionRules, required: bool) -> bool {
    flag_set(Some(prop), ADVANCED_FLAG)
        || flag_set(Some(prop), UI_ADVANCED_FLAG)
        || flag_set(ui_schema.get(key), UI_ADVANCED_FLAG)
        || rules.advanced_fields.contains(key)
        || (prop.get("default").is_some() && !required)
}

/// Split `schema` into essential and advanced fragments.
///
/// Schemas that are not objects, or carry no `properties`, yield two empty fragments.
pub fn partition(schema: &Json, ui_schema: &Json, rules: &PartitionRules) -> SchemaPartition {
    let mut out = SchemaPartition::default();
    if let Some(ty) = schema.get("type").and_then(Json::as_str) {
        if ty != "object" {
            debug!(schema_type = ty, "non-object schema; nothing to partition");
            return out;
        }
    }
    let props = match schema.get("properties").and_then(Json::as_object) {
        Some(p) => p,
        None => return out,
    };
    let required = required_keys(schema);

    for (k, p) in props.iter() {
        let is_required = required.contains(&k.as_str());
        let frag = if is_advanced(k, p, ui_schema, rules, is_required) { &mut out.advanced } else { &mut out.essential };
        frag.properties.insert(k.clone(), p.clone());
    }
    // keep the schema's own required order, first occurrence only
    for k in required {
        let frag = if out.essential.properties.contains_key(k) {
            &mut out.essential
        } else if out.advanced.properties.contains_key(k) {
            &mut out.advanced
        } else {
            continue;
        };
        if !frag.required.iter().any(|r| r == k) {
            frag.required.push(k.to_string());
        }
    }
    out
}

/// Human-readable title for a property key: `maxReplicas` and `max_replicas` both
/// become `Max Replicas`.
pub fn sanitize_label(key: &str) -> String {
    key.to_case(Case::Title)
}

fn ui_for_node(node: &Json) -> Map<String, Json> {
    let mut entry = Map::new();
    if let Some(props) = node.get("properties").and_then(Json::as_object) {
        for (k, p) in props.iter() {
            let mut child = ui_for_node(p);
            if p.get("title").is_none() {
                child.insert(UI_TITLE.into(), Json::String(sanitize_label(k)));
            }
            if !child.is_empty() {
                entry.insert(k.clone(), Json::Object(child));
            }
        }
    }
    if let Some(items) = node.get("items") {
        let item_ui = ui_for_node(items);
        if !item_ui.is_empty() {
            entry.insert("items".into(), Json::Object(item_ui));
        }
    }
    entry
}

/// UI schema assigning a `ui:title` to every property that lacks a `title`,
/// descending into nested objects and array items.
pub fn generate_ui_schema(schema: &Json) -> Json {
    Json::Object(ui_for_node(schema))
}

/// Shallow merge: entries of `supplied` replace generated entries with the same key.
/// A supplied value that is not an object has no entries and changes nothing.
pub fn merge_ui_schema(generated: Json, supplied: &Json) -> Json {
    match (generated, supplied) {
        (Json::Object(mut g), Json::Object(s)) => {
            for (k, v) in s.iter() {
                g.insert(k.clone(), v.clone());
            }
            Json::Object(g)
        }
        (g, other) => {
            if !other.is_null() {
                debug!("ignoring non-object ui schema");
            }
            g
        }
    }
}

/// Generated titles overlaid with the caller's UI schema.
pub fn ui_schema_for(schema: &Json, supplied: &Json) -> Json {
    merge_ui_schema(generate_ui_schema(schema), supplied)
}

fn is_placeholder_object(prop: &Json) -> bool {
    prop.get("type").and_then(Json::as_str) == Some("object")
        && prop.get("properties").is_none()
        && prop.get("additionalProperties").is_none()
        && prop.get("enum").is_none()
        && prop.get("const").is_none()
}

/// Remove top-level properties that are objects with nothing to render, and drop
/// them from `required`.
pub fn filter_empty_objects(schema: &Json) -> Json {
    let mut out = schema.clone();
    let removed: Vec<String> = match out.get_mut("properties").and_then(Json::as_object_mut) {
        Some(props) => {
            let keys: Vec<String> = props.iter().filter(|(_, p)| is_placeholder_object(p)).map(|(k, _)| k.clone()).collect();
            for k in &keys {
                props.remove(k);
            }
            keys
        }
        None => return out,
    };
    if removed.is_empty() {
        return out;
    }
    if let Some(req) = out.get_mut("required").and_then(Json::as_array_mut) {
        req.retain(|k| k.as_str().map_or(true, |k| !removed.iter().any(|r| r == k)));
    }
    out
}

/// A schema ready for rendering: placeholders dropped, fields partitioned, titles filled in.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedSchema {
    pub partition: SchemaPartition,
    pub ui_schema: Json,
}

pub fn prepare(schema: &Json, ui_schema: &Json, rules: &PartitionRules) -> PreparedSchema {
    let filtered = filter_empty_objects(schema);
    PreparedSchema {
        partition: partition(&filtered, ui_schema, rules),
        ui_schema: ui_schema_for(&filtered, ui_schema),
    }
}

// Feature-gated JSON Schema validation of parameter values
#[cfg(feature = "jsonschema-validate")]
pub mod validate {
    use anyhow::{anyhow, Result};
    use jsonschema::{Draft, JSONSchema};
    use serde::{Deserialize, Serialize};
    use serde_json::Value as Json;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ValidationIssue {
        pub path: String,
        pub error: String,
        pub hint: Option<String>,
    }

    /// Validate parameter values against their schema.
    /// Returns a list of human-friendly issues; empty on success.
    pub fn validate_parameters(schema: &Json, params: &Json) -> Result<Vec<ValidationIssue>> {
        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(schema)
            .map_err(|e| anyhow!("compiling parameter schema: {}", e))?;
        let mut issues: Vec<ValidationIssue> = Vec::new();
        if let Err(errors) = compiled.validate(params) {
            for err in errors {
                let path = err.instance_path.to_string();
                let error = err.to_string();
                let hint = if error.contains("required property") {
                    Some("missing required field".into())
                } else if error.contains("is not of type") {
                    Some("mismatched type".into())
                } else if error.contains("is not one of") {
                    Some("value not in allowed set".into())
                } else {
                    None
                };
                issues.push(ValidationIssue { path, error, hint });
            }
        }
        Ok(issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_without_required_is_advanced() {
        let schema = json!({
            "type": "object",
            "properties": { "a": { "type": "string", "default": "x" }, "b": { "type": "string" } },
            "required": ["b"]
        });
        let p = partition(&schema, &Json::Null, &PartitionRules::default());
        assert_eq!(p.essential.properties.keys().collect::<Vec<_>>(), vec!["b"]);
        assert_eq!(p.advanced.properties.keys().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(p.essential.required, vec!["b".to_string()]);
        assert!(p.advanced.required.is_empty());
    }

    #[test]
    fn flags_and_allowlist_mark_advanced() {
        let schema = json!({
            "type": "object",
            "properties": {
                "replicas": { "type": "integer", "default": 1 },
                "image": { "type": "string" },
                "flagged": { "type": "string", "x-advanced": true },
                "uiFlagged": { "type": "boolean" },
                "resources": { "type": "object", "properties": { "cpu": { "type": "string" } } }
            },
            "required": ["replicas", "image", "resources"]
        });
        let ui = json!({ "uiFlagged": { "ui:advanced": true } });
        let rules = PartitionRules::new(["resources"]);
        let p = partition(&schema, &ui, &rules);

        let essential: Vec<_> = p.essential.properties.keys().cloned().collect();
        let advanced: Vec<_> = p.advanced.properties.keys().cloned().collect();
        assert_eq!(essential, vec!["image", "replicas"]);
        assert_eq!(advanced, vec!["flagged", "resources", "uiFlagged"]);
        // required order follows the source schema
        assert_eq!(p.essential.required, vec!["replicas", "image"]);
        assert_eq!(p.advanced.required, vec!["resources"]);
    }

    #[test]
    fn repeated_required_keys_are_listed_once() {
        let schema = json!({
            "type": "object",
            "properties": { "b": { "type": "string" }, "a": { "type": "string", "x-advanced": true } },
            "required": ["b", "a", "b", "a"]
        });
        let p = partition(&schema, &Json::Null, &PartitionRules::default());
        assert_eq!(p.essential.required, vec!["b"]);
        assert_eq!(p.advanced.required, vec!["a"]);
    }

    #[test]
    fn non_object_schemas_yield_empty_fragments() {
        let rules = PartitionRules::default();
        assert_eq!(partition(&json!({ "type": "string" }), &Json::Null, &rules), SchemaPartition::default());
        assert_eq!(partition(&json!({ "type": "object" }), &Json::Null, &rules), SchemaPartition::default());
        assert_eq!(partition(&json!(42), &Json::Null, &rules), SchemaPartition::default());
    }

    #[test]
    fn fragment_renders_as_object_schema() {
        let mut f = SchemaFragment::default();
        f.properties.insert("b".into(), json!({ "type": "string" }));
        f.required.push("b".into());
        assert_eq!(
            f.to_schema(),
            json!({ "type": "object", "properties": { "b": { "type": "string" } }, "required": ["b"] })
        );
        assert_eq!(SchemaFragment::default().to_schema(), json!({ "type": "object", "properties": {} }));
    }

    #[test]
    fn labels_are_title_cased() {
        assert_eq!(sanitize_label("maxReplicas"), "Max Replicas");
        assert_eq!(sanitize_label("log_level"), "Log Level");
        assert_eq!(sanitize_label("node-selector"), "Node Selector");
        assert_eq!(sanitize_label("image"), "Image");
    }

    #[test]
    fn ui_schema_titles_nested_and_array_items() {
        let schema = json!({
            "type": "object",
            "properties": {
                "minReplicas": { "type": "integer" },
                "image": { "type": "string", "title": "Container image" },
                "resources": {
                    "type": "object",
                    "properties": { "cpu_limit": { "type": "string" } }
                },
                "ports": {
                    "type": "array",
                    "items": { "type": "object", "properties": { "containerPort": { "type": "integer" } } }
                }
            }
        });
        let ui = generate_ui_schema(&schema);
        assert_eq!(
            ui,
            json!({
                "minReplicas": { "ui:title": "Min Replicas" },
                "resources": {
                    "ui:title": "Resources",
                    "cpu_limit": { "ui:title": "Cpu Limit" }
                },
                "ports": {
                    "ui:title": "Ports",
                    "items": { "containerPort": { "ui:title": "Container Port" } }
                }
            })
        );
    }

    #[test]
    fn supplied_ui_schema_wins_per_key() {
        let schema = json!({ "properties": { "a": {}, "b": {} } });
        let ui = ui_schema_for(&schema, &json!({ "a": { "ui:widget": "textarea" } }));
        assert_eq!(ui, json!({ "a": { "ui:widget": "textarea" }, "b": { "ui:title": "B" } }));
        assert_eq!(ui_schema_for(&schema, &Json::Null)["a"], json!({ "ui:title": "A" }));
    }

    #[test]
    fn non_object_ui_schema_keeps_generated_titles() {
        let schema = json!({ "properties": { "a": {}, "b": {} } });
        let generated = generate_ui_schema(&schema);
        assert_eq!(ui_schema_for(&schema, &json!([])), generated);
        assert_eq!(ui_schema_for(&schema, &json!("textarea")), generated);
        assert_eq!(ui_schema_for(&schema, &json!(true))["b"], json!({ "ui:title": "B" }));
    }

    #[test]
    fn placeholder_objects_are_filtered() {
        let schema = json!({
            "type": "object",
            "properties": {
                "empty": { "type": "object" },
                "map": { "type": "object", "additionalProperties": { "type": "string" } },
                "choice": { "type": "object", "enum": [{}] },
                "nested": { "type": "object", "properties": { "x": { "type": "string" } } },
                "name": { "type": "string" }
            },
            "required": ["empty", "name"]
        });
        let out = filter_empty_objects(&schema);
        let keys: Vec<_> = out["properties"].as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["choice", "map", "name", "nested"]);
        assert_eq!(out["required"], json!(["name"]));
        assert_eq!(filter_empty_objects(&json!({ "type": "string" })), json!({ "type": "string" }));
    }

    #[test]
    fn prepare_filters_before_partitioning() {
        let schema = json!({
            "type": "object",
            "properties": {
                "placeholder": { "type": "object" },
                "port": { "type": "integer", "default": 8080 },
                "host": { "type": "string" }
            },
            "required": ["placeholder", "host"]
        });
        let prepared = prepare(&schema, &Json::Null, &PartitionRules::default());
        assert!(!prepared.partition.essential.properties.contains_key("placeholder"));
        assert!(!prepared.partition.advanced.properties.contains_key("placeholder"));
        assert_eq!(prepared.partition.essential.required, vec!["host"]);
        assert!(prepared.partition.advanced.properties.contains_key("port"));
        assert!(prepared.ui_schema.get("placeholder").is_none());
        assert_eq!(prepared.ui_schema["host"], json!({ "ui:title": "Host" }));
    }
}
