//! Overlay public API façade.
//!
//! Defines the control-plane seam the editors depend on, the error taxonomy at that
//! boundary, stale-guarded fetch slots, and the workload editor that ties the merge,
//! edit-buffer and diff engines together.

#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub mod editor;
pub mod fetch;

pub use editor::{EditorIssue, SaveReport, WorkloadEditor};
pub use fetch::{FetchSlot, FetchState, Fetched, Ticket};
pub use overlay_core::{Change, RecordKind, ValueRecord, ValueRecordWithStatus, WorkloadConfig};
pub use overlay_merge::TraitInstance;
pub use overlay_schema::PreparedSchema;

/// Identifies the workload whose overrides are being edited.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkloadRef {
    pub namespace: String,
    pub component: String,
    pub environment: String,
}

impl std::fmt::Display for WorkloadRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}@{}", self.namespace, self.component, self.environment)
    }
}

/// What the control plane returns for a workload in one environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkloadSnapshot {
    pub base: WorkloadConfig,
    #[serde(default)]
    pub overrides: WorkloadConfig,
    #[serde(default)]
    pub traits: Vec<TraitInstance>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretSummary {
    pub name: String,
    #[serde(default)]
    pub keys: Vec<String>,
}

/// API errors suitable for transport and display.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum OverlayError {
    #[error("validation: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not_found: {0}")]
    NotFound(String),
    #[error("upstream: {0}")]
    Upstream(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl From<overlay_merge::EditError> for OverlayError {
    fn from(e: overlay_merge::EditError) -> Self { OverlayError::Conflict(e.to_string()) }
}

impl From<serde_json::Error> for OverlayError {
    fn from(e: serde_json::Error) -> Self { OverlayError::Internal(e.to_string()) }
}

pub type OverlayResult<T> = Result<T, OverlayError>;

/// The remote control plane. Only the REST contract matters here; orchestration lives
/// on the other side.
#[async_trait::async_trait]
pub trait ControlPlane: Send + Sync {
    async fn fetch_workload(&self, target: &WorkloadRef) -> OverlayResult<WorkloadSnapshot>;

    async fn fetch_trait_schema(&self, namespace: &str, trait_name: &str) -> OverlayResult<serde_json::Value>;

    async fn list_secrets(&self, namespace: &str) -> OverlayResult<Vec<SecretSummary>>;

    /// Replace the override configuration of `target`.
    async fn save_overrides(&self, target: &WorkloadRef, overrides: &WorkloadConfig) -> OverlayResult<()>;

    /// Replace the trait instances attached to `target`.
    async fn save_traits(&self, target: &WorkloadRef, traits: &[TraitInstance]) -> OverlayResult<()>;
}

#[derive(Default)]
struct InMemoryState {
    workloads: HashMap<WorkloadRef, WorkloadSnapshot>,
    trait_schemas: HashMap<(String, String), serde_json::Value>,
    secrets: HashMap<String, Vec<SecretSummary>>,
}

/// In-process control plane backed by maps; used by tests and offline tooling.
#[derive(Default)]
pub struct InMemoryControlPlane {
    state: RwLock<InMemoryState>,
}

fn poisoned<T>(_: T) -> OverlayError { OverlayError::Internal("control plane state lock poisoned".into()) }

impl InMemoryControlPlane {
    pub fn new() -> Self { Self::default() }

    pub fn insert_workload(&self, target: WorkloadRef, snapshot: WorkloadSnapshot) -> OverlayResult<()> {
        self.state.write().map_err(poisoned)?.workloads.insert(target, snapshot);
        Ok(())
    }

    pub fn insert_trait_schema(&self, namespace: &str, trait_name: &str, schema: serde_json::Value) -> OverlayResult<()> {
        self.state
            .write()
            .map_err(poisoned)?
            .trait_schemas
            .insert((namespace.to_string(), trait_name.to_string()), schema);
        Ok(())
    }

    pub fn insert_secrets(&self, namespace: &str, secrets: Vec<SecretSummary>) -> OverlayResult<()> {
        self.state.write().map_err(poisoned)?.secrets.insert(namespace.to_string(), secrets);
        Ok(())
    }

    pub fn workload(&self, target: &WorkloadRef) -> OverlayResult<Option<WorkloadSnapshot>> {
        Ok(self.state.read().map_err(poisoned)?.workloads.get(target).cloned())
    }
}

#[async_trait::async_trait]
impl ControlPlane for InMemoryControlPlane {
    async fn fetch_workload(&self, target: &WorkloadRef) -> OverlayResult<WorkloadSnapshot> {
        self.workload(target)?.ok_or_else(|| OverlayError::NotFound(format!("workload {}", target)))
    }

    async fn fetch_trait_schema(&self, namespace: &str, trait_name: &str) -> OverlayResult<serde_json::Value> {
        let state = self.state.read().map_err(poisoned)?;
        state
            .trait_schemas
            .get(&(namespace.to_string(), trait_name.to_string()))
            .cloned()
            .ok_or_else(|| OverlayError::NotFound(format!("trait schema {}/{}", namespace, trait_name)))
    }

    async fn list_secrets(&self, namespace: &str) -> OverlayResult<Vec<SecretSummary>> {
        Ok(self.state.read().map_err(poisoned)?.secrets.get(namespace).cloned().unwrap_or_default())
    }

    async fn save_overrides(&self, target: &WorkloadRef, overrides: &WorkloadConfig) -> OverlayResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        let snap = state
            .workloads
            .get_mut(target)
            .ok_or_else(|| OverlayError::NotFound(format!("workload {}", target)))?;
        snap.overrides = overrides.clone();
        debug!(target = %target, "overrides stored");
        Ok(())
    }

    async fn save_traits(&self, target: &WorkloadRef, traits: &[TraitInstance]) -> OverlayResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        let snap = state
            .workloads
            .get_mut(target)
            .ok_or_else(|| OverlayError::NotFound(format!("workload {}", target)))?;
        snap.traits = traits.to_vec();
        Ok(())
    }
}

/// Side data an editor surface loads next to the workload. Each slot drops results
/// from requests that were superseded before they finished.
#[derive(Default)]
pub struct EditorResources {
    pub secrets: FetchSlot<Vec<SecretSummary>>,
    pub trait_schema: FetchSlot<PreparedSchema>,
}

impl EditorResources {
    pub fn new() -> Self { Self::default() }

    /// Returns false when a newer request superseded this one.
    pub async fn refresh_secrets(&self, cp: &dyn ControlPlane, namespace: &str) -> bool {
        self.secrets.run(cp.list_secrets(namespace)).await
    }

    /// Fetch a trait schema and prepare it for rendering.
    pub async fn refresh_trait_schema(
        &self,
        cp: &dyn ControlPlane,
        namespace: &str,
        trait_name: &str,
        rules: &overlay_schema::PartitionRules,
    ) -> bool {
        let fut = async {
            let schema = cp.fetch_trait_schema(namespace, trait_name).await?;
            Ok::<_, OverlayError>(overlay_schema::prepare(&schema, &serde_json::Value::Null, rules))
        };
        self.trait_schema.run(fut).await
    }
}
