//! Provisioning engine abstraction.
//!
//! edgestack never talks to a cloud API itself. Each resource is handed,
//! fully resolved, to an external engine through [`Provisioner`]; the engine
//! reports back the physical id and attributes other resources reference.

pub mod command;
#[cfg(test)]
pub mod fake;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What the engine is asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Apply,
    Destroy,
    Describe,
}

/// One request to the engine.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionRequest {
    pub action: Action,
    pub logical_id: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Resolved properties (no tokens left); `null` for destroy.
    pub properties: Value,
    /// Known physical id, when the resource was applied before.
    pub physical_id: Option<String>,
}

/// Engine response to an apply.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProvisionResponse {
    pub physical_id: String,
    #[serde(default)]
    pub attributes: IndexMap<String, String>,
}

/// Engine response to a describe.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Description {
    /// Live properties; absent when the resource no longer exists.
    #[serde(default)]
    pub properties: Option<Value>,
}

/// Engine failure, carrying the engine's own message verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ProvisionError(pub String);

/// External provisioning engine.
pub trait Provisioner {
    /// Create or update a resource.
    fn apply(&mut self, request: &ProvisionRequest) -> Result<ProvisionResponse, ProvisionError>;

    /// Delete a resource.
    fn destroy(&mut self, request: &ProvisionRequest) -> Result<(), ProvisionError>;

    /// Read back live properties; `Ok(None)` when the resource is gone.
    fn describe(&mut self, request: &ProvisionRequest) -> Result<Option<Value>, ProvisionError>;
}
