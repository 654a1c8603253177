//! Stack file schema, state lock, plan and provenance event types.
//!
//! Everything here derives Serialize/Deserialize so that configs and locks
//! roundtrip through YAML and events through JSON.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ============================================================================
// Top-level edgestack.yaml
// ============================================================================

/// Root configuration: one stack serving one static frontend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackConfig {
    /// Schema version (must be "1.0")
    pub version: String,

    /// Stack name, used as the prefix of every logical id
    pub name: String,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// Global parameters (templatable)
    #[serde(default)]
    pub params: HashMap<String, serde_yaml_ng::Value>,

    /// Required external identifiers
    #[serde(default)]
    pub inputs: InputsSpec,

    /// The existing bucket the distribution serves from
    pub bucket: BucketSpec,

    /// Execution policy
    #[serde(default)]
    pub policy: Policy,
}

/// Unresolved input expressions, e.g. `"{{env.HOSTED_ZONE_ID}}"`.
///
/// Absent keys are kept as `None` so they surface as missing inputs rather
/// than YAML errors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputsSpec {
    #[serde(default)]
    pub hosted_zone_id: Option<String>,

    #[serde(default)]
    pub hosted_zone_name: Option<String>,

    #[serde(default)]
    pub certificate_arn: Option<String>,
}

/// Reference to a bucket created elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketSpec {
    /// Bucket name
    pub name: String,

    /// Origin domain; defaults to the global S3 endpoint for the bucket
    #[serde(default)]
    pub regional_domain_name: Option<String>,
}

/// Execution policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// Append provenance events on every apply
    #[serde(default = "default_true")]
    pub tripwire: bool,

    /// Persist the state lock after apply
    #[serde(default = "default_true")]
    pub lock_file: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            tripwire: true,
            lock_file: true,
        }
    }
}

fn default_true() -> bool {
    true
}

// ============================================================================
// State / Lock file
// ============================================================================

/// Per-stack state lock file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackLock {
    /// Schema version
    pub schema: String,

    /// Stack name
    pub stack: String,

    /// When the lock was generated
    pub generated_at: String,

    /// Generator version
    pub generator: String,

    /// BLAKE3 version
    pub blake3_version: String,

    /// Per-resource state, in apply order
    pub resources: IndexMap<String, ResourceLock>,
}

/// Per-resource lock entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLock {
    /// Provider resource type, e.g. `AWS::CloudFront::Distribution`
    #[serde(rename = "type")]
    pub resource_type: String,

    /// Convergence status
    pub status: ResourceStatus,

    /// When the resource was last applied
    #[serde(default)]
    pub applied_at: Option<String>,

    /// Duration of last apply in seconds
    #[serde(default)]
    pub duration_seconds: Option<f64>,

    /// BLAKE3 hash of the desired (template) state
    pub hash: String,

    /// BLAKE3 hash of the resolved properties handed to the engine
    #[serde(default)]
    pub applied_hash: Option<String>,

    /// Engine-assigned physical identifier
    #[serde(default)]
    pub physical_id: Option<String>,

    /// Engine-assigned attributes (e.g. `DomainName`)
    #[serde(default)]
    pub attributes: IndexMap<String, String>,
}

/// Resource convergence status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Converged,
    Failed,
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Converged => write!(f, "CONVERGED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

// ============================================================================
// Plan
// ============================================================================

/// Action to take on a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanAction {
    Create,
    Update,
    Destroy,
    NoOp,
}

impl fmt::Display for PlanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "CREATE"),
            Self::Update => write!(f, "UPDATE"),
            Self::Destroy => write!(f, "DESTROY"),
            Self::NoOp => write!(f, "NO-OP"),
        }
    }
}

/// A single planned change.
#[derive(Debug, Clone)]
pub struct PlannedChange {
    /// Logical id
    pub resource_id: String,

    /// Provider resource type
    pub resource_type: String,

    /// Action to take
    pub action: PlanAction,

    /// Human-readable description
    pub description: String,
}

/// Full execution plan.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    /// Stack name
    pub name: String,

    /// Planned changes; template resources in execution order, then destroys
    pub changes: Vec<PlannedChange>,

    /// Topological execution order (logical ids)
    pub execution_order: Vec<String>,

    /// Summary counts
    pub to_create: u32,
    pub to_update: u32,
    pub to_destroy: u32,
    pub unchanged: u32,
}

// ============================================================================
// Provenance events
// ============================================================================

/// Provenance event for the JSONL event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProvenanceEvent {
    ApplyStarted {
        stack: String,
        run_id: String,
        edgestack_version: String,
    },
    ResourceStarted {
        stack: String,
        resource: String,
        action: String,
    },
    ResourceConverged {
        stack: String,
        resource: String,
        duration_seconds: f64,
        hash: String,
    },
    ResourceFailed {
        stack: String,
        resource: String,
        error: String,
    },
    ResourceDestroyed {
        stack: String,
        resource: String,
    },
    ApplyCompleted {
        stack: String,
        run_id: String,
        resources_converged: u32,
        resources_unchanged: u32,
        resources_destroyed: u32,
        total_seconds: f64,
    },
    DriftDetected {
        stack: String,
        resource: String,
        expected_hash: String,
        actual_hash: String,
    },
}

/// Timestamped event wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub ts: String,
    #[serde(flatten)]
    pub event: ProvenanceEvent,
}

// ============================================================================
// Apply result
// ============================================================================

/// Result of applying one stack.
#[derive(Debug, Clone)]
pub struct ApplyResult {
    pub stack: String,
    /// Plan counts, reported for dry runs too
    pub planned_create: u32,
    pub planned_update: u32,
    pub planned_destroy: u32,
    pub resources_converged: u32,
    pub resources_unchanged: u32,
    pub resources_destroyed: u32,
    pub total_duration: std::time::Duration,
}

// ============================================================================
// Template helper
// ============================================================================

/// Convert a serde_yaml_ng::Value to a string for template resolution.
pub fn yaml_value_to_string(val: &serde_yaml_ng::Value) -> String {
    match val {
        serde_yaml_ng::Value::String(s) => s.clone(),
        serde_yaml_ng::Value::Number(n) => n.to_string(),
        serde_yaml_ng::Value::Bool(b) => b.to_string(),
        serde_yaml_ng::Value::Null => String::new(),
        other => format!("{:?}", other),
    }
}
