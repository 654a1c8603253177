//! Drift detection: compare live engine state to lock hashes.

use crate::core::error::{Result, StackError};
use crate::core::types::{ResourceLock, ResourceStatus, StackLock};
use crate::provisioner::{Action, ProvisionRequest, Provisioner};
use crate::tripwire::hasher;
use serde_json::Value;

/// Marker hash for a resource the engine no longer knows about.
pub const MISSING: &str = "MISSING";

/// A single drift finding.
#[derive(Debug, Clone, PartialEq)]
pub struct DriftFinding {
    pub resource_id: String,
    pub resource_type: String,
    pub expected_hash: String,
    pub actual_hash: String,
    pub detail: String,
}

/// Compare one resource's live properties with what was applied.
pub fn check_resource_drift(
    resource_id: &str,
    rl: &ResourceLock,
    expected_hash: &str,
    live: Option<&Value>,
) -> Option<DriftFinding> {
    let Some(live) = live else {
        return Some(DriftFinding {
            resource_id: resource_id.to_string(),
            resource_type: rl.resource_type.clone(),
            expected_hash: expected_hash.to_string(),
            actual_hash: MISSING.to_string(),
            detail: format!("{} no longer exists", resource_id),
        });
    };

    let actual = hasher::hash_json(live);
    if actual == expected_hash {
        return None;
    }
    Some(DriftFinding {
        resource_id: resource_id.to_string(),
        resource_type: rl.resource_type.clone(),
        expected_hash: expected_hash.to_string(),
        actual_hash: actual,
        detail: format!("{} properties changed outside edgestack", resource_id),
    })
}

/// Check every converged resource in a lock for drift.
///
/// Resources without an applied hash (never converged through the engine)
/// are skipped. An engine error aborts the check.
pub fn detect_drift(lock: &StackLock, provisioner: &mut dyn Provisioner) -> Result<Vec<DriftFinding>> {
    let mut findings = Vec::new();

    for (id, rl) in &lock.resources {
        if rl.status != ResourceStatus::Converged {
            continue;
        }
        let Some(expected) = rl.applied_hash.as_deref() else {
            continue;
        };

        let request = ProvisionRequest {
            action: Action::Describe,
            logical_id: id.clone(),
            resource_type: rl.resource_type.clone(),
            properties: Value::Null,
            physical_id: rl.physical_id.clone(),
        };
        let live = provisioner
            .describe(&request)
            .map_err(|e| StackError::Provisioning {
                resource: id.clone(),
                message: e.0,
            })?;

        if let Some(finding) = check_resource_drift(id, rl, expected, live.as_ref()) {
            tracing::warn!(resource = %id, actual = %finding.actual_hash, "drift detected");
            findings.push(finding);
        }
    }

    Ok(findings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provisioner::fake::FakeProvisioner;
    use indexmap::IndexMap;
    use serde_json::json;

    fn converged(props: &Value) -> ResourceLock {
        ResourceLock {
            resource_type: "AWS::CloudFront::CachePolicy".to_string(),
            status: ResourceStatus::Converged,
            applied_at: None,
            duration_seconds: None,
            hash: "blake3:desired".to_string(),
            applied_hash: Some(hasher::hash_json(props)),
            physical_id: Some("phys-Policy".to_string()),
            attributes: IndexMap::new(),
        }
    }

    fn lock_with(resources: Vec<(&str, ResourceLock)>) -> StackLock {
        let mut lock = crate::core::state::new_lock("Signal");
        for (id, rl) in resources {
            lock.resources.insert(id.to_string(), rl);
        }
        lock
    }

    #[test]
    fn test_no_drift() {
        let props = json!({"Name": "LongTerm"});
        let rl = converged(&props);
        let expected = rl.applied_hash.clone().unwrap();
        assert!(check_resource_drift("Policy", &rl, &expected, Some(&props)).is_none());
    }

    #[test]
    fn test_property_drift() {
        let rl = converged(&json!({"Name": "LongTerm"}));
        let expected = rl.applied_hash.clone().unwrap();
        let finding =
            check_resource_drift("Policy", &rl, &expected, Some(&json!({"Name": "Edited"}))).unwrap();
        assert_ne!(finding.actual_hash, expected);
        assert!(finding.detail.contains("changed"));
    }

    #[test]
    fn test_missing_resource() {
        let rl = converged(&json!({}));
        let finding = check_resource_drift("Policy", &rl, "blake3:x", None).unwrap();
        assert_eq!(finding.actual_hash, MISSING);
    }

    #[test]
    fn test_detect_drift_empty_lock() {
        let mut p = FakeProvisioner::new();
        assert!(detect_drift(&lock_with(vec![]), &mut p).unwrap().is_empty());
        assert!(p.calls.is_empty());
    }

    #[test]
    fn test_detect_drift_against_engine() {
        let props = json!({"Name": "LongTerm"});
        let lock = lock_with(vec![
            ("Policy", converged(&props)),
            ("Gone", converged(&props)),
            ("Edited", converged(&props)),
        ]);
        let mut p = FakeProvisioner::new();
        p.live.insert("Policy".to_string(), props.clone());
        p.live.insert("Edited".to_string(), json!({"Name": "Other"}));

        let findings = detect_drift(&lock, &mut p).unwrap();
        let ids: Vec<_> = findings.iter().map(|f| f.resource_id.as_str()).collect();
        assert_eq!(ids, vec!["Gone", "Edited"]);
        assert_eq!(findings[0].actual_hash, MISSING);
    }

    #[test]
    fn test_detect_drift_skips_non_converged() {
        let mut rl = converged(&json!({}));
        rl.status = ResourceStatus::Failed;
        let mut p = FakeProvisioner::new();
        assert!(detect_drift(&lock_with(vec![("Policy", rl)]), &mut p)
            .unwrap()
            .is_empty());
        assert!(p.calls.is_empty());
    }

    #[test]
    fn test_detect_drift_skips_without_applied_hash() {
        let mut rl = converged(&json!({}));
        rl.applied_hash = None;
        let mut p = FakeProvisioner::new();
        assert!(detect_drift(&lock_with(vec![("Policy", rl)]), &mut p)
            .unwrap()
            .is_empty());
    }
}
