//! Plan generation: diff the synthesized template against the stack lock.

use super::synth::{Template, TemplateResource};
use super::types::*;
use crate::tripwire::hasher;

/// Generate an execution plan by comparing the template to lock state.
///
/// Template resources are planned in `execution_order`; lock entries the
/// template no longer declares are appended as destroys.
pub fn plan(
    name: &str,
    template: &Template,
    execution_order: &[String],
    lock: Option<&StackLock>,
) -> ExecutionPlan {
    let mut changes = Vec::new();
    let mut to_create = 0u32;
    let mut to_update = 0u32;
    let mut to_destroy = 0u32;
    let mut unchanged = 0u32;

    for resource_id in execution_order {
        let resource = match template.resources.get(resource_id) {
            Some(r) => r,
            None => continue,
        };

        let action = determine_action(resource_id, resource, lock);
        match action {
            PlanAction::Create => to_create += 1,
            PlanAction::Update => to_update += 1,
            PlanAction::NoOp => unchanged += 1,
            PlanAction::Destroy => to_destroy += 1,
        }

        changes.push(PlannedChange {
            resource_id: resource_id.clone(),
            resource_type: resource.resource_type.clone(),
            description: describe_action(resource_id, &resource.resource_type, &action),
            action,
        });
    }

    if let Some(lock) = lock {
        for (resource_id, rl) in &lock.resources {
            if template.resources.contains_key(resource_id) {
                continue;
            }
            to_destroy += 1;
            changes.push(PlannedChange {
                resource_id: resource_id.clone(),
                resource_type: rl.resource_type.clone(),
                action: PlanAction::Destroy,
                description: describe_action(resource_id, &rl.resource_type, &PlanAction::Destroy),
            });
        }
    }

    ExecutionPlan {
        name: name.to_string(),
        changes,
        execution_order: execution_order.to_vec(),
        to_create,
        to_update,
        to_destroy,
        unchanged,
    }
}

fn determine_action(resource_id: &str, resource: &TemplateResource, lock: Option<&StackLock>) -> PlanAction {
    let Some(rl) = lock.and_then(|l| l.resources.get(resource_id)) else {
        return PlanAction::Create;
    };
    if rl.status != ResourceStatus::Converged {
        // Failed or drifted: re-apply
        return PlanAction::Update;
    }
    if rl.hash == hash_desired_state(resource) {
        PlanAction::NoOp
    } else {
        PlanAction::Update
    }
}

/// Hash of the desired state of one template resource.
///
/// Tokens are hashed unresolved; a dependent whose upstream outputs changed
/// still plans as NoOp and is caught at apply time by comparing its resolved
/// properties with the applied hash.
pub fn hash_desired_state(resource: &TemplateResource) -> String {
    hasher::hash_resource(&resource.resource_type, &resource.properties, &resource.depends_on)
}

/// Short type name for plan output: `AWS::CloudFront::Distribution` -> `Distribution`.
pub fn short_type(resource_type: &str) -> &str {
    resource_type.rsplit("::").next().unwrap_or(resource_type)
}

fn describe_action(resource_id: &str, resource_type: &str, action: &PlanAction) -> String {
    let kind = short_type(resource_type);
    match action {
        PlanAction::Create => format!("{}: create {}", resource_id, kind),
        PlanAction::Update => format!("{}: update {} (desired state changed)", resource_id, kind),
        PlanAction::Destroy => format!("{}: destroy {}", resource_id, kind),
        PlanAction::NoOp => format!("{}: no changes", resource_id),
    }
}
