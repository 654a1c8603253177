//! Executor: orchestration loop for apply.
//!
//! template → DAG → plan → for each resource in order: resolve tokens →
//! engine → hash → lock → events. A planned no-op whose tokens resolve to
//! new values is applied as an update. Destroys run last, in reverse order.

use super::error::{Result, StackError};
use super::planner;
use super::resolver::{self, Outputs, ResolvedResource};
use super::state;
use super::synth::Template;
use super::types::*;
use crate::provisioner::{Action, ProvisionRequest, Provisioner};
use crate::tripwire::{eventlog, hasher};
use serde_json::Value;
use std::path::Path;
use std::time::Instant;

/// Configuration for an apply run.
pub struct ApplyConfig<'a> {
    pub config: &'a StackConfig,
    pub template: &'a Template,
    pub state_dir: &'a Path,
    pub force: bool,
    pub dry_run: bool,
}

/// Shared context for recording resource outcomes.
struct RecordCtx<'a> {
    lock: &'a mut StackLock,
    state_dir: &'a Path,
    stack: &'a str,
    tripwire: bool,
}

impl RecordCtx<'_> {
    fn event(&self, event: ProvenanceEvent) {
        if !self.tripwire {
            return;
        }
        if let Err(e) = eventlog::append_event(self.state_dir, self.stack, event) {
            tracing::warn!(error = %e, "cannot append provenance event");
        }
    }
}

/// Apply the template: converge every resource, then destroy leftovers.
pub fn apply(cfg: &ApplyConfig, provisioner: &mut dyn Provisioner) -> Result<ApplyResult> {
    let start = Instant::now();
    let stack = cfg.config.name.as_str();

    let execution_order = resolver::build_execution_order(cfg.template)?;
    let existing = state::load_lock(cfg.state_dir, stack)?;
    let plan = planner::plan(stack, cfg.template, &execution_order, existing.as_ref());

    if cfg.dry_run {
        return Ok(ApplyResult {
            stack: stack.to_string(),
            planned_create: plan.to_create,
            planned_update: plan.to_update,
            planned_destroy: plan.to_destroy,
            resources_converged: 0,
            resources_unchanged: plan.unchanged,
            resources_destroyed: 0,
            total_duration: start.elapsed(),
        });
    }

    let run_id = eventlog::generate_run_id();
    let mut lock = existing.unwrap_or_else(|| state::new_lock(stack));
    let mut ctx = RecordCtx {
        lock: &mut lock,
        state_dir: cfg.state_dir,
        stack,
        tripwire: cfg.config.policy.tripwire,
    };
    ctx.event(ProvenanceEvent::ApplyStarted {
        stack: stack.to_string(),
        run_id: run_id.clone(),
        edgestack_version: env!("CARGO_PKG_VERSION").to_string(),
    });
    tracing::info!(stack, run_id = %run_id, "apply started");

    let mut outputs = Outputs::new();
    let mut converged = 0u32;
    let mut unchanged = 0u32;
    let mut destroyed = 0u32;

    for change in plan.changes.iter().filter(|c| c.action != PlanAction::Destroy) {
        let mut change = change.clone();
        if change.action == PlanAction::NoOp && !cfg.force {
            if let Some(resolved) =
                unchanged_outputs(cfg.template, ctx.lock, &change.resource_id, &outputs)
            {
                outputs.insert(change.resource_id.clone(), resolved);
                unchanged += 1;
                continue;
            }
            tracing::debug!(resource = %change.resource_id, "upstream outputs changed");
            change.action = PlanAction::Update;
        }
        match apply_single_resource(cfg, &change, &outputs, provisioner, &mut ctx) {
            Ok(resolved) => {
                outputs.insert(change.resource_id.clone(), resolved);
                converged += 1;
            }
            Err(e) => {
                finish(cfg, ctx.lock)?;
                return Err(e);
            }
        }
    }

    let destroys: Vec<_> = plan
        .changes
        .iter()
        .filter(|c| c.action == PlanAction::Destroy)
        .collect();
    for change in destroys.into_iter().rev() {
        if let Err(e) = destroy_single_resource(change, provisioner, &mut ctx) {
            finish(cfg, ctx.lock)?;
            return Err(e);
        }
        destroyed += 1;
    }

    finish(cfg, ctx.lock)?;

    ctx.event(ProvenanceEvent::ApplyCompleted {
        stack: stack.to_string(),
        run_id,
        resources_converged: converged,
        resources_unchanged: unchanged,
        resources_destroyed: destroyed,
        total_seconds: start.elapsed().as_secs_f64(),
    });
    tracing::info!(stack, converged, unchanged, destroyed, "apply completed");

    Ok(ApplyResult {
        stack: stack.to_string(),
        planned_create: plan.to_create,
        planned_update: plan.to_update,
        planned_destroy: plan.to_destroy,
        resources_converged: converged,
        resources_unchanged: unchanged,
        resources_destroyed: destroyed,
        total_duration: start.elapsed(),
    })
}

/// Locked outputs of an unchanged resource.
///
/// `None` when the lock has no physical id, or when the resource's tokens now
/// resolve to properties other than the ones last applied.
fn unchanged_outputs(
    template: &Template,
    lock: &StackLock,
    resource_id: &str,
    outputs: &Outputs,
) -> Option<ResolvedResource> {
    let resource = template.resources.get(resource_id)?;
    let rl = lock.resources.get(resource_id)?;
    let properties = resolver::resolve_properties(&resource.properties, outputs).ok()?;
    if rl.applied_hash.as_deref() != Some(hasher::hash_json(&properties).as_str()) {
        return None;
    }
    Some(ResolvedResource {
        physical_id: rl.physical_id.clone()?,
        attributes: rl.attributes.clone(),
    })
}

fn finish(cfg: &ApplyConfig, lock: &mut StackLock) -> Result<()> {
    lock.generated_at = eventlog::now_iso8601();
    if cfg.config.policy.lock_file {
        state::save_lock(cfg.state_dir, lock)?;
    }
    Ok(())
}

/// Apply one Create/Update change, returning what the engine reported.
fn apply_single_resource(
    cfg: &ApplyConfig,
    change: &PlannedChange,
    outputs: &Outputs,
    provisioner: &mut dyn Provisioner,
    ctx: &mut RecordCtx,
) -> Result<ResolvedResource> {
    let resource = cfg.template.resources.get(&change.resource_id).ok_or_else(|| {
        StackError::Dependency(format!("'{}' is not in the template", change.resource_id))
    })?;

    ctx.event(ProvenanceEvent::ResourceStarted {
        stack: ctx.stack.to_string(),
        resource: change.resource_id.clone(),
        action: change.action.to_string(),
    });
    tracing::info!(resource = %change.resource_id, action = %change.action, "applying");

    let resource_start = Instant::now();
    let properties = resolver::resolve_properties(&resource.properties, outputs)?;
    let request = ProvisionRequest {
        action: Action::Apply,
        logical_id: change.resource_id.clone(),
        resource_type: resource.resource_type.clone(),
        properties,
        physical_id: ctx
            .lock
            .resources
            .get(&change.resource_id)
            .and_then(|rl| rl.physical_id.clone()),
    };

    match provisioner.apply(&request) {
        Ok(response) => {
            let duration = resource_start.elapsed().as_secs_f64();
            let resolved = ResolvedResource {
                physical_id: response.physical_id,
                attributes: response.attributes,
            };
            record_success(
                ctx,
                &change.resource_id,
                &resource.resource_type,
                planner::hash_desired_state(resource),
                &request.properties,
                &resolved,
                duration,
            );
            Ok(resolved)
        }
        Err(e) => {
            let duration = resource_start.elapsed().as_secs_f64();
            record_failure(
                ctx,
                &change.resource_id,
                &resource.resource_type,
                duration,
                &e.0,
            );
            Err(StackError::Provisioning {
                resource: change.resource_id.clone(),
                message: e.0,
            })
        }
    }
}

/// Record a successful resource application into the lock and event log.
fn record_success(
    ctx: &mut RecordCtx,
    resource_id: &str,
    resource_type: &str,
    desired_hash: String,
    applied_properties: &Value,
    resolved: &ResolvedResource,
    duration: f64,
) {
    ctx.lock.resources.insert(
        resource_id.to_string(),
        ResourceLock {
            resource_type: resource_type.to_string(),
            status: ResourceStatus::Converged,
            applied_at: Some(eventlog::now_iso8601()),
            duration_seconds: Some(duration),
            hash: desired_hash.clone(),
            applied_hash: Some(hasher::hash_json(applied_properties)),
            physical_id: Some(resolved.physical_id.clone()),
            attributes: resolved.attributes.clone(),
        },
    );

    ctx.event(ProvenanceEvent::ResourceConverged {
        stack: ctx.stack.to_string(),
        resource: resource_id.to_string(),
        duration_seconds: duration,
        hash: desired_hash,
    });
}

/// Record a resource failure into the lock and event log.
///
/// A previously assigned physical id is kept so the next run updates the
/// same resource instead of creating a second one.
fn record_failure(
    ctx: &mut RecordCtx,
    resource_id: &str,
    resource_type: &str,
    duration: f64,
    error: &str,
) {
    let previous = ctx.lock.resources.get(resource_id);
    let physical_id = previous.and_then(|rl| rl.physical_id.clone());
    let attributes = previous.map(|rl| rl.attributes.clone()).unwrap_or_default();
    ctx.lock.resources.insert(
        resource_id.to_string(),
        ResourceLock {
            resource_type: resource_type.to_string(),
            status: ResourceStatus::Failed,
            applied_at: Some(eventlog::now_iso8601()),
            duration_seconds: Some(duration),
            hash: String::new(),
            applied_hash: None,
            physical_id,
            attributes,
        },
    );

    ctx.event(ProvenanceEvent::ResourceFailed {
        stack: ctx.stack.to_string(),
        resource: resource_id.to_string(),
        error: error.to_string(),
    });
    tracing::warn!(resource = resource_id, error, "apply failed, stopping");
}

fn destroy_single_resource(
    change: &PlannedChange,
    provisioner: &mut dyn Provisioner,
    ctx: &mut RecordCtx,
) -> Result<()> {
    ctx.event(ProvenanceEvent::ResourceStarted {
        stack: ctx.stack.to_string(),
        resource: change.resource_id.clone(),
        action: change.action.to_string(),
    });
    tracing::info!(resource = %change.resource_id, "destroying");

    let request = ProvisionRequest {
        action: Action::Destroy,
        logical_id: change.resource_id.clone(),
        resource_type: change.resource_type.clone(),
        properties: Value::Null,
        physical_id: ctx
            .lock
            .resources
            .get(&change.resource_id)
            .and_then(|rl| rl.physical_id.clone()),
    };

    let start = Instant::now();
    if let Err(e) = provisioner.destroy(&request) {
        record_failure(
            ctx,
            &change.resource_id,
            &change.resource_type,
            start.elapsed().as_secs_f64(),
            &e.0,
        );
        return Err(StackError::Provisioning {
            resource: change.resource_id.clone(),
            message: e.0,
        });
    }

    ctx.lock.resources.shift_remove(&change.resource_id);
    ctx.event(ProvenanceEvent::ResourceDestroyed {
        stack: ctx.stack.to_string(),
        resource: change.resource_id.clone(),
    });
    Ok(())
}
