//! CLI subcommands: init, validate, synth, plan, apply, drift, status.
//!
//! The process environment is read exactly once, in [`dispatch`]; every
//! command below works from that snapshot.

use crate::core::compose::{compose, Composition, Stack};
use crate::core::descriptors::BucketRef;
use crate::core::error::{Result, StackError};
use crate::core::executor;
use crate::core::inputs::StackInputs;
use crate::core::parser;
use crate::core::planner;
use crate::core::resolver::{self, Environment};
use crate::core::state;
use crate::core::synth::{synthesize, Template};
use crate::core::types::{ExecutionPlan, PlanAction, ProvenanceEvent, StackConfig, StackLock};
use crate::provisioner::command::CommandProvisioner;
use crate::provisioner::Provisioner;
use crate::tripwire::{drift, eventlog};
use clap::Subcommand;
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new edgestack project
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Validate edgestack.yaml and resolve its inputs
    Validate {
        /// Path to edgestack.yaml
        #[arg(short, long, default_value = "edgestack.yaml")]
        file: PathBuf,
    },

    /// Synthesize the provisioning template
    Synth {
        /// Path to edgestack.yaml
        #[arg(short, long, default_value = "edgestack.yaml")]
        file: PathBuf,

        /// Write the template here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show execution plan (diff desired vs current)
    Plan {
        /// Path to edgestack.yaml
        #[arg(short, long, default_value = "edgestack.yaml")]
        file: PathBuf,

        /// State directory
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,
    },

    /// Converge the stack through the provisioning engine
    Apply {
        /// Path to edgestack.yaml
        #[arg(short, long, default_value = "edgestack.yaml")]
        file: PathBuf,

        /// Engine command; receives one JSON request per resource on stdin
        #[arg(long)]
        engine: Option<String>,

        /// Force re-apply all resources
        #[arg(long)]
        force: bool,

        /// Show what would be executed without running
        #[arg(long)]
        dry_run: bool,

        /// State directory
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,
    },

    /// Detect changes made outside edgestack
    Drift {
        /// Path to edgestack.yaml
        #[arg(short, long, default_value = "edgestack.yaml")]
        file: PathBuf,

        /// Engine command used to describe live resources
        #[arg(long)]
        engine: String,

        /// State directory
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,

        /// Exit non-zero on any drift (for CI/cron)
        #[arg(long)]
        tripwire: bool,
    },

    /// Show current state from lock files
    Status {
        /// State directory
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,

        /// Only show this stack
        #[arg(short, long)]
        stack: Option<String>,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<()> {
    let env: Environment = std::env::vars().collect();
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file } => cmd_validate(&file, &env),
        Commands::Synth { file, output } => cmd_synth(&file, &env, output.as_deref()),
        Commands::Plan { file, state_dir } => cmd_plan(&file, &state_dir, &env),
        Commands::Apply {
            file,
            engine,
            force,
            dry_run,
            state_dir,
        } => {
            let mut engine = engine_command(engine, !dry_run)?;
            cmd_apply(&file, &state_dir, &env, &mut engine, force, dry_run)
        }
        Commands::Drift {
            file,
            engine,
            state_dir,
            tripwire,
        } => {
            let mut engine = CommandProvisioner::new(engine);
            cmd_drift(&file, &state_dir, &mut engine, tripwire)
        }
        Commands::Status { state_dir, stack } => cmd_status(&state_dir, stack.as_deref()),
    }
}

fn engine_command(engine: Option<String>, required: bool) -> Result<CommandProvisioner> {
    match engine {
        Some(cmd) => Ok(CommandProvisioner::new(cmd)),
        None if required => Err(StackError::Validation(vec![
            "--engine is required unless --dry-run is given".to_string(),
        ])),
        None => Ok(CommandProvisioner::new(String::new())),
    }
}

const INIT_TEMPLATE: &str = r#"version: "1.0"
name: Signal
description: "Static frontend at signal.<zone>"

params: {}

inputs:
  hosted_zone_id: "{{env.HOSTED_ZONE_ID}}"
  hosted_zone_name: "{{env.HOSTED_ZONE_NAME}}"
  certificate_arn: "{{env.HOSTED_ZONE_CERTIFICATE}}"

bucket:
  name: signal-frontend

policy:
  tripwire: true
  lock_file: true
"#;

fn cmd_init(path: &Path) -> Result<()> {
    let config_path = path.join("edgestack.yaml");
    if config_path.exists() {
        return Err(StackError::Validation(vec![format!(
            "{} already exists",
            config_path.display()
        )]));
    }

    let state_dir = path.join("state");
    std::fs::create_dir_all(&state_dir).map_err(|e| StackError::io(&state_dir, e))?;
    std::fs::write(&config_path, INIT_TEMPLATE).map_err(|e| StackError::io(&config_path, e))?;

    println!("Initialized edgestack project at {}", path.display());
    println!("  Created: {}", config_path.display());
    println!("  Created: {}/", state_dir.display());
    Ok(())
}

/// Parse, validate and resolve inputs; nothing is built on failure.
fn load_and_resolve(file: &Path, env: &Environment) -> Result<(StackConfig, StackInputs)> {
    let config = parser::load_config(file)?;
    let inputs = StackInputs::resolve(&config, env)?;
    Ok((config, inputs))
}

fn build_composition(config: &StackConfig, inputs: &StackInputs) -> Result<Composition> {
    let bucket = BucketRef::new(
        &config.bucket.name,
        config.bucket.regional_domain_name.as_deref(),
    );
    compose(&Stack::new(config.name.as_str()), inputs, &bucket)
}

/// Full pipeline from stack file to template.
fn build_template(file: &Path, env: &Environment) -> Result<(StackConfig, Template)> {
    let (config, inputs) = load_and_resolve(file, env)?;
    let composition = build_composition(&config, &inputs)?;
    let template = synthesize(&composition);
    Ok((config, template))
}

fn cmd_validate(file: &Path, env: &Environment) -> Result<()> {
    let (config, inputs) = load_and_resolve(file, env)?;
    println!(
        "OK: {} (zone {} {}, bucket {})",
        config.name, inputs.hosted_zone_name, inputs.hosted_zone_id, config.bucket.name
    );
    Ok(())
}

fn cmd_synth(file: &Path, env: &Environment, output: Option<&Path>) -> Result<()> {
    let (_, template) = build_template(file, env)?;
    match output {
        Some(path) => {
            template.write_to(path)?;
            println!(
                "Wrote {} ({} resources)",
                path.display(),
                template.resources.len()
            );
        }
        None => println!("{}", template.to_json_pretty()?),
    }
    Ok(())
}

fn cmd_plan(file: &Path, state_dir: &Path, env: &Environment) -> Result<()> {
    let (config, template) = build_template(file, env)?;
    let execution_order = resolver::build_execution_order(&template)?;
    let lock = state::load_lock(state_dir, &config.name)?;
    let plan = planner::plan(&config.name, &template, &execution_order, lock.as_ref());
    print_plan(&plan);
    Ok(())
}

/// Display a plan to stdout.
fn print_plan(plan: &ExecutionPlan) {
    println!("Planning: {} ({} resources)", plan.name, plan.changes.len());
    println!();

    for change in &plan.changes {
        let symbol = match change.action {
            PlanAction::Create => "+",
            PlanAction::Update => "~",
            PlanAction::Destroy => "-",
            PlanAction::NoOp => " ",
        };
        println!("  {} {}", symbol, change.description);
    }

    println!();
    println!(
        "Plan: {} to add, {} to change, {} to destroy, {} unchanged.",
        plan.to_create, plan.to_update, plan.to_destroy, plan.unchanged
    );
}

fn cmd_apply(
    file: &Path,
    state_dir: &Path,
    env: &Environment,
    provisioner: &mut dyn Provisioner,
    force: bool,
    dry_run: bool,
) -> Result<()> {
    let (config, template) = build_template(file, env)?;

    let cfg = executor::ApplyConfig {
        config: &config,
        template: &template,
        state_dir,
        force,
        dry_run,
    };
    let result = executor::apply(&cfg, provisioner)?;

    if dry_run {
        println!(
            "Dry run: {} to add, {} to change, {} to destroy, {} unchanged.",
            result.planned_create,
            result.planned_update,
            result.planned_destroy,
            result.resources_unchanged
        );
        return Ok(());
    }

    println!(
        "Apply complete: {} converged, {} unchanged, {} destroyed ({:.1}s).",
        result.resources_converged,
        result.resources_unchanged,
        result.resources_destroyed,
        result.total_duration.as_secs_f64()
    );
    if let Some(lock) = state::load_lock(state_dir, &config.name)? {
        print_outputs(&template, &lock);
    }
    Ok(())
}

/// Print template outputs resolved against the lock.
fn print_outputs(template: &Template, lock: &StackLock) {
    let outputs: resolver::Outputs = lock
        .resources
        .iter()
        .filter_map(|(id, rl)| {
            Some((
                id.clone(),
                resolver::ResolvedResource {
                    physical_id: rl.physical_id.clone()?,
                    attributes: rl.attributes.clone(),
                },
            ))
        })
        .collect();
    for (name, output) in &template.outputs {
        match resolver::resolve_properties(&output.value, &outputs) {
            Ok(serde_json::Value::String(v)) => println!("  {} = {}", name, v),
            Ok(other) => println!("  {} = {}", name, other),
            Err(e) => tracing::debug!(output = %name, error = %e, "output unresolved"),
        }
    }
}

fn cmd_drift(
    file: &Path,
    state_dir: &Path,
    provisioner: &mut dyn Provisioner,
    tripwire_mode: bool,
) -> Result<()> {
    let config = parser::load_config(file)?;
    let Some(lock) = state::load_lock(state_dir, &config.name)? else {
        println!("No state for {}; nothing to check.", config.name);
        return Ok(());
    };

    println!("Checking {} ({} resources)...", config.name, lock.resources.len());
    let findings = drift::detect_drift(&lock, provisioner)?;

    if findings.is_empty() {
        println!("No drift detected.");
        return Ok(());
    }

    for f in &findings {
        println!("  DRIFTED: {} ({})", f.resource_id, f.detail);
        println!("    Expected: {}", f.expected_hash);
        println!("    Actual:   {}", f.actual_hash);
        if config.policy.tripwire {
            eventlog::append_event(
                state_dir,
                &config.name,
                ProvenanceEvent::DriftDetected {
                    stack: config.name.clone(),
                    resource: f.resource_id.clone(),
                    expected_hash: f.expected_hash.clone(),
                    actual_hash: f.actual_hash.clone(),
                },
            )?;
        }
    }
    println!();
    println!("Drift detected: {} resource(s)", findings.len());

    if tripwire_mode {
        return Err(StackError::Drift(findings.len()));
    }
    Ok(())
}

fn cmd_status(state_dir: &Path, stack_filter: Option<&str>) -> Result<()> {
    let entries = std::fs::read_dir(state_dir).map_err(|e| StackError::io(state_dir, e))?;

    let mut names: Vec<String> = entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|name| stack_filter.map_or(true, |f| f == name))
        .collect();
    names.sort();

    let mut found = false;
    for name in &names {
        let Some(lock) = state::load_lock(state_dir, name)? else {
            continue;
        };
        found = true;
        println!("Stack: {}", lock.stack);
        println!("  Generated: {}", lock.generated_at);
        println!("  Generator: {}", lock.generator);
        println!("  Resources: {}", lock.resources.len());

        for (id, rl) in &lock.resources {
            let duration = rl
                .duration_seconds
                .map(|d| format!(" ({:.2}s)", d))
                .unwrap_or_default();
            let physical = rl
                .physical_id
                .as_deref()
                .map(|p| format!(" -> {}", p))
                .unwrap_or_default();
            println!(
                "    {}: {} [{}]{}{}",
                id,
                rl.status,
                planner::short_type(&rl.resource_type),
                physical,
                duration
            );
        }
    }

    if !found {
        println!("No state found in {}", state_dir.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ResourceStatus;
    use crate::provisioner::fake::FakeProvisioner;

    const STACK: &str = r#"
version: "1.0"
name: Signal
inputs:
  hosted_zone_id: "{{env.HOSTED_ZONE_ID}}"
  hosted_zone_name: "{{env.HOSTED_ZONE_NAME}}"
  certificate_arn: "{{env.HOSTED_ZONE_CERTIFICATE}}"
bucket:
  name: signal-frontend
"#;

    fn env() -> Environment {
        Environment::from([
            ("HOSTED_ZONE_ID".to_string(), "Z123".to_string()),
            ("HOSTED_ZONE_NAME".to_string(), "example.com".to_string()),
            (
                "HOSTED_ZONE_CERTIFICATE".to_string(),
                "arn:aws:acm:us-east-1:123456789012:certificate/abc".to_string(),
            ),
        ])
    }

    fn write_stack(dir: &Path) -> PathBuf {
        let file = dir.join("edgestack.yaml");
        std::fs::write(&file, STACK).unwrap();
        file
    }

    #[test]
    fn test_init() {
        let dir = tempfile::tempdir().unwrap();
        cmd_init(dir.path()).unwrap();
        assert!(dir.path().join("edgestack.yaml").exists());
        assert!(dir.path().join("state").is_dir());

        let config = parser::load_config(&dir.path().join("edgestack.yaml")).unwrap();
        assert_eq!(config.name, "Signal");
    }

    #[test]
    fn test_init_already_exists() {
        let dir = tempfile::tempdir().unwrap();
        write_stack(dir.path());
        assert!(cmd_init(dir.path()).is_err());
    }

    #[test]
    fn test_validate_valid() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_stack(dir.path());
        cmd_validate(&file, &env()).unwrap();
    }

    #[test]
    fn test_validate_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_stack(dir.path());
        let mut env = env();
        env.remove("HOSTED_ZONE_ID");
        match cmd_validate(&file, &env).unwrap_err() {
            StackError::MissingInput { input, variable } => {
                assert_eq!(input, "hosted_zone_id");
                assert_eq!(variable, "HOSTED_ZONE_ID");
            }
            other => panic!("expected MissingInput, got {other}"),
        }
    }

    #[test]
    fn test_validate_invalid_structure() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("edgestack.yaml");
        std::fs::write(&file, STACK.replace("name: Signal", "name: bad-name")).unwrap();
        let err = cmd_validate(&file, &env()).unwrap_err();
        assert!(matches!(err, StackError::Validation(_)));
    }

    #[test]
    fn test_synth_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_stack(dir.path());
        let out = dir.path().join("template.json");
        cmd_synth(&file, &env(), Some(&out)).unwrap();
        let t: Template = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(t.resources.len(), 6);
        assert!(t.resources.contains_key("SignalFrontendCNAME"));
    }

    #[test]
    fn test_synth_fails_without_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_stack(dir.path());
        let out = dir.path().join("template.json");
        let err = cmd_synth(&file, &Environment::new(), Some(&out)).unwrap_err();
        assert!(err.is_configuration());
        assert!(!out.exists());
    }

    #[test]
    fn test_plan() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_stack(dir.path());
        cmd_plan(&file, &dir.path().join("state"), &env()).unwrap();
    }

    #[test]
    fn test_apply_dry_run() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_stack(dir.path());
        let state_dir = dir.path().join("state");
        let mut p = FakeProvisioner::new();
        cmd_apply(&file, &state_dir, &env(), &mut p, false, true).unwrap();
        assert!(p.calls.is_empty());
        assert!(!state::lock_file_path(&state_dir, "Signal").exists());
    }

    #[test]
    fn test_apply_real() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_stack(dir.path());
        let state_dir = dir.path().join("state");
        let mut p = FakeProvisioner::new();
        cmd_apply(&file, &state_dir, &env(), &mut p, false, false).unwrap();
        assert_eq!(p.applied().len(), 6);

        let lock = state::load_lock(&state_dir, "Signal").unwrap().unwrap();
        assert!(lock
            .resources
            .values()
            .all(|rl| rl.status == ResourceStatus::Converged));
    }

    #[test]
    fn test_apply_missing_inputs_never_reaches_engine() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_stack(dir.path());
        let state_dir = dir.path().join("state");
        let mut p = FakeProvisioner::new();
        let err = cmd_apply(&file, &state_dir, &Environment::new(), &mut p, false, false)
            .unwrap_err();
        assert!(err.is_configuration());
        match &err {
            StackError::InvalidInputs(errors) => assert_eq!(errors.len(), 3),
            other => panic!("expected InvalidInputs, got {other}"),
        }
        assert!(p.calls.is_empty());
        assert!(!state::lock_file_path(&state_dir, "Signal").exists());
        assert!(!eventlog::event_log_path(&state_dir, "Signal").exists());
    }

    #[test]
    fn test_apply_engine_rejection_surfaces_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_stack(dir.path());
        let mut p = FakeProvisioner::new().reject("SignalFrontendCNAME");
        let err = cmd_apply(&file, &dir.path().join("state"), &env(), &mut p, false, false)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "provisioning SignalFrontendCNAME failed: engine rejected SignalFrontendCNAME"
        );
    }

    #[test]
    fn test_engine_required_for_apply() {
        assert!(engine_command(None, true).is_err());
        assert!(engine_command(None, false).is_ok());
        assert!(engine_command(Some("true".to_string()), true).is_ok());
    }

    #[test]
    fn test_drift_without_state() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_stack(dir.path());
        let mut p = FakeProvisioner::new();
        cmd_drift(&file, &dir.path().join("state"), &mut p, true).unwrap();
        assert!(p.calls.is_empty());
    }

    #[test]
    fn test_drift_clean_after_apply() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_stack(dir.path());
        let state_dir = dir.path().join("state");
        let mut p = FakeProvisioner::new();
        cmd_apply(&file, &state_dir, &env(), &mut p, false, false).unwrap();
        cmd_drift(&file, &state_dir, &mut p, true).unwrap();
    }

    #[test]
    fn test_drift_tripwire_fails() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_stack(dir.path());
        let state_dir = dir.path().join("state");
        let mut p = FakeProvisioner::new();
        cmd_apply(&file, &state_dir, &env(), &mut p, false, false).unwrap();

        p.live.remove("SignalFrontendCNAME");
        p.live.insert(
            "SignalResponseHeadersPolicy".to_string(),
            serde_json::json!({"edited": true}),
        );
        let err = cmd_drift(&file, &state_dir, &mut p, true).unwrap_err();
        assert!(matches!(err, StackError::Drift(2)));

        let events = eventlog::read_events(&state_dir, "Signal").unwrap();
        let drifted = events
            .iter()
            .filter(|e| matches!(e.event, ProvenanceEvent::DriftDetected { .. }))
            .count();
        assert_eq!(drifted, 2);
    }

    #[test]
    fn test_drift_report_only() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_stack(dir.path());
        let state_dir = dir.path().join("state");
        let mut p = FakeProvisioner::new();
        cmd_apply(&file, &state_dir, &env(), &mut p, false, false).unwrap();
        p.live.clear();
        cmd_drift(&file, &state_dir, &mut p, false).unwrap();
    }

    #[test]
    fn test_status_empty() {
        let dir = tempfile::tempdir().unwrap();
        cmd_status(dir.path(), None).unwrap();
    }

    #[test]
    fn test_status_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = cmd_status(&dir.path().join("nope"), None).unwrap_err();
        assert!(matches!(err, StackError::Io { .. }));
    }

    #[test]
    fn test_status_with_lock() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_stack(dir.path());
        let state_dir = dir.path().join("state");
        cmd_apply(&file, &state_dir, &env(), &mut FakeProvisioner::new(), false, false).unwrap();
        cmd_status(&state_dir, None).unwrap();
        cmd_status(&state_dir, Some("Signal")).unwrap();
        cmd_status(&state_dir, Some("Other")).unwrap();
    }
}
