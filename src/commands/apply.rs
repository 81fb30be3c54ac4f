use crate::Context;
use crate::cli::ApplyArgs;
use crate::config::{Transaction, TransactionFile};
use crate::monitor::{LogListener, ProgressBarMonitor};
use crate::store::FileProfileStore;
use crate::touchpoint::NativeTouchpoint;
use crate::{paths, ui};
use anyhow::{Result, bail};
use chrono::{DateTime, Local};
use phasekit::{Engine, PerformResult, PhaseSet, Profile, ProfileStore, Resolution, TouchpointRegistry};
use serde::Serialize;
use std::sync::Arc;

/// What a transaction would do, phase by phase
#[derive(Debug, Serialize)]
struct Plan {
    profile: String,
    operands: Vec<String>,
    phases: Vec<PlannedPhase>,
}

#[derive(Debug, Serialize)]
struct PlannedPhase {
    id: String,
    weight: u64,
    units: Vec<String>,
}

fn plan(tx: &Transaction, phases: &PhaseSet) -> Plan {
    let weights = phases.progress_weights(&tx.operands);
    let planned = phases
        .phases()
        .iter()
        .zip(weights)
        .map(|(phase, weight)| PlannedPhase {
            id: phase.id().to_string(),
            weight,
            units: tx
                .operands
                .iter()
                .filter(|op| phase.is_applicable(op))
                .filter_map(|op| phase.unit(op))
                .map(|unit| unit.key().to_string())
                .collect(),
        })
        .collect();

    Plan {
        profile: tx.profile_id.clone(),
        operands: tx.operands.iter().map(ToString::to_string).collect(),
        phases: planned,
    }
}

fn print_plan(plan: &Plan) {
    ui::header(&format!("Transaction for profile '{}'", plan.profile));
    for operand in &plan.operands {
        ui::dim(operand);
    }

    ui::section("Phases");
    for phase in &plan.phases {
        let units = if phase.units.is_empty() {
            "-".to_string()
        } else {
            phase.units.join(", ")
        };
        ui::kv(&phase.id, &format!("{units} (weight {})", phase.weight));
    }
    println!();
}

fn confirm() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()?;

    Ok(confirmed)
}

/// The stored profile, or a new one seeded with the transaction's properties
fn load_or_create(store: &FileProfileStore, tx: &Transaction) -> Result<Profile> {
    if let Some(profile) = store.get(&tx.profile_id)? {
        if !tx.properties.is_empty() {
            log::debug!("Profile '{}' exists; ignoring seed properties", tx.profile_id);
        }
        return Ok(profile);
    }

    log::info!("Profile '{}' not found, creating it", tx.profile_id);
    let mut profile = Profile::new(&tx.profile_id);
    for (key, value) in &tx.properties {
        profile.set_property(key, value);
    }
    Ok(profile)
}

/// Per-run backup directory name; the pid keeps concurrent runs apart
fn backup_dir_name(profile_id: &str, now: DateTime<Local>) -> String {
    format!(
        "{}-{}-{}",
        profile_id,
        now.format("%Y%m%d-%H%M%S"),
        std::process::id()
    )
}

/// Whether the status tree is worth printing after the summary line
fn shows_status_tree(result: &PerformResult, verbose: u8) -> bool {
    verbose > 0 || !result.status.is_ok()
}

fn report(result: &PerformResult, verbose: u8) {
    match result.resolution {
        Resolution::Committed => ui::success("Transaction committed"),
        Resolution::RolledBack => ui::error("Transaction rolled back"),
        Resolution::Unresolved => ui::warn("Transaction unresolved, profile not saved"),
    }
    if shows_status_tree(result, verbose) {
        ui::status_tree(&result.status);
    }
}

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let tx = TransactionFile::load(&args.file)?.resolve(args.profile.as_deref())?;
    let phases = PhaseSet::default();
    let plan = plan(&tx, &phases);

    if args.dry_run {
        if args.json {
            println!("{}", serde_json::to_string_pretty(&plan)?);
        } else {
            print_plan(&plan);
            ui::info("Dry run, nothing changed");
        }
        return Ok(());
    }

    if !args.json && !ctx.quiet {
        print_plan(&plan);
    }
    if !args.yes && !args.json && !confirm()? {
        ui::info("Aborted");
        return Ok(());
    }

    let store = Arc::new(FileProfileStore::new(paths::profiles_dir()?));
    let mut profile = load_or_create(&store, &tx)?;

    let backup_root = paths::backups_dir()?.join(backup_dir_name(&tx.profile_id, Local::now()));
    if ctx.verbose > 0 && !args.json {
        ui::kv("Backups", &backup_root.display().to_string());
    }
    let mut touchpoints = TouchpointRegistry::with_null();
    touchpoints.register(Arc::new(NativeTouchpoint::new(backup_root)));

    let engine = Engine::new(store, touchpoints).with_listener(Arc::new(LogListener));
    let monitor = if ctx.quiet || args.json {
        ProgressBarMonitor::hidden()
    } else {
        ProgressBarMonitor::new()
    };

    let result = engine.perform(&mut profile, &phases, &tx.operands, &monitor)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        report(&result, ctx.verbose);
    }

    if !result.is_committed() {
        bail!("Transaction for profile '{}' {}", tx.profile_id, result.resolution);
    }
    Ok(())
}
