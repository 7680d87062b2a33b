//! wavegate CLI - phase gates and circuit breaker for multi-agent waves
//!
//! Usage:
//!   wavegate init                          Create .wavegate/ and a default config
//!   wavegate breaker check --wave <n>      Evaluate thresholds once
//!   wavegate breaker monitor --wave <n>    Evaluate until the breaker opens
//!   wavegate breaker trip --wave <n>       Open the breaker manually
//!   wavegate breaker reset --wave <n>      Close the breaker
//!   wavegate breaker status --wave <n>     Show state and live readings
//!   wavegate validate --wave <n> --phase <p>
//!
//! Exit codes: `breaker` 0 closed, 1 open; `validate` 0 pass, 1 fail,
//! 2 blocked. Invalid arguments and malformed configuration exit 2.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use wavegate_breaker::{
    run_monitor, BreakerReport, CancellationToken, CircuitBreakerMonitor, CommandNotifier,
    FanoutNotifier, JournalNotifier, LogNotifier, MonitorExit, Thresholds, TokioSleeper,
};
use wavegate_core::{
    BreakerStatus, GatePhase, StateLayout, WaveGateConfig, WaveGateError, WaveNumber,
};
use wavegate_gate::{GateOutcome, PhaseGateValidator, ValidateOptions, Verdict};

const EXIT_OK: u8 = 0;
const EXIT_OPEN: u8 = 1;
const EXIT_FAIL: u8 = 1;
const EXIT_BLOCKED: u8 = 2;
const EXIT_USAGE: u8 = 2;

#[derive(Parser)]
#[command(name = "wavegate")]
#[command(author, version, about = "Phase gates and circuit breaker for multi-agent waves")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the .wavegate directory and a default config
    Init {
        /// Project root
        #[arg(long, default_value = ".")]
        project: PathBuf,

        /// Also create the directory skeleton for this wave
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        wave: Option<WaveNumber>,

        /// Overwrite an existing config with defaults
        #[arg(long)]
        force: bool,
    },

    /// Circuit breaker operations
    Breaker {
        #[command(subcommand)]
        action: BreakerCommands,
    },

    /// Validate advancement into a phase, writing its lock on success
    Validate {
        #[command(flatten)]
        target: WaveTarget,

        /// Phase to enter (1-4 or build, smoke-test, dev-complete, qa)
        #[arg(long)]
        phase: GatePhase,

        /// Run every check but never write a lock
        #[arg(long)]
        dry_run: bool,

        /// Record the repository check as skipped
        #[arg(long)]
        skip_repo_check: bool,

        /// Print the verdict as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum BreakerCommands {
    /// Evaluate thresholds once; trips on the first breach
    Check {
        #[command(flatten)]
        target: WaveTarget,

        /// Budget in USD (overrides config)
        #[arg(long, value_parser = parse_budget)]
        budget: Option<f64>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check repeatedly until the breaker opens or Ctrl-C
    Monitor {
        #[command(flatten)]
        target: WaveTarget,

        /// Budget in USD (overrides config)
        #[arg(long, value_parser = parse_budget)]
        budget: Option<f64>,

        /// Seconds between checks (overrides config)
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        interval: Option<u64>,
    },

    /// Close the breaker and clear the emergency stop
    Reset {
        #[command(flatten)]
        target: WaveTarget,
    },

    /// Open the breaker manually
    Trip {
        #[command(flatten)]
        target: WaveTarget,

        /// Why the wave is being halted
        #[arg(long, value_parser = parse_reason)]
        reason: String,
    },

    /// Show breaker state and live signal readings
    Status {
        #[command(flatten)]
        target: WaveTarget,

        /// Budget in USD (overrides config)
        #[arg(long, value_parser = parse_budget)]
        budget: Option<f64>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct WaveTarget {
    /// Project root
    #[arg(long, default_value = ".")]
    project: PathBuf,

    /// Wave number (1 or greater)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    wave: WaveNumber,
}

fn parse_budget(s: &str) -> std::result::Result<f64, String> {
    let budget: f64 = s
        .trim()
        .trim_start_matches('$')
        .parse()
        .map_err(|_| format!("'{}' is not a number", s))?;
    if budget.is_finite() && budget > 0.0 {
        Ok(budget)
    } else {
        Err(format!("budget must be a positive amount, got {}", s))
    }
}

fn parse_reason(s: &str) -> std::result::Result<String, String> {
    let reason = s.trim();
    if reason.is_empty() {
        Err("reason must not be empty".to_string())
    } else {
        Ok(reason.to_string())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let result = match cli.command {
        Commands::Init {
            project,
            wave,
            force,
        } => cmd_init(project, wave, force),
        Commands::Breaker { action } => cmd_breaker(action).await,
        Commands::Validate {
            target,
            phase,
            dry_run,
            skip_repo_check,
            json,
        } => {
            let options = ValidateOptions {
                dry_run,
                skip_repository_check: skip_repo_check,
                verbose: cli.verbose,
            };
            cmd_validate(target, phase, options, json)
        }
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_status_for(&e))
        }
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env("WAVEGATE_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    // stdout is reserved for check lines and JSON
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Configuration and argument errors exit 2; anything else means "not safe"
fn exit_status_for(error: &anyhow::Error) -> u8 {
    match error.downcast_ref::<WaveGateError>() {
        Some(WaveGateError::Config(_)) | Some(WaveGateError::InvalidArgument(_)) => EXIT_USAGE,
        _ => EXIT_FAIL,
    }
}

fn load_config(project: &Path) -> Result<WaveGateConfig> {
    WaveGateConfig::load_or_default(project)
        .with_context(|| format!("Failed to load config for {}", project.display()))
}

fn cmd_init(project: PathBuf, wave: Option<WaveNumber>, force: bool) -> Result<u8> {
    info!("Initializing wavegate in {:?}", project);
    let layout = StateLayout::new(&project);

    std::fs::create_dir_all(layout.base_dir())
        .with_context(|| format!("Failed to create {}", layout.base_dir().display()))?;

    println!("Initialized wavegate in {}", project.display());
    println!("Created:");

    let config_path = layout.config_path();
    if config_path.exists() && !force {
        println!("  {} (kept existing)", config_path.display());
    } else {
        WaveGateConfig::write_default(&project).context("Failed to write default config")?;
        println!("  {}", config_path.display());
    }

    if let Some(wave) = wave {
        layout
            .ensure_wave_dirs(wave)
            .with_context(|| format!("Failed to create directories for wave {}", wave))?;
        println!("  {}", layout.signals_dir(wave).display());
        println!("  {}", layout.locks_dir(wave).display());
        println!("  {}", layout.work_items_dir(wave).display());
    }

    Ok(EXIT_OK)
}

fn build_monitor(
    target: &WaveTarget,
    config: &WaveGateConfig,
    budget: Option<f64>,
) -> CircuitBreakerMonitor {
    let layout = StateLayout::new(&target.project);
    let thresholds = Thresholds::from_config(&config.breaker).with_budget(budget);

    let mut notifier = FanoutNotifier::new()
        .with(LogNotifier)
        .with(JournalNotifier::new(layout.notifications_log()));
    if let Some(command) = &config.breaker.notify_command {
        notifier = notifier.with(CommandNotifier::new(command.clone()));
    }

    CircuitBreakerMonitor::new(layout, target.wave, thresholds).with_notifier(Arc::new(notifier))
}

fn status_exit(status: &BreakerStatus) -> u8 {
    if status.is_open() {
        EXIT_OPEN
    } else {
        EXIT_OK
    }
}

async fn cmd_breaker(action: BreakerCommands) -> Result<u8> {
    match action {
        BreakerCommands::Check {
            target,
            budget,
            json,
        } => {
            let config = load_config(&target.project)?;
            let monitor = build_monitor(&target, &config, budget);
            let status = monitor
                .check()
                .with_context(|| format!("Breaker state for wave {} unavailable", target.wave))?;

            if json {
                let out = serde_json::json!({ "wave": target.wave, "breaker": status });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                print_status_line(target.wave, &status);
            }
            Ok(status_exit(&status))
        }

        BreakerCommands::Monitor {
            target,
            budget,
            interval,
        } => {
            let config = load_config(&target.project)?;
            let monitor = build_monitor(&target, &config, budget);
            let interval =
                Duration::from_secs(interval.unwrap_or(config.breaker.poll_interval_secs));

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_interrupt.cancel();
                }
            });

            println!(
                "Monitoring wave {} every {}s (Ctrl-C to stop)",
                target.wave,
                interval.as_secs()
            );
            match run_monitor(&monitor, interval, &TokioSleeper, &cancel).await? {
                MonitorExit::Tripped { reason, iterations } => {
                    println!(
                        "Wave {} breaker OPEN after {} check(s): {}",
                        target.wave, iterations, reason
                    );
                    Ok(EXIT_OPEN)
                }
                MonitorExit::Cancelled { iterations } => {
                    println!("Stopped after {} check(s); breaker CLOSED", iterations);
                    Ok(EXIT_OK)
                }
            }
        }

        BreakerCommands::Reset { target } => {
            let config = load_config(&target.project)?;
            let status = build_monitor(&target, &config, None)
                .reset()
                .with_context(|| format!("Failed to reset breaker for wave {}", target.wave))?;
            print_status_line(target.wave, &status);
            Ok(status_exit(&status))
        }

        BreakerCommands::Trip { target, reason } => {
            let config = load_config(&target.project)?;
            let status = build_monitor(&target, &config, None)
                .trip(&reason)
                .with_context(|| format!("Failed to trip breaker for wave {}", target.wave))?;
            print_status_line(target.wave, &status);
            Ok(status_exit(&status))
        }

        BreakerCommands::Status {
            target,
            budget,
            json,
        } => {
            let config = load_config(&target.project)?;
            let report = build_monitor(&target, &config, budget)
                .status()
                .with_context(|| format!("Breaker state for wave {} unavailable", target.wave))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            Ok(status_exit(&report.state.status))
        }
    }
}

fn print_status_line(wave: WaveNumber, status: &BreakerStatus) {
    match status {
        BreakerStatus::Closed => println!("Wave {} breaker CLOSED", wave),
        BreakerStatus::Open { reason, tripped_at } => println!(
            "Wave {} breaker OPEN since {}: {}",
            wave,
            tripped_at.to_rfc3339(),
            reason
        ),
    }
}

fn print_report(report: &BreakerReport) {
    let state = &report.state;
    let t = &report.thresholds;
    let s = &report.signals;

    println!("Wave {} Circuit Breaker", state.wave);
    println!("========================");
    println!("Status:          {}", state.status);
    println!(
        "Version:         {} (updated {})",
        state.version,
        state.updated_at.to_rfc3339()
    );
    println!(
        "Emergency stop:  {}",
        if report.emergency_marker { "present" } else { "absent" }
    );
    println!();
    println!("QA rejections:   {} / {}", s.qa_rejections, t.max_qa_rejections);
    if t.has_budget() {
        println!(
            "Cost:            ${:.2} / ${:.2} (trips at {:.0}%)",
            s.cost_total,
            t.budget_usd,
            t.budget_ratio * 100.0
        );
    } else {
        println!("Cost:            ${:.2} (no budget)", s.cost_total);
    }
    if s.repeated_error.count > 0 {
        println!(
            "Repeated error:  {} / {} \"{}\"",
            s.repeated_error.count,
            t.max_error_repeats,
            s.repeated_error.message.as_deref().unwrap_or("<unknown>")
        );
    } else {
        println!("Repeated error:  0 / {}", t.max_error_repeats);
    }
    match s.last_heartbeat {
        Some(at) => println!(
            "Heartbeat:       {} min ago / {} min limit ({})",
            report.minutes_since_heartbeat,
            t.stall_minutes,
            at.to_rfc3339()
        ),
        None => println!("Heartbeat:       none recorded"),
    }
}

fn cmd_validate(
    target: WaveTarget,
    phase: GatePhase,
    options: ValidateOptions,
    json: bool,
) -> Result<u8> {
    let config = load_config(&target.project)?;
    let layout = StateLayout::new(&target.project);
    let validator = PhaseGateValidator::new(layout.clone(), config.gate);

    let verdict = validator
        .validate(target.wave, phase, &options)
        .with_context(|| {
            format!(
                "Failed to validate wave {} phase {}",
                target.wave,
                phase.number()
            )
        })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&verdict)?);
    } else {
        print_verdict(&verdict, &layout, options.dry_run);
    }

    Ok(match verdict.outcome {
        GateOutcome::Pass => EXIT_OK,
        GateOutcome::Fail => EXIT_FAIL,
        GateOutcome::Blocked => EXIT_BLOCKED,
    })
}

fn print_verdict(verdict: &Verdict, layout: &StateLayout, dry_run: bool) {
    println!(
        "Wave {} phase {} ({}): {}",
        verdict.wave,
        verdict.phase.number(),
        verdict.phase.name(),
        verdict.outcome
    );
    for (name, record) in &verdict.checks {
        println!("  [{}] {}: {}", record.status, name, record.detail);
    }

    match verdict.outcome {
        GateOutcome::Pass if verdict.lock.is_some() => println!(
            "Lock written: {}",
            layout.gate_lock(verdict.wave, verdict.phase).display()
        ),
        GateOutcome::Pass if dry_run => println!("Dry run: no lock written"),
        GateOutcome::Blocked => {
            if let Some(required) = verdict.phase.previous() {
                println!(
                    "Run 'wavegate validate --wave {} --phase {}' first",
                    verdict.wave,
                    required.number()
                );
            }
        }
        _ => {}
    }
}
