// Access Rule Engine - Main Entry Point
//
// Replays a file of access events through the engine:
//
// ```console
// $ cargo build --release
// $ ./target/release/access-rule-engine --catalog site.json --events events.jsonl
// ```
//
// With overrides and an audit trail:
//
// ```console
// $ ./target/release/access-rule-engine --catalog site.json --events events.jsonl \
//       --hard-window-secs 120 --audit-output audit.jsonl --verbose
// ```

use access_rule_engine::engine::{
    AccessRuleEngine, AuditRecorder, InMemoryAuditRecorder, JsonlAuditRecorder, LoggingConfig,
    LoggingGuard, SimulatedActuator, SimulatedFault,
};
use access_rule_engine::engine::logging::LoggingError;
use access_rule_engine::events::AccessEvent;
use access_rule_engine::rules::SiteCatalog;
use access_rule_engine::types::{CliArgs, DeviceId, EngineConfig};
use anyhow::{anyhow, Context};
use clap::Parser;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::process;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn, Level};

#[tokio::main]
async fn main() {
    // Parse CLI arguments first to check for special flags
    let args = CliArgs::parse();

    if args.print_config {
        match EngineConfig::default().print_json() {
            Ok(json) => {
                println!("{}", json);
                return;
            }
            Err(e) => {
                eprintln!("Failed to serialize default configuration: {}", e);
                process::exit(1);
            }
        }
    }

    let _logging = match init_logging(&args) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            process::exit(1);
        }
    };

    info!("Starting access rule engine");

    let config = match EngineConfig::from_cli_args(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            eprintln!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("Configuration validation failed: {}", e);
        process::exit(1);
    }

    let site = match load_site(&args) {
        Ok(site) => site,
        Err(e) => {
            error!("Failed to load site catalog: {:#}", e);
            eprintln!("Failed to load site catalog: {:#}", e);
            process::exit(1);
        }
    };

    if args.dry_run {
        eprintln!("Configuration and catalog validation successful!");
        eprintln!("Dry run mode - no events will be replayed.");
        print_configuration_summary(&config, &site);
        return;
    }

    print_configuration_summary(&config, &site);

    if let Err(e) = replay(&args, config, site).await {
        error!("Replay failed: {:#}", e);
        eprintln!("Replay failed: {:#}", e);
        process::exit(1);
    }

    info!("Access rule engine finished");
}

/// Install the subscriber requested by the logging flags
fn init_logging(args: &CliArgs) -> Result<LoggingGuard, LoggingError> {
    let plain = !args.json_logs && args.log_dir.is_none();
    if plain && args.debug {
        return LoggingConfig::init_debug();
    }
    if plain && args.verbose {
        return LoggingConfig::init_verbose();
    }

    let level = if args.debug {
        Level::DEBUG
    } else if args.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    let mut logging = LoggingConfig::new().with_level(level);
    if args.json_logs {
        logging = logging.with_json_format().without_ansi();
    }
    if let Some(dir) = &args.log_dir {
        logging = logging.with_file_logging(dir.clone());
    }
    logging.init()
}

/// Load and validate the facility/rule catalog
fn load_site(args: &CliArgs) -> anyhow::Result<SiteCatalog> {
    let path = args
        .catalog
        .as_deref()
        .ok_or_else(|| anyhow!("--catalog is required"))?;
    let site = SiteCatalog::from_file(path).with_context(|| format!("reading {}", path))?;
    site.validate()
        .with_context(|| format!("validating {}", path))?;
    Ok(site)
}

/// Build the simulated device layer from the CLI flags
fn build_actuator(args: &CliArgs) -> anyhow::Result<SimulatedActuator> {
    let latency = Duration::from_millis(args.actuation_latency_ms.unwrap_or(0));
    let actuator = SimulatedActuator::new().with_latency(latency);
    for raw in &args.fail_devices {
        let device: DeviceId = raw.parse().map_err(|e: String| anyhow!(e))?;
        actuator.fail_device(device, SimulatedFault::Reject);
        info!("Simulating rejecting device {}", device);
    }
    Ok(actuator)
}

/// Feed every event in the events file through the engine
async fn replay(args: &CliArgs, config: EngineConfig, site: SiteCatalog) -> anyhow::Result<()> {
    let events_path = args
        .events
        .as_deref()
        .ok_or_else(|| anyhow!("--events is required unless --dry-run is given"))?;
    let reader = BufReader::new(
        File::open(events_path).with_context(|| format!("opening {}", events_path))?,
    );

    let recorder: Arc<dyn AuditRecorder> = match &args.audit_output {
        Some(path) => Arc::new(
            JsonlAuditRecorder::create(path).with_context(|| format!("creating {}", path))?,
        ),
        None => Arc::new(InMemoryAuditRecorder::new()),
    };

    let engine = AccessRuleEngine::builder(config, site.registry())
        .with_catalog(Arc::new(site.rule_catalog()))
        .with_actuator(Arc::new(build_actuator(args)?))
        .with_recorder(recorder)
        .build()?;

    let start = Instant::now();
    let mut out = BufWriter::new(io::stdout());
    let mut replayed = 0usize;
    let mut rejected_lines = 0usize;

    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("reading {}", events_path))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line_number = index + 1;

        let event: AccessEvent = match serde_json::from_str(trimmed) {
            Ok(event) => event,
            Err(e) => {
                warn!("Skipping line {}: {}", line_number, e);
                rejected_lines += 1;
                serde_json::to_writer(
                    &mut out,
                    &serde_json::json!({ "line": line_number, "error": e.to_string() }),
                )?;
                writeln!(out)?;
                continue;
            }
        };

        let decision = engine.handle_event(&event).await;
        replayed += 1;
        serde_json::to_writer(
            &mut out,
            &serde_json::json!({
                "line": line_number,
                "user_id": event.user_id,
                "device_id": event.device_id,
                "area_id": event.area_id,
                "direction": event.direction,
                "occurred_at": event.occurred_at,
                "decision": decision,
            }),
        )?;
        writeln!(out)?;
    }
    out.flush()?;

    eprintln!("Replayed {} events, waiting for background work...", replayed);
    engine.shutdown().await;

    eprintln!();
    eprintln!("{}", engine.statistics());
    let audit = engine.audit_stats();
    eprintln!(
        "\nAudit: {} emitted, {} dropped, {} failed",
        audit.emitted, audit.dropped, audit.failed
    );
    if rejected_lines > 0 {
        eprintln!("Malformed event lines skipped: {}", rejected_lines);
    }
    eprintln!("Completed in {:.2?}", start.elapsed());

    if audit.dropped > 0 || audit.failed > 0 {
        warn!(
            "{} audit records were not persisted",
            audit.dropped + audit.failed
        );
    }
    Ok(())
}

/// Print the effective configuration and catalog size
fn print_configuration_summary(config: &EngineConfig, site: &SiteCatalog) {
    let facility = site.registry().stats();
    eprintln!("Access Rule Engine");
    eprintln!("==================");
    eprintln!("Site:");
    eprintln!(
        "  Areas: {} ({} with passback policy)",
        facility.areas, facility.policed_areas
    );
    eprintln!("  Devices: {}", facility.devices);
    eprintln!("  Doors: {}", facility.doors);
    eprintln!("  Interlock rules: {}", site.interlock_rules.len());
    eprintln!("  Linkage rules: {}", site.linkage_rules.len());
    eprintln!("Passback windows:");
    eprintln!("  HARD/SOFT: {}s", config.hard_window_secs);
    eprintln!("  AREA: {}s", config.area_window_secs);
    eprintln!(
        "  GLOBAL: {}s (history {})",
        config.global_window_secs, config.global_history_limit
    );
    eprintln!("Workers: {}", config.worker_count);
    eprintln!("Actuation timeout: {}ms", config.actuation_timeout_ms);
    eprintln!(
        "Linkage retries: {} (backoff {}ms)",
        config.linkage_max_retries, config.linkage_retry_backoff_ms
    );
    eprintln!("Linkage rows kept: {}", config.linkage_log_capacity);
    eprintln!();
}
