//! Tests for CLI argument parsing functionality
//!
//! These tests verify that command line arguments are parsed and layered over
//! configuration files and defaults.

use access_rule_engine::types::config::{
    CliArgs, ConfigError, EngineConfig, MAX_DURATION_SECS, MAX_RULE_CACHE_TTL_SECS,
};
use access_rule_engine::types::ConfigValidationError;
use clap::Parser;
use std::io::Write;

fn parse(args: &[&str]) -> CliArgs {
    let mut argv = vec!["access-rule-engine"];
    argv.extend_from_slice(args);
    CliArgs::try_parse_from(argv).unwrap()
}

/// Test parsing with no arguments at all
#[test]
fn test_defaults_without_arguments() {
    let args = parse(&[]);
    assert!(args.config.is_none());
    assert!(args.catalog.is_none());
    assert!(args.events.is_none());
    assert!(args.fail_devices.is_empty());
    assert!(!args.verbose);
    assert!(!args.dry_run);

    let config = EngineConfig::from_cli_args(&args).unwrap();
    assert_eq!(config, EngineConfig::default());
}

/// Test input file arguments
#[test]
fn test_input_file_arguments() {
    let args = parse(&[
        "--catalog",
        "site.json",
        "--events",
        "events.jsonl",
        "--audit-output",
        "audit.jsonl",
    ]);
    assert_eq!(args.catalog.as_deref(), Some("site.json"));
    assert_eq!(args.events.as_deref(), Some("events.jsonl"));
    assert_eq!(args.audit_output.as_deref(), Some("audit.jsonl"));
}

/// Test passback window overrides
#[test]
fn test_window_overrides() {
    let args = parse(&[
        "--hard-window-secs",
        "120",
        "--area-window-secs",
        "240",
        "--global-window-secs",
        "480",
        "--global-history-limit",
        "25",
    ]);
    let config = EngineConfig::from_cli_args(&args).unwrap();

    assert_eq!(config.hard_window_secs, 120);
    assert_eq!(config.area_window_secs, 240);
    assert_eq!(config.global_window_secs, 480);
    assert_eq!(config.global_history_limit, 25);
    config.validate().unwrap();
}

/// Test worker, timeout and retry overrides
#[test]
fn test_execution_overrides() {
    let args = parse(&[
        "--worker-count",
        "4",
        "--actuation-timeout-ms",
        "750",
        "--linkage-max-retries",
        "2",
    ]);
    let config = EngineConfig::from_cli_args(&args).unwrap();

    assert_eq!(config.worker_count, 4);
    assert_eq!(config.actuation_timeout_ms, 750);
    assert_eq!(config.linkage_max_retries, 2);
}

/// Test repeatable simulated-fault flag
#[test]
fn test_fail_device_is_repeatable() {
    let args = parse(&["--fail-device", "DEV_3", "--fail-device", "7"]);
    assert_eq!(args.fail_devices, vec!["DEV_3".to_string(), "7".to_string()]);
}

/// Test logging flags
#[test]
fn test_logging_flags() {
    let args = parse(&["-v", "--json-logs", "--log-dir", "/tmp/engine-logs"]);
    assert!(args.verbose);
    assert!(!args.debug);
    assert!(args.json_logs);
    assert_eq!(args.log_dir.as_deref(), Some("/tmp/engine-logs"));

    let args = parse(&["--debug"]);
    assert!(args.debug);
}

/// Test dry run and print config flags
#[test]
fn test_dry_run_and_print_config_flags() {
    assert!(parse(&["--dry-run"]).dry_run);
    assert!(parse(&["--print-config"]).print_config);
}

/// Test that non-numeric values are rejected at parse time
#[test]
fn test_invalid_numeric_argument() {
    let result = CliArgs::try_parse_from(["access-rule-engine", "--hard-window-secs", "soon"]);
    assert!(result.is_err());
}

/// Test that zero windows parse but fail validation
#[test]
fn test_zero_window_fails_validation() {
    let args = parse(&["--area-window-secs", "0"]);
    let config = EngineConfig::from_cli_args(&args).unwrap();
    assert_eq!(
        config.validate(),
        Err(ConfigValidationError::ZeroWindow {
            field: "area_window_secs"
        })
    );
}

/// Test that a window longer than the state lifetime fails validation
#[test]
fn test_window_longer_than_state_ttl() {
    let args = parse(&["--global-window-secs", "3600"]);
    let config = EngineConfig::from_cli_args(&args).unwrap();
    assert_eq!(
        config.validate(),
        Err(ConfigValidationError::StateTtlTooShort {
            ttl: 1800,
            window: 3600
        })
    );
}

/// Test that an oversized state lifetime from a file fails validation
#[test]
fn test_oversized_state_ttl_fails_validation() {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write!(file, r#"{{"passback_state_ttl_secs": 10000000000000}}"#).unwrap();

    let config = EngineConfig::from_file(file.path()).unwrap();
    assert_eq!(
        config.validate(),
        Err(ConfigValidationError::TooLarge {
            field: "passback_state_ttl_secs",
            value: 10_000_000_000_000,
            max: MAX_DURATION_SECS,
        })
    );
}

/// Test that the rule cache lifetime is capped
#[test]
fn test_rule_cache_ttl_ceiling() {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write!(file, r#"{{"rule_cache_ttl_secs": 3600}}"#).unwrap();

    let config = EngineConfig::from_file(file.path()).unwrap();
    assert_eq!(
        config.validate(),
        Err(ConfigValidationError::TooLarge {
            field: "rule_cache_ttl_secs",
            value: 3600,
            max: MAX_RULE_CACHE_TTL_SECS,
        })
    );

    let config = EngineConfig {
        rule_cache_ttl_secs: MAX_RULE_CACHE_TTL_SECS,
        ..EngineConfig::default()
    };
    assert!(config.validate().is_ok());
}

/// Test the linkage log capacity flag and its validation
#[test]
fn test_linkage_log_capacity_argument() {
    let args = parse(&["--linkage-log-capacity", "500"]);
    let config = EngineConfig::from_cli_args(&args).unwrap();
    assert_eq!(config.linkage_log_capacity, 500);
    config.validate().unwrap();

    let args = parse(&["--linkage-log-capacity", "0"]);
    let config = EngineConfig::from_cli_args(&args).unwrap();
    assert_eq!(config.validate(), Err(ConfigValidationError::ZeroLogCapacity));
}

/// Test layering: defaults, then file, then command line
#[test]
fn test_config_file_with_cli_overrides() {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write!(
        file,
        r#"{{"hard_window_secs": 120, "worker_count": 3, "rule_cache_ttl_secs": 0}}"#
    )
    .unwrap();
    let path = file.path().to_str().unwrap().to_string();

    let args = parse(&["--config", path.as_str(), "--hard-window-secs", "60"]);
    let config = EngineConfig::from_cli_args(&args).unwrap();

    assert_eq!(config.hard_window_secs, 60);
    assert_eq!(config.worker_count, 3);
    assert_eq!(config.rule_cache_ttl_secs, 0);
    assert_eq!(config.area_window_secs, EngineConfig::default().area_window_secs);
}

/// Test configuration file error cases
#[test]
fn test_config_file_errors() {
    let missing = EngineConfig::from_file("/nonexistent/engine.json");
    assert!(matches!(missing, Err(ConfigError::FileNotFound(_))));

    let yaml = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    let unsupported = EngineConfig::from_file(yaml.path());
    assert!(matches!(unsupported, Err(ConfigError::UnsupportedFormat(_))));

    let mut broken = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write!(broken, "{{ not json").unwrap();
    let parsed = EngineConfig::from_file(broken.path());
    assert!(matches!(parsed, Err(ConfigError::JsonError(_))));
}

/// Test saving and reloading a configuration file
#[test]
fn test_save_and_reload_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.json");

    let config = EngineConfig {
        linkage_max_retries: 4,
        soft_exception_ttl_secs: 3600,
        ..EngineConfig::default()
    };
    config.save_to_file(&path).unwrap();

    assert_eq!(EngineConfig::from_file(&path).unwrap(), config);
}

/// Test the help message names the main options
#[test]
fn test_help_message() {
    let err = CliArgs::try_parse_from(["access-rule-engine", "--help"]).unwrap_err();
    let help = err.to_string();
    assert!(help.contains("--catalog"));
    assert!(help.contains("--events"));
    assert!(help.contains("--hard-window-secs"));
    assert!(help.contains("--dry-run"));
}
