//! hwm - hardware profile matcher
//!
//! The entry point for the `hwm` CLI, handling:
//! - Matching a hardware inventory against the configured profiles
//! - Returning quota after a failed deployment
//! - Hardware summaries for allocated hosts
//! - CMDB template expansion and system identification
//! - Configuration checks

use clap::{Args, Parser, Subcommand};
use hwm_common::document::{parse_specs, parse_state, GENERATE_KEY};
use hwm_common::{Fact, OutputFormat, Record, SCHEMA_VERSION};
use hwm_config::{list_spec_profiles, load_settings, resolve_config_dir, ConfigDir, Settings};
use hwm_core::exit_codes::ExitCode;
use hwm_core::generate::generate;
use hwm_core::logging::{
    event_names, generate_run_id, init_logging, LogConfig, LogFormat, LogLevel, Stage,
};
use hwm_core::matcher::Matcher;
use hwm_core::predicate::PredicateRegistry;
use hwm_core::{LockOptions, State, StateError};
use serde_json::Value;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, info_span};

/// Match hardware inventories against ordered, quota-limited profiles
#[derive(Parser)]
#[command(name = "hwm")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Directory holding state, lock, *.specs and *.cmdb
    #[arg(long, global = true, env = "HWM_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "json")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log format on stderr
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Find the first profile matching an inventory and allocate it
    Match(InventoryArgs),

    /// Give a slot back to a profile after a failed deployment
    Failed {
        /// Profile name as listed in the state file
        profile: String,
    },

    /// Summarize the hardware allocated to a host
    Info {
        /// Hostname recorded in a profile's CMDB
        hostname: String,
    },

    /// Expand a CMDB template into records
    Generate {
        /// Template file (bare model or {"generate": {...}})
        template: PathBuf,
    },

    /// Derive a system name and MAC list from an inventory
    Identify(InventoryArgs),

    /// Validate settings, state and spec files
    Check,
}

#[derive(Args, Debug)]
struct InventoryArgs {
    /// Inventory file: JSON array of 4-string facts ("-" for stdin)
    #[arg(long, short = 'i', default_value = "-")]
    inventory: String,
}

fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig::from_env(
        LogLevel::from_verbosity(cli.global.verbose, cli.global.quiet),
        cli.global.log_format,
    );
    init_logging(&log_config);

    let run_id = generate_run_id();
    let span = info_span!("hwm", run_id = %run_id);
    let _guard = span.enter();
    debug!(event = event_names::RUN_STARTED, "starting");

    let exit_code = match &cli.command {
        Commands::Match(args) => run_match(&cli.global, &run_id, args),
        Commands::Failed { profile } => run_failed(&cli.global, &run_id, profile),
        Commands::Info { hostname } => run_info(&cli.global, &run_id, hostname),
        Commands::Generate { template } => run_generate(&cli.global, &run_id, template),
        Commands::Identify(args) => run_identify(&cli.global, &run_id, args),
        Commands::Check => run_check(&cli.global, &run_id),
    };

    debug!(event = event_names::RUN_FINISHED, exit_code = exit_code.as_i32(), "finished");
    std::process::exit(exit_code.as_i32());
}

// ============================================================================
// Setup helpers
// ============================================================================

/// Resolved directory plus the settings read from it.
struct Context {
    dir: ConfigDir,
    settings: Settings,
}

impl Context {
    fn lock_options(&self) -> LockOptions {
        LockOptions::from(&self.settings.lock)
    }

    fn matcher(&self) -> Matcher {
        Matcher::new(PredicateRegistry::standard()).with_max_depth(self.settings.matcher.max_depth)
    }

    fn load_state(&self) -> Result<State, StateError> {
        State::load_with(&self.dir.path, &self.lock_options(), self.matcher())
    }
}

fn context(global: &GlobalOpts, run_id: &str) -> Result<Context, ExitCode> {
    let dir = resolve_config_dir(global.config_dir.as_deref());
    info!(
        event = event_names::CONFIG_RESOLVED,
        path = %dir.path.display(),
        source = %dir.source,
        "using configuration directory"
    );
    match load_settings(&dir.path) {
        Ok((settings, _)) => Ok(Context { dir, settings }),
        Err(e) => {
            error!(event = event_names::CONFIG_ERROR, error = %e, "invalid settings");
            Err(output_error(global, run_id, ExitCode::ConfigError, &e.to_string()))
        }
    }
}

fn read_inventory(source: &str) -> Result<Vec<Fact>, String> {
    let mut content = String::new();
    if source == "-" {
        std::io::stdin()
            .read_to_string(&mut content)
            .map_err(|e| format!("failed to read inventory from stdin: {e}"))?;
    } else {
        content = std::fs::read_to_string(source)
            .map_err(|e| format!("failed to read inventory {source}: {e}"))?;
    }
    serde_json::from_str(&content).map_err(|e| format!("invalid inventory {source}: {e}"))
}

// ============================================================================
// Output helpers
// ============================================================================

fn envelope(run_id: &str, command: &str, payload: Value) -> Value {
    let mut obj = serde_json::Map::new();
    obj.insert("schema_version".to_string(), Value::from(SCHEMA_VERSION));
    obj.insert("run_id".to_string(), Value::from(run_id));
    obj.insert(
        "generated_at".to_string(),
        Value::from(chrono::Utc::now().to_rfc3339()),
    );
    obj.insert("command".to_string(), Value::from(command));
    if let Value::Object(fields) = payload {
        obj.extend(fields);
    }
    Value::Object(obj)
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("failed to serialize output: {}", e),
    }
}

fn output_error(global: &GlobalOpts, run_id: &str, code: ExitCode, message: &str) -> ExitCode {
    match global.format {
        OutputFormat::Json => {
            let response = serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "run_id": run_id,
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "status": "error",
                "error": {
                    "code": code.as_i32(),
                    "name": code.code_name(),
                    "message": message,
                }
            });
            match serde_json::to_string_pretty(&response) {
                Ok(s) => eprintln!("{}", s),
                Err(_) => eprintln!("{}", message),
            }
        }
        OutputFormat::Summary => {
            eprintln!("[{}] {}: {}", run_id, code.code_name(), message);
        }
    }
    code
}

fn output_state_error(global: &GlobalOpts, run_id: &str, err: &StateError) -> ExitCode {
    output_error(global, run_id, ExitCode::from(err), &err.to_string())
}

// ============================================================================
// Commands
// ============================================================================

fn run_match(global: &GlobalOpts, run_id: &str, args: &InventoryArgs) -> ExitCode {
    let _stage = info_span!("match", stage = %Stage::Match).entered();
    let facts = match read_inventory(&args.inventory) {
        Ok(facts) => facts,
        Err(msg) => return output_error(global, run_id, ExitCode::ArgsError, &msg),
    };
    let ctx = match context(global, run_id) {
        Ok(ctx) => ctx,
        Err(code) => return code,
    };

    let mut state = match ctx.load_state() {
        Ok(state) => state,
        Err(e) => return output_state_error(global, run_id, &e),
    };
    let found = match state.find_match(&facts) {
        Ok(found) => found,
        Err(e) => return output_state_error(global, run_id, &e),
    };
    // The CMDB claim is already on disk; losing the quota update is logged
    // but does not hide the match from the caller.
    if let Err(e) = state.save() {
        error!(
            event = event_names::STATE_SAVE_FAILED,
            profile = %found.profile,
            error = %e,
            "failed to save state after match"
        );
    }
    state.unlock();

    match global.format {
        OutputFormat::Json => {
            let payload = serde_json::json!({
                "status": "ok",
                "profile": found.profile,
                "bindings": found.bindings,
            });
            print_json(&envelope(run_id, "match", payload));
        }
        OutputFormat::Summary => {
            let hostname = found
                .bindings
                .get("hostname")
                .and_then(Value::as_str)
                .unwrap_or("-");
            println!("[{}] match: {} {}", run_id, found.profile, hostname);
        }
    }
    ExitCode::Ok
}

fn run_failed(global: &GlobalOpts, run_id: &str, profile: &str) -> ExitCode {
    let _stage = info_span!("failed", stage = %Stage::Allocate, profile).entered();
    let ctx = match context(global, run_id) {
        Ok(ctx) => ctx,
        Err(code) => return code,
    };
    let mut state = match ctx.load_state() {
        Ok(state) => state,
        Err(e) => return output_state_error(global, run_id, &e),
    };

    let modified = state.failed_profile(profile);
    if modified {
        if let Err(e) = state.save() {
            return output_state_error(global, run_id, &e);
        }
    }
    let remaining = state.remaining(profile).map(|q| q.to_string());
    state.unlock();

    match global.format {
        OutputFormat::Json => {
            let payload = serde_json::json!({
                "status": "ok",
                "profile": profile,
                "modified": modified,
                "remaining": remaining,
            });
            print_json(&envelope(run_id, "failed", payload));
        }
        OutputFormat::Summary => {
            println!(
                "[{}] failed: {} remaining={}",
                run_id,
                profile,
                remaining.as_deref().unwrap_or("-")
            );
        }
    }
    ExitCode::Ok
}

fn run_info(global: &GlobalOpts, run_id: &str, hostname: &str) -> ExitCode {
    let _stage = info_span!("info", stage = %Stage::Report).entered();
    let ctx = match context(global, run_id) {
        Ok(ctx) => ctx,
        Err(code) => return code,
    };
    let mut state = match ctx.load_state() {
        Ok(state) => state,
        Err(e) => return output_state_error(global, run_id, &e),
    };
    let info = match state.hardware_info(hostname) {
        Ok(info) => info,
        Err(e) => return output_state_error(global, run_id, &e),
    };
    state.unlock();

    match global.format {
        OutputFormat::Json => {
            let payload = serde_json::json!({
                "status": "ok",
                "hostname": hostname,
                "found": !info.is_empty(),
                "hardware": info,
            });
            print_json(&envelope(run_id, "info", payload));
        }
        OutputFormat::Summary => {
            let memory = info.memory.map(|m| format!("{m}MiB")).unwrap_or_else(|| "-".to_string());
            let ncpus = info.ncpus.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string());
            println!(
                "[{}] info: {} memory={} ncpus={} disks={} nics={}",
                run_id,
                hostname,
                memory,
                ncpus,
                info.disks.len(),
                info.nics.len()
            );
        }
    }
    ExitCode::Ok
}

fn run_generate(global: &GlobalOpts, run_id: &str, template: &Path) -> ExitCode {
    let _stage = info_span!("generate", stage = %Stage::Report).entered();
    let content = match std::fs::read_to_string(template) {
        Ok(content) => content,
        Err(e) => {
            let msg = format!("failed to read template {}: {}", template.display(), e);
            return output_error(global, run_id, ExitCode::ArgsError, &msg);
        }
    };
    let model = match parse_template(&content) {
        Ok(model) => model,
        Err(msg) => {
            let msg = format!("invalid template {}: {}", template.display(), msg);
            return output_error(global, run_id, ExitCode::ArgsError, &msg);
        }
    };

    let records = generate(&model);
    match global.format {
        OutputFormat::Json => {
            let payload = serde_json::json!({
                "status": "ok",
                "count": records.len(),
                "records": records,
            });
            print_json(&envelope(run_id, "generate", payload));
        }
        OutputFormat::Summary => {
            println!("[{}] generate: {} records", run_id, records.len());
        }
    }
    ExitCode::Ok
}

/// Accept either a bare model or one wrapped under `"generate"`.
fn parse_template(content: &str) -> Result<Record, String> {
    let value: Value = serde_json::from_str(content).map_err(|e| e.to_string())?;
    match value {
        Value::Object(mut map) => {
            if map.len() == 1 {
                if let Some(inner) = map.remove(GENERATE_KEY) {
                    return match inner {
                        Value::Object(model) => Ok(model),
                        _ => Err(format!("\"{GENERATE_KEY}\" must hold an object")),
                    };
                }
            }
            Ok(map)
        }
        _ => Err("expected a JSON object".to_string()),
    }
}

fn run_identify(global: &GlobalOpts, run_id: &str, args: &InventoryArgs) -> ExitCode {
    let _stage = info_span!("identify", stage = %Stage::Match).entered();
    let facts = match read_inventory(&args.inventory) {
        Ok(facts) => facts,
        Err(msg) => return output_error(global, run_id, ExitCode::ArgsError, &msg),
    };
    let record = match Matcher::default().generate_filename_and_macs(&facts) {
        Ok(record) => record,
        Err(e) => return output_error(global, run_id, ExitCode::SpecError, &e.to_string()),
    };

    match global.format {
        OutputFormat::Json => {
            let payload = serde_json::json!({
                "status": "ok",
                "system": record,
            });
            print_json(&envelope(run_id, "identify", payload));
        }
        OutputFormat::Summary => {
            let sysname = record.get("sysname").and_then(Value::as_str).unwrap_or("");
            println!("[{}] identify: {}", run_id, sysname);
        }
    }
    ExitCode::Ok
}

fn run_check(global: &GlobalOpts, run_id: &str) -> ExitCode {
    let _stage = info_span!("check", stage = %Stage::Init).entered();
    let dir = resolve_config_dir(global.config_dir.as_deref());
    let mut results: Vec<Value> = Vec::new();
    let mut all_ok = true;

    match load_settings(&dir.path) {
        Ok((settings, path)) => results.push(serde_json::json!({
            "check": "settings",
            "status": "ok",
            "source": path.as_ref().map(|p| p.display().to_string()),
            "using_defaults": path.is_none(),
            "max_depth": settings.matcher.max_depth,
        })),
        Err(e) => {
            all_ok = false;
            results.push(serde_json::json!({
                "check": "settings",
                "status": "error",
                "error": e.to_string(),
            }));
        }
    }

    // Read without the lock: check never writes.
    let state_path = dir.path.join(hwm_core::state::STATE_FILENAME);
    let mut profiles: Vec<String> = Vec::new();
    match std::fs::read_to_string(&state_path)
        .map_err(|e| e.to_string())
        .and_then(|content| parse_state(&content).map_err(|e| e.to_string()))
    {
        Ok(entries) => {
            profiles.extend(entries.iter().map(|e| e.name.clone()));
            results.push(serde_json::json!({
                "check": "state",
                "status": "ok",
                "path": state_path.display().to_string(),
                "profiles": entries.iter().map(|e| serde_json::json!({
                    "name": e.name,
                    "quota": e.quota.to_string(),
                })).collect::<Vec<_>>(),
            }));
        }
        Err(e) => {
            all_ok = false;
            results.push(serde_json::json!({
                "check": "state",
                "status": "error",
                "path": state_path.display().to_string(),
                "error": e,
            }));
        }
    }

    for name in list_spec_profiles(&dir.path) {
        if !profiles.contains(&name) {
            profiles.push(name);
        }
    }
    for name in &profiles {
        let path = dir.path.join(format!("{name}.specs"));
        let result = match std::fs::read_to_string(&path) {
            Err(e) => serde_json::json!({
                "check": "specs",
                "profile": name,
                "status": "warn",
                "note": format!("{}: {}", path.display(), e),
            }),
            Ok(content) => match parse_specs(&content) {
                Ok(specs) => serde_json::json!({
                    "check": "specs",
                    "profile": name,
                    "status": "ok",
                    "count": specs.len(),
                }),
                Err(e) => {
                    all_ok = false;
                    serde_json::json!({
                        "check": "specs",
                        "profile": name,
                        "status": "error",
                        "error": e.to_string(),
                    })
                }
            },
        };
        results.push(result);
    }

    match global.format {
        OutputFormat::Json => {
            let payload = serde_json::json!({
                "status": if all_ok { "ok" } else { "error" },
                "config_dir": dir.path.display().to_string(),
                "config_source": dir.source.to_string(),
                "checks": results,
            });
            print_json(&envelope(run_id, "check", payload));
        }
        OutputFormat::Summary => {
            let status = if all_ok { "OK" } else { "FAILED" };
            println!("[{}] check: {}", run_id, status);
        }
    }

    if all_ok {
        ExitCode::Ok
    } else {
        ExitCode::ConfigError
    }
}
