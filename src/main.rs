//! cmdgate hook binary.
//!
//! Reads one JSON request from stdin, writes a `{decision, reason}` response
//! to stdout.
//!
//! Usage:
//!   cmdgate [--config <path>]            # hook mode (stdin → stdout)
//!   cmdgate [--config <path>] --eval <command>
//!   cmdgate [--config <path>] --dump-config

use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use log::{debug, warn};

use cmdgate::audit::{AuditSink, JsonlAuditLog, NullAudit};
use cmdgate::config::{Config, Settings};
use cmdgate::engine::{Policy, PolicyEngine};
use cmdgate::hook::{HookRequest, HookResponse};
use cmdgate::logging;

/// Requests larger than this are cut off and then fail to parse.
const MAX_REQUEST_BYTES: u64 = 1024 * 1024;

enum Mode {
    Hook,
    Eval(String),
    DumpConfig,
}

struct Args {
    config: Option<PathBuf>,
    mode: Mode,
}

fn parse_args() -> Result<Args, String> {
    let mut args = std::env::args().skip(1);
    let mut parsed = Args {
        config: None,
        mode: Mode::Hook,
    };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().ok_or("--config requires a path")?;
                parsed.config = Some(PathBuf::from(path));
            }
            "--eval" => {
                let command = args.next().ok_or("--eval requires a command")?;
                parsed.mode = Mode::Eval(command);
            }
            "--dump-config" => parsed.mode = Mode::DumpConfig,
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    Ok(parsed)
}

fn open_audit(settings: &Settings) -> Box<dyn AuditSink> {
    let Some(path) = settings.audit_log_path() else {
        return Box::new(NullAudit);
    };
    match JsonlAuditLog::open(
        &path,
        settings.audit_queue_capacity,
        Duration::from_millis(settings.audit_flush_timeout_ms),
    ) {
        Ok(log) => {
            debug!("auditing to {}", log.path().display());
            Box::new(log)
        }
        Err(e) => {
            warn!("audit log disabled: {e}");
            Box::new(NullAudit)
        }
    }
}

fn respond(response: &HookResponse) {
    match serde_json::to_string(response) {
        Ok(json) => println!("{json}"),
        Err(_) => println!(r#"{{"decision":"ask","reason":"internal error"}}"#),
    }
}

fn main() {
    logging::init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("cmdgate: {e}");
            std::process::exit(2);
        }
    };

    let loaded = Config::load(args.config.as_deref());

    if let Mode::DumpConfig = args.mode {
        match loaded.map_err(|e| e.to_string()).and_then(|c| toml::to_string_pretty(&c).map_err(|e| e.to_string())) {
            Ok(toml) => print!("{toml}"),
            Err(e) => {
                eprintln!("cmdgate: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    // A broken overlay still audits to the default location.
    let audit = match &loaded {
        Ok(config) => open_audit(&config.settings),
        Err(_) => open_audit(&Config::default_config().settings),
    };
    let engine = PolicyEngine::new(Policy::from_load(loaded), audit);

    let response = match args.mode {
        Mode::Eval(command) => HookResponse::from(&engine.evaluate("Bash", &command)),
        _ => {
            let mut input = String::new();
            match std::io::stdin()
                .take(MAX_REQUEST_BYTES)
                .read_to_string(&mut input)
                .map_err(|e| e.to_string())
                .and_then(|_| HookRequest::parse(&input).map_err(|e| e.to_string()))
            {
                Ok(request) => HookResponse::from(&engine.evaluate(&request.tool, &request.command)),
                Err(e) => {
                    warn!("malformed hook request: {e}");
                    HookResponse::malformed(e)
                }
            }
        }
    };

    respond(&response);
}
