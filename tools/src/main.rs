//! risk-runner: JSON-lines driver for the trust and risk core.
//!
//! Usage:
//!   risk-runner --db risk.db --data-dir ./data < commands.jsonl
//!   risk-runner --script demo.jsonl
//!
//! One command per line, one JSON response per line:
//!   {"type":"create_user","user_id":"u1"}
//!   {"type":"location","user_id":"u1","latitude":28.61,"longitude":77.20,
//!    "accuracy_m":12.0,"timestamp":"2026-01-05T10:00:00Z","is_foreground":true}

use anyhow::Result;
use risk_core::{
    config::RiskConfig,
    device_fingerprint::DeviceSighting,
    engine::RiskEngine,
    error::RiskError,
    location_validator::{LocationSample, LocationSettings},
    payment_fraud::{PaymentAttempt, PaymentRecord},
    store::UserStore,
    trust_score::{TrustAction, TrustBadge},
};
use serde_json::{json, Value};
use std::env;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RunnerCommand {
    CreateUser {
        user_id: String,
        #[serde(default)]
        helper_verified: bool,
    },
    TrustAction {
        user_id: String,
        action:  TrustAction,
        #[serde(default)]
        reason:  Option<String>,
    },
    Location(LocationSample),
    LocationSettings(LocationSettings),
    Payment(PaymentAttempt),
    RecordPayment(PaymentRecord),
    DeviceRegister {
        user_id:  String,
        sighting: DeviceSighting,
    },
    DeviceCheck {
        user_id:  String,
        sighting: DeviceSighting,
    },
    GetUser {
        user_id: String,
    },
    History {
        user_id: String,
        #[serde(default = "default_history_limit")]
        limit:   usize,
    },
    Quit,
}

fn default_history_limit() -> usize {
    20
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let db = arg_value(&args, "--db").unwrap_or(":memory:");
    let data_dir = arg_value(&args, "--data-dir").unwrap_or("./data");
    let script = arg_value(&args, "--script");

    let config = load_config(data_dir)?;
    let engine = RiskEngine::open(db, config)?;
    log::info!("risk-runner ready (db={db}, data_dir={data_dir})");

    let mut stdout = io::stdout();
    match script {
        Some(path) => run_loop(&engine, BufReader::new(File::open(path)?), &mut stdout),
        None => run_loop(&engine, io::stdin().lock(), &mut stdout),
    }
}

fn load_config(data_dir: &str) -> Result<RiskConfig> {
    if Path::new(data_dir).join("risk_config.json").exists() {
        RiskConfig::load(data_dir)
    } else {
        log::warn!("no risk_config.json under {data_dir}; using built-in policy");
        Ok(RiskConfig::default())
    }
}

fn run_loop(engine: &RiskEngine, mut input: impl BufRead, out: &mut impl Write) -> Result<()> {
    let mut buffer = String::new();
    loop {
        buffer.clear();
        if input.read_line(&mut buffer)? == 0 {
            break; // EOF
        }
        let line = buffer.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let response = match serde_json::from_str::<RunnerCommand>(line) {
            Ok(RunnerCommand::Quit) => break,
            Ok(cmd) => match handle_command(engine, cmd) {
                Ok(value) => json!({ "ok": value }),
                Err(e) => json!({ "error": e.to_string() }),
            },
            Err(e) => json!({ "error": e.to_string() }),
        };
        writeln!(out, "{response}")?;
        out.flush()?;
    }
    Ok(())
}

fn handle_command(engine: &RiskEngine, cmd: RunnerCommand) -> Result<Value, RiskError> {
    let value = match cmd {
        RunnerCommand::CreateUser { user_id, helper_verified } => {
            serde_json::to_value(engine.ledger().open_account(&user_id, helper_verified)?)?
        }
        RunnerCommand::TrustAction { user_id, action, reason } => {
            let reason = reason.unwrap_or_else(|| action.as_str().to_string());
            serde_json::to_value(engine.ledger().apply_action(&user_id, action, &reason, None)?)?
        }
        RunnerCommand::Location(sample) => serde_json::to_value(engine.locations().submit(&sample)?)?,
        RunnerCommand::LocationSettings(settings) => {
            engine.locations().update_settings(&settings)?;
            serde_json::to_value(&settings)?
        }
        RunnerCommand::Payment(attempt) => {
            let payments = engine.payments();
            let assessment = payments.evaluate(&attempt)?;
            let processing = payments.process_result(&attempt, &assessment)?;
            json!({ "assessment": assessment, "processing": processing })
        }
        RunnerCommand::RecordPayment(record) => {
            engine.payments().record_payment(&record)?;
            json!({ "payment_id": record.payment_id })
        }
        RunnerCommand::DeviceRegister { user_id, sighting } => {
            let devices = engine.devices();
            let fingerprint = devices.fingerprint(&sighting.characteristics);
            let registration = devices.register_or_touch(&user_id, &fingerprint, &sighting)?;
            json!({ "fingerprint": fingerprint, "registration": registration })
        }
        RunnerCommand::DeviceCheck { user_id, sighting } => {
            let devices = engine.devices();
            let fingerprint = devices.fingerprint(&sighting.characteristics);
            serde_json::to_value(devices.check_suspicion(&user_id, &fingerprint, &sighting)?)?
        }
        RunnerCommand::GetUser { user_id } => {
            let user = engine
                .store
                .get_user(&user_id)?
                .ok_or_else(|| RiskError::user_not_found(&user_id))?;
            let badge = TrustBadge::from_score(user.trust_score, &engine.config.trust);
            json!({ "user": user, "badge": badge })
        }
        RunnerCommand::History { user_id, limit } => {
            serde_json::to_value(engine.ledger().history(&user_id, limit)?)?
        }
        RunnerCommand::Quit => Value::Null,
    };
    Ok(value)
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
