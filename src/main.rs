//! API Sentinel entrypoint: runs one batch operation against the local store
//! and prints the outcome as JSON on stdout.

use api_sentinel::{
    config::SentinelConfig,
    logging::{AnomalyLogLine, StructuredLogger},
    storage::LogStore,
    Sentinel,
};
use tracing::info;

const USAGE: &str = "usage: api-sentinel <train|detect|retrain|models|stats> [api_id]";

fn print_json(value: &impl serde::Serialize) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(
    sentinel: &Sentinel,
    command: &str,
    api_id: Option<&str>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    match command {
        "train" => print_json(&sentinel.train_api(api_id, None)?),
        "detect" => {
            let kind = sentinel.preferred_kind();
            let detection = sentinel.detect_api(api_id, kind, None, None)?;
            let mut out = std::io::stdout();
            for entry in &detection.result.anomalies {
                StructuredLogger::emit_json(&AnomalyLogLine::from_scored(entry, kind), &mut out);
            }
            info!(
                kind = %kind,
                logs = detection.result.logs_analyzed,
                anomalies = detection.result.anomalies_detected,
                excluded = detection.processed_false_positives,
                "detection run finished"
            );
            Ok(())
        }
        "retrain" => {
            let api_id = api_id.ok_or("retrain needs an api_id")?;
            print_json(&sentinel.retrain(api_id)?)
        }
        "models" => print_json(&sentinel.models().list()?),
        "stats" => print_json(&serde_json::json!({
            "api_id": api_id,
            "logs": sentinel.store().count(api_id, None)?,
            "feedback": sentinel.feedback().stats(api_id)?,
        })),
        other => Err(format!("unknown command '{}'\n{}", other, USAGE).into()),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut args = std::env::args().skip(1);
    let Some(command) = args.next() else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };
    let api_id = args.next();

    let config_path = std::env::var("SENTINEL_CONFIG_PATH")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| std::path::PathBuf::from("config.json"));
    let config = SentinelConfig::load(&config_path);

    StructuredLogger::init(config.log.json, &config.log.level);

    info!(data_dir = ?config.data_dir, command = %command, "api sentinel starting");

    let secret = std::env::var(&config.store_secret_env)
        .map_err(|_| format!("store secret not set (expected in ${})", config.store_secret_env))?;
    let sentinel = Sentinel::open(config, secret.as_bytes())?;

    run(&sentinel, &command, api_id.as_deref())
}
