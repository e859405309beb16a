use std::{
    fs,
    io::{self, Read, Write},
    process::ExitCode,
};

use clap::Parser;
use serde_json::Value as JsonValue;

use gatebridge::{
    config::Config,
    core::BridgeResult,
    listener::prometheus::gather_text,
    logging::{LogService, Logger},
    orchestration::Worker,
};

#[derive(Parser, Debug)]
#[command(name = "gatebridge")]
#[command(about = "Run serverless invocation envelopes through an isolated request lifecycle")]
struct Opt {
    /// Path to the YAML config file
    #[arg(short, long)]
    conf: String,

    /// Envelope file holding one envelope or an array of them; `-` or no
    /// value reads stdin
    #[arg(short, long)]
    event: Option<String>,

    /// Pretty-print gateway responses
    #[arg(long)]
    pretty: bool,

    /// Print Prometheus metrics to stderr when done
    #[arg(long)]
    metrics: bool,
}

fn read_events(source: Option<&str>) -> BridgeResult<JsonValue> {
    let raw = match source {
        None | Some("-") => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        }
        Some(path) => fs::read_to_string(path)?,
    };
    Ok(serde_json::from_str(&raw)?)
}

/// Install the configured file logger, or env_logger on stderr without one.
fn start_logging(config: &Config) -> BridgeResult<Option<LogService>> {
    let Some(log) = config.bridge.log.clone() else {
        env_logger::init();
        return Ok(None);
    };

    let logger = Logger::new(log);
    logger.init_env_logger()?;
    Ok(Some(LogService::start(logger)?))
}

fn run(opt: Opt) -> BridgeResult<ExitCode> {
    let config = Config::load_from_yaml(&opt.conf)?;
    let log_service = start_logging(&config)?;

    let outcome = serve(&opt, &config);
    if let Err(e) = &outcome {
        log::error!("{e}");
    }

    // stop explicitly so writer errors reach the exit code
    let stopped = log_service.map_or(Ok(()), LogService::stop);
    let code = outcome?;
    stopped?;
    Ok(code)
}

fn serve(opt: &Opt, config: &Config) -> BridgeResult<ExitCode> {
    log::info!("Loading worker...");
    let worker = Worker::boot(config)?;

    let envelopes = match read_events(opt.event.as_deref())? {
        JsonValue::Array(items) => items,
        single => vec![single],
    };

    let mut stdout = io::stdout().lock();
    for envelope in &envelopes {
        match worker.handle(envelope) {
            Ok(response) => writeln!(stdout, "{}", response.to_json(opt.pretty)?)?,
            Err(e) => eprintln!("{e}"),
        }
    }
    stdout.flush()?;

    let stats = worker.terminate();

    if opt.metrics {
        eprint!("{}", gather_text()?);
    }

    Ok(if stats.rejected > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn main() -> ExitCode {
    let opt = Opt::parse();
    match run(opt) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
