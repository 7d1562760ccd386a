use env_logger::Env;
use hermes_runner::{EngineConfig, StopReason, TradingEngine};
use log::{error, info};
use std::process::ExitCode;

const USAGE: &str = "\
Usage: hermes [--config <PATH>]

Runs the trading session core against the simulated vendor until Ctrl-C.

Options:
  -c, --config <PATH>  JSON engine configuration (defaults apply when omitted)
  -h, --help           Print this help";

enum Command {
    Run { config: Option<String> },
    Help,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Command, String> {
    let mut config = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "-c" | "--config" => match args.next() {
                Some(path) => config = Some(path),
                None => return Err(format!("{} needs a path", arg)),
            },
            other => return Err(format!("unexpected argument '{}'", other)),
        }
    }
    Ok(Command::Run { config })
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config_path = match parse_args(std::env::args().skip(1)) {
        Ok(Command::Help) => {
            println!("{}", USAGE);
            return ExitCode::SUCCESS;
        }
        Ok(Command::Run { config }) => config,
        Err(e) => {
            eprintln!("hermes: {}\n\n{}", e, USAGE);
            return ExitCode::from(2);
        }
    };

    let config = match config_path {
        Some(path) => EngineConfig::from_file(&path),
        None => EngineConfig::from_json("{}"),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut engine = match TradingEngine::start(config).await {
        Ok(engine) => engine,
        Err(e) => {
            error!("Engine failed to start: {}", e);
            return ExitCode::FAILURE;
        }
    };
    engine.connect();

    let outcome = engine.run().await;
    engine.shutdown().await;
    match outcome {
        Ok(StopReason::Interrupted) => ExitCode::SUCCESS,
        Ok(StopReason::SessionEnded) => {
            info!("Session ended without an error");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Session terminated: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Command, String> {
        parse_args(args.iter().map(|a| a.to_string()))
    }

    #[test]
    fn test_parse_args() {
        assert!(matches!(parse(&[]), Ok(Command::Run { config: None })));
        assert!(matches!(
            parse(&["--config", "hermes.json"]),
            Ok(Command::Run { config: Some(p) }) if p == "hermes.json"
        ));
        assert!(matches!(parse(&["-c", "a.json", "--help"]), Ok(Command::Help)));
        assert!(parse(&["--config"]).is_err());
        assert!(parse(&["--verbose"]).is_err());
    }
}
