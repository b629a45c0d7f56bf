use std::{io::BufRead, process::ExitCode};

use anyhow::Context;
use crossbeam::channel::{unbounded, Receiver};
use flow_host::{
    commands::{Command, Runner, USAGE},
    config::{self, Settings, CONFIG_FILE},
    logging,
    telemetry::{Sample, Telemetry},
    worker, HostError,
};
use px4flow::OpticalFlowReport;
use tracing::{debug, error, warn};

fn main() -> ExitCode {
    // pins the epoch the startup delay is measured from
    worker::uptime();
    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("px4flow: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &[String]) -> anyhow::Result<()> {
    let command = match Command::parse(args) {
        Ok(command) => command,
        Err(e) => {
            eprint!("{USAGE}");
            return Err(e.into());
        }
    };
    let base = config::load_file(CONFIG_FILE)?;
    let settings = Settings::resolve(&base, command.overrides())?;
    logging::init(settings.log_level.into())?;

    match command {
        Command::Help | Command::Quit => {
            print!("{USAGE}");
            Ok(())
        }
        // nothing runs outside of a started session
        Command::Status => {
            println!("not running");
            Ok(())
        }
        Command::Stop(_) => Err(HostError::NoInstances.into()),
        Command::Start(args) => {
            let mut runner = Runner::new(base, Telemetry::default());
            runner.start(&args)?;
            console(runner)
        }
    }
}

/// Reads commands from stdin until `quit` or Ctrl-C.
fn console(mut runner: Runner) -> anyhow::Result<()> {
    let (tx, rx) = unbounded::<String>();
    let ctrlc_tx = tx.clone();
    ctrlc::set_handler(move || {
        warn!("Ctrl-C received. Exiting...");
        let _ = ctrlc_tx.send("quit".to_owned());
    })
    .context("Setting Ctrl-C handler")?;

    std::thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })
        .context("Spawning stdin reader")?;

    log_reports(runner.telemetry().optical_flow.subscribe())?;

    for line in rx {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            continue;
        }
        match Command::parse(&words) {
            Ok(Command::Quit) => break,
            Ok(command) => match runner.execute(command) {
                Ok(Some(output)) => print!("{output}"),
                Ok(None) => {}
                Err(e) => error!("{:#}", anyhow::Error::new(e)),
            },
            Err(e) => {
                error!("{e}");
                eprint!("{USAGE}");
            }
        }
    }
    runner.stop_all();
    Ok(())
}

fn log_reports(rx: Receiver<Sample<OpticalFlowReport>>) -> anyhow::Result<()> {
    std::thread::Builder::new()
        .name("flow-log".into())
        .spawn(move || {
            for sample in rx {
                debug!(
                    instance = sample.instance,
                    quality = sample.report.quality,
                    "flow {:?} rad over {}us",
                    sample.report.pixel_flow,
                    sample.report.integration_timespan_us
                );
            }
        })
        .context("Spawning report logger")?;
    Ok(())
}
