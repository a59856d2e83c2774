use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use clap::Parser;
use crossbeam_channel::{select, unbounded, Sender};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, debug, warn, error, LevelFilter};

use wordpulse::{
    Command, PulseConfig, PulseEvent, PulseSession, Result, Snapshot,
    utils::init_logging,
};

/// Live word frequency ranking of a large text file.
#[derive(Parser, Debug)]
#[command(name = "wordpulse", version, about)]
struct Args {
    /// Text file to analyse
    file: PathBuf,

    /// JSON configuration file; defaults are used if it is missing or invalid
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Override a configuration key, e.g. --set top_n=20 (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    /// error, warn, info, debug or trace; overrides the configured level
    #[arg(long)]
    log_level: Option<String>,

    /// Append log lines to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Do not draw the progress bar
    #[arg(long)]
    no_progress: bool,

    /// Print the final ranking as JSON
    #[arg(long)]
    json: bool,
}

enum Outcome {
    Finished(Snapshot),
    Cancelled,
    Failed(String),
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Configuration comes first so its log level can be honoured; problems
    // are reported once the logger is up.
    let (config, mut problems) = load_config(&args);
    let level = match args.log_level.as_deref().map(str::parse::<LevelFilter>) {
        Some(Ok(level)) => level,
        Some(Err(_)) => {
            problems.push(format!("Ignoring invalid --log-level {:?}", args.log_level));
            config.get_log_level()
        },
        None => config.get_log_level(),
    };
    if let Err(e) = init_logging(level, args.log_file.as_deref()) {
        eprintln!("wordpulse: cannot set up logging: {}", e);
        return ExitCode::FAILURE;
    }
    for problem in &problems {
        warn!("{}", problem);
    }
    info!("Starting wordpulse on {:?} with log level {:?}", args.file, level);

    match run(&args, config) {
        Ok(Outcome::Finished(snapshot)) => {
            if args.json {
                match serde_json::to_string_pretty(&snapshot) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        error!("Cannot serialise the ranking: {}", e);
                        return ExitCode::FAILURE;
                    }
                }
            } else {
                print_table(&snapshot);
            }
            ExitCode::SUCCESS
        },
        Ok(Outcome::Cancelled) => {
            eprintln!("Cancelled.");
            ExitCode::SUCCESS
        },
        Ok(Outcome::Failed(message)) => {
            eprintln!("wordpulse: {}", message);
            ExitCode::FAILURE
        },
        Err(e) => {
            error!("{}", e);
            eprintln!("wordpulse: {}", e);
            ExitCode::FAILURE
        },
    }
}

/// Config file plus `--set` overrides. Anything invalid falls back to the
/// defaults; the returned messages explain what happened.
fn load_config(args: &Args) -> (PulseConfig, Vec<String>) {
    let mut problems = Vec::new();
    let mut config = match PulseConfig::from_json(&args.config) {
        Ok(config) => config,
        Err(e) => {
            problems.push(format!("Cannot use config {:?} ({}), using defaults", args.config, e));
            PulseConfig::default()
        }
    };

    for setting in &args.overrides {
        let Some((key, value)) = setting.split_once('=') else {
            problems.push(format!("Ignoring malformed override {:?} (expected KEY=VALUE)", setting));
            continue;
        };
        match config.apply_setting(key, value) {
            Some(Ok(())) => {},
            Some(Err(e)) => problems.push(format!("Ignoring override {:?}: {}", setting, e)),
            None => problems.push(format!("Ignoring unknown config key {:?}", key)),
        }
    }

    if let Err(e) = config.validate() {
        problems.push(format!("Configuration rejected ({}), using defaults", e));
        config = PulseConfig::default();
    }
    (config, problems)
}

fn run(args: &Args, config: PulseConfig) -> Result<Outcome> {
    let (commands_tx, commands) = unbounded();
    install_interrupt_handler(commands_tx.clone());
    spawn_stdin_reader(commands_tx);

    let mut session = PulseSession::spawn(config)?;
    let events = session.events().clone();
    session.open(&args.file)?;
    session.start()?;

    let bar = progress_bar(args.no_progress);
    let outcome = loop {
        select! {
            recv(events) -> event => {
                let Ok(event) = event else {
                    break Outcome::Failed("workers stopped unexpectedly".to_string());
                };
                match event {
                    PulseEvent::Snapshot(snapshot) => {
                        bar.set_position(u64::from(snapshot.progress));
                        if let Some(leader) = snapshot.leader() {
                            bar.set_message(format!("leader: {} ({})", leader.word, leader.count));
                        }
                    },
                    PulseEvent::AnalysisWarning(message) => {
                        warn!("{}", message);
                        bar.println(format!("warning: {}", message));
                    },
                    PulseEvent::Fatal(message) => break Outcome::Failed(message),
                    PulseEvent::Finished(snapshot) => break Outcome::Finished(snapshot),
                    PulseEvent::PausedChanged(true) => bar.set_message("paused (r to resume)"),
                    PulseEvent::PausedChanged(false) => bar.set_message("running"),
                    PulseEvent::Status(status) => debug!("status: {}", status),
                    PulseEvent::ReadingFinished
                    | PulseEvent::HeadroomAvailable
                    | PulseEvent::RunningChanged(_) => {},
                }
            },
            recv(commands) -> command => {
                match command {
                    Ok(Command::Cancel) => {
                        session.cancel()?;
                        break Outcome::Cancelled;
                    },
                    Ok(command) => session.send(command)?,
                    // Both input sources are gone; keep following events.
                    Err(_) => {},
                }
            },
        }
    };

    bar.finish_and_clear();
    if let Err(e) = session.shutdown() {
        warn!("{}", e);
    }
    Ok(outcome)
}

fn progress_bar(hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(100);
    bar.set_style(ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-"));
    bar.set_message("starting");
    bar
}

fn install_interrupt_handler(commands: Sender<Command>) {
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = commands.send(Command::Cancel);
    }) {
        warn!("Cannot install the Ctrl-C handler: {}", e);
    }
}

/// `p` pauses, `r` resumes, `s` restarts and `c` cancels.
fn spawn_stdin_reader(commands: Sender<Command>) {
    let spawned = thread::Builder::new()
        .name("wordpulse-stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                let command = match line.trim() {
                    "p" => Command::Pause,
                    "r" => Command::Resume,
                    "s" => Command::Start,
                    "c" => Command::Cancel,
                    "" => continue,
                    other => {
                        eprintln!("unknown command {:?} (p, r, s or c)", other);
                        continue;
                    }
                };
                if commands.send(command).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        warn!("Interactive commands unavailable: {}", e);
    }
}

fn print_table(snapshot: &Snapshot) {
    println!("{:>4}  {:>12}  word", "rank", "count");
    for (rank, entry) in snapshot.top.iter().enumerate() {
        println!("{:>4}  {:>12}  {}", rank + 1, entry.count, entry.word);
    }
    println!("({} of {} bytes processed)", snapshot.processed_bytes, snapshot.total_bytes);
}
