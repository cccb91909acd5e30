//! logscan: run a trigger/reader configuration over a text log and print the
//! extracted collectors as JSON.

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use logparser::{CollectorRef, CollectorSet, LineReader, LineSource, ParserConfig, ReaderSpec,
    SequenceConfig, SequenceDispatcher, TriggerDispatcher};

#[derive(Parser)]
#[command(name = "logscan", about = "Extract vectors from line-oriented logs", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a log and print every collector as JSON
    Scan {
        /// Log file to parse
        log: PathBuf,
        /// Parser configuration (JSON)
        #[arg(long, short)]
        config: Option<PathBuf>,
        /// Treat the configuration as a sequence-driven one
        #[arg(long)]
        sequence: bool,
        /// Extra block vector readers, as TRIGGER (collector name = trigger)
        #[arg(long = "vec", value_name = "TRIGGER")]
        vec_triggers: Vec<String>,
        /// Output file (default: stdout)
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Pretty-print the JSON report
        #[arg(long)]
        pretty: bool,
    },
    /// Validate a configuration and list its triggers
    Check {
        /// Parser configuration (JSON)
        config: PathBuf,
        /// Treat the configuration as a sequence-driven one
        #[arg(long)]
        sequence: bool,
    },
}

#[derive(Serialize)]
struct ScanReport<'a> {
    source: String,
    parsed_at: DateTime<Utc>,
    lines: usize,
    residual: Option<String>,
    collectors: Vec<CollectorRef<'a>>,
}

enum Dispatcher {
    Trigger(TriggerDispatcher),
    Sequence(SequenceDispatcher),
}

impl Dispatcher {
    fn run(&mut self, source: &mut dyn LineSource) -> logparser::Result<Option<String>> {
        match self {
            Dispatcher::Trigger(d) => d.run(source),
            Dispatcher::Sequence(d) => d.run(source),
        }
    }

    fn collectors(&self) -> &CollectorSet {
        match self {
            Dispatcher::Trigger(d) => d.collectors(),
            Dispatcher::Sequence(d) => d.collectors(),
        }
    }
}

fn main() -> Result<()> {
    // Logs go to stderr so the JSON report on stdout stays clean
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "logscan=info,logparser=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            log,
            config,
            sequence,
            vec_triggers,
            output,
            pretty,
        } => cmd_scan(&log, config.as_deref(), sequence, &vec_triggers, output.as_deref(), pretty),
        Commands::Check { config, sequence } => cmd_check(&config, sequence),
    }
}

fn open_config(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("opening config {}", path.display()))?;
    Ok(BufReader::new(file))
}

fn load_dispatcher(config: Option<&Path>, sequence: bool, vec_triggers: &[String]) -> Result<Dispatcher> {
    if sequence {
        let path = config.context("--sequence needs --config")?;
        let json = std::io::read_to_string(open_config(path)?)?;
        let mut dispatcher = SequenceConfig::from_json(&json)
            .and_then(|c| c.build())
            .with_context(|| format!("invalid sequence config {}", path.display()))?;
        for trigger in vec_triggers {
            dispatcher.add_field(&ReaderSpec::block(trigger.as_str(), trigger.as_str()))?;
        }
        return Ok(Dispatcher::Sequence(dispatcher));
    }

    let parser_config = match config {
        Some(path) => ParserConfig::from_reader(open_config(path)?)
            .with_context(|| format!("invalid parser config {}", path.display()))?,
        None => ParserConfig::default(),
    };
    let mut dispatcher = parser_config.build()?;
    for trigger in vec_triggers {
        dispatcher.add_vec_parser(trigger.as_str(), trigger, None)?;
    }
    if dispatcher.triggers().is_empty() {
        anyhow::bail!("no readers configured; pass --config or --vec");
    }
    Ok(Dispatcher::Trigger(dispatcher))
}

fn cmd_scan(
    log: &Path,
    config: Option<&Path>,
    sequence: bool,
    vec_triggers: &[String],
    output: Option<&Path>,
    pretty: bool,
) -> Result<()> {
    let mut dispatcher = load_dispatcher(config, sequence, vec_triggers)?;

    let file = File::open(log).with_context(|| format!("opening log {}", log.display()))?;
    let mut source = LineReader::new(BufReader::new(file));
    info!("Scanning {}", log.display());

    let residual = dispatcher
        .run(&mut source)
        .with_context(|| format!("parsing {} near line {}", log.display(), source.line_number()))?;

    let report = ScanReport {
        source: log.display().to_string(),
        parsed_at: Utc::now(),
        lines: source.line_number(),
        residual,
        collectors: dispatcher.collectors().iter().collect(),
    };
    let json = if pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };

    match output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            info!("Report written to {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{}", json)?;
        }
    }
    Ok(())
}

fn cmd_check(config: &Path, sequence: bool) -> Result<()> {
    match load_dispatcher(Some(config), sequence, &[])? {
        Dispatcher::Trigger(d) => {
            println!("Trigger-driven config: {}", config.display());
            for trigger in d.triggers() {
                println!("  trigger  {}", trigger);
            }
            for c in d.collectors().iter() {
                println!("  collector  {}", c.name());
            }
        }
        Dispatcher::Sequence(d) => {
            println!("Sequence-driven config: {}", config.display());
            for c in d.collectors().iter() {
                println!("  field  {}", c.name());
            }
        }
    }
    Ok(())
}
