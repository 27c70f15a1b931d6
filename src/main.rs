use cadence::clock::SystemClock;
use cadence::config::Config;
use cadence::domain::{OccurrenceState, RecurrenceSeries, SeriesChanges, SeriesDraft, SeriesState};
use cadence::recurrence::{RecurrenceCalculator, describe};
use cadence::scheduler::JournalMaterializer;
use cadence::store::ScheduleStore;
use cadence::Engine;
use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

mod cli;

use cli::Cli;
use cli::commands::{Commands, OccurrenceCommands, RuleArgs, SeriesCommands, parse_instant};

fn setup_logging(level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cadence")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("cadence.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let mut builder = env_logger::Builder::from_default_env();
    if let Some(level) = level {
        builder.parse_filters(level);
    }
    builder.target(env_logger::Target::Pipe(target)).init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn build_engine(config: &Config) -> Result<Engine> {
    let store = ScheduleStore::open_at(&config.storage.db_dir).context("Failed to open schedule database")?;
    let calendar = config.calendar.working_calendar()?;
    let materializer =
        JournalMaterializer::new(&config.storage.data_dir).context("Failed to open occurrence journal")?;

    Ok(Engine::new(
        Arc::new(store),
        calendar,
        Arc::new(materializer),
        Arc::new(SystemClock),
        config.worker.scheduler_config(),
    ))
}

fn draft_from(title: &str, rule: &RuleArgs) -> Result<SeriesDraft> {
    let mut draft = SeriesDraft::local(title, rule.tz, rule.start, rule.frequency)?.every(rule.interval);
    if let Some(end) = rule.end.end_condition() {
        draft.end_condition = end;
    }
    Ok(draft)
}

fn print_series(series: &RecurrenceSeries) {
    let state = match series.state {
        SeriesState::Completed => series.state.as_str().dimmed(),
        SeriesState::Running => series.state.as_str().yellow(),
        _ => series.state.as_str().green(),
    };
    println!("{} {} [{}]", series.id.bold(), series.title, state);
    println!("  {}", describe(series));
    if let Some(next) = series.next_run_at {
        println!("  next run: {}", next.with_timezone(&series.time_zone).format("%Y-%m-%d %H:%M %Z"));
    }
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Preview { rule, limit } => handle_preview_command(rule, *limit, config),
        Commands::Series { command } => handle_series_command(command, config).await,
        Commands::Occurrence { command } => handle_occurrence_command(command, config),
        Commands::Daemon => handle_daemon_command(config).await,
    }
}

fn handle_preview_command(rule: &RuleArgs, limit: usize, config: &Config) -> Result<()> {
    let series = draft_from("preview", rule)?.build()?;
    let calculator = RecurrenceCalculator::new(Arc::new(config.calendar.working_calendar()?));

    println!("{}", describe(&series).cyan());
    for at in calculator.occurrences(&series).take(limit) {
        println!("  {}", at.with_timezone(&series.time_zone).format("%a %Y-%m-%d %H:%M %Z"));
    }
    if let Some(last) = calculator.last_occurrence(&series) {
        println!("{} {}", "last:".dimmed(), last.with_timezone(&series.time_zone).format("%Y-%m-%d %H:%M %Z"));
    }
    Ok(())
}

async fn handle_series_command(command: &SeriesCommands, config: &Config) -> Result<()> {
    let engine = build_engine(config)?;
    info!("Handling series command: {:?}", command);

    match command {
        SeriesCommands::Create { title, rule } => {
            let series = engine.service.create(draft_from(title, rule)?).await?;
            println!("{} {}", "Created:".green(), series.id);
            print_series(&series);
        }
        SeriesCommands::List { state } => {
            let filter = state.as_deref().map(str::parse::<SeriesState>).transpose()?;
            let all = engine.service.list()?;
            let shown: Vec<_> = all.iter().filter(|s| filter.is_none_or(|f| s.state == f)).collect();
            if shown.is_empty() {
                println!("{}", "No series".dimmed());
            }
            for series in shown {
                print_series(series);
            }
        }
        SeriesCommands::Show { id, limit } => {
            let series = engine.service.get(id)?;
            print_series(&series);
            for view in engine.service.upcoming(id, *limit)? {
                let when = view.start_time.with_timezone(&series.time_zone).format("%a %Y-%m-%d %H:%M");
                let state = match &view.state {
                    OccurrenceState::Cancelled => view.state.to_string().red(),
                    OccurrenceState::Materialized(_) => view.state.to_string().green(),
                    OccurrenceState::Pending => view.state.to_string().normal(),
                };
                println!("  {}  {}", when, state);
            }
        }
        SeriesCommands::Update {
            id,
            title,
            frequency,
            interval,
            end,
        } => {
            let changes = SeriesChanges {
                title: title.clone(),
                frequency: *frequency,
                interval: *interval,
                end_condition: end.end_condition(),
            };
            let series = engine.service.update(id, &changes).await?;
            println!("{} {}", "Updated:".green(), series.id);
            print_series(&series);
        }
        SeriesCommands::Delete { id } => {
            if engine.service.delete(id)? {
                println!("{} {}", "Deleted:".red(), id);
            } else {
                println!("{} {}", "No such series:".yellow(), id);
            }
        }
    }
    Ok(())
}

fn handle_occurrence_command(command: &OccurrenceCommands, config: &Config) -> Result<()> {
    let engine = build_engine(config)?;
    info!("Handling occurrence command: {:?}", command);

    let (id, at, cancel) = match command {
        OccurrenceCommands::Cancel { id, at } => (id, at, true),
        OccurrenceCommands::Restore { id, at } => (id, at, false),
    };
    let series = engine.service.get(id)?;
    let at = parse_instant(at, series.time_zone).map_err(|e| eyre::eyre!(e))?;

    let occurrence = if cancel {
        engine.service.cancel_occurrence(id, at)?
    } else {
        engine.service.restore_occurrence(id, at)?
    };
    let when = occurrence.start_time.with_timezone(&series.time_zone).format("%Y-%m-%d %H:%M %Z");
    println!("{} {} {}", id.bold(), when, occurrence.state());
    Ok(())
}

async fn handle_daemon_command(config: &Config) -> Result<()> {
    let engine = build_engine(config)?;

    let actions = engine.recovery.recover_all().context("Failed to recover series")?;
    println!("{} {} series, {} queued", "Recovered:".cyan(), actions.len(), engine.queue.len());

    let worker = engine.worker(config.worker.worker_config());
    let shutdown = worker.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received");
            let _ = shutdown.send(());
        }
    });

    println!("{}", "Worker running, Ctrl-C to stop".cyan());
    worker.run().await?;
    println!("{} {} jobs", "Stopped after".cyan(), worker.stats().started());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    setup_logging(config.log_level.as_deref()).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
