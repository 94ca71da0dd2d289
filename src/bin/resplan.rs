use std::collections::BTreeSet;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{Datelike, Local, NaiveDate};
use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::Result;
use color_eyre::eyre::eyre;
use tracing::{debug, info};

use resplan::chat::{ChatSession, Orchestrator};
use resplan::config::Config;
use resplan::core::{CsvImportOptions, Field, ImportMode, MONTHS, RawCell, ScheduleRecord};
use resplan::filter::{FilterBuilder, FilterCondition, FilterControl, FilterSpec};
use resplan::providers::{CompletionClient, HttpCompletionClient, ImageAttachment};
use resplan::services::sample::sample_schedule;
use resplan::services::workbook::write_workbook;
use resplan::services::{DataService, OpenOutcome};

/// Resource planning over a scheduling workbook
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable file logging at the given level (overrides RUST_LOG)
    #[arg(long = "logging", value_enum, global = true)]
    logging: Option<LogLevel>,
    /// Path to a config file (overrides default config discovery)
    #[arg(long = "config", value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Workbook to operate on (overrides data.workbook_path)
    #[arg(long = "workbook", short = 'w', value_name = "PATH", global = true)]
    workbook: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum LogLevel { Error, Warn, Info, Debug, Trace }

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn  => tracing::Level::WARN,
            LogLevel::Info  => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the dataset
    Show {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Projects ordered by start date
    Upcoming {
        #[arg(long, default_value_t = 15)]
        limit: usize,
    },
    /// Filter control inferred for each column
    Columns,
    /// Filter the dataset and print the matching rows
    Filter {
        #[command(flatten)]
        filters: FilterArgs,
        /// Write the resulting filter spec as JSON
        #[arg(long, value_name = "PATH")]
        save: Option<PathBuf>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Append a record: --set FIELD=VALUE ...
    Add {
        #[arg(long = "set", value_name = "FIELD=VALUE", required = true)]
        set: Vec<String>,
    },
    /// Change columns of the record at INDEX
    Edit {
        index: usize,
        #[arg(long = "set", value_name = "FIELD=VALUE", required = true)]
        set: Vec<String>,
    },
    /// Remove the record at INDEX
    Delete { index: usize },
    /// Write the (optionally filtered) dataset to .csv or .xlsx
    Export {
        path: PathBuf,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Load records from .csv or .xlsx
    Import {
        path: PathBuf,
        #[arg(long, value_enum, default_value_t = ModeArg::Replace)]
        mode: ModeArg,
        #[arg(long, default_value_t = ',')]
        delimiter: char,
        /// The CSV file has no header row
        #[arg(long)]
        no_header: bool,
    },
    /// Month allocations per user
    Analytics {
        /// Show FTE (days / 20) instead of days
        #[arg(long)]
        fte: bool,
    },
    /// Ask one question about the data
    Ask {
        question: String,
        /// Image passed to the model with the question
        #[arg(long = "image", value_name = "PATH")]
        images: Vec<PathBuf>,
    },
    /// Interactive assistant on stdin; `/clear` resets the history, `/quit` exits
    Chat,
    /// Write a sample workbook
    Sample {
        path: PathBuf,
        #[arg(long)]
        year: Option<i32>,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum ModeArg { Replace, Append }

impl From<ModeArg> for ImportMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Replace => ImportMode::Replace,
            ModeArg::Append => ImportMode::Append,
        }
    }
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// Start from a saved filter spec
    #[arg(long, value_name = "PATH")]
    spec: Option<PathBuf>,
    /// Keep only these values: COLUMN=a,b
    #[arg(long = "in", value_name = "COLUMN=VALUES")]
    keep: Vec<String>,
    /// Deselect these values: COLUMN=a,b
    #[arg(long = "not-in", value_name = "COLUMN=VALUES")]
    drop: Vec<String>,
    /// Inclusive numeric range: COLUMN=MIN..MAX
    #[arg(long = "range", value_name = "COLUMN=MIN..MAX")]
    ranges: Vec<String>,
    /// Inclusive date range: COLUMN=YYYY-MM-DD..YYYY-MM-DD
    #[arg(long = "dates", value_name = "COLUMN=START..END")]
    dates: Vec<String>,
    /// Case-insensitive text match: COLUMN=PATTERN
    #[arg(long = "contains", value_name = "COLUMN=PATTERN")]
    contains: Vec<String>,
    /// Treat --contains patterns as regular expressions
    #[arg(long)]
    regex: bool,
}

impl FilterArgs {
    fn is_empty(&self) -> bool {
        self.spec.is_none()
            && self.keep.is_empty()
            && self.drop.is_empty()
            && self.ranges.is_empty()
            && self.dates.is_empty()
            && self.contains.is_empty()
    }

    /// Combine the saved spec with the command line conditions
    fn to_spec(&self, builder: &FilterBuilder) -> Result<FilterSpec> {
        let mut spec = match &self.spec {
            Some(path) => FilterSpec::load_from_file(path)?,
            None => FilterSpec::default(),
        };
        for arg in &self.keep {
            let (column, values) = split_assignment(arg)?;
            spec.set(column, FilterCondition::InList { values: split_list(values), include_missing: false });
        }
        for arg in &self.drop {
            let (column, values) = split_assignment(arg)?;
            let profile = builder
                .profile(column)
                .ok_or_else(|| eyre!("Unknown column '{}'", column))?;
            let FilterControl::ValueSet { options, .. } = &profile.control else {
                return Err(eyre!("Column '{}' is not categorical: {}", column, profile.describe()));
            };
            let dropped = split_list(values);
            let kept = options.iter().filter(|o| !dropped.contains(*o)).cloned().collect();
            spec.set(column, FilterCondition::InList { values: kept, include_missing: true });
        }
        for arg in &self.ranges {
            let (column, range) = split_assignment(arg)?;
            let (lo, hi) = split_range(range)?;
            let min = lo.trim().parse::<f64>().map_err(|_| eyre!("'{}' is not a number", lo))?;
            let max = hi.trim().parse::<f64>().map_err(|_| eyre!("'{}' is not a number", hi))?;
            spec.set(column, FilterCondition::Between { min, max });
        }
        for arg in &self.dates {
            let (column, range) = split_assignment(arg)?;
            let (lo, hi) = split_range(range)?;
            spec.set(column, FilterCondition::DateBetween { start: parse_day(lo)?, end: parse_day(hi)? });
        }
        for arg in &self.contains {
            let (column, pattern) = split_assignment(arg)?;
            spec.set(column, FilterCondition::Contains { pattern: pattern.to_string(), regex: self.regex });
        }
        builder.validate(&spec)?;
        Ok(spec)
    }
}

fn split_assignment(arg: &str) -> Result<(&str, &str)> {
    arg.split_once('=')
        .map(|(k, v)| (k.trim(), v))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| eyre!("Expected COLUMN=VALUE, got '{}'", arg))
}

fn split_list(values: &str) -> BTreeSet<String> {
    values.split(',').map(|v| v.trim().to_string()).filter(|v| !v.is_empty()).collect()
}

fn split_range(range: &str) -> Result<(&str, &str)> {
    range.split_once("..").ok_or_else(|| eyre!("Expected MIN..MAX, got '{}'", range))
}

fn parse_day(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| eyre!("'{}' is not a YYYY-MM-DD date", s))
}

fn parse_assignments(args: &[String]) -> Result<Vec<(Field, String)>> {
    args.iter()
        .map(|arg| {
            let (name, value) = split_assignment(arg)?;
            let field = Field::from_header(name).ok_or_else(|| eyre!("Unknown column '{}'", name))?;
            Ok((field, value.trim().to_string()))
        })
        .collect()
}

fn record_from_assignments(assignments: &[(Field, String)]) -> Result<ScheduleRecord> {
    let mut record = ScheduleRecord::default();
    for (field, value) in assignments {
        let cell = if value.is_empty() { RawCell::Empty } else { RawCell::Text(value.clone()) };
        if !record.set(*field, &cell) {
            return Err(eyre!("'{}' is not a valid value for {}", value, field));
        }
    }
    Ok(record)
}

fn load_image(path: &Path) -> Result<ImageAttachment> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();
    let mime_type = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => return Err(eyre!("Unsupported image type '{}'", path.display())),
    };
    let bytes = std::fs::read(path)?;
    Ok(ImageAttachment { mime_type: mime_type.to_string(), data: STANDARD.encode(bytes) })
}

fn open_service(cfg: &Config, workbook: Option<&PathBuf>) -> Result<DataService> {
    let path = workbook.cloned().unwrap_or_else(|| cfg.data.workbook_path.clone());
    let (service, outcome) = DataService::open(&path, &cfg.data.backup_dir)?;
    match outcome {
        OpenOutcome::Loaded(report) => {
            if report.coerced_to_missing > 0 {
                eprintln!("note: {} cells could not be read and were left empty", report.coerced_to_missing);
            }
        }
        OpenOutcome::Created => eprintln!("created sample workbook '{}'", path.display()),
        OpenOutcome::Recovered { backup, reason } => eprintln!(
            "'{}' could not be read ({}); saved a copy to '{}' and started from sample data",
            path.display(),
            reason,
            backup.display()
        ),
    }
    Ok(service)
}

fn month_names() -> Vec<String> {
    MONTHS.iter().map(|m| m.to_string()).collect()
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let cwd = std::env::current_dir()?;
    let log_path = cwd.join(resplan::logging::LOG_FILE.clone());
    resplan::logging::init_with(Some(log_path), cli.logging.map(tracing::Level::from))?;

    let cfg = Config::from_path(cli.config.as_ref())?;
    debug!("config: {:?}", cfg);

    match cli.command {
        Command::Sample { path, year } => {
            let schedule = sample_schedule(year.unwrap_or_else(|| Local::now().year()));
            write_workbook(&path, &schedule)?;
            println!("wrote {} sample records to '{}'", schedule.len(), path.display());
        }
        Command::Show { limit } => {
            let service = open_service(&cfg, cli.workbook.as_ref())?;
            let df = service.dataframe()?;
            println!("{}", df.head(Some(limit)));
            println!("{} rows", df.height());
        }
        Command::Upcoming { limit } => {
            let service = open_service(&cfg, cli.workbook.as_ref())?;
            println!("{}", service.upcoming(limit)?);
        }
        Command::Columns => {
            let service = open_service(&cfg, cli.workbook.as_ref())?;
            let builder = FilterBuilder::excluding(&service.dataframe()?, cfg.filter.clone(), month_names())?;
            for profile in builder.profiles() {
                println!("{}", profile.describe());
            }
        }
        Command::Filter { filters, save, limit } => {
            let service = open_service(&cfg, cli.workbook.as_ref())?;
            let df = service.dataframe()?;
            let builder = FilterBuilder::excluding(&df, cfg.filter.clone(), month_names())?;
            let spec = filters.to_spec(&builder)?;
            let view = builder.apply(&df, &spec)?;
            println!("{}", view.frame.head(Some(limit)));
            println!("{} of {} rows", view.len(), df.height());
            if let Some(path) = save {
                spec.save_to_file(&path)?;
                println!("saved filter to '{}'", path.display());
            }
        }
        Command::Add { set } => {
            let service = open_service(&cfg, cli.workbook.as_ref())?;
            let record = record_from_assignments(&parse_assignments(&set)?)?;
            let index = service.add_record(record)?;
            println!("added record {}", index);
        }
        Command::Edit { index, set } => {
            let service = open_service(&cfg, cli.workbook.as_ref())?;
            let record = service.edit_record(index, &parse_assignments(&set)?)?;
            println!("updated record {}: {}", index, record.project_descr.unwrap_or_default());
        }
        Command::Delete { index } => {
            let service = open_service(&cfg, cli.workbook.as_ref())?;
            let record = service.delete_record(index)?;
            println!("deleted record {}: {}", index, record.project_descr.unwrap_or_default());
        }
        Command::Export { path, filters } => {
            let service = open_service(&cfg, cli.workbook.as_ref())?;
            let spec = if filters.is_empty() {
                None
            } else {
                let builder = FilterBuilder::excluding(&service.dataframe()?, cfg.filter.clone(), month_names())?;
                Some(filters.to_spec(&builder)?)
            };
            let rows = service.export(&path, spec.as_ref(), &cfg.filter)?;
            println!("exported {} rows to '{}'", rows, path.display());
        }
        Command::Import { path, mode, delimiter, no_header } => {
            let service = open_service(&cfg, cli.workbook.as_ref())?;
            let options = CsvImportOptions { has_header: !no_header, delimiter, ..Default::default() };
            let report = service.import(&path, mode.into(), &options)?;
            println!(
                "imported {} rows ({} cells left empty, ignored columns: {})",
                report.rows,
                report.coerced_to_missing,
                if report.ignored_columns.is_empty() { "none".to_string() } else { report.ignored_columns.join(", ") }
            );
        }
        Command::Analytics { fte } => {
            let service = open_service(&cfg, cli.workbook.as_ref())?;
            println!("{}", service.fte_by_user_month(fte)?);
        }
        Command::Ask { question, images } => {
            let service = open_service(&cfg, cli.workbook.as_ref())?;
            let images = images.iter().map(|p| load_image(p)).collect::<Result<Vec<_>>>()?;
            let snapshot = service.snapshot();
            let client = HttpCompletionClient::from_settings(&cfg.llm, cfg.chat.timeout_secs).transpose()?;
            let mut orchestrator = Orchestrator::new(&snapshot.schedule, cfg.chat.clone());
            if let Some(client) = &client {
                orchestrator = orchestrator.with_llm(client as &dyn CompletionClient);
            }
            println!("{}", orchestrator.answer(&question, &[], &images));
        }
        Command::Chat => {
            let service = open_service(&cfg, cli.workbook.as_ref())?;
            let snapshot = service.snapshot();
            let client = HttpCompletionClient::from_settings(&cfg.llm, cfg.chat.timeout_secs).transpose()?;
            let mut orchestrator = Orchestrator::new(&snapshot.schedule, cfg.chat.clone());
            if let Some(client) = &client {
                info!("chat uses {}", client.provider().display_name());
                orchestrator = orchestrator.with_llm(client as &dyn CompletionClient);
            }
            let mut session = ChatSession::new();
            let stdin = io::stdin();
            let mut stdout = io::stdout();
            write!(stdout, "> ")?;
            stdout.flush()?;
            for line in stdin.lock().lines() {
                let line = line?;
                match line.trim() {
                    "" => {}
                    "/quit" | "/exit" => break,
                    "/clear" => {
                        session.clear();
                        writeln!(stdout, "(history cleared)")?;
                    }
                    prompt => {
                        let reply = session.ask(&orchestrator, prompt, &[]);
                        writeln!(stdout, "{}\n", reply.text)?;
                    }
                }
                write!(stdout, "> ")?;
                stdout.flush()?;
            }
        }
    }
    Ok(())
}
