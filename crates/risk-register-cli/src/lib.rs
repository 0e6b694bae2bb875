//! Command surface for the risk register.
//!
//! Every invocation owns one [`SessionContext`]: state is loaded from the
//! configured database (or the default dataset when none is reachable), the
//! command mutates it in memory, and mutating commands save back with
//! replace-all semantics. Storage failures degrade to in-memory operation
//! with a stderr warning; they are never fatal.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use risk_register_core::{
    interpret_average, interpret_rating, Classification, MaturityTier, Questionnaire, RiskEntry,
    RiskFilter, SessionContext,
};
use risk_register_export::{export, ExportFormat};
use risk_register_store_sqlite::SqliteRiskStore;
use serde::Serialize;

#[derive(Debug, Parser)]
#[command(name = "riskreg")]
#[command(about = "Risk register and maturity assessment CLI")]
pub struct Cli {
    /// Database file; falls back to RISK_REGISTER_DB, then in-memory.
    #[arg(long)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Risk {
        #[command(subcommand)]
        command: RiskCommand,
    },
    Quality {
        #[command(subcommand)]
        command: QualityCommand,
    },
    Compliance {
        #[command(subcommand)]
        command: ComplianceCommand,
    },
    Export(ExportArgs),
}

#[derive(Debug, Subcommand)]
pub enum RiskCommand {
    Add(AddArgs),
    List(ListArgs),
    Set(SetArgs),
    Remove(RemoveArgs),
}

#[derive(Debug, Args)]
pub struct AddArgs {
    #[arg(long)]
    description: String,
    #[arg(long, default_value_t = 3)]
    probability: u8,
    #[arg(long, default_value_t = 3)]
    impact: u8,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[arg(long, value_enum, default_value = "all")]
    filter: FilterArg,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct SetArgs {
    /// Zero-based row index into the current table.
    #[arg(long)]
    row: usize,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    probability: Option<u8>,
    #[arg(long)]
    impact: Option<u8>,
}

#[derive(Debug, Args)]
pub struct RemoveArgs {
    #[arg(long)]
    row: usize,
}

#[derive(Debug, Subcommand)]
pub enum QualityCommand {
    Show(ShowArgs),
    Rate(QualityRateArgs),
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct QualityRateArgs {
    #[arg(long)]
    item: String,
    #[arg(long)]
    value: u8,
}

#[derive(Debug, Subcommand)]
pub enum ComplianceCommand {
    Show(ComplianceShowArgs),
    Rate(ComplianceRateArgs),
}

#[derive(Debug, Args)]
pub struct ComplianceShowArgs {
    #[arg(long)]
    area: Option<String>,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct ComplianceRateArgs {
    #[arg(long)]
    area: String,
    #[arg(long)]
    control: String,
    #[arg(long)]
    value: u8,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[arg(long, value_enum)]
    format: FormatArg,
    /// Destination file; CSV without --output prints to stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FilterArg {
    All,
    Low,
    Medium,
    High,
}

impl FilterArg {
    fn to_filter(self) -> RiskFilter {
        match self {
            Self::All => RiskFilter::All,
            Self::Low => RiskFilter::Level(Classification::Low),
            Self::Medium => RiskFilter::Level(Classification::Medium),
            Self::High => RiskFilter::Level(Classification::High),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FormatArg {
    Csv,
    Xlsx,
}

impl FormatArg {
    fn to_format(self) -> ExportFormat {
        match self {
            Self::Csv => ExportFormat::Csv,
            Self::Xlsx => ExportFormat::Xlsx,
        }
    }
}

/// One invocation's session: the in-memory state plus an optional attached
/// store. `store` is `None` when no database is configured or the configured
/// one is unreachable (degraded mode).
pub struct Session {
    store: Option<SqliteRiskStore>,
    pub context: SessionContext,
}

/// Opens a session against the given database path, the `RISK_REGISTER_DB`
/// environment variable, or in-memory defaults, in that order.
///
/// Storage failures are downgraded to a warning and the default dataset;
/// they never abort startup.
#[must_use]
pub fn open_session(db: Option<&Path>) -> Session {
    let path = db
        .map(Path::to_path_buf)
        .or_else(SqliteRiskStore::env_database_path);

    let Some(path) = path else {
        eprintln!(
            "warning: no database configured (--db or RISK_REGISTER_DB); \
             working in memory with the default dataset"
        );
        return Session {
            store: None,
            context: SessionContext::with_defaults(),
        };
    };

    match attach_store(&path) {
        Ok((store, context)) => Session {
            store: Some(store),
            context,
        },
        Err(err) => {
            eprintln!("warning: {err}; continuing in memory with the default dataset");
            Session {
                store: None,
                context: SessionContext::with_defaults(),
            }
        }
    }
}

fn attach_store(path: &Path) -> Result<(SqliteRiskStore, SessionContext)> {
    let store = SqliteRiskStore::open(path)?;
    store.migrate()?;
    let context = store.load_session()?;
    Ok((store, context))
}

/// Saves the session when a store is attached. A failed save keeps the
/// in-memory state intact and only warns.
pub fn save_session(session: &mut Session) {
    let Some(store) = session.store.as_mut() else {
        return;
    };
    if let Err(err) = store.save_session(&session.context) {
        eprintln!("warning: save failed ({err}); changes kept in memory only");
    }
}

/// Executes the parsed top-level CLI command graph.
///
/// # Errors
/// Returns an error for invalid command arguments (unknown items, bad row
/// indexes, unwritable output paths). Storage trouble is not an error here.
pub fn run_cli(cli: Cli) -> Result<()> {
    let mut session = open_session(cli.db.as_deref());
    match cli.command {
        Command::Risk { command } => run_risk(command, &mut session),
        Command::Quality { command } => run_quality(command, &mut session),
        Command::Compliance { command } => run_compliance(command, &mut session),
        Command::Export(args) => run_export(&args, &session),
    }
}

fn run_risk(command: RiskCommand, session: &mut Session) -> Result<()> {
    match command {
        RiskCommand::Add(args) => {
            if !session
                .context
                .risks
                .add_entry(&args.description, args.probability, args.impact)
            {
                // Empty descriptions are ignored without an error.
                eprintln!("note: empty description, no entry added");
                return Ok(());
            }
            save_session(session);

            let added = session
                .context
                .risks
                .entries()
                .last()
                .ok_or_else(|| anyhow!("entry missing after add"))?;
            println!("{}", serde_json::to_string_pretty(added)?);
            Ok(())
        }
        RiskCommand::List(args) => {
            let rows = session.context.risks.filtered(args.filter.to_filter());
            if args.json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                print_risk_table(&rows);
            }
            Ok(())
        }
        RiskCommand::Set(args) => {
            // Modelled as a whole-table edit: copy, change one row, apply.
            let mut edited: Vec<RiskEntry> = session.context.risks.entries().to_vec();
            let row = edited
                .get_mut(args.row)
                .ok_or_else(|| anyhow!("row {} out of range", args.row))?;

            if let Some(description) = args.description {
                row.description = description;
            }
            if let Some(probability) = args.probability {
                row.probability = probability;
            }
            if let Some(impact) = args.impact {
                row.impact = impact;
            }

            session.context.risks.apply_edits(edited);
            save_session(session);

            let updated = session
                .context
                .risks
                .get(args.row)
                .ok_or_else(|| anyhow!("row {} missing after edit", args.row))?;
            println!("{}", serde_json::to_string_pretty(updated)?);
            Ok(())
        }
        RiskCommand::Remove(args) => {
            let removed = session
                .context
                .risks
                .remove(args.row)
                .ok_or_else(|| anyhow!("row {} out of range", args.row))?;
            save_session(session);
            println!("{}", serde_json::to_string_pretty(&removed)?);
            Ok(())
        }
    }
}

fn run_quality(command: QualityCommand, session: &mut Session) -> Result<()> {
    match command {
        QualityCommand::Show(args) => {
            let summary = summarize_questionnaire(&session.context.quality);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_questionnaire("Software quality assessment", &summary);
            }
            Ok(())
        }
        QualityCommand::Rate(args) => {
            session
                .context
                .quality
                .set_rating(&args.item, args.value)
                .map_err(|err| anyhow!(err))?;
            save_session(session);

            let summary = summarize_questionnaire(&session.context.quality);
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
    }
}

fn run_compliance(command: ComplianceCommand, session: &mut Session) -> Result<()> {
    match command {
        ComplianceCommand::Show(args) => {
            let areas: Vec<AreaSummary> = session
                .context
                .compliance
                .iter()
                .filter(|(area, _)| args.area.as_deref().map_or(true, |wanted| *area == wanted))
                .map(|(area, questionnaire)| AreaSummary {
                    area: area.to_string(),
                    summary: summarize_questionnaire(questionnaire),
                })
                .collect();

            if areas.is_empty() {
                if let Some(area) = args.area {
                    return Err(anyhow!("unknown control area: {area}"));
                }
            }

            if args.json {
                println!("{}", serde_json::to_string_pretty(&areas)?);
            } else {
                for area in &areas {
                    print_questionnaire(&area.area, &area.summary);
                }
            }
            Ok(())
        }
        ComplianceCommand::Rate(args) => {
            session
                .context
                .compliance
                .set_rating(&args.area, &args.control, args.value)
                .map_err(|err| anyhow!(err))?;
            save_session(session);

            let questionnaire = session
                .context
                .compliance
                .area(&args.area)
                .ok_or_else(|| anyhow!("unknown control area: {}", args.area))?;
            let summary = AreaSummary {
                area: args.area.clone(),
                summary: summarize_questionnaire(questionnaire),
            };
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
    }
}

fn run_export(args: &ExportArgs, session: &Session) -> Result<()> {
    let format = args.format.to_format();
    let bytes = export(&session.context.risks, format)?;

    match (&args.output, format) {
        (Some(path), _) => {
            std::fs::write(path, &bytes)
                .with_context(|| format!("failed writing export to {}", path.display()))?;
            println!(
                "wrote {} bytes to {} ({})",
                bytes.len(),
                path.display(),
                format.mime()
            );
            Ok(())
        }
        (None, ExportFormat::Csv) => {
            std::io::stdout()
                .write_all(&bytes)
                .context("failed writing csv to stdout")?;
            Ok(())
        }
        (None, ExportFormat::Xlsx) => {
            Err(anyhow!("xlsx export requires --output <path>"))
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ItemSummary {
    pub item: String,
    pub rating: u8,
    pub tier: MaturityTier,
}

#[derive(Debug, Serialize)]
pub struct QuestionnaireSummary {
    pub items: Vec<ItemSummary>,
    pub average: f64,
    pub tier: MaturityTier,
    pub interpretation: String,
}

#[derive(Debug, Serialize)]
pub struct AreaSummary {
    pub area: String,
    #[serde(flatten)]
    pub summary: QuestionnaireSummary,
}

#[must_use]
pub fn summarize_questionnaire(questionnaire: &Questionnaire) -> QuestionnaireSummary {
    let items = questionnaire
        .iter()
        .map(|(item, rating)| ItemSummary {
            item: item.to_string(),
            rating,
            tier: interpret_rating(rating),
        })
        .collect();

    let average = questionnaire.average();
    let tier = interpret_average(average);
    QuestionnaireSummary {
        items,
        average,
        tier,
        interpretation: tier.interpretation().to_string(),
    }
}

fn print_risk_table(rows: &[&RiskEntry]) {
    if rows.is_empty() {
        println!("(no rows)");
        return;
    }

    let width = rows
        .iter()
        .map(|entry| entry.description.len())
        .max()
        .unwrap_or(0)
        .max("description".len());

    println!(
        "{:<4} {:<width$} {:>11} {:>6} {:>5} {:<14}",
        "row", "description", "probability", "impact", "score", "classification",
    );
    for (index, entry) in rows.iter().enumerate() {
        println!(
            "{:<4} {:<width$} {:>11} {:>6} {:>5} {:<14}",
            index,
            entry.description,
            entry.probability,
            entry.impact,
            entry.score,
            entry.classification.as_str(),
        );
    }
}

fn print_questionnaire(title: &str, summary: &QuestionnaireSummary) {
    println!("{title}");
    for item in &summary.items {
        println!("  {:<24} {} ({})", item.item, item.rating, item.tier.as_str());
    }
    println!("  average: {:.2} -> {}", summary.average, summary.interpretation);
}
