use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use conflict_engine::audit;
use conflict_engine::config::Config;
use conflict_engine::conflicts::{
    AffiliatedEntity, CaseFile, CaseId, CheckRequest, ConflictEngine, ConflictResult, Party,
};
use conflict_engine::db::{self, CorpusWriter};
use conflict_engine::error::ConflictError;

#[derive(Debug, Parser)]
#[command(name = "conflict-engine", version, about = "Conflict-of-interest checks over the case corpus")]
struct Cli {
    /// TOML settings file; environment variables override it.
    #[arg(long, global = true, env = "CONFLICT_SETTINGS")]
    settings: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    /// Abort a check that takes longer than this.
    #[arg(long, global = true)]
    deadline_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check a stored case against the rest of the corpus.
    CheckCase {
        case_id: CaseId,
        #[arg(long, env = "CONFLICT_CHECKED_BY")]
        checked_by: String,
    },
    /// Check parties read from a JSON file.
    Check {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, env = "CONFLICT_CHECKED_BY")]
        checked_by: String,
    },
    /// Print a recorded check.
    Report { id: Uuid },
    /// Load case files (a JSON array) into the corpus.
    Seed {
        #[arg(long)]
        input: PathBuf,
    },
    /// Replay the audit trail's hash chain; defaults to the configured path.
    VerifyAudit {
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

/// Body of `check --input`.
#[derive(Debug, Deserialize)]
struct CandidateInput {
    parties: Vec<Party>,
    #[serde(default)]
    affiliated: Vec<AffiliatedEntity>,
    #[serde(default)]
    reviewer_ids: Vec<String>,
    #[serde(default)]
    exclude_case_id: Option<CaseId>,
    #[serde(default)]
    case_id: Option<CaseId>,
}

impl CandidateInput {
    fn into_request(self, checked_by: String) -> CheckRequest {
        CheckRequest {
            parties: self.parties,
            affiliated: self.affiliated,
            reviewer_ids: self.reviewer_ids,
            exclude_case_id: self.exclude_case_id,
            case_id: self.case_id,
            checked_by,
        }
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("conflict_engine=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print the outcome; an unrecorded result is still shown before failing.
fn finish_check(outcome: Result<ConflictResult, ConflictError>) -> anyhow::Result<()> {
    match outcome {
        Ok(result) => print_json(&result),
        Err(err) => {
            if let Some(result) = err.computed_result() {
                print_json(result)?;
            }
            Err(err.into())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = Config::load(cli.settings.as_deref()).context("invalid configuration")?;
    if let Command::VerifyAudit { path } = &cli.command {
        let path = path.as_deref().unwrap_or(config.audit.path.as_path());
        let lines = audit::verify_chain(path)
            .with_context(|| format!("audit trail {} failed verification", path.display()))?;
        println!("{lines} audit lines verified");
        return Ok(());
    }
    audit::init(&config.audit);
    tracing::debug!(
        backend = config.database.backend.as_str(),
        locale = config.conflicts.locale.as_str(),
        audit = audit::enabled(),
        "Configuration loaded"
    );

    let database = db::connect_from_config(&config.database)
        .await
        .context("failed to open the case database")?;
    let engine = ConflictEngine::from_database(database.clone(), config.conflicts.clone())?;
    let deadline = cli.deadline_ms.map(Duration::from_millis);

    match cli.command {
        Command::CheckCase { case_id, checked_by } => {
            let outcome = match deadline {
                Some(d) => engine.check_case_within(case_id, &checked_by, d).await,
                None => engine.check_case(case_id, &checked_by).await,
            };
            finish_check(outcome)
        }
        Command::Check { input, checked_by } => {
            let request = read_json::<CandidateInput>(&input)?.into_request(checked_by);
            let outcome = match deadline {
                Some(d) => engine.check_candidate_within(request, d).await,
                None => engine.check_candidate(request).await,
            };
            finish_check(outcome)
        }
        Command::Report { id } => match engine.report(id).await? {
            Some(record) => print_json(&record),
            None => anyhow::bail!("no conflict check with id {id}"),
        },
        Command::Seed { input } => {
            let files: Vec<CaseFile> = read_json(&input)?;
            for file in &files {
                database
                    .insert_case(file)
                    .await
                    .with_context(|| format!("failed to insert case {}", file.case.id))?;
            }
            tracing::info!(cases = files.len(), "Corpus seeded");
            Ok(())
        }
        Command::VerifyAudit { .. } => Ok(()),
    }
}
