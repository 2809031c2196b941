//! `workflow-rules` CLI entry-point.
//!
//! Available sub-commands:
//! - `validate`        — validate a workflow definition JSON file offline.
//! - `check-conflicts` — check a definition's approval domains against the
//!   active definitions stored in Postgres.
//! - `migrate`         — run pending database migrations.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use engine::{
    activation_domain_keys, check_definition_conflicts, DefinitionValidator, EngineConfig,
    WorkflowDefinitionDocument,
};
use resolvers::WorkflowObjectType;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "workflow-rules",
    about = "Validate workflow definitions and their approval domains",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a workflow definition JSON file and print its approval domains.
    Validate {
        /// Path to the definition JSON file.
        path: PathBuf,
        /// Object type the definition binds to; defaults to the document's `schemaType`.
        #[arg(long)]
        schema_type: Option<String>,
        /// Engine configuration JSON file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Check a definition for approval-domain conflicts with stored definitions.
    CheckConflicts {
        path: PathBuf,
        #[arg(long)]
        schema_type: String,
        /// Owning organization.
        #[arg(long)]
        owner: String,
        /// The definition being edited, left out of the comparison.
        #[arg(long, default_value = "")]
        definition_id: String,
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
    /// Run pending database migrations.
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Validate { path, schema_type, config } => {
            let config = load_config(config.as_deref())?;
            let doc = load_document(&path)?;
            let schema_type = schema_type.unwrap_or_else(|| doc.schema_type.clone());

            let keys = validate_document(&config, &schema_type, &doc)
                .with_context(|| format!("{} is not a valid workflow definition", path.display()))?;
            println!("{} is valid", path.display());
            if keys.is_empty() {
                println!("  no approval domains");
            }
            for key in keys {
                println!("  approval domain {key}");
            }
        }
        Command::CheckConflicts {
            path,
            schema_type,
            owner,
            definition_id,
            database_url,
        } => {
            let doc = load_document(&path)?;
            let pool = db::pool::create_pool(&database_url, 2)
                .await
                .context("failed to connect to database")?;
            let store = db::PgStore::new(pool);

            check_definition_conflicts(&store, &schema_type, &owner, &definition_id, &doc).await?;
            println!("no approval domain conflicts for {}", path.display());
        }
        Command::Migrate { database_url } => {
            let pool = db::pool::create_pool(&database_url, 2)
                .await
                .context("failed to connect to database")?;
            db::pool::run_migrations(&pool)
                .await
                .context("migration failed")?;
            info!("Migrations applied successfully");
        }
    }
    Ok(())
}

/// Validate `doc` as a definition of `schema_type` and return the approval
/// domains it would claim.  Schema types outside the object catalog are
/// rejected before the document itself is looked at.
fn validate_document(
    config: &EngineConfig,
    schema_type: &str,
    doc: &WorkflowDefinitionDocument,
) -> anyhow::Result<BTreeSet<String>> {
    if schema_type.trim().is_empty() {
        bail!("no schema type: pass --schema-type or set schemaType in the document");
    }
    let Some(object_type) = WorkflowObjectType::parse(schema_type) else {
        let known: Vec<&str> = WorkflowObjectType::ALL.iter().map(WorkflowObjectType::as_str).collect();
        bail!("unknown schema type '{}' (expected one of: {})", schema_type.trim(), known.join(", "));
    };

    DefinitionValidator::from_config(config).validate(object_type.as_str(), Some(doc))?;
    Ok(activation_domain_keys(object_type.as_str(), doc)?)
}

fn load_document(path: &Path) -> anyhow::Result<WorkflowDefinitionDocument> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid definition JSON in {}", path.display()))
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read config {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid config JSON in {}", path.display()))
}
