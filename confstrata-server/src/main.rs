mod config;
use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use confstrata_core::{
    Actor, AuditAction, AuditQuery, CommerceHierarchy, ConfigurationManager, ScopeSelector,
    SetConfigurationRequest, VersionHistoryQuery,
};
use crate::config::Config;
use serde::Serialize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "confstrata")]
#[command(about = "Versioned, audited scope configuration over tiered storage")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "confstrata.yaml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ScopeArgs {
    /// Select the scope by id instead of code and level
    #[arg(long)]
    scope_id: Option<String>,

    #[arg(long, default_value = "global")]
    code: String,

    #[arg(long, default_value = "global")]
    level: String,
}

impl ScopeArgs {
    fn selector(&self) -> ScopeSelector {
        match &self.scope_id {
            Some(id) => ScopeSelector::by_id(id.clone()),
            None => ScopeSelector::by_code(self.code.clone(), self.level.clone()),
        }
    }
}

#[derive(Args)]
struct ActorArgs {
    /// User recorded in the audit trail
    #[arg(long, default_value = "cli")]
    user: String,
}

impl ActorArgs {
    fn actor(&self) -> Actor {
        Actor::new(self.user.clone()).with_source("cli")
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ActionArg {
    Create,
    Update,
    Delete,
    Rollback,
}

impl From<ActionArg> for AuditAction {
    fn from(action: ActionArg) -> Self {
        match action {
            ActionArg::Create => AuditAction::Create,
            ActionArg::Update => AuditAction::Update,
            ActionArg::Delete => AuditAction::Delete,
            ActionArg::Rollback => AuditAction::Rollback,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the resolved configuration of a scope
    Show {
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Merge entries (a JSON array of {name, value}) into a scope
    Set {
        #[command(flatten)]
        scope: ScopeArgs,
        #[command(flatten)]
        actor: ActorArgs,
        #[arg(long)]
        entries: String,
    },
    /// Remove named values from a scope
    Delete {
        #[command(flatten)]
        scope: ScopeArgs,
        #[command(flatten)]
        actor: ActorArgs,
        #[arg(long, required = true, num_args = 1..)]
        names: Vec<String>,
    },
    /// Restore the values captured by a version
    Rollback {
        #[command(flatten)]
        scope: ScopeArgs,
        #[command(flatten)]
        actor: ActorArgs,
        #[arg(long)]
        version: String,
    },
    /// List versions of a scope, newest first
    History {
        #[arg(long, default_value = "global")]
        code: String,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        offset: Option<usize>,
    },
    /// Show a version against its predecessor, or against another version
    Compare {
        #[arg(long, default_value = "global")]
        code: String,
        #[arg(long)]
        version: String,
        #[arg(long)]
        to: Option<String>,
    },
    /// Query the audit log
    Audit {
        #[arg(long)]
        code: Option<String>,
        #[arg(long)]
        user: Option<String>,
        #[arg(long, value_enum)]
        action: Option<ActionArg>,
        #[arg(long)]
        since: Option<DateTime<Utc>>,
        #[arg(long)]
        until: Option<DateTime<Utc>>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        offset: Option<usize>,
    },
    /// Verify the audit hash chain of a scope
    VerifyAudit {
        #[arg(long, default_value = "global")]
        code: String,
    },
    /// Move old or large versions of a scope to the blob tier
    Archive {
        #[arg(long, default_value = "global")]
        code: String,
        #[arg(long)]
        max_age_days: Option<u32>,
    },
    /// Merge a commerce hierarchy export (JSON) into the scope tree
    SyncScopes {
        #[arg(long)]
        file: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "confstrata=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let cfg = match Config::from_file(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cli.command, cfg).await {
        tracing::error!("Command failed: {:#}", e);
        std::process::exit(1);
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(command: Commands, cfg: Config) -> anyhow::Result<()> {
    let ctx = cfg
        .store_builder()
        .build()
        .await
        .context("failed to connect storage tiers")?;
    let manager = ConfigurationManager::new(ctx).with_schema(cfg.schema.clone());

    match command {
        Commands::Show { scope } => {
            let response = manager.get_configuration(&scope.selector()).await?;
            print_json(&response)
        }
        Commands::Set {
            scope,
            actor,
            entries,
        } => {
            let config: Vec<serde_json::Value> =
                serde_json::from_str(&entries).context("--entries must be a JSON array")?;
            let change = manager
                .set_configuration(
                    SetConfigurationRequest {
                        config,
                        actor: Some(actor.actor()),
                    },
                    &scope.selector(),
                )
                .await?;
            print_json(&change)
        }
        Commands::Delete {
            scope,
            actor,
            names,
        } => {
            let change = manager
                .delete_configuration(&scope.selector(), &names, Some(actor.actor()))
                .await?;
            print_json(&change)
        }
        Commands::Rollback {
            scope,
            actor,
            version,
        } => {
            let change = manager
                .rollback_to_version(&scope.selector(), &version, Some(actor.actor()))
                .await?
                .with_context(|| format!("version {} not found", version))?;
            print_json(&change)
        }
        Commands::History {
            code,
            limit,
            offset,
        } => {
            let page = manager
                .versions()
                .get_version_history(VersionHistoryQuery {
                    scope_code: code,
                    limit,
                    offset,
                })
                .await?;
            print_json(&page)
        }
        Commands::Compare { code, version, to } => match to {
            Some(to) => {
                let comparison = manager
                    .versions()
                    .compare_two_versions(&code, &version, &to)
                    .await?
                    .context("one of the versions does not exist")?;
                print_json(&comparison)
            }
            None => {
                let comparison = manager
                    .versions()
                    .get_version_comparison(&code, &version)
                    .await?
                    .with_context(|| format!("version {} not found", version))?;
                print_json(&comparison)
            }
        },
        Commands::Audit {
            code,
            user,
            action,
            since,
            until,
            limit,
            offset,
        } => {
            let page = manager
                .audit()
                .get_audit_log(AuditQuery {
                    scope_code: code,
                    user_id: user,
                    action: action.map(AuditAction::from),
                    start_date: since,
                    end_date: until,
                    limit,
                    offset,
                })
                .await?;
            print_json(&page)
        }
        Commands::VerifyAudit { code } => {
            let verification = manager.audit().verify_audit_chain(&code).await?;
            print_json(&verification)
        }
        Commands::Archive { code, max_age_days } => {
            let max_age_days = max_age_days.unwrap_or(cfg.archive.max_age_days);
            let summary = manager.archive_scope_versions(&code, max_age_days).await?;
            print_json(&serde_json::json!({
                "scope": code,
                "maxAgeDays": max_age_days,
                "archived": summary.archived,
                "skipped": summary.skipped,
                "failed": summary.failed,
            }))
        }
        Commands::SyncScopes { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read hierarchy file {}", file))?;
            let hierarchy: CommerceHierarchy =
                serde_json::from_str(&raw).context("invalid commerce hierarchy")?;
            let tree = manager.sync_commerce_scopes(&hierarchy).await?;
            print_json(&tree)
        }
    }
}
