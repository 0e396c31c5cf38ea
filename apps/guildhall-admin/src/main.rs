use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use guildhall_core::{Caller, GuildService};
use guildhall_storage::{GuildId, GuildKind};
use guildhall_store_sqlite::SqliteStore;

// ────────────────────────────────────── CLI Types ──────────────────────────────────────

#[derive(Parser)]
#[command(name = "guildhall-admin")]
#[command(about = "Guildhall admin CLI for enforcement and guild administration")]
struct Cli {
    /// Database URL (sqlite://path/to/db.db). Defaults to ~/.guildhall/store.db
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the quest enforcement pass for one hour bucket
    Enforce {
        /// Hour to enforce (RFC 3339; truncated to the hour). Defaults to now
        #[arg(long)]
        hour: Option<DateTime<Utc>>,
    },
    /// Guild administration commands
    Guild {
        #[command(subcommand)]
        guild_cmd: GuildCommand,
    },
}

#[derive(Subcommand)]
enum GuildCommand {
    /// Create a guild on behalf of a founding user
    Create {
        /// Founding user ID
        #[arg(long)]
        founder: String,
        /// Guild name
        name: String,
        /// Guild kind (casual or challenge)
        #[arg(long, default_value = "casual")]
        kind: GuildKindArg,
    },
    /// List active guilds
    List {
        /// Restrict to one kind
        #[arg(long)]
        kind: Option<GuildKindArg>,
    },
    /// Force-disband a guild
    Disband {
        /// Guild ID
        id: String,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum GuildKindArg {
    Casual,
    Challenge,
}

impl From<GuildKindArg> for GuildKind {
    fn from(kind: GuildKindArg) -> Self {
        match kind {
            GuildKindArg::Casual => GuildKind::Casual,
            GuildKindArg::Challenge => GuildKind::Challenge,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let store = match &cli.database_url {
        Some(url) => SqliteStore::open(url).await?,
        None => SqliteStore::open_default().await?,
    };
    let store = Arc::new(store);
    let service = GuildService::new(store.clone(), store);

    match cli.command {
        Command::Enforce { hour } => {
            let report = service.enforce_quests(hour.unwrap_or_else(Utc::now)).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Guild { guild_cmd } => match guild_cmd {
            GuildCommand::Create {
                founder,
                name,
                kind,
            } => {
                let founder = founder.parse()?;
                let guild = service
                    .create_guild(&Caller::User(founder), &name, kind.into())
                    .await?;
                println!("{} {}", guild.id, guild.name);
            }
            GuildCommand::List { kind } => {
                let guilds = service.list_guilds(kind.map(Into::into)).await?;
                for g in guilds {
                    println!("{} {} ({})", g.id, g.name, g.kind);
                }
            }
            GuildCommand::Disband { id } => {
                let guild_id: GuildId = id.parse()?;
                service.disband(&Caller::System, &guild_id).await?;
                println!("disbanded {}", guild_id);
            }
        },
    }

    Ok(())
}
