//! Binary entrypoint for the compass service.

use std::sync::Arc;

use clap::{Parser, Subcommand};

use compass::config::Config;
use compass::db::{Database, PgBackend, ProfileStore};
use compass::gateway::{GatewayState, start_server};
use compass::llm::create_provider;
use compass::profile::CoachingProfile;
use compass::sim::seed_presets;

#[derive(Parser, Debug)]
#[command(name = "compass", version, about = "Coaching-chat backend with a persona simulator")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run migrations and start the HTTP gateway (default).
    Serve,
    /// Run database migrations and exit.
    Migrate,
    /// Insert the built-in persona presets, skipping existing names.
    SeedPersonas,
    /// Create or update a user profile.
    CreateProfile {
        /// Stable user identifier.
        #[arg(long)]
        user_id: String,
        /// Name the coach addresses the user by.
        #[arg(long)]
        display_name: String,
        #[arg(long)]
        tension_type: Option<String>,
        #[arg(long)]
        communication_style: Option<String>,
        #[arg(long)]
        focus_area: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::Migrate => migrate().await,
        Command::SeedPersonas => seed_personas().await,
        Command::CreateProfile {
            user_id,
            display_name,
            tension_type,
            communication_style,
            focus_area,
        } => {
            create_profile(
                user_id,
                display_name,
                tension_type,
                communication_style,
                focus_area,
            )
            .await
        }
    }
}

async fn serve() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let backend = Arc::new(PgBackend::new(&config.database).await?);
    backend.run_migrations().await?;

    let provider = create_provider(&config.llm)?;
    let state = Arc::new(GatewayState::new(backend, provider));

    let addr = start_server(config.server.bind_addr()?, state.clone()).await?;
    tracing::info!("Compass serving on http://{}", addr);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    state.shutdown().await;

    Ok(())
}

/// Connect using only the database section and bring the schema up to
/// date. Shared by the maintenance commands.
async fn connect_migrated() -> anyhow::Result<PgBackend> {
    let config = Config::database_from_env()?;
    let backend = PgBackend::new(&config).await?;
    backend.run_migrations().await?;
    Ok(backend)
}

async fn migrate() -> anyhow::Result<()> {
    connect_migrated().await?;
    println!("Migrations applied");
    Ok(())
}

async fn seed_personas() -> anyhow::Result<()> {
    let backend = connect_migrated().await?;
    let outcome = seed_presets(&backend).await?;
    println!(
        "Personas seeded: {} created, {} already present",
        outcome.created, outcome.skipped
    );
    Ok(())
}

async fn create_profile(
    user_id: String,
    display_name: String,
    tension_type: Option<String>,
    communication_style: Option<String>,
    focus_area: Option<String>,
) -> anyhow::Result<()> {
    let backend = connect_migrated().await?;

    let mut profile = CoachingProfile::new(&user_id, &display_name);
    profile.tension_type = tension_type;
    profile.communication_style = communication_style;
    profile.focus_area = focus_area;
    backend.upsert_profile(&profile).await?;

    println!("Profile saved for {user_id}");
    Ok(())
}
