use std::process::ExitCode;

use clap::{Parser, Subcommand};
use keygate_core::logging::init_logging;
use keygate_core::migrations::Migrator;
use keygate_core::openapi::ApiDoc;
use keygate_core::{App, AuthError, Config};
use sea_orm_migration::MigratorTrait;
use utoipa::OpenApi;

#[derive(Parser)]
#[command(name = "keygate")]
#[command(about = "Authentication service with refresh-token rotation and role-based access control")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run migrations, apply the startup bootstrap, and serve HTTP
    Serve,
    /// Apply pending migrations, or roll some back
    Migrate {
        /// Number of migrations to roll back instead of applying
        #[arg(long)]
        rollback: Option<u32>,
    },
    /// Create any missing default role (admin, user, moderator)
    SeedRoles,
    /// Give an existing account the admin role
    PromoteAdmin {
        /// Email of the account to promote
        email: String,
    },
    /// Delete expired refresh tokens
    SweepExpired,
    /// Write the OpenAPI document to a file
    Docs {
        /// Output file path
        #[arg(long, default_value = "openapi.json")]
        output: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Commands::Docs { output } = &cli.command {
        return match export_openapi(output) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: {e}");
                ExitCode::FAILURE
            }
        };
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(config.log_format);

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, config: Config) -> Result<(), AuthError> {
    let app = App::with_config(config).await?;

    match command {
        Commands::Serve => {
            app.run_migrations().await?;
            app.bootstrap().await?;
            app.run().await
        }
        Commands::Migrate { rollback: None } => app.run_migrations().await,
        Commands::Migrate {
            rollback: Some(steps),
        } => {
            tracing::info!(steps, "Rolling back migrations...");
            Migrator::down(&app.db, Some(steps))
                .await
                .map_err(|e| AuthError::storage("roll back migrations", e))?;
            tracing::info!("Rollback complete.");
            Ok(())
        }
        Commands::SeedRoles => {
            app.run_migrations().await?;
            let created = app.state().rbac.seed_default_roles().await?;
            if created.is_empty() {
                println!("Default roles already present.");
            }
            for role in created {
                println!("Created role {} ({})", role.name, role.id);
            }
            Ok(())
        }
        Commands::PromoteAdmin { email } => {
            app.run_migrations().await?;
            let user = app.state().rbac.promote_admin(&email).await?;
            println!("{} ({}) is now an admin", user.email, user.id);
            Ok(())
        }
        Commands::SweepExpired => {
            let deleted = app.state().refresh.sweep_expired().await?;
            println!("Deleted {deleted} expired refresh token(s)");
            Ok(())
        }
        Commands::Docs { output } => export_openapi(&output),
    }
}

fn export_openapi(output: &str) -> Result<(), AuthError> {
    let json = ApiDoc::openapi()
        .to_pretty_json()
        .map_err(|e| AuthError::Internal(format!("failed to render OpenAPI document: {e}")))?;
    std::fs::write(output, json)
        .map_err(|e| AuthError::Internal(format!("failed to write {output}: {e}")))?;
    println!("OpenAPI document written to {output}");
    Ok(())
}
