mod apply;
mod fix_fk;
mod inspect;
mod widen;

pub use apply::ApplyCommand;
pub use fix_fk::FixFkCommand;
pub use inspect::InspectCommand;
pub use widen::WidenCommand;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::Path;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use pgshift_core::config::PgShiftConfig;
use pgshift_runtime::Database;

/// pgshift - safe schema evolution for PostgreSQL
#[derive(Parser)]
#[command(name = "pgshift")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command.
#[derive(Args, Clone)]
pub struct GlobalArgs {
    /// Configuration file path.
    #[arg(short, long, default_value = "pgshift.toml", global = true)]
    pub config: String,

    /// Database URL, overrides the configuration file and `DATABASE_URL`.
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    /// Log every schema change (debug level).
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Show what the catalog knows about a table or column.
    Inspect(InspectCommand),

    /// Widen an int4 column to int8, following foreign keys and views.
    Widen(WidenCommand),

    /// Make a column carry exactly one foreign key to the given target.
    FixFk(FixFkCommand),

    /// Apply a migration plan file in one transaction.
    Apply(ApplyCommand),
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        // Load .env if present
        dotenvy::dotenv().ok();

        let config = load_config(&self.global)?;
        init_tracing(&config, self.global.verbose);
        debug!(config = %self.global.config, schema = %config.database.schema, "connecting");

        let db = Database::from_config(&config.database).await?;
        db.health_check().await?;
        let result = match self.command {
            Commands::Inspect(cmd) => cmd.execute(&db, &self.global).await,
            Commands::Widen(cmd) => cmd.execute(&db, &self.global).await,
            Commands::FixFk(cmd) => cmd.execute(&db, &self.global).await,
            Commands::Apply(cmd) => cmd.execute(&db, &self.global).await,
        };
        db.close().await;
        result
    }
}

/// Resolve configuration: the file when present, defaults around
/// `--database-url` or `DATABASE_URL` otherwise. `--database-url` always
/// replaces the configured URL.
fn load_config(args: &GlobalArgs) -> Result<PgShiftConfig> {
    let mut config = if Path::new(&args.config).exists() {
        PgShiftConfig::from_file(&args.config)?
    } else if let Some(url) = &args.database_url {
        PgShiftConfig::default_with_database_url(url)
    } else if let Ok(url) = std::env::var("DATABASE_URL") {
        PgShiftConfig::default_with_database_url(&url)
    } else {
        anyhow::bail!(
            "Configuration file not found: {}\nSet DATABASE_URL or pass --database-url.",
            args.config
        );
    };

    if let Some(url) = &args.database_url {
        config.database.url = url.clone();
    }
    if config.database.url.trim().is_empty() {
        anyhow::bail!("No database URL configured");
    }
    Ok(config)
}

fn init_tracing(config: &PgShiftConfig, verbose: bool) {
    let level = if verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if config.logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Print a value as pretty JSON on stdout.
pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_inspect() {
        let cli = Cli::try_parse_from(["pgshift", "inspect", "table", "res_partner"]);
        assert!(cli.is_ok());
        let cli = Cli::try_parse_from(["pgshift", "inspect", "column", "res_partner", "email"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn test_cli_parse_fix_fk() {
        let cli = Cli::try_parse_from([
            "pgshift",
            "fix-fk",
            "sale_order",
            "partner_id",
            "res_partner",
            "id",
            "--on-delete",
            "set null",
            "--json",
        ])
        .unwrap();
        assert!(cli.global.json);
        match cli.command {
            Commands::FixFk(cmd) => {
                assert_eq!(cmd.on_delete, pgshift_core::OnDelete::SetNull)
            }
            _ => panic!("expected fix-fk"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_on_delete() {
        let cli = Cli::try_parse_from([
            "pgshift", "fix-fk", "a", "b", "c", "id", "--on-delete", "explode",
        ]);
        assert!(cli.is_err());
    }

    #[test]
    fn test_load_config_from_file_with_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pgshift.toml");
        std::fs::write(
            &path,
            "[database]\nurl = \"postgres://localhost/from_file\"\nschema = \"erp\"\n",
        )
        .unwrap();

        let mut args = GlobalArgs {
            config: path.to_string_lossy().into_owned(),
            database_url: None,
            json: false,
            verbose: false,
        };
        let config = load_config(&args).unwrap();
        assert_eq!(config.database.url, "postgres://localhost/from_file");
        assert_eq!(config.database.schema, "erp");

        args.database_url = Some("postgres://localhost/override".into());
        let config = load_config(&args).unwrap();
        assert_eq!(config.database.url, "postgres://localhost/override");
    }
}
