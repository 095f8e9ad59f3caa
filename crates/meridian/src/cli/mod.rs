mod migrate;
mod serve;

pub use migrate::MigrateCommand;
pub use serve::ServeCommand;

use clap::{Parser, Subcommand};

/// meridian - multi-tenant task orchestration gateway
#[derive(Parser)]
#[command(name = "meridian")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the orchestration and streaming gRPC servers.
    Serve(ServeCommand),

    /// Apply pending database migrations and exit.
    Migrate(MigrateCommand),
}

impl Cli {
    pub async fn execute(self) -> anyhow::Result<()> {
        match self.command {
            Commands::Serve(cmd) => cmd.execute().await,
            Commands::Migrate(cmd) => cmd.execute().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_serve_with_default_config_path() {
        let cli = Cli::try_parse_from(["meridian", "serve"]).unwrap();
        match cli.command {
            Commands::Serve(cmd) => assert_eq!(cmd.config, "meridian.toml"),
            _ => panic!("expected Serve"),
        }
    }

    #[test]
    fn parses_migrate() {
        let cli = Cli::try_parse_from(["meridian", "migrate", "--config", "custom.toml"]);
        assert!(cli.is_ok());
    }
}
