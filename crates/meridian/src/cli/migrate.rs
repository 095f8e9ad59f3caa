use anyhow::{Context, Result};
use clap::Parser;
use meridian_runtime::migrations::MigrationRunner;
use meridian_runtime::{db, observability};

/// Apply pending database migrations and exit.
#[derive(Parser)]
pub struct MigrateCommand {
    /// Configuration file path.
    #[arg(short, long, default_value = "meridian.toml")]
    pub config: String,
}

impl MigrateCommand {
    pub async fn execute(self) -> Result<()> {
        let config = meridian_runtime::config::load_from_file(&self.config)
            .with_context(|| format!("loading config from {}", self.config))?;

        observability::init_tracing(&config.observability);

        let pool = db::create_pool(&config.database)
            .await
            .context("connecting to database")?;

        MigrationRunner::new(pool)
            .run()
            .await
            .map_err(|e| anyhow::anyhow!("{e}"))?;

        tracing::info!("migrations applied");
        Ok(())
    }
}
