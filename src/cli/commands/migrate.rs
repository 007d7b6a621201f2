//! Database migration command.

use crate::cli::helpers::{print_err, print_ok, print_step};
use crate::config::Settings;
use crate::repository::migrations::run_migrations;
use crate::repository::util::redact_url_password;

pub async fn cmd_migrate(settings: &Settings) -> anyhow::Result<()> {
    print_step(&format!(
        "Running migrations against {}",
        redact_url_password(&settings.database_url)
    ));

    match run_migrations(&settings.database_url).await {
        Ok(()) => {
            print_ok("Database ready");
            Ok(())
        }
        Err(e) => {
            print_err(&format!("Migration failed: {e}"));
            Err(anyhow::anyhow!("migration failed: {e}"))
        }
    }
}
