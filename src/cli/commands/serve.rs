//! Web server command.

use crate::cli::helpers::{print_ok, print_step};
use crate::config::Settings;
use crate::repository::migrations::run_migrations;

pub async fn cmd_serve(mut settings: Settings, bind: Option<String>) -> anyhow::Result<()> {
    if let Some(bind) = bind {
        settings.bind_addr = bind;
    }

    print_step("Running database migrations...");
    run_migrations(&settings.database_url).await?;
    print_ok("Database ready");

    print_step(&format!("Starting bulkextract server at http://{}", settings.bind_addr));
    println!("  Press Ctrl+C to stop");

    crate::server::serve(settings).await
}
