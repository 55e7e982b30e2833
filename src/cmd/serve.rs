//! Progress API server: `screenwise serve`.

use anyhow::Result;

use screenwise::server::{ServerConfig, start_server};

use super::super::Cli;
use super::load_settings;

pub async fn cmd_serve(cli: &Cli, port: u16, dev: bool) -> Result<()> {
    let settings = load_settings(cli)?;
    let config = ServerConfig {
        port,
        db_path: settings.db_path(),
        dev_mode: dev,
    };
    start_server(config, &settings).await
}
