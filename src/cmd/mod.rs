//! CLI command implementations.
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `screen` | `Screen`         |
//! | `status` | `Status`, `Log`  |
//! | `config` | `Config`         |
//! | `serve`  | `Serve`          |

pub mod config;
pub mod screen;
pub mod serve;
pub mod status;

pub use config::cmd_config;
pub use screen::cmd_screen;
pub use serve::cmd_serve;
pub use status::{cmd_log, cmd_status};

use anyhow::Result;
use screenwise::config::ScreenwiseConfig;

use super::Cli;

/// Configuration file plus `.env`/environment overrides plus `--db`.
pub fn load_settings(cli: &Cli) -> Result<ScreenwiseConfig> {
    let mut settings = ScreenwiseConfig::resolve(&cli.config)?;
    if let Some(db) = &cli.db {
        settings.screening.db_path = Some(db.clone());
    }
    Ok(settings)
}
