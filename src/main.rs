//! limited-server
//!
//! ```text
//!   TCP accept (bounded)
//!     → per-connection request counter
//!     → request id / trace span / request log
//!     → connection request limiter (Connection: close after N)
//!     → timeout
//!     → rewrite rules (redirect, reject, rewrite, add header)
//!     → router: /, /dump, /bogus, /form/*, /ws/*, static files
//! ```

use std::path::PathBuf;

use clap::Parser;

use limited_server::config::{load_config, validate_config, ConfigError, ServerConfig};
use limited_server::lifecycle;

#[derive(Parser, Debug)]
#[command(name = "limited-server", version, about = "HTTP server with per-connection request limits")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address
    #[arg(short, long)]
    bind: Option<String>,

    /// Override the per-connection request limit
    #[arg(short = 'n', long, allow_hyphen_values = true)]
    max_requests: Option<i64>,

    /// Reload rewrite rules when the config file changes
    #[arg(short, long, requires = "config")]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }
    if let Some(max) = cli.max_requests {
        config.limits.max_requests_per_connection = Some(max);
    }
    validate_config(&config).map_err(ConfigError::Validation)?;

    let watch = cli.watch.then_some(cli.config).flatten();
    lifecycle::start(config, watch).await?;
    Ok(())
}
