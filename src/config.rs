//! Service configuration.
//!
//! Everything comes from CLI flags with `MEDISCAN_*` environment
//! variable fallbacks, so the binary runs with zero flags on a
//! developer machine and is fully configurable in deployment.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default log filter when RUST_LOG is unset.
pub fn default_log_filter() -> &'static str {
    "mediscan=info,tower_http=info"
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Medical image analysis service", long_about = None)]
pub struct Config {
    /// Address the HTTP server binds to
    #[arg(long, env = "MEDISCAN_BIND", default_value = "127.0.0.1:3001")]
    pub bind: SocketAddr,

    /// Data directory for the SQLite database (defaults to the platform data dir)
    #[arg(long, env = "MEDISCAN_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Base URL of the Ollama instance serving the models
    #[arg(long, env = "MEDISCAN_OLLAMA_URL", default_value = "http://localhost:11434")]
    pub ollama_url: String,

    /// Vision model used for text and label detection
    #[arg(long, env = "MEDISCAN_VISION_MODEL", default_value = "llama3.2-vision")]
    pub vision_model: String,

    /// Text model used for reports and follow-up chat
    #[arg(long, env = "MEDISCAN_REPORT_MODEL", default_value = "medgemma")]
    pub report_model: String,

    /// Model request timeout in seconds
    #[arg(long, env = "MEDISCAN_MODEL_TIMEOUT_SECS", default_value_t = 300)]
    pub model_timeout_secs: u64,
}

impl Config {
    /// Resolve (and create) the data directory, returning the database path.
    pub fn database_path(&self) -> Result<PathBuf, String> {
        let dir = match &self.data_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_dir()
                .ok_or_else(|| "Cannot determine platform data directory".to_string())?
                .join("mediscan"),
        };
        std::fs::create_dir_all(&dir)
            .map_err(|e| format!("Cannot create data directory {}: {e}", dir.display()))?;
        Ok(dir.join("mediscan.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let config = Config::parse_from(["mediscan"]);
        assert_eq!(config.bind.port(), 3001);
        assert_eq!(config.ollama_url, "http://localhost:11434");
        assert_eq!(config.model_timeout_secs, 300);
    }

    #[test]
    fn explicit_data_dir_is_used() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::parse_from([
            "mediscan",
            "--data-dir",
            tmp.path().to_str().unwrap(),
        ]);
        let db = config.database_path().unwrap();
        assert!(db.starts_with(tmp.path()));
        assert!(db.ends_with("mediscan.db"));
    }
}
