//! Process configuration, read from command-line flags with environment fallbacks.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use clap::{Args, Parser};

use crate::auth::FIREBASE_JWKS_URL;
use crate::backend::{DEFAULT_GEMINI_MODEL, DEFAULT_GEMINI_URL, DEFAULT_MAX_TURNS};
use crate::store::{DEFAULT_DATABASE, DEFAULT_FIRESTORE_URL};
use crate::tools::Toolset;

/// Tracing target for configuration.
pub const TRACING_TARGET_CONFIG: &str = "docit_functions::config";

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid configuration: {0}")]
pub struct ConfigError(pub String);

/// Command-line interface of the `docit-functions` server.
///
/// # Environment Variables
///
/// Every option can also be set from the environment, e.g.
/// `GEMINI_API_KEY`, `FIREBASE_PROJECT_ID`, `PORT`, `DOCIT_TOOLSET`.
#[derive(Debug, Clone, Parser)]
#[command(name = "docit-functions", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub gemini: GeminiConfig,

    #[command(flatten)]
    pub firestore: FirestoreConfig,

    #[command(flatten)]
    pub auth: AuthConfig,

    /// Firebase project the tokens and documents belong to.
    #[arg(long, env = "FIREBASE_PROJECT_ID")]
    pub project_id: String,

    /// Tools exposed to the model.
    #[arg(long, env = "DOCIT_TOOLSET", value_enum, default_value_t = Toolset::All)]
    pub toolset: Toolset,

    /// Timeout in seconds for outbound HTTP calls (model, store, key fetches).
    #[arg(long, env = "HTTP_TIMEOUT", default_value_t = 60)]
    pub http_timeout: u64,
}

impl Cli {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.gemini.validate()?;
        if self.project_id.trim().is_empty() {
            return Err(ConfigError("project id must not be empty".into()));
        }
        if self.http_timeout == 0 || self.http_timeout > 300 {
            return Err(ConfigError(format!(
                "HTTP timeout {} seconds is invalid. Must be between 1 and 300 seconds.",
                self.http_timeout
            )));
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout)
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Args)]
pub struct ServerConfig {
    /// Address to bind to. Use 0.0.0.0 inside a container.
    #[arg(long, env = "HOST", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub host: IpAddr,

    /// Port to listen on.
    #[arg(short = 'p', long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Seconds to wait for in-flight requests on shutdown.
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 10)]
    pub shutdown_timeout: u64,
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError("port must not be 0".into()));
        }
        if self.shutdown_timeout == 0 || self.shutdown_timeout > 300 {
            return Err(ConfigError(format!(
                "Shutdown timeout {} seconds is invalid. Must be between 1 and 300 seconds.",
                self.shutdown_timeout
            )));
        }
        Ok(())
    }

    pub fn server_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout)
    }
}

/// Gemini API access.
#[derive(Clone, Args)]
pub struct GeminiConfig {
    /// API key for the Gemini API.
    #[arg(long = "gemini-api-key", env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Model id.
    #[arg(long = "gemini-model", env = "GEMINI_MODEL", default_value = DEFAULT_GEMINI_MODEL)]
    pub model: String,

    /// API base URL.
    #[arg(id = "gemini_base_url", long = "gemini-base-url", env = "GEMINI_BASE_URL", default_value = DEFAULT_GEMINI_URL)]
    pub base_url: String,

    /// Model turns allowed per generation while the model keeps calling tools.
    #[arg(
        long = "gemini-max-turns",
        env = "GEMINI_MAX_TURNS",
        default_value_t = DEFAULT_MAX_TURNS
    )]
    pub max_turns: usize,
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("max_turns", &self.max_turns)
            .finish()
    }
}

impl GeminiConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError("GEMINI_API_KEY must not be empty".into()));
        }
        if self.max_turns == 0 {
            return Err(ConfigError("max turns must be at least 1".into()));
        }
        Ok(())
    }
}

/// Firestore access.
#[derive(Clone, Args)]
pub struct FirestoreConfig {
    /// Database id within the project.
    #[arg(
        long = "firestore-database",
        env = "FIRESTORE_DATABASE",
        default_value = DEFAULT_DATABASE
    )]
    pub database: String,

    /// REST base URL; point at the emulator for local runs.
    #[arg(
        id = "firestore_base_url",
        long = "firestore-base-url",
        env = "FIRESTORE_BASE_URL",
        default_value = DEFAULT_FIRESTORE_URL
    )]
    pub base_url: String,

    /// OAuth access token for Firestore. Not needed with the emulator.
    #[arg(
        long = "firestore-access-token",
        env = "FIRESTORE_ACCESS_TOKEN",
        hide_env_values = true
    )]
    pub access_token: Option<String>,
}

impl std::fmt::Debug for FirestoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirestoreConfig")
            .field("database", &self.database)
            .field("base_url", &self.base_url)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// ID token verification.
#[derive(Debug, Clone, Args)]
pub struct AuthConfig {
    /// JWKS endpoint publishing the ID token signing keys.
    #[arg(long = "jwks-url", env = "FIREBASE_JWKS_URL", default_value = FIREBASE_JWKS_URL)]
    pub jwks_url: String,
}

/// Logs the effective configuration without secrets.
pub fn log_config(cli: &Cli) {
    tracing::info!(
        target: TRACING_TARGET_CONFIG,
        addr = %cli.server.server_addr(),
        project_id = %cli.project_id,
        model = %cli.gemini.model,
        max_turns = cli.gemini.max_turns,
        toolset = ?cli.toolset,
        firestore = %cli.firestore.base_url,
        "configuration loaded"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec![
            "docit-functions",
            "--gemini-api-key",
            "key",
            "--project-id",
            "docit",
        ];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_match_deployment() {
        let cli = parse(&[]);
        assert_eq!(cli.toolset, Toolset::All);
        assert_eq!(cli.gemini.model, DEFAULT_GEMINI_MODEL);
        assert_eq!(cli.gemini.max_turns, DEFAULT_MAX_TURNS);
        assert_eq!(cli.firestore.database, "(default)");
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn parses_toolset_names() {
        assert_eq!(parse(&["--toolset", "none"]).toolset, Toolset::Empty);
        assert_eq!(parse(&["--toolset", "items"]).toolset, Toolset::Items);
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(parse(&["--http-timeout", "0"]).validate().is_err());
        assert!(parse(&["--gemini-max-turns", "0"]).validate().is_err());
        assert!(parse(&["--shutdown-timeout", "301"]).validate().is_err());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let cli = parse(&["--firestore-access-token", "tok-123"]);
        let debug = format!("{cli:?}");
        assert!(!debug.contains("tok-123"));
        assert!(!debug.contains("\"key\""));
    }
}
