use serde;
use std::time::Duration;

/// Port the HTTP transport listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 8120;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Settings {
    pub app_host: String,
    pub app_port: u16,
    pub transport: TransportKind,
    pub log_level: String,
    pub server: ServerSettings,
    pub http: HttpSettings,
}

/// Which transport the binary serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Newline-delimited JSON-RPC over stdin/stdout
    Stdio,
    /// HTTP event stream (`GET /sse` + `POST /messages`)
    Sse,
}

/// Identity advertised to clients during `initialize`.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ServerSettings {
    pub name: String,
    pub version: String,
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct HttpSettings {
    /// Period of the comment written to idle event streams. A closed client
    /// is noticed on the second write after it went away.
    pub keep_alive_interval_ms: u64,
    pub max_message_bytes: usize,
}

impl HttpSettings {
    pub fn keep_alive_interval(&self) -> Duration {
        // a zero period would make the keep-alive timer spin
        Duration::from_millis(self.keep_alive_interval_ms.max(1))
    }
}

impl Settings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.app_host, self.app_port)
    }
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let settings = config::Config::builder()
        .set_default("app_host", "127.0.0.1")?
        .set_default("app_port", i64::from(DEFAULT_PORT))?
        .set_default("transport", "sse")?
        .set_default("log_level", "info")?
        .set_default("server.name", "mcp-service-say-hello")?
        .set_default("server.version", env!("CARGO_PKG_VERSION"))?
        .set_default(
            "server.instructions",
            r#"Call the "say_hello" tool with the user name to greet."#,
        )?
        .set_default("http.keep_alive_interval_ms", 100_i64)?
        .set_default("http.max_message_bytes", 4 * 1024 * 1024_i64)?
        // Values from `configuration.yaml` (or .json, .toml) override the defaults
        .add_source(config::File::with_name("configuration").required(false))
        // MCP_APP_PORT=9000, MCP_HTTP__KEEP_ALIVE_INTERVAL_MS=500, ...
        .add_source(
            config::Environment::with_prefix("MCP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    settings.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_describe_the_sse_server() {
        let settings = get_configuration().unwrap();

        assert_eq!(settings.transport, TransportKind::Sse);
        assert_eq!(settings.server.name, "mcp-service-say-hello");
        assert!(settings
            .server
            .instructions
            .as_deref()
            .unwrap()
            .contains("say_hello"));
        assert!(settings.http.max_message_bytes > 0);
        assert!(settings.http.keep_alive_interval() <= Duration::from_millis(250));
    }

    #[test]
    fn test_keep_alive_interval_is_never_zero() {
        let http = HttpSettings {
            keep_alive_interval_ms: 0,
            max_message_bytes: 1024,
        };

        assert_eq!(http.keep_alive_interval(), Duration::from_millis(1));
    }
}
