//! Layered gateway configuration.
//!
//! Sources, lowest precedence first: built-in defaults, the TOML file,
//! `KILO_*` environment variables (`__` separates nested keys, e.g.
//! `KILO_AGENT__TRANSPORT=process`). Command-line flags are applied on top by
//! the binary.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::agent::{AgentInvoker, HttpAgent, StdioAgent, StdioAgentConfig};
use crate::api::{AppState, FileIndexClient};
use crate::bridge::{ProcessBridge, ProcessBridgeConfig};

pub const APP_NAME: &str = "kilo";
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8001";

const ENV_PREFIX: &str = "KILO";
/// Unprefixed backend variable, honored when `KILO_BACKEND_URL` is unset.
const LEGACY_BACKEND_ENV: &str = "BACKEND_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Address of the agent service and the file-index capability.
    pub backend_url: String,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub agent: AgentConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            agent: AgentConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// How the agent capability is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentTransport {
    /// `POST /agent/run` and `/agent/stream` on the backend.
    #[default]
    Http,
    /// One bridge process per blocking call, a stdio channel per stream.
    Process,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub transport: AgentTransport,
    pub timeout_secs: u64,
    pub stream_idle_timeout_secs: u64,
    pub bridge: BridgeSettings,
    pub channel: ChannelSettings,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            transport: AgentTransport::Http,
            timeout_secs: 60,
            stream_idle_timeout_secs: 120,
            bridge: BridgeSettings::default(),
            channel: ChannelSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    pub program: String,
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<String>,
    pub timeout_secs: u64,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            program: "kilo-bridge".to_string(),
            args: Vec::new(),
            temp_dir: None,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSettings {
    pub program: String,
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            program: "kilo-agent".to_string(),
            args: Vec::new(),
            working_dir: None,
        }
    }
}

impl AppConfig {
    /// Build the invoker for the configured transport.
    pub fn agent_invoker(&self) -> Result<AgentInvoker> {
        let agent = &self.agent;
        let invoker = match agent.transport {
            AgentTransport::Http => {
                let http = Arc::new(
                    HttpAgent::new(&self.backend_url).context("creating HTTP agent client")?,
                );
                AgentInvoker::new(http.clone(), http)
            }
            AgentTransport::Process => {
                let bridge = ProcessBridge::new(ProcessBridgeConfig {
                    program: agent.bridge.program.clone(),
                    args: agent.bridge.args.clone(),
                    working_dir: None,
                    temp_dir: agent.bridge.temp_dir.as_deref().map(expand_str_path).transpose()?,
                    timeout: Duration::from_secs(agent.bridge.timeout_secs),
                });
                let channel = StdioAgent::new(StdioAgentConfig {
                    program: agent.channel.program.clone(),
                    args: agent.channel.args.clone(),
                    working_dir: agent
                        .channel
                        .working_dir
                        .as_deref()
                        .map(expand_str_path)
                        .transpose()?,
                });
                AgentInvoker::new(Arc::new(bridge), Arc::new(channel))
            }
        };
        Ok(invoker.with_timeout(Duration::from_secs(agent.timeout_secs)))
    }

    /// Build the shared gateway state.
    pub fn app_state(&self) -> Result<AppState> {
        let files =
            FileIndexClient::new(&self.backend_url).context("creating file index client")?;
        Ok(AppState::new(self.agent_invoker()?, files).with_stream_idle_timeout(
            Duration::from_secs(self.agent.stream_idle_timeout_secs),
        ))
    }
}

/// Load configuration from `path` (or the default location) and the process
/// environment.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    load_config_with_env(path, None)
}

/// Like [`load_config`], reading variables from `vars` instead of the process
/// environment when given.
pub fn load_config_with_env(
    path: Option<&Path>,
    vars: Option<HashMap<String, String>>,
) -> Result<AppConfig> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => default_config_path()?,
    };

    let lookup = |key: &str| match &vars {
        Some(vars) => vars.get(key).cloned(),
        None => env::var(key).ok(),
    };
    let legacy_backend = match lookup(&format!("{ENV_PREFIX}_BACKEND_URL")) {
        Some(_) => None,
        None => lookup(LEGACY_BACKEND_ENV),
    };

    let mut builder = Config::builder()
        .set_default("backend_url", DEFAULT_BACKEND_URL)?
        .set_default("logging.level", "info")?
        .add_source(
            File::from(path.as_path())
                .format(FileFormat::Toml)
                .required(false),
        )
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("agent.bridge.args")
                .with_list_parse_key("agent.channel.args")
                .source(vars),
        );
    if let Some(url) = legacy_backend {
        builder = builder.set_override("backend_url", url)?;
    }

    let config: AppConfig = builder
        .build()
        .with_context(|| format!("loading configuration from {}", path.display()))?
        .try_deserialize()
        .context("invalid configuration")?;
    Ok(config)
}

/// `$XDG_CONFIG_HOME/kilo/config.toml`, else the platform config dir.
pub fn default_config_path() -> Result<PathBuf> {
    Ok(default_config_dir()?.join("config.toml"))
}

fn default_config_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }

    if let Some(mut dir) = dirs::config_dir() {
        dir.push(APP_NAME);
        return Ok(dir);
    }

    dirs::home_dir()
        .map(|home| home.join(".config").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine configuration directory"))
}

/// Write the default configuration to `path`, creating parent directories.
pub fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {}", parent.display()))?;
    }

    let toml = toml::to_string_pretty(&AppConfig::default())
        .context("serializing default config to TOML")?;
    let mut body = format!("# Configuration for {APP_NAME}\n# File: {}\n\n", path.display());
    body.push_str(&toml);
    fs::write(path, body).with_context(|| format!("writing config file to {}", path.display()))
}

pub fn expand_str_path(text: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(text).context("expanding path")?;
    Ok(PathBuf::from(expanded.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    fn missing_file(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("absent.toml")
    }

    #[test]
    fn defaults_without_file_or_env() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_with_env(Some(&missing_file(&dir)), vars(&[])).unwrap();

        assert_eq!(config.backend_url, DEFAULT_BACKEND_URL);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.agent.transport, AgentTransport::Http);
        assert_eq!(config.agent.timeout_secs, 60);
        assert_eq!(config.agent.stream_idle_timeout_secs, 120);
        assert_eq!(config.agent.bridge.program, "kilo-bridge");
    }

    #[test]
    fn environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "backend_url = \"http://file:1\"\n[server]\nport = 4000\n[agent]\ntransport = \"http\"\n",
        )
        .unwrap();

        let config = load_config_with_env(
            Some(&path),
            vars(&[
                ("KILO_SERVER__PORT", "5000"),
                ("KILO_AGENT__TRANSPORT", "process"),
                ("KILO_AGENT__BRIDGE__ARGS", "--verbose,--dry"),
            ]),
        )
        .unwrap();

        assert_eq!(config.backend_url, "http://file:1");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.agent.transport, AgentTransport::Process);
        assert_eq!(config.agent.bridge.args, vec!["--verbose", "--dry"]);
    }

    #[test]
    fn legacy_backend_variable_is_a_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = missing_file(&dir);

        let config =
            load_config_with_env(Some(&path), vars(&[("BACKEND_URL", "http://legacy:8001")]))
                .unwrap();
        assert_eq!(config.backend_url, "http://legacy:8001");

        let config = load_config_with_env(
            Some(&path),
            vars(&[
                ("BACKEND_URL", "http://legacy:8001"),
                ("KILO_BACKEND_URL", "http://kilo:9000"),
            ]),
        )
        .unwrap();
        assert_eq!(config.backend_url, "http://kilo:9000");
    }

    #[test]
    fn unknown_transport_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config_with_env(
            Some(&missing_file(&dir)),
            vars(&[("KILO_AGENT__TRANSPORT", "carrier-pigeon")]),
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("invalid configuration"));
    }

    #[test]
    fn written_default_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        write_default_config(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# Configuration for kilo"));

        let config = load_config_with_env(Some(&path), vars(&[])).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.agent.channel.program, "kilo-agent");
    }

    #[test]
    fn builds_invoker_for_each_transport() {
        let mut config = AppConfig::default();
        assert_eq!(config.agent_invoker().unwrap().transports(), ("http", "http"));

        config.agent.transport = AgentTransport::Process;
        config.agent.timeout_secs = 5;
        let invoker = config.agent_invoker().unwrap();
        assert_eq!(invoker.transports(), ("process", "stdio"));
        assert_eq!(invoker.timeout(), Duration::from_secs(5));
    }
}
