use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
};

use anyhow::Result;
use serde::Deserialize;

static DEFAULT_CONFIG_FILE: &str = "lightnovel.toml";
static CONFIG_PATH_ENV: &str = "LIGHTNOVEL_CONFIG";
static ENV_PREFIX: &str = "LIGHTNOVEL";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub library: LibraryConfig,
    pub settings_file: SettingsFile,
    pub llm: LlmConfig,
    pub preload: PreloadConfig,
    pub reader: ReaderConfig,
    pub glossary: GlossaryConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    pub root: PathBuf,
    /// Fall back to a case-insensitive directory match when no exact match exists.
    pub case_insensitive: bool,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("Lightnovels"),
            case_insensitive: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct SettingsFile(pub PathBuf);

impl Default for SettingsFile {
    fn default() -> Self {
        Self(PathBuf::from(".settings/ai-rewrite.json"))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            // Ollama generate endpoint
            api_url: "http://localhost:11434/api/generate".to_string(),
            api_key: None,
            model: "llama3".to_string(),
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PreloadConfig {
    pub queue_capacity: usize,
    pub prefetch_next: bool,
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            prefetch_next: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub inline_generation: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GlossaryConfig {
    pub chunk_chars: usize,
}

impl Default for GlossaryConfig {
    fn default() -> Self {
        Self { chunk_chars: 12000 }
    }
}

impl Config {
    /// Defaults, then the TOML file, then `LIGHTNOVEL__*` variables.
    /// `LLM_API_URL` / `LLM_API_KEY` win over everything else.
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::from_file(
            &path,
            std::env::var("LLM_API_URL").ok(),
            std::env::var("LLM_API_KEY").ok(),
        )
    }

    pub fn from_file(
        path: &str,
        api_url: Option<String>,
        api_key: Option<String>,
    ) -> Result<Self> {
        config::Config::builder()
            .add_source(config::File::new(path, config::FileFormat::Toml).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("llm.api_url", api_url)?
            .set_override_option("llm.api_key", api_key)?
            .build()?
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("{} deserialization failed: {}", path, e))
    }

    pub fn server_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .server
            .host
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid host address {}: {}", self.server.host, e))?;
        Ok(SocketAddr::new(ip, self.server.port))
    }
}
