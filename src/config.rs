use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub thingsboard: ThingsBoardConfig,
    pub chirpstack: ChirpStackConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThingsBoardConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub relations: RelationQueryConfig,
}

/// Shape of the asset → device relation query
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelationQueryConfig {
    pub root_type: String,
    pub relation_type: String,
    /// Hops to traverse from the asset (1 = direct children only)
    pub max_level: u32,
    /// Only return entities found at `max_level`
    pub fetch_last_level_only: bool,
    pub negate: bool,
}

impl Default for RelationQueryConfig {
    fn default() -> Self {
        Self {
            root_type: "ASSET".to_string(),
            relation_type: "Contains".to_string(),
            max_level: 1,
            fetch_last_level_only: true,
            negate: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChirpStackConfig {
    pub url: String,
    pub api_token: String,
    #[serde(default = "default_f_port")]
    pub f_port: u8,
    #[serde(default)]
    pub confirmed: bool,
}

fn default_f_port() -> u8 {
    10
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Pause between consecutive device submissions (gateway duty cycle)
    pub pacing_ms: u64,
    /// Upper bound for every outbound HTTP call
    pub request_timeout_secs: u64,
}

impl DispatchConfig {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            pacing_ms: 6000,
            request_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
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

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {:?}: {}", path, e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?;
        Ok(config)
    }

    /// Overlay secrets and endpoints from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Overlay values from `lookup`, keyed by the deployment's variable names
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let targets: [(&str, &mut String); 5] = [
            ("THINGSBOARD_URL", &mut self.thingsboard.url),
            ("THINGSBOARD_USERNAME", &mut self.thingsboard.username),
            ("THINGSBOARD_PASSWORD", &mut self.thingsboard.password),
            ("CHIRPSTACK_URL", &mut self.chirpstack.url),
            ("ACCESS_TOKEN_CHIRPSTACK", &mut self.chirpstack.api_token),
        ];
        for (key, slot) in targets {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *slot = value;
            }
        }
    }

    /// Check the values the pipeline cannot run without
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.thingsboard.url.is_empty() {
            anyhow::bail!("thingsboard.url is not set");
        }
        if self.thingsboard.username.is_empty() {
            anyhow::bail!("thingsboard.username is not set");
        }
        if self.chirpstack.url.is_empty() {
            anyhow::bail!("chirpstack.url is not set");
        }
        if self.chirpstack.api_token.is_empty() {
            anyhow::bail!("chirpstack.api_token is not set");
        }
        if self.dispatch.request_timeout_secs == 0 {
            anyhow::bail!("dispatch.request_timeout_secs must be positive");
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            thingsboard: ThingsBoardConfig {
                url: "http://localhost:8080".to_string(),
                username: String::new(),
                password: String::new(),
                relations: RelationQueryConfig::default(),
            },
            chirpstack: ChirpStackConfig {
                url: "http://localhost:8090".to_string(),
                api_token: String::new(),
                f_port: default_f_port(),
                confirmed: false,
            },
            dispatch: DispatchConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
