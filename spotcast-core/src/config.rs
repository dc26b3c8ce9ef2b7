use crate::device::DiscoverySweep;
use crate::error::{CoreError, Result};
use const_format::concatcp;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default address the event entry points listen on
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8765";

/// Default event domain; entry points are `<domain>.play` and `<domain>.controls`
pub const DEFAULT_EVENT_DOMAIN: &str = "spotify";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpotcastConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub aliases: AliasConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub cast: CastConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Provider specific sections, parsed by the provider crates
    #[serde(default)]
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_event_domain")]
    pub event_domain: String,
}

fn default_bind() -> String {
    DEFAULT_BIND_ADDRESS.to_string()
}

fn default_event_domain() -> String {
    DEFAULT_EVENT_DOMAIN.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            event_domain: default_event_domain(),
        }
    }
}

impl ServerConfig {
    /// Route path of the play entry point, e.g. `/spotify.play`
    #[must_use]
    pub fn play_path(&self) -> String {
        format!("/{}.play", self.event_domain)
    }

    /// Route path of the control entry point, e.g. `/spotify.controls`
    #[must_use]
    pub fn controls_path(&self) -> String {
        format!("/{}.controls", self.event_domain)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// ISO 3166-1 alpha-2 country code used for market scoped lookups
    #[serde(default = "default_country")]
    pub country: String,
    /// ISO 639 language and ISO 3166-1 country joined by an underscore
    #[serde(default = "default_language")]
    pub language: String,
    /// Username whose playlists are used when a request names none
    #[serde(default = "default_username")]
    pub username: String,
}

fn default_country() -> String {
    "CA".to_string()
}

fn default_language() -> String {
    "en_CA".to_string()
}

fn default_username() -> String {
    "me".to_string()
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            country: default_country(),
            language: default_language(),
            username: default_username(),
        }
    }
}

/// Name translation tables
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AliasConfig {
    /// alias -> device name
    #[serde(default)]
    pub devices: HashMap<String, String>,
    /// alias -> Spotify username
    #[serde(default)]
    pub users: HashMap<String, String>,
}

impl AliasConfig {
    /// Map a user alias to the Spotify username, or return the input unchanged
    #[must_use]
    pub fn user<'a>(&'a self, name: &'a str) -> &'a str {
        self.users.get(name).map_or(name, String::as_str)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_discovery_tries")]
    pub tries: u32,
    #[serde(default = "default_retry_wait")]
    pub retry_wait_secs: u64,
    #[serde(default = "default_discovery_timeout")]
    pub timeout_secs: u64,
}

const fn default_discovery_tries() -> u32 {
    5
}

const fn default_retry_wait() -> u64 {
    5
}

const fn default_discovery_timeout() -> u64 {
    30
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            tries: default_discovery_tries(),
            retry_wait_secs: default_retry_wait(),
            timeout_secs: default_discovery_timeout(),
        }
    }
}

impl DiscoveryConfig {
    #[must_use]
    pub const fn sweep(&self) -> DiscoverySweep {
        DiscoverySweep {
            tries: self.tries,
            retry_wait: Duration::from_secs(self.retry_wait_secs),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CastConfig {
    /// How long to wait for an endpoint connection to become ready
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// How long to wait for the receiver app to launch and accept credentials
    #[serde(default = "default_launch_timeout")]
    pub launch_timeout_secs: u64,
}

const fn default_connect_timeout() -> u64 {
    2
}

const fn default_launch_timeout() -> u64 {
    10
}

impl Default for CastConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            launch_timeout_secs: default_launch_timeout(),
        }
    }
}

impl CastConfig {
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    #[must_use]
    pub const fn launch_timeout(&self) -> Duration {
        Duration::from_secs(self.launch_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Also write logs to a file in the cache directory
    #[serde(default)]
    pub enabled: bool,
    /// Raise the default log level to debug
    #[serde(default)]
    pub debug: bool,
}

/// Raw `[providers.*]` tables, deserialized on demand by each provider crate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProvidersConfig(toml::Table);

impl ProvidersConfig {
    /// Deserialize the `[providers.<name>]` table.
    ///
    /// # Errors
    ///
    /// Returns an error if the table exists but does not match `T`.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        self.0
            .get(name)
            .map(|value| value.clone().try_into::<T>())
            .transpose()
            .map_err(CoreError::from)
    }
}

impl SpotcastConfig {
    /// Get the configuration directory path (~/.config/spotcast/)
    #[must_use]
    pub fn config_dir() -> PathBuf {
        crate::paths::config_dir()
    }

    /// Get the config file path (~/.config/spotcast/config.toml)
    #[must_use]
    pub fn config_path() -> PathBuf {
        crate::paths::config_path()
    }

    /// Load config from file or create template on first run
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read, parsed, or fails validation.
    /// Returns [`CoreError::ConfigNotFound`] after writing a fresh template.
    pub fn load_or_create(provider_templates: Option<&[&str]>) -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            if let Some(parent) = config_path.parent() {
                fs::create_dir_all(parent)?;
            }

            fs::write(&config_path, build_config_template(provider_templates))?;

            return Err(CoreError::ConfigNotFound { path: config_path });
        }

        let content = fs::read_to_string(&config_path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid TOML or fails validation.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field formats.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigInvalid`] naming the first malformed field.
    pub fn validate(&self) -> Result<()> {
        if !is_country_code(&self.playback.country) {
            return Err(CoreError::ConfigInvalid {
                message: format!(
                    "playback.country \"{}\" is not an ISO 3166-1 alpha-2 code (e.g. \"US\")",
                    self.playback.country
                ),
            });
        }
        if !is_language_code(&self.playback.language) {
            return Err(CoreError::ConfigInvalid {
                message: format!(
                    "playback.language \"{}\" must look like \"en_US\"",
                    self.playback.language
                ),
            });
        }
        if self.server.bind.parse::<SocketAddr>().is_err() {
            return Err(CoreError::ConfigInvalid {
                message: format!("server.bind \"{}\" is not a socket address", self.server.bind),
            });
        }
        if self.server.event_domain.trim().is_empty() {
            return Err(CoreError::ConfigMissingField {
                field: "server.event_domain".into(),
            });
        }
        if self.discovery.tries == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "discovery.tries must be at least 1".into(),
            });
        }
        Ok(())
    }
}

fn is_country_code(value: &str) -> bool {
    value.len() == 2 && value.chars().all(|c| c.is_ascii_uppercase())
}

fn is_language_code(value: &str) -> bool {
    let mut parts = value.splitn(2, '_');
    let (Some(language), Some(country)) = (parts.next(), parts.next()) else {
        return false;
    };
    language.len() == 2
        && language.chars().all(|c| c.is_ascii_lowercase())
        && is_country_code(country)
}

/// Build the full config template, appending provider sections.
#[must_use]
pub fn build_config_template(provider_templates: Option<&[&str]>) -> String {
    let mut template = String::from(CONFIG_TEMPLATE);
    for provider in provider_templates.unwrap_or_default() {
        template.push('\n');
        template.push_str(provider);
    }
    template
}

const CONFIG_TEMPLATE: &str = concatcp!(
    r#"# Spotcast Configuration
# ~/.config/spotcast/config.toml

[server]
# Play and control requests are accepted as JSON POSTs on
# /<event_domain>.play and /<event_domain>.controls
bind = ""#,
    DEFAULT_BIND_ADDRESS,
    r#""
event_domain = ""#,
    DEFAULT_EVENT_DOMAIN,
    r#""

[playback]
country = "CA"      # ISO 3166-1 alpha-2
language = "en_CA"  # language_COUNTRY
username = "me"     # "me" is the authenticated user

[aliases]
# devices = { kitchen = "Kitchen speaker" }
# users = { steph = "spotify_username" }

[discovery]
tries = 5
retry_wait_secs = 5
timeout_secs = 30

[cast]
connect_timeout_secs = 2
launch_timeout_secs = 10

[logging]
enabled = false
debug = false
"#
);
