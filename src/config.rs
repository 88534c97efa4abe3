//! Configuration loading
//!
//! Settings come from `<config_dir>/chatpane/config.toml`. Every key is
//! optional; missing keys take the defaults below. Two environment
//! variables override the backend: `CHATPANE_BASE_URL` and `CHATPANE_MODEL`.
//!
//! ```toml
//! [backend]
//! base_url = "http://localhost:8080/v1"
//! model = "gpt-4o-mini"
//!
//! [upload]
//! dir = "uploads"
//! listen = "127.0.0.1:3000"
//!
//! [ui]
//! title = "Chat with Jamie"
//! theme = "dark"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{ChatError, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Color scheme of the TUI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    Dark,
    Light,
}

impl ThemeMode {
    pub fn toggled(self) -> Self {
        match self {
            ThemeMode::Dark => ThemeMode::Light,
            ThemeMode::Light => ThemeMode::Dark,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThemeMode::Dark => "dark",
            ThemeMode::Light => "light",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the bearer token
    pub api_key_env: String,
    pub connect_timeout_secs: u64,
    /// Longest silence tolerated between two stream events
    pub inactivity_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            connect_timeout_secs: 15,
            inactivity_timeout_secs: 60,
        }
    }
}

impl BackendConfig {
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Where the server stores uploaded files
    pub dir: PathBuf,
    /// Address the upload server binds to
    pub listen: String,
    /// URL the TUI posts `/upload` files to
    pub endpoint: String,
    pub max_upload_bytes: usize,
    pub request_timeout_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("public/uploads"),
            listen: "127.0.0.1:3000".to_string(),
            endpoint: "http://127.0.0.1:3000/api/upload".to_string(),
            max_upload_bytes: 25 * 1024 * 1024,
            request_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub title: String,
    /// Shown next to the spinner while no phase has been announced
    pub loading_message: String,
    pub clear_button_text: String,
    pub footer_message: String,
    pub empty_citation_message: String,
    pub theme: ThemeMode,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            title: "Chat with Jamie".to_string(),
            loading_message: "Jamie is looking at the numbers".to_string(),
            clear_button_text: "Clear the Chat".to_string(),
            footer_message: "Customized AI by Elia Movahed @ UNC".to_string(),
            empty_citation_message: "Unspecified source".to_string(),
            theme: ThemeMode::Dark,
        }
    }
}

/// Configuration for Chatpane
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub backend: BackendConfig,
    pub upload: UploadConfig,
    pub ui: UiConfig,
    /// File this configuration was read from (or would be written to)
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl ChatConfig {
    /// Default location: `<config_dir>/chatpane/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("chatpane").join("config.toml"))
    }

    /// Load from `path`, or from the default location when `None`.
    ///
    /// A missing file yields the defaults. A file that exists but does not
    /// parse is an error.
    ///
    /// ```
    /// # tokio_test::block_on(async {
    /// let path = std::path::Path::new("/nonexistent/chatpane/config.toml");
    /// let config = chatpane::ChatConfig::load(Some(path)).await?;
    /// assert_eq!(config.ui.empty_citation_message, "Unspecified source");
    /// # Ok::<(), chatpane::ChatError>(())
    /// # }).unwrap();
    /// ```
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path(),
        };

        let mut config = match &path {
            Some(path) if path.exists() => {
                let content = tokio::fs::read_to_string(path).await?;
                let config = Self::from_toml(&content)?;
                info!("Loaded config from {}", path.display());
                config
            }
            Some(path) => {
                debug!("No config at {}, using defaults", path.display());
                Self::default()
            }
            None => {
                warn!("Could not determine config directory, using defaults");
                Self::default()
            }
        };

        config.source = path;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: ChatConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("CHATPANE_BASE_URL") {
            if !url.trim().is_empty() {
                self.backend.base_url = url;
            }
        }
        if let Ok(model) = std::env::var("CHATPANE_MODEL") {
            if !model.trim().is_empty() {
                self.backend.model = model;
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.backend.base_url.trim().is_empty() {
            return Err(ChatError::Config("backend.base_url must not be empty".into()));
        }
        if self.upload.max_upload_bytes == 0 {
            return Err(ChatError::Config("upload.max_upload_bytes must be positive".into()));
        }
        Ok(())
    }

    pub fn with_upload_dir(mut self, dir: PathBuf) -> Self {
        self.upload.dir = dir;
        self
    }

    pub fn with_listen(mut self, listen: String) -> Self {
        self.upload.listen = listen;
        self
    }
}

/// Write the theme preference back into the config file, keeping the rest
/// of the file (comments, ordering) as it was.
pub fn write_theme_preference(path: &Path, theme: ThemeMode) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let existing = if path.exists() {
        std::fs::read_to_string(path)?
    } else {
        String::new()
    };

    let mut doc: toml_edit::DocumentMut = existing.parse()?;
    if !doc.contains_key("ui") || doc.get("ui").and_then(|i| i.as_table()).is_none() {
        doc.insert("ui", toml_edit::table());
    }
    let ui = doc["ui"]
        .as_table_mut()
        .ok_or_else(|| anyhow::anyhow!("ui table missing after initialization"))?;
    ui.set_implicit(false);
    ui["theme"] = toml_edit::value(theme.as_str());

    std::fs::write(path, doc.to_string())?;
    debug!("Saved theme preference {} to {}", theme.as_str(), path.display());
    Ok(())
}
