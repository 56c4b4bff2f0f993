use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::domain::DieselError;

pub const APP_NAME: &str = "diesel-tv";

/// Settings as written in `config.toml`. Every field is optional there.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub api_base_url: Option<String>,
    pub company_slug: Option<String>,
    pub session_file: Option<String>,
    pub page_size: Option<u32>,
    pub request_timeout_secs: Option<u64>,
    pub event_poll_time: Option<u64>,
    pub max_column_width: Option<usize>,
    pub log_file: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TVConfig {
    pub api_base_url: String,
    pub company_slug: String,
    pub session_file: PathBuf,
    pub page_size: u32,
    pub request_timeout_secs: u64,
    pub event_poll_time: u64,
    pub max_column_width: usize,
    pub log_file: PathBuf,
    pub log_level: String,
}

impl Default for TVConfig {
    fn default() -> Self {
        let base = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_NAME);
        Self {
            api_base_url: "http://localhost:3000/api/proxy".to_string(),
            company_slug: String::new(),
            session_file: base.join("session.json"),
            page_size: 20,
            request_timeout_secs: 30,
            event_poll_time: 100,
            max_column_width: 40,
            log_file: base.join("diesel-tv.log"),
            log_level: "info".to_string(),
        }
    }
}

impl TVConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_NAME).join("config.toml"))
    }

    /// Reads `path`, or the default location when `None`. A missing default
    /// file is not an error, a missing explicit one is.
    pub fn load(path: Option<&Path>) -> Result<Self, DieselError> {
        let file = match path {
            Some(p) => Some(Self::read_file(p)?),
            None => match Self::default_path() {
                Some(p) if p.is_file() => Some(Self::read_file(&p)?),
                _ => None,
            },
        };
        let mut config = Self::default();
        if let Some(file) = file {
            config.merge(file)?;
        }
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<ConfigFile, DieselError> {
        debug!("Reading config {:?}", path);
        let text = fs::read_to_string(path)
            .map_err(|e| DieselError::Config(format!("{}: {e}", path.display())))?;
        Ok(toml::from_str(&text)?)
    }

    pub fn merge(&mut self, file: ConfigFile) -> Result<(), DieselError> {
        if let Some(v) = file.api_base_url {
            self.api_base_url = v;
        }
        if let Some(v) = file.company_slug {
            self.company_slug = v;
        }
        if let Some(v) = file.session_file {
            self.session_file = expand_path(&v)?;
        }
        if let Some(v) = file.page_size {
            self.page_size = v;
        }
        if let Some(v) = file.request_timeout_secs {
            self.request_timeout_secs = v;
        }
        if let Some(v) = file.event_poll_time {
            self.event_poll_time = v;
        }
        if let Some(v) = file.max_column_width {
            self.max_column_width = v;
        }
        if let Some(v) = file.log_file {
            self.log_file = expand_path(&v)?;
        }
        if let Some(v) = file.log_level {
            self.log_level = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), DieselError> {
        if self.company_slug.trim().is_empty() {
            return Err(DieselError::Config(
                "company_slug is not set (use --empresa or config.toml)".into(),
            ));
        }
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://")
        {
            return Err(DieselError::Config(format!(
                "api_base_url must be an http(s) URL, got {:?}",
                self.api_base_url
            )));
        }
        if self.page_size == 0 {
            return Err(DieselError::Config("page_size must be positive".into()));
        }
        if self.max_column_width < 3 {
            return Err(DieselError::Config("max_column_width must be at least 3".into()));
        }
        Ok(())
    }
}

/// Expands `~` and environment variables in a configured path.
pub fn expand_path(path: &str) -> Result<PathBuf, DieselError> {
    shellexpand::full(path)
        .map(|p| PathBuf::from(p.into_owned()))
        .map_err(|e| DieselError::Config(format!("cannot expand {path:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
api_base_url = "https://diesel.example.com/api/proxy"
company_slug = "oficina-central"
page_size = 50
log_level = "debug"
"#
        )
        .unwrap();

        let config = TVConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.api_base_url, "https://diesel.example.com/api/proxy");
        assert_eq!(config.company_slug, "oficina-central");
        assert_eq!(config.page_size, 50);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.event_poll_time, TVConfig::default().event_poll_time);
        config.validate().unwrap();
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "page_sise = 10").unwrap();
        assert!(matches!(
            TVConfig::load(Some(file.path())),
            Err(DieselError::Config(_))
        ));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let result = TVConfig::load(Some(Path::new("/nonexistent/diesel-tv.toml")));
        assert!(matches!(result, Err(DieselError::Config(_))));
    }

    #[test]
    fn validation() {
        let mut config = TVConfig::default();
        assert!(config.validate().is_err());
        config.company_slug = "oficina".into();
        config.validate().unwrap();
        config.api_base_url = "localhost:3000".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn paths_are_expanded() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_path("~/session.json").unwrap(), home.join("session.json"));
        }
        assert!(expand_path("$DIESEL_TV_SURELY_UNSET_VAR/x").is_err());
    }
}
