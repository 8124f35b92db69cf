//! INI file configuration adapter.
//!
//! Keys are case-sensitive so strategy identifiers in `[weights]` and `[risk]`
//! match the trade file exactly.

use crate::domain::error::QmetricsError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

#[derive(Debug)]
pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, QmetricsError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content).map_err(|reason| QmetricsError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })
    }

    pub fn from_string(content: &str) -> Result<Self, QmetricsError> {
        Self::parse(content).map_err(|reason| QmetricsError::ConfigParse {
            file: "<string>".to_string(),
            reason,
        })
    }

    fn parse(content: &str) -> Result<Self, String> {
        let mut config = Ini::new_cs();
        config.read(content.to_string())?;
        Ok(Self { config })
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config
            .get(section, key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn keys(&self, section: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .config
            .get_map_ref()
            .get(section)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}
