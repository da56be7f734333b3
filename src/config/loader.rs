// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{Config, RawConfig};
use crate::errors::Result;

/// Load a configuration file and return the raw, unvalidated struct.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfig> {
    let contents = fs::read_to_string(path.as_ref())?;
    let raw: RawConfig = toml::from_str(&contents)?;
    Ok(raw)
}

/// Load a configuration file and run validation.
///
/// This is the entry point the rest of the crate uses: TOML parsing,
/// serde defaults, then the `TryFrom` checks (grouping policy exclusivity,
/// non-empty default target).
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Config> {
    let raw = load_from_path(&path)?;
    Config::try_from(raw)
}

/// Default config path: `Dagforge.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Dagforge.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_a_minimal_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[targets]\ndefault = \"prod\"\n").unwrap();

        let config = load_and_validate(file.path()).unwrap();
        assert_eq!(config.targets.default, "prod");
        assert_eq!(config.retries.wait, 30);
        assert_eq!(config.compile.max_active_runs, 50);
        assert!(!config.catalog.enabled);
    }

    #[test]
    fn missing_targets_section_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[compile]\nmax_active_runs = 10\n").unwrap();
        assert!(load_and_validate(file.path()).is_err());
    }
}
