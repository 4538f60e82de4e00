//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use std::path::PathBuf;
use tracing::info;

/// Write a default config file, refusing to clobber an existing one unless
/// forced.
pub fn cmd_init(config_path: Option<PathBuf>, force: bool) -> Result<PathBuf> {
    let path = config_path.unwrap_or_else(Config::default_config_path);

    if path.exists() && !force {
        return Err(Error::AlreadyInitialized(path.display().to_string()));
    }

    let mut config = Config::default();
    config.config_file = path.clone();
    config.save()?;
    info!("Initialized config at {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_and_refuse_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let written = cmd_init(Some(path.clone()), false).unwrap();
        assert_eq!(written, path);
        assert!(path.exists());

        let err = cmd_init(Some(path.clone()), false).unwrap_err();
        assert!(matches!(err, Error::AlreadyInitialized(_)));

        // Force overwrites
        cmd_init(Some(path), true).unwrap();
    }
}
