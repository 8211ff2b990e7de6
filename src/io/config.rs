//! Run configuration JSON.
//!
//! The file mirrors the SFH module section of the host configuration; see
//! `domain::SfhConfig` for the fields and their defaults.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::domain::SfhConfig;
use crate::error::AppError;

/// Read and validate a configuration file.
pub fn load_config(path: &Path) -> Result<SfhConfig, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::config(format!("Failed to open config '{}': {e}", path.display())))?;
    let config: SfhConfig = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::config(format!("Invalid config JSON '{}': {e}", path.display())))?;
    config.validate()?;
    Ok(config)
}
