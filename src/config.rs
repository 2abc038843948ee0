use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Optional settings file; every field can also come from the command line.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct YamlConfig {
    pub directory: Option<PathBuf>,
    pub filter: Option<String>,
    pub interval_secs: Option<u64>,
}

pub fn load_yaml(path: &Path) -> Result<YamlConfig> {
    let file = File::open(path).with_context(|| format!("open config {}", path.display()))?;
    serde_yaml::from_reader(file).with_context(|| format!("parse config {}", path.display()))
}
