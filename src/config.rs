use crate::correlate::{ResolutionBounds, DEFAULT_MAX_HOPS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Contents of `actionlens.toml`. Every key is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionLensConfig {
    /// Regex patterns for files that are never correlated
    pub exclude: Vec<String>,
    /// Navigation hops the oracle may follow per resolution
    pub max_hops: usize,
    pub bounds: ResolutionBounds,
    /// Module specifier prefixes mapped to root-relative directories
    pub aliases: BTreeMap<String, String>,
}

impl Default for ActionLensConfig {
    fn default() -> Self {
        Self {
            exclude: Vec::new(),
            max_hops: DEFAULT_MAX_HOPS,
            bounds: ResolutionBounds::default(),
            aliases: BTreeMap::from([("@/".to_string(), "src/".to_string())]),
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("actionlens.toml")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<ActionLensConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: ActionLensConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &ActionLensConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}
