use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Where the optional `_tag` suffix comes from.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TagSource {
    #[default]
    None,
    Model,
    Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub tag_source: TagSource,
    pub fixed_tag: Option<String>,
    pub extensions: Vec<String>,
    pub recursive_default: bool,
    pub prompt_default: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tag_source: TagSource::None,
            fixed_tag: None,
            extensions: [
                "jpg", "jpeg", "tif", "tiff", "heic", "png", "dng", "raf", "cr2", "nef", "arw",
            ]
            .iter()
            .map(|ext| ext.to_string())
            .collect(),
            recursive_default: false,
            prompt_default: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub config_path: PathBuf,
}

pub fn app_paths() -> Result<AppPaths> {
    let proj = ProjectDirs::from("org", "qren", "qren")
        .context("could not determine the OS configuration directory")?;
    let config_dir = proj.config_dir().to_path_buf();
    Ok(AppPaths {
        config_path: config_dir.join("config.toml"),
        config_dir,
    })
}

pub fn load_config() -> Result<AppConfig> {
    let paths = app_paths()?;
    load_config_from(&paths.config_path)
}

/// Missing file means defaults; a present but malformed file is an error.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read config file: {}", path.display()))?;

    let config = toml::from_str::<AppConfig>(&raw)
        .with_context(|| format!("could not parse config file: {}", path.display()))?;
    Ok(config)
}
