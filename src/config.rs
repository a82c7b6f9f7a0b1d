use std::path::PathBuf;

use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;

/// Runtime settings. Sources, later ones winning: built-in defaults, an
/// optional `professor_directory.toml` in the working directory, then
/// `PROFDIR_*` environment variables (`PROFDIR_UNIVERSITIES` is comma
/// separated).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub db_path: PathBuf,
    pub output_path: PathBuf,
    pub session_path: PathBuf,
    pub webdriver_url: String,
    pub portal_url: String,
    pub universities: Vec<String>,
    pub headless: bool,
    pub bind: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/professors.sqlite"),
            output_path: PathBuf::from("data/professors.jsonl"),
            session_path: PathBuf::from("data/portal_session.json"),
            webdriver_url: "http://localhost:4444".to_string(),
            portal_url: "https://major.cshub.ir/professor-search".to_string(),
            universities: vec!["دانشگاه تهران".to_string()],
            headless: false,
            bind: "127.0.0.1:5000".to_string(),
        }
    }
}

pub fn load() -> Result<Settings> {
    let builder = Config::builder()
        .add_source(File::with_name("professor_directory").required(false))
        .add_source(
            Environment::with_prefix("PROFDIR")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("universities"),
        );
    build(builder)
}

fn build(builder: ConfigBuilder<DefaultState>) -> Result<Settings> {
    builder
        .build()
        .context("Failed to read configuration")?
        .try_deserialize()
        .context("Invalid configuration")
}
