use std::path::PathBuf;

use anyhow::Context;

const DEFAULT_CATALOG: &str = "content/courses.json";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub catalog_path: PathBuf,
    pub max_connections: u32,
}

impl Config {
    /// Reads `.env` if present, then the process environment.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let max_connections = match lookup("PROGRESSION_DB_MAX_CONNECTIONS") {
            Some(value) => value
                .parse()
                .with_context(|| format!("PROGRESSION_DB_MAX_CONNECTIONS is not a number: {value}"))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            catalog_path: lookup("PROGRESSION_CATALOG")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CATALOG)),
            max_connections,
        })
    }

    pub fn database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set to reach the account store")
    }
}
