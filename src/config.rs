use std::path::PathBuf;

use anyhow::Context;

use crate::advisor::{DEFAULT_API_BASE, DEFAULT_MODEL};

const DEFAULT_SIMULATION_STORE: &str = "simulated_grades.json";

/// Runtime settings read from the environment (and `.env`, if present).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub hf_token: Option<String>,
    pub hf_model: String,
    pub hf_api_base: String,
    pub simulation_store: PathBuf,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let database_url = non_empty("DATABASE_URL")
            .context("DATABASE_URL must be set to a production Postgres instance")?;

        Ok(Self {
            database_url,
            hf_token: non_empty("HF_TOKEN"),
            hf_model: non_empty("HF_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            hf_api_base: non_empty("HF_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            simulation_store: non_empty("SIMULATION_STORE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SIMULATION_STORE)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn database_url_is_required() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(Config::from_lookup(lookup(&[("DATABASE_URL", "  ")])).is_err());
    }

    #[test]
    fn defaults_fill_optional_settings() {
        let config =
            Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/grades")])).unwrap();

        assert_eq!(config.hf_token, None);
        assert_eq!(config.hf_model, DEFAULT_MODEL);
        assert_eq!(config.hf_api_base, DEFAULT_API_BASE);
        assert_eq!(config.simulation_store, PathBuf::from("simulated_grades.json"));
    }

    #[test]
    fn blank_token_counts_as_missing() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/grades"),
            ("HF_TOKEN", ""),
            ("SIMULATION_STORE", "/tmp/sim.json"),
        ]))
        .unwrap();

        assert_eq!(config.hf_token, None);
        assert_eq!(config.simulation_store, PathBuf::from("/tmp/sim.json"));
    }
}
