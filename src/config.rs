use std::env;

use anyhow::Context;

use crate::solver::{ResponseConfig, DEFAULT_TIMEOUT_SECONDS};

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: Option<String>,
    pub solver_url: Option<String>,
    pub callback_url: Option<String>,
    pub solver_timeout_seconds: u64,
}

impl Settings {
    /// Read settings from the environment (and `.env`, loaded by `main`).
    pub fn from_env() -> anyhow::Result<Self> {
        let solver_timeout_seconds = match env::var("SOLVER_TIMEOUT_SECONDS") {
            Ok(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|seconds| *seconds > 0)
                .with_context(|| format!("SOLVER_TIMEOUT_SECONDS must be a positive integer, got {raw:?}"))?,
            Err(_) => DEFAULT_TIMEOUT_SECONDS,
        };

        Ok(Self {
            database_url: non_empty_var("DATABASE_URL"),
            solver_url: non_empty_var("SOLVER_URL"),
            callback_url: non_empty_var("SOLVER_CALLBACK_URL"),
            solver_timeout_seconds,
        })
    }

    pub fn database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set to a production Postgres instance")
    }

    pub fn solver_url(&self) -> anyhow::Result<&str> {
        self.solver_url
            .as_deref()
            .context("SOLVER_URL must point at the scheduling solver endpoint")
    }

    pub fn response_config(&self) -> ResponseConfig {
        ResponseConfig {
            callback_url: self.callback_url.clone(),
            timeout_seconds: self.solver_timeout_seconds,
            ..ResponseConfig::default()
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_config_carries_callback_and_timeout() {
        let settings = Settings {
            database_url: None,
            solver_url: Some("http://solver.internal/plannings".to_string()),
            callback_url: Some("https://academie.example/api/plannings/callback".to_string()),
            solver_timeout_seconds: 90,
        };

        let config = settings.response_config();
        assert_eq!(config.timeout_seconds, 90);
        assert_eq!(config.expected_response, "planning_proposal");
        assert_eq!(
            config.callback_url.as_deref(),
            Some("https://academie.example/api/plannings/callback")
        );
        assert!(settings.database_url().is_err());
        assert!(settings.solver_url().is_ok());
    }
}
