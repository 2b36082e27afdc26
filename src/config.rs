use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{PipelineError, Result};

const CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub graph: GraphConfig,
    pub rules: RuleTargets,
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory holding the payload files
    pub dir: String,
    /// Primary terrace dataset, a single JSON array
    pub terraces_file: String,
    /// Auxiliary datasets, newline-delimited JSON
    pub inspections_file: String,
    pub countries_small_file: String,
    pub countries_big_file: String,
    /// Target path for the inspections export
    pub export_file: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: "data".to_string(),
            terraces_file: "terraces.json".to_string(),
            inspections_file: "city_inspections.jsonl".to_string(),
            countries_small_file: "countries_small.jsonl".to_string(),
            countries_big_file: "countries_big.jsonl".to_string(),
            export_file: "inspections_export.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: "neo4j://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "password".to_string(),
        }
    }
}

/// District/neighborhood/street names the rule engine targets.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuleTargets {
    pub closure_district: String,
    pub closure_neighborhood: String,
    pub inspection_street: String,
    pub zone_a_district: String,
    pub zone_b_district: String,
    pub zone_b_neighborhood: String,
}

impl Default for RuleTargets {
    fn default() -> Self {
        Self {
            closure_district: "SALAMANCA".to_string(),
            closure_neighborhood: "GUINDALERA".to_string(),
            inspection_street: "ALCALA".to_string(),
            zone_a_district: "VILLAVERDE".to_string(),
            zone_b_district: "SALAMANCA".to_string(),
            zone_b_neighborhood: "CASTELLANA".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Bounded sample used to surface sampling bias against the full count
    pub sample_size: usize,
    /// How many districts the grouped ranking reports
    pub top_districts: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            sample_size: 50,
            top_districts: 5,
        }
    }
}

impl Config {
    /// Load configuration from `config.toml`, falling back to built-in
    /// defaults when the file is absent. Graph credentials can be overridden
    /// through NEO4J_URI / NEO4J_USER / NEO4J_PASSWORD.
    pub fn load() -> Result<Self> {
        let mut config = if Path::new(CONFIG_PATH).exists() {
            let config_content = fs::read_to_string(CONFIG_PATH).map_err(|e| {
                PipelineError::Config(format!(
                    "Failed to read config file '{}': {}",
                    CONFIG_PATH, e
                ))
            })?;
            toml::from_str(&config_content)?
        } else {
            Config::default()
        };

        if let Ok(uri) = std::env::var("NEO4J_URI") {
            config.graph.uri = uri;
        }
        if let Ok(user) = std::env::var("NEO4J_USER") {
            config.graph.user = user;
        }
        if let Ok(password) = std::env::var("NEO4J_PASSWORD") {
            config.graph.password = password;
        }

        Ok(config)
    }
}
