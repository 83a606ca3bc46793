// Configuration loaded with the 'config' crate and 'dotenv'
// Precedence: defaults < config.toml < APP_* environment variables

use anyhow::Result;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::histogram::DEFAULT_BUCKETS;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server_address: String,
    pub data_dir: String,   // Holds gravel_bikes.json, statistics.json, enriched_bikes.json
    pub static_dir: String, // Served under /static
    pub ollama_url: String,
    pub ollama_model: String,
    pub histogram_buckets: usize,
    pub backend_url: String, // Where BackendClient finds the API (used by consumers of the lib)
}

impl Settings {
    pub fn new() -> Result<Self> {
        dotenv::dotenv().ok(); // Load .env file if present

        let builder = Self::defaults()?
            // Load from a configuration file (e.g., config.toml)
            .add_source(File::with_name("config").required(false))
            // Load from environment variables (e.g., APP_DATA_DIR)
            .add_source(Environment::with_prefix("APP").try_parsing(true));

        let settings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(Config::builder()
            .set_default("server_address", "127.0.0.1:8000")?
            .set_default("data_dir", "data")?
            .set_default("static_dir", "static")?
            .set_default("ollama_url", "http://localhost:11434")?
            .set_default("ollama_model", "llama3")?
            .set_default("histogram_buckets", DEFAULT_BUCKETS as i64)?
            .set_default("backend_url", "http://127.0.0.1:8000")?)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            server_address: "127.0.0.1:8000".to_string(),
            data_dir: "data".to_string(),
            static_dir: "static".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            ollama_model: "llama3".to_string(),
            histogram_buckets: DEFAULT_BUCKETS,
            backend_url: "http://127.0.0.1:8000".to_string(),
        }
    }
}
