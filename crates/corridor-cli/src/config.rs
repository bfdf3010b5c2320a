//! CLI configuration from environment.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub preset_dir: PathBuf,
    pub output_dir: PathBuf,
    pub segment_budget: Duration,
    pub load_retries: u32,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            preset_dir: env::var("CORRIDOR_PRESET_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("presets")),
            output_dir: env::var("CORRIDOR_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("out")),
            segment_budget: Duration::from_secs(
                env::var("CORRIDOR_SEGMENT_BUDGET_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            load_retries: env::var("CORRIDOR_LOAD_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
        }
    }
}
