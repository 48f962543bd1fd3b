use serde::{Deserialize, Serialize};

/// A named generation preset: which checkpoint to run and how to sample it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Style {
    pub name: String,
    pub checkpoint: String,
    pub sampler: String,
    pub steps: u32,
    pub cfg_scale: f32,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            name: "Default".to_string(),
            checkpoint: String::new(),
            sampler: "dpmpp_2m".to_string(),
            steps: 20,
            cfg_scale: 7.0,
        }
    }
}
