//! JSON sequence definitions
//!
//! Reads a `SequenceConfig` from a JSON document. Missing fields fall back to
//! their defaults; the engine rejects anything structurally wrong at load time.

use crate::workflow::types::SequenceConfig;
use anyhow::{Context, Result};
use std::path::Path;

pub fn from_json_str(json: &str) -> Result<SequenceConfig> {
    serde_json::from_str(json).context("Failed to parse sequence definition")
}

/// Read and parse a sequence definition file
pub async fn from_path(path: impl AsRef<Path>) -> Result<SequenceConfig> {
    let path = path.as_ref();
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read sequence file {}", path.display()))?;
    let config = from_json_str(&json).with_context(|| format!("Invalid sequence file {}", path.display()))?;
    tracing::info!(
        "📥 Read sequence '{}' from {} ({} steps, {} transitions)",
        config.name,
        path.display(),
        config.steps.len(),
        config.transitions.len()
    );
    Ok(config)
}

pub fn to_json_string(config: &SequenceConfig) -> Result<String> {
    serde_json::to_string_pretty(config).context("Failed to serialize sequence definition")
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFINITION: &str = r#"{
        "id": "5f0b6c1e-4a49-4a3b-9d0e-0c6a2f9b1a01",
        "name": "wait then stop",
        "steps": [
            { "id": "5f0b6c1e-4a49-4a3b-9d0e-0c6a2f9b1a02", "name": "start", "step_type": "SequenceStart" },
            {
                "id": "5f0b6c1e-4a49-4a3b-9d0e-0c6a2f9b1a03",
                "name": "wait",
                "step_type": "Delay",
                "is_terminal_step": true,
                "parameters": { "delaytime": "10" }
            }
        ],
        "transitions": [
            {
                "id": "5f0b6c1e-4a49-4a3b-9d0e-0c6a2f9b1a04",
                "transition_type": "AlwaysTrue",
                "step_id": "5f0b6c1e-4a49-4a3b-9d0e-0c6a2f9b1a02",
                "next_step_id": "5f0b6c1e-4a49-4a3b-9d0e-0c6a2f9b1a03"
            }
        ]
    }"#;

    #[test]
    fn parses_nested_definition() {
        let cfg = from_json_str(DEFINITION).unwrap();
        assert_eq!(cfg.steps.len(), 2);
        assert_eq!(cfg.steps[1].parameters.get("delaytime").map(String::as_str), Some("10"));
        assert!(cfg.steps[1].is_terminal_step);
        assert_eq!(cfg.transitions[0].next_step_id, cfg.steps[1].id);
    }

    #[test]
    fn malformed_json_is_an_error() {
        let err = from_json_str("{ steps: ").unwrap_err();
        assert!(err.to_string().contains("sequence definition"));
    }

    #[tokio::test]
    async fn missing_file_names_the_path() {
        let err = from_path("/definitely/not/here.json").await.unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.json"));
    }
}
