//! External submission bridge
//!
//! A passing vote is handed to an external script (by default the Snapshot
//! `wrapper.js` run through node) that creates the on-chain proposal.

use crate::config::BridgeConfig;
use crate::error::AppError;
use crate::governance::models::VoteMarker;
use async_trait::async_trait;
use tracing::{debug, info};

#[async_trait]
pub trait SubmissionBridge: Send + Sync {
    /// Submit a passed proposal; `Err(ExternalBridge)` on any failure
    async fn submit(&self, title: &str, abstract_text: &str, background: &str) -> Result<(), AppError>;
}

/// Runs `<program> <script> <title> <abstract> <background> Yes No Abstain`
pub struct ScriptBridge {
    program: String,
    script: String,
}

impl ScriptBridge {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            program: config.program.clone(),
            script: config.script.clone(),
        }
    }

    fn arguments(&self, title: &str, abstract_text: &str, background: &str) -> Vec<String> {
        let mut args = vec![
            self.script.clone(),
            title.to_string(),
            abstract_text.to_string(),
            background.to_string(),
        ];
        args.extend(VoteMarker::ALL.iter().map(|m| m.label().to_string()));
        args
    }
}

#[async_trait]
impl SubmissionBridge for ScriptBridge {
    async fn submit(&self, title: &str, abstract_text: &str, background: &str) -> Result<(), AppError> {
        let args = self.arguments(title, abstract_text, background);
        debug!(program = %self.program, script = %self.script, "Invoking submission bridge");

        let output = tokio::process::Command::new(&self.program)
            .args(&args)
            .output()
            .await
            .map_err(|e| AppError::ExternalBridge(format!("Failed to start {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::ExternalBridge(format!(
                "{} exited with code {}: {}",
                self.script,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        info!("Submission bridge accepted '{}'", title);
        Ok(())
    }
}
