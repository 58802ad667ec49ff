//! Ask command handler.
//!
//! Answers one question through the full pipeline and prints the response
//! as JSON on stdout.

use anyhow::Context;
use clap::Args;
use docent_core::{cancel_pair, config::AppConfig, deadline_from_secs};
use docent_rag::{ChatRequest, Pipeline};

use crate::wiring::build_services;

/// Answer a question from the corpus
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: String,

    /// Append to an existing session instead of starting a new one
    #[arg(short, long)]
    pub session: Option<String>,

    /// Abort after this many seconds, 0 for no limit (default: server.requestTimeoutSecs)
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Pretty-print the JSON response
    #[arg(long)]
    pub pretty: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        tracing::info!("Executing ask command");

        let pipeline = Pipeline::new(
            build_services(config)
                .await
                .context("Failed to build pipeline services")?,
        );

        let mut request = ChatRequest::new(self.question.clone());
        if let Some(session) = &self.session {
            request = request.with_session(session.clone());
        }

        let deadline = self
            .timeout_secs
            .map_or_else(|| config.server.request_deadline(), deadline_from_secs);
        let (_handle, signal) = cancel_pair(deadline);

        let response = pipeline.answer(request, &signal).await.map_err(|e| {
            tracing::error!(error = %e, "Pipeline failed");
            anyhow::anyhow!(e.public_message())
        })?;

        let output = if self.pretty {
            serde_json::to_string_pretty(&response)?
        } else {
            serde_json::to_string(&response)?
        };
        println!("{}", output);

        Ok(())
    }
}
