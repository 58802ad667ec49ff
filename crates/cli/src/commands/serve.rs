//! Serve command handler.

use anyhow::Context;
use clap::Args;
use docent_core::config::AppConfig;
use docent_rag::Pipeline;

use crate::server::{router, serve, AppState};
use crate::wiring::build_services;

/// Run the HTTP API
#[derive(Args, Debug)]
pub struct ServeCommand {
    /// Address to bind (host:port), overrides server.bind
    #[arg(long, env = "DOCENT_BIND")]
    pub bind: Option<String>,
}

impl ServeCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        let services = build_services(config)
            .await
            .context("Failed to build pipeline services")?;

        let state = AppState::new(
            Pipeline::new(services),
            config.server.request_deadline(),
        );
        let bind = self.bind.as_deref().unwrap_or(&config.server.bind);

        serve(router(state), bind)
            .await
            .with_context(|| format!("Server on {} failed", bind))
    }
}
