use std::{sync::Arc, time::Duration};

use axum::Router;
use signoff_core::config::AppConfig;
use signoff_slack::{
    api::{SlackApi, SlackApiError, WebApiClient},
    signature::SignatureVerifier,
};
use thiserror::Error;
use tracing::info;

use crate::routes::{self, AppState};

pub struct Application {
    pub config: AppConfig,
    pub router: Router,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("slack client could not be initialized: {0}")]
    SlackClient(#[source] SlackApiError),
}

pub fn bootstrap(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let api: Arc<dyn SlackApi> = Arc::new(
        WebApiClient::new(
            config.slack.bot_token.clone(),
            config.slack.api_base_url.clone(),
            Duration::from_secs(config.slack.timeout_secs),
        )
        .map_err(BootstrapError::SlackClient)?,
    );
    let verifier = SignatureVerifier::new(
        config.slack.signing_secret.clone(),
        config.slack.signature_max_age_secs,
    );

    let router = routes::router(AppState::new(api, verifier));
    info!(
        event_name = "system.bootstrap.router_ready",
        correlation_id = "bootstrap",
        api_base_url = %config.slack.api_base_url,
        "slack routes mounted under /slack"
    );

    Ok(Application { config, router })
}
