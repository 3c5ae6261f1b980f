use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::FormRejection, State},
    http::StatusCode,
    routing::post,
    Form, Json, Router,
};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::amesh::{self, AmeshClient};
use crate::config::Config;
use crate::error::FetchError;
use crate::platform::slack::SlackClient;
use crate::platform::{ImageUploader, SlashCommand};

const ACK_TEXT: &str = "オープンソース！";

/// Shared application state
pub struct AppState {
    amesh: AmeshClient,
    uploader: Box<dyn ImageUploader>,
    timezone: Tz,
}

impl AppState {
    pub fn new(config: &Config) -> Result<Self> {
        let uploader = SlackClient::new(
            config.slack.bot_token.clone(),
            config.slack.api_base_url.clone(),
        );
        Self::with_uploader(config, Box::new(uploader))
    }

    pub fn with_uploader(config: &Config, uploader: Box<dyn ImageUploader>) -> Result<Self> {
        Ok(Self {
            amesh: AmeshClient::new(config.amesh.clone())?,
            uploader,
            timezone: config.amesh.timezone()?,
        })
    }
}

/// Where in the pipeline a command failed
#[derive(Debug)]
enum PipelineError {
    Fetch(FetchError),
    Encode(anyhow::Error),
    Upload(anyhow::Error),
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/amesh", post(amesh_command))
        .route("/ack", post(acknowledge))
        .with_state(state)
}

/// Serve the webhook endpoints until Ctrl-C
pub async fn run(state: Arc<AppState>, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down...");
        })
        .await
        .context("Server error")?;

    Ok(())
}

/// `/amesh`: render the current radar image and post it to the channel.
///
/// The caller only ever gets an empty 200 once the payload parses; failures
/// are reported through the log.
async fn amesh_command(
    State(state): State<Arc<AppState>>,
    form: Result<Form<SlashCommand>, FormRejection>,
) -> StatusCode {
    let Form(cmd) = match form {
        Ok(form) => form,
        Err(e) => {
            warn!("Rejected slash command payload: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };

    info!(
        "{} from {} ({}) in #{} ({})",
        cmd.command, cmd.user_name, cmd.user_id, cmd.channel_name, cmd.channel_id
    );

    let now = Utc::now().with_timezone(&state.timezone);
    if let Err(e) = process_command(&state, &cmd.channel_id, &now).await {
        log_failure(&e);
    }

    StatusCode::OK
}

async fn process_command(
    state: &AppState,
    channel: &str,
    now: &DateTime<Tz>,
) -> Result<(), PipelineError> {
    let image = state
        .amesh
        .fetch_composite(now)
        .await
        .map_err(PipelineError::Fetch)?;

    let png = amesh::encode_png(&image).map_err(PipelineError::Encode)?;

    state
        .uploader
        .upload(png, channel)
        .await
        .map_err(PipelineError::Upload)?;

    Ok(())
}

fn log_failure(err: &PipelineError) {
    match err {
        PipelineError::Fetch(e) if e.is_not_found() => {
            warn!("Fetch stage: no radar frame published yet ({} layer): {}", e.layer(), e);
        }
        PipelineError::Fetch(e) => error!("Fetch stage failed ({} layer): {}", e.layer(), e),
        PipelineError::Encode(e) => error!("Encode stage failed: {:#}", e),
        PipelineError::Upload(e) => error!("Upload stage failed: {:#}", e),
    }
}

#[derive(Debug, Serialize)]
struct AckResponse {
    response_type: &'static str,
    text: &'static str,
}

/// `/ack`: fixed in-channel reply, whatever was posted.
async fn acknowledge() -> Json<AckResponse> {
    Json(AckResponse {
        response_type: "in_channel",
        text: ACK_TEXT,
    })
}
