use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use mindflow_core::events::OutboundEvent;
use mindflow_settings::VoiceSettings;

pub const AVATAR_START_TEXT: &str = "Avatar is processing...";

/// Audio summary of the final answer.
#[derive(Clone, Debug, PartialEq)]
pub struct AvatarAudio {
    pub audio_base64: String,
    pub audio_size: u64,
    pub summary_text: String,
    pub voice: String,
}

impl From<AvatarAudio> for OutboundEvent {
    fn from(audio: AvatarAudio) -> Self {
        OutboundEvent::AvatarAudio {
            audio_base64: audio.audio_base64,
            audio_size: audio.audio_size,
            summary_text: audio.summary_text,
            voice: audio.voice,
        }
    }
}

/// Summarization failures. Always recoverable: each one becomes an
/// `avatar_error` record and the turn ends normally.
#[derive(Debug, thiserror::Error)]
pub enum SummarizationError {
    #[error("voice service returned {status}")]
    Status { status: u16 },
    #[error("voice service request failed: {0}")]
    Transport(String),
    #[error("voice service timed out after {0:?}")]
    Timeout(Duration),
    #[error("voice service rejected the request: {0}")]
    Rejected(String),
    #[error("voice service returned no audio")]
    MissingAudio,
}

impl SummarizationError {
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Transport(_) => "transport",
            Self::Timeout(_) => "timeout",
            Self::Rejected(_) => "rejected",
            Self::MissingAudio => "missing_audio",
        }
    }
}

impl From<SummarizationError> for OutboundEvent {
    fn from(err: SummarizationError) -> Self {
        OutboundEvent::AvatarError {
            content: format!("Avatar service unavailable: {err}"),
        }
    }
}

/// Produces a spoken summary of the final assistant text.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str, voice: &str) -> Result<AvatarAudio, SummarizationError>;

    /// Voice used when the request names none.
    fn default_voice(&self) -> &str;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SummaryRequest<'a> {
    agent_content: &'a str,
    voice: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SummaryReply {
    success: bool,
    audio_base64: Option<String>,
    audio_size: Option<u64>,
    summary_text: Option<String>,
    error: Option<String>,
}

/// Client for the voice-summarization service.
pub struct VoiceClient {
    client: Client,
    endpoint: String,
    timeout: Duration,
    default_voice: String,
}

impl VoiceClient {
    pub fn new(settings: &VoiceSettings) -> Result<Self, SummarizationError> {
        let client = Client::builder()
            .build()
            .map_err(|e| SummarizationError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/llm-tts-stream", settings.base_url.trim_end_matches('/')),
            timeout: Duration::from_secs(settings.timeout_secs),
            default_voice: settings.default_voice.clone(),
        })
    }
}

#[async_trait]
impl Summarizer for VoiceClient {
    #[instrument(skip(self, text), fields(chars = text.chars().count()))]
    async fn summarize(&self, text: &str, voice: &str) -> Result<AvatarAudio, SummarizationError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&SummaryRequest {
                agent_content: text,
                voice,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SummarizationError::Timeout(self.timeout)
                } else {
                    SummarizationError::Transport(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SummarizationError::Status {
                status: status.as_u16(),
            });
        }

        let reply: SummaryReply = resp.json().await.map_err(|e| {
            if e.is_timeout() {
                SummarizationError::Timeout(self.timeout)
            } else {
                SummarizationError::Transport(e.to_string())
            }
        })?;
        if !reply.success {
            return Err(SummarizationError::Rejected(
                reply.error.unwrap_or_else(|| "success=false".into()),
            ));
        }
        let audio_base64 = reply
            .audio_base64
            .filter(|a| !a.is_empty())
            .ok_or(SummarizationError::MissingAudio)?;
        debug!(bytes = reply.audio_size, "summary audio received");

        Ok(AvatarAudio {
            audio_size: reply.audio_size.unwrap_or(0),
            audio_base64,
            summary_text: reply.summary_text.unwrap_or_default(),
            voice: voice.to_string(),
        })
    }

    fn default_voice(&self) -> &str {
        &self.default_voice
    }
}
