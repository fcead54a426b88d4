use std::io::{self, Read};
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::catalog::VoiceSettings;
use crate::config::Settings;

const CHUNK_SIZE: usize = 16 * 1024;
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Everything the remote service needs for one synthesis call.
#[derive(Debug, Clone, Serialize)]
pub struct SynthesisRequest<'a> {
    pub text: &'a str,
    #[serde(skip)]
    pub voice_id: &'a str,
    pub model_id: &'a str,
    pub voice_settings: VoiceSettings,
}

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("request to {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("synthesis service returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("failed reading audio stream")]
    Stream(#[source] io::Error),
}

/// Finite audio byte chunks, consumed exactly once.
pub type AudioStream = Box<dyn Iterator<Item = Result<Vec<u8>, SynthesisError>>>;

pub trait SpeechSynthesizer {
    fn name(&self) -> &str;
    fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<AudioStream, SynthesisError>;
}

pub struct ElevenLabsClient {
    client: Client,
    api_key: String,
    base_url: String,
    output_format: String,
}

impl ElevenLabsClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self {
            client: build_http_client(settings.timeout)?,
            api_key: settings.api_key.clone(),
            base_url: settings.base_url.clone(),
            output_format: settings.output_format.clone(),
        })
    }

    fn endpoint(&self, voice_id: &str) -> String {
        format!("{}/v1/text-to-speech/{voice_id}", self.base_url)
    }
}

impl SpeechSynthesizer for ElevenLabsClient {
    fn name(&self) -> &str {
        "elevenlabs"
    }

    fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<AudioStream, SynthesisError> {
        let url = self.endpoint(request.voice_id);
        tracing::debug!(%url, model_id = request.model_id, "sending synthesis request");

        let response = self
            .client
            .post(&url)
            .query(&[("output_format", self.output_format.as_str())])
            .header("xi-api-key", &self.api_key)
            .header(ACCEPT, "audio/mpeg")
            .header(CONTENT_TYPE, "application/json")
            .json(request)
            .send()
            .map_err(|source| SynthesisError::Request {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(SynthesisError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        Ok(Box::new(ResponseChunks::new(response)))
    }
}

fn build_http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(concat!("scenario-tts/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10))
        .timeout(timeout)
        .build()
        .context("failed building HTTP client")
}

/// Pulls fixed-size chunks out of a reader until EOF or the first error.
pub struct ResponseChunks<R> {
    reader: R,
    done: bool,
}

impl<R: Read> ResponseChunks<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            done: false,
        }
    }
}

impl<R: Read> Iterator for ResponseChunks<R> {
    type Item = Result<Vec<u8>, SynthesisError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            match self.reader.read(&mut buf) {
                Ok(0) => {
                    self.done = true;
                    return None;
                }
                Ok(n) => {
                    buf.truncate(n);
                    return Some(Ok(buf));
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.done = true;
                    return Some(Err(SynthesisError::Stream(err)));
                }
            }
        }
    }
}

/// Pulls a readable message out of an error response body.
///
/// The service answers with `{"detail": {"status": .., "message": ..}}` or
/// `{"detail": ".."}`; anything else is returned raw, truncated.
fn error_message(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        let detail = &json["detail"];
        if let Some(message) = detail["message"].as_str() {
            return match detail["status"].as_str() {
                Some(status) => format!("{status}: {message}"),
                None => message.to_string(),
            };
        }
        if let Some(message) = detail.as_str() {
            return message.to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    let mut message: String = trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect();
    if trimmed.chars().count() > MAX_ERROR_BODY_CHARS {
        message.push_str("...");
    }
    message
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PRESETS;
    use std::io::Cursor;

    #[test]
    fn request_body_carries_settings_and_speed_but_not_voice_id() {
        let preset = &PRESETS[1];
        let request = SynthesisRequest {
            text: "hello",
            voice_id: preset.voice_id,
            model_id: preset.model_id,
            voice_settings: preset.settings,
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["text"], "hello");
        assert_eq!(body["model_id"], "eleven_multilingual_v2");
        assert_eq!(body["voice_settings"]["stability"], 0.75);
        assert_eq!(body["voice_settings"]["use_speaker_boost"], true);
        assert_eq!(body["voice_settings"]["speed"], 0.85);
        assert!(body.get("voice_id").is_none());
    }

    #[test]
    fn endpoint_places_voice_id_in_path() {
        let settings = Settings::from_lookup(|key| match key {
            "ELEVENLABS_API_KEY" => Some("k".to_string()),
            "ELEVENLABS_BASE_URL" => Some("http://127.0.0.1:9/".to_string()),
            _ => None,
        })
        .unwrap();
        let client = ElevenLabsClient::new(&settings).unwrap();
        assert_eq!(
            client.endpoint("abc123"),
            "http://127.0.0.1:9/v1/text-to-speech/abc123"
        );
        assert_eq!(client.name(), "elevenlabs");
    }

    #[test]
    fn response_chunks_cover_the_whole_body() {
        let body: Vec<u8> = (0..(CHUNK_SIZE * 2 + 10)).map(|i| i as u8).collect();
        let chunks: Vec<Vec<u8>> = ResponseChunks::new(Cursor::new(body.clone()))
            .collect::<Result<_, _>>()
            .unwrap();
        assert!(chunks.len() >= 3);
        assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= CHUNK_SIZE));
        assert_eq!(chunks.concat(), body);
    }

    #[test]
    fn response_chunks_stop_after_read_error() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            }
        }
        let mut chunks = ResponseChunks::new(Broken);
        assert!(matches!(chunks.next(), Some(Err(SynthesisError::Stream(_)))));
        assert!(chunks.next().is_none());
    }

    #[test]
    fn error_message_prefers_service_detail() {
        let body = r#"{"detail":{"status":"quota_exceeded","message":"This request exceeds your quota."}}"#;
        assert_eq!(
            error_message(body),
            "quota_exceeded: This request exceeds your quota."
        );
        assert_eq!(error_message(r#"{"detail":"Not Found"}"#), "Not Found");
    }

    #[test]
    fn error_message_falls_back_to_truncated_body() {
        assert_eq!(error_message("  bad gateway \n"), "bad gateway");
        assert_eq!(error_message(""), "empty response body");
        let long = "x".repeat(MAX_ERROR_BODY_CHARS + 50);
        let message = error_message(&long);
        assert!(message.ends_with("..."));
        assert_eq!(message.chars().count(), MAX_ERROR_BODY_CHARS + 3);
    }
}
