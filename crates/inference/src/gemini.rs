//! Gemini REST client
//!
//! One `GeminiClient` per API key, all sharing the factory's `reqwest::Client`
//! so connections and TLS sessions are reused across keys. Each client sends
//! its key as a sensitive per-request header.

use crate::classify::{classify_status, classify_transport};
use crate::{
    CallError, ClientFactory, ErrorClassification, GenerationOptions, InferenceClient, Part,
    Payload, Result,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use common::Secret;
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Public Generative Language API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Header carrying the API key.
const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<&'a GenerationOptions>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<WirePart<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum WirePart<'a> {
    Text {
        text: &'a str,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineBlob<'a>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineBlob<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Build the `generateContent` request body. Inline media is base64-encoded.
fn request_body<'a>(
    payload: &'a Payload,
    options: &'a GenerationOptions,
) -> GenerateContentRequest<'a> {
    let parts = payload
        .parts
        .iter()
        .map(|part| match part {
            Part::Text(text) => WirePart::Text { text },
            Part::InlineData { mime_type, data } => WirePart::Inline {
                inline_data: InlineBlob {
                    mime_type,
                    data: STANDARD.encode(data),
                },
            },
        })
        .collect();

    GenerateContentRequest {
        contents: vec![Content { role: "user", parts }],
        generation_config: (!options.is_empty()).then_some(options),
    }
}

/// Concatenate the text parts of the first candidate, if any.
fn response_text(response: GenerateContentResponse) -> Option<String> {
    let content = response.candidates.into_iter().next()?.content?;
    let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
    (!text.is_empty()).then_some(text)
}

/// Gemini client bound to a single API key.
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: HeaderValue,
    base_url: String,
}

impl GeminiClient {
    /// Bind `api_key` to a (possibly shared) HTTP client. Fails (class Other)
    /// if the key is not a valid header value.
    pub fn new(http: reqwest::Client, api_key: &Secret<String>, base_url: &str) -> Result<Self> {
        let mut api_key = HeaderValue::from_str(api_key.expose()).map_err(|e| {
            CallError::new(
                ErrorClassification::Other,
                format!("invalid API key header value: {e}"),
            )
        })?;
        api_key.set_sensitive(true);

        Ok(Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{model}:generateContent", self.base_url)
    }
}

impl InferenceClient for GeminiClient {
    fn generate<'a>(
        &'a self,
        model: &'a str,
        payload: &'a Payload,
        options: &'a GenerationOptions,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            let response = self
                .http
                .post(self.endpoint(model))
                .header(API_KEY_HEADER, self.api_key.clone())
                .json(&request_body(payload, options))
                .send()
                .await
                .map_err(|e| {
                    CallError::new(classify_transport(&e), format!("request failed: {e}"))
                })?;

            let status = response.status();
            if !status.is_success() {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| String::from("<no body>"));
                let classification = classify_status(status.as_u16(), &body);
                debug!(
                    status = status.as_u16(),
                    classification = classification.label(),
                    "gemini returned error status"
                );
                return Err(CallError::new(
                    classification,
                    format!("gemini returned {status}: {body}"),
                ));
            }

            let parsed = response
                .json::<GenerateContentResponse>()
                .await
                .map_err(|e| CallError::new(classify_transport(&e), format!("invalid response: {e}")))?;

            response_text(parsed)
                .ok_or_else(|| CallError::new(ErrorClassification::Other, "empty response"))
        })
    }
}

/// Creates one `GeminiClient` per API key over a shared connection pool.
pub struct GeminiClientFactory {
    http: reqwest::Client,
    base_url: String,
}

impl GeminiClientFactory {
    /// Build the shared HTTP client. `timeout` bounds each request.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }
}

impl ClientFactory for GeminiClientFactory {
    fn create(&self, api_key: &Secret<String>) -> Result<Arc<dyn InferenceClient>> {
        debug!(key = %api_key.fingerprint(), "creating gemini client");
        let client = GeminiClient::new(self.http.clone(), api_key, &self.base_url)?;
        Ok(Arc::new(client))
    }
}
