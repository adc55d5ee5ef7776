//! Transport boundary for generative-model calls
//!
//! Defines the payload types collaborators hand to the key pool, the
//! structured `ErrorClassification` every transport failure carries, and the
//! `InferenceClient`/`ClientFactory` traits the pool drives. The Gemini REST
//! client in [`gemini`] is the production implementation; tests substitute
//! scripted clients through the same traits.

pub mod classify;
pub mod gemini;

pub use classify::{classify_status, classify_transport};
pub use gemini::{DEFAULT_BASE_URL, GeminiClient, GeminiClientFactory};

use common::Secret;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Classification of a failed call, decided at the transport boundary.
///
/// The key pool maps each class to a credential transition:
/// - RateLimit: short cooldown
/// - ResourceExhausted: long cooldown
/// - Transient and Other: error count increment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClassification {
    /// Per-minute quota or HTTP 429
    RateLimit,
    /// Daily/plan quota or resource exhaustion
    ResourceExhausted,
    /// Timeouts, connection failures, 5xx
    Transient,
    /// Anything else (bad request, unreadable response, client setup failure)
    Other,
}

impl ErrorClassification {
    /// Label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorClassification::RateLimit => "rate_limit",
            ErrorClassification::ResourceExhausted => "resource_exhausted",
            ErrorClassification::Transient => "transient",
            ErrorClassification::Other => "other",
        }
    }
}

/// A failed call together with its classification.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}: {message}", .classification.label())]
pub struct CallError {
    pub classification: ErrorClassification,
    pub message: String,
}

impl CallError {
    pub fn new(classification: ErrorClassification, message: impl Into<String>) -> Self {
        Self {
            classification,
            message: message.into(),
        }
    }
}

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, CallError>;

/// One piece of request content.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    /// Binary media (image, video frame, clip) sent inline with its MIME type
    InlineData { mime_type: String, data: Vec<u8> },
}

/// Request content, passed through the pool unexamined.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    pub parts: Vec<Part>,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// A payload holding a single text prompt.
    pub fn text(prompt: impl Into<String>) -> Self {
        Self::new().with_text(prompt)
    }

    pub fn with_text(mut self, prompt: impl Into<String>) -> Self {
        self.parts.push(Part::Text(prompt.into()));
        self
    }

    pub fn with_media(mut self, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        self.parts.push(Part::InlineData {
            mime_type: mime_type.into(),
            data,
        });
        self
    }
}

/// Generation options. Serializes directly as Gemini's `generationConfig`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
}

impl GenerationOptions {
    /// True when no option is set (the request omits `generationConfig`).
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// A reusable handle bound to one API key.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn InferenceClient>`).
pub trait InferenceClient: Send + Sync {
    /// Run one generation against `model` and return the response text.
    fn generate<'a>(
        &'a self,
        model: &'a str,
        payload: &'a Payload,
        options: &'a GenerationOptions,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;
}

/// Builds the per-key handle. Called at most once per key by the pool's cache.
pub trait ClientFactory: Send + Sync {
    fn create(&self, api_key: &Secret<String>) -> Result<Arc<dyn InferenceClient>>;
}
