//! Inference client error types.

use std::error::Error as StdError;
use std::io;

use thiserror::Error;

pub type InferenceResult<T> = Result<T, InferenceError>;

/// Failure of a single HTTP exchange.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Request timed out: {0}")]
    TimedOut(String),

    #[error("No network route: {0}")]
    NoRoute(String),

    #[error("Transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Only dropped connections, timeouts and missing routes are retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::ConnectionLost(_) | TransportError::TimedOut(_) | TransportError::NoRoute(_)
        )
    }

    /// Classify a reqwest failure.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        let message = err.to_string();

        if err.is_timeout() {
            return TransportError::TimedOut(message);
        }
        if err.is_connect() {
            // Refused connections and TLS failures reach a host that answered.
            if source_chain_is_unroutable(err) {
                return TransportError::NoRoute(message);
            }
            return TransportError::Other(message);
        }
        if err.is_request() || err.is_body() || err.is_decode() {
            if source_chain_is_dropped_connection(err) {
                return TransportError::ConnectionLost(message);
            }
        }

        TransportError::Other(message)
    }
}

fn source_chain_is_unroutable(err: &(dyn StdError + 'static)) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(current) = source {
        if let Some(io_err) = current.downcast_ref::<io::Error>() {
            if matches!(
                io_err.kind(),
                io::ErrorKind::NetworkUnreachable
                    | io::ErrorKind::HostUnreachable
                    | io::ErrorKind::NetworkDown
            ) {
                return true;
            }
        }

        let text = current.to_string().to_lowercase();
        if text.contains("dns error") || text.contains("failed to lookup address") {
            return true;
        }

        source = current.source();
    }
    false
}

fn source_chain_is_dropped_connection(err: &(dyn StdError + 'static)) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(current) = source {
        if let Some(io_err) = current.downcast_ref::<io::Error>() {
            if matches!(
                io_err.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::NotConnected
            ) {
                return true;
            }
            if io_err.kind() == io::ErrorKind::TimedOut {
                return true;
            }
        }

        // hyper reports an early close without an io::Error underneath
        let text = current.to_string().to_lowercase();
        if text.contains("connection closed") || text.contains("incomplete message") {
            return true;
        }

        source = current.source();
    }
    false
}

/// Whether retrying the identical request may help.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Terminal,
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Failed to encode upload body: {0}")]
    EncodingIo(#[source] io::Error),

    #[error("{0}")]
    Transport(#[from] TransportError),

    #[error("Analysis service returned HTTP {status}: {body}")]
    BadStatus { status: u16, body: String },

    #[error("Malformed analysis response: {0}")]
    MalformedResponse(String),

    #[error("Analysis service reported failure: {0}")]
    ServiceRejected(String),

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<InferenceError>,
    },

    #[error("Upload cancelled")]
    Cancelled,

    #[error("Invalid inference client configuration: {0}")]
    Config(String),
}

impl InferenceError {
    pub fn encoding(err: io::Error) -> Self {
        Self::EncodingIo(err)
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            InferenceError::Transport(t) if t.is_transient() => ErrorClass::Transient,
            _ => ErrorClass::Terminal,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// The underlying cause, looking through an exhausted retry wrapper.
    pub fn root(&self) -> &InferenceError {
        match self {
            InferenceError::RetriesExhausted { last, .. } => last.root(),
            other => other,
        }
    }

    /// Short message suitable for showing to a user.
    pub fn user_message(&self) -> String {
        match self.root() {
            InferenceError::EncodingIo(_) => "Could not read the video for upload.".to_string(),
            InferenceError::Transport(TransportError::TimedOut(_)) => {
                "The analysis took too long to respond. Please try again.".to_string()
            }
            InferenceError::Transport(TransportError::NoRoute(_)) => {
                "No internet connection. Please try again when you are online.".to_string()
            }
            InferenceError::Transport(_) => {
                "The connection to the analysis service was interrupted.".to_string()
            }
            InferenceError::BadStatus { status, .. } => {
                format!("The analysis service returned an error (HTTP {}).", status)
            }
            InferenceError::MalformedResponse(_) => {
                "The analysis service sent an unexpected response.".to_string()
            }
            InferenceError::ServiceRejected(reason) => {
                format!("The analysis failed: {}", reason)
            }
            InferenceError::Cancelled => "The upload was cancelled.".to_string(),
            InferenceError::Config(_) => "The analysis service is not configured.".to_string(),
            InferenceError::RetriesExhausted { attempts, .. } => {
                format!("The analysis failed after {} attempts.", attempts)
            }
        }
    }
}
