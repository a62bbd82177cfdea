use crate::tree::NodeId;
use thiserror::Error;

/// Which executor produced an error; rendered as the message prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Post,
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verb::Get => f.write_str("get"),
            Verb::Post => f.write_str("post"),
        }
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{0} missing source")]
    MissingSource(Verb),

    #[error("{verb} missing or invalid url{}", url_suffix(.url))]
    InvalidUrl { verb: Verb, url: Option<String> },

    #[error("{verb} {url}: {cause}")]
    FetchFailure {
        verb: Verb,
        url: String,
        cause: FetchError,
    },

    #[error("{verb} {url}: {cause}")]
    InvalidPayload {
        verb: Verb,
        url: String,
        cause: String,
    },

    #[error("{verb} {url}: invalid payload shape: {cause}")]
    InvalidPayloadShape {
        verb: Verb,
        url: String,
        cause: String,
    },

    #[error("timer {0}")]
    InvalidTimer(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Format error: {0}")]
    Json(#[from] serde_json::Error),
}

fn url_suffix(url: &Option<String>) -> String {
    url.as_deref().map(|u| format!(" {u}")).unwrap_or_default()
}

/// Failure reported by a transport collaborator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("{0}")]
    Transport(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("request abandoned")]
    Abandoned,
}
