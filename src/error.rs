use thiserror::Error;

/// Errors raised inside the rewriting path.
///
/// None of these abort the exchange: the dispatcher logs the failure and
/// leaves the original response body in place, so the client always receives
/// something the upstream actually sent.
#[derive(Error, Debug)]
pub enum FilterError {
    /// The outbound song-detail fetch failed (network error, timeout, or
    /// non-2xx status).
    #[error("upstream fetch failed: {0}")]
    UpstreamFetch(#[from] reqwest::Error),

    /// A response body that should be JSON could not be parsed.
    #[error("malformed JSON payload: {0}")]
    MalformedJson(#[from] serde_json::Error),

    /// A parsed payload is missing a key the rewrite needs.
    #[error("unexpected payload shape: missing {0}")]
    MissingField(&'static str),

    /// The song-detail document has no quality tier carrying a dfsId, not
    /// even the lowest one.
    #[error("no playable resource for song {0}")]
    NoResource(String),
}
