//! Response dispatch — the single entry point the proxy runtime calls.
//!
//! Classifies each intercepted exchange by URL pattern and content type and
//! routes it to the matching rewriter. Failures inside a rewrite are logged
//! and swallowed: the governing policy is fail open to pass-through, so the
//! client always receives a response the upstream actually produced rather
//! than an aborted connection.

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::detail::rewrite_detail;
use crate::error::FilterError;
use crate::exchange::Exchange;
use crate::quality::Negotiator;
use crate::resolver::{DETAIL_API_BASE, ResourceResolver};

/// URL fragments of the detail-family endpoints (song, album, playlist,
/// batch, search, artist) whose bodies get field-level substitution.
const DETAIL_PATHS: [&str; 7] = [
    "/eapi/v3/song/detail/",
    "/eapi/v1/album/",
    "/eapi/v3/playlist/detail",
    "/eapi/batch",
    "/eapi/cloudsearch/pc",
    "/eapi/v1/artist",
    "/eapi/search/get",
];

const PLAYER_URL_PATH: &str = "/eapi/song/enhance/player/url";
const DOWNLOAD_LIMIT_PATH: &str = "/eapi/song/download/limit";
const DOWNLOAD_URL_PATH: &str = "/eapi/song/enhance/download/url";

/// Canned download-limit body: no quota overflow, success code.
const NO_LIMIT_BODY: &str = r#"{"overflow":false,"code":200}"#;

/// Routes intercepted exchanges to the rewriters.
///
/// Constructed once at startup; the proxy runtime shares it across its
/// concurrent response callbacks.
#[derive(Debug)]
pub struct Dispatcher {
    negotiator: Negotiator,
    resolver: ResourceResolver,
}

impl Dispatcher {
    /// Dispatcher against the production catalog API.
    pub fn new(config: &Config) -> Self {
        Self::with_api_base(config, DETAIL_API_BASE)
    }

    /// Dispatcher with an explicit catalog base URL (tests point this at a
    /// mock server).
    pub fn with_api_base(config: &Config, api_base: &str) -> Self {
        Self {
            negotiator: Negotiator::new(
                config.forced_playback_bitrate,
                config.forced_download_bitrate,
            ),
            resolver: ResourceResolver::with_api_base(api_base, config.overseas),
        }
    }

    /// The shared quality state, for embedder introspection and tests.
    pub fn negotiator(&self) -> &Negotiator {
        &self.negotiator
    }

    /// Inspect one completed exchange and rewrite its body if it belongs to
    /// a restricted endpoint.
    ///
    /// Only 200 responses with a `text/plain` or `application/json` content
    /// type are considered; everything else passes through untouched.
    pub async fn handle_exchange(&self, exchange: &mut Exchange) {
        if exchange.status() != 200 {
            return;
        }
        let content_type = exchange.content_type().trim().to_ascii_lowercase();
        if !content_type.contains("text/plain") && !content_type.contains("application/json") {
            return;
        }

        let url = exchange.request_url().to_string();

        if DETAIL_PATHS.iter().any(|p| url.contains(p)) {
            info!("rewriting detail response for {url}");
            let state = self.negotiator.snapshot();
            let rewritten = rewrite_detail(
                exchange.body(),
                state.playback.bitrate,
                state.download.bitrate,
            );
            exchange.replace_body(rewritten);
        } else if url.contains(PLAYER_URL_PATH) {
            match self.rewrite_player(exchange.body()).await {
                Ok(body) => exchange.replace_body(body),
                Err(e) => warn!("player rewrite failed for {url}, passing through: {e}"),
            }
        } else if url.contains(DOWNLOAD_LIMIT_PATH) {
            info!("rewriting download-limit response");
            exchange.replace_body(NO_LIMIT_BODY.to_string());
        } else if url.contains(DOWNLOAD_URL_PATH) {
            match self.rewrite_download(exchange.body()).await {
                Ok(body) => exchange.replace_body(body),
                Err(e) => warn!("download rewrite failed for {url}, passing through: {e}"),
            }
        } else {
            debug!("no rewrite rule for {url}");
        }
    }

    /// Rewrite a player-URL response: `data` is an array, first entry wins.
    async fn rewrite_player(&self, body: &str) -> Result<String, FilterError> {
        let mut root: Value = serde_json::from_str(body)?;
        let entry = root
            .get_mut("data")
            .and_then(|d| d.get_mut(0))
            .and_then(|e| e.as_object_mut())
            .ok_or(FilterError::MissingField("data[0]"))?;

        let observed =
            scalar_string(entry.get("br")).ok_or(FilterError::MissingField("data[0].br"))?;
        let song_id =
            scalar_string(entry.get("id")).ok_or(FilterError::MissingField("data[0].id"))?;

        let effective = self.negotiator.negotiate_playback(&observed);
        let media_url = self.resolver.resolve(&song_id, effective.quality).await?;
        info!(
            "rewrote player URL for song {song_id} at {} bps",
            effective.bitrate
        );

        entry.insert("url".into(), Value::String(media_url));
        entry.insert("br".into(), Value::from(effective.bitrate));
        entry.insert("code".into(), Value::String("200".into()));

        Ok(serde_json::to_string(&root)?)
    }

    /// Rewrite a download-URL response: same shape as the player rewrite but
    /// `data` is a single object and the download side of the negotiator.
    async fn rewrite_download(&self, body: &str) -> Result<String, FilterError> {
        let mut root: Value = serde_json::from_str(body)?;
        let entry = root
            .get_mut("data")
            .and_then(|d| d.as_object_mut())
            .ok_or(FilterError::MissingField("data"))?;

        let observed =
            scalar_string(entry.get("br")).ok_or(FilterError::MissingField("data.br"))?;
        let song_id =
            scalar_string(entry.get("id")).ok_or(FilterError::MissingField("data.id"))?;

        let effective = self.negotiator.negotiate_download(&observed);
        let media_url = self.resolver.resolve(&song_id, effective.quality).await?;
        info!(
            "rewrote download URL for song {song_id} at {} bps",
            effective.bitrate
        );

        entry.insert("url".into(), Value::String(media_url));
        entry.insert("br".into(), Value::from(effective.bitrate));
        entry.insert("code".into(), Value::String("200".into()));

        Ok(serde_json::to_string(&root)?)
    }
}

/// Render a JSON scalar the way the upstream mixes them: numbers and strings
/// are both accepted wherever an id or bitrate appears.
fn scalar_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
