//! Detail-field rewriting for song/album/playlist/search responses.
//!
//! These bodies can hold hundreds of embedded song objects (batch and search
//! results concatenate fragments that are not one well-formed document), so
//! the rewrite is deliberately targeted key-token substitution rather than
//! structural JSON editing. The four keys are disjoint, which makes the
//! substitutions order-insensitive and idempotent.

use regex::Regex;
use std::sync::LazyLock;

static PL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#""pl":\d+"#).expect("valid regex"));
static DL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#""dl":\d+"#).expect("valid regex"));
static ST_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#""st":-?\d+"#).expect("valid regex"));
static SUBP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""subp":\d+"#).expect("valid regex"));

/// Rewrite the restriction fields of a detail-family response body.
///
/// Every occurrence of `pl` (playback-limit bitrate) and `dl` (download-limit
/// bitrate) is raised to the effective bitrates, `st` (song status, negative
/// when disabled) is reset to enabled, and `subp` (subscription permission)
/// is set to permitted. Fields absent from the input stay absent.
pub fn rewrite_detail(body: &str, playback_bitrate: u32, download_bitrate: u32) -> String {
    let body = PL_RE.replace_all(body, format!("\"pl\":{playback_bitrate}"));
    let body = DL_RE.replace_all(&body, format!("\"dl\":{download_bitrate}"));
    let body = ST_RE.replace_all(&body, "\"st\":0");
    SUBP_RE.replace_all(&body, "\"subp\":1").into_owned()
}
