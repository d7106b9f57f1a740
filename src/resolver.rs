//! Resource-URL resolution.
//!
//! Turns an opaque song id plus a desired quality tier into a playable CDN
//! URL: fetch the song-detail document from the catalog API, walk the
//! quality-downgrade chain, then derive the URL from the tier's `dfsId` with
//! the fixed XOR/MD5/base64 obfuscation scheme the CDN expects.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{Local, Timelike};
use md5::{Digest, Md5};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::error::FilterError;
use crate::quality::Quality;

/// Catalog API serving song-detail documents.
pub const DETAIL_API_BASE: &str = "http://music.163.com";

/// Repeating key the CDN XORs dfs ids with before hashing.
const XOR_KEY: &[u8] = b"3go8&$8*3*3h0k(2)2";

/// Number of CDN mirrors to rotate across (`m1`/`m2`).
const MIRROR_COUNT: u32 = 2;

/// Timeout for the outbound detail fetch.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Upstream song-detail response.
#[derive(Debug, Deserialize)]
pub(crate) struct SongDetailDocument {
    pub(crate) songs: Vec<SongDetail>,
}

/// One song's per-tier availability.
///
/// A tier is unavailable when its key is absent, null, or present without a
/// `dfsId`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct SongDetail {
    #[serde(rename = "hMusic")]
    pub(crate) h_music: Option<TierEntry>,
    #[serde(rename = "mMusic")]
    pub(crate) m_music: Option<TierEntry>,
    #[serde(rename = "lMusic")]
    pub(crate) l_music: Option<TierEntry>,
    #[serde(rename = "bMusic")]
    pub(crate) b_music: Option<TierEntry>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TierEntry {
    #[serde(rename = "dfsId")]
    pub(crate) dfs_id: Option<u64>,
}

impl SongDetail {
    fn tier(&self, quality: Quality) -> Option<&TierEntry> {
        match quality {
            Quality::High => self.h_music.as_ref(),
            Quality::Medium => self.m_music.as_ref(),
            Quality::Low => self.l_music.as_ref(),
            Quality::Basic => self.b_music.as_ref(),
        }
    }

    fn has_tier(&self, quality: Quality) -> bool {
        self.tier(quality).is_some_and(|t| t.dfs_id.is_some())
    }
}

/// Resolves song ids to playable media URLs.
#[derive(Debug, Clone)]
pub struct ResourceResolver {
    client: Client,
    api_base: String,
    overseas: bool,
}

impl ResourceResolver {
    /// Resolver against the production catalog API.
    pub fn new(overseas: bool) -> Self {
        Self::with_api_base(DETAIL_API_BASE, overseas)
    }

    /// Resolver against an explicit catalog base URL (tests point this at a
    /// mock server).
    pub fn with_api_base(api_base: impl Into<String>, overseas: bool) -> Self {
        let client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_base: api_base.into(),
            overseas,
        }
    }

    /// Resolve `song_id` at `desired` quality, downgrading as needed.
    ///
    /// One outbound fetch per call, no caching. The fetch is performed
    /// without holding any shared lock.
    ///
    /// # Errors
    /// [`FilterError::UpstreamFetch`] if the catalog fetch fails,
    /// [`FilterError::MalformedJson`]/[`FilterError::MissingField`] for an
    /// unexpected document, and [`FilterError::NoResource`] when no tier at
    /// all carries a `dfsId`.
    pub async fn resolve(&self, song_id: &str, desired: Quality) -> Result<String, FilterError> {
        let url = format!(
            "{}/api/song/detail?id={song_id}&ids=[{song_id}]",
            self.api_base
        );
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let document: SongDetailDocument = response.json().await?;

        let song = document
            .songs
            .first()
            .ok_or(FilterError::MissingField("songs[0]"))?;

        let tier = select_tier(song, desired);
        let dfs_id = song
            .tier(tier)
            .and_then(|t| t.dfs_id)
            .ok_or_else(|| FilterError::NoResource(song_id.to_string()))?;

        Ok(generate_url(&dfs_id.to_string(), pick_mirror(), self.overseas))
    }
}

/// Walk the downgrade chain: a single pass, never upgrading.
///
/// If even the basic tier is unavailable the basic tier is still returned;
/// the caller's dfsId lookup surfaces the absence.
fn select_tier(song: &SongDetail, desired: Quality) -> Quality {
    let mut tier = desired;
    if tier == Quality::High && !song.has_tier(Quality::High) {
        debug!("no high-quality entry, downgrading to medium");
        tier = Quality::Medium;
    }
    if tier == Quality::Medium && !song.has_tier(Quality::Medium) {
        debug!("no medium-quality entry, downgrading to low");
        tier = Quality::Low;
    }
    if tier == Quality::Low && !song.has_tier(Quality::Low) {
        debug!("no low-quality entry, downgrading to basic");
        tier = Quality::Basic;
    }
    tier
}

/// Obfuscate a dfs id the way the CDN expects: XOR against the fixed key,
/// MD5, base64 with `/`→`_` and `+`→`-` (padding kept).
fn encode_dfs_id(dfs_id: &str) -> String {
    let xored: Vec<u8> = dfs_id
        .bytes()
        .enumerate()
        .map(|(i, b)| b ^ XOR_KEY[i % XOR_KEY.len()])
        .collect();

    let digest = Md5::digest(&xored);
    BASE64.encode(digest).replace('/', "_").replace('+', "-")
}

/// Compose the final media URL for a dfs id on the given mirror.
///
/// Overseas clients get the alternate `p`-prefixed CDN hosts.
pub fn generate_url(dfs_id: &str, mirror: u32, overseas: bool) -> String {
    let prefix = if overseas { 'p' } else { 'm' };
    let enc_id = encode_dfs_id(dfs_id);
    format!("http://{prefix}{mirror}.music.126.net/{enc_id}/{dfs_id}.mp3")
}

/// Rotate across mirrors by wall-clock second. Load spreading only; any
/// stable rotation would do.
fn pick_mirror() -> u32 {
    Local::now().second() % MIRROR_COUNT + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn song(h: Option<u64>, m: Option<u64>, l: Option<u64>, b: Option<u64>) -> SongDetail {
        let entry = |dfs_id: Option<u64>| dfs_id.map(|id| TierEntry { dfs_id: Some(id) });
        SongDetail {
            h_music: entry(h),
            m_music: entry(m),
            l_music: entry(l),
            b_music: entry(b),
        }
    }

    #[test]
    fn encode_matches_pinned_golden_value() {
        // Derived once from the documented XOR key + MD5 + base64url scheme.
        assert_eq!(encode_dfs_id("12345"), "SOJgz_ObU1tgyRJptBgDTA==");
        assert_eq!(encode_dfs_id("7001493961"), "a9EMIq_YLt94OkY1hds8QQ==");
    }

    #[test]
    fn generated_url_shape() {
        let url = generate_url("12345", 1, false);
        assert_eq!(url, "http://m1.music.126.net/SOJgz_ObU1tgyRJptBgDTA==/12345.mp3");
    }

    #[test]
    fn overseas_flips_host_prefix_only() {
        let domestic = generate_url("12345", 2, false);
        let overseas = generate_url("12345", 2, true);
        assert_eq!(domestic, "http://m2.music.126.net/SOJgz_ObU1tgyRJptBgDTA==/12345.mp3");
        assert_eq!(overseas, domestic.replacen("http://m", "http://p", 1));
    }

    #[test]
    fn mirror_index_stays_in_rotation() {
        let mirror = pick_mirror();
        assert!(mirror == 1 || mirror == 2);
    }

    #[test]
    fn downgrade_chain_walks_to_first_available() {
        let song = song(None, None, Some(77), Some(88));
        assert_eq!(select_tier(&song, Quality::High), Quality::Low);
    }

    #[test]
    fn desired_tier_kept_when_available() {
        let song = song(Some(1), Some(2), Some(3), Some(4));
        assert_eq!(select_tier(&song, Quality::High), Quality::High);
        assert_eq!(select_tier(&song, Quality::Medium), Quality::Medium);
    }

    #[test]
    fn never_upgrades_from_a_low_desired_tier() {
        let song = song(Some(1), Some(2), Some(3), Some(4));
        assert_eq!(select_tier(&song, Quality::Basic), Quality::Basic);
    }

    #[test]
    fn tier_without_dfs_id_counts_as_unavailable() {
        let song = SongDetail {
            h_music: None,
            m_music: Some(TierEntry { dfs_id: None }),
            l_music: Some(TierEntry { dfs_id: Some(9) }),
            b_music: None,
        };
        assert_eq!(select_tier(&song, Quality::High), Quality::Low);
    }

    #[tokio::test]
    async fn resolve_downgrades_and_builds_url() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/song/detail"))
            .and(query_param("id", "42"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"songs":[{"hMusic":null,"mMusic":null,"lMusic":{"dfsId":12345},"bMusic":{"dfsId":99}}]}"#,
            ))
            .mount(&server)
            .await;

        let resolver = ResourceResolver::with_api_base(server.uri(), false);
        let url = resolver.resolve("42", Quality::High).await.unwrap();

        // lMusic's dfsId is selected after the High→Medium→Low downgrade.
        assert!(url.ends_with("/SOJgz_ObU1tgyRJptBgDTA==/12345.mp3"));
        assert!(url.starts_with("http://m1.") || url.starts_with("http://m2."));
    }

    #[tokio::test]
    async fn resolve_fails_when_no_tier_has_a_dfs_id() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/song/detail"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"songs":[{"hMusic":null,"mMusic":null,"lMusic":null,"bMusic":null}]}"#,
            ))
            .mount(&server)
            .await;

        let resolver = ResourceResolver::with_api_base(server.uri(), false);
        let err = resolver.resolve("42", Quality::High).await.unwrap_err();
        assert!(matches!(err, FilterError::NoResource(id) if id == "42"));
    }

    #[tokio::test]
    async fn resolve_surfaces_upstream_failure() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let resolver = ResourceResolver::with_api_base(server.uri(), false);
        let err = resolver.resolve("42", Quality::High).await.unwrap_err();
        assert!(matches!(err, FilterError::UpstreamFetch(_)));
    }

    #[tokio::test]
    async fn resolve_surfaces_malformed_document() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let resolver = ResourceResolver::with_api_base(server.uri(), false);
        assert!(resolver.resolve("42", Quality::High).await.is_err());
    }
}
