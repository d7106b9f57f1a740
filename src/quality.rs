//! Bitrate/quality negotiation state.
//!
//! The streaming API reports a (possibly capped) bitrate on every player and
//! download response. The [`Negotiator`] tracks those observations per side,
//! applies configured overrides, and hands back the effective bitrate and
//! tier the rewriters should advertise. It is the only shared mutable state
//! in the crate; concurrent response callbacks go through one mutex so a
//! stored bitrate can never disagree with its stored tier.

use std::sync::Mutex;
use tracing::{debug, info};

/// The closed set of bitrates the streaming service serves.
pub const VALID_BITRATES: [u32; 4] = [96_000, 128_000, 192_000, 320_000];

/// Bitrate the negotiator falls back to when the server reports the `"0"`
/// sentinel and no override is configured. Fail open to maximum quality
/// rather than degrade.
const FAIL_OPEN_BITRATE: u32 = 320_000;

/// Audio quality tier, ordered lowest to highest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Quality {
    Basic,
    Low,
    Medium,
    High,
}

impl Quality {
    /// Key under which the upstream song-detail document exposes this tier.
    pub fn tier_key(self) -> &'static str {
        match self {
            Quality::Basic => "bMusic",
            Quality::Low => "lMusic",
            Quality::Medium => "mMusic",
            Quality::High => "hMusic",
        }
    }

    /// Canonical bitrate→tier mapping; unrecognized bitrates map to the
    /// highest tier.
    pub fn from_bitrate(bitrate: u32) -> Quality {
        match bitrate {
            96_000 => Quality::Basic,
            128_000 => Quality::Low,
            192_000 => Quality::Medium,
            320_000 => Quality::High,
            _ => Quality::High,
        }
    }
}

/// One side (playback or download) of the negotiated state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SideState {
    pub bitrate: u32,
    pub quality: Quality,
}

impl SideState {
    fn max() -> Self {
        SideState {
            bitrate: FAIL_OPEN_BITRATE,
            quality: Quality::High,
        }
    }
}

/// Process-wide quality state, playback and download tracked independently.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QualityState {
    pub playback: SideState,
    pub download: SideState,
}

/// Tracks observed bitrates and applies forced overrides.
///
/// Constructed once at startup and shared (behind an `Arc`) by every
/// response callback.
#[derive(Debug)]
pub struct Negotiator {
    state: Mutex<QualityState>,
    forced_playback: Option<u32>,
    forced_download: Option<u32>,
}

impl Negotiator {
    /// Create a negotiator. Each side starts at its forced bitrate when one
    /// is configured, otherwise at maximum quality.
    pub fn new(forced_playback: Option<u32>, forced_download: Option<u32>) -> Self {
        let seed = |forced: Option<u32>| match forced {
            Some(bitrate) => SideState {
                bitrate,
                quality: Quality::from_bitrate(bitrate),
            },
            None => SideState::max(),
        };

        Self {
            state: Mutex::new(QualityState {
                playback: seed(forced_playback),
                download: seed(forced_download),
            }),
            forced_playback,
            forced_download,
        }
    }

    /// Feed the bitrate a player-URL response advertised; returns the
    /// effective bitrate and tier to rewrite the response with.
    pub fn negotiate_playback(&self, observed: &str) -> SideState {
        let mut state = self.lock();
        let next = negotiate_side(state.playback, self.forced_playback, observed, "playback");
        state.playback = next;
        next
    }

    /// Feed the bitrate a download-URL response advertised; returns the
    /// effective bitrate and tier to rewrite the response with.
    pub fn negotiate_download(&self, observed: &str) -> SideState {
        let mut state = self.lock();
        let next = negotiate_side(state.download, self.forced_download, observed, "download");
        state.download = next;
        next
    }

    /// Snapshot of the current state, for the detail rewriter and tests.
    pub fn snapshot(&self) -> QualityState {
        *self.lock()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QualityState> {
        // A poisoned lock only means a panicking test thread; the state
        // itself is always written whole.
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Compute the effective bitrate for one side from the stored state, the
/// configured override, and the bitrate the server just advertised.
fn negotiate_side(
    previous: SideState,
    forced: Option<u32>,
    observed: &str,
    side: &'static str,
) -> SideState {
    let bitrate = if let Some(forced) = forced {
        debug!("{side} bitrate forced to {forced}");
        forced
    } else if observed == "0" {
        // Server reports no usable bitrate; fail open to maximum quality.
        debug!("{side} bitrate reported as 0, using {FAIL_OPEN_BITRATE}");
        FAIL_OPEN_BITRATE
    } else {
        match observed.parse::<u32>() {
            Ok(observed) if observed != previous.bitrate => {
                info!("{side} quality changed to {observed}");
                observed
            }
            Ok(_) => previous.bitrate,
            // Not bitrate-shaped at all; keep what we had.
            Err(_) => previous.bitrate,
        }
    };

    SideState {
        bitrate,
        quality: Quality::from_bitrate(bitrate),
    }
}
