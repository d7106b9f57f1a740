//! tunegate — response-rewriting filter for a music-streaming client.
//!
//! The crate sits inside an externally supplied TLS-intercepting proxy
//! runtime. The runtime buffers each completed HTTP exchange and hands it to
//! [`dispatch::Dispatcher::handle_exchange`], which decides whether the
//! response needs rewriting (quality caps, regional locks, download quotas)
//! and, if so, installs a new body on the exchange. Everything else — TLS
//! termination, connection handling, flag parsing, log subscriber setup — is
//! the embedding binary's job.
//!
//! Typical embedding:
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = tunegate::config::Config::from_env()?;
//! let dispatcher = tunegate::dispatch::Dispatcher::new(&config);
//!
//! // inside the proxy's response callback:
//! let mut exchange = tunegate::exchange::Exchange::new(
//!     "http://music.163.com/eapi/song/download/limit".into(),
//!     200,
//!     "text/plain".into(),
//!     "{\"overflow\":true,\"code\":-1}".into(),
//! );
//! dispatcher.handle_exchange(&mut exchange).await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod detail;
pub mod dispatch;
pub mod error;
pub mod exchange;
pub mod quality;
pub mod resolver;

pub use config::Config;
pub use dispatch::Dispatcher;
pub use error::FilterError;
pub use exchange::Exchange;
pub use quality::Quality;
