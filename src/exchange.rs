//! The narrow interface between the proxy runtime and the filter.
//!
//! The runtime owns the connection; the filter only ever sees one completed
//! exchange at a time and may replace its response body. Nothing here is
//! retained past a single [`crate::dispatch::Dispatcher::handle_exchange`]
//! call.

/// A completed HTTP exchange as seen by the response filter.
///
/// Constructed by the proxy runtime from its buffered request/response pair.
/// `replace_body` is the only mutation; [`Exchange::modified`] tells the
/// runtime whether it needs to re-serialize the response.
#[derive(Debug, Clone)]
pub struct Exchange {
    request_url: String,
    status: u16,
    content_type: String,
    body: String,
    modified: bool,
}

impl Exchange {
    pub fn new(request_url: String, status: u16, content_type: String, body: String) -> Self {
        Self {
            request_url,
            status,
            content_type,
            body,
            modified: false,
        }
    }

    pub fn request_url(&self) -> &str {
        &self.request_url
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Current response body (rewritten, if a rewrite has been installed).
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Install a new response body.
    pub fn replace_body(&mut self, new_body: String) {
        self.body = new_body;
        self.modified = true;
    }

    /// Whether `replace_body` has been called on this exchange.
    pub fn modified(&self) -> bool {
        self.modified
    }
}
