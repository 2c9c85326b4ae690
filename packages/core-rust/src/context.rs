/// Per-request context carrying identifiers and envelope metadata.
/// Threaded explicitly through decode, the domain operation, and the writer so that
/// no request-derived state ever lands on shared stage fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Identifier assigned by the HTTP layer (`X-Request-Id`).
    pub request_id: String,
    /// Id attribute of the inbound envelope, when it carried one.
    pub event_id: Option<String>,
    /// Type tag of the inbound envelope. Empty for untyped and raw-body requests.
    pub event_type: String,
    /// Source attribute of the inbound envelope, when it carried one.
    pub event_source: Option<String>,
}

impl RequestContext {
    /// Creates a context with only the request identifier populated.
    #[must_use]
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            ..Self::default()
        }
    }
}
