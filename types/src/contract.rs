//! Contracts between the dispatcher and its pluggable collaborators.
//!
//! A dispatcher owns one parser and one processor instance; parsers may keep
//! per-page state, so `parse` takes `&mut self`.

/// A link discovered while parsing a page. The URL may be relative; the
/// frontier resolves it against the referrer before admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundLink {
    pub url: String,
    pub text: Option<String>,
    /// Priority hint for the frontier. `None` means "no opinion".
    pub priority: Option<i64>,
}

/// Result of parsing one HTML document.
///
/// `title: None` together with empty `links` is also how a parser reports
/// "this document forbids following" (e.g. a robots nofollow meta tag).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPage {
    pub title: Option<String>,
    pub links: Vec<FoundLink>,
}

pub trait LinkParser: Send + std::fmt::Debug {
    fn parse(&mut self, html: &str) -> ParsedPage;
}

/// Error type processors may fail with. Processing failures are logged and do
/// not drive retries, so the concrete type does not matter to the dispatcher.
pub type ProcessError = Box<dyn std::error::Error + Send + Sync>;

/// Result of scoring one fetched document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessedDocument {
    pub relevancy: f64,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

pub trait DocumentProcessor: Send + std::fmt::Debug {
    fn process(&self, content: &[u8], mime: &str) -> Result<ProcessedDocument, ProcessError>;
}
