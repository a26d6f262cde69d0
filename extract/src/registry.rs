//! Name → instance registry for parsers and processors.
//!
//! Stands in for the dynamic class loading of scripting-language crawlers: a
//! configured name resolves to a constructor, and unknown names fail at
//! startup instead of mid-crawl.

use thiserror::Error;

use trawl_types::{DocumentProcessor, LinkParser};

use crate::html::LinkExtractor;
use crate::pdf::KeywordProcessor;

pub const PARSER_NAMES: &[&str] = &["simple"];
pub const PROCESSOR_NAMES: &[&str] = &["keyword"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("unknown parser '{0}'; known parsers: {PARSER_NAMES:?}")]
    UnknownParser(String),
    #[error("unknown processor '{0}'; known processors: {PROCESSOR_NAMES:?}")]
    UnknownProcessor(String),
}

/// Build a fresh parser instance. Each worker needs its own; parsers may be
/// stateful per page.
pub fn make_parser(name: &str) -> Result<Box<dyn LinkParser + Sync>, RegistryError> {
    match name {
        "simple" => Ok(Box::new(LinkExtractor::new())),
        other => Err(RegistryError::UnknownParser(other.to_string())),
    }
}

/// Build a fresh processor instance for the given keyword list.
pub fn make_processor(
    name: &str,
    keywords: &[String],
) -> Result<Box<dyn DocumentProcessor + Sync>, RegistryError> {
    match name {
        "keyword" => Ok(Box::new(KeywordProcessor::new(keywords))),
        other => Err(RegistryError::UnknownProcessor(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_names_resolve() {
        assert!(make_parser("simple").is_ok());
        assert!(make_processor("keyword", &["k".to_string()]).is_ok());
    }

    #[test]
    fn unknown_names_list_the_registry() {
        let err = make_parser("fancy").unwrap_err();
        assert!(err.to_string().contains("simple"));
        let err = make_processor("ml", &[]).unwrap_err();
        assert!(err.to_string().contains("keyword"));
    }
}
