//! Core domain types for trawl.
//!
//! This crate contains pure domain types with no IO and no async. Everything
//! here can be used from any layer of the crawler.

mod contract;
mod records;

pub use contract::{
    DocumentProcessor, FoundLink, LinkParser, ParsedPage, ProcessError, ProcessedDocument,
};
pub use records::{
    Document, DocumentId, Link, PendingId, PendingItem, Resource, ResourceId, WorkerCounters,
    WorkerState, WorkerStateParseError, WorkerStatus,
};
