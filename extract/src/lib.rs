//! Built-in collaborators for the dispatcher: an HTML link parser, a PDF
//! keyword processor, and the registry that maps configured names to
//! instances.

mod html;
mod pdf;
mod registry;

pub use html::LinkExtractor;
pub use pdf::KeywordProcessor;
pub use registry::{PARSER_NAMES, PROCESSOR_NAMES, RegistryError, make_parser, make_processor};
