//! Filesystem sink for processed documents.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

use trawl_db::NewDocument;
use trawl_types::{ProcessedDocument, Resource};

use crate::frontier::Frontier;

/// Writes accepted documents under the download folder and rejected ones
/// under the rejected folder (or nowhere, when no rejected folder is
/// configured), then records the document row.
///
/// Collisions are impossible: every filename is prefixed with the resource's
/// numeric id.
#[derive(Debug, Clone)]
pub struct DocumentSink {
    accepted_dir: PathBuf,
    rejected_dir: Option<PathBuf>,
}

impl DocumentSink {
    #[must_use]
    pub fn new(accepted_dir: PathBuf, rejected_dir: Option<PathBuf>) -> Self {
        Self {
            accepted_dir,
            rejected_dir,
        }
    }

    /// Persist one document. Returns the final filename whether or not a
    /// file was written.
    pub fn store(
        &self,
        frontier: &Frontier,
        resource: &Resource,
        mime: &str,
        filename: &str,
        processed: &ProcessedDocument,
        accepted: bool,
        content: &[u8],
    ) -> Result<String> {
        let final_name = final_name(resource.id, filename, mime);

        let target_dir = if accepted {
            Some(&self.accepted_dir)
        } else {
            self.rejected_dir.as_ref()
        };
        if let Some(dir) = target_dir {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create folder: {}", dir.display()))?;
            let path = dir.join(&final_name);
            let decoded;
            let bytes: &[u8] = if mime.starts_with("text/") {
                // Text types are decoded before writing so the file on disk
                // is valid UTF-8 regardless of the wire bytes.
                decoded = String::from_utf8_lossy(content).into_owned().into_bytes();
                &decoded
            } else {
                content
            };
            fs::write(&path, bytes)
                .with_context(|| format!("Failed to write document: {}", path.display()))?;
        }

        frontier.record_document(
            resource.id,
            &NewDocument {
                name: resource.title.as_deref(),
                author: processed
                    .metadata
                    .get("/Author")
                    .and_then(serde_json::Value::as_str),
                mime,
                filename: &final_name,
                metadata: &processed.metadata,
                relevancy: processed.relevancy,
                num_pages: processed
                    .metadata
                    .get("_num_pages")
                    .and_then(serde_json::Value::as_i64),
                accepted,
            },
        )?;

        Ok(final_name)
    }
}

/// `{resource id}_{sanitized name}{.ext if absent}`.
fn final_name(resource_id: i64, filename: &str, mime: &str) -> String {
    let mut cleaned: String = filename
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '.' { c } else { '_' })
        .collect();

    if let Some(ext) = canonical_extension(mime)
        && !cleaned.to_ascii_lowercase().ends_with(&format!(".{ext}"))
    {
        cleaned.push('.');
        cleaned.push_str(ext);
    }

    format!("{resource_id}_{cleaned}")
}

fn canonical_extension(mime: &str) -> Option<&'static str> {
    mime_guess::get_mime_extensions_str(mime)
        .and_then(|extensions| extensions.first())
        .copied()
}

#[cfg(test)]
mod tests {
    use trawl_db::CrawlStore;
    use trawl_types::ProcessedDocument;

    use super::*;

    fn harness() -> (Frontier, Resource) {
        let store = CrawlStore::open_in_memory().unwrap();
        let frontier = Frontier::open(store, true, 3).unwrap();
        let (item, _) = frontier
            .add("http://h/paper.pdf", Some("A Paper"), None, None)
            .unwrap();
        (frontier, item.resource)
    }

    fn processed(relevancy: f64) -> ProcessedDocument {
        let mut metadata = serde_json::Map::new();
        metadata.insert("/Author".into(), "Someone".into());
        metadata.insert("_num_pages".into(), 3.into());
        ProcessedDocument {
            relevancy,
            metadata,
        }
    }

    #[test]
    fn sanitizes_and_prefixes_filenames() {
        assert_eq!(
            final_name(7, "a b/c.pdf", "application/pdf"),
            "7_a_b_c.pdf"
        );
        // Extension appended when absent.
        assert_eq!(final_name(7, "paper", "application/pdf"), "7_paper.pdf");
        assert_eq!(final_name(7, "", "application/pdf"), "7_.pdf");
    }

    #[test]
    fn accepted_document_is_written_to_the_download_folder() {
        let dir = tempfile::tempdir().unwrap();
        let (frontier, resource) = harness();
        let sink = DocumentSink::new(dir.path().join("files"), None);

        let name = sink
            .store(
                &frontier,
                &resource,
                "application/pdf",
                "paper.pdf",
                &processed(15.0),
                true,
                b"%PDF-1.4",
            )
            .unwrap();

        assert_eq!(name, format!("{}_paper.pdf", resource.id));
        let written = fs::read(dir.path().join("files").join(&name)).unwrap();
        assert_eq!(written, b"%PDF-1.4");
    }

    #[test]
    fn rejected_document_goes_to_the_rejected_folder() {
        let dir = tempfile::tempdir().unwrap();
        let (frontier, resource) = harness();
        let sink = DocumentSink::new(
            dir.path().join("files"),
            Some(dir.path().join("rejected")),
        );

        let name = sink
            .store(
                &frontier,
                &resource,
                "application/pdf",
                "paper.pdf",
                &processed(0.5),
                false,
                b"%PDF-1.4",
            )
            .unwrap();

        assert!(!dir.path().join("files").join(&name).exists());
        assert!(dir.path().join("rejected").join(&name).exists());
    }

    #[test]
    fn rejected_without_folder_records_but_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (frontier, resource) = harness();
        let sink = DocumentSink::new(dir.path().join("files"), None);

        let name = sink
            .store(
                &frontier,
                &resource,
                "application/pdf",
                "paper.pdf",
                &processed(0.5),
                false,
                b"%PDF-1.4",
            )
            .unwrap();

        assert!(!dir.path().join("files").join(&name).exists());
        // The document row exists and is linked to the resource.
        let item = frontier.next().unwrap();
        let doc_id = item.resource.document_id.unwrap();
        assert!(doc_id > 0);
    }
}
