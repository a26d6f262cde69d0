//! PDF metadata extraction and keyword relevancy scoring.

use lopdf::{Dictionary, Document, Object};
use serde_json::Map;

use trawl_types::{DocumentProcessor, ProcessError, ProcessedDocument};

/// Info-dictionary keys surfaced into the metadata map, with the PDF name
/// prefix kept.
const INFO_KEYS: &[&str] = &["Title", "Author", "Subject", "Keywords"];

/// Pages contribute less the further they are from the front; scanning stops
/// once the factor drops below this.
const MIN_DISTANCE_FACTOR: f64 = 0.01;

/// Scores PDF documents against a keyword list.
///
/// Each keyword found in the title/subject/keywords metadata is worth 10
/// points. Occurrences in page text are worth the current distance factor,
/// which starts at 1 and halves with every page. Relevancy is rounded to the
/// nearest tenth and mirrored into the metadata map as `_relevancy`.
#[derive(Debug)]
pub struct KeywordProcessor {
    keywords: Vec<String>,
}

impl KeywordProcessor {
    #[must_use]
    pub fn new(keywords: &[String]) -> Self {
        Self {
            keywords: keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    fn score(&self, doc: &Document, metadata: &Map<String, serde_json::Value>) -> f64 {
        if self.keywords.is_empty() {
            return 0.0;
        }

        let mut relevancy = 0.0;

        let headline = [
            metadata.get("/Title"),
            metadata.get("/Subject"),
            metadata.get("/Keywords"),
        ]
        .into_iter()
        .flatten()
        .filter_map(serde_json::Value::as_str)
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

        for keyword in &self.keywords {
            if headline.contains(keyword) {
                relevancy += 10.0;
            }
        }

        let mut distance_factor = 1.0;
        for (page_number, _) in doc.get_pages() {
            if distance_factor < MIN_DISTANCE_FACTOR {
                break;
            }
            // Some malformed PDFs fail text extraction per page; skip those.
            if let Ok(text) = doc.extract_text(&[page_number]) {
                let text = text.to_lowercase();
                for keyword in &self.keywords {
                    relevancy += distance_factor * text.matches(keyword.as_str()).count() as f64;
                }
            }
            distance_factor /= 2.0;
        }

        (relevancy * 10.0).round() / 10.0
    }
}

impl DocumentProcessor for KeywordProcessor {
    fn process(&self, content: &[u8], mime: &str) -> Result<ProcessedDocument, ProcessError> {
        let mut metadata = Map::new();
        let mut relevancy = 0.0;

        if mime == "application/pdf" {
            let doc = Document::load_mem(content)?;

            if let Some(info) = info_dictionary(&doc) {
                for key in INFO_KEYS {
                    if let Ok(value) = info.get(key.as_bytes())
                        && let Some(text) = decode_pdf_string(value)
                    {
                        metadata.insert(format!("/{key}"), text.into());
                    }
                }
            }
            metadata.insert("_num_pages".into(), doc.get_pages().len().into());

            relevancy = self.score(&doc, &metadata);
        }

        metadata.insert("_relevancy".into(), relevancy.into());
        Ok(ProcessedDocument {
            relevancy,
            metadata,
        })
    }
}

/// The trailer's Info entry, whether inline or behind a reference.
fn info_dictionary(doc: &Document) -> Option<&Dictionary> {
    match doc.trailer.get(b"Info").ok()? {
        Object::Reference(id) => doc.get_dictionary(*id).ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

/// Decode a PDF string object: UTF-16BE when BOM-prefixed, bytes otherwise.
fn decode_pdf_string(obj: &Object) -> Option<String> {
    let Object::String(bytes, _) = obj else {
        return None;
    };
    if let Some(stripped) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = stripped
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        Some(String::from_utf16_lossy(&units))
    } else {
        Some(String::from_utf8_lossy(bytes).into_owned())
    }
}
