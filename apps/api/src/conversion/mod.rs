//! Document conversion pipeline: raw bytes plus optional filename/MIME into a `Document`.
//!
//! Text extraction walks an ordered list of `ConversionTier`s and stops at the
//! first one that yields non-empty text after markdown cleanup. The winning
//! tier is recorded as `conversion_method`, the main signal for diagnosing
//! conversion quality in production.

pub mod converter;
pub mod markdown;
pub mod pdf_scrape;
pub mod tiers;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{ConversionMethod, Document, DocumentType};
use crate::storage::Storage;

pub use converter::{ConversionCapability, ConversionResponse, DocumentConverter, HttpConverter};
use markdown::{count_words, strip_markdown};
use tiers::{default_tiers, ConversionTier};

/// Uploads above this size are rejected before any tier runs.
pub const MAX_DOCUMENT_BYTES: usize = 10 * 1024 * 1024;

const TEXT_EXTENSIONS: &[&str] = &["txt", "text", "md", "markdown", "csv", "json"];
const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "docx", "doc", "rtf", "odt"];
const DOCUMENT_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/rtf",
    "application/vnd.oasis.opendocument.text",
];

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error(
        "Could not extract any text from {name}. Paste the text directly as a message, \
         or ask an administrator to enable document conversion."
    )]
    Exhausted { name: String },

    #[error("Conversion service error: {0}")]
    Service(String),

    #[error("Conversion service HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Local PDF extraction failed: {0}")]
    Legacy(String),
}

/// Borrowed view of an uploaded file.
#[derive(Debug, Clone, Copy)]
pub struct DocumentInput<'a> {
    pub bytes: &'a [u8],
    pub filename: Option<&'a str>,
    pub mime_type: Option<&'a str>,
}

impl<'a> DocumentInput<'a> {
    fn extension(&self) -> Option<String> {
        self.filename
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase())
    }

    fn mime(&self) -> Option<String> {
        self.mime_type.map(|m| {
            m.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
    }

    /// Text MIME or extension, or pasted text with neither filename nor MIME.
    pub fn is_text_like(&self) -> bool {
        if self.filename.is_none() && self.mime_type.is_none() {
            return !pdf_scrape::is_pdf(self.bytes);
        }
        let mime_is_text = self.mime().is_some_and(|m| {
            m.starts_with("text/") || m == "application/json" || m.ends_with("markdown")
        });
        let ext_is_text = self
            .extension()
            .is_some_and(|ext| TEXT_EXTENSIONS.contains(&ext.as_str()));
        mime_is_text || ext_is_text
    }

    pub fn is_binary_document_like(&self) -> bool {
        let mime_matches = self
            .mime()
            .is_some_and(|m| DOCUMENT_MIME_TYPES.contains(&m.as_str()));
        let ext_matches = self
            .extension()
            .is_some_and(|ext| DOCUMENT_EXTENSIONS.contains(&ext.as_str()));
        mime_matches || ext_matches || pdf_scrape::is_pdf(self.bytes)
    }

    fn display_name(&self) -> String {
        self.filename
            .map(|n| format!("'{n}'"))
            .unwrap_or_else(|| "the document".to_string())
    }
}

pub struct DocumentPipeline {
    tiers: Vec<Box<dyn ConversionTier>>,
    storage: Storage,
}

impl DocumentPipeline {
    pub fn new(storage: Storage, capability: ConversionCapability) -> Self {
        Self::with_tiers(storage, default_tiers(capability))
    }

    pub fn with_tiers(storage: Storage, tiers: Vec<Box<dyn ConversionTier>>) -> Self {
        Self { tiers, storage }
    }

    /// Runs the tiers in order and returns the first non-empty cleaned text.
    pub async fn extract_text(
        &self,
        input: &DocumentInput<'_>,
    ) -> Result<(String, ConversionMethod), ConversionError> {
        for tier in &self.tiers {
            if !tier.applies_to(input) {
                continue;
            }
            let method = tier.method();
            match tier.extract(input).await {
                Ok(Some(raw)) => {
                    let text = strip_markdown(&raw);
                    if !text.is_empty() {
                        return Ok((text, method));
                    }
                    info!(method = method.as_str(), "Conversion tier produced empty text");
                }
                Ok(None) => {}
                Err(e) => warn!(method = method.as_str(), "Conversion tier failed: {e}"),
            }
        }

        Err(ConversionError::Exhausted {
            name: input.display_name(),
        })
    }

    /// Converts the bytes, persists the resulting immutable `Document`, and
    /// returns it. Does not touch the owning request.
    pub async fn process_document(
        &self,
        request_id: Uuid,
        doc_type: DocumentType,
        bytes: &[u8],
        filename: Option<&str>,
        mime_type: Option<&str>,
    ) -> Result<Document, AppError> {
        if bytes.is_empty() {
            return Err(AppError::Validation(format!("The {doc_type} is empty")));
        }
        if bytes.len() > MAX_DOCUMENT_BYTES {
            return Err(AppError::Validation(format!(
                "The {doc_type} is too large ({} bytes, max {MAX_DOCUMENT_BYTES})",
                bytes.len()
            )));
        }

        let input = DocumentInput {
            bytes,
            filename,
            mime_type,
        };
        let (text, conversion_method) = self.extract_text(&input).await?;
        let word_count = count_words(&text);

        // Size and names are only meaningful for uploaded files.
        let uploaded = filename.is_some() || mime_type.is_some();
        let document = Document {
            id: Uuid::new_v4(),
            request_id,
            doc_type,
            original_name: filename.map(str::to_string),
            mime_type: mime_type.map(str::to_string),
            size: uploaded.then_some(bytes.len()),
            text,
            word_count,
            conversion_method,
            created_at: Utc::now(),
        };

        self.storage.store_document(&document).await?;

        info!(
            request_id = %request_id,
            document_id = %document.id,
            doc_type = doc_type.as_str(),
            conversion_method = conversion_method.as_str(),
            bytes = bytes.len(),
            word_count,
            "Document converted"
        );

        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::storage::MemoryKv;

    struct FixedConverter(ConversionResponse);

    #[async_trait]
    impl DocumentConverter for FixedConverter {
        async fn to_markdown(
            &self,
            _input: &DocumentInput<'_>,
        ) -> Result<ConversionResponse, ConversionError> {
            Ok(ConversionResponse {
                markdown: self.0.markdown.clone(),
                data: self.0.data.clone(),
            })
        }
    }

    struct FailingConverter;

    #[async_trait]
    impl DocumentConverter for FailingConverter {
        async fn to_markdown(
            &self,
            _input: &DocumentInput<'_>,
        ) -> Result<ConversionResponse, ConversionError> {
            Err(ConversionError::Service("status 503: down".to_string()))
        }
    }

    fn pipeline(capability: ConversionCapability) -> (DocumentPipeline, Storage) {
        let storage = Storage::new(Arc::new(MemoryKv::new()), None);
        (DocumentPipeline::new(storage.clone(), capability), storage)
    }

    const SCRAPEABLE_PDF: &[u8] = b"%PDF-1.4\nBT (Senior Product Manager) Tj ET";

    #[tokio::test]
    async fn test_pasted_text_uses_plain_text_tier() {
        let (pipeline, storage) = pipeline(ConversionCapability::Unavailable);
        let request_id = Uuid::new_v4();
        let document = pipeline
            .process_document(
                request_id,
                DocumentType::Resume,
                "5 years product management".as_bytes(),
                None,
                None,
            )
            .await
            .unwrap();

        assert_eq!(document.conversion_method, ConversionMethod::PlainText);
        assert_eq!(document.word_count, 4);
        assert!(document.size.is_none());
        let stored = storage.get_document(document.id).await.unwrap().unwrap();
        assert_eq!(stored.request_id, request_id);
    }

    #[tokio::test]
    async fn test_markdown_file_is_cleaned() {
        let (pipeline, _) = pipeline(ConversionCapability::Unavailable);
        let document = pipeline
            .process_document(
                Uuid::new_v4(),
                DocumentType::JobPost,
                b"# Seeking PM\n**3+ years**",
                Some("post.md"),
                None,
            )
            .await
            .unwrap();
        assert_eq!(document.text, "Seeking PM\n3+ years");
        assert_eq!(document.size, Some(25));
    }

    #[tokio::test]
    async fn test_pdf_uses_conversion_capability_when_available() {
        let converter = FixedConverter(ConversionResponse {
            markdown: None,
            data: Some("## Jane Doe\nProduct lead".to_string()),
        });
        let (pipeline, _) = pipeline(ConversionCapability::Available(Arc::new(converter)));
        let document = pipeline
            .process_document(
                Uuid::new_v4(),
                DocumentType::Resume,
                SCRAPEABLE_PDF,
                Some("cv.pdf"),
                Some("application/pdf"),
            )
            .await
            .unwrap();
        assert_eq!(document.conversion_method, ConversionMethod::InferenceConversion);
        assert_eq!(document.text, "Jane Doe\nProduct lead");
    }

    #[tokio::test]
    async fn test_empty_conversion_response_falls_through() {
        let converter = FixedConverter(ConversionResponse::default());
        let (pipeline, _) = pipeline(ConversionCapability::Available(Arc::new(converter)));
        let input = DocumentInput {
            bytes: SCRAPEABLE_PDF,
            filename: Some("cv.pdf"),
            mime_type: None,
        };
        let (text, method) = pipeline.extract_text(&input).await.unwrap();
        assert!(matches!(
            method,
            ConversionMethod::LegacyFallback | ConversionMethod::RawFallback
        ));
        assert!(!text.is_empty());
    }

    #[tokio::test]
    async fn test_failing_service_falls_through_to_raw_scrape() {
        let storage = Storage::new(Arc::new(MemoryKv::new()), None);
        let pipeline = DocumentPipeline::with_tiers(
            storage,
            vec![
                Box::new(tiers::PlainTextTier),
                Box::new(tiers::InferenceConversionTier::new(
                    ConversionCapability::Available(Arc::new(FailingConverter)),
                )),
                Box::new(tiers::RawPdfScrapeTier),
            ],
        );
        let input = DocumentInput {
            bytes: SCRAPEABLE_PDF,
            filename: Some("cv.pdf"),
            mime_type: Some("application/pdf"),
        };
        let (text, method) = pipeline.extract_text(&input).await.unwrap();
        assert_eq!(method, ConversionMethod::RawFallback);
        assert_eq!(text, "Senior Product Manager");
    }

    #[tokio::test]
    async fn test_unconvertible_document_is_exhausted_with_guidance() {
        let (pipeline, _) = pipeline(ConversionCapability::Unavailable);
        let err = pipeline
            .process_document(
                Uuid::new_v4(),
                DocumentType::Resume,
                b"PK\x03\x04 zipped word content",
                Some("cv.docx"),
                None,
            )
            .await
            .unwrap_err();

        match err {
            AppError::Conversion(e @ ConversionError::Exhausted { .. }) => {
                let message = e.to_string();
                assert!(message.contains("'cv.docx'"));
                assert!(message.contains("Paste the text"));
            }
            other => panic!("expected exhausted conversion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_latin1_text_file_is_decoded_lossily() {
        let (pipeline, _) = pipeline(ConversionCapability::Unavailable);
        let document = pipeline
            .process_document(
                Uuid::new_v4(),
                DocumentType::Resume,
                b"Resume: Jos\xe9 M\xfcller, 5 years product management",
                Some("cv.txt"),
                Some("text/plain"),
            )
            .await
            .unwrap();

        assert_eq!(document.conversion_method, ConversionMethod::PlainText);
        assert!(document.text.contains("5 years product management"));
        assert!(document.text.contains('\u{fffd}'));
        assert_eq!(document.word_count, 7);
    }

    #[tokio::test]
    async fn test_oversized_upload_is_rejected() {
        let (pipeline, _) = pipeline(ConversionCapability::Unavailable);
        let bytes = vec![b'a'; MAX_DOCUMENT_BYTES + 1];
        let err = pipeline
            .process_document(Uuid::new_v4(), DocumentType::Resume, &bytes, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_input_classification() {
        let text = DocumentInput {
            bytes: b"hi",
            filename: Some("a.TXT"),
            mime_type: None,
        };
        assert!(text.is_text_like());
        assert!(!text.is_binary_document_like());

        let word = DocumentInput {
            bytes: b"PK",
            filename: None,
            mime_type: Some(
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            ),
        };
        assert!(!word.is_text_like());
        assert!(word.is_binary_document_like());

        let charset = DocumentInput {
            bytes: b"hi",
            filename: None,
            mime_type: Some("text/plain; charset=utf-8"),
        };
        assert!(charset.is_text_like());
    }
}
