//! The ordered text-extraction strategies.

use std::borrow::Cow;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::converter::ConversionCapability;
use super::pdf_scrape::{is_pdf, scrape_pdf_text};
use super::{ConversionError, DocumentInput};
use crate::models::ConversionMethod;

#[async_trait]
pub trait ConversionTier: Send + Sync {
    fn method(&self) -> ConversionMethod;

    fn applies_to(&self, input: &DocumentInput<'_>) -> bool;

    /// `Ok(None)` means this tier produced nothing and the next one should run.
    async fn extract(&self, input: &DocumentInput<'_>) -> Result<Option<String>, ConversionError>;
}

/// Text files and pasted text, decoded as UTF-8. Invalid sequences become
/// U+FFFD so a stray Latin-1 byte does not lose the whole document.
pub struct PlainTextTier;

#[async_trait]
impl ConversionTier for PlainTextTier {
    fn method(&self) -> ConversionMethod {
        ConversionMethod::PlainText
    }

    fn applies_to(&self, input: &DocumentInput<'_>) -> bool {
        input.is_text_like()
    }

    async fn extract(&self, input: &DocumentInput<'_>) -> Result<Option<String>, ConversionError> {
        let text = String::from_utf8_lossy(input.bytes);
        if let Cow::Owned(decoded) = &text {
            let replaced = decoded.matches('\u{fffd}').count();
            warn!(
                replaced,
                bytes = input.bytes.len(),
                "Text document is not valid UTF-8; decoded lossily"
            );
        }
        Ok(Some(text.trim_start_matches('\u{feff}').to_string()))
    }
}

/// Sends PDF/Word documents to the external conversion capability.
pub struct InferenceConversionTier {
    capability: ConversionCapability,
}

impl InferenceConversionTier {
    pub fn new(capability: ConversionCapability) -> Self {
        Self { capability }
    }
}

#[async_trait]
impl ConversionTier for InferenceConversionTier {
    fn method(&self) -> ConversionMethod {
        ConversionMethod::InferenceConversion
    }

    fn applies_to(&self, input: &DocumentInput<'_>) -> bool {
        input.is_binary_document_like()
    }

    async fn extract(&self, input: &DocumentInput<'_>) -> Result<Option<String>, ConversionError> {
        match &self.capability {
            ConversionCapability::Unavailable => {
                debug!("Conversion capability unavailable, skipping tier");
                Ok(None)
            }
            ConversionCapability::Available(converter) => {
                Ok(converter.to_markdown(input).await?.into_text())
            }
        }
    }
}

/// Local PDF text extraction via `pdf-extract`.
pub struct LegacyPdfTier;

#[async_trait]
impl ConversionTier for LegacyPdfTier {
    fn method(&self) -> ConversionMethod {
        ConversionMethod::LegacyFallback
    }

    fn applies_to(&self, input: &DocumentInput<'_>) -> bool {
        is_pdf(input.bytes)
    }

    async fn extract(&self, input: &DocumentInput<'_>) -> Result<Option<String>, ConversionError> {
        let bytes = input.bytes.to_vec();
        // pdf-extract can panic on malformed files; a panic surfaces as a JoinError
        let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| ConversionError::Legacy(format!("extractor panicked: {e}")))?
            .map_err(|e| ConversionError::Legacy(e.to_string()))?;
        Ok(Some(text))
    }
}

pub struct RawPdfScrapeTier;

#[async_trait]
impl ConversionTier for RawPdfScrapeTier {
    fn method(&self) -> ConversionMethod {
        ConversionMethod::RawFallback
    }

    fn applies_to(&self, input: &DocumentInput<'_>) -> bool {
        is_pdf(input.bytes)
    }

    async fn extract(&self, input: &DocumentInput<'_>) -> Result<Option<String>, ConversionError> {
        Ok(Some(scrape_pdf_text(input.bytes)))
    }
}

/// Default tier order: plain text, conversion service, pdf-extract, raw scrape.
pub fn default_tiers(capability: ConversionCapability) -> Vec<Box<dyn ConversionTier>> {
    vec![
        Box::new(PlainTextTier),
        Box::new(InferenceConversionTier::new(capability)),
        Box::new(LegacyPdfTier),
        Box::new(RawPdfScrapeTier),
    ]
}
