//! Optional document-to-markdown conversion capability.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;

use super::{ConversionError, DocumentInput};

/// Raw service response. The content may arrive under either field.
#[derive(Debug, Default, Deserialize)]
pub struct ConversionResponse {
    #[serde(default)]
    pub markdown: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
}

impl ConversionResponse {
    /// Picks whichever field is populated with non-blank text.
    pub fn into_text(self) -> Option<String> {
        [self.markdown, self.data]
            .into_iter()
            .flatten()
            .find(|s| !s.trim().is_empty())
    }
}

#[async_trait]
pub trait DocumentConverter: Send + Sync {
    async fn to_markdown(
        &self,
        input: &DocumentInput<'_>,
    ) -> Result<ConversionResponse, ConversionError>;
}

/// Whether the deployment has a conversion service wired in.
#[derive(Clone)]
pub enum ConversionCapability {
    Unavailable,
    Available(Arc<dyn DocumentConverter>),
}

impl ConversionCapability {
    pub fn is_available(&self) -> bool {
        matches!(self, ConversionCapability::Available(_))
    }
}

/// Posts the file as multipart to an HTTP conversion endpoint.
pub struct HttpConverter {
    client: Client,
    url: String,
    token: Option<String>,
}

impl HttpConverter {
    pub fn new(url: String, token: Option<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(90))
                .build()
                .expect("Failed to build HTTP client"),
            url,
            token,
        }
    }
}

#[async_trait]
impl DocumentConverter for HttpConverter {
    async fn to_markdown(
        &self,
        input: &DocumentInput<'_>,
    ) -> Result<ConversionResponse, ConversionError> {
        let mut part = Part::bytes(input.bytes.to_vec())
            .file_name(input.filename.unwrap_or("document").to_string());
        if let Some(mime) = input.mime_type {
            part = part
                .mime_str(mime)
                .map_err(|e| ConversionError::Service(format!("invalid MIME type: {e}")))?;
        }
        let form = Form::new().part("file", part);

        let mut request = self.client.post(&self.url).multipart(form);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConversionError::Service(format!(
                "status {}: {}",
                status.as_u16(),
                body
            )));
        }

        Ok(response.json::<ConversionResponse>().await?)
    }
}
