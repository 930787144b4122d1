//! Client role of the HTTP binding, built on `reqwest`.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use tokio::sync::mpsc;
use wothub_app::codec::{CodecRegistry, normalize_media_type};
use wothub_app::ports::{BindingClient, ClientSubscription};
use wothub_domain::description::ThingDescription;
use wothub_domain::error::WotError;
use wothub_domain::form::{BindingKind, DEFAULT_CONTENT_TYPE, Form};

use crate::error::{HttpBindingError, from_response};

/// Performs interactions against remote Things through their `http` forms.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    codecs: Arc<CodecRegistry>,
}

impl HttpClient {
    /// # Errors
    ///
    /// Returns [`HttpBindingError::Client`] when the TLS backend cannot be
    /// initialised.
    pub fn new(codecs: Arc<CodecRegistry>) -> Result<Self, HttpBindingError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(HttpBindingError::Client)?;
        Ok(Self { client, codecs })
    }

    /// Send `request` and return the successful response, or the error the
    /// server reported.
    async fn send(&self, url: &str, request: reqwest::RequestBuilder) -> Result<reqwest::Response, WotError> {
        let response = request
            .send()
            .await
            .map_err(|source| HttpBindingError::request(url, source))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .bytes()
            .await
            .map_err(|source| HttpBindingError::request(url, source))?;
        Err(from_response(status.as_u16(), url, &body))
    }

    async fn decode(&self, url: &str, response: reqwest::Response) -> Result<Value, WotError> {
        let media_type = response_media_type(&response);
        let body = response
            .bytes()
            .await
            .map_err(|source| HttpBindingError::request(url, source))?;
        self.codecs.decode(&media_type, &body)
    }
}

fn check_href(href: &str) -> Result<(), HttpBindingError> {
    match BindingKind::from_href(href) {
        Some(kind) if kind.as_str() == "http" => Ok(()),
        _ => Err(HttpBindingError::InvalidHref(href.to_string())),
    }
}

fn response_media_type(response: &reqwest::Response) -> String {
    normalize_media_type(
        response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or(DEFAULT_CONTENT_TYPE),
    )
}

#[async_trait]
impl BindingClient for HttpClient {
    fn kind(&self) -> BindingKind {
        BindingKind::new("http")
    }

    #[tracing::instrument(skip(self, form), fields(href = %form.href))]
    async fn read_property(&self, form: &Form) -> Result<Value, WotError> {
        check_href(&form.href)?;
        let request = self
            .client
            .get(&form.href)
            .header(ACCEPT, form.content_type.as_str());
        let response = self.send(&form.href, request).await?;
        self.decode(&form.href, response).await
    }

    #[tracing::instrument(skip(self, form, value), fields(href = %form.href))]
    async fn write_property(&self, form: &Form, value: Value) -> Result<(), WotError> {
        check_href(&form.href)?;
        let content = self.codecs.encode(&form.content_type, &value)?;
        let request = self
            .client
            .put(&form.href)
            .header(CONTENT_TYPE, content.media_type.as_str())
            .body(content.as_bytes().to_vec());
        self.send(&form.href, request).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, form, input), fields(href = %form.href))]
    async fn invoke_action(&self, form: &Form, input: Value) -> Result<Value, WotError> {
        check_href(&form.href)?;
        let content = self.codecs.encode(&form.content_type, &input)?;
        let request = self
            .client
            .post(&form.href)
            .header(CONTENT_TYPE, content.media_type.as_str())
            .header(ACCEPT, content.media_type.as_str())
            .body(content.as_bytes().to_vec());
        let response = self.send(&form.href, request).await?;
        self.decode(&form.href, response).await
    }

    /// Opens the event stream before returning, so a refused subscription
    /// fails here rather than silently in the background.
    #[tracing::instrument(skip(self, form, sink), fields(href = %form.href))]
    async fn subscribe(
        &self,
        form: &Form,
        sink: mpsc::UnboundedSender<Value>,
    ) -> Result<ClientSubscription, WotError> {
        check_href(&form.href)?;
        let media_type = normalize_media_type(&form.content_type);
        let request = self
            .client
            .get(&form.href)
            .header(ACCEPT, "text/event-stream")
            .query(&[("contentType", media_type.as_str())]);
        let response = self.send(&form.href, request).await?;

        let codecs = Arc::clone(&self.codecs);
        let href = form.href.clone();
        let task = tokio::spawn(async move {
            let mut body = response.bytes_stream();
            let mut decoder = SseDecoder::default();
            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(error) => {
                        tracing::warn!(%href, %error, "event stream interrupted");
                        break;
                    }
                };
                for data in decoder.push(&chunk) {
                    match codecs.decode(&media_type, data.as_bytes()) {
                        Ok(value) => {
                            if sink.send(value).is_err() {
                                return;
                            }
                        }
                        Err(error) => {
                            tracing::warn!(%href, %error, "dropping undecodable event");
                        }
                    }
                }
            }
            tracing::debug!(%href, "event stream closed");
        });

        Ok(ClientSubscription::new(move || task.abort()))
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_description(&self, url: &str) -> Result<ThingDescription, WotError> {
        check_href(url)?;
        let request = self.client.get(url).header(ACCEPT, DEFAULT_CONTENT_TYPE);
        let response = self.send(url, request).await?;
        let body = response
            .bytes()
            .await
            .map_err(|source| HttpBindingError::request(url, source))?;
        serde_json::from_slice(&body).map_err(|source| WotError::Decode {
            media_type: "application/td+json".to_string(),
            source: Box::new(source),
        })
    }
}

/// Incremental `text/event-stream` parser yielding the data of each event.
///
/// Multiple `data:` lines of one event are joined with `\n`; comments and
/// other fields are ignored.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(end) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=end).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                if !self.data.is_empty() {
                    events.push(self.data.join("\n"));
                    self.data.clear();
                }
            } else if let Some(value) = line.strip_prefix("data:") {
                self.data
                    .push(value.strip_prefix(' ').unwrap_or(value).to_string());
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_decode_single_event() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(b"event: property_change\ndata: 21.5\n\n");
        assert_eq!(events, vec!["21.5".to_string()]);
    }

    #[test]
    fn should_join_multiline_data() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(b"data: {\ndata: \"a\": 1}\n\n");
        assert_eq!(events, vec!["{\n\"a\": 1}".to_string()]);
    }

    #[test]
    fn should_buffer_events_split_across_chunks() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: tr").is_empty());
        assert!(decoder.push(b"ue\n").is_empty());
        assert_eq!(decoder.push(b"\n"), vec!["true".to_string()]);
    }

    #[test]
    fn should_ignore_comments_and_crlf() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(b":keep-alive\r\n\r\ndata: 1\r\n\r\n");
        assert_eq!(events, vec!["1".to_string()]);
    }

    #[test]
    fn should_reject_non_http_href() {
        assert!(check_href("mqtt://broker/lamp").is_err());
        assert!(check_href("https://hub/things/lamp").is_ok());
    }
}
