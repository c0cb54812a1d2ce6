use std::fmt;
use std::io;
use std::pin::Pin;
use std::time::Duration;

use async_stream::stream;
use bytes::BytesMut;
use futures::{Stream, StreamExt, TryStreamExt};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use tokio_util::codec::{Decoder, FramedRead};
use tokio_util::io::StreamReader;

use crate::errors::{AdapterError, AdapterResult};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// How a provider expects its credential.
#[derive(Clone, PartialEq)]
pub enum Auth {
    None,
    Bearer(String),
    Header { name: String, value: String },
    QueryKey { name: String, value: String },
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::None => write!(f, "None"),
            Auth::Bearer(_) => write!(f, "Bearer(***)"),
            Auth::Header { name, .. } => write!(f, "Header({}: ***)", name),
            Auth::QueryKey { name, .. } => write!(f, "QueryKey({}=***)", name),
        }
    }
}

impl Auth {
    fn apply(&self, builder: RequestBuilder) -> RequestBuilder {
        match self {
            Auth::None => builder,
            Auth::Bearer(token) => builder.bearer_auth(token),
            Auth::Header { name, value } => builder.header(name.as_str(), value.as_str()),
            Auth::QueryKey { name, value } => builder.query(&[(name.as_str(), value.as_str())]),
        }
    }
}

/// A single POST with a JSON body.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub auth: Auth,
    pub headers: Vec<(String, String)>,
    pub body: Value,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn post<S: Into<String>>(url: S, body: Value) -> Self {
        HttpRequest {
            url: url.into(),
            auth: Auth::None,
            headers: Vec::new(),
            body,
            timeout: None,
        }
    }

    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_headers(mut self, headers: &[(String, String)]) -> Self {
        self.headers.extend_from_slice(headers);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Raw lines of an open response body, consumed incrementally.
/// Dropping it releases the connection.
pub type LineStream = Pin<Box<dyn Stream<Item = AdapterResult<String>> + Send>>;

/// Shared HTTP client. Cloning shares the connection pool.
///
/// It never retries and never touches adapter state; a non-2xx status
/// becomes [`AdapterError::Provider`] and anything that prevented a
/// response becomes [`AdapterError::Transport`].
#[derive(Debug, Clone)]
pub struct TransportClient {
    client: Client,
    timeout: Duration,
}

impl TransportClient {
    pub fn new(timeout: Duration) -> AdapterResult<Self> {
        let client = Client::builder().connect_timeout(timeout).build()?;
        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn build(&self, request: &HttpRequest) -> RequestBuilder {
        let mut builder = self.client.post(&request.url).json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        request.auth.apply(builder)
    }

    /// Send the request and parse the whole body as JSON.
    pub async fn execute(&self, request: HttpRequest) -> AdapterResult<Value> {
        let timeout = request.timeout.unwrap_or(self.timeout);
        tracing::debug!(url = %redact_query(&request.url), "sending request");

        let response = self.build(&request).timeout(timeout).send().await?;
        let status = response.status();
        let body = response.text().await?;

        match status {
            status if status.is_success() => serde_json::from_str(&body).map_err(|e| {
                AdapterError::Decode(format!("Response body is not valid JSON: {}", e))
            }),
            status => Err(provider_error(status, body)),
        }
    }

    /// Send the request and hand back the body as a line stream once the
    /// status is known to be successful.
    pub async fn execute_stream(&self, request: HttpRequest) -> AdapterResult<LineStream> {
        let timeout = request.timeout.unwrap_or(self.timeout);
        tracing::debug!(url = %redact_query(&request.url), "opening stream");

        let response = tokio::time::timeout(timeout, self.build(&request).send())
            .await
            .map_err(|_| AdapterError::timeout("Timed out waiting for response headers"))??;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(provider_error(status, body));
        }

        let body = response
            .bytes_stream()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e));
        let lines = FramedRead::new(StreamReader::new(body), LineDecoder::default());

        let stream = stream! {
            futures::pin_mut!(lines);
            loop {
                match tokio::time::timeout(timeout, lines.next()).await {
                    Err(_) => {
                        yield Err(AdapterError::timeout("Timed out waiting for stream data"));
                        break;
                    }
                    Ok(None) => break,
                    Ok(Some(Ok(line))) => yield Ok(line),
                    Ok(Some(Err(e))) => {
                        yield Err(AdapterError::from(e));
                        break;
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }
}

fn provider_error(status: StatusCode, raw_body: String) -> AdapterError {
    match status {
        StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => {
            tracing::warn!(status = status.as_u16(), "provider temporarily unavailable")
        }
        _ => tracing::error!(status = status.as_u16(), body = %raw_body, "request failed"),
    }
    AdapterError::Provider {
        status_code: status.as_u16(),
        raw_body,
    }
}

fn redact_query(url: &str) -> &str {
    url.split_once('?').map(|(base, _)| base).unwrap_or(url)
}

/// Splits a byte stream on `\n`. Invalid UTF-8 is replaced rather than
/// failing, so one corrupt line cannot end a stream.
#[derive(Debug, Default)]
pub struct LineDecoder {
    next_index: usize,
}

fn to_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

impl Decoder for LineDecoder {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        match buf[self.next_index..].iter().position(|b| *b == b'\n') {
            Some(offset) => {
                let end = self.next_index + offset;
                self.next_index = 0;
                let line = buf.split_to(end + 1);
                Ok(Some(to_line(&line[..end])))
            }
            None => {
                self.next_index = buf.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if buf.is_empty() {
            Ok(None)
        } else {
            let rest = buf.split_to(buf.len());
            Ok(Some(to_line(&rest)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_line_decoder() -> io::Result<()> {
        let mut decoder = LineDecoder::default();
        let mut buf = BytesMut::from(&b"data: a\r\ndata: b"[..]);

        assert_eq!(decoder.decode(&mut buf)?, Some("data: a".to_string()));
        assert_eq!(decoder.decode(&mut buf)?, None);

        buf.extend_from_slice(b"c\n\xff\xfe\n");
        assert_eq!(decoder.decode(&mut buf)?, Some("data: bc".to_string()));
        assert_eq!(decoder.decode(&mut buf)?, Some("\u{fffd}\u{fffd}".to_string()));

        buf.extend_from_slice(b"tail");
        assert_eq!(decoder.decode_eof(&mut buf)?, Some("tail".to_string()));
        assert_eq!(decoder.decode_eof(&mut buf)?, None);
        Ok(())
    }

    #[test]
    fn test_auth_debug_redacts() {
        let auth = Auth::Bearer("sk-secret".to_string());
        assert_eq!(format!("{:?}", auth), "Bearer(***)");
        let auth = Auth::Header {
            name: "x-api-key".to_string(),
            value: "sk-secret".to_string(),
        };
        assert!(!format!("{:?}", auth).contains("sk-secret"));
    }

    #[tokio::test]
    async fn test_execute_applies_auth() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat"))
            .and(header("authorization", "Bearer test-key"))
            .and(header("x-extra", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/keyed"))
            .and(query_param("key", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"keyed": true})))
            .mount(&server)
            .await;

        let transport = TransportClient::new(Duration::from_secs(5))?;
        let request = HttpRequest::post(format!("{}/v1/chat", server.uri()), json!({}))
            .with_auth(Auth::Bearer("test-key".to_string()))
            .with_headers(&[("x-extra".to_string(), "1".to_string())]);
        assert_eq!(transport.execute(request).await?, json!({"ok": true}));

        let request = HttpRequest::post(format!("{}/v1/keyed", server.uri()), json!({}))
            .with_auth(Auth::QueryKey {
                name: "key".to_string(),
                value: "abc".to_string(),
            });
        assert_eq!(transport.execute(request).await?, json!({"keyed": true}));
        Ok(())
    }

    #[tokio::test]
    async fn test_non_success_is_provider_error() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such model"))
            .mount(&server)
            .await;

        let transport = TransportClient::new(Duration::from_secs(5))?;
        let err = transport
            .execute(HttpRequest::post(server.uri(), json!({})))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AdapterError::Provider {
                status_code: 404,
                raw_body: "no such model".to_string()
            }
        );

        let err = transport
            .execute_stream(HttpRequest::post(server.uri(), json!({})))
            .await
            .err()
            .unwrap();
        assert_eq!(err.status_code(), Some(404));
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_json_is_decode_error() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let transport = TransportClient::new(Duration::from_secs(5))?;
        let err = transport
            .execute(HttpRequest::post(server.uri(), json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Decode(_)));
        Ok(())
    }

    #[tokio::test]
    async fn test_timeout_is_flagged() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let transport = TransportClient::new(Duration::from_secs(5))?;
        let request =
            HttpRequest::post(server.uri(), json!({})).with_timeout(Duration::from_millis(50));
        let err = transport.execute(request.clone()).await.unwrap_err();
        assert!(err.is_timeout(), "expected timeout, got {:?}", err);

        let err = transport.execute_stream(request).await.err().unwrap();
        assert!(err.is_timeout(), "expected timeout, got {:?}", err);
        Ok(())
    }

    #[tokio::test]
    async fn test_stream_lines() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("data: one\n\ndata: two\r\npartial", "text/event-stream"),
            )
            .mount(&server)
            .await;

        let transport = TransportClient::new(Duration::from_secs(5))?;
        let lines: Vec<String> = transport
            .execute_stream(HttpRequest::post(server.uri(), json!({})))
            .await?
            .try_collect()
            .await?;
        assert_eq!(lines, vec!["data: one", "", "data: two", "partial"]);
        Ok(())
    }
}
