//! HTTP message types for the host-does-IO pattern.
//!
//! # Design
//! Requests and responses are described as plain data. The builders produce
//! `HttpRequest` values and consume `HttpResponse` values without touching the
//! network; a [`Transport`](crate::transport::Transport) executes the actual
//! round-trip. Bodies may be fully buffered or a live byte stream, so large
//! uploads and downloads never have to be held in memory.
//!
//! Response headers are kept in two maps, response-level and content-level,
//! mirroring how servers describe the message and its entity separately.

use std::fmt;
use std::io;

use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use futures::Stream;
use http::{HeaderMap, HeaderValue, Method, StatusCode};

use crate::multipart::MultipartForm;

/// A stream of body chunks.
pub type ByteStream<'a> = BoxStream<'a, io::Result<Bytes>>;

/// How eagerly a transport should read the response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompletionOption {
    /// Buffer the whole body before the response is handed back.
    #[default]
    ResponseContentRead,
    /// Hand the response back as soon as headers arrive; stream the body.
    ResponseHeadersRead,
}

/// Byte content of a request part or body: buffered, or streamed.
pub struct Payload {
    inner: PayloadInner,
}

enum PayloadInner {
    Bytes(Bytes),
    Stream(ByteStream<'static>),
}

impl Payload {
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self {
            inner: PayloadInner::Stream(stream.boxed()),
        }
    }

    /// The buffered bytes, or `None` for a streamed payload.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match &self.inner {
            PayloadInner::Bytes(bytes) => Some(bytes),
            PayloadInner::Stream(_) => None,
        }
    }

    pub fn into_stream(self) -> ByteStream<'static> {
        match self.inner {
            PayloadInner::Bytes(bytes) => stream::once(async move { Ok(bytes) }).boxed(),
            PayloadInner::Stream(stream) => stream,
        }
    }

    /// Read the whole payload into memory.
    pub async fn collect(self) -> io::Result<Bytes> {
        match self.inner {
            PayloadInner::Bytes(bytes) => Ok(bytes),
            PayloadInner::Stream(stream) => concat(stream).await,
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            PayloadInner::Bytes(bytes) => f.debug_tuple("Payload").field(&bytes.len()).finish(),
            PayloadInner::Stream(_) => f.write_str("Payload(<stream>)"),
        }
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Self {
            inner: PayloadInner::Bytes(bytes),
        }
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Bytes::from(bytes).into()
    }
}

impl From<&'static [u8]> for Payload {
    fn from(bytes: &'static [u8]) -> Self {
        Bytes::from_static(bytes).into()
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Bytes::from(text).into()
    }
}

impl From<&'static str> for Payload {
    fn from(text: &'static str) -> Self {
        Bytes::from_static(text.as_bytes()).into()
    }
}

/// The single body representation selected by `RequestBuilder::build`.
#[derive(Debug)]
pub enum RequestBody {
    Json(String),
    Binary { content: Payload, content_type: String },
    Multipart(MultipartForm),
}

impl RequestBody {
    pub fn content_type(&self) -> String {
        match self {
            RequestBody::Json(_) => "application/json".to_string(),
            RequestBody::Binary { content_type, .. } => content_type.clone(),
            RequestBody::Multipart(form) => form.content_type(),
        }
    }

    pub fn into_payload(self) -> Payload {
        match self {
            RequestBody::Json(text) => Payload::from(text),
            RequestBody::Binary { content, .. } => content,
            RequestBody::Multipart(form) => form.into_payload(),
        }
    }
}

/// An HTTP request described as plain data.
///
/// `uri` is the expanded path template; it may be relative, in which case the
/// client resolves it against its base address.
#[derive(Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub uri: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    pub completion: CompletionOption,
}

impl HttpRequest {
    /// First header value with the given name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Set a header, replacing any existing value with the same name.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        set_header(&mut self.headers, name.into(), value.into());
    }
}

pub(crate) fn set_header(headers: &mut Vec<(String, String)>, name: String, value: String) {
    match headers.iter_mut().find(|(key, _)| key.eq_ignore_ascii_case(&name)) {
        Some(entry) => *entry = (name, value),
        None => headers.push((name, value)),
    }
}

/// Body of an inbound response.
pub struct ResponseBody {
    inner: PayloadInner,
}

impl ResponseBody {
    pub fn empty() -> Self {
        Bytes::new().into()
    }

    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self {
            inner: PayloadInner::Stream(stream.boxed()),
        }
    }

    pub fn is_buffered(&self) -> bool {
        matches!(self.inner, PayloadInner::Bytes(_))
    }

    pub async fn bytes(self) -> io::Result<Bytes> {
        match self.inner {
            PayloadInner::Bytes(bytes) => Ok(bytes),
            PayloadInner::Stream(stream) => concat(stream).await,
        }
    }

    /// Read the body as UTF-8 text, replacing invalid sequences.
    pub async fn text(self) -> io::Result<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn into_stream(self) -> ByteStream<'static> {
        Payload { inner: self.inner }.into_stream()
    }

    /// Stream the body without giving up ownership of it.
    pub fn chunks(&mut self) -> ByteStream<'_> {
        match &mut self.inner {
            PayloadInner::Bytes(bytes) => {
                let bytes = std::mem::take(bytes);
                stream::iter((!bytes.is_empty()).then_some(Ok(bytes))).boxed()
            }
            PayloadInner::Stream(stream) => stream.boxed(),
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            PayloadInner::Bytes(bytes) => f.debug_tuple("ResponseBody").field(&bytes.len()).finish(),
            PayloadInner::Stream(_) => f.write_str("ResponseBody(<stream>)"),
        }
    }
}

impl From<Bytes> for ResponseBody {
    fn from(bytes: Bytes) -> Self {
        Self {
            inner: PayloadInner::Bytes(bytes),
        }
    }
}

impl From<Vec<u8>> for ResponseBody {
    fn from(bytes: Vec<u8>) -> Self {
        Bytes::from(bytes).into()
    }
}

impl From<String> for ResponseBody {
    fn from(text: String) -> Self {
        Bytes::from(text).into()
    }
}

impl From<&'static str> for ResponseBody {
    fn from(text: &'static str) -> Self {
        Bytes::from_static(text.as_bytes()).into()
    }
}

/// An HTTP response described as plain data.
///
/// Produced by a transport (or by hand in tests) and consumed by
/// [`ResponseBuilder`](crate::response::ResponseBuilder).
#[derive(Debug)]
pub struct HttpResponse {
    pub status: StatusCode,
    /// Response-level headers.
    pub headers: HeaderMap,
    /// Entity headers describing the body (`content-type`, `content-length`,
    /// `content-disposition`, ...).
    pub content_headers: HeaderMap,
    pub body: ResponseBody,
}

impl HttpResponse {
    pub fn new(status: StatusCode, body: impl Into<ResponseBody>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            content_headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Attach a content type to the body.
    pub fn with_content_type(mut self, content_type: &'static str) -> Self {
        self.content_headers
            .insert(http::header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        self
    }

    /// The media type of the body without parameters, if declared.
    pub fn media_type(&self) -> Option<&str> {
        media_type(&self.content_headers)
    }
}

pub(crate) fn media_type(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(';').next().unwrap_or_default().trim())
}

async fn concat(stream: ByteStream<'_>) -> io::Result<Bytes> {
    let buffer = stream
        .try_fold(BytesMut::new(), |mut buffer, chunk| async move {
            buffer.extend_from_slice(&chunk);
            Ok(buffer)
        })
        .await?;
    Ok(buffer.freeze())
}
