//! Executing requests: the [`Transport`] that talks to the network and the
//! [`RequestHandler`] pipeline in front of it.
//!
//! # Design
//! The builders never do I/O. A `Transport` takes a finished `HttpRequest`
//! with an absolute URI and returns an `HttpResponse`; handlers see every
//! request first and decide whether (and how) to pass it on through
//! [`Next`]. Swapping the transport is how tests run without a network.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use reqwest::multipart::{Form, Part};
use reqwest::RequestBuilder;

use crate::error::{RestClientError, Result};
use crate::http::{CompletionOption, HttpRequest, HttpResponse, Payload, RequestBody, ResponseBody};
use crate::multipart::MultipartForm;

/// Sends one request over the wire.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// One stage of the request pipeline.
#[async_trait]
pub trait RequestHandler: Send + Sync + fmt::Debug {
    /// Inspect or modify the request, then usually call `next.run(request)`.
    async fn handle(&self, request: HttpRequest, next: Next<'_>) -> Result<HttpResponse>;
}

/// The rest of the pipeline after the current handler.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    handlers: &'a [Arc<dyn RequestHandler>],
    transport: &'a dyn Transport,
}

impl<'a> Next<'a> {
    pub fn new(handlers: &'a [Arc<dyn RequestHandler>], transport: &'a dyn Transport) -> Self {
        Self { handlers, transport }
    }

    pub async fn run(self, request: HttpRequest) -> Result<HttpResponse> {
        match self.handlers.split_first() {
            Some((handler, rest)) => handler.handle(request, Next::new(rest, self.transport)).await,
            None => self.transport.send(request).await,
        }
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("handlers", &self.handlers.len())
            .field("transport", &self.transport)
            .finish()
    }
}

/// [`Transport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl ReqwestTransport {
    /// Translate the plain-data request into a `reqwest` request.
    ///
    /// Multipart bodies are encoded by `reqwest`, which also sets their
    /// content type. Other bodies get their default content type unless the
    /// caller already set one.
    fn prepare(
        &self,
        method: Method,
        uri: &str,
        headers: &[(String, String)],
        body: Option<RequestBody>,
    ) -> Result<RequestBuilder> {
        let multipart = matches!(body, Some(RequestBody::Multipart(_)));
        let mut has_content_type = false;
        let mut builder = self.client.request(method, uri);
        for (name, value) in headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|_| RestClientError::InvalidHeader(name.clone()))?;
            let header_value = HeaderValue::from_str(value).map_err(|_| RestClientError::InvalidHeader(name.clone()))?;
            if header_name == header::CONTENT_TYPE {
                if multipart {
                    continue;
                }
                has_content_type = true;
            }
            builder = builder.header(header_name, header_value);
        }
        Ok(match body {
            None => builder,
            Some(RequestBody::Multipart(form)) => builder.multipart(multipart_form(form)?),
            Some(body) => {
                if !has_content_type {
                    builder = builder.header(header::CONTENT_TYPE, body.content_type());
                }
                builder.body(reqwest_body(body.into_payload()))
            }
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let HttpRequest {
            method,
            uri,
            headers,
            body,
            completion,
        } = request;
        tracing::debug!(%method, %uri, ?completion, "sending request");

        let response = self.prepare(method, &uri, &headers, body)?.send().await?;
        let status = response.status();
        let (headers, content_headers) = split_headers(response.headers());
        tracing::debug!(%status, %uri, "received response");

        let body = match completion {
            CompletionOption::ResponseContentRead => ResponseBody::from(response.bytes().await?),
            CompletionOption::ResponseHeadersRead => {
                ResponseBody::from_stream(response.bytes_stream().map(|chunk| chunk.map_err(io::Error::other)))
            }
        };
        Ok(HttpResponse {
            status,
            headers,
            content_headers,
            body,
        })
    }
}

fn reqwest_body(payload: Payload) -> reqwest::Body {
    match payload.as_bytes() {
        Some(bytes) => reqwest::Body::from(bytes.clone()),
        None => reqwest::Body::wrap_stream(payload.into_stream()),
    }
}

fn multipart_form(form: MultipartForm) -> Result<Form> {
    let (fields, files) = form.into_parts();
    let mut multipart = Form::new();
    for (name, value) in fields {
        multipart = multipart.text(name, value);
    }
    for file in files {
        let mut part = Part::stream(reqwest_body(file.content)).file_name(file.file_name);
        if let Some(content_type) = &file.content_type {
            part = part.mime_str(content_type)?;
        }
        multipart = multipart.part(file.name, part);
    }
    Ok(multipart)
}

fn is_content_header(name: &HeaderName) -> bool {
    [
        header::ALLOW,
        header::CONTENT_DISPOSITION,
        header::CONTENT_ENCODING,
        header::CONTENT_LANGUAGE,
        header::CONTENT_LENGTH,
        header::CONTENT_LOCATION,
        header::CONTENT_RANGE,
        header::CONTENT_TYPE,
        header::EXPIRES,
        header::LAST_MODIFIED,
    ]
    .contains(name)
        || name.as_str() == "content-md5"
}

/// Separate entity headers from response headers.
fn split_headers(all: &HeaderMap) -> (HeaderMap, HeaderMap) {
    let mut headers = HeaderMap::new();
    let mut content_headers = HeaderMap::new();
    for (name, value) in all {
        let target = if is_content_header(name) {
            &mut content_headers
        } else {
            &mut headers
        };
        target.append(name.clone(), value.clone());
    }
    (headers, content_headers)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use http::{HeaderValue, Method, StatusCode};

    use super::*;

    #[derive(Debug, Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for Recorder {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
            self.seen.lock().unwrap().push(format!("transport {}", request.uri));
            Ok(HttpResponse::new(StatusCode::OK, "done"))
        }
    }

    #[derive(Debug)]
    struct Tag(&'static str);

    #[async_trait]
    impl RequestHandler for Tag {
        async fn handle(&self, mut request: HttpRequest, next: Next<'_>) -> Result<HttpResponse> {
            request.uri.push_str(self.0);
            next.run(request).await
        }
    }

    #[derive(Debug)]
    struct ShortCircuit;

    #[async_trait]
    impl RequestHandler for ShortCircuit {
        async fn handle(&self, _request: HttpRequest, _next: Next<'_>) -> Result<HttpResponse> {
            Ok(HttpResponse::new(StatusCode::UNAUTHORIZED, ""))
        }
    }

    fn request() -> HttpRequest {
        HttpRequest {
            method: Method::GET,
            uri: "http://localhost/api".to_string(),
            headers: Vec::new(),
            body: None,
            completion: CompletionOption::default(),
        }
    }

    #[tokio::test]
    async fn handlers_run_in_order_before_transport() {
        let transport = Recorder::default();
        let handlers: Vec<Arc<dyn RequestHandler>> = vec![Arc::new(Tag("/a")), Arc::new(Tag("/b"))];
        let response = Next::new(&handlers, &transport).run(request()).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(*transport.seen.lock().unwrap(), vec!["transport http://localhost/api/a/b".to_string()]);
    }

    #[tokio::test]
    async fn handler_may_answer_without_transport() {
        let transport = Recorder::default();
        let handlers: Vec<Arc<dyn RequestHandler>> = vec![Arc::new(ShortCircuit), Arc::new(Tag("/never"))];
        let response = Next::new(&handlers, &transport).run(request()).await.unwrap();
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert!(transport.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn splits_entity_headers() {
        let mut all = HeaderMap::new();
        all.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        all.insert(header::CONTENT_LENGTH, HeaderValue::from_static("2"));
        all.insert("content-md5", HeaderValue::from_static("abc"));
        all.insert(header::DATE, HeaderValue::from_static("Thu, 01 Jan 2026 00:00:00 GMT"));
        all.append(header::SET_COOKIE, HeaderValue::from_static("a=1"));
        all.append(header::SET_COOKIE, HeaderValue::from_static("b=2"));

        let (headers, content_headers) = split_headers(&all);
        assert_eq!(content_headers.len(), 3);
        assert!(headers.contains_key(header::DATE));
        assert_eq!(headers.get_all(header::SET_COOKIE).iter().count(), 2);
        assert!(!headers.contains_key(header::CONTENT_TYPE));
    }

    fn transport() -> ReqwestTransport {
        ReqwestTransport::with_client(reqwest::Client::new())
    }

    fn header_pairs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(name, value)| (name.to_string(), value.to_string())).collect()
    }

    #[test]
    fn body_gets_default_content_type() {
        let body = RequestBody::Json("{}".to_string());
        let request = transport()
            .prepare(Method::POST, "http://localhost/api", &[], Some(body))
            .unwrap()
            .build()
            .unwrap();
        let types: Vec<_> = request.headers().get_all(header::CONTENT_TYPE).iter().collect();
        assert_eq!(types, ["application/json"]);
    }

    #[test]
    fn caller_content_type_is_not_duplicated() {
        let body = RequestBody::Json("{}".to_string());
        let headers = header_pairs(&[("Content-Type", "application/merge-patch+json")]);
        let request = transport()
            .prepare(Method::PATCH, "http://localhost/api", &headers, Some(body))
            .unwrap()
            .build()
            .unwrap();
        let types: Vec<_> = request.headers().get_all(header::CONTENT_TYPE).iter().collect();
        assert_eq!(types, ["application/merge-patch+json"]);
    }

    #[test]
    fn multipart_content_type_comes_from_the_encoder() {
        let mut form = MultipartForm::new();
        form.add_field("title", "report");
        let headers = header_pairs(&[("content-type", "text/plain")]);
        let request = transport()
            .prepare(Method::POST, "http://localhost/api", &headers, Some(RequestBody::Multipart(form)))
            .unwrap()
            .build()
            .unwrap();
        let types: Vec<_> = request.headers().get_all(header::CONTENT_TYPE).iter().collect();
        assert_eq!(types.len(), 1);
        assert!(types[0].to_str().unwrap().starts_with("multipart/form-data; boundary="));
    }

    #[test]
    fn invalid_header_is_rejected_before_sending() {
        let headers = header_pairs(&[("x-trace", "a\nb")]);
        let err = transport()
            .prepare(Method::GET, "http://localhost/api", &headers, None)
            .unwrap_err();
        assert!(matches!(err, RestClientError::InvalidHeader(ref name) if name == "x-trace"));
    }

    #[test]
    fn transport_builds_with_timeout() {
        assert!(ReqwestTransport::new(Duration::from_secs(5)).is_ok());
    }
}
