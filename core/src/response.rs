//! Turns an inbound `HttpResponse` (or the lack of one) into an endpoint
//! response.
//!
//! # Design
//! The caller registers the status codes it expects, each as success or
//! error and optionally with a content type to deserialize into. A status
//! code nobody registered is classified by the usual 2xx rule and its body is
//! left raw. Nothing here fails for an unexpected status; only a body that
//! does not parse as its registered type is an error.

use std::any::type_name;
use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

use crate::endpoint::{
    BinaryEndpointResponse, ContentMetadata, ContentObject, EndpointResponse, EndpointResult,
    StreamBinaryEndpointResponse, StreamingEndpointResponse, TypedEndpointResponse,
};
use crate::error::{DeserializationError, Result};
use crate::http::HttpResponse;
use crate::serializer::{deserialize_stream, ContractSerializer, ContractSerializerExt};

type Deserializer = fn(&dyn ContractSerializer, &str) -> serde_json::Result<Option<ContentObject>>;

#[derive(Debug, Clone, Copy)]
struct Registration {
    is_success: bool,
    deserializer: Option<Deserializer>,
    target_type: &'static str,
}

fn deserialize_as<T>(serializer: &dyn ContractSerializer, text: &str) -> serde_json::Result<Option<ContentObject>>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    Ok(serializer.deserialize::<T>(text)?.map(ContentObject::typed))
}

/// Classifies and parses one response. Single use: every `build_*` method
/// consumes the builder, except the borrowing
/// [`build_streaming_response`](Self::build_streaming_response).
#[derive(Debug)]
pub struct ResponseBuilder {
    response: Option<HttpResponse>,
    serializer: Arc<dyn ContractSerializer>,
    registrations: HashMap<StatusCode, Registration>,
}

impl ResponseBuilder {
    pub fn new(response: Option<HttpResponse>, serializer: Arc<dyn ContractSerializer>) -> Self {
        Self {
            response,
            serializer,
            registrations: HashMap::new(),
        }
    }

    /// Treat `status` as success and keep its body raw.
    pub fn add_success_response(self, status: StatusCode) -> Self {
        self.register(status, true, None, "raw")
    }

    /// Treat `status` as an error and keep its body raw.
    pub fn add_error_response(self, status: StatusCode) -> Self {
        self.register(status, false, None, "raw")
    }

    /// Treat `status` as success and deserialize its body into `T`.
    pub fn add_success_response_as<T>(self, status: StatusCode) -> Self
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.register(status, true, Some(deserialize_as::<T>), type_name::<T>())
    }

    /// Treat `status` as an error and deserialize its body into `T`.
    pub fn add_error_response_as<T>(self, status: StatusCode) -> Self
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.register(status, false, Some(deserialize_as::<T>), type_name::<T>())
    }

    fn register(
        mut self,
        status: StatusCode,
        is_success: bool,
        deserializer: Option<Deserializer>,
        target_type: &'static str,
    ) -> Self {
        self.registrations.insert(
            status,
            Registration {
                is_success,
                deserializer,
                target_type,
            },
        );
        self
    }

    /// Classify and parse the response.
    ///
    /// JSON, text and untyped bodies are read as text; anything else is read
    /// as bytes and never deserialized. A missing response yields
    /// `500 Internal Server Error`, not success, with empty content.
    pub async fn build_response(self) -> Result<EndpointResponse> {
        let Some(response) = self.response else {
            tracing::debug!("no response, using internal server error");
            return Ok(EndpointResponse::no_response());
        };
        let status = response.status;
        let registration = self.registrations.get(&status).copied();
        let is_success = classify(&self.registrations, status);
        let headers = merge_headers(&response);
        tracing::debug!(%status, is_success, registered = registration.is_some(), "classified response");

        if !reads_as_text(response.media_type()) {
            let bytes = response.body.bytes().await?;
            let content_object = if bytes.is_empty() {
                ContentObject::Empty
            } else {
                ContentObject::Binary(bytes)
            };
            return Ok(EndpointResponse::new(is_success, status, String::new(), content_object, headers));
        }

        let text = response.body.text().await?;
        let content_object = match registration {
            _ if text.trim().is_empty() => ContentObject::Empty,
            Some(Registration {
                deserializer: Some(deserialize),
                target_type,
                ..
            }) => match deserialize(self.serializer.as_ref(), &text) {
                Ok(content) => content.unwrap_or(ContentObject::Empty),
                Err(source) => {
                    tracing::warn!(%status, target_type, error = %source, "response content did not deserialize");
                    return Err(DeserializationError {
                        status,
                        raw_content: text,
                        target_type,
                        source,
                    }
                    .into());
                }
            },
            _ => ContentObject::Text(text.clone()),
        };
        Ok(EndpointResponse::new(is_success, status, text, content_object, headers))
    }

    /// [`build_response`](Self::build_response), then map the result.
    pub async fn build_response_with<R, F>(self, factory: F) -> Result<R>
    where
        F: FnOnce(EndpointResponse) -> R,
    {
        Ok(factory(self.build_response().await?))
    }

    pub async fn build_typed_response<S>(self) -> Result<TypedEndpointResponse<S>>
    where
        S: Send + Sync + 'static,
    {
        Ok(TypedEndpointResponse::new(self.build_response().await?))
    }

    pub async fn build_result<S, E>(self) -> Result<EndpointResult<S, E>>
    where
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        Ok(EndpointResult::new(self.build_response().await?))
    }

    /// Read a download into memory. A failed response carries its body text as
    /// `error_content` instead.
    pub async fn build_binary_response(self) -> Result<BinaryEndpointResponse> {
        let Some(response) = self.response else {
            return Ok(BinaryEndpointResponse::failure(StatusCode::INTERNAL_SERVER_ERROR, None));
        };
        let status = response.status;
        if !classify(&self.registrations, status) {
            let error_content = response.body.text().await?;
            return Ok(BinaryEndpointResponse::failure(status, Some(error_content)));
        }
        let mut metadata = ContentMetadata::from_headers(&response.content_headers);
        let content = response.body.bytes().await?;
        metadata.content_length = metadata.content_length.or(Some(content.len() as u64));
        Ok(BinaryEndpointResponse::success(status, content, metadata))
    }

    /// Like [`build_binary_response`](Self::build_binary_response) but leaves
    /// a successful body unread.
    pub async fn build_stream_binary_response(self) -> Result<StreamBinaryEndpointResponse> {
        let Some(response) = self.response else {
            return Ok(StreamBinaryEndpointResponse::failure(StatusCode::INTERNAL_SERVER_ERROR, None));
        };
        let status = response.status;
        if !classify(&self.registrations, status) {
            let error_content = response.body.text().await?;
            return Ok(StreamBinaryEndpointResponse::failure(status, Some(error_content)));
        }
        let metadata = ContentMetadata::from_headers(&response.content_headers);
        Ok(StreamBinaryEndpointResponse::success(status, response.body, metadata))
    }

    /// Deserialize a JSON array body item by item.
    ///
    /// The stream borrows the builder, which keeps the response alive until
    /// enumeration ends. A missing or failed response yields no items.
    pub fn build_streaming_response<T>(&mut self) -> BoxStream<'_, Result<Option<T>>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let serializer = Arc::clone(&self.serializer);
        match self.response.as_mut() {
            Some(response) if classify(&self.registrations, response.status) => {
                deserialize_stream(serializer, response.body.chunks())
            }
            _ => stream::empty().boxed(),
        }
    }

    /// Deserialize a JSON array body item by item into a wrapper that owns
    /// the response body.
    pub async fn build_streaming_endpoint_response<T>(self) -> Result<StreamingEndpointResponse<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let Some(response) = self.response else {
            return Ok(StreamingEndpointResponse::failure(StatusCode::INTERNAL_SERVER_ERROR, None));
        };
        let status = response.status;
        if !classify(&self.registrations, status) {
            let error_content = response.body.text().await?;
            return Ok(StreamingEndpointResponse::failure(status, Some(error_content)));
        }
        let items = deserialize_stream(self.serializer, response.body.into_stream());
        Ok(StreamingEndpointResponse::success(status, items))
    }
}

fn classify(registrations: &HashMap<StatusCode, Registration>, status: StatusCode) -> bool {
    registrations
        .get(&status)
        .map_or(status.is_success(), |registration| registration.is_success)
}

fn reads_as_text(media_type: Option<&str>) -> bool {
    match media_type {
        None => true,
        Some(media_type) => {
            let media_type = media_type.to_ascii_lowercase();
            media_type.contains("json") || media_type.contains("text")
        }
    }
}

/// Response headers overlaid with content headers.
fn merge_headers(response: &HttpResponse) -> HeaderMap {
    let mut headers = response.headers.clone();
    for name in response.content_headers.keys() {
        headers.remove(name);
        for value in response.content_headers.get_all(name) {
            headers.append(name.clone(), value.clone());
        }
    }
    headers
}
