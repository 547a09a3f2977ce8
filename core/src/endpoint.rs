//! Response wrappers produced by [`ResponseBuilder`](crate::response::ResponseBuilder).
//!
//! # Design
//! Parsed content is held in a [`ContentObject`], a tagged union instead of a
//! type-erased object. Typed wrappers narrow it once, when they are built, so
//! reading `success_content()` or `error_content()` can never fail. Content of
//! any other type (say the text of an unregistered `500`) narrows to `None`
//! and stays readable through `content_object()`.
//!
//! Binary and streaming wrappers own the response body. Dropping them (or
//! calling `close`) releases the underlying connection.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::ops::Deref;

use bytes::Bytes;
use futures::stream::BoxStream;
use http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH};
use http::{HeaderMap, StatusCode};

use crate::error::{ContentAccessError, Result};
use crate::http::{media_type, ResponseBody};

/// Content of a response after classification.
pub enum ContentObject {
    /// No body, a whitespace-only body, or a JSON `null`.
    Empty,
    /// Text that was not deserialized.
    Text(String),
    /// A non-text body.
    Binary(Bytes),
    /// The value produced by a registered deserializer.
    Typed {
        value: Box<dyn Any + Send + Sync>,
        type_name: &'static str,
    },
}

impl ContentObject {
    pub fn typed<T: Any + Send + Sync>(value: T) -> Self {
        ContentObject::Typed {
            value: Box::new(value),
            type_name: type_name::<T>(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ContentObject::Empty)
    }

    /// Runtime type of the held value, `"null"` when empty.
    pub fn type_name(&self) -> &'static str {
        match self {
            ContentObject::Empty => "null",
            ContentObject::Text(_) => type_name::<String>(),
            ContentObject::Binary(_) => type_name::<Bytes>(),
            ContentObject::Typed { type_name, .. } => type_name,
        }
    }

    /// Whether the held value is a `T`. Empty content holds every type.
    pub fn holds<T: Any>(&self) -> bool {
        match self {
            ContentObject::Empty => true,
            ContentObject::Text(_) => TypeId::of::<T>() == TypeId::of::<String>(),
            ContentObject::Binary(_) => TypeId::of::<T>() == TypeId::of::<Bytes>(),
            ContentObject::Typed { value, .. } => value.is::<T>(),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            ContentObject::Empty => None,
            ContentObject::Text(text) => (text as &dyn Any).downcast_ref(),
            ContentObject::Binary(bytes) => (bytes as &dyn Any).downcast_ref(),
            ContentObject::Typed { value, .. } => value.downcast_ref(),
        }
    }

    /// Move the value out as a `T`, or hand the content back unchanged.
    pub fn take<T: Any>(self) -> std::result::Result<Option<T>, Self> {
        if !self.holds::<T>() {
            return Err(self);
        }
        let boxed: Box<dyn Any> = match self {
            ContentObject::Empty => return Ok(None),
            ContentObject::Text(text) => Box::new(text),
            ContentObject::Binary(bytes) => Box::new(bytes),
            ContentObject::Typed { value, .. } => value,
        };
        Ok(boxed.downcast::<T>().ok().map(|value| *value))
    }
}

impl fmt::Debug for ContentObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentObject::Empty => f.write_str("Empty"),
            ContentObject::Text(text) => f.debug_tuple("Text").field(text).finish(),
            ContentObject::Binary(bytes) => f.debug_tuple("Binary").field(&bytes.len()).finish(),
            ContentObject::Typed { type_name, .. } => f.debug_tuple("Typed").field(type_name).finish(),
        }
    }
}

/// A classified and parsed response.
#[derive(Debug)]
pub struct EndpointResponse {
    is_success: bool,
    status: StatusCode,
    content: String,
    content_object: ContentObject,
    headers: HeaderMap,
}

impl EndpointResponse {
    pub fn new(
        is_success: bool,
        status: StatusCode,
        content: String,
        content_object: ContentObject,
        headers: HeaderMap,
    ) -> Self {
        Self {
            is_success,
            status,
            content,
            content_object,
            headers,
        }
    }

    /// Stand-in for a response that never arrived.
    pub(crate) fn no_response() -> Self {
        Self::new(
            false,
            StatusCode::INTERNAL_SERVER_ERROR,
            String::new(),
            ContentObject::Empty,
            HeaderMap::new(),
        )
    }

    pub fn is_success(&self) -> bool {
        self.is_success
    }

    /// Whether the status is exactly `200 OK`.
    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::OK
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Raw body text; empty for binary bodies.
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn content_object(&self) -> &ContentObject {
        &self.content_object
    }

    /// Response and content headers merged, content headers last.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn content_as<T: Any>(&self) -> Option<&T> {
        self.content_object.downcast_ref()
    }

    /// Describe an attempt to read content that is not a `T` at
    /// `expected_status`.
    pub fn invalid_content_access<T: Any>(&self, expected_status: StatusCode, property: &str) -> ContentAccessError {
        ContentAccessError::new(
            property,
            Some(expected_status),
            type_name::<T>(),
            self.status,
            self.content_object.type_name(),
            &self.content,
        )
    }

    /// Move the content out as a `T`; content of another type is left in
    /// place and yields `None`.
    fn narrow<T: Any>(&mut self) -> Option<T> {
        let content = std::mem::replace(&mut self.content_object, ContentObject::Empty);
        match content.take::<T>() {
            Ok(value) => value,
            Err(content) => {
                tracing::debug!(
                    status = %self.status,
                    expected = type_name::<T>(),
                    actual = content.type_name(),
                    "content left unnarrowed"
                );
                self.content_object = content;
                None
            }
        }
    }
}

/// An [`EndpointResponse`] whose success content is a `S`.
///
/// A success value of type `S` is moved out of `content_object`; anything
/// else stays there untouched.
#[derive(Debug)]
pub struct TypedEndpointResponse<S> {
    response: EndpointResponse,
    success_content: Option<S>,
}

impl<S: Any> TypedEndpointResponse<S> {
    pub fn new(mut response: EndpointResponse) -> Self {
        let success_content = if response.is_success {
            response.narrow::<S>()
        } else {
            None
        };
        Self {
            response,
            success_content,
        }
    }

    pub fn success_content(&self) -> Option<&S> {
        self.success_content.as_ref()
    }

    pub fn into_success_content(self) -> Option<S> {
        self.success_content
    }
}

impl<S> Deref for TypedEndpointResponse<S> {
    type Target = EndpointResponse;

    fn deref(&self) -> &EndpointResponse {
        &self.response
    }
}

/// Content of an [`EndpointResult`], chosen by the success flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseContent<S, E> {
    Success(Option<S>),
    Error(Option<E>),
}

/// An [`EndpointResponse`] with typed success and error content.
#[derive(Debug)]
pub struct EndpointResult<S, E> {
    response: EndpointResponse,
    content: ResponseContent<S, E>,
}

impl<S: Any, E: Any> EndpointResult<S, E> {
    pub fn new(mut response: EndpointResponse) -> Self {
        let content = if response.is_success {
            ResponseContent::Success(response.narrow::<S>())
        } else {
            ResponseContent::Error(response.narrow::<E>())
        };
        Self { response, content }
    }

    pub fn content(&self) -> &ResponseContent<S, E> {
        &self.content
    }

    pub fn into_content(self) -> ResponseContent<S, E> {
        self.content
    }

    pub fn success_content(&self) -> Option<&S> {
        match &self.content {
            ResponseContent::Success(content) => content.as_ref(),
            ResponseContent::Error(_) => None,
        }
    }

    pub fn error_content(&self) -> Option<&E> {
        match &self.content {
            ResponseContent::Error(content) => content.as_ref(),
            ResponseContent::Success(_) => None,
        }
    }
}

impl<S, E> Deref for EndpointResult<S, E> {
    type Target = EndpointResponse;

    fn deref(&self) -> &EndpointResponse {
        &self.response
    }
}

/// Entity metadata of a binary download.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentMetadata {
    /// Media type without parameters.
    pub content_type: Option<String>,
    /// `filename` parameter of `Content-Disposition`, quotes stripped.
    pub file_name: Option<String>,
    pub content_length: Option<u64>,
}

impl ContentMetadata {
    pub(crate) fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            content_type: media_type(headers).map(str::to_string),
            file_name: headers
                .get(CONTENT_DISPOSITION)
                .and_then(|value| value.to_str().ok())
                .and_then(disposition_file_name),
            content_length: headers
                .get(CONTENT_LENGTH)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse().ok()),
        }
    }
}

fn disposition_file_name(disposition: &str) -> Option<String> {
    disposition.split(';').find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("filename")
            .then(|| value.trim().trim_matches('"').to_string())
    })
}

/// A fully buffered binary download.
#[derive(Debug, Clone)]
pub struct BinaryEndpointResponse {
    is_success: bool,
    status: StatusCode,
    content: Option<Bytes>,
    metadata: ContentMetadata,
    error_content: Option<String>,
}

impl BinaryEndpointResponse {
    pub fn success(status: StatusCode, content: Bytes, metadata: ContentMetadata) -> Self {
        Self {
            is_success: true,
            status,
            content: Some(content),
            metadata,
            error_content: None,
        }
    }

    pub fn failure(status: StatusCode, error_content: Option<String>) -> Self {
        Self {
            is_success: false,
            status,
            content: None,
            metadata: ContentMetadata::default(),
            error_content,
        }
    }

    pub fn is_success(&self) -> bool {
        self.is_success
    }

    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::OK
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn content(&self) -> Option<&Bytes> {
        self.content.as_ref()
    }

    pub fn into_content(self) -> Option<Bytes> {
        self.content
    }

    pub fn content_type(&self) -> Option<&str> {
        self.metadata.content_type.as_deref()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.metadata.file_name.as_deref()
    }

    pub fn content_length(&self) -> Option<u64> {
        self.metadata.content_length
    }

    /// Body text of a failed download.
    pub fn error_content(&self) -> Option<&str> {
        self.error_content.as_deref()
    }
}

/// A binary download whose body is still on the wire.
#[derive(Debug)]
pub struct StreamBinaryEndpointResponse {
    is_success: bool,
    status: StatusCode,
    content: Option<ResponseBody>,
    metadata: ContentMetadata,
    error_content: Option<String>,
}

impl StreamBinaryEndpointResponse {
    pub fn success(status: StatusCode, content: ResponseBody, metadata: ContentMetadata) -> Self {
        Self {
            is_success: true,
            status,
            content: Some(content),
            metadata,
            error_content: None,
        }
    }

    pub fn failure(status: StatusCode, error_content: Option<String>) -> Self {
        Self {
            is_success: false,
            status,
            content: None,
            metadata: ContentMetadata::default(),
            error_content,
        }
    }

    pub fn is_success(&self) -> bool {
        self.is_success
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn content(&mut self) -> Option<&mut ResponseBody> {
        self.content.as_mut()
    }

    pub fn into_content(self) -> Option<ResponseBody> {
        self.content
    }

    pub fn content_type(&self) -> Option<&str> {
        self.metadata.content_type.as_deref()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.metadata.file_name.as_deref()
    }

    pub fn content_length(&self) -> Option<u64> {
        self.metadata.content_length
    }

    pub fn error_content(&self) -> Option<&str> {
        self.error_content.as_deref()
    }

    /// Release the body now rather than at drop.
    pub fn close(self) {}
}

/// Items of a JSON array response, deserialized as they arrive.
pub type ItemStream<T> = BoxStream<'static, Result<Option<T>>>;

/// A streamed JSON array response that owns its body.
pub struct StreamingEndpointResponse<T> {
    is_success: bool,
    status: StatusCode,
    content: Option<ItemStream<T>>,
    error_content: Option<String>,
}

impl<T> StreamingEndpointResponse<T> {
    pub fn success(status: StatusCode, content: ItemStream<T>) -> Self {
        Self {
            is_success: true,
            status,
            content: Some(content),
            error_content: None,
        }
    }

    pub fn failure(status: StatusCode, error_content: Option<String>) -> Self {
        Self {
            is_success: false,
            status,
            content: None,
            error_content,
        }
    }

    pub fn is_success(&self) -> bool {
        self.is_success
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The item stream; `None` when the response failed.
    pub fn content(&mut self) -> Option<&mut ItemStream<T>> {
        self.content.as_mut()
    }

    pub fn into_content(self) -> Option<ItemStream<T>> {
        self.content
    }

    pub fn error_content(&self) -> Option<&str> {
        self.error_content.as_deref()
    }

    /// Release the body now rather than at drop.
    pub fn close(self) {}
}

impl<T> fmt::Debug for StreamingEndpointResponse<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingEndpointResponse")
            .field("is_success", &self.is_success)
            .field("status", &self.status)
            .field("content", &self.content.as_ref().map(|_| "<stream>"))
            .field("error_content", &self.error_content)
            .finish()
    }
}
