//! Typed REST client helpers.
//!
//! # Overview
//! Fluent builders turn a `{placeholder}` path template, parameters and a
//! body into an `HttpRequest`, and turn an `HttpResponse` into typed endpoint
//! responses keyed by status code. A `RestClient` sends the requests through
//! an optional handler pipeline (for example bearer authentication) and a
//! `reqwest` transport.
//!
//! # Design
//! - The builders never touch the network (host-does-IO pattern); only a
//!   `Transport` does I/O, so everything above it is deterministic and
//!   testable with in-memory responses.
//! - Builders are single use: `with_*` methods consume and return the
//!   builder, `build*` methods consume it.
//! - Content types are plain `serde` types; wire names (camelCase members,
//!   enum values) are declared with `#[serde(...)]` attributes.
//! - Response content is narrowed into typed wrappers once, at build time.
//!
//! ```no_run
//! # async fn demo() -> rest_client::Result<()> {
//! use http::{Method, StatusCode};
//! use rest_client::{RestClient, RestClientOptions};
//!
//! let client = RestClient::new(RestClientOptions::new("http://localhost:8080/".parse().unwrap()))?;
//! let request = client
//!     .factory()
//!     .from_template("/api/pets/{id}")
//!     .with_path_parameter("id", &7)?
//!     .build(Method::GET);
//! let pet = client
//!     .execute(request)
//!     .await?
//!     .add_success_response_as::<serde_json::Value>(StatusCode::OK)
//!     .add_error_response(StatusCode::NOT_FOUND)
//!     .build_typed_response::<serde_json::Value>()
//!     .await?;
//! println!("{:?}", pet.success_content());
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod endpoint;
pub mod error;
pub mod factory;
pub mod http;
pub mod multipart;
pub mod request;
pub mod response;
pub mod serializer;
pub mod transport;

pub use auth::{AccessToken, AuthenticationHandler, BearerTokenProvider, CredentialProvider, TokenProvider};
pub use client::{ClientRegistry, RestClient, RestClientBuilder, RestClientOptions};
pub use endpoint::{
    BinaryEndpointResponse, ContentMetadata, ContentObject, EndpointResponse, EndpointResult, ResponseContent,
    StreamBinaryEndpointResponse, StreamingEndpointResponse, TypedEndpointResponse,
};
pub use error::{ContentAccessError, DeserializationError, RestClientError, Result};
pub use factory::HttpMessageFactory;
pub use crate::http::{CompletionOption, HttpRequest, HttpResponse, Payload, RequestBody, ResponseBody};
pub use multipart::{FilePart, FormFile, MultipartForm};
pub use request::RequestBuilder;
pub use response::ResponseBuilder;
pub use serializer::{ContractSerializer, ContractSerializerExt, JsonContractSerializer, SerializerOptions};
pub use transport::{Next, ReqwestTransport, RequestHandler, Transport};
