//! Configured clients: options, the request pipeline, and a registry of named
//! clients.
//!
//! # Design
//! `RestClient` is cheap to clone and shares its transport, handlers and
//! serializer between clones. It resolves relative request URIs against the
//! configured base address with [`Url::join`] semantics, so a base of
//! `http://host/api/` and a template of `pets` give `http://host/api/pets`,
//! while a template starting with `/` replaces the base path.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{RestClientError, Result};
use crate::factory::HttpMessageFactory;
use crate::http::{HttpRequest, HttpResponse};
use crate::response::ResponseBuilder;
use crate::serializer::{ContractSerializer, JsonContractSerializer};
use crate::transport::{Next, ReqwestTransport, RequestHandler, Transport};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings of one client.
///
/// Deserializes from `{"baseAddress": "http://...", "timeout": 30}` with the
/// timeout in seconds; both fields are optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RestClientOptions {
    pub base_address: Option<Url>,
    #[serde(with = "seconds")]
    pub timeout: Duration,
}

impl RestClientOptions {
    pub fn new(base_address: Url) -> Self {
        Self {
            base_address: Some(base_address),
            ..Self::default()
        }
    }
}

impl Default for RestClientOptions {
    fn default() -> Self {
        Self {
            base_address: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

mod seconds {
    use std::time::Duration;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}

struct Inner {
    options: RestClientOptions,
    factory: HttpMessageFactory,
    handlers: Vec<Arc<dyn RequestHandler>>,
    transport: Arc<dyn Transport>,
}

/// Sends requests built by its [`HttpMessageFactory`].
#[derive(Clone)]
pub struct RestClient {
    inner: Arc<Inner>,
}

impl RestClient {
    pub fn builder() -> RestClientBuilder {
        RestClientBuilder::default()
    }

    pub fn new(options: RestClientOptions) -> Result<Self> {
        Self::builder().options(options).build()
    }

    pub fn options(&self) -> &RestClientOptions {
        &self.inner.options
    }

    pub fn factory(&self) -> &HttpMessageFactory {
        &self.inner.factory
    }

    /// Resolve a request URI against the base address.
    pub fn resolve(&self, uri: &str) -> Result<Url> {
        let invalid = |source| RestClientError::InvalidUri {
            uri: uri.to_string(),
            source,
        };
        match Url::parse(uri) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => match &self.inner.options.base_address {
                Some(base) => base.join(uri).map_err(invalid),
                None => Err(invalid(url::ParseError::RelativeUrlWithoutBase)),
            },
            Err(err) => Err(invalid(err)),
        }
    }

    /// Run the request through the handlers and the transport.
    pub async fn send(&self, mut request: HttpRequest) -> Result<HttpResponse> {
        request.uri = self.resolve(&request.uri)?.to_string();
        Next::new(&self.inner.handlers, self.inner.transport.as_ref())
            .run(request)
            .await
    }

    /// [`send`](Self::send) and start parsing the response.
    pub async fn execute(&self, request: HttpRequest) -> Result<ResponseBuilder> {
        let response = self.send(request).await?;
        Ok(self.inner.factory.from_response(Some(response)))
    }
}

impl fmt::Debug for RestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestClient")
            .field("options", &self.inner.options)
            .field("handlers", &self.inner.handlers)
            .field("transport", &self.inner.transport)
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct RestClientBuilder {
    options: RestClientOptions,
    serializer: Option<Arc<dyn ContractSerializer>>,
    handlers: Vec<Arc<dyn RequestHandler>>,
    transport: Option<Arc<dyn Transport>>,
}

impl RestClientBuilder {
    pub fn options(mut self, options: RestClientOptions) -> Self {
        self.options = options;
        self
    }

    pub fn base_address(mut self, base_address: Url) -> Self {
        self.options.base_address = Some(base_address);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    pub fn serializer(mut self, serializer: Arc<dyn ContractSerializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    /// Append a pipeline stage. Stages run in the order they were added.
    pub fn handler(mut self, handler: impl RequestHandler + 'static) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    /// Replace the default `reqwest` transport.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn build(self) -> Result<RestClient> {
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(self.options.timeout)?),
        };
        let serializer = self
            .serializer
            .unwrap_or_else(|| Arc::new(JsonContractSerializer::default()));
        Ok(RestClient {
            inner: Arc::new(Inner {
                options: self.options,
                factory: HttpMessageFactory::new(serializer),
                handlers: self.handlers,
                transport,
            }),
        })
    }
}

/// Named clients sharing one serializer.
#[derive(Debug)]
pub struct ClientRegistry {
    serializer: Arc<dyn ContractSerializer>,
    clients: HashMap<String, RestClient>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::with_serializer(Arc::new(JsonContractSerializer::default()))
    }

    pub fn with_serializer(serializer: Arc<dyn ContractSerializer>) -> Self {
        Self {
            serializer,
            clients: HashMap::new(),
        }
    }

    pub fn factory(&self) -> HttpMessageFactory {
        HttpMessageFactory::new(Arc::clone(&self.serializer))
    }

    pub fn register(&mut self, name: &str, options: RestClientOptions) -> Result<RestClient> {
        self.register_with(name, options, |builder| builder)
    }

    /// Register a client, letting `configure` add handlers, swap the
    /// transport or override the serializer. Registering a name again
    /// replaces the earlier client.
    pub fn register_with<F>(&mut self, name: &str, options: RestClientOptions, configure: F) -> Result<RestClient>
    where
        F: FnOnce(RestClientBuilder) -> RestClientBuilder,
    {
        if name.trim().is_empty() {
            return Err(RestClientError::blank("name"));
        }
        let builder = RestClient::builder()
            .options(options)
            .serializer(Arc::clone(&self.serializer));
        let client = configure(builder).build()?;
        tracing::debug!(name, base_address = ?client.options().base_address, "registered client");
        self.clients.insert(name.to_string(), client.clone());
        Ok(client)
    }

    pub fn get(&self, name: &str) -> Option<RestClient> {
        self.clients.get(name).cloned()
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use http::{Method, StatusCode};

    use super::*;
    use crate::http::CompletionOption;
    use crate::serializer::SerializerOptions;

    #[derive(Debug, Default)]
    struct Recorder {
        uris: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for Arc<Recorder> {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
            self.uris.lock().unwrap().push(request.uri);
            Ok(HttpResponse::new(StatusCode::OK, "[]").with_content_type("application/json"))
        }
    }

    #[derive(Debug)]
    struct AddHeader;

    #[async_trait]
    impl RequestHandler for AddHeader {
        async fn handle(&self, mut request: HttpRequest, next: Next<'_>) -> Result<HttpResponse> {
            request.set_header("x-trace", "1");
            next.run(request).await
        }
    }

    fn base(url: &str) -> Url {
        Url::parse(url).unwrap()
    }

    fn get(uri: &str) -> HttpRequest {
        HttpRequest {
            method: Method::GET,
            uri: uri.to_string(),
            headers: Vec::new(),
            body: None,
            completion: CompletionOption::default(),
        }
    }

    #[test]
    fn options_default_to_thirty_seconds() {
        let options = RestClientOptions::default();
        assert_eq!(options.timeout, Duration::from_secs(30));
        assert!(options.base_address.is_none());
    }

    #[test]
    fn options_deserialize_from_json() {
        let options: RestClientOptions =
            serde_json::from_str(r#"{"baseAddress":"http://localhost:8080/api/","timeout":2.5}"#).unwrap();
        assert_eq!(options.base_address, Some(base("http://localhost:8080/api/")));
        assert_eq!(options.timeout, Duration::from_millis(2500));

        let options: RestClientOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, RestClientOptions::default());
    }

    #[test]
    fn negative_timeout_is_rejected() {
        assert!(serde_json::from_str::<RestClientOptions>(r#"{"timeout":-1}"#).is_err());
    }

    #[test]
    fn resolves_against_base_address() {
        let client = RestClient::builder()
            .base_address(base("http://localhost:8080/api/"))
            .transport(Arc::new(Recorder::default()))
            .build()
            .unwrap();
        assert_eq!(client.resolve("pets").unwrap().as_str(), "http://localhost:8080/api/pets");
        assert_eq!(client.resolve("/health").unwrap().as_str(), "http://localhost:8080/health");
        assert_eq!(
            client.resolve("https://other.example/x").unwrap().as_str(),
            "https://other.example/x"
        );
    }

    #[test]
    fn relative_uri_without_base_is_an_error() {
        let client = RestClient::builder().transport(Arc::new(Recorder::default())).build().unwrap();
        assert!(matches!(
            client.resolve("/api/pets"),
            Err(RestClientError::InvalidUri { .. })
        ));
    }

    #[tokio::test]
    async fn send_runs_handlers_and_transport() {
        let recorder = Arc::new(Recorder::default());
        let client = RestClient::builder()
            .base_address(base("http://localhost:1/"))
            .handler(AddHeader)
            .transport(Arc::clone(&recorder))
            .build()
            .unwrap();
        let request = client.factory().from_template("/api/pets").build(Method::GET);
        let pets = client
            .execute(request)
            .await
            .unwrap()
            .add_success_response_as::<Vec<u32>>(StatusCode::OK)
            .build_typed_response::<Vec<u32>>()
            .await
            .unwrap();
        assert_eq!(pets.success_content(), Some(&Vec::new()));
        assert_eq!(*recorder.uris.lock().unwrap(), vec!["http://localhost:1/api/pets".to_string()]);
    }

    #[test]
    fn registry_shares_serializer() {
        let serializer: Arc<dyn ContractSerializer> = Arc::new(JsonContractSerializer::new(SerializerOptions {
            ignore_null_values: true,
            write_indented: false,
        }));
        let mut registry = ClientRegistry::with_serializer(Arc::clone(&serializer));
        let client = registry
            .register_with("pets", RestClientOptions::new(base("http://localhost/")), |builder| {
                builder.transport(Arc::new(Recorder::default()))
            })
            .unwrap();
        assert!(Arc::ptr_eq(client.factory().serializer(), &serializer));
        assert!(Arc::ptr_eq(registry.factory().serializer(), &serializer));
        assert!(registry.get("pets").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn registry_allows_serializer_override() {
        let mut registry = ClientRegistry::new();
        let custom: Arc<dyn ContractSerializer> = Arc::new(JsonContractSerializer::default());
        let client = registry
            .register_with("custom", RestClientOptions::default(), |builder| {
                builder
                    .serializer(Arc::clone(&custom))
                    .transport(Arc::new(Recorder::default()))
            })
            .unwrap();
        assert!(Arc::ptr_eq(client.factory().serializer(), &custom));
    }

    #[test]
    fn registry_rejects_blank_names() {
        let mut registry = ClientRegistry::new();
        assert!(registry.register(" ", RestClientOptions::default()).is_err());
    }

    #[test]
    fn reregistering_replaces_client() {
        let mut registry = ClientRegistry::new();
        registry
            .register_with("api", RestClientOptions::new(base("http://one/")), |b| {
                b.transport(Arc::new(Recorder::default()))
            })
            .unwrap();
        registry
            .register_with("api", RestClientOptions::new(base("http://two/")), |b| {
                b.transport(Arc::new(Recorder::default()))
            })
            .unwrap();
        let client = registry.get("api").unwrap();
        assert_eq!(client.options().base_address, Some(base("http://two/")));
    }
}
