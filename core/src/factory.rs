//! Entry point handing out request and response builders that share one
//! serializer.

use std::sync::Arc;

use crate::http::HttpResponse;
use crate::request::RequestBuilder;
use crate::response::ResponseBuilder;
use crate::serializer::{ContractSerializer, JsonContractSerializer};

#[derive(Debug, Clone)]
pub struct HttpMessageFactory {
    serializer: Arc<dyn ContractSerializer>,
}

impl HttpMessageFactory {
    pub fn new(serializer: Arc<dyn ContractSerializer>) -> Self {
        Self { serializer }
    }

    pub fn serializer(&self) -> &Arc<dyn ContractSerializer> {
        &self.serializer
    }

    /// Start a request for a `{placeholder}` path template.
    pub fn from_template(&self, template: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(template, Arc::clone(&self.serializer))
    }

    /// Start parsing a response; `None` stands for a response that never
    /// arrived.
    pub fn from_response(&self, response: Option<HttpResponse>) -> ResponseBuilder {
        ResponseBuilder::new(response, Arc::clone(&self.serializer))
    }
}

impl Default for HttpMessageFactory {
    fn default() -> Self {
        Self::new(Arc::new(JsonContractSerializer::default()))
    }
}
