//! Fluent builder that turns a path template and parameters into one
//! `HttpRequest`.
//!
//! # Design
//! Every `with_*` method consumes the builder and returns it again, failing
//! immediately on bad input, and `build` consumes it for good: a builder
//! produces exactly one request.
//!
//! Parameter values go through `serde`, which gives enums their wire names
//! (`#[serde(rename = "...")]`, falling back to the variant name), date-times
//! their RFC 3339 round-trip form, and optional values a natural "absent".

use std::sync::Arc;

use http::{HeaderName, HeaderValue, Method};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;
use serde_json::Value;

use crate::error::{RestClientError, Result};
use crate::http::{set_header, CompletionOption, HttpRequest, Payload, RequestBody};
use crate::multipart::{FilePart, FormFile, MultipartForm};
use crate::serializer::{ContractSerializer, ContractSerializerExt};

/// Everything except the RFC 3986 unreserved characters is escaped.
const DATA: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

const OCTET_STREAM: &str = "application/octet-stream";

/// Name given to each part when whole files are sent as the body.
const FORM_FILE_PART: &str = "Request";

/// A query string entry.
#[derive(Debug, Clone, PartialEq, Eq)]
enum QueryValue {
    /// Escaped when the query string is assembled.
    Raw(String),
    /// Already escaped `name=value` pairs minus the leading `name=`.
    Encoded(String),
}

/// Builds an [`HttpRequest`] from a `{placeholder}` path template.
#[derive(Debug)]
pub struct RequestBuilder {
    template: String,
    serializer: Arc<dyn ContractSerializer>,
    path: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    query: Vec<(String, QueryValue)>,
    form_fields: Vec<(String, String)>,
    files: Vec<FilePart>,
    json: Option<String>,
    binary: Option<(Payload, String)>,
    form_files: Option<Vec<FormFile>>,
    completion: CompletionOption,
}

impl RequestBuilder {
    pub fn new(template: impl Into<String>, serializer: Arc<dyn ContractSerializer>) -> Self {
        Self {
            template: template.into(),
            serializer,
            path: Vec::new(),
            headers: vec![("accept".to_string(), "application/json".to_string())],
            query: Vec::new(),
            form_fields: Vec::new(),
            files: Vec::new(),
            json: None,
            binary: None,
            form_files: None,
            completion: CompletionOption::default(),
        }
    }

    pub fn completion_option(&self) -> CompletionOption {
        self.completion
    }

    /// Substitute `{name}` in the template with the escaped `value`.
    pub fn with_path_parameter<T: Serialize + ?Sized>(mut self, name: &str, value: &T) -> Result<Self> {
        require(name, "name")?;
        let value = match scalar(&serde_json::to_value(value)?) {
            Some(text) if !text.trim().is_empty() => text,
            _ => return Err(RestClientError::blank("value")),
        };
        upsert(&mut self.path, name, value);
        Ok(self)
    }

    /// Add a header; a `null` value (such as `None`) adds nothing.
    pub fn with_header_parameter<T: Serialize + ?Sized>(mut self, name: &str, value: &T) -> Result<Self> {
        require(name, "name")?;
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            return Err(RestClientError::InvalidHeader(name.to_string()));
        }
        if let Some(value) = scalar(&serde_json::to_value(value)?) {
            if HeaderValue::from_str(&value).is_err() {
                return Err(RestClientError::InvalidHeader(name.to_string()));
            }
            set_header(&mut self.headers, name.to_string(), value);
        }
        Ok(self)
    }

    /// Add a query parameter.
    ///
    /// `null` values and empty sequences are left out of the URI entirely;
    /// a non-empty sequence expands to one `name=value` pair per element.
    pub fn with_query_parameter<T: Serialize + ?Sized>(mut self, name: &str, value: &T) -> Result<Self> {
        require(name, "name")?;
        match serde_json::to_value(value)? {
            Value::Null => {}
            Value::Array(items) => {
                let encoded: Vec<String> = items.iter().filter_map(scalar).map(|item| escape(&item)).collect();
                if !encoded.is_empty() {
                    let joined = encoded.join(&format!("&{name}="));
                    upsert(&mut self.query, name, QueryValue::Encoded(joined));
                }
            }
            Value::Object(_) => {
                return Err(RestClientError::InvalidArgument {
                    name: "value",
                    reason: "must be a scalar or a sequence of scalars",
                })
            }
            value => {
                if let Some(text) = scalar(&value) {
                    upsert(&mut self.query, name, QueryValue::Raw(text));
                }
            }
        }
        Ok(self)
    }

    /// Serialize `body` as the JSON request body.
    pub fn with_body<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        let value = serde_json::to_value(body)?;
        if value.is_null() {
            return Err(RestClientError::blank("body"));
        }
        self.json = Some(self.serializer.serialize_value(value)?);
        Ok(self)
    }

    /// Send one file as the whole body.
    pub fn with_form_file(self, file: FormFile) -> Result<Self> {
        self.with_form_files(vec![file])
    }

    /// Send a list of files as the whole body; the response is expected as
    /// `application/octet-stream`.
    pub fn with_form_files(mut self, files: Vec<FormFile>) -> Result<Self> {
        for file in &files {
            require(&file.file_name, "fileName")?;
            single_line(&file.file_name, "fileName")?;
        }
        set_header(&mut self.headers, "accept".to_string(), OCTET_STREAM.to_string());
        self.form_files = Some(files);
        Ok(self)
    }

    pub fn with_binary_body(mut self, content: impl Into<Payload>, content_type: Option<&str>) -> Result<Self> {
        let content_type = content_type.unwrap_or(OCTET_STREAM);
        require(content_type, "contentType")?;
        single_line(content_type, "contentType")?;
        self.binary = Some((content.into(), content_type.to_string()));
        Ok(self)
    }

    /// Add a file part to the multipart body.
    pub fn with_file(
        mut self,
        content: impl Into<Payload>,
        name: &str,
        file_name: &str,
        content_type: Option<&str>,
    ) -> Result<Self> {
        require(name, "name")?;
        require(file_name, "fileName")?;
        single_line(name, "name")?;
        single_line(file_name, "fileName")?;
        if let Some(content_type) = content_type {
            single_line(content_type, "contentType")?;
        }
        self.files.push(FilePart::new(content, name, file_name, content_type));
        Ok(self)
    }

    pub fn with_files(self, files: impl IntoIterator<Item = FilePart>) -> Result<Self> {
        files.into_iter().try_fold(self, |builder, file| {
            builder.with_file(file.content, &file.name, &file.file_name, file.content_type.as_deref())
        })
    }

    /// Add a text field to the multipart body.
    pub fn with_form_field(mut self, name: &str, value: &str) -> Result<Self> {
        require(name, "name")?;
        single_line(name, "name")?;
        if value.is_empty() {
            return Err(RestClientError::InvalidArgument {
                name: "value",
                reason: "cannot be empty",
            });
        }
        upsert(&mut self.form_fields, name, value.to_string());
        Ok(self)
    }

    pub fn with_completion_option(mut self, completion: CompletionOption) -> Self {
        self.completion = completion;
        self
    }

    /// Assemble the request.
    ///
    /// Exactly one body is attached, in this order of precedence: JSON,
    /// binary, multipart fields/files, whole-body form files.
    pub fn build(self, method: Method) -> HttpRequest {
        let uri = self.uri();
        let kinds = [
            self.json.is_some(),
            self.binary.is_some(),
            !self.files.is_empty() || !self.form_fields.is_empty(),
            self.form_files.is_some(),
        ];
        if kinds.iter().filter(|set| **set).count() > 1 {
            tracing::warn!(%uri, "several request bodies configured, only the first by precedence is sent");
        }

        let body = if let Some(json) = self.json {
            Some(RequestBody::Json(json))
        } else if let Some((content, content_type)) = self.binary {
            Some(RequestBody::Binary { content, content_type })
        } else if !self.files.is_empty() || !self.form_fields.is_empty() {
            let mut form = MultipartForm::new();
            for (name, value) in self.form_fields {
                form.add_field(name, value);
            }
            for file in self.files {
                form.add_file(file);
            }
            Some(RequestBody::Multipart(form))
        } else {
            self.form_files.map(|files| {
                let mut form = MultipartForm::new();
                for file in files {
                    form.add_file(FilePart::new(file.content, FORM_FILE_PART, file.file_name, None));
                }
                RequestBody::Multipart(form)
            })
        };

        tracing::debug!(%method, %uri, has_body = body.is_some(), "built request");
        HttpRequest {
            method,
            uri,
            headers: self.headers,
            body,
            completion: self.completion,
        }
    }

    fn uri(&self) -> String {
        let mut uri = self.template.clone();
        for (name, value) in &self.path {
            uri = uri.replace(&format!("{{{name}}}"), &escape(value));
        }
        if self.query.is_empty() {
            return uri;
        }
        let pairs: Vec<String> = self
            .query
            .iter()
            .map(|(name, value)| match value {
                QueryValue::Raw(raw) => format!("{name}={}", escape(raw)),
                QueryValue::Encoded(encoded) => format!("{name}={encoded}"),
            })
            .collect();
        format!("{uri}?{}", pairs.join("&"))
    }
}

fn require(value: &str, name: &'static str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(RestClientError::blank(name));
    }
    Ok(())
}

/// Multipart part headers are line based.
fn single_line(value: &str, name: &'static str) -> Result<()> {
    if value.contains(['\r', '\n']) {
        return Err(RestClientError::InvalidArgument {
            name,
            reason: "cannot contain line breaks",
        });
    }
    Ok(())
}

fn upsert<V>(entries: &mut Vec<(String, V)>, name: &str, value: V) {
    match entries.iter_mut().find(|(key, _)| key == name) {
        Some(entry) => entry.1 = value,
        None => entries.push((name.to_string(), value)),
    }
}

/// Text form of a scalar; `None` for `null`, arrays and objects.
fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn escape(value: &str) -> String {
    utf8_percent_encode(value, DATA).to_string()
}
