//! `multipart/form-data` encoding for request bodies.
//!
//! Fields are written before files. File parts may carry streamed payloads;
//! encoding chains the part headers and payload streams together so nothing
//! is buffered beyond the part headers themselves.

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use uuid::Uuid;

use crate::http::{ByteStream, Payload};

/// A file part of a multipart body.
#[derive(Debug)]
pub struct FilePart {
    pub name: String,
    pub file_name: String,
    pub content: Payload,
    pub content_type: Option<String>,
}

impl FilePart {
    pub fn new(
        content: impl Into<Payload>,
        name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: Option<&str>,
    ) -> Self {
        Self {
            name: name.into(),
            file_name: file_name.into(),
            content: content.into(),
            content_type: content_type.map(str::to_string),
        }
    }
}

/// An in-memory uploaded file sent as the whole request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormFile {
    pub file_name: String,
    pub content: Bytes,
}

impl FormFile {
    pub fn new(file_name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug)]
pub struct MultipartForm {
    boundary: String,
    fields: Vec<(String, String)>,
    files: Vec<FilePart>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::with_boundary(Uuid::new_v4().to_string())
    }

    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            fields: Vec::new(),
            files: Vec::new(),
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn files(&self) -> &[FilePart] {
        &self.files
    }

    pub fn add_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    pub fn add_file(&mut self, part: FilePart) {
        self.files.push(part);
    }

    /// Split into the text fields and file parts, for transports that encode
    /// multipart bodies themselves.
    pub fn into_parts(self) -> (Vec<(String, String)>, Vec<FilePart>) {
        (self.fields, self.files)
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn into_payload(self) -> Payload {
        Payload::from_stream(self.encode())
    }

    fn encode(self) -> ByteStream<'static> {
        let boundary = self.boundary;
        let mut parts: Vec<ByteStream<'static>> = Vec::new();

        for (name, value) in self.fields {
            let head = format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n{value}\r\n",
                quote(&name)
            );
            parts.push(chunk(head));
        }

        for file in self.files {
            let mut head = format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                quote(&file.name),
                quote(&file.file_name)
            );
            if let Some(content_type) = &file.content_type {
                head.push_str(&format!("Content-Type: {content_type}\r\n"));
            }
            head.push_str("\r\n");
            parts.push(chunk(head));
            parts.push(file.content.into_stream());
            parts.push(chunk("\r\n".to_string()));
        }

        parts.push(chunk(format!("--{boundary}--\r\n")));
        stream::iter(parts).flatten().boxed()
    }
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}

fn chunk(text: String) -> ByteStream<'static> {
    stream::once(async move { Ok(Bytes::from(text)) }).boxed()
}

/// Escape a `Content-Disposition` parameter the way browsers do.
fn quote(value: &str) -> String {
    value.replace('"', "%22").replace('\r', "%0D").replace('\n', "%0A")
}
