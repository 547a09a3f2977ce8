//! JSON contract serializer used for request bodies and response content.
//!
//! # Design
//! `ContractSerializer` is object-safe and works on `serde_json::Value`, so a
//! client can swap serializers at runtime behind an `Arc<dyn _>`. The typed
//! entry points live on [`ContractSerializerExt`], which every serializer gets
//! for free. Property naming is declared on the contract types themselves
//! (`#[serde(rename_all = "camelCase")]`); the serializer decides how the
//! document is written (null members, indentation).

use std::fmt;
use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt};
use futures::Stream;
use serde::de::{DeserializeOwned, Error as _};
use serde::Serialize;
use serde_json::Value;

use crate::error::{RestClientError, Result};

/// Encodes and decodes JSON documents.
pub trait ContractSerializer: Send + Sync + fmt::Debug {
    /// Write a document as text.
    fn serialize_value(&self, value: Value) -> serde_json::Result<String>;

    /// Parse a UTF-8 JSON document.
    fn deserialize_value(&self, json: &[u8]) -> serde_json::Result<Value>;
}

/// Typed helpers available on every [`ContractSerializer`].
pub trait ContractSerializerExt: ContractSerializer {
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> serde_json::Result<String> {
        self.serialize_value(serde_json::to_value(value)?)
    }

    /// Deserialize text; a JSON `null` literal yields `None`.
    fn deserialize<T: DeserializeOwned>(&self, json: &str) -> serde_json::Result<Option<T>> {
        self.deserialize_slice(json.as_bytes())
    }

    fn deserialize_slice<T: DeserializeOwned>(&self, json: &[u8]) -> serde_json::Result<Option<T>> {
        match self.deserialize_value(json)? {
            Value::Null => Ok(None),
            value => serde_json::from_value(value).map(Some),
        }
    }

    /// Deserialize into a dynamically typed document.
    fn deserialize_dynamic(&self, json: &str) -> serde_json::Result<Option<Value>> {
        match self.deserialize_value(json.as_bytes())? {
            Value::Null => Ok(None),
            value => Ok(Some(value)),
        }
    }
}

impl<S: ContractSerializer + ?Sized> ContractSerializerExt for S {}

/// Options for [`JsonContractSerializer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializerOptions {
    /// Drop object members whose value is `null` when writing.
    pub ignore_null_values: bool,
    pub write_indented: bool,
}

impl Default for SerializerOptions {
    fn default() -> Self {
        Self {
            ignore_null_values: true,
            write_indented: true,
        }
    }
}

/// The default [`ContractSerializer`], backed by `serde_json`.
#[derive(Debug, Clone, Default)]
pub struct JsonContractSerializer {
    options: SerializerOptions,
}

impl JsonContractSerializer {
    pub fn new(options: SerializerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SerializerOptions {
        &self.options
    }
}

impl ContractSerializer for JsonContractSerializer {
    fn serialize_value(&self, mut value: Value) -> serde_json::Result<String> {
        if self.options.ignore_null_values {
            strip_nulls(&mut value);
        }
        if self.options.write_indented {
            serde_json::to_string_pretty(&value)
        } else {
            serde_json::to_string(&value)
        }
    }

    fn deserialize_value(&self, json: &[u8]) -> serde_json::Result<Value> {
        serde_json::from_slice(json)
    }
}

fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, member| !member.is_null());
            map.values_mut().for_each(strip_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {}
    }
}

/// Lazily deserialize the elements of a top-level JSON array arriving as a
/// byte stream.
///
/// Elements are yielded as soon as their closing byte arrives; a `null`
/// element yields `None`. A body that is not an array, or that ends early,
/// produces one error item and then ends.
pub fn deserialize_stream<'a, T, B>(
    serializer: Arc<dyn ContractSerializer>,
    body: B,
) -> BoxStream<'a, Result<Option<T>>>
where
    T: DeserializeOwned + Send + 'a,
    B: Stream<Item = std::io::Result<Bytes>> + Send + 'a,
{
    let state = ArrayReader {
        body: body.boxed(),
        splitter: ArraySplitter::default(),
        serializer,
        done: false,
    };
    stream::unfold(state, |mut state| async move {
        if state.done {
            return None;
        }
        let item = state.next_element().await;
        match item {
            Ok(Some(element)) => {
                let parsed = state.serializer.deserialize_slice::<T>(&element).map_err(RestClientError::from);
                state.done = parsed.is_err();
                Some((parsed, state))
            }
            Ok(None) => None,
            Err(err) => {
                state.done = true;
                Some((Err(err), state))
            }
        }
    })
    .boxed()
}

struct ArrayReader<'a> {
    body: BoxStream<'a, std::io::Result<Bytes>>,
    splitter: ArraySplitter,
    serializer: Arc<dyn ContractSerializer>,
    done: bool,
}

impl ArrayReader<'_> {
    async fn next_element(&mut self) -> Result<Option<Bytes>> {
        loop {
            if let Some(element) = self.splitter.next_element()? {
                return Ok(Some(element));
            }
            if self.splitter.is_finished() {
                return Ok(None);
            }
            match self.body.next().await {
                Some(chunk) => self.splitter.push(&chunk?),
                None => return self.splitter.finish().map(|()| None),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum SplitState {
    #[default]
    BeforeArray,
    BeforeElement,
    /// After a `,`; another element must follow.
    AfterComma,
    InElement,
    AfterElement,
    Finished,
}

/// Incremental scanner that cuts a JSON array into its element byte ranges.
///
/// Tracks nesting depth and string/escape state so commas and brackets inside
/// nested values or strings are not mistaken for element boundaries.
#[derive(Debug, Default)]
struct ArraySplitter {
    buffer: BytesMut,
    /// Bytes of `buffer` already scanned.
    cursor: usize,
    state: SplitState,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl ArraySplitter {
    fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    fn is_finished(&self) -> bool {
        self.state == SplitState::Finished
    }

    fn next_element(&mut self) -> Result<Option<Bytes>> {
        while self.cursor < self.buffer.len() {
            let byte = self.buffer[self.cursor];
            match self.state {
                SplitState::BeforeArray => {
                    self.expect_byte(byte, b'[', SplitState::BeforeElement, "expected '[' at start of stream")?;
                }
                SplitState::BeforeElement | SplitState::AfterComma => {
                    if byte.is_ascii_whitespace() {
                        self.consume();
                    } else if byte == b']' {
                        if self.state == SplitState::AfterComma {
                            return Err(syntax("trailing ',' before ']'"));
                        }
                        self.consume();
                        self.state = SplitState::Finished;
                        return Ok(None);
                    } else {
                        self.state = SplitState::InElement;
                    }
                }
                SplitState::InElement => {
                    if let Some(end) = self.scan_element(byte) {
                        let element = self.buffer.split_to(end).freeze();
                        self.cursor = 0;
                        self.state = SplitState::AfterElement;
                        return Ok(Some(element));
                    }
                }
                SplitState::AfterElement => {
                    if byte.is_ascii_whitespace() {
                        self.consume();
                    } else if byte == b',' {
                        self.consume();
                        self.state = SplitState::AfterComma;
                    } else if byte == b']' {
                        self.consume();
                        self.state = SplitState::Finished;
                        return Ok(None);
                    } else {
                        return Err(syntax("expected ',' or ']' after array element"));
                    }
                }
                SplitState::Finished => return Ok(None),
            }
        }
        Ok(None)
    }

    /// Advance over one byte of an element; returns the element's end offset
    /// once a delimiter at depth zero is reached.
    fn scan_element(&mut self, byte: u8) -> Option<usize> {
        if self.in_string {
            match (self.escaped, byte) {
                (true, _) => self.escaped = false,
                (false, b'\\') => self.escaped = true,
                (false, b'"') => self.in_string = false,
                _ => {}
            }
            self.cursor += 1;
            return None;
        }
        match byte {
            b'"' => self.in_string = true,
            b'{' | b'[' => self.depth += 1,
            b'}' | b']' if self.depth > 0 => self.depth -= 1,
            b',' | b']' if self.depth == 0 => return Some(self.cursor),
            byte if byte.is_ascii_whitespace() && self.depth == 0 => return Some(self.cursor),
            _ => {}
        }
        self.cursor += 1;
        None
    }

    fn expect_byte(&mut self, byte: u8, expected: u8, next: SplitState, message: &str) -> Result<()> {
        if byte.is_ascii_whitespace() {
            self.consume();
            Ok(())
        } else if byte == expected {
            self.consume();
            self.state = next;
            Ok(())
        } else {
            Err(syntax(message))
        }
    }

    fn consume(&mut self) {
        self.buffer.advance(1);
    }

    /// Called when the body ends.
    fn finish(&mut self) -> Result<()> {
        match self.state {
            SplitState::Finished => Ok(()),
            SplitState::BeforeArray if self.buffer.iter().all(u8::is_ascii_whitespace) => {
                Err(syntax("empty stream, expected a JSON array"))
            }
            _ => Err(syntax("stream ended before the JSON array was closed")),
        }
    }
}

fn syntax(message: &str) -> RestClientError {
    RestClientError::Serialization(serde_json::Error::custom(message))
}
