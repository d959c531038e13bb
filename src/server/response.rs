use super::request::HeaderVec;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use std::borrow::Cow;
use std::io;
use std::sync::Arc;
use tracing::warn;

pub const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";
pub const CONTENT_TYPE_HTML: &str = "text/html; charset=utf-8";
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Transport side of a response: receives the buffered response exactly once.
pub trait ResponseSink: Send {
    fn send(&mut self, response: SentResponse);
}

/// A fully buffered response as handed to a [`ResponseSink`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl SentResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn body_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_slice(&self.body)
    }
}

/// In-memory sink recording every flushed response.
///
/// Clones share the same record, so a test can keep one clone and hand another to
/// [`App::handle`](crate::app::App::handle).
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    sent: Arc<Mutex<Vec<SentResponse>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Boxed clone ready to pass to the dispatcher.
    #[must_use]
    pub fn boxed(&self) -> Box<dyn ResponseSink> {
        Box::new(self.clone())
    }

    pub fn responses(&self) -> Vec<SentResponse> {
        self.sent.lock().clone()
    }

    pub fn last(&self) -> Option<SentResponse> {
        self.sent.lock().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.lock().is_empty()
    }

    pub fn take(&self) -> Vec<SentResponse> {
        std::mem::take(&mut *self.sent.lock())
    }
}

impl ResponseSink for MemorySink {
    fn send(&mut self, response: SentResponse) {
        self.sent.lock().push(response);
    }
}

/// Buffered response bound to one request.
///
/// Nothing reaches the transport until [`flush`](Response::flush). A status of `0` means
/// "not set yet".
#[derive(Default)]
pub struct Response {
    status: u16,
    headers: HeaderVec,
    body: Vec<u8>,
    sink: Option<Box<dyn ResponseSink>>,
    flushed: bool,
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("bound", &self.sink.is_some())
            .field("flushed", &self.flushed)
            .finish()
    }
}

impl Response {
    #[must_use]
    pub fn new(sink: Box<dyn ResponseSink>) -> Self {
        Self {
            sink: Some(sink),
            ..Self::default()
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: u16) -> &mut Self {
        self.status = status;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Set a header, replacing any existing value with the same (case-insensitive) name.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        let value = value.into();
        if let Some(slot) = self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            slot.1 = value;
        } else {
            self.headers.push((Arc::from(name.to_ascii_lowercase()), value));
        }
        self
    }

    /// Append bytes to the buffered body.
    pub fn write(&mut self, bytes: &[u8]) -> &mut Self {
        self.body.extend_from_slice(bytes);
        self
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn clear_body(&mut self) -> &mut Self {
        self.body.clear();
        self
    }

    /// Whether a status or any body bytes were produced.
    pub fn has_output(&self) -> bool {
        self.status != 0 || !self.body.is_empty()
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    pub fn plain(&mut self, status: u16, text: &str) -> &mut Self {
        self.set_status(status)
            .set_header("content-type", CONTENT_TYPE_TEXT)
            .write(text.as_bytes())
    }

    pub fn html(&mut self, status: u16, html: &str) -> &mut Self {
        self.set_status(status)
            .set_header("content-type", CONTENT_TYPE_HTML)
            .write(html.as_bytes())
    }

    /// Serialize `value` as the JSON body.
    pub fn json<T: Serialize + ?Sized>(&mut self, status: u16, value: &T) -> anyhow::Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.set_status(status)
            .set_header("content-type", CONTENT_TYPE_JSON)
            .write(&bytes);
        Ok(())
    }

    /// Replace the body with `{"code": code, "message": message}`.
    pub fn error_json(&mut self, status: u16, code: i32, message: &str) -> &mut Self {
        let body = json!({ "code": code, "message": message }).to_string();
        self.clear_body()
            .set_status(status)
            .set_header("content-type", CONTENT_TYPE_JSON)
            .write(body.as_bytes())
    }

    /// Hand the buffered response to the sink.
    ///
    /// Returns `false` without sending when nothing was produced, when the response was
    /// already flushed, or when no sink is bound.
    pub fn flush(&mut self) -> bool {
        if self.flushed || !self.has_output() {
            return false;
        }
        let Some(sink) = self.sink.as_mut() else {
            warn!(status = self.status, "response produced without a bound sink");
            return false;
        };
        let status = if self.status == 0 { 200 } else { self.status };
        let headers = self
            .headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        sink.send(SentResponse {
            status,
            headers,
            body: std::mem::take(&mut self.body),
        });
        self.flushed = true;
        true
    }

    /// Clear all buffered state and bind a new sink.
    pub(crate) fn rebind(&mut self, sink: Option<Box<dyn ResponseSink>>) {
        self.status = 0;
        self.headers.clear();
        self.body.clear();
        self.flushed = false;
        self.sink = sink;
    }
}

impl io::Write for Response {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
