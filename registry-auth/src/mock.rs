//! Scripted transport for tests.
//!
//! [`MockTransport`] replays queued responses per request path and records
//! every request it serves, so tests can assert on attempt counts and
//! headers without touching the network.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};

/// A request observed by the mock.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Request method.
    pub method: Method,

    /// Full request URI.
    pub uri: Uri,

    /// Request headers.
    pub headers: HeaderMap,
}

/// A canned response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl MockResponse {
    /// A response with status, headers and body.
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// An empty-bodied response with just a status.
    pub fn status(status: StatusCode) -> Self {
        Self::new(status, HeaderMap::new(), Vec::new())
    }

    /// A `200 OK` response carrying a JSON body.
    pub fn json(value: &serde_json::Value) -> Self {
        let body = serde_json::to_vec(value).expect("serializable JSON value");
        Self::new(StatusCode::OK, HeaderMap::new(), body)
            .with_header(http::header::CONTENT_TYPE, "application/json")
    }

    /// Set a header, replacing any previous value.
    pub fn with_header<K, V>(mut self, key: K, value: V) -> Self
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: fmt::Debug,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: fmt::Debug,
    {
        let key = HeaderName::try_from(key).expect("valid header name");
        let value = HeaderValue::try_from(value).expect("valid header value");
        self.headers.insert(key, value);
        self
    }
}

#[derive(Debug, Default)]
struct State {
    responses: HashMap<String, VecDeque<MockResponse>>,
    requests: Vec<RecordedRequest>,
}

/// A scripted `tower::Service` standing in for the HTTP transport.
///
/// Responses are queued per path; once a path's queue is down to its last
/// response, that response repeats. A request for an unscripted path
/// panics.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<State>>,
}

impl MockTransport {
    /// An empty mock; queue responses with [`MockTransport::enqueue`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for a path. Any method matches.
    pub fn enqueue(&self, path: &str, response: MockResponse) {
        let mut state = self.state.lock().expect("mock state lock");
        state
            .responses
            .entry(path.to_owned())
            .or_default()
            .push_back(response);
    }

    /// All requests served so far, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().expect("mock state lock").requests.clone()
    }

    /// The requests served for one path, in order.
    pub fn requests_for(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.uri.path() == path)
            .collect()
    }
}

impl tower::Service<http::Request<hyperdriver::Body>> for MockTransport {
    type Response = http::Response<hyperdriver::Body>;
    type Error = hyperdriver::client::Error;
    type Future = std::future::Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<hyperdriver::Body>) -> Self::Future {
        let path = req.uri().path().to_owned();
        let mut state = self.state.lock().expect("mock state lock");
        state.requests.push(RecordedRequest {
            method: req.method().clone(),
            uri: req.uri().clone(),
            headers: req.headers().clone(),
        });

        let queue = state
            .responses
            .get_mut(&path)
            .unwrap_or_else(|| panic!("no response scripted for path: {path}"));
        let response = if queue.len() > 1 {
            queue.pop_front().expect("non-empty queue")
        } else {
            queue
                .front()
                .cloned()
                .unwrap_or_else(|| panic!("no response scripted for path: {path}"))
        };

        let mut builder = http::Response::builder()
            .status(response.status)
            .version(http::Version::HTTP_11);
        for (key, value) in response.headers.iter() {
            builder = builder.header(key, value);
        }
        let response = builder
            .body(hyperdriver::Body::from(Bytes::from(response.body)))
            .expect("valid mock response");

        std::future::ready(Ok(response))
    }
}
