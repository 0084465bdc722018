//! Scripted in-process transport
//!
//! `MockTransport` answers requests from per-route queues and records every
//! request it sees, so tests can assert both what the job engine sent and
//! how many calls it made. A route is a method plus a URL suffix; query
//! strings are not part of the match.
//!
//! The last reply of a route repeats once its queue is down to one entry.
//! Requests without a matching route get a 404.
//!
//! Available to unit tests and, through the `mock` feature, to integration
//! tests and downstream crates.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::transport::{HttpRequest, HttpResponse, Method, Transport, TransportError};

/// Scripted reply
pub type MockReply = Result<HttpResponse, TransportError>;

struct Route {
    method: Method,
    suffix: String,
    replies: VecDeque<MockReply>,
}

/// Mock transport for testing
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for `method` requests whose URL ends with `suffix`
    pub fn on(self, method: Method, suffix: &str, reply: MockReply) -> Self {
        self.push(method, suffix, reply);
        self
    }

    /// Queue several replies for one route, in order
    pub fn on_sequence(self, method: Method, suffix: &str, replies: Vec<MockReply>) -> Self {
        for reply in replies {
            self.push(method, suffix, reply);
        }
        self
    }

    /// Queue a reply on an already shared transport
    pub fn push(&self, method: Method, suffix: &str, reply: MockReply) {
        let mut routes = lock(&self.routes);
        match routes
            .iter_mut()
            .find(|r| r.method == method && r.suffix == suffix)
        {
            Some(route) => route.replies.push_back(reply),
            None => routes.push(Route {
                method,
                suffix: suffix.to_string(),
                replies: VecDeque::from([reply]),
            }),
        }
    }

    /// All requests seen so far, oldest first
    pub fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Number of requests seen for one route
    pub fn count(&self, method: Method, suffix: &str) -> usize {
        lock(&self.requests)
            .iter()
            .filter(|r| r.method == method && r.url.ends_with(suffix))
            .count()
    }

    fn reply_for(&self, request: &HttpRequest) -> MockReply {
        let mut routes = lock(&self.routes);
        // Longest suffix wins so "/async/1/phase" is not answered by "/phase"
        let route = routes
            .iter_mut()
            .filter(|r| r.method == request.method && request.url.ends_with(&r.suffix))
            .max_by_key(|r| r.suffix.len());

        match route {
            Some(route) if route.replies.len() > 1 => route
                .replies
                .pop_front()
                .unwrap_or_else(|| Ok(not_found(request))),
            Some(route) => route
                .replies
                .front()
                .cloned()
                .unwrap_or_else(|| Ok(not_found(request))),
            None => Ok(not_found(request)),
        }
    }
}

// A poisoned script is still readable
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn not_found(request: &HttpRequest) -> HttpResponse {
    HttpResponse::new(
        404,
        format!("no mock route for {:?} {}", request.method, request.url),
    )
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let reply = self.reply_for(&request);
        lock(&self.requests).push(request);
        reply
    }
}
