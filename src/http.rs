//! The collaborator seams the loader drives: playlist requests and refresh timers.
//!
//! Both are fire-and-forget. Results come back to the loader through
//! [`PlaylistLoader::handle_response`](crate::PlaylistLoader::handle_response)
//! and [`PlaylistLoader::handle_refresh_timer`](crate::PlaylistLoader::handle_refresh_timer),
//! tagged with the token they were issued with.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;

/// Generation token of one playlist request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

/// Generation token of one armed refresh timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "req#{}", self.0)
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub id: RequestId,
    /// Absolute URI of the playlist.
    pub uri: String,
    pub with_credentials: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Bytes,
    /// Transfer rate observed for this response, in bits per second.
    pub bandwidth: Option<f64>,
}

impl FetchResponse {
    pub fn ok(body: impl Into<Bytes>) -> FetchResponse {
        FetchResponse {
            status: 200,
            body: body.into(),
            bandwidth: None,
        }
    }

    pub fn with_bandwidth(mut self, bandwidth: f64) -> FetchResponse {
        self.bandwidth = Some(bandwidth);
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The request never produced an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub reason: String,
}

impl FetchError {
    pub fn new(reason: impl Into<String>) -> FetchError {
        FetchError {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

pub type FetchResult = Result<FetchResponse, FetchError>;

/// Issues playlist GET requests.
pub trait HttpClient {
    fn fetch(&mut self, request: FetchRequest);

    /// Must be safe to call for requests that already completed or were
    /// already aborted.
    fn abort(&mut self, id: RequestId);
}

/// Arms and cancels the live refresh timer.
pub trait RefreshScheduler {
    fn schedule(&mut self, id: TimerId, delay: Duration);

    /// Must be safe to call for timers that already fired.
    fn cancel(&mut self, id: TimerId);
}
