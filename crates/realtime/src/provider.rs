//! # Provider
//!
//! Provider defines external data interfaces for the workspace.

use std::any::Any;
use std::error::Error;

use anyhow::Result;
use bytes::Bytes;
use http::{Request, Response};
use http_body::Body;

/// The `HttpRequest` trait defines the behavior for fetching data from a source.
///
/// Implemented by the host application; the HTTP-backed position feed and
/// routing service are built on top of it.
pub trait HttpRequest: Send + Sync {
    /// Make outbound HTTP request.
    fn fetch<T>(&self, request: Request<T>) -> impl Future<Output = Result<Response<Bytes>>> + Send
    where
        T: Body + Any + Send,
        T::Data: Into<Vec<u8>>,
        T::Error: Into<Box<dyn Error + Send + Sync + 'static>>;
}
