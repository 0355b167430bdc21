//! Endpoint registration.
//!
//! Each endpoint pairs a method and compiled route with one of a small fixed
//! set of handler shapes, chosen at registration time:
//!
//! ```ignore
//! let endpoints = vec![
//!     get("/")?.with(|req| Ok(Response::text("hello"))),
//!     get("/accounts/{id}")?.with_async(load_account),
//!     get("/ws")?.with_upgrade(|req| websocket::accept(req, echo)),
//!     get("/metrics")?.with(report).limit_rate(1),
//! ];
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::http::request::{Method, Request};
use crate::http::response::Response;
use crate::http::websocket::UpgradeResponse;
use crate::ratelimit::LeakyBucket;
use crate::routing::route::{Route, RouteError};

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

pub type SyncHandler = Arc<dyn Fn(&Request) -> anyhow::Result<Response> + Send + Sync>;
pub type AsyncHandler = Arc<dyn Fn(Request) -> BoxFuture<anyhow::Result<Response>> + Send + Sync>;
pub type UpgradeHandler = Arc<dyn Fn(&Request) -> UpgradeResponse + Send + Sync>;

/// The handler shapes an endpoint can carry.
#[derive(Clone)]
pub enum Handler {
    /// Computes the response on tokio's blocking pool
    Sync(SyncHandler),
    /// Returns a future that resolves to the response
    Async(AsyncHandler),
    /// Decides a WebSocket upgrade
    Upgrade(UpgradeHandler),
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Sync(_) => f.write_str("Handler::Sync"),
            Handler::Async(_) => f.write_str("Handler::Async"),
            Handler::Upgrade(_) => f.write_str("Handler::Upgrade"),
        }
    }
}

pub struct Endpoint {
    pub method: Method,
    pub route: Route,
    pub handler: Handler,
    /// Present only on rate-limited endpoints
    pub bucket: Option<Arc<LeakyBucket>>,
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("method", &self.method)
            .field("route", &self.route.template())
            .field("handler", &self.handler)
            .field("rate_limited", &self.bucket.is_some())
            .finish()
    }
}

impl Endpoint {
    pub fn new(method: Method, route: Route, handler: Handler) -> Self {
        Self {
            method,
            route,
            handler,
            bucket: None,
        }
    }

    /// Limits the endpoint to `requests_per_second`, allowing bursts of the same size.
    pub fn limit_rate(self, requests_per_second: u32) -> Self {
        self.limit_rate_burst(requests_per_second, requests_per_second)
    }

    pub fn limit_rate_burst(mut self, requests_per_second: u32, burst_requests_per_second: u32) -> Self {
        self.bucket = Some(Arc::new(LeakyBucket::new(
            burst_requests_per_second,
            requests_per_second,
        )));
        self
    }

    /// Takes one unit from the endpoint's rate budget. Always `true` when the
    /// endpoint is not rate limited.
    pub fn admit(&self) -> bool {
        self.bucket.as_ref().is_none_or(|bucket| bucket.fill(1))
    }
}

/// A method and route waiting for a handler.
#[derive(Debug)]
pub struct EndpointBuilder {
    method: Method,
    route: Route,
}

impl EndpointBuilder {
    pub fn new(method: Method, template: &str) -> Result<Self, RouteError> {
        Ok(Self {
            method,
            route: Route::parse(template)?,
        })
    }

    pub fn with<F>(self, handler: F) -> Endpoint
    where
        F: Fn(&Request) -> anyhow::Result<Response> + Send + Sync + 'static,
    {
        Endpoint::new(self.method, self.route, Handler::Sync(Arc::new(handler)))
    }

    pub fn with_async<F, Fut>(self, handler: F) -> Endpoint
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Response>> + Send + 'static,
    {
        let boxed: AsyncHandler =
            Arc::new(move |req: Request| -> BoxFuture<anyhow::Result<Response>> {
                Box::pin(handler(req))
            });
        Endpoint::new(self.method, self.route, Handler::Async(boxed))
    }

    pub fn with_upgrade<F>(self, handler: F) -> Endpoint
    where
        F: Fn(&Request) -> UpgradeResponse + Send + Sync + 'static,
    {
        Endpoint::new(self.method, self.route, Handler::Upgrade(Arc::new(handler)))
    }

    /// Runs `action` and answers 204 No Content.
    pub fn with_action<F>(self, action: F) -> Endpoint
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.with(move |_| {
            action();
            Ok(Response::no_content())
        })
    }
}

pub fn route(method: Method, template: &str) -> Result<EndpointBuilder, RouteError> {
    EndpointBuilder::new(method, template)
}

pub fn get(template: &str) -> Result<EndpointBuilder, RouteError> {
    route(Method::GET, template)
}

pub fn post(template: &str) -> Result<EndpointBuilder, RouteError> {
    route(Method::POST, template)
}

pub fn put(template: &str) -> Result<EndpointBuilder, RouteError> {
    route(Method::PUT, template)
}

pub fn delete(template: &str) -> Result<EndpointBuilder, RouteError> {
    route(Method::DELETE, template)
}

pub fn patch(template: &str) -> Result<EndpointBuilder, RouteError> {
    route(Method::PATCH, template)
}

pub fn head(template: &str) -> Result<EndpointBuilder, RouteError> {
    route(Method::HEAD, template)
}

pub fn options(template: &str) -> Result<EndpointBuilder, RouteError> {
    route(Method::OPTIONS, template)
}
