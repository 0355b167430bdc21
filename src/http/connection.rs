use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use bytes::{Buf, BytesMut};
use futures_util::FutureExt;
use tokio::io::AsyncReadExt;

use crate::config::Config;
use crate::http::parser::{ParseError, ParseState, try_parse_http_request};
use crate::http::request::{Method, Request, RequestError};
use crate::http::response::{Response, StatusCode};
use crate::http::websocket::{self, Io, OnAccepted, UpgradeResponse};
use crate::http::writer::ResponseWriter;
use crate::metrics::{RequestLog, ServerMetrics};
use crate::routing::endpoint::BoxFuture;
use crate::routing::{Handler, RouteTable};

/// Everything sessions share: the route table, metrics and limits.
pub struct SessionContext {
    pub routes: RouteTable,
    pub metrics: Arc<ServerMetrics>,
    pub read_buffer_size: usize,
    pub max_header_bytes: usize,
    pub max_body_bytes: usize,
    pub handler_timeout: Option<Duration>,
}

impl SessionContext {
    pub fn new(routes: RouteTable, metrics: Arc<ServerMetrics>, cfg: &Config) -> Self {
        Self {
            routes,
            metrics,
            read_buffer_size: cfg.server.read_buffer_size,
            max_header_bytes: cfg.limits.max_header_bytes,
            max_body_bytes: cfg.limits.max_body_bytes,
            handler_timeout: cfg.handler_timeout(),
        }
    }
}

/// One accepted socket and the request/response cycle running on it.
pub struct Connection<S> {
    stream: S,
    remote_addr: SocketAddr,
    is_secure: bool,
    ctx: Arc<SessionContext>,
    buffer: BytesMut,
    cursor: usize,
    parse_state: ParseState,
    state: ConnectionState,
}

pub enum ConnectionState {
    Reading,
    Dispatching(Request, Instant),
    Writing(Exchange),
    Upgrading(Exchange, OnAccepted),
    Closed,
}

/// A response on its way out plus what gets logged once it is written.
///
/// `method` is `None` when the request line never parsed.
pub struct Exchange {
    writer: ResponseWriter,
    keep_alive: bool,
    method: Option<Method>,
    path: String,
    started: Instant,
}

impl Exchange {
    fn new(
        writer: ResponseWriter,
        keep_alive: bool,
        method: Option<Method>,
        path: String,
        started: Instant,
    ) -> Self {
        Self {
            writer,
            keep_alive,
            method,
            path,
            started,
        }
    }
}

enum ReadOutcome {
    Request(Request, Instant),
    Malformed(ParseError, Partial, Instant),
    Closed,
}

/// What is known about a request that failed to parse.
struct Partial {
    method: Option<Method>,
    path: String,
}

enum Exit {
    Closed,
    Upgrade(OnAccepted),
}

/// Result of running a handler.
enum Outcome {
    Respond(Response, bool),
    Upgrade(websocket::AcceptUpgrade),
}

impl<S: Io + 'static> Connection<S> {
    pub fn new(stream: S, remote_addr: SocketAddr, is_secure: bool, ctx: Arc<SessionContext>) -> Self {
        let buffer = BytesMut::with_capacity(ctx.read_buffer_size);
        Self {
            stream,
            remote_addr,
            is_secure,
            ctx,
            buffer,
            cursor: 0,
            parse_state: ParseState::AwaitingRequestLine,
            state: ConnectionState::Reading,
        }
    }

    /// Serves requests until the peer closes, a response asks for close, or
    /// the socket is upgraded. Errors are transport failures only.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let _open = self.ctx.metrics.connection_opened();

        match self.drive().await? {
            Exit::Closed => Ok(()),
            Exit::Upgrade(on_accepted) => {
                let buffered = self.buffer.split().to_vec();
                tracing::debug!(buffered = buffered.len(), "Handing socket to websocket session");
                websocket::hand_off(Box::new(self.stream), buffered, on_accepted).await;
                Ok(())
            }
        }
    }

    async fn drive(&mut self) -> anyhow::Result<Exit> {
        loop {
            let state = std::mem::replace(&mut self.state, ConnectionState::Closed);

            self.state = match state {
                ConnectionState::Reading => match self.read_request().await? {
                    ReadOutcome::Request(req, started) => ConnectionState::Dispatching(req, started),
                    ReadOutcome::Malformed(err, partial, started) => {
                        tracing::warn!(error = %err, status = err.status().as_u16(), "Malformed request");
                        let response = Response::error(err.status(), &err.to_string());
                        ConnectionState::Writing(Exchange::new(
                            ResponseWriter::new(&response, false),
                            false,
                            partial.method,
                            partial.path,
                            started,
                        ))
                    }
                    ReadOutcome::Closed => ConnectionState::Closed,
                },

                ConnectionState::Dispatching(req, started) => {
                    Self::dispatch(Arc::clone(&self.ctx), req, started).await
                }

                ConnectionState::Writing(mut exchange) => {
                    exchange.writer.write_to_stream(&mut self.stream).await?;
                    self.record(&exchange);

                    if exchange.keep_alive {
                        self.parse_state.reset();
                        ConnectionState::Reading
                    } else {
                        ConnectionState::Closed
                    }
                }

                ConnectionState::Upgrading(mut exchange, on_accepted) => {
                    exchange.writer.write_to_stream(&mut self.stream).await?;
                    self.record(&exchange);
                    return Ok(Exit::Upgrade(on_accepted));
                }

                ConnectionState::Closed => return Ok(Exit::Closed),
            };
        }
    }

    /// Feeds socket reads to the parser until one request is complete.
    async fn read_request(&mut self) -> anyhow::Result<ReadOutcome> {
        let mut request = Request::new(self.remote_addr, self.is_secure);
        let mut started = Instant::now();

        loop {
            let parsed = try_parse_http_request(
                &self.buffer,
                &mut self.cursor,
                &mut self.parse_state,
                &mut request,
            );

            match parsed {
                Ok(done) => {
                    if let Some(err) = self.check_limits(&request) {
                        return Ok(ReadOutcome::Malformed(err, self.partial(request), started));
                    }
                    if done {
                        self.buffer.advance(self.cursor);
                        self.cursor = 0;
                        return Ok(ReadOutcome::Request(request, started));
                    }
                }
                Err(err) => {
                    return Ok(ReadOutcome::Malformed(err, self.partial(request), started));
                }
            }

            if self.buffer.capacity() - self.buffer.len() < 512 {
                self.buffer.reserve(self.ctx.read_buffer_size);
            }

            let idle = self.parse_state == ParseState::AwaitingRequestLine
                && self.buffer[self.cursor..].iter().all(u8::is_ascii_whitespace);

            let n = self.stream.read_buf(&mut self.buffer).await?;
            if n == 0 {
                if idle {
                    // Client closed between requests
                    return Ok(ReadOutcome::Closed);
                }
                let partial = self.partial(request);
                return Ok(ReadOutcome::Malformed(ParseError::UnexpectedEof, partial, started));
            }

            if idle {
                started = Instant::now();
            }
        }
    }

    fn partial(&self, request: Request) -> Partial {
        let method = (self.parse_state != ParseState::AwaitingRequestLine).then_some(request.method);
        Partial {
            method,
            path: request.path,
        }
    }

    /// The buffer starts at the current request, so the head is everything
    /// buffered while headers are pending and everything before the body after.
    fn check_limits(&self, request: &Request) -> Option<ParseError> {
        let head_len = match self.parse_state {
            ParseState::AwaitingRequestLine | ParseState::AwaitingHeaders => self.buffer.len(),
            ParseState::AwaitingBody => self.cursor,
            ParseState::Completed => self.cursor.saturating_sub(request.content_length),
        };

        if head_len > self.ctx.max_header_bytes {
            return Some(ParseError::HeadersTooLarge(self.ctx.max_header_bytes));
        }
        if request.content_length > self.ctx.max_body_bytes {
            return Some(ParseError::PayloadTooLarge(request.content_length));
        }
        None
    }

    /// Route lookup, admission check and handler invocation.
    async fn dispatch(ctx: Arc<SessionContext>, mut request: Request, started: Instant) -> ConnectionState {
        let method = request.method;
        let path = request.path.clone();
        let keep_alive = request.keep_alive;

        let respond = |response: &Response, keep_alive: bool| {
            let writer = if method == Method::HEAD {
                ResponseWriter::head_only(response, keep_alive)
            } else {
                ResponseWriter::new(response, keep_alive)
            };
            ConnectionState::Writing(Exchange::new(
                writer,
                keep_alive,
                Some(method),
                path.clone(),
                started,
            ))
        };

        let Some(matched) = ctx.routes.try_match(method, &request.path) else {
            tracing::debug!(%method, %path, "No route matched");
            return respond(&Response::not_found(), keep_alive);
        };

        let endpoint = &ctx.routes[matched.index];
        if !endpoint.admit() {
            tracing::warn!(%method, route = %endpoint.route, "Rate limit exceeded");
            return respond(&Response::too_many_requests(), keep_alive);
        }

        request.path_variables = matched.path_variables;
        request.wildcard = matched.wildcard;

        match Self::invoke(&ctx, &endpoint.handler, request).await {
            Outcome::Respond(response, handler_ok) => {
                // A close from either side wins
                let keep_alive = keep_alive && handler_ok && !response.asks_close();
                respond(&response, keep_alive)
            }
            Outcome::Upgrade(accept) => {
                let writer = ResponseWriter::new(&accept.response(), false);
                let exchange = Exchange::new(writer, false, Some(method), path.clone(), started);
                ConnectionState::Upgrading(exchange, accept.into_continuation())
            }
        }
    }

    async fn invoke(ctx: &SessionContext, handler: &Handler, request: Request) -> Outcome {
        let method = request.method;
        let path = request.path.clone();

        // Err means the handler panicked
        let future: BoxFuture<Result<anyhow::Result<Response>, ()>> = match handler {
            Handler::Sync(handler) => {
                // May block; keep it off the session task
                let handler = Arc::clone(handler);
                let joined = tokio::task::spawn_blocking(move || handler(&request));
                Box::pin(joined.map(|r| r.map_err(drop)))
            }
            Handler::Async(handler) => Box::pin(
                AssertUnwindSafe(handler(request))
                    .catch_unwind()
                    .map(|r| r.map_err(drop)),
            ),
            Handler::Upgrade(handler) => {
                return match std::panic::catch_unwind(AssertUnwindSafe(|| handler(&request))) {
                    Ok(UpgradeResponse::Accept(accept)) => Outcome::Upgrade(accept),
                    Ok(UpgradeResponse::Reject(status)) => {
                        Outcome::Respond(websocket::rejection_response(status), true)
                    }
                    Err(_) => {
                        tracing::error!(%method, %path, "Upgrade handler panicked");
                        Outcome::Respond(Response::internal_error(), true)
                    }
                };
            }
        };

        let result = match ctx.handler_timeout {
            Some(limit) => match tokio::time::timeout(limit, future).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::error!(%method, %path, ?limit, "Handler timed out");
                    let response =
                        Response::error(StatusCode::ServiceUnavailable, "503 Service Unavailable");
                    return Outcome::Respond(response, false);
                }
            },
            None => future.await,
        };

        match result {
            Ok(Ok(response)) => Outcome::Respond(response, true),
            Ok(Err(e)) => match e.downcast_ref::<RequestError>() {
                Some(invalid) => {
                    tracing::warn!(%method, %path, error = %invalid, "Handler rejected request");
                    Outcome::Respond(Response::bad_request(&invalid.to_string()), true)
                }
                None => {
                    tracing::error!(%method, %path, error = %e, "Handler failed");
                    Outcome::Respond(Response::internal_error(), true)
                }
            },
            Err(_) => {
                tracing::error!(%method, %path, "Handler panicked");
                Outcome::Respond(Response::internal_error(), true)
            }
        }
    }

    fn record(&self, exchange: &Exchange) {
        let status = exchange.writer.status().as_u16();
        let elapsed = exchange.started.elapsed();

        tracing::debug!(
            method = exchange.method.map_or("-", |m| m.as_str()),
            path = %exchange.path,
            status,
            elapsed_us = elapsed.as_micros() as u64,
            "Request completed"
        );

        self.ctx.metrics.record(RequestLog {
            remote_addr: self.remote_addr,
            method: exchange.method,
            path: exchange.path.clone(),
            status,
            elapsed,
            completed_on: SystemTime::now(),
        });
    }
}
