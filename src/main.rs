use futures_util::{SinkExt, StreamExt};
use tracing_subscriber::EnvFilter;

use mhttp::config::Config;
use mhttp::http::request::Request;
use mhttp::http::response::{Response, ResponseBuilder, StatusCode};
use mhttp::http::websocket::{self, WebSocket};
use mhttp::routing::{RouteTable, get, post};
use mhttp::server::Server;

async fn get_account(req: Request) -> anyhow::Result<Response> {
    let Some(id) = req.path_variable("id").and_then(|v| v.parse::<u64>().ok()) else {
        return Ok(Response::bad_request("account id must be numeric"));
    };

    Ok(Response::text(format!("account {id}\n")))
}

fn echo_body(req: &Request) -> anyhow::Result<Response> {
    let content_type = req.content_type.as_deref().unwrap_or("application/octet-stream");
    Ok(ResponseBuilder::new(StatusCode::Ok)
        .content_type(content_type)
        .body(req.body.to_vec())
        .build())
}

async fn echo_frames(mut ws: WebSocket) {
    while let Some(Ok(msg)) = ws.next().await {
        if msg.is_close() {
            break;
        }
        if (msg.is_text() || msg.is_binary()) && ws.send(msg).await.is_err() {
            break;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = Config::load()?;
    let server = Server::new(cfg);
    let metrics = server.metrics();
    let handle = server.handle();

    let routes = RouteTable::new(vec![
        get("/")?.with(|req| {
            Ok(Response::text(format!(
                "Hello {}\n",
                req.header_or("User-Agent", "stranger")
            )))
        }),
        get("/accounts/{id}")?.with_async(get_account),
        post("/echo")?.with(echo_body),
        get("/files/*")?.with(|req| {
            Ok(Response::text(format!(
                "requested {}\n",
                req.wildcard.as_deref().unwrap_or("")
            )))
        }),
        get("/ws")?.with_upgrade(|req| websocket::accept(req, echo_frames)),
        get("/metrics")?
            .with(move |_| {
                let body = serde_json::to_vec(&metrics.report())?;
                Ok(ResponseBuilder::new(StatusCode::Ok)
                    .content_type("application/json")
                    .body(body)
                    .build())
            })
            .limit_rate(1),
        post("/shutdown")?.with_action({
            let handle = handle.clone();
            move || handle.shutdown()
        }),
    ]);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            handle.shutdown();
        }
    });

    server.run(routes).await
}
