// MoodTune HTTP server - axum app serving the streaming chat relay,
// the JSON APIs, and (when a built bundle is present) the web UI

pub mod routes;
pub mod streaming;

use axum::{
    http::{HeaderValue, Method},
    Router,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};

use crate::config::AppConfig;

/// Shared state for request handlers: the process-wide read-only config.
/// Handlers construct short-lived API clients from it; nothing here is
/// mutated after startup, so concurrent requests share nothing mutable.
pub struct ServerState {
    pub config: AppConfig,
}

/// Assemble the router: API + relay routes, optional static UI, CORS.
pub fn build_app(state: Arc<ServerState>, ui_dist_path: Option<PathBuf>) -> Router {
    // CORS is permissive; there is no auth layer in this app
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(["content-type".parse().unwrap()])
        .allow_origin("*".parse::<HeaderValue>().unwrap());

    let api_routes = Router::new()
        .merge(routes::api_routes())
        .merge(streaming::stream_routes())
        .with_state(state);

    match ui_dist_path.filter(|p| p.join("index.html").exists()) {
        Some(dist_path) => {
            eprintln!("[server] Serving UI from {:?}", dist_path);
            let index_html = dist_path.join("index.html");
            api_routes
                .fallback_service(ServeDir::new(&dist_path).fallback(ServeFile::new(index_html)))
                .layer(cors)
        }
        None => {
            eprintln!("[server] No UI dist found, API-only mode");
            api_routes.layer(cors)
        }
    }
}

/// Start the HTTP server and run until a shutdown signal arrives.
pub async fn start_server(config: AppConfig, ui_dist_path: Option<PathBuf>) -> Result<(), String> {
    let preferred_port = config.port;
    let state = Arc::new(ServerState { config });
    let app = build_app(state, ui_dist_path);

    let addr = try_bind(preferred_port).await?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;
    let actual_addr = listener
        .local_addr()
        .map_err(|e| format!("Failed to get local addr: {}", e))?;

    eprintln!("[server] Listening on http://{}", actual_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| format!("Server error: {}", e))?;

    eprintln!("[server] Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        eprintln!("[server] Shutdown signal received, draining connections...");
    }
}

/// Try to bind to the given port, with fallback to nearby ports then
/// an OS-assigned one.
async fn try_bind(preferred_port: u16) -> Result<SocketAddr, String> {
    // Try preferred port
    let addr = SocketAddr::from(([0, 0, 0, 0], preferred_port));
    if let Ok(listener) = tokio::net::TcpListener::bind(addr).await {
        drop(listener);
        return Ok(addr);
    }

    // Try ports preferred+1 through preferred+10
    for offset in 1..=10u16 {
        let port = preferred_port.saturating_add(offset);
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        if let Ok(listener) = tokio::net::TcpListener::bind(addr).await {
            drop(listener);
            eprintln!(
                "[server] Port {} unavailable, using {}",
                preferred_port, port
            );
            return Ok(addr);
        }
    }

    // Fall back to OS-assigned port
    let addr = SocketAddr::from(([0, 0, 0, 0], 0u16));
    if let Ok(listener) = tokio::net::TcpListener::bind(addr).await {
        let actual = listener.local_addr().map_err(|e| e.to_string())?;
        drop(listener);
        eprintln!(
            "[server] All preferred ports unavailable, OS assigned port {}",
            actual.port()
        );
        return Ok(actual);
    }

    Err("Failed to bind to any port".to_string())
}
