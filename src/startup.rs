use crate::configuration::Settings;
use crate::mcp::{self, Dispatcher, SessionManager};
use crate::routes;
use actix_web::{dev::Server, middleware, web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;
use tracing_actix_web::TracingLogger;

/// Headers sent on every response: any origin may call this server.
fn cors_headers() -> middleware::DefaultHeaders {
    middleware::DefaultHeaders::new()
        .add(("Access-Control-Allow-Origin", "*"))
        .add(("Access-Control-Allow-Methods", "GET, POST, OPTIONS"))
        .add(("Access-Control-Allow-Headers", "Content-Type"))
}

/// Build the HTTP event-stream server on an already bound listener.
///
/// Signal handling is left to the caller (see [`shutdown_signal`]) so open
/// event streams can be closed before the server drains its connections.
pub fn run(
    listener: TcpListener,
    settings: Settings,
    dispatcher: Dispatcher,
    sessions: Arc<SessionManager>,
) -> Result<Server, std::io::Error> {
    let http_settings = web::Data::new(settings.http);
    let dispatcher = web::Data::new(dispatcher);
    let sessions = web::Data::from(sessions);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .wrap(cors_headers())
            .app_data(http_settings.clone())
            .app_data(dispatcher.clone())
            .app_data(sessions.clone())
            .service(
                web::resource(mcp::SSE_PATH)
                    .route(web::get().to(mcp::sse::open_event_channel))
                    .default_service(web::to(routes::method_not_allowed)),
            )
            .service(
                web::resource(mcp::MESSAGES_PATH)
                    .route(web::post().to(mcp::sse::submit_message))
                    .default_service(web::to(routes::method_not_allowed)),
            )
            .default_service(web::to(routes::not_found))
    })
    .disable_signals()
    .listen(listener)?
    .run();

    Ok(server)
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
