use actix_web::http::{Method, StatusCode};
use actix_web::{HttpRequest, HttpResponse};

/// Plain-text response, newline terminated
pub fn text_response(status: StatusCode, text: &str) -> HttpResponse {
    HttpResponse::build(status)
        .content_type("text/plain")
        .body(format!("{}\n", text))
}

/// CORS preflight on any route: 200 with an empty body
pub async fn preflight() -> HttpResponse {
    HttpResponse::Ok().finish()
}

/// Known path, unsupported method
pub async fn method_not_allowed(req: HttpRequest) -> HttpResponse {
    if req.method() == Method::OPTIONS {
        return preflight().await;
    }

    tracing::debug!("[{}] {} not allowed", req.method(), req.path());
    text_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

/// Anything the router does not know
pub async fn not_found(req: HttpRequest) -> HttpResponse {
    if req.method() == Method::OPTIONS {
        return preflight().await;
    }

    text_response(StatusCode::NOT_FOUND, "Page not found")
}
