mod common;

use common::spawn_app;
use reqwest::Method;

fn assert_cors_headers(response: &reqwest::Response) {
    let headers = response.headers();
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert_eq!(headers["access-control-allow-methods"], "GET, POST, OPTIONS");
    assert_eq!(headers["access-control-allow-headers"], "Content-Type");
}

#[tokio::test]
async fn options_on_any_route_is_an_empty_ok() {
    let app = spawn_app().await;

    for path in ["/sse", "/messages", "/messages?sessionId=abc", "/nowhere"] {
        let response = app
            .client
            .request(Method::OPTIONS, format!("{}{}", app.address, path))
            .send()
            .await
            .expect("Failed to execute request.");

        assert_eq!(response.status().as_u16(), 200, "OPTIONS {}", path);
        assert_cors_headers(&response);
        assert_eq!(response.text().await.unwrap(), "", "OPTIONS {}", path);
    }
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(format!("{}/health_check", app.address))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status().as_u16(), 404);
    assert_cors_headers(&response);
    assert_eq!(response.headers()["content-type"], "text/plain");
    assert_eq!(response.text().await.unwrap(), "Page not found\n");
}

#[tokio::test]
async fn wrong_method_on_known_path_is_not_allowed() {
    let app = spawn_app().await;

    for (method, path) in [
        (Method::DELETE, "/messages"),
        (Method::GET, "/messages"),
        (Method::POST, "/sse"),
    ] {
        let response = app
            .client
            .request(method.clone(), format!("{}{}", app.address, path))
            .send()
            .await
            .expect("Failed to execute request.");

        assert_eq!(response.status().as_u16(), 405, "{} {}", method, path);
        assert_cors_headers(&response);
        assert_eq!(response.text().await.unwrap(), "Method not allowed\n");
    }
}

#[tokio::test]
async fn message_for_unknown_session_is_rejected() {
    let app = spawn_app().await;
    let body = serde_json::json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" });

    for session_id in ["3f1c2d9e-8a7b-4c6d-9e0f-112233445566", "not-a-uuid", ""] {
        let response = app.post_message(session_id, &body).await;

        assert_eq!(response.status().as_u16(), 400, "sessionId={:?}", session_id);
        assert_eq!(
            response.text().await.unwrap(),
            format!("No transport found for sessionId '{}'\n", session_id)
        );
    }

    let response = app
        .client
        .post(format!("{}/messages", app.address))
        .json(&body)
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(response.status().as_u16(), 400);

    assert!(app.sessions.is_empty());
}
