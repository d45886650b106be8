//! HTTP API tests against the router with in-memory stores

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use futures_util::StreamExt;
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    use kibo_server::config::Config;
    use kibo_server::middleware::RateLimiter;
    use kibo_server::realtime::ChangeFeed;
    use kibo_server::state::{AppState, Stores};
    use kibo_server::storage::MemoryBlobStore;

    const BOUNDARY: &str = "kibo-test-boundary";

    /// Helper to build the app with fresh in-memory state
    fn test_app() -> Router {
        let feed = ChangeFeed::new(64);
        let stores = Stores::in_memory(&feed, Arc::new(MemoryBlobStore::new()));
        let state = AppState::build(&Config::default(), stores, feed).unwrap();
        let upload_dir = std::env::temp_dir().join("kibo-api-tests");
        kibo_server::create_app(state, upload_dir, RateLimiter::new(1000))
    }

    fn request(method: &str, uri: &str, identity: Option<(&str, &str)>) -> axum::http::request::Builder {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((user_id, role)) = identity {
            builder = builder
                .header("x-user-id", user_id)
                .header("x-user-role", role);
        }
        builder
    }

    fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &str)>) -> Body {
        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(&format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            ));
        }
        if let Some((name, file_name)) = file {
            body.push_str(&format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: image/png\r\n\r\nfake-png-bytes\r\n",
                BOUNDARY, name, file_name
            ));
        }
        body.push_str(&format!("--{}--\r\n", BOUNDARY));
        Body::from(body)
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn create_order(app: &Router, owner: &str) -> Value {
        let response = app
            .clone()
            .oneshot(
                request("POST", "/orders", Some((owner, "user")))
                    .header(
                        "content-type",
                        format!("multipart/form-data; boundary={}", BOUNDARY),
                    )
                    .body(multipart_body(
                        &[
                            ("fiat_amount", "500.00"),
                            ("fiat_currency", "MXN"),
                            ("crypto_amount", "27.5"),
                            ("crypto_currency", "USDT"),
                            ("network", "POLYGON"),
                        ],
                        Some(("qr", "qr.png")),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        json_body(response).await["data"].clone()
    }

    async fn next_frame<S>(body: &mut S) -> String
    where
        S: futures_util::Stream<Item = Result<axum::body::Bytes, axum::Error>> + Unpin,
    {
        let bytes = tokio::time::timeout(Duration::from_secs(2), body.next())
            .await
            .expect("stream stalled")
            .expect("stream ended")
            .expect("body error");
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn patch_order(app: &Router, path: &str, identity: (&str, &str)) -> StatusCode {
        app.clone()
            .oneshot(
                request("PATCH", path, Some(identity))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_health_and_banner() {
        let app = test_app();

        let response = app
            .clone()
            .oneshot(request("GET", "/health", None).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "healthy");

        let response = app
            .oneshot(request("GET", "/", None).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"Kibo API Server");
    }

    #[tokio::test]
    async fn test_missing_identity_is_unauthorized() {
        let app = test_app();

        let response = app
            .oneshot(request("GET", "/orders", None).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_create_and_fetch_order() {
        let app = test_app();
        let order = create_order(&app, "did:privy:owner").await;

        assert_eq!(order["status"], "PENDING_PAYMENT");
        assert_eq!(order["fiat_amount"], "500.00");
        assert_eq!(order["network"], "POLYGON");
        assert!(order["qr_image_url"].as_str().unwrap().starts_with("memory://qr/"));

        let id = order["id"].as_str().unwrap();
        let response = app
            .clone()
            .oneshot(
                request("GET", &format!("/orders/{}", id), Some(("did:privy:owner", "user")))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let details = json_body(response).await;
        assert_eq!(details["data"]["id"], id);
        assert!(details["data"]["seconds_remaining"].as_i64().unwrap() > 0);

        // A stranger may not look at it
        let response = app
            .oneshot(
                request("GET", &format!("/orders/{}", id), Some(("did:privy:other", "user")))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_create_order_without_qr_is_rejected() {
        let app = test_app();

        let response = app
            .oneshot(
                request("POST", "/orders", Some(("did:privy:owner", "user")))
                    .header(
                        "content-type",
                        format!("multipart/form-data; boundary={}", BOUNDARY),
                    )
                    .body(multipart_body(
                        &[
                            ("fiat_amount", "500"),
                            ("fiat_currency", "MXN"),
                            ("crypto_amount", "27.5"),
                            ("crypto_currency", "USDT"),
                        ],
                        None,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["code"], "MISSING_FIELD");
    }

    #[tokio::test]
    async fn test_role_checks_on_transitions() {
        let app = test_app();
        let order = create_order(&app, "did:privy:owner").await;
        let id = order["id"].as_str().unwrap();

        // Only admins confirm payment
        let status = patch_order(
            &app,
            &format!("/orders/{}/confirm-payment", id),
            ("did:privy:owner", "user"),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let status = patch_order(
            &app,
            &format!("/orders/{}/confirm-payment", id),
            ("did:privy:admin", "admin"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        // Users cannot take orders
        let status = patch_order(
            &app,
            &format!("/orders/{}/take", id),
            ("did:privy:owner", "user"),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let status = patch_order(
            &app,
            &format!("/orders/{}/take", id),
            ("did:privy:ally-1", "ally"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        // Second taker loses
        let status = patch_order(
            &app,
            &format!("/orders/{}/take", id),
            ("did:privy:ally-2", "ally"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_order_stream_sends_snapshot_then_updates() {
        let app = test_app();
        let order = create_order(&app, "did:privy:owner").await;
        let id = order["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(
                request(
                    "GET",
                    &format!("/orders/{}/realtime", id),
                    Some(("did:privy:owner", "user")),
                )
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/event-stream"
        );

        let mut body = response.into_body().into_data_stream();

        let first = next_frame(&mut body).await;
        assert!(first.contains("\"type\":\"initial_data\""));
        assert!(first.contains(&id));

        let status = patch_order(
            &app,
            &format!("/orders/{}/confirm-payment", id),
            ("did:privy:admin", "admin"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let update = next_frame(&mut body).await;
        assert!(update.contains("\"type\":\"update\""));
        assert!(update.contains("\"status\":\"AVAILABLE\""));
    }

    #[tokio::test]
    async fn test_stream_requires_visibility() {
        let app = test_app();
        let order = create_order(&app, "did:privy:owner").await;
        let id = order["id"].as_str().unwrap();

        let response = app
            .oneshot(
                request(
                    "GET",
                    &format!("/orders/{}/realtime", id),
                    Some(("did:privy:ally-9", "ally")),
                )
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_quote_rejects_out_of_range_amount() {
        let app = test_app();

        let response = app
            .oneshot(
                request(
                    "GET",
                    "/quote?fiat_amount=5&fiat_currency=MXN&crypto_currency=USDT&network=POLYGON",
                    Some(("did:privy:owner", "user")),
                )
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_quote_requires_identity() {
        let app = test_app();

        let response = app
            .oneshot(
                request(
                    "GET",
                    "/quote?fiat_amount=500&fiat_currency=MXN&crypto_currency=USDT",
                    None,
                )
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"]["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_malformed_requests_use_error_envelope() {
        let app = test_app();
        let owner = Some(("did:privy:owner", "user"));

        // Path that is not a uuid
        let response = app
            .clone()
            .oneshot(
                request("GET", "/orders/not-a-uuid", owner)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        // Query value of the wrong type
        let response = app
            .clone()
            .oneshot(
                request("GET", "/orders?limit=many", owner)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["code"], "VALIDATION_ERROR");

        // JSON body that does not parse
        let response = app
            .clone()
            .oneshot(
                request("PATCH", "/users/me", owner)
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["code"], "VALIDATION_ERROR");

        // Multipart upload without a multipart content type
        let response = app
            .oneshot(
                request("POST", "/orders", owner)
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_huge_offset_is_clamped() {
        let app = test_app();
        create_order(&app, "did:privy:owner").await;

        let response = app
            .oneshot(
                request(
                    "GET",
                    &format!("/orders?offset={}", i64::MAX),
                    Some(("did:privy:owner", "user")),
                )
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["data"]["orders"].as_array().unwrap().len(), 0);
        assert_eq!(body["data"]["pagination"]["has_more"], false);
    }
}
