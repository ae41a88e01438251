use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, Uri, header::CONTENT_TYPE},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::middleware::{expose_error_detail, general_rate_limit, panic_response, security_headers};
use crate::state::AppState;
use crate::{health, reports, statistics};

/// 10 MB request body limit
const BODY_LIMIT: usize = 10 * 1024 * 1024;

/// Build the full application router, mounted under `/api`.
///
/// `frontend_origin` is the only origin allowed to make credentialed
/// cross-origin calls.
pub fn build(state: AppState, frontend_origin: HeaderValue) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list([frontend_origin]))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .allow_credentials(true);

    Router::new()
        .route("/api/health", get(health::health))
        .route(
            "/api/denuncias",
            get(reports::list_reports).post(reports::create_report),
        )
        .route("/api/estatisticas", get(statistics::get_statistics))
        .fallback(not_found)
        .method_not_allowed_fallback(not_found)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn_with_state(state.clone(), general_rate_limit))
        .layer(middleware::from_fn_with_state(state.clone(), expose_error_detail))
        .layer(middleware::from_fn(security_headers))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found(uri: Uri) -> Response {
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());
    AppError::NotFound(path).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        body::Body,
        extract::ConnectInfo,
        http::{Request, StatusCode, header},
    };
    use denuncia_db::Database;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::rate_limit::{RateLimitPolicy, RateLimiter};
    use crate::state::{AppStateInner, Environment};

    const ORIGIN: &str = "http://localhost:5173";

    fn test_state() -> AppState {
        let db = Arc::new(Database::open_in_memory().unwrap());
        Arc::new(AppStateInner::new(db, Environment::Production, Duration::from_secs(5)))
    }

    fn app(state: &AppState) -> Router {
        build(state.clone(), HeaderValue::from_static(ORIGIN))
    }

    fn from_ip(mut request: Request<Body>, ip: [u8; 4]) -> Request<Body> {
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((ip, 40000))));
        request
    }

    fn post_report(body: Value, ip: [u8; 4]) -> Request<Body> {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/denuncias")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::USER_AGENT, "integration-test")
            .body(Body::from(body.to_string()))
            .unwrap();
        from_ip(request, ip)
    }

    fn get(uri: &str, ip: [u8; 4]) -> Request<Body> {
        from_ip(Request::builder().uri(uri).body(Body::empty()).unwrap(), ip)
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let state = test_state();
        let (status, body) = send(app(&state), get("/api/health", [10, 0, 0, 1])).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "OK");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn create_then_list_returns_newest_first() {
        let state = test_state();

        let (status, first) = send(
            app(&state),
            post_report(json!({ "latitude": -23.5505, "longitude": -46.6333 }), [10, 0, 0, 1]),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(first["latitude"], -23.5505);
        assert_eq!(first["message"], "Denúncia registrada com sucesso");

        let (status, second) = send(
            app(&state),
            post_report(json!({ "latitude": "-22.9068", "longitude": "-43.1729" }), [10, 0, 0, 1]),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(second["id"].as_i64().unwrap() > first["id"].as_i64().unwrap());

        let (status, body) = send(app(&state), get("/api/denuncias?limit=1&offset=0", [10, 0, 0, 1])).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 2);
        assert_eq!(body["limit"], 1);
        assert_eq!(body["offset"], 0);

        let listed = body["denuncias"].as_array().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["id"], second["id"]);
        assert_eq!(listed[0]["latitude"], -22.9068);
        assert_eq!(listed[0]["timestamp"], second["timestamp"]);
        assert!(listed[0].get("client_ip").is_none());
    }

    #[tokio::test]
    async fn offset_skips_from_newest() {
        let state = test_state();
        for i in 0..3 {
            let (status, _) = send(
                app(&state),
                post_report(json!({ "latitude": i, "longitude": i }), [10, 0, 0, i as u8 + 1]),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (_, body) = send(app(&state), get("/api/denuncias?limit=5&offset=1", [10, 0, 0, 9])).await;
        let ids: Vec<i64> = body["denuncias"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(body["total"], 3);
    }

    #[tokio::test]
    async fn invalid_coordinates_are_rejected() {
        let state = test_state();

        let cases = [
            (json!({ "latitude": 91, "longitude": 0 }), "INVALID_COORDINATES"),
            (json!({ "latitude": 45.1234567, "longitude": 0 }), "INVALID_COORDINATES"),
            (json!({ "latitude": "abc", "longitude": 0 }), "INVALID_COORDINATES"),
            (json!({ "latitude": 10 }), "MISSING_COORDINATES"),
            (json!({}), "MISSING_COORDINATES"),
        ];

        // distinct IPs so the submission limit never interferes
        for (i, (body, code)) in cases.into_iter().enumerate() {
            let (status, resp) = send(app(&state), post_report(body, [10, 1, 0, i as u8])).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(resp["code"], code);
        }

        assert_eq!(state.db.list_reports(10, 0).unwrap().total, 0);
    }

    #[tokio::test]
    async fn malformed_body_counts_as_missing_coordinates() {
        let state = test_state();
        let request = from_ip(
            Request::builder()
                .method(Method::POST)
                .uri("/api/denuncias")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
            [10, 2, 0, 1],
        );
        let (status, body) = send(app(&state), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "MISSING_COORDINATES");
    }

    #[tokio::test]
    async fn submission_limit_is_per_ip() {
        let state = test_state();
        let coords = json!({ "latitude": 1.5, "longitude": 2.5 });

        for _ in 0..5 {
            let (status, _) = send(app(&state), post_report(coords.clone(), [10, 0, 0, 7])).await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let response = app(&state)
            .oneshot(post_report(coords.clone(), [10, 0, 0, 7]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key(header::RETRY_AFTER));
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "DENUNCIA_LIMIT_EXCEEDED");

        let (status, _) = send(app(&state), post_report(coords, [10, 0, 0, 8])).await;
        assert_eq!(status, StatusCode::CREATED);

        // listing is not subject to the submission policy
        let (status, body) = send(app(&state), get("/api/denuncias", [10, 0, 0, 7])).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 6);
    }

    #[tokio::test]
    async fn general_limit_covers_every_route() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let mut inner = AppStateInner::new(db, Environment::Production, Duration::from_secs(5));
        inner.general_limiter = Arc::new(RateLimiter::new(RateLimitPolicy {
            max_requests: 3,
            window: Duration::from_secs(60),
        }));
        let state: AppState = Arc::new(inner);

        let response = app(&state).oneshot(get("/api/health", [10, 3, 0, 1])).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["ratelimit-limit"], "3");
        assert_eq!(response.headers()["ratelimit-remaining"], "2");

        let (status, _) = send(app(&state), get("/api/estatisticas", [10, 3, 0, 1])).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(app(&state), get("/api/nope", [10, 3, 0, 1])).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(app(&state), get("/api/health", [10, 3, 0, 1])).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["code"], "RATE_LIMIT_EXCEEDED");

        let (status, _) = send(app(&state), get("/api/health", [10, 3, 0, 2])).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn pagination_boundaries() {
        let state = test_state();
        for uri in [
            "/api/denuncias?limit=0",
            "/api/denuncias?limit=1001",
            "/api/denuncias?offset=-1",
            "/api/denuncias?limit=ten",
        ] {
            let (status, body) = send(app(&state), get(uri, [10, 4, 0, 1])).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["code"], "INVALID_PAGINATION", "{uri}");
        }

        let (status, body) = send(app(&state), get("/api/denuncias", [10, 4, 0, 1])).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["limit"], 100);
        assert_eq!(body["offset"], 0);
    }

    #[tokio::test]
    async fn statistics_total_matches_list_total() {
        let state = test_state();
        for i in 0..4u8 {
            send(
                app(&state),
                post_report(json!({ "latitude": 1, "longitude": 1 }), [10, 5, 0, i]),
            )
            .await;
        }

        let (status, stats) = send(app(&state), get("/api/estatisticas", [10, 5, 1, 1])).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats, json!({ "total": 4, "hoje": 4, "semana": 4, "mes": 4 }));

        let (_, list) = send(app(&state), get("/api/denuncias", [10, 5, 1, 1])).await;
        assert_eq!(list["total"], stats["total"]);
    }

    #[tokio::test]
    async fn storage_failures_are_generic() {
        let state = test_state();
        state
            .db
            .with_conn(|conn| {
                conn.execute_batch("DROP TABLE denuncias")?;
                Ok(())
            })
            .unwrap();

        let (status, body) = send(app(&state), get("/api/denuncias", [10, 6, 0, 1])).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "Erro interno do servidor", "code": "DATABASE_ERROR" }));

        let (status, body) = send(app(&state), get("/api/estatisticas", [10, 6, 0, 1])).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "STATISTICS_ERROR");

        let (status, body) = send(
            app(&state),
            post_report(json!({ "latitude": 1, "longitude": 1 }), [10, 6, 0, 1]),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "DATABASE_ERROR");
    }

    #[tokio::test]
    async fn health_ignores_broken_database() {
        let state = test_state();
        state
            .db
            .with_conn(|conn| {
                conn.execute_batch("DROP TABLE denuncias")?;
                Ok(())
            })
            .unwrap();

        let (status, body) = send(app(&state), get("/api/health", [10, 6, 0, 2])).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "OK");
    }

    #[tokio::test]
    async fn timed_out_submission_is_not_stored() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let state: AppState = Arc::new(AppStateInner::new(
            db.clone(),
            Environment::Production,
            Duration::from_millis(50),
        ));

        // keep the connection busy well past the storage timeout
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let holder_db = db.clone();
        let holder = std::thread::spawn(move || {
            holder_db
                .with_conn(|_| {
                    locked_tx.send(()).ok();
                    std::thread::sleep(Duration::from_millis(300));
                    Ok(())
                })
                .unwrap();
        });
        locked_rx.recv().unwrap();

        let (status, body) = send(
            app(&state),
            post_report(json!({ "latitude": 1, "longitude": 1 }), [10, 6, 0, 3]),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "DATABASE_ERROR");

        holder.join().unwrap();
        // give the abandoned task time to take the lock and give up
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(db.list_reports(10, 0).unwrap().total, 0);
    }

    #[tokio::test]
    async fn unknown_routes_and_methods_are_not_found() {
        let state = test_state();

        let (status, body) = send(app(&state), get("/api/outra?x=1", [10, 7, 0, 1])).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
        assert_eq!(body["path"], "/api/outra?x=1");

        let request = from_ip(
            Request::builder()
                .method(Method::DELETE)
                .uri("/api/denuncias")
                .body(Body::empty())
                .unwrap(),
            [10, 7, 0, 1],
        );
        let (status, body) = send(app(&state), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["path"], "/api/denuncias");
    }

    async fn explode() -> &'static str {
        panic!("handler exploded")
    }

    fn panicking_app(environment: Environment) -> Router {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let state: AppState = Arc::new(AppStateInner::new(db, environment, Duration::from_secs(5)));
        Router::new()
            .route("/api/explode", axum::routing::get(explode))
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(middleware::from_fn_with_state(state.clone(), expose_error_detail))
            .with_state(state)
    }

    #[tokio::test]
    async fn panics_become_internal_errors_without_detail_in_production() {
        let request = Request::builder().uri("/api/explode").body(Body::empty()).unwrap();
        let (status, body) = send(panicking_app(Environment::Production), request).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "Erro interno do servidor", "code": "INTERNAL_ERROR" }));
    }

    #[tokio::test]
    async fn development_echoes_internal_detail() {
        let request = Request::builder().uri("/api/explode").body(Body::empty()).unwrap();
        let (status, body) = send(panicking_app(Environment::Development), request).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "INTERNAL_ERROR");
        assert_eq!(body["message"], "handler exploded");
    }

    #[tokio::test]
    async fn responses_carry_security_and_cors_headers() {
        let state = test_state();
        let mut request = get("/api/health", [10, 8, 0, 1]);
        request
            .headers_mut()
            .insert(header::ORIGIN, HeaderValue::from_static(ORIGIN));

        let response = app(&state).oneshot(request).await.unwrap();
        let headers = response.headers();
        assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], ORIGIN);
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    }

    #[tokio::test]
    async fn other_origins_are_not_allowed() {
        let state = test_state();
        let mut request = get("/api/health", [10, 8, 0, 2]);
        request
            .headers_mut()
            .insert(header::ORIGIN, HeaderValue::from_static("https://evil.example"));

        let response = app(&state).oneshot(request).await.unwrap();
        assert!(!response.headers().contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_submissions_get_unique_ids() {
        let state = test_state();
        let router = app(&state);

        let tasks: Vec<_> = (0..50u8)
            .map(|i| {
                let router = router.clone();
                tokio::spawn(async move {
                    let request = post_report(
                        json!({ "latitude": f64::from(i) / 10.0, "longitude": 0 }),
                        [10, 9, 0, i],
                    );
                    send(router, request).await
                })
            })
            .collect();

        let mut ids = Vec::new();
        for task in tasks {
            let (status, body) = task.await.unwrap();
            assert_eq!(status, StatusCode::CREATED);
            ids.push(body["id"].as_i64().unwrap());
        }

        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 50);
        assert_eq!(state.db.list_reports(1, 0).unwrap().total, 50);
    }
}
