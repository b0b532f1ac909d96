//! Web API router construction.

use axum::{Router, routing::get};
use std::time::Duration;
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer};

use crate::state::AppState;
use crate::web::entities::{EntityState, entity_router};
use crate::web::lookups;
use crate::web::middleware::request_id::RequestIdLayer;
use crate::web::status;

/// Creates the web server router
pub fn create_router(app_state: AppState) -> Router {
    let limits = app_state.limits;

    let companies = entity_router(EntityState {
        service: app_state.companies.clone(),
        limits,
    })
    .merge(
        Router::new()
            .route("/by-code/{code}", get(lookups::company_by_code))
            .with_state(app_state.clone()),
    );

    let users = entity_router(EntityState {
        service: app_state.users.clone(),
        limits,
    })
    .merge(
        Router::new()
            .route("/by-email/{email}", get(lookups::user_by_email))
            .route("/by-username/{username}", get(lookups::user_by_username))
            .with_state(app_state.clone()),
    );

    let user_companies = entity_router(EntityState {
        service: app_state.user_companies.clone(),
        limits,
    })
    .merge(
        Router::new()
            .route(
                "/by-pair/{user_id}/{company_id}",
                get(lookups::link_by_pair),
            )
            .with_state(app_state),
    );

    let api_router = Router::new()
        .route("/health", get(status::health))
        .nest("/companies", companies)
        .nest("/users", users)
        .nest("/user-companies", user_companies);

    Router::new().nest("/api", api_router).layer((
        // Outermost: per-request ID span + severity-proportional response logging.
        RequestIdLayer,
        CompressionLayer::new()
            .zstd(true)
            .br(true)
            .gzip(true)
            .quality(tower_http::CompressionLevel::Fastest),
        TimeoutLayer::new(Duration::from_secs(60)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheTtl;
    use crate::query::PageLimits;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn router() -> Router {
        create_router(AppState::in_memory(
            CacheTtl::default(),
            PageLimits::default(),
        ))
    }

    async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (status, body) = send(&router(), "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn company_crud_round_trip() {
        let router = router();
        let (status, created) = send(
            &router,
            "POST",
            "/api/companies",
            Some(json!({ "code": "ACME", "name": "Acme Corp" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_str().unwrap().to_owned();

        let (status, by_code) = send(&router, "GET", "/api/companies/by-code/acme", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(by_code["id"], created["id"]);

        let (status, dup) = send(
            &router,
            "POST",
            "/api/companies",
            Some(json!({ "code": "acme", "name": "Other" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(dup["code"], "DUPLICATE");

        let (status, _) = send(&router, "DELETE", &format!("/api/companies/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, body) = send(&router, "GET", &format!("/api/companies/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn search_projects_requested_fields() {
        let router = router();
        for (code, name) in [("A1", "Alpha"), ("B2", "Beta"), ("G3", "Gamma")] {
            send(
                &router,
                "POST",
                "/api/companies",
                Some(json!({ "code": code, "name": name })),
            )
            .await;
        }

        let (status, page) = send(
            &router,
            "GET",
            "/api/companies/search?sort=-name&pageSize=2&fields=code,name",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["totalCount"], 3);
        assert_eq!(page["items"], json!([
            { "code": "G3", "name": "Gamma" },
            { "code": "B2", "name": "Beta" },
        ]));
    }

    #[tokio::test]
    async fn malformed_search_parameters_fall_back_to_defaults() {
        let (status, page) = send(
            &router(),
            "GET",
            "/api/users/search?page=abc&pageSize=-4&sort=password&filter%5Bnope=1&filter%5Bemail%5D%5Blike%5D=x",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["page"], 1);
        assert_eq!(page["pageSize"], 20);
        assert_eq!(page["totalCount"], 0);
    }

    #[tokio::test]
    async fn bad_id_is_rejected_as_json_error() {
        let router = router();
        for uri in [
            "/api/users/not-a-uuid",
            "/api/user-companies/by-pair/nope/00000000-0000-0000-0000-000000000000",
        ] {
            let (status, body) = send(&router, "GET", uri, None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["code"], "VALIDATION_FAILED", "{uri}");
            assert!(body["message"].as_str().is_some_and(|m| !m.is_empty()));
        }
    }

    #[tokio::test]
    async fn malformed_body_is_rejected_as_json_error() {
        let router = router();
        let (status, body) = send(
            &router,
            "POST",
            "/api/companies",
            Some(json!({ "name": "No code" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_FAILED");

        let request = Request::builder()
            .method("POST")
            .uri("/api/companies")
            .body(Body::from("code=ACME"))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "VALIDATION_FAILED");
    }
}
