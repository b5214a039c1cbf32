pub mod auth;
pub mod catalog;
pub mod contracts;
pub mod estimates;
pub mod health;
pub mod narrative;
pub mod proposals;
pub mod reports;
pub mod scrape;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::app::AppState;

/// Build the API router with all routes
pub fn api_router() -> Router<Arc<AppState>> {
    let v1 = Router::new()
        // Catalog and calculation (public)
        .route("/modules", get(catalog::list_modules))
        .route("/roles", get(catalog::list_roles))
        .route("/focus-areas", get(catalog::list_focus_areas))
        .route("/calculate", post(estimates::quick_calculate))
        .route("/estimate", post(estimates::estimate))
        .route("/estimate/validate", post(estimates::validate))
        // Narrative and generated lists
        .route("/narrative", post(narrative::generate_narrative))
        .route("/narrative/section", post(narrative::generate_section))
        .route("/assumptions/generate", post(narrative::generate_assumptions))
        .route("/comments/generate", post(narrative::generate_comments))
        .route(
            "/security-protocols/generate",
            post(narrative::generate_security_protocols),
        )
        .route(
            "/compliance-frameworks/generate",
            post(narrative::generate_compliance_frameworks),
        )
        // Subtask previews
        .route("/subtasks/preview", post(narrative::preview_subtasks))
        .route("/subtasks/preview/jobs", post(narrative::create_subtasks_job))
        .route(
            "/subtasks/preview/jobs/:job_id",
            get(narrative::get_subtasks_job),
        )
        // Reports
        .route("/report", post(reports::create_report))
        .route("/report/jobs", post(reports::create_report_job))
        .route("/report/jobs/:job_id", get(reports::get_report_job))
        .route("/reports", get(reports::list_reports))
        .route(
            "/reports/:report_id",
            axum::routing::delete(reports::delete_report),
        )
        .route("/reports/:report_id/payload", get(reports::get_report_payload))
        .route("/reports/:report_id/download", get(reports::download_report))
        // Scraping
        .route("/scrape/url", post(scrape::scrape_url))
        // Contracts
        .route(
            "/contracts",
            get(contracts::list_contracts).post(contracts::create_contract),
        )
        .route("/contracts/stats", get(contracts::contract_stats))
        .route("/contracts/sam/status", get(contracts::sam_status))
        .route("/contracts/sam/sync", post(contracts::sam_sync))
        .route(
            "/contracts/:contract_id",
            get(contracts::get_contract).patch(contracts::update_contract),
        )
        // Proposals
        .route(
            "/proposals",
            get(proposals::list_proposals).post(proposals::create_proposal),
        )
        .route(
            "/proposals/public/:public_id",
            get(proposals::get_public_proposal),
        )
        .route("/proposals/:proposal_id", get(proposals::get_proposal))
        .route(
            "/proposals/:proposal_id/versions",
            get(proposals::list_versions).post(proposals::create_version),
        )
        .route(
            "/proposals/:proposal_id/versions/:version",
            get(proposals::get_version),
        )
        .route("/proposals/:proposal_id/diff", get(proposals::diff_versions))
        .route(
            "/proposals/:proposal_id/documents",
            get(proposals::list_documents).post(proposals::upload_document),
        )
        .route(
            "/proposals/:proposal_id/documents/:document_id",
            get(proposals::get_document).delete(proposals::delete_document),
        )
        // Auth
        .route("/auth/request_link", post(auth::request_link))
        .route("/auth/exchange", post(auth::exchange))
        .route("/auth/me", get(auth::me));

    Router::new()
        .route("/", get(health::health_check))
        .route("/health", get(health::health_check))
        .route("/api/health", get(health::health_check))
        .nest("/api/v1", v1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::create_app;
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use http_body_util::BodyExt;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct TestApp {
        state: Arc<AppState>,
        router: Router,
    }

    impl TestApp {
        fn new() -> Self {
            let state = AppState::for_tests();
            Self {
                router: create_app(state.clone()),
                state,
            }
        }

        fn token(&self, email: &str) -> String {
            self.state
                .auth
                .local()
                .unwrap()
                .issue_session(email)
                .unwrap()
                .0
        }

        async fn send(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
            }
            let request = match body {
                Some(body) => builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let headers = response.headers().clone();
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            (status, headers, bytes.to_vec())
        }

        async fn json(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let (status, _, bytes) = self.send(method, uri, token, body).await;
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, value)
        }
    }

    #[tokio::test]
    async fn test_health_reports_memory_mode() {
        let app = TestApp::new();
        for path in ["/", "/health", "/api/health"] {
            let (status, body) = app.json(Method::GET, path, None, None).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["store_mode"], "memory");
            assert_eq!(body["ai_configured"], false);
            assert_eq!(body["storage_configured"], false);
            assert_eq!(body["services"]["database"], "memory");
            assert_eq!(body["services"]["redis"], "disabled");
        }
    }

    #[tokio::test]
    async fn test_catalog_is_public() {
        let app = TestApp::new();
        let (status, body) = app.json(Method::GET, "/api/v1/modules", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["count"].as_u64().unwrap() > 0);

        let (_, body) = app
            .json(Method::GET, "/api/v1/modules?focus_area=SA", None, None)
            .await;
        assert!(body["data"]
            .as_array()
            .unwrap()
            .iter()
            .all(|m| m["focus_area"] == "SA"));

        let (status, body) = app.json(Method::GET, "/api/v1/focus-areas", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_estimate_and_validation() {
        let app = TestApp::new();
        let (status, body) = app
            .json(
                Method::POST,
                "/api/v1/estimate",
                None,
                Some(json!({"modules": ["dt_discovery"], "complexity": "M", "project_name": "Pilot"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["estimation_result"]["total_cost"].as_f64().unwrap() > 0.0);
        assert_eq!(body["input_summary"]["project_name"], "Pilot");

        let (status, _) = app
            .json(Method::POST, "/api/v1/estimate", None, Some(json!({"modules": [], "complexity": "M"})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = app
            .json(
                Method::POST,
                "/api/v1/estimate/validate",
                None,
                Some(json!({"modules": ["nope"], "complexity": "M"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["valid"], false);
        assert!(!body["warnings"].as_array().unwrap().is_empty());

        let (status, body) = app
            .json(
                Method::POST,
                "/api/v1/calculate",
                None,
                Some(json!({"base_hours": 100.0, "complexity": "M"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hourly_rate"], 150.0);
    }

    #[tokio::test]
    async fn test_protected_routes_require_token() {
        let app = TestApp::new();
        let (status, body) = app.json(Method::GET, "/api/v1/proposals", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHORIZED");

        let (status, _) = app
            .json(Method::GET, "/api/v1/auth/me", Some("garbage"), None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_magic_link_flow() {
        let app = TestApp::new();
        let (status, link) = app
            .json(
                Method::POST,
                "/api/v1/auth/request_link",
                None,
                Some(json!({"email": "PM@Agency.gov"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let link_token = link["token"].as_str().unwrap().to_string();

        // The link token itself is not a session
        let (status, _) = app
            .json(Method::GET, "/api/v1/auth/me", Some(&link_token), None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, session) = app
            .json(
                Method::POST,
                "/api/v1/auth/exchange",
                None,
                Some(json!({"token": link_token})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let access = session["access_token"].as_str().unwrap().to_string();

        let (status, me) = app.json(Method::GET, "/api/v1/auth/me", Some(&access), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["email"], "pm@agency.gov");
        assert_eq!(me["auth_method"], "local");
    }

    #[tokio::test]
    async fn test_proposal_versions_and_ownership() {
        let app = TestApp::new();
        let owner = app.token("owner@agency.gov");
        let other = app.token("other@agency.gov");

        let (status, created) = app
            .json(
                Method::POST,
                "/api/v1/proposals",
                Some(&owner),
                Some(json!({"title": "Cloud Move", "payload": {"modules": ["cm_assessment"]}})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["version"]["version"], 1);
        let id = created["proposal"]["proposal_id"].as_str().unwrap().to_string();
        let public_id = created["proposal"]["public_id"].as_str().unwrap().to_string();

        let (status, v2) = app
            .json(
                Method::POST,
                &format!("/api/v1/proposals/{id}/versions"),
                Some(&owner),
                Some(json!({"payload": {"modules": ["cm_assessment", "cm_migration_plan"]}})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(v2["version"], 2);

        let (status, diff) = app
            .json(
                Method::GET,
                &format!("/api/v1/proposals/{id}/diff?from_version=1&to_version=2"),
                Some(&owner),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(diff["added"][0]["path"], "modules.1");

        let (status, _) = app
            .json(Method::GET, &format!("/api/v1/proposals/{id}"), Some(&other), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, public) = app
            .json(
                Method::GET,
                &format!("/api/v1/proposals/public/{public_id}"),
                None,
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(public["latest_version"], 2);
        assert!(public.get("owner_email").is_none());
    }

    #[tokio::test]
    async fn test_upload_without_storage_is_bad_request() {
        let app = TestApp::new();
        let owner = app.token("owner@agency.gov");
        let (_, created) = app
            .json(Method::POST, "/api/v1/proposals", Some(&owner), Some(json!({})))
            .await;
        let id = created["proposal"]["proposal_id"].as_str().unwrap();

        let boundary = "XBOUNDARY";
        let body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"rfp.txt\"\r\n\
             Content-Type: text/plain\r\n\r\nhello\r\n--{boundary}--\r\n"
        );
        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("/api/v1/proposals/{id}/documents"))
            .header(header::AUTHORIZATION, format!("Bearer {owner}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_complexity_is_rejected() {
        let app = TestApp::new();
        let token = app.token("pm@agency.gov");
        let body = json!({"modules": ["dt_discovery"]});
        let (status, _, _) = app
            .send(Method::POST, "/api/v1/estimate", None, Some(body.clone()))
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        for path in ["/api/v1/report", "/api/v1/report/jobs", "/api/v1/subtasks/preview"] {
            let (status, _, _) = app
                .send(Method::POST, path, Some(&token), Some(body.clone()))
                .await;
            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{path}");
        }
    }

    #[tokio::test]
    async fn test_report_returns_pdf() {
        let app = TestApp::new();
        let token = app.token("pm@agency.gov");
        let (status, headers, bytes) = app
            .send(
                Method::POST,
                "/api/v1/report?include_ai=false",
                Some(&token),
                Some(json!({"modules": ["sa_audit"], "complexity": "M", "project_name": "Audit"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
        assert!(headers[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains("audit_"));
        assert!(bytes.starts_with(b"%PDF"));
        assert!(headers.get("x-report-id").is_none());
    }

    #[tokio::test]
    async fn test_report_job_is_owned_and_completes() {
        let app = TestApp::new();
        let token = app.token("pm@agency.gov");
        let (status, accepted) = app
            .json(
                Method::POST,
                "/api/v1/report/jobs",
                Some(&token),
                Some(json!({"modules": ["sa_audit"], "complexity": "M"})),
            )
            .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(accepted["job_kind"], "report");
        let job_id = accepted["job_id"].as_str().unwrap().to_string();
        let uri = format!("/api/v1/report/jobs/{job_id}");

        let mut job = Value::Null;
        for _ in 0..200 {
            let (_, body) = app.json(Method::GET, &uri, Some(&token), None).await;
            job = body;
            if job["status"] == "completed" || job["status"] == "failed" {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(job["status"], "completed");
        assert!(job["result_payload"]["pdf_base64"].is_string());

        let other = app.token("other@agency.gov");
        let (status, _) = app.json(Method::GET, &uri, Some(&other), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        // A report job id is not a subtasks job
        let (status, _) = app
            .json(
                Method::GET,
                &format!("/api/v1/subtasks/preview/jobs/{job_id}"),
                Some(&token),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_subtasks_preview_template() {
        let app = TestApp::new();
        let token = app.token("pm@agency.gov");
        let (status, body) = app
            .json(
                Method::POST,
                "/api/v1/subtasks/preview",
                Some(&token),
                Some(json!({"modules": ["dt_discovery", "sa_audit"], "complexity": "M", "use_ai": false})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let modules = body["modules"].as_array().unwrap();
        assert_eq!(modules.len(), 2);
        assert_eq!(modules[0]["module_id"], "dt_discovery");
        assert_eq!(modules[0]["source"], "template");
    }

    #[tokio::test]
    async fn test_contract_pipeline() {
        let app = TestApp::new();
        let token = app.token("bd@agency.gov");
        let (status, created) = app
            .json(
                Method::POST,
                "/api/v1/contracts",
                Some(&token),
                Some(json!({"title": "Network Refresh", "agency": "Navy"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["contract_id"].as_str().unwrap().to_string();
        assert_eq!(created["status"], "new");

        let (status, updated) = app
            .json(
                Method::PATCH,
                &format!("/api/v1/contracts/{id}"),
                Some(&token),
                Some(json!({"status": "No Bid"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["status"], "no_bid");

        let (_, list) = app
            .json(Method::GET, "/api/v1/contracts?q=navy", Some(&token), None)
            .await;
        assert_eq!(list["count"], 1);

        let (status, stats) = app
            .json(Method::GET, "/api/v1/contracts/stats", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["total"], 1);
        assert_eq!(stats["by_status"]["no_bid"], 1);

        let (status, _) = app
            .json(Method::GET, "/api/v1/contracts/con_missing", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_sam_sync_unconfigured() {
        let app = TestApp::new();
        let token = app.token("bd@agency.gov");
        let (status, body) = app
            .json(Method::GET, "/api/v1/contracts/sam/status", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["configured"], false);

        let (status, _) = app
            .json(Method::POST, "/api/v1/contracts/sam/sync", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_scrape_failure_is_ok_response() {
        let app = TestApp::new();
        let token = app.token("pm@agency.gov");
        let (status, body) = app
            .json(
                Method::POST,
                "/api/v1/scrape/url",
                Some(&token),
                Some(json!({"url": "ftp://files.agency.gov/rfp.pdf"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
    }
}
