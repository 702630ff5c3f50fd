// src/http_tests.rs

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
        Router,
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::auth::{issue_token, JwtAuthenticator};
    use crate::http::{router, AppState};
    use crate::schedule::{ScheduleRules, ScheduleService};
    use crate::store::SqliteStore;

    const SECRET: &[u8] = b"http-test-secret";

    async fn test_app() -> Router {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let schedules = Arc::new(ScheduleService::new(
            store.clone(),
            store.clone(),
            ScheduleRules::default(),
        ));
        let state = AppState {
            schedules,
            authenticator: Arc::new(JwtAuthenticator::new(SECRET, store)),
        };
        router(state)
    }

    fn token_for(user_id: &str) -> String {
        issue_token(SECRET, user_id, &format!("{}@example.com", user_id), 1).unwrap()
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    fn week_body(iso_week: u32, year: i32) -> Value {
        json!({
            "isoWeek": iso_week,
            "year": year,
            "days": [
                { "date": "2025-03-10", "startTime": "09:00", "endTime": "17:00" },
                { "date": "2025-03-11", "startTime": "22:00", "endTime": "06:00", "overtimeHours": 2 },
                { "date": "2025-03-12", "isRestDay": true }
            ]
        })
    }

    #[tokio::test]
    async fn test_health_needs_no_token() {
        let app = test_app().await;
        let (status, body) = send(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_api_requires_bearer_token() {
        let app = test_app().await;

        let (status, body) = send(&app, Method::GET, "/api/schedules", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], json!(false));

        let (status, _) = send(&app, Method::GET, "/api/me", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_create_returns_201_with_totals() {
        let app = test_app().await;
        let token = token_for("alice");

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/schedules",
            Some(&token),
            Some(week_body(11, 2025)),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED, "body: {}", body);
        assert_eq!(body["ownerId"], json!("alice"));
        assert_eq!(body["isoWeek"], json!(11));
        assert_eq!(body["totalHours"], json!(16.0));
        assert_eq!(body["totalOvertimeHours"], json!(2.0));
        assert_eq!(body["status"], json!("draft"));

        let (status, me) = send(&app, Method::GET, "/api/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["currentScheduleId"], body["id"]);
    }

    #[tokio::test]
    async fn test_validation_and_duplicate_map_to_400() {
        let app = test_app().await;
        let token = token_for("alice");

        let invalid = json!({
            "isoWeek": 11,
            "year": 2025,
            "days": [{ "startTime": "25:00", "endTime": "17:00" }]
        });
        let (status, body) =
            send(&app, Method::POST, "/api/schedules", Some(&token), Some(invalid)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["errors"], json!(["Day 1: invalid time format"]));

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/schedules",
            Some(&token),
            Some(week_body(11, 2025)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/schedules",
            Some(&token),
            Some(week_body(11, 2025)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["message"],
            json!("A schedule for week 11 of 2025 already exists")
        );
    }

    #[tokio::test]
    async fn test_missing_fields_are_bad_requests() {
        let app = test_app().await;
        let token = token_for("alice");

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/schedules",
            Some(&token),
            Some(json!({ "days": [] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], json!(false));
    }

    #[tokio::test]
    async fn test_foreign_and_malformed_ids_are_404() {
        let app = test_app().await;
        let alice = token_for("alice");
        let bob = token_for("bob");

        let (_, created) = send(
            &app,
            Method::POST,
            "/api/schedules",
            Some(&alice),
            Some(week_body(11, 2025)),
        )
        .await;
        let uri = format!("/api/schedules/{}", created["id"].as_str().unwrap());

        let (status, _) = send(&app, Method::GET, &uri, Some(&bob), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &app,
            Method::PUT,
            &uri,
            Some(&bob),
            Some(json!({ "days": [{ "startTime": "09:00", "endTime": "10:00" }] })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, Method::DELETE, &uri, Some(&bob), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &app,
            Method::GET,
            "/api/schedules/not-a-uuid",
            Some(&alice),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, Method::GET, &uri, Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_update_recalculate_status_and_delete() {
        let app = test_app().await;
        let token = token_for("alice");

        let (_, created) = send(
            &app,
            Method::POST,
            "/api/schedules",
            Some(&token),
            Some(week_body(11, 2025)),
        )
        .await;
        let uri = format!("/api/schedules/{}", created["id"].as_str().unwrap());

        let (status, updated) = send(
            &app,
            Method::PUT,
            &uri,
            Some(&token),
            Some(json!({ "days": [{ "startTime": "09:00", "endTime": "16:20" }] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["totalHours"], json!(7.33));
        assert_eq!(updated["isoWeek"], json!(11));

        let (status, recalculated) = send(
            &app,
            Method::POST,
            &format!("{}/recalculate", uri),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(recalculated["totalHours"], json!(7.33));

        let (status, submitted) = send(
            &app,
            Method::PUT,
            &format!("{}/status", uri),
            Some(&token),
            Some(json!({ "status": "submitted" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(submitted["status"], json!("submitted"));

        let (status, _) = send(
            &app,
            Method::PUT,
            &format!("{}/status", uri),
            Some(&token),
            Some(json!({ "status": "archived" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, Method::DELETE, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&app, Method::GET, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, me) = send(&app, Method::GET, "/api/me", Some(&token), None).await;
        assert!(me["currentScheduleId"].is_null());
    }

    #[tokio::test]
    async fn test_list_is_scoped_and_ordered() {
        let app = test_app().await;
        let alice = token_for("alice");
        let bob = token_for("bob");

        for (week, year) in [(5, 2024), (20, 2025), (3, 2025)] {
            let (status, _) = send(
                &app,
                Method::POST,
                "/api/schedules",
                Some(&alice),
                Some(week_body(week, year)),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, list) = send(&app, Method::GET, "/api/schedules", Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK);
        let weeks: Vec<(i64, i64)> = list
            .as_array()
            .unwrap()
            .iter()
            .map(|s| (s["year"].as_i64().unwrap(), s["isoWeek"].as_i64().unwrap()))
            .collect();
        assert_eq!(weeks, vec![(2025, 20), (2025, 3), (2024, 5)]);

        let (_, list) = send(&app, Method::GET, "/api/schedules", Some(&bob), None).await;
        assert_eq!(list, json!([]));
    }

    #[tokio::test]
    async fn test_preview_does_not_persist() {
        let app = test_app().await;
        let token = token_for("alice");

        let (status, summary) = send(
            &app,
            Method::POST,
            "/api/schedules/preview",
            Some(&token),
            Some(json!({ "days": [
                { "startTime": "22:00", "endTime": "06:00", "overtimeHours": 1.25 },
                { "startTime": "9am", "endTime": "5pm" }
            ] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["totalHours"], json!(8.0));
        assert_eq!(summary["totalOvertimeHours"], json!(1.25));
        assert_eq!(summary["errors"], json!(["Day 2: invalid time format"]));

        let (_, list) = send(&app, Method::GET, "/api/schedules", Some(&token), None).await;
        assert_eq!(list, json!([]));
    }
}
