use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use birthday_api::create_app;
use birthday_core::{FixedClock, OccurrenceCalculator, PersonService};
use birthday_testing_utils::{utc, MockPersonRepository, PersonBuilder};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app_with(repo: &MockPersonRepository) -> Router {
    let service = Arc::new(PersonService::new(
        Arc::new(repo.clone()),
        OccurrenceCalculator::default(),
    ));
    create_app(service, Arc::new(FixedClock::new(utc("2024-05-01T00:00:00Z"))))
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = app_with(&MockPersonRepository::new());
    let response = app.oneshot(empty_request("GET", "/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "birthday-notifier");
}

#[tokio::test]
async fn test_create_person_computes_next_occurrence() {
    let repo = MockPersonRepository::new();
    let app = app_with(&repo);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/users",
            json!({
                "firstName": "John",
                "lastName": "Doe",
                "birthday": "1990-06-01",
                "city": "New York",
                "state": "New York",
                "country": "USA"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["nextOccurrenceUtc"], "2024-06-01T13:00:00Z");
    assert_eq!(body["data"]["lastNotifiedYear"], 0);

    let id = body["data"]["personId"].as_str().unwrap();
    let stored = repo.get(id).unwrap();
    assert_eq!(stored.location.region.as_deref(), Some("New York"));
}

#[tokio::test]
async fn test_create_person_rejects_invalid_input() {
    let repo = MockPersonRepository::new();

    let invalid_birthday = app_with(&repo)
        .oneshot(json_request(
            "POST",
            "/api/users",
            json!({
                "firstName": "John",
                "lastName": "Doe",
                "birthday": "1990-02-30",
                "city": "London",
                "country": "UK"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(invalid_birthday.status(), StatusCode::BAD_REQUEST);
    let body = read_json(invalid_birthday).await;
    assert_eq!(body["error"]["type"], "VALIDATION_ERROR");

    let missing_field = app_with(&repo)
        .oneshot(json_request(
            "POST",
            "/api/users",
            json!({ "firstName": "John" }),
        ))
        .await
        .unwrap();
    assert_eq!(missing_field.status(), StatusCode::BAD_REQUEST);
    let body = read_json(missing_field).await;
    assert_eq!(body["error"]["type"], "BAD_REQUEST");

    assert_eq!(repo.count(), 0);
}

#[tokio::test]
async fn test_get_person_not_found() {
    let app = app_with(&MockPersonRepository::new());
    let response = app
        .oneshot(empty_request("GET", "/api/users/missing"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = read_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["type"], "PERSON_NOT_FOUND");
    assert_eq!(body["error"]["code"], 404);
}

#[tokio::test]
async fn test_update_location_recomputes_but_keeps_notified_year() {
    let repo = MockPersonRepository::with_persons(vec![PersonBuilder::new()
        .with_id("p-1")
        .with_birthday("1990-06-01")
        .with_location("New York", Some("New York"), "USA")
        .with_next_occurrence(utc("2024-06-01T13:00:00Z"))
        .with_last_notified_year(2023)
        .build()]);

    let response = app_with(&repo)
        .oneshot(json_request(
            "PUT",
            "/api/users/p-1",
            json!({ "city": "London", "region": "", "country": "UK" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let stored = repo.get("p-1").unwrap();
    assert_eq!(stored.location.city, "London");
    assert_eq!(stored.location.region, None);
    // 伦敦夏令时 UTC+1
    assert_eq!(stored.next_occurrence_utc, utc("2024-06-01T08:00:00Z"));
    assert_eq!(stored.last_notified_year, 2023);
}

#[tokio::test]
async fn test_update_name_only_keeps_occurrence() {
    let repo = MockPersonRepository::with_persons(vec![PersonBuilder::new()
        .with_id("p-1")
        .with_next_occurrence(utc("2024-06-01T13:00:00Z"))
        .build()]);

    let response = app_with(&repo)
        .oneshot(json_request("PUT", "/api/users/p-1", json!({ "firstName": "Jane" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let stored = repo.get("p-1").unwrap();
    assert_eq!(stored.first_name, "Jane");
    assert_eq!(stored.next_occurrence_utc, utc("2024-06-01T13:00:00Z"));
}

#[tokio::test]
async fn test_delete_person() {
    let repo = MockPersonRepository::with_persons(vec![PersonBuilder::new().with_id("p-1").build()]);

    let response = app_with(&repo)
        .oneshot(empty_request("DELETE", "/api/users/p-1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(repo.get("p-1").is_none());

    let again = app_with(&repo)
        .oneshot(empty_request("DELETE", "/api/users/p-1"))
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_storage_outage_maps_to_500() {
    let repo = MockPersonRepository::with_persons(vec![PersonBuilder::new().with_id("p-1").build()]);
    repo.set_fail_reads(true);

    let response = app_with(&repo)
        .oneshot(empty_request("GET", "/api/users/p-1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
