use std::sync::Arc;

use birthday_core::models::{CreatePersonRequest, UpdatePersonRequest};
use birthday_core::{LeapDayPolicy, NotifierError, OccurrenceCalculator};
use birthday_core::services::PersonService;
use birthday_testing_utils::{utc, MockPersonRepository, PersonBuilder};

fn service(repo: &MockPersonRepository) -> PersonService {
    PersonService::new(
        Arc::new(repo.clone()),
        OccurrenceCalculator::new(LeapDayPolicy::Feb28),
    )
}

fn create_request(birthday: &str, city: &str, region: Option<&str>, country: &str) -> CreatePersonRequest {
    CreatePersonRequest {
        first_name: "Jane".to_string(),
        last_name: "Smith".to_string(),
        birthday: birthday.to_string(),
        city: city.to_string(),
        region: region.map(str::to_string),
        country: country.to_string(),
    }
}

#[tokio::test]
async fn test_create_computes_first_occurrence() {
    let repo = MockPersonRepository::new();
    let service = service(&repo);

    let person = service
        .create(
            create_request("1990-12-25", "New York", Some("New York"), "USA"),
            utc("2024-06-15T12:00:00Z"),
        )
        .await
        .unwrap();

    assert!(!person.id.is_empty());
    assert_eq!(person.last_notified_year, 0);
    assert_eq!(person.next_occurrence_utc, utc("2024-12-25T14:00:00Z"));
    assert_eq!(repo.count(), 1);
}

#[tokio::test]
async fn test_create_rejects_invalid_input() {
    let repo = MockPersonRepository::new();
    let service = service(&repo);

    let result = service
        .create(
            create_request("1990-02-30", "Paris", None, "France"),
            utc("2024-06-15T12:00:00Z"),
        )
        .await;
    assert!(matches!(result, Err(NotifierError::Validation(_))));

    let result = service
        .create(create_request("1990-02-01", "", None, "France"), utc("2024-06-15T12:00:00Z"))
        .await;
    assert!(matches!(result, Err(NotifierError::Validation(_))));
    assert_eq!(repo.count(), 0);
}

#[tokio::test]
async fn test_update_location_recomputes_occurrence_keeps_notified_year() {
    let person = PersonBuilder::new()
        .with_id("p-1")
        .with_birthday("1990-12-25")
        .with_location("New York", Some("New York"), "USA")
        .with_next_occurrence(utc("2024-12-25T14:00:00Z"))
        .with_last_notified_year(2023)
        .build();
    let repo = MockPersonRepository::with_persons(vec![person]);
    let service = service(&repo);

    let updated = service
        .update(
            "p-1",
            UpdatePersonRequest {
                city: Some("Tokyo".to_string()),
                region: Some(String::new()),
                country: Some("Japan".to_string()),
                ..Default::default()
            },
            utc("2024-06-15T12:00:00Z"),
        )
        .await
        .unwrap();

    assert_eq!(updated.location.region, None);
    assert_eq!(updated.next_occurrence_utc, utc("2024-12-25T00:00:00Z"));
    assert_eq!(updated.last_notified_year, 2023);
    assert_eq!(repo.get("p-1").unwrap(), updated);
}

#[tokio::test]
async fn test_update_name_only_keeps_occurrence() {
    let next = utc("2024-12-25T14:00:00Z");
    let person = PersonBuilder::new().with_id("p-1").with_next_occurrence(next).build();
    let repo = MockPersonRepository::with_persons(vec![person]);
    let service = service(&repo);

    let updated = service
        .update(
            "p-1",
            UpdatePersonRequest {
                first_name: Some("Johnny".to_string()),
                ..Default::default()
            },
            utc("2024-06-15T12:00:00Z"),
        )
        .await
        .unwrap();

    assert_eq!(updated.first_name, "Johnny");
    assert_eq!(updated.next_occurrence_utc, next);
}

#[tokio::test]
async fn test_missing_person_is_not_found() {
    let repo = MockPersonRepository::new();
    let service = service(&repo);

    assert!(matches!(
        service.get("missing").await,
        Err(NotifierError::PersonNotFound { .. })
    ));
    assert!(matches!(
        service
            .update("missing", UpdatePersonRequest::default(), utc("2024-06-15T12:00:00Z"))
            .await,
        Err(NotifierError::PersonNotFound { .. })
    ));
    assert!(matches!(
        service.delete("missing").await,
        Err(NotifierError::PersonNotFound { .. })
    ));
}

#[tokio::test]
async fn test_delete_returns_removed_person() {
    let person = PersonBuilder::new().with_id("p-1").build();
    let repo = MockPersonRepository::with_persons(vec![person.clone()]);
    let service = service(&repo);

    let deleted = service.delete("p-1").await.unwrap();
    assert_eq!(deleted, person);
    assert_eq!(repo.count(), 0);
}
