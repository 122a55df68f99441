//! Test data builders

use birthday_core::models::{BirthDate, Location, Person, NEVER_NOTIFIED};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::helpers::utc;

/// Builder for creating test persons
pub struct PersonBuilder {
    person: Person,
}

impl PersonBuilder {
    pub fn new() -> Self {
        let created = utc("2024-01-01T00:00:00Z");
        Self {
            person: Person {
                id: Uuid::new_v4().to_string(),
                first_name: "John".to_string(),
                last_name: "Doe".to_string(),
                birthday: BirthDate::new(1990, 6, 1).unwrap_or_else(|e| panic!("{e}")),
                location: Location::new("New York", Some("New York"), "USA"),
                next_occurrence_utc: utc("2024-06-01T13:00:00Z"),
                last_notified_year: NEVER_NOTIFIED,
                created_at: created,
                updated_at: created,
            },
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.person.id = id.to_string();
        self
    }

    pub fn with_name(mut self, first_name: &str, last_name: &str) -> Self {
        self.person.first_name = first_name.to_string();
        self.person.last_name = last_name.to_string();
        self
    }

    pub fn with_birthday(mut self, birthday: &str) -> Self {
        self.person.birthday =
            BirthDate::parse(birthday).unwrap_or_else(|e| panic!("invalid test birthday: {e}"));
        self
    }

    pub fn with_location(mut self, city: &str, region: Option<&str>, country: &str) -> Self {
        self.person.location = Location::new(city, region, country);
        self
    }

    pub fn with_next_occurrence(mut self, next_occurrence_utc: DateTime<Utc>) -> Self {
        self.person.next_occurrence_utc = next_occurrence_utc;
        self
    }

    pub fn with_last_notified_year(mut self, year: i32) -> Self {
        self.person.last_notified_year = year;
        self
    }

    pub fn build(self) -> Person {
        self.person
    }
}

impl Default for PersonBuilder {
    fn default() -> Self {
        Self::new()
    }
}
