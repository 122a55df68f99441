pub mod health;
pub mod persons;
