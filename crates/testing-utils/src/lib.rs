//! # Birthday Notifier Testing Utils
//!
//! Shared testing utilities for the birthday notifier workspace.
//!
//! - **Mock Repositories**: in-memory `PersonRepository` with failure injection
//! - **Mock Collaborators**: message queue, notification sink and idempotency store doubles
//! - **Test Data Builders**: `PersonBuilder`
//! - **Helpers**: polling utilities for async assertions
//!
//! Add this crate as a dev-dependency:
//!
//! ```toml
//! [dev-dependencies]
//! birthday-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
