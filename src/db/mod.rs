//! Credential store: the `Account` record and its persistence.
//!
//! `CredentialStore` is the seam between the account lifecycle logic and
//! storage; `PgStore` is the Postgres implementation used in production.

mod models;
mod store;

pub use models::{Account, Profile};
pub use store::{CredentialStore, PgStore};

#[cfg(test)]
pub use store::MockCredentialStore;
