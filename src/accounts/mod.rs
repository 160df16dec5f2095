//! Account lifecycle: registration, login, profile read, password
//! change and deletion. All business rules live in `service`; the
//! `handlers` module is the HTTP skin over it.

pub mod handlers;
mod service;

pub use service::AccountService;
pub(crate) use service::normalize_email;
