//! Credential primitives: password hashing and bearer-token
//! issuance/verification. The account lifecycle logic that uses these
//! lives in `crate::accounts`.

mod password;
mod token;

pub use password::PasswordHasher;
pub use token::{Claims, TokenService};
