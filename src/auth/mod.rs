//! Password hashing and the refresh-session lifecycle

pub mod error;
pub mod password;
pub mod session;

pub use error::AuthError;
pub use password::{check_password, hash_password};
pub use session::{LoginParams, LoginResult, RenewResult, SessionService};
