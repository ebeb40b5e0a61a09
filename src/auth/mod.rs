pub mod identity;
pub mod password;
pub mod session;

pub use identity::{AuthError, AuthSession, IdentityProvider, SqliteIdentityProvider};
