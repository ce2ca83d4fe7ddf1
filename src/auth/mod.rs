//! Authentication and session storage
//!
//! Credential login yields an access/refresh token pair; the pair, the
//! user's roles and the selected store live in a [`TokenStore`].

pub mod jwt;
pub mod login;
pub mod tokens;

pub use login::{login, logout, status, use_store};
pub use tokens::{FileTokenStore, MemoryTokenStore, TokenStore};
