//! API client module for the shop admin backend

pub mod classify;
pub mod client;
pub mod crud;
pub mod error;
pub mod hooks;
pub mod refresh;
pub mod request;
pub mod resources;

pub use client::AdminClient;
pub use crud::{CrudService, Page};
pub use resources::Resource;
