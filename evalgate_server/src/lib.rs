//! A REST service for evaluations whose callers authenticate with bearer
//! tokens issued by an external identity provider
//!
//! User registration, sign-in, and session management are passed through to
//! the provider. Evaluations are owned by the user who created them; admins
//! may see, change, and delete any of them.

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(missing_debug_implementations, unused_must_use)]
#![forbid(unsafe_code)]

mod config;
mod error;
pub mod evaluations;
mod routes;
mod state;

pub use config::Config;
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
