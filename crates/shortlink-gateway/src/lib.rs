//! HTTP gateway of the shortlink service.
//!
//! Wires the axum router, session cookies, gzip transport and request
//! deadlines around a [`ShortenerService`](shortlink_shortener::ShortenerService).

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod model;
pub mod state;
pub mod telemetry;

pub use app::App;
pub use state::AppState;
