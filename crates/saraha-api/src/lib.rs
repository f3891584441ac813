//! HTTP surface of the Saraha service: token lifecycle, authorization,
//! credential flows and the user, message and report handlers.

pub mod auth;
pub mod config;
pub mod convert;
pub mod error;
pub mod extract;
pub mod identity;
pub mod ledger;
pub mod mailer;
pub mod messages;
pub mod middleware;
pub mod reports;
pub mod routes;
pub mod state;
pub mod storage;
pub mod token;
pub mod users;

pub use routes::router;
pub use state::{AppState, AppStateInner};
