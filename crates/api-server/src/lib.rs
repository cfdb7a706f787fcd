#![warn(clippy::unwrap_used)]

pub mod admin_rest;
pub mod ingest_rest;
pub mod report_rest;
pub mod rest;
pub mod server;
pub mod swagger;

pub use rest::AppState;
pub use server::{router, ApiServer};
pub use swagger::ApiDoc;
