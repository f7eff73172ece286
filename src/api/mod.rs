//! HTTP surface of the service.

pub mod rest;

pub use rest::{ApiResponse, RestApi};
