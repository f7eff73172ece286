//! carevault: patient records with embedded clinical vital-sign history.
//!
//! Patients carry an ordered, positionally addressed sequence of clinical
//! entries. A classifier scans every patient for critical readings, and a small
//! user subsystem manages the staff accounts that own patients.

pub mod api;
pub mod classifier;
pub mod clinical;
pub mod config;
pub mod error;
pub mod models;
pub mod patients;
pub mod storage;
pub mod users;

pub use error::CareError;
