//! Medical image analysis service.
//!
//! Uploads (regular images or DICOM files) are scored for quality,
//! adaptively enhanced, scanned for visible text and content labels by
//! a local vision model, and summarized into a patient-facing narrative
//! report. Every analysis is persisted with a conversation so the user
//! can ask follow-up questions grounded in what was actually found.

pub mod api;
pub mod chat;
pub mod config;
pub mod db;
pub mod dicom;
pub mod imaging;
pub mod models;
pub mod report;
pub mod vision;

use tracing_subscriber::EnvFilter;

/// Initialize tracing from RUST_LOG, falling back to the default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}
