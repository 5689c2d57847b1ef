//! Kittypup generation worker
//!
//! This library provides the GPU-side worker of the Kittypup service: it
//! accepts generation jobs over HTTP, pulls the pet photos from S3, runs the
//! people guardrail, segmentation, generation and watermark stages, uploads
//! the result and reports back to the submitting API.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
pub mod wiring;
