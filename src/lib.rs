//! Photopipe
//!
//! Asynchronous image-editing job service: generative edits through the
//! OpenAI images API, face swaps through an external swap engine, and
//! multi-stage composite jobs combining both. Clients submit jobs over
//! HTTP and poll for status and artifact URLs.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
