//! Virtual try-on relay
//!
//! Accepts a person photo and a garment image, runs them through an external
//! try-on model in the background, stores the generated image in S3 and lets
//! callers poll the job until it is `done` or `failed`.

pub mod app_state;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
