//! # UserDir API Server Library
//!
//! This library provides the HTTP surface of the user directory.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `extract`: Per-request context extraction
//! - `middleware`: Principal extraction
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;
