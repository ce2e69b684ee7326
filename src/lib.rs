//! registry-gate - Request gatekeeper for a package registry
//!
//! This crate provides the middleware pair that fronts every protected
//! registry request: bounded-use token authentication backed by a durable
//! token store, and a concurrency-safe per-client rate limiter. Both fail
//! closed.

pub mod auth;
pub mod config;
pub mod credentials;
pub mod error;
pub mod models;
pub mod ratelimit;
pub mod server;
pub mod store;
