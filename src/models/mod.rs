//! Domain models for registry-gate

pub mod token;

pub use token::{AuthIdentity, AuthSubject, LoginRequest, LoginResponse, TokenRecord};
