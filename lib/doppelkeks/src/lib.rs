#![doc = include_str!("../README.md")]

#[macro_use]
extern crate tracing;

pub use self::{
    config::{Configuration, DEFAULT_MAX_AGE, PathMatcher},
    error::{Error, Result, TokenError},
    request::{FormBody, ParsedBody, Transport},
    service::{CsrfLayer, CsrfService, ResponseFuture},
    token::{Nonce, Secret, Token},
    validator::{SessionToken, Validator},
};

#[cfg(feature = "axum")]
pub use self::validator::MissingSessionToken;

mod config;
mod error;
mod request;
mod service;
mod validator;

pub mod token;

/// Cookie holding the hex encoded nonce
pub const COOKIE_NAME: &str = "csrf-token";

/// Request header carrying the hex encoded token
pub const HEADER_NAME: &str = "x-csrf-token";

/// Body field carrying the hex encoded token
pub const BODY_FIELD: &str = "_csrf";
