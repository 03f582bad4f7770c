//! Core types, collaborator contracts and the enrolment engine.
//!
//! This crate is free of HTTP and database dependencies. Storage backends
//! implement [`store::Store`]; rule languages implement
//! [`rule::RuleEvaluator`].

// Native `async fn` in traits; the `Send` bounds are spelled out on `Store`.
#![allow(async_fn_in_trait)]

pub mod actor;
pub mod campaign;
pub mod engine;
pub mod enrolment;
pub mod env;
pub mod error;
pub mod rule;
pub mod store;

pub use engine::{Engine, IngestError};
pub use error::{Error, ErrorKind, Result};
