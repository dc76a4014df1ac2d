//! Proctor Backend Client
//!
//! HTTP access to the exam service that owns exams, attempts and grading.
//!
//! This crate provides [`HttpBackend`], which implements the session's
//! [`AttemptBackend`](proctor_session::AttemptBackend) over the service's
//! REST API using reqwest.

pub mod client;
pub mod routes;

pub use client::{CanStartResponse, HttpBackend, PersistAnswerRequest};
