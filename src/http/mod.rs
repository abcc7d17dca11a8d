//! Transport boundary
//!
//! Renders facade results as axum responses. Routing is left to the
//! embedding application: it builds a [`RawRequest`](crate::request::RawRequest)
//! from its extractors and calls a [`Controller`] handler.

mod controller;
mod response;

pub use controller::{Controller, ControllerHooks};
pub use response::{AuthBundle, ErrorBody, HttpError, SuccessEnvelope};
