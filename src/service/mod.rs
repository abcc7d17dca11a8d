//! Service layers
//!
//! - [`DbService`]: coercion and hooks over the operation layer
//! - [`ApplicationService`]: versioning, soft deletion, existence policy and
//!   persona redaction
//! - [`ControllerService`]: the facade called by the transport boundary

mod application;
mod controller;
mod db;
mod hooks;
mod persona;

pub use application::ApplicationService;
pub use controller::{ControllerService, ReadResult};
pub use db::DbService;
pub use hooks::{
    CountHook, CountHooks, CreateHooks, DeleteHooks, DocumentHook, DocumentListHook, HookFlags,
    HookFuture, MaybeDocumentHook, ReadHooks, ReadOneHooks, UpdateHook, UpdateHooks,
};
pub use persona::redact;
