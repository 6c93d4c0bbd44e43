//! # extreg Protocols
//!
//! Core types and traits for the extreg extension registry.
//! Contains no I/O: handlers and the manager live in `extreg-core`.
//!
//! ## Core Types
//!
//! - [`ExtensionRef`] - Validated `(handler, context, name)` key
//! - [`ExtensionDef`] - Definition of one extension
//! - [`Extension`] - Trait for live extension instances
//! - [`ExtensionListener`] - Trait for change notifications
//! - [`ExtensionError`] - Error taxonomy shared by every layer

pub mod definition;
pub mod error;
pub mod extension;
pub mod reference;

pub use definition::{
    ExtensionDef, ExtensionMethod, MethodParam, ResourceFile, RuntimeParam, CLASS_NAME_PARAM,
    REENTRANT_PARAM, SCRIPTABLE_INTERFACE, VERSION_PARAM,
};
pub use error::ExtensionError;
pub use extension::{Extension, ExtensionListener};
pub use reference::ExtensionRef;
