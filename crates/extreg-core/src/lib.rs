//! # extreg Core
//!
//! Handlers, handler configuration files and the [`ExtensionManager`].
//!
//! ## Layout
//!
//! - [`manager`] - Facade dispatching to handlers and notifying listeners
//! - [`handler`] - Handler lifecycle, the native handler and the handler of handlers
//! - [`configuration`] - Per-handler registry persisted as XML
//! - [`xml`] - Definition serialization
//! - [`storage`] - Versioned code directories and resource files
//! - [`pattern`] - SQL `LIKE` matching used by queries

pub mod configuration;
pub mod handler;
pub mod manager;
pub mod pattern;
pub mod storage;
pub mod xml;

pub use configuration::HandlerConfiguration;
pub use handler::{
    ExtensionFactories, ExtensionHandler, ExtraLibraries, HandlerFactories, HandlerOfHandlers,
    NativeExtensionHandler,
};
pub use manager::ExtensionManager;
pub use pattern::LikePattern;
pub use xml::DefinitionSerializer;
