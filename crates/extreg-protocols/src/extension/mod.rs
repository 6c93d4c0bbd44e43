//! Extension and listener traits.

mod listener;
mod traits;

pub use listener::ExtensionListener;
pub use traits::Extension;
