//! # Room Runtime
//!
//! Plugin runtime for a shared multi-user room. Independent plugins contribute
//! behavior and extend a shared [`RoomState`] (the local participant, the
//! connected peers and the shared objects) while every change is propagated
//! to peers as tagged JSON messages over point-to-point connections, with no
//! central authority.
//!
//! ## Building blocks
//!
//! - [`RoomPlugin`] / [`PluginDescriptor`] - a named plugin with declared
//!   dependencies and lifecycle hooks
//! - [`DependencyResolver`] - computes the load order, rejecting missing and
//!   circular dependencies
//! - [`RoomState`] - the progressively-extended room, with typed extension
//!   slots owned by the plugin that claims them
//! - [`PluginRuntime`] - drives load, peer connect/disconnect, message
//!   dispatch and unload
//! - [`replication`] - the apply-then-broadcast convention every plugin follows
//!
//! ## Quick start
//!
//! ```rust
//! use room_runtime::{
//!     NoopConnector, PeerId, PluginDescriptor, PluginRuntime, RoomPlugin, RuntimeConfig,
//! };
//! use std::sync::Arc;
//!
//! struct Hello;
//!
//! impl RoomPlugin for Hello {
//!     fn name(&self) -> &str {
//!         "hello"
//!     }
//! }
//!
//! let mut runtime = PluginRuntime::new(
//!     PeerId::from("alice"),
//!     Arc::new(NoopConnector),
//!     RuntimeConfig::default(),
//! );
//! let order = runtime.load_builtin(vec![PluginDescriptor::new(Hello)]).unwrap();
//! assert_eq!(order, vec!["hello"]);
//! runtime.unload().unwrap();
//! ```
//!
//! ## External plugins
//!
//! A plugin crate built as a `cdylib` exports itself with
//! [`export_room_plugin!`] and is loaded through a
//! [`LibrarySource`](source::LibrarySource).

pub mod config;
pub mod error;
pub mod extensions;
pub mod message;
pub mod plugin;
pub mod replication;
pub mod resolver;
pub mod room;
pub mod runtime;
pub mod source;
pub mod transport;
pub mod types;

pub use config::RuntimeConfig;
pub use error::{
    MessageError, PluginError, ResolveError, RuntimeError, SlotError, SourceError, TransportError,
};
pub use extensions::Extensions;
pub use message::{MessageSet, WireMessage};
pub use plugin::{PluginDescriptor, RoomPlugin};
pub use replication::{replay_to, replicate, Origin};
pub use resolver::DependencyResolver;
pub use room::{LocalPeer, ObjectTable, Placement, RemotePeer, RoomObject, RoomState, SlotNamespace};
pub use runtime::{PluginRuntime, RuntimeState, RuntimeStats};
pub use source::{discover_library_sources, LibrarySource, PluginSource};
pub use transport::{
    ChannelConnection, ChannelConnector, ChannelHub, NoopConnector, PeerConnection, PeerConnector,
    TransportEvent,
};
pub use types::{ObjectId, PeerId, Vector2D};

/// Version of the shared-library plugin interface.
///
/// Bumped whenever [`RoomPlugin`] or [`RoomState`] change in a way that breaks
/// previously built plugin libraries.
pub const ROOM_PLUGIN_ABI_VERSION: u32 = 1;

/// Exports a plugin type from a `cdylib` crate.
///
/// Generates the two symbols [`LibrarySource`] looks up:
/// `room_plugin_abi_version` and `create_room_plugin`. Panics during
/// construction are caught at the FFI boundary and reported as a null pointer.
///
/// ```rust,ignore
/// pub struct ChatPlugin { /* ... */ }
///
/// impl ChatPlugin {
///     pub fn new() -> Self { /* ... */ }
/// }
///
/// impl room_runtime::RoomPlugin for ChatPlugin { /* ... */ }
///
/// room_runtime::export_room_plugin!(ChatPlugin);
/// ```
#[macro_export]
macro_rules! export_room_plugin {
    ($plugin_type:ty) => {
        $crate::export_room_plugin!($plugin_type, <$plugin_type>::new());
    };
    ($plugin_type:ty, $constructor:expr) => {
        /// Plugin interface version - required export
        #[no_mangle]
        pub extern "C" fn room_plugin_abi_version() -> u32 {
            $crate::ROOM_PLUGIN_ABI_VERSION
        }

        /// Plugin creation function with panic protection - required export
        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub unsafe extern "C" fn create_room_plugin() -> *mut dyn $crate::RoomPlugin {
            match ::std::panic::catch_unwind(::std::panic::AssertUnwindSafe(|| {
                let plugin: $plugin_type = $constructor;
                let plugin: ::std::boxed::Box<dyn $crate::RoomPlugin> = ::std::boxed::Box::new(plugin);
                ::std::boxed::Box::into_raw(plugin)
            })) {
                Ok(plugin_ptr) => plugin_ptr,
                Err(_) => ::std::ptr::null_mut::<$plugin_type>() as *mut dyn $crate::RoomPlugin,
            }
        }
    };
}
