//! External plugin sources.
//!
//! Built-in plugins are linked statically and handed to the runtime as
//! [`PluginDescriptor`]s. Everything else comes from a [`PluginSource`],
//! which the runtime fetches concurrently at load time. A source that fails is
//! logged and skipped; the rest of the load continues.
//!
//! [`LibrarySource`] loads a shared library built with
//! [`export_room_plugin!`](crate::export_room_plugin). The library must export:
//!
//! - `room_plugin_abi_version() -> u32`, matching [`ROOM_PLUGIN_ABI_VERSION`]
//! - `create_room_plugin() -> *mut dyn RoomPlugin`, returning null on failure

use crate::error::SourceError;
use crate::plugin::{PluginDescriptor, RoomPlugin};
use crate::ROOM_PLUGIN_ABI_VERSION;
use async_trait::async_trait;
use libloading::{Library, Symbol};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A place external plugin code can be fetched from.
#[async_trait]
pub trait PluginSource: Send + Sync {
    /// Human-readable location, used in logs and errors.
    fn location(&self) -> String;

    /// Retrieves the plugin and instantiates it.
    async fn fetch(&self) -> Result<PluginDescriptor, SourceError>;
}

/// A plugin compiled into a shared library on disk.
#[derive(Debug, Clone)]
pub struct LibrarySource {
    path: PathBuf,
}

impl LibrarySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn instantiate(&self) -> Result<PluginDescriptor, SourceError> {
        let location = self.location();

        // SAFETY: loading a library runs its initialisers; only libraries
        // from the configured plugin directory are passed here.
        let library = unsafe {
            Library::new(&self.path).map_err(|e| SourceError::Fetch {
                location: location.clone(),
                reason: format!("Failed to load library: {}", e),
            })?
        };

        let found = unsafe {
            let abi_version: Symbol<unsafe extern "C" fn() -> u32> =
                library.get(b"room_plugin_abi_version").map_err(|e| {
                    SourceError::Instantiate {
                        location: location.clone(),
                        reason: format!("Failed to find room_plugin_abi_version function: {}", e),
                    }
                })?;
            abi_version()
        };
        if found != ROOM_PLUGIN_ABI_VERSION {
            return Err(SourceError::AbiMismatch {
                location,
                expected: ROOM_PLUGIN_ABI_VERSION,
                found,
            });
        }

        #[allow(improper_ctypes_definitions)]
        type CreatePlugin = unsafe extern "C" fn() -> *mut dyn RoomPlugin;

        let plugin_ptr = unsafe {
            let create: Symbol<CreatePlugin> = library.get(b"create_room_plugin").map_err(|e| {
                SourceError::Instantiate {
                    location: location.clone(),
                    reason: format!("Failed to find create_room_plugin function: {}", e),
                }
            })?;
            create()
        };
        if plugin_ptr.is_null() {
            return Err(SourceError::Instantiate {
                location,
                reason: "create_room_plugin returned null pointer".to_string(),
            });
        }

        // SAFETY: the pointer was produced by `Box::into_raw` in the exporting
        // macro and ownership is transferred to us exactly once.
        let plugin = unsafe { Box::from_raw(plugin_ptr) };
        debug!("Created plugin instance {} from {}", plugin.name(), location);

        Ok(PluginDescriptor::from_library(plugin, library))
    }
}

#[async_trait]
impl PluginSource for LibrarySource {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    async fn fetch(&self) -> Result<PluginDescriptor, SourceError> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Err(SourceError::Fetch {
                location: self.location(),
                reason: "file does not exist".to_string(),
            });
        }
        self.instantiate()
    }
}

/// Returns whether `path` looks like a shared library on any supported platform.
pub fn is_library_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("so" | "dll" | "dylib")
    )
}

/// Library name from a file path: the file stem without a `lib` prefix.
fn library_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    stem.strip_prefix("lib").map(str::to_string).unwrap_or(stem)
}

/// Scans `directory` for shared libraries.
///
/// When `whitelist` is non-empty only libraries whose name (file stem, `lib`
/// prefix stripped) appears in it are returned. A missing directory yields no
/// sources. Results are sorted by path so discovery order is stable.
pub async fn discover_library_sources(
    directory: impl AsRef<Path>,
    whitelist: &[String],
) -> Result<Vec<LibrarySource>, SourceError> {
    let directory = directory.as_ref();
    if !tokio::fs::try_exists(directory).await.unwrap_or(false) {
        warn!("Plugin directory does not exist: {}", directory.display());
        return Ok(Vec::new());
    }

    let read_error = |e: std::io::Error| SourceError::Fetch {
        location: directory.display().to_string(),
        reason: format!("Failed to read plugin directory: {}", e),
    };

    let mut sources = Vec::new();
    let mut entries = tokio::fs::read_dir(directory).await.map_err(read_error)?;
    while let Some(entry) = entries.next_entry().await.map_err(read_error)? {
        let path = entry.path();
        if !is_library_file(&path) {
            continue;
        }
        let name = library_name(&path);
        if !whitelist.is_empty() && !whitelist.contains(&name) {
            debug!("Skipping {} (not whitelisted)", path.display());
            continue;
        }
        sources.push(LibrarySource::new(path));
    }

    sources.sort_by(|a, b| a.path.cmp(&b.path));
    debug!(
        "Discovered {} plugin libraries in {}",
        sources.len(),
        directory.display()
    );
    Ok(sources)
}
