//! # Host Bridge Traits
//!
//! Contracts between the sync engine and the things it does not own.
//!
//! ## Overview
//!
//! The engine reconciles a local library against remote origins, but it never
//! talks to a socket or a disk directly. Each collaborator is expressed as a
//! trait here and implemented by a host crate (`bridge-desktop` on desktop) or
//! by a test double.
//!
//! ## Traits
//!
//! - [`RemoteCatalog`](remote::RemoteCatalog) - Paged, ascending enumeration of
//!   remote records per entity kind
//! - [`CancelTrigger`](remote::CancelTrigger) - Hook that unblocks an in-flight
//!   remote read when a sync is cancelled
//! - [`FileSystemAccess`](storage::FileSystemAccess) - File removal and listing
//!   for cached media and artwork
//! - [`LoggerSink`](logging::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! Every trait reports failures as [`BridgeError`](error::BridgeError). Remote
//! implementations must mark recoverable transport failures as transient so
//! the orchestrator knows it may retry:
//!
//! ```
//! use bridge_traits::BridgeError;
//!
//! let err = BridgeError::transient("connection reset by peer");
//! assert!(err.is_transient());
//! ```
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so a sync task can hold them across
//! await points on a multi-threaded runtime.

pub mod error;
pub mod logging;
pub mod remote;
pub mod storage;

pub use error::BridgeError;
pub use logging::{LogEntry, LogLevel, LoggerSink};
pub use remote::{
    CancelTrigger, EntityKind, RemoteAlbum, RemoteArtist, RemoteCatalog, RemotePage,
    RemotePlaylist, RemotePlaylistSong, RemoteSong, SourceEndpoint,
};
pub use storage::FileSystemAccess;
