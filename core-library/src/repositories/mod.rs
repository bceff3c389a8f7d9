//! # Repository Pattern Implementation
//!
//! Repository traits and their SQLite implementations. Each entity gets a
//! trait for the operations the upper layers need and a `Sqlite*Repository`
//! holding a connection pool.
//!
//! ## Available Repositories
//!
//! - `ItemRepository` - library items with their chapters
//! - `TrackRepository` - audio files of an item and their local paths
//! - `ProgressRepository` - listening progress per item
//! - `SessionRepository` - open and unsynced playback sessions

pub mod item;
pub mod progress;
pub mod session;
pub mod track;

pub use item::{ItemRepository, SqliteItemRepository};
pub use progress::{ProgressRepository, SqliteProgressRepository};
pub use session::{SessionRepository, SqliteSessionRepository};
pub use track::{SqliteTrackRepository, TrackRepository};
