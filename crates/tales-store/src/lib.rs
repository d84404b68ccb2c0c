//! # tales-store
//!
//! SQLite persistence for the YourTales backend.
//!
//! - **Bootstrap**: [`db`] opens connections with foreign keys enabled and
//!   applies versioned migrations tracked in `PRAGMA user_version`.
//! - **Repositories**: [`repo`] adds per-entity methods to [`Store`]. All
//!   methods are `async`; SQLite work runs on tokio's blocking pool.
//! - **Errors**: [`StoreError`] separates missing rows, uniqueness conflicts,
//!   corrupt data, and driver failures so the HTTP layer can map them.
//!
//! ```rust,no_run
//! # async fn demo() -> Result<(), tales_store::StoreError> {
//! use tales_store::Store;
//!
//! let store = Store::open_in_memory()?;
//! store.ping().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod db;
pub mod error;
pub mod repo;
mod store;

pub use error::{StoreError, StoreResult};
pub use repo::chapters::{ChapterPatch, NewChapter};
pub use repo::collaborations::NewCollaboration;
pub use repo::manuscripts::{ManuscriptPatch, NewManuscript};
pub use repo::notifications::{NewNotification, NotificationFilter};
pub use repo::users::{NewUser, ProfilePatch};
pub use store::Store;
