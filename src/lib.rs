//! Menu Sync
//!
//! Keeps local copies of a restaurant menu (branding, branches, categories
//! and dishes) in step with the flat-file JSON REST API that stores it.
//! Changes are shown locally at once and rolled back when the store rejects
//! them; categories and dishes keep a consistent `sortOrder`.
//!
//! The [`MenuSynchronizer`] talks to the store through the [`RemoteStore`]
//! trait. [`HttpStore`] is the production adapter, [`MemoryStore`] an
//! in-process store used offline and in tests.

pub mod api;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod memory_store;
pub mod model;
pub mod ordering;
pub mod store;
pub mod sync;

pub use api::HttpStore;
pub use config::{Config, ConfigError};
pub use error::{InitError, SyncError, TransportError, TransportErrorKind};
pub use memory_store::MemoryStore;
pub use model::{
    Branch, Branding, Category, CategoryViewType, Dish, DishVariant, NewBranch, NewDish, Pricing,
};
pub use ordering::MoveDirection;
pub use store::RemoteStore;
pub use sync::{MenuData, MenuSection, MenuSynchronizer, SyncStatus};
