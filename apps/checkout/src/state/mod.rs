//! # State Module
//!
//! Manages application state for the checkout.
//!
//! ## Multiple State Types
//! Instead of a single `AppState` struct containing everything, each concern
//! gets its own state type, and commands take only the ones they need.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    State Architecture                                   │
//! │                                                                         │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────┐              │
//! │  │   Database   │  │  CartState   │  │ AttributionState │              │
//! │  │   (lys-db)   │  │              │  │                  │              │
//! │  │  SqlitePool  │  │  Arc<Mutex<  │  │  Arc<Mutex<      │              │
//! │  │              │  │    Cart      │  │   Option<        │              │
//! │  │              │  │  >>          │  │    Session>>>    │              │
//! │  └──────────────┘  └──────┬───────┘  └────────┬─────────┘              │
//! │                           │                   │                         │
//! │                           ▼                   ▼                         │
//! │                    ┌─────────────────────────────────┐                  │
//! │                    │  LocalStore<T> (load/save/clear)│                  │
//! │                    │  JsonFileStore │ MemoryStore    │                  │
//! │                    └─────────────────────────────────┘                  │
//! │                                                                         │
//! │  THREAD SAFETY:                                                        │
//! │  • Database: internal connection pool (thread-safe)                    │
//! │  • CartState / AttributionState: Arc<Mutex<T>>, never held across      │
//! │    an .await                                                           │
//! │  • CheckoutConfig: read-only after initialization                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod attribution;
mod cart;
mod config;
mod store;

pub use attribution::AttributionState;
pub use cart::CartState;
pub use config::{
    CheckoutConfig, ConfigError, ENV_DATABASE_PATH, ENV_DB_MAX_CONNECTIONS, ENV_STATE_DIR,
};
pub use store::{JsonFileStore, LocalStore, MemoryStore, StoreError, StoreResult};
