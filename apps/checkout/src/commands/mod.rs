//! # Checkout Commands
//!
//! Every operation the storefront can ask of the checkout backend.
//!
//! ## Command Organization
//! ```text
//! commands/
//! ├── mod.rs       ◄─── You are here (exports)
//! ├── cart.rs      ◄─── Cart manipulation
//! ├── code.rs      ◄─── Code validation, apply/remove
//! ├── tracking.rs  ◄─── Click tracking, funnel stages, stats
//! └── checkout.rs  ◄─── Payment confirmation
//! ```
//!
//! ## How Commands Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Command Flow                                         │
//! │                                                                         │
//! │  Storefront / CLI                                                       │
//! │  ────────────────                                                       │
//! │  apply_code(&db, &cart, "SUMMER20", &customer, Utc::now())              │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  Rust Backend                                                           │
//! │  ────────────                                                           │
//! │  pub async fn apply_code(                                               │
//! │      db: &Database,          ◄── Shared pool, repositories             │
//! │      cart: &CartState,       ◄── Only the state this command needs     │
//! │      raw_code: &str,                                                    │
//! │      ...                                                                │
//! │      now: DateTime<Utc>,     ◄── Judges validity and expiry            │
//! │  ) -> Result<CartResponse, ApiError>                                    │
//! │         │                                                               │
//! │         │ (JSON serialization)                                          │
//! │         ▼                                                               │
//! │  Caller receives: { items, totals } or { code, message }                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Code windows, session expiry and stats periods are judged against the
//! `now` passed in. Stored timestamps such as `used_at` and a cart's
//! `last_updated` are stamped from the wall clock when written.
//!
//! Commands never hold a state lock across an `.await`: they snapshot what
//! they need, talk to the database, then mutate.

pub mod cart;
pub mod checkout;
pub mod code;
pub mod tracking;
