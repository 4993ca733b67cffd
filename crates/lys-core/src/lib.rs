//! # lys-core: Pure Business Logic for Lys Checkout
//!
//! Pricing, promotional-code adjudication and attribution math for the
//! marketplace. Everything here is a pure function over values the caller
//! hands in; nothing reads a database, a file or the network.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Lys Checkout Architecture                        │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Storefront (external)                        │   │
//! │  │    Product page ──► Cart ──► Checkout ──► Payment provider      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    lys-checkout services                        │   │
//! │  │    validate_code, apply_code, confirm_payment, track_click      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ lys-core (THIS CRATE) ★                         │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌────────────┐ ┌─────────────────┐   │   │
//! │  │   │  money  │ │  cart   │ │ validation │ │  attribution    │   │   │
//! │  │   │  VAT    │ │ totals  │ │ code rules │ │  commission     │   │   │
//! │  │   └─────────┘ └─────────┘ └────────────┘ │  stats          │   │   │
//! │  │                                          └─────────────────┘   │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    lys-db (Database Layer)                      │   │
//! │  │        codes, usage ledger, tracking, commission ledger         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Money type, VAT extraction, discount clamping, shipping
//! - [`types`] - Domain types (Code, UsageRecord, TrackingRecord, ...)
//! - [`cart`] - Cart aggregate and derived totals
//! - [`validation`] - Code validation engine
//! - [`attribution`] - Client-held attribution session rules
//! - [`commission`] - Commission computation
//! - [`stats`] - Attribution statistics over tracking records
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use lys_core::cart::{Cart, ProductSnapshot};
//! use lys_core::Money;
//!
//! let mut cart = Cart::new();
//! cart.add_item(&ProductSnapshot::new("p-1", "brand-1", "Lamp", 12000), 1)
//!     .unwrap();
//!
//! let totals = cart.totals();
//! assert_eq!(totals.tax_cents, 2000);   // £20.00 VAT inside £120.00
//! assert_eq!(totals.total_cents, 12000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod attribution;
pub mod cart;
pub mod commission;
pub mod error;
pub mod money;
pub mod stats;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// UK standard VAT. Every shelf price already contains it.
pub const VAT_RATE: TaxRate = TaxRate::from_bps(2000);

/// Maximum distinct lines in a single cart.
pub const MAX_CART_ITEMS: usize = 100;

/// Quantity ceiling for a line whose stock is unknown.
///
/// When stock is known and positive the line is clamped to stock instead.
pub const MAX_ITEM_QUANTITY: i64 = 99;

/// How long a click keeps attributing purchases to its code.
pub const ATTRIBUTION_TTL_DAYS: i64 = 30;

/// Longest code string accepted before lookup.
pub const MAX_CODE_LENGTH: usize = 50;
