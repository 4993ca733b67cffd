//! # Lys Checkout Library
//!
//! Checkout backend for the Lys marketplace: the shopper's cart, promotional
//! codes, and affiliate click attribution.
//!
//! ## Module Organization
//! ```text
//! lys_checkout/
//! ├── lib.rs          ◄─── You are here (startup: logging, config, state)
//! ├── state/
//! │   ├── mod.rs          ◄─── State type exports
//! │   ├── cart.rs         ◄─── Cart state management
//! │   ├── attribution.rs  ◄─── 30-day attribution session
//! │   ├── store.rs        ◄─── LocalStore trait, JSON file / memory stores
//! │   └── config.rs       ◄─── Configuration (TOML + LYS_* env)
//! ├── commands/
//! │   ├── mod.rs          ◄─── Command exports
//! │   ├── cart.rs         ◄─── Cart manipulation commands
//! │   ├── code.rs         ◄─── Code validation commands
//! │   ├── tracking.rs     ◄─── Click tracking and stats commands
//! │   └── checkout.rs     ◄─── Payment confirmation
//! └── error.rs        ◄─── API error type for commands
//! ```

pub mod commands;
pub mod error;
pub mod state;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use error::{ApiError, ApiResult};
use lys_core::attribution::AttributionSession;
use lys_core::cart::Cart;
use lys_db::Database;
use state::{AttributionState, CartState, CheckoutConfig, JsonFileStore};

/// Everything a running checkout needs, built once at startup.
#[derive(Debug, Clone)]
pub struct Checkout {
    pub config: CheckoutConfig,
    pub db: Database,
    pub cart: CartState,
    pub attribution: AttributionState,
}

impl Checkout {
    /// Opens the checkout described by `config`.
    ///
    /// ## Startup Sequence
    /// ```text
    /// ┌─────────────────────────────────────────────────────────────────────────┐
    /// │                       Checkout Startup                                  │
    /// │                                                                         │
    /// │  1. Create State Directory ───────────────────────────────────────────► │
    /// │     • cart.json and attribution.json live here                          │
    /// │                                                                         │
    /// │  2. Connect to Database ──────────────────────────────────────────────► │
    /// │     • SQLite with WAL mode                                              │
    /// │     • Run pending migrations                                            │
    /// │                                                                         │
    /// │  3. Restore Client State ─────────────────────────────────────────────► │
    /// │     • CartState: last saved cart, or empty                              │
    /// │     • AttributionState: saved session unless older than 30 days         │
    /// └─────────────────────────────────────────────────────────────────────────┘
    /// ```
    pub async fn open(config: CheckoutConfig, now: DateTime<Utc>) -> ApiResult<Self> {
        std::fs::create_dir_all(&config.state_dir).map_err(|e| {
            ApiError::config(format!(
                "Could not create state directory {}: {}",
                config.state_dir.display(),
                e
            ))
        })?;
        if let Some(parent) = config.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ApiError::config(format!(
                        "Could not create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let db = Database::new(config.db_config()).await?;
        info!("Database connected and migrations applied");

        let cart = CartState::new(Arc::new(JsonFileStore::<Cart>::new(config.cart_file())));
        let attribution = AttributionState::new(
            Arc::new(JsonFileStore::<AttributionSession>::new(config.session_file())),
            now,
        );
        info!("State initialized");

        Ok(Checkout {
            config,
            db,
            cart,
            attribution,
        })
    }

    /// Closes the database pool. Client state is already on disk.
    pub async fn close(&self) {
        self.db.close().await;
    }
}

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=lys=trace` - Show trace for lys crates only
/// - Default: INFO, DEBUG for lys crates
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,lys=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::TRACE)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use lys_core::cart::ProductSnapshot;
    use std::path::PathBuf;

    fn temp_config(name: &str) -> CheckoutConfig {
        let dir: PathBuf = std::env::temp_dir().join(format!("lys-checkout-{}-{}", name, uuid::Uuid::new_v4()));
        CheckoutConfig {
            database_path: dir.join("lys.db"),
            state_dir: dir.join("state"),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_cart_survives_restart() {
        let config = temp_config("restart");

        let checkout = Checkout::open(config.clone(), Utc::now()).await.unwrap();
        commands::cart::add_to_cart(
            &checkout.cart,
            &ProductSnapshot::new("p1", "b1", "Candle", 2400),
            Some(2),
        )
        .unwrap();
        checkout.close().await;

        let reopened = Checkout::open(config.clone(), Utc::now()).await.unwrap();
        let cart = commands::cart::get_cart(&reopened.cart);
        assert_eq!(cart.totals.total_quantity, 2);
        assert_eq!(cart.totals.subtotal_cents, 4800);
        reopened.close().await;

        let _ = std::fs::remove_dir_all(config.state_dir.parent().unwrap());
    }
}
