//! # Seed Data Generator
//!
//! Populates the database with demo owners and promotional codes for
//! development.
//!
//! ## Usage
//! ```bash
//! # Seed the default database
//! cargo run -p lys-db --bin seed
//!
//! # Generate extra affiliate partners
//! cargo run -p lys-db --bin seed -- --partners 25
//!
//! # Specify database path
//! cargo run -p lys-db --bin seed -- --db ./data/lys.db
//! ```
//!
//! ## Generated Codes
//! - `WELCOME10` - 10% off, new customers only, one use per customer
//! - `SAVE5` - £5.00 off orders of £50.00 or more, 500 uses
//! - `SUMMER20` - seasonal 20% off, ends in 90 days
//! - `NOMOQ` - waives brand minimum order quantities
//! - `PARTNER-NNN` - affiliate codes with 5% off and 10% commission

use chrono::{Duration, Utc};
use lys_core::{CodeConditions, CodeKind, CommissionTerms, PromotionalDiscount};
use lys_db::{CodeTerms, Database, DbConfig, NewCode};
use std::env;

/// Campaign codes: (code, name, kind, discount)
const CAMPAIGNS: &[(&str, &str, CodeKind, PromotionalDiscount)] = &[
    ("WELCOME10", "Welcome offer", CodeKind::General, PromotionalDiscount::Percentage { bps: 1000 }),
    ("SAVE5", "£5 off £50", CodeKind::Promotional, PromotionalDiscount::Fixed { cents: 500 }),
    ("SUMMER20", "Summer sale", CodeKind::Seasonal, PromotionalDiscount::Percentage { bps: 2000 }),
    ("NOMOQ", "No minimum order", CodeKind::NoMoq, PromotionalDiscount::None),
];

/// Partner display names, cycled for affiliate codes
const PARTNER_NAMES: &[&str] = &[
    "Studio Ferne",
    "The Gift Edit",
    "Paper & Thread",
    "Northside Makers",
    "Honey Lane",
    "Wren Interiors",
    "Maple Market",
    "Copper Kettle",
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut partners: usize = 8;
    let mut db_path = String::from("./lys_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--partners" | "-p" => {
                if i + 1 < args.len() {
                    partners = args[i + 1].parse().unwrap_or(8);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Lys Checkout Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -p, --partners <N> Number of affiliate partners (default: 8)");
                println!("  -d, --db <PATH>    Database file path (default: ./lys_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Lys Checkout Seed Data Generator");
    println!("===================================");
    println!("Database: {}", db_path);
    println!("Partners: {}", partners);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.codes().list(true).await?;
    if !existing.is_empty() {
        println!("⚠ Database already has {} codes", existing.len());
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    println!();
    println!("Generating campaign codes...");

    for (code, name, kind, discount) in CAMPAIGNS {
        let new = campaign_code(code, name, *kind, *discount);
        match db.codes().insert(&new).await {
            Ok(created) => println!("  {} ({})", created.code, created.discount.type_name()),
            Err(e) => eprintln!("Failed to insert {}: {}", code, e),
        }
    }

    println!();
    println!("Generating affiliate partners...");

    let mut generated = 0;
    for n in 0..partners {
        let name = format!("{} {}", PARTNER_NAMES[n % PARTNER_NAMES.len()], n + 1);
        let owner = db.owners().insert(&name).await?;

        let mut terms = CodeTerms::new(PromotionalDiscount::percent(5), Utc::now());
        terms.commission = Some(CommissionTerms::Percentage { bps: 1000 });

        let new = NewCode {
            code: format!("PARTNER-{:03}", n + 1),
            name: format!("{} referral", name),
            kind: CodeKind::Affiliate,
            owner_id: Some(owner.id),
            terms,
        };

        if let Err(e) = db.codes().insert(&new).await {
            eprintln!("Failed to insert {}: {}", new.code, e);
            continue;
        }
        generated += 1;
    }

    println!("✓ Generated {} affiliate codes", generated);
    println!();
    println!("✓ Seed complete!");

    Ok(())
}

/// Builds the terms for one campaign code.
fn campaign_code(code: &str, name: &str, kind: CodeKind, discount: PromotionalDiscount) -> NewCode {
    let now = Utc::now();
    let mut terms = CodeTerms::new(discount, now);

    match code {
        "WELCOME10" => {
            terms.max_uses_per_customer = Some(1);
            terms.conditions = CodeConditions {
                new_customers_only: true,
                ..Default::default()
            };
        }
        "SAVE5" => {
            terms.max_uses = Some(500);
            terms.conditions = CodeConditions {
                min_order_value_cents: Some(5000),
                ..Default::default()
            };
        }
        "SUMMER20" => {
            terms.valid_until = Some(now + Duration::days(90));
        }
        "NOMOQ" => {
            terms.removes_moq = true;
        }
        _ => {}
    }

    NewCode {
        code: code.to_string(),
        name: name.to_string(),
        kind,
        owner_id: None,
        terms,
    }
}
