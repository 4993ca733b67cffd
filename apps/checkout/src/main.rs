//! # Lys Checkout Operator CLI
//!
//! Inspects a checkout database from the command line.
//!
//! ## Usage
//! ```bash
//! # Database health and migrations
//! lys-checkout status
//!
//! # Would this code apply to a £60.00 order?
//! lys-checkout validate SUMMER20 --order-value 6000 --customer cust-42
//!
//! # Funnel stats for a partner code over the last week
//! lys-checkout stats PARTNER-001 --period week
//!
//! # Use an explicit config file
//! lys-checkout --config ./checkout.toml status
//! ```
//!
//! Results are printed as JSON on stdout; logs go to stderr.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Utc;
use tracing::error;

use lys_checkout::commands::{code, tracking};
use lys_checkout::state::CheckoutConfig;
use lys_checkout::{init_tracing, Checkout};
use lys_core::stats::StatsPeriod;
use lys_core::validation::ValidationContext;
use lys_db::migrations::migration_status;

const USAGE: &str = "\
Lys Checkout

Usage: lys-checkout [--config <PATH>] <COMMAND>

Commands:
  status                         Database health and migration status
  validate <CODE> [OPTIONS]      Validate a code against an order
      --order-value <PENCE>      Order value in pence (default: 0)
      --customer <ID>            Customer id, for per-customer limits
      --new-customer             Customer has no previous orders
      --b2b                      Business customer
  stats <CODE> [--period <P>]    Funnel stats; P is today|week|month|year|all

Options:
  -c, --config <PATH>            Config file (default: platform config dir)
  -h, --help                     Show this help";

#[derive(Debug)]
enum Command {
    Status,
    Validate { code: String, ctx: ValidationContext },
    Stats { code: String, period: StatsPeriod },
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    let (config_path, command) = match parse_args(&args) {
        Ok(Some(parsed)) => parsed,
        Ok(None) => {
            println!("{}", USAGE);
            return ExitCode::SUCCESS;
        }
        Err(message) => {
            eprintln!("{}\n\n{}", message, USAGE);
            return ExitCode::from(2);
        }
    };

    match run(config_path, command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{}", message);
            ExitCode::FAILURE
        }
    }
}

async fn run(config_path: Option<PathBuf>, command: Command) -> Result<(), String> {
    let config = CheckoutConfig::load(config_path.as_deref()).map_err(|e| e.to_string())?;
    let now = Utc::now();
    let checkout = Checkout::open(config, now).await.map_err(|e| e.to_string())?;

    let output = match command {
        Command::Status => {
            let healthy = checkout.db.health_check().await;
            let schema = migration_status(checkout.db.pool())
                .await
                .map_err(|e| e.to_string())?;
            serde_json::json!({
                "database": checkout.config.database_path,
                "healthy": healthy,
                "migrations": {
                    "shipped": schema.shipped,
                    "applied": schema.applied,
                    "current": schema.is_current(),
                },
            })
        }
        Command::Validate { code, ctx } => {
            let result = code::validate_code(&checkout.db, &code, &ctx, now)
                .await
                .map_err(|e| e.to_string())?;
            let message = result.reason.map(|r| r.user_message());
            serde_json::json!({ "result": result, "message": message })
        }
        Command::Stats { code, period } => {
            let stats = tracking::code_stats(&checkout.db, &code, period, now)
                .await
                .map_err(|e| e.to_string())?;
            serde_json::to_value(stats).map_err(|e| e.to_string())?
        }
    };

    checkout.close().await;

    let text = serde_json::to_string_pretty(&output).map_err(|e| e.to_string())?;
    println!("{}", text);
    Ok(())
}

/// Parses the command line. `Ok(None)` means help was asked for.
fn parse_args(args: &[String]) -> Result<Option<(Option<PathBuf>, Command)>, String> {
    let mut config_path = None;
    let mut positional = Vec::new();
    let mut order_value: i64 = 0;
    let mut customer_id = None;
    let mut is_new_customer = false;
    let mut is_b2b = false;
    let mut period = StatsPeriod::default();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => return Ok(None),
            "--config" | "-c" => config_path = Some(PathBuf::from(value_after(args, &mut i)?)),
            "--order-value" => {
                let raw = value_after(args, &mut i)?;
                order_value = raw
                    .parse()
                    .map_err(|_| format!("Invalid order value: '{}'", raw))?;
            }
            "--customer" => customer_id = Some(value_after(args, &mut i)?.to_string()),
            "--new-customer" => is_new_customer = true,
            "--b2b" => is_b2b = true,
            "--period" => period = value_after(args, &mut i)?.parse()?,
            flag if flag.starts_with('-') => return Err(format!("Unknown option: {}", flag)),
            value => positional.push(value.to_string()),
        }
        i += 1;
    }

    let mut positional = positional.into_iter();
    let command = match positional.next().as_deref() {
        Some("status") => Command::Status,
        Some("validate") => Command::Validate {
            code: positional.next().ok_or("validate needs a code")?,
            ctx: ValidationContext {
                customer_id,
                order_value_cents: order_value,
                is_new_customer,
                is_b2b,
                ..Default::default()
            },
        },
        Some("stats") => Command::Stats {
            code: positional.next().ok_or("stats needs a code")?,
            period,
        },
        Some(other) => return Err(format!("Unknown command: {}", other)),
        None => return Ok(None),
    };

    if let Some(extra) = positional.next() {
        return Err(format!("Unexpected argument: {}", extra));
    }

    Ok(Some((config_path, command)))
}

fn value_after<'a>(args: &'a [String], i: &mut usize) -> Result<&'a str, String> {
    let flag = &args[*i];
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| format!("{} needs a value", flag))
}
