//! Manage the persisted login session.
//!
//! Usage:
//!   session login <user> <password> [--remember]
//!   session logout
//!   session status

use std::process;

use anyhow::Result;
use chrono::Utc;

use sheetpulse::config::Config;
use sheetpulse::session::{Credentials, LoginOutcome, SessionContext, SessionStatus};
use sheetpulse::storage::SqliteStore;

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  session login <user> <password> [--remember]");
    eprintln!("  session logout");
    eprintln!("  session status");
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let cfg = Config::from_env();
    let store = SqliteStore::open(&cfg.sqlite_path)?;
    let mut session = SessionContext::new(
        store,
        Credentials {
            username: cfg.username.clone(),
            password: cfg.password.clone(),
        },
        &cfg.store_prefix,
    )
    .with_expiry_hours(cfg.session_hours as i64);

    match args[1].as_str() {
        "login" => {
            if args.len() < 4 {
                print_usage();
                process::exit(1);
            }
            let remember = args[4..].iter().any(|a| a == "--remember");
            match session.login(&args[2], &args[3], remember, Utc::now())? {
                LoginOutcome::Accepted => println!("logged in as {}", args[2]),
                LoginOutcome::Rejected => {
                    eprintln!("Invalid username or password");
                    process::exit(2);
                }
            }
        }
        "logout" => {
            session.logout()?;
            println!("logged out");
        }
        "status" => match session.check(Utc::now())? {
            SessionStatus::Valid { remaining_minutes } => println!(
                "active: {} ({} minutes left)",
                session.user()?.unwrap_or_default(),
                remaining_minutes
            ),
            SessionStatus::Expired => println!("expired"),
            SessionStatus::Missing => println!("not logged in"),
        },
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            process::exit(1);
        }
    }
    Ok(())
}
