//! Headless polling dashboard over published spreadsheet CSV feeds.
//!
//! Each view polls its own CSV URL, parses it into a [`grid::RawGrid`], and
//! derives what it shows from that grid alone: team aggregates for the
//! dashboard, changed-row highlights for the report, a searchable table for
//! the collection view, and filtered file exports.

pub mod aggregate;
pub mod change;
pub mod classify;
pub mod config;
pub mod error;
pub mod export;
pub mod feed;
pub mod grid;
pub mod logging;
pub mod session;
pub mod storage;
pub mod table;
pub mod view;
