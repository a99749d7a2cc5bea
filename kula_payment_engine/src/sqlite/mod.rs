//! SQLite database module for the Kula Payment Engine.

mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
