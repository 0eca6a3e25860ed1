//! Database layer for the mirror

mod connection;
mod migrations;
mod repository;

pub use connection::Database;
pub use repository::{MirrorStore, SqliteMirrorStore};
