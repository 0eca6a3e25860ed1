pub mod checkpoint;
pub mod common;
pub mod history;
pub mod list;
pub mod sync;
