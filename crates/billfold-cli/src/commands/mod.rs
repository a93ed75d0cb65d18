pub mod common;
pub mod conflicts;
pub mod create;
pub mod delete;
pub mod get;
pub mod list;
pub mod refresh;
pub mod resolve;
pub mod sync;
pub mod update;
