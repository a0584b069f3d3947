pub mod db;
pub mod household;
pub mod models;
pub mod namespace;
pub mod server_store;
pub mod stats;
pub mod sync;
