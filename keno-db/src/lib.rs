pub mod clock;
pub mod db;
pub mod kv;
pub mod models;
pub mod store;
