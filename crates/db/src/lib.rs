pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{begin_write, connect, connect_with_settings, ping, DbPool};
pub use fixtures::{AdminSeed, SeedDataset, SeedResult, VerificationResult};
