pub mod api;
pub mod audit;
pub mod auth;
pub mod clock;
pub mod engine;
pub mod janitor;
pub mod limits;
pub mod model;
pub mod observability;
pub mod wal;
