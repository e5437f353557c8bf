//! Hard caps protecting the in-memory store from unbounded input.

pub const MAX_COURT_NAME_LEN: usize = 256;
pub const MAX_METADATA_ENTRIES: usize = 64;
pub const MAX_METADATA_VALUE_LEN: usize = 1024;
pub const MAX_COURTS: usize = 10_000;
pub const MAX_RESERVATIONS_PER_COURT: usize = 100_000;
