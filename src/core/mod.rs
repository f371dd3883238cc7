pub mod account;
pub mod snapshot;
pub mod tag;
pub mod task;
