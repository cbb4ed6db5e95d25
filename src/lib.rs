pub mod config;
pub mod fetch;
pub mod infra;
pub mod job;
pub mod output;
pub mod record;
pub mod schedule;
