//! Clients for the external services a run talks to.

pub mod blob;
pub mod credential;
pub mod keys;
