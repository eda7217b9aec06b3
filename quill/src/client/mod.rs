//! The driver entry point: sessions, their configuration, pagination.

pub mod pager;
pub mod session;
pub mod session_builder;
pub(crate) mod txn_time;

#[cfg(test)]
mod session_test;
