// Crate root library declaration and module exports.
pub mod cache;
pub mod cli;
pub mod config;
pub mod context;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod ledger;
pub mod model;
pub mod provider;
pub mod scheduler;
pub mod sink;
pub mod storage;
pub mod store;
pub mod system;
pub mod wake_index;
