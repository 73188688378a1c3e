pub mod activity;
pub mod analyzer;
pub mod cli;
pub mod config;
pub mod error;
pub mod queue;
pub mod report;
pub mod service;
pub mod store;
pub mod suggest;
pub mod util;
pub mod worker;
