//! Personal time tracking from the terminal. A single timer runs at a time, finished entries are
//! grouped into summary, detailed and weekly reports with billable amounts, and everything can be
//! exported as CSV or as a JSON backup.
//!

pub mod cli;
pub mod config;
pub mod export;
pub mod model;
pub mod report;
pub mod settings;
pub mod storage;
pub mod timer;
pub mod utils;
