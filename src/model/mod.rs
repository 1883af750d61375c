//! Plain records shared by storage, the timer and reports.

pub mod entities;
pub mod filter;
