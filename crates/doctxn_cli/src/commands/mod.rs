//! CLI command implementations.

pub mod dump_journal;
pub mod inspect;
pub mod json;
pub mod run;
