//! kvsyncd subcommands

pub mod dump;
pub mod run;
pub mod write;
