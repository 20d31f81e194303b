//! One function per CLI subcommand.

pub mod checkpoint;
pub mod chunked;
pub mod common;
pub mod files;
pub mod health;
pub mod maintenance;
pub mod run;
