//! Entry points behind the `fleetscan` binary.

pub mod asset_create;
pub mod cli;
pub mod run;
pub mod telemetry;
