pub mod check;
pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod rc4;
pub mod runner;
pub mod workload;

pub use error::ClientError;
pub use runner::{run, run_once};
