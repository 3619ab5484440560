// Crate root for the GT7 race-engineer service.

pub mod app;
pub mod config;
pub mod constants;
pub mod error;
pub mod net;
pub mod tasks;
pub mod udp;
pub mod utils;
