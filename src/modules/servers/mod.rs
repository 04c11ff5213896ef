pub mod commands;

pub use commands::{servers, unused_ports};
