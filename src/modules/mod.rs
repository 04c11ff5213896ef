pub mod servers;
pub mod whitelist;
