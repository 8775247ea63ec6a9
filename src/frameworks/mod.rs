// Frameworks layer: process bootstrap, configuration, and the TCP acceptor.

pub mod config;
pub mod server;
