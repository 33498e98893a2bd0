// Library exports for testing
// The binary (main.rs) imports these as well

pub mod cli;
pub mod commands;
pub mod connection_info;
pub mod error;
pub mod handlers;
pub mod logger;

#[cfg(test)]
mod tests;
