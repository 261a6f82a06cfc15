pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod server;
pub mod services;
pub mod store;
pub mod types;

#[cfg(test)]
pub mod testing;
