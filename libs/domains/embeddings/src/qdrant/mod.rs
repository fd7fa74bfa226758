mod client;
mod config;

pub use client::QdrantProvidersRepository;
pub use config::QdrantConfig;
