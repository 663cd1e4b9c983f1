mod client;
mod provider;

pub use client::GitHubClient;
pub use provider::GitHubProvider;
