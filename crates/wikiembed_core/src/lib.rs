pub mod api;
pub mod client;
pub mod config;
pub mod excerpt;
pub mod farm;
pub mod output;
pub mod resolve;
pub mod services;
pub mod snapshot;
pub mod special;
pub mod text;
pub mod wiki;

#[cfg(test)]
mod test_support;
