pub mod cli;
pub mod client;
pub mod error;
pub mod faker;
pub mod generator;
pub mod parser;
pub mod ps;
pub mod store;

pub use error::{Error, Result};

pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
