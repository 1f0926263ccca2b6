#![doc = include_str!("../README.md")]

pub mod config;
pub mod handlers;
pub mod sync;

pub use config::Config;
