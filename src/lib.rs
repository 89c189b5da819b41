pub mod clock;
pub mod conditional;
pub mod config;
pub mod control;
pub mod entry;
pub mod error;
pub mod executor;
pub mod generate;
pub mod http;
pub mod io;
pub mod policy;
pub mod revalidate;
pub mod store;
pub mod suitability;
pub mod time;
pub mod transport;
pub mod validity;

pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;

#[macro_use]
extern crate log;

#[macro_use]
extern crate lazy_static;

#[macro_use]
extern crate derive_builder;
