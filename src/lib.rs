#[macro_use]
extern crate serde_derive;

pub mod capabilities;
pub mod config;
pub mod controller;
pub mod datatypes;
pub mod devices;
pub mod error;
pub mod gpio;
pub mod protocol;
pub mod remotedb;
#[cfg(feature = "async")]
pub mod tokio;
