#![doc = include_str!("../README.md")]
pub mod error;
pub mod logging;
pub mod native;
pub mod util;
