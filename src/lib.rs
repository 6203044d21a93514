#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

pub mod binding;
pub mod configuration;
pub mod context;
pub mod reservation;
pub mod validation;
