//! Router dialect drivers

pub mod iptime;

pub use iptime::{IpTimeFactory, IpTimeRouter};
