#[macro_use]
extern crate nolog;

pub mod config;
pub mod device;
pub mod frame;
pub mod gateway;
pub mod params;
pub mod radio;
pub mod report;
pub mod stats;
pub mod sweep;
