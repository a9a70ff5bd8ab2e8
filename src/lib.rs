#![cfg_attr(not(test), no_std)]

pub mod bmp;
pub mod bus;
pub mod hx8357;
pub mod init;
pub mod regs;
pub mod storage;

#[cfg(feature = "esp32s3")]
pub mod wiring;

#[cfg(test)]
mod sim;
