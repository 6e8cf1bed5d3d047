#![doc = include_str!("../README.md")]

pub mod dump;
pub mod error;
pub mod ifd;
pub mod image;
pub mod layout;
pub mod master;
pub mod ops;
pub mod region;
pub mod vscc;

#[cfg(test)]
pub(crate) mod testutil;

// An empty byte in a NOR flash is all-1's.
pub const EMPTY: u8 = 0xff;
