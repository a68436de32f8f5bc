#![doc = include_str!("../README.md")]
#![allow(clippy::arithmetic_side_effects)] // FIXME: remove

pub mod bitmap;
pub mod fast_path;
pub mod geometry;
pub mod input;
pub mod palette;
pub mod pointer;
pub mod surface_commands;

mod per;

/// Hard cap on the size of one Fast-Path PDU, headers included.
///
/// The length field is 14 bits wide, but implementations in the wild keep
/// PDUs under 16 KiB; fragments are sized so the largest header still fits.
pub const MAX_PACKET_SIZE: usize = 16384;

/// Maximum payload bytes carried by a single update fragment
/// (`MAX_PACKET_SIZE` minus worst-case header and envelope overhead).
pub const MAX_FRAGMENT_DATA_SIZE: usize = MAX_PACKET_SIZE - 20;
