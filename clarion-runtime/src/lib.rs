#![warn(clippy::pedantic)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]
#![doc = include_str!("../README.md")]
//!
//! # Threading Notes
//!
//! All handles in this crate are `!Send`. Wakers are the exception: they only enqueue task ids
//! and may be woken from anywhere, but the loop itself is only ever driven by its own thread.

pub mod runtime;
