// lib.rs      gifex crate.
//
// Copyright (c) 2020  Douglas Lau
//
//! ## Extract the frames of an animated GIF
//!
//! Each frame is reconstructed as a fully-composited, canvas-sized RGBA
//! image, together with its delay, offset, size and disposal method.
//! Decoding of the still images is delegated to the [image] crate.
//!
//! [image]: https://docs.rs/image
#[macro_use]
extern crate log;

pub mod block;
mod composite;
mod cursor;
mod error;
mod private;
mod scan;
#[cfg(test)]
mod testutil;

pub use crate::composite::{Animation, Frame};
pub use crate::error::{Error, Result};
pub use crate::private::{is_animated, is_animated_data, Extractor};
