#![warn(clippy::all)]
//! Compression and file I/O for voxtree point clouds
//!
//! - [compression] encodes sequences of point clouds into a compact byte stream, using the octree from
//!   `voxtree-core` together with a range coder.
//! - [ascii] reads and writes point clouds as text files.

pub mod ascii;
pub mod compression;
