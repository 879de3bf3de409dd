//! sumi-core - Cell matrix model for the sumi e-paper terminal
//!
//! This crate provides the platform-independent half of the rendering
//! pipeline:
//! - Integer geometry (points, rectangles, bounding-box accumulation)
//! - Rectangle coalescing with a bounded-waste merge policy
//! - Colors, palettes and packed pixel layouts
//! - The dirty-tracked terminal cell matrix with minimal-diff commits
//!
//! It is deterministic and free of I/O; everything display-related lives in
//! the `sumi-term` crate.

mod cell;
mod color;
mod geometry;
mod matrix;
mod merge;
mod style;

pub use cell::Cell;
pub use color::{Color, ColorLayout, Palette, Rgba};
pub use geometry::{Point, Rect};
pub use matrix::{CellUpdate, Matrix};
pub use merge::RectangleMerger;
pub use style::{Style, Underline};
