//! Reading and writing point clouds as text, one point per line
//!
//! The columns of a line are described by a format string with one literal per column:
//! - `x`, `y`, `z`: coordinates
//! - `R`, `G`, `B`: color channels in `[0;255]`
//! - `s`: a column that is skipped
//!
//! Colors are either given with all three channels or not at all.

mod format;
pub(crate) use self::format::*;

mod reader;
pub use self::reader::*;

mod writer;
pub use self::writer::*;
