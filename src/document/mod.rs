//! Script document model for taketrack.
//!
//! A document is an ordered list of headers; each header interleaves selectable
//! chunks (which receive takes) with non-selectable meta chunks.

pub mod model;
pub mod script;

pub use model::{Document, Renderable, Take, TakeMark, TimeSpan};
pub use script::{parse_script, read_script};
