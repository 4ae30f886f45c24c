pub mod walker;

pub use walker::{count_nonblank_lines, FileWalker};
