pub mod apply;
pub mod checkpoint;
pub mod diff;
