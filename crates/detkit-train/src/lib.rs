//! Small helpers around a training loop: output directories, checkpoint key
//! cleanup and a running average.

pub mod checkpoint;
pub mod fs;
pub mod meter;

pub use checkpoint::{strip_module_prefix, strip_prefix_with};
pub use fs::ensure_dir;
pub use meter::AverageMeter;
