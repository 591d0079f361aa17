pub mod bbox;
pub mod doctor;
pub mod letterbox;
pub mod overlap;

use thiserror::Error;

pub use bbox::BBox;
pub use letterbox::{
    preprocess, BgrFrame, LetterboxMeta, LetterboxOptions, Letterboxed, TargetShape,
};
pub use overlap::{bbox_overlaps, OverlapMode};

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, VisionError>;

pub(crate) fn invalid(msg: impl Into<String>) -> VisionError {
    VisionError::InvalidArgument(msg.into())
}
