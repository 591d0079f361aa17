use crate::{OverlapMode, Result, TargetShape};

pub fn check_target(height: u32, width: u32) -> Result<TargetShape> {
    TargetShape::new(height, width)
}

pub fn check_overlap_mode(mode: &str) -> Result<OverlapMode> {
    mode.parse()
}
