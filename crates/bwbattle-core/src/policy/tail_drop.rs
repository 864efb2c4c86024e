use super::{Decision, DropReason};
use crate::buffer::Buffer;

/// Class-blind baseline: admit while there is room.
#[derive(Debug, Clone, Copy, Default)]
pub struct TailDrop;

impl TailDrop {
    pub fn decide(&self, buffer: &Buffer) -> Decision {
        if buffer.is_full() {
            Decision::Drop(DropReason::Capacity)
        } else {
            Decision::Admit
        }
    }
}
