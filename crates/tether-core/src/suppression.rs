use std::collections::VecDeque;

/// Raw inbound frames held back while the UI is highlighting text. Frames
/// come back out in arrival order and are never dropped.
#[derive(Debug, Clone, Default)]
pub struct SuppressionBuffer {
    frames: VecDeque<String>,
}

impl SuppressionBuffer {
    pub fn push(&mut self, frame: String) {
        self.frames.push_back(frame);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Empties the buffer, oldest frame first.
    pub fn drain(&mut self) -> Vec<String> {
        self.frames.drain(..).collect()
    }
}
