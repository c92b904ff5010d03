use std::time::SystemTime;

/// Counters kept by a display feed consumer
#[derive(Debug, Clone, Default)]
pub struct DisplayStats {
    pub frames_presented: u64,
    pub negotiations: u64,
    pub last_frame_time: Option<SystemTime>,
}

impl DisplayStats {
    pub fn record_frame(&mut self) {
        self.frames_presented += 1;
        self.last_frame_time = Some(SystemTime::now());
    }

    pub fn record_negotiation(&mut self) {
        self.negotiations += 1;
    }
}
