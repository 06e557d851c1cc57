use std::time::Duration;

use crate::shared::frame::Frame;
use crate::shared::overlay::Overlay;
use crate::video::domain::display_surface::{DisplaySurface, Key};
use crate::video::infrastructure::stdin_key_poller::StdinKeyPoller;

/// A surface with no window: overlay text goes to the log.
pub struct HeadlessSurface {
    keys: Option<StdinKeyPoller>,
    frames_presented: usize,
}

impl HeadlessSurface {
    pub fn new(keys: Option<StdinKeyPoller>) -> Self {
        Self {
            keys,
            frames_presented: 0,
        }
    }

    pub fn frames_presented(&self) -> usize {
        self.frames_presented
    }
}

impl DisplaySurface for HeadlessSurface {
    fn present(
        &mut self,
        frame: Frame,
        overlays: &[Overlay],
    ) -> Result<(), Box<dyn std::error::Error>> {
        log_overlays(frame.index(), overlays);
        self.frames_presented += 1;
        Ok(())
    }

    fn poll_key(&mut self, timeout: Duration) -> Option<Key> {
        match &self.keys {
            Some(keys) => keys.poll(timeout),
            None => {
                std::thread::sleep(timeout);
                None
            }
        }
    }

    fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.keys = None;
        Ok(())
    }
}

/// Emits one debug line per annotated face.
pub fn log_overlays(frame_index: usize, overlays: &[Overlay]) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    for overlay in overlays.iter().filter(|o| !o.lines.is_empty()) {
        let text: Vec<String> = overlay.lines.iter().map(ToString::to_string).collect();
        log::debug!(
            "frame {frame_index} face {} ({},{})-({},{}): {}",
            overlay.slot,
            overlay.bbox.left,
            overlay.bbox.top,
            overlay.bbox.right,
            overlay.bbox.bottom,
            text.join(", ")
        );
    }
}
