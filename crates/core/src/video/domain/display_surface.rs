use std::time::Duration;

use crate::shared::frame::Frame;
use crate::shared::overlay::Overlay;

/// A key press delivered by the display surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Escape,
    Char(char),
}

impl Key {
    pub const ESCAPE_CODE: u32 = 27;

    pub fn from_code(code: u32) -> Option<Self> {
        if code == Self::ESCAPE_CODE {
            return Some(Key::Escape);
        }
        char::from_u32(code).map(Key::Char)
    }

    /// ESC or `q` ends the live loop.
    pub fn is_exit(&self) -> bool {
        matches!(self, Key::Escape | Key::Char('q') | Key::Char('Q'))
    }
}

/// Where annotated frames end up, plus the user's way of talking back.
pub trait DisplaySurface: Send {
    /// Shows `frame` with `overlays` drawn next to their faces.
    fn present(
        &mut self,
        frame: Frame,
        overlays: &[Overlay],
    ) -> Result<(), Box<dyn std::error::Error>>;

    /// Waits at most `timeout` for a key press.
    fn poll_key(&mut self, timeout: Duration) -> Option<Key>;

    /// Flushes and releases the surface. Idempotent.
    fn close(&mut self) -> Result<(), Box<dyn std::error::Error>>;
}
