use crate::shared::frame::Frame;

/// Yields successive frames from a camera, file or stream.
pub trait FrameSource: Send {
    /// Returns the next frame, or `Ok(None)` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>>;

    /// Releases the underlying device or file. Idempotent.
    fn close(&mut self);
}
