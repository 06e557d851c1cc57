use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::shared::frame::Frame;
use crate::shared::overlay::Overlay;
use crate::video::domain::display_surface::{DisplaySurface, Key};
use crate::video::infrastructure::frame_painter;
use crate::video::infrastructure::headless_surface::log_overlays;
use crate::video::infrastructure::stdin_key_poller::StdinKeyPoller;

const DEFAULT_FPS: i32 = 30;

struct Encoding {
    octx: ffmpeg_next::format::context::Output,
    encoder: ffmpeg_next::codec::encoder::video::Encoder,
    scaler: ffmpeg_next::software::scaling::Context,
    width: u32,
    height: u32,
}

/// Paints overlays onto each presented frame and encodes the result to a
/// video file via ffmpeg-next.
///
/// The encoder opens on the first frame so the output takes the stream's
/// own resolution.
pub struct FfmpegRecordingSurface {
    path: PathBuf,
    fps: i32,
    encoding: Option<Encoding>,
    frame_count: usize,
    keys: Option<StdinKeyPoller>,
}

// Safety: FfmpegRecordingSurface is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegRecordingSurface {}

impl FfmpegRecordingSurface {
    pub fn new(path: &Path, keys: Option<StdinKeyPoller>) -> Self {
        Self {
            path: path.to_path_buf(),
            fps: DEFAULT_FPS,
            encoding: None,
            frame_count: 0,
            keys,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    fn open(&self, width: u32, height: u32) -> Result<Encoding, Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut octx = ffmpeg_next::format::output(&self.path)?;
        let global_header = octx
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

        let codec = ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::MPEG4)
            .ok_or("MPEG4 encoder not found")?;
        let mut ost = octx.add_stream(Some(codec))?;

        let mut encoder_ctx = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()?;
        encoder_ctx.set_width(width);
        encoder_ctx.set_height(height);
        encoder_ctx.set_format(ffmpeg_next::format::Pixel::YUV420P);
        encoder_ctx.set_time_base(ffmpeg_next::Rational(1, self.fps));
        encoder_ctx.set_frame_rate(Some(ffmpeg_next::Rational(self.fps, 1)));
        if global_header {
            encoder_ctx.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }

        let encoder = encoder_ctx.open_with(ffmpeg_next::Dictionary::new())?;
        ost.set_parameters(&encoder);
        octx.write_header()?;

        let scaler = ffmpeg_next::software::scaling::Context::get(
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::format::Pixel::YUV420P,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )?;
        log::info!("Recording {width}x{height} to {}", self.path.display());

        Ok(Encoding {
            octx,
            encoder,
            scaler,
            width,
            height,
        })
    }
}

impl Encoding {
    fn write(&mut self, frame: &Frame, pts: i64, fps: i32) -> Result<(), Box<dyn std::error::Error>> {
        if (frame.width(), frame.height()) != (self.width, self.height) {
            return Err(format!(
                "Frame size {}x{} differs from recording size {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )
            .into());
        }

        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::new(
            ffmpeg_next::format::Pixel::RGB24,
            self.width,
            self.height,
        );
        let stride = rgb_frame.stride(0);
        let row_bytes = self.width as usize * 3;
        let dst = rgb_frame.data_mut(0);
        for (row, src) in frame.data().chunks_exact(row_bytes).enumerate() {
            dst[row * stride..row * stride + row_bytes].copy_from_slice(src);
        }

        let mut yuv_frame = ffmpeg_next::util::frame::video::Video::empty();
        self.scaler.run(&rgb_frame, &mut yuv_frame)?;
        yuv_frame.set_pts(Some(pts));

        self.encoder.send_frame(&yuv_frame)?;
        self.drain(fps)
    }

    fn drain(&mut self, fps: i32) -> Result<(), Box<dyn std::error::Error>> {
        let ost_time_base = self
            .octx
            .stream(0)
            .ok_or("Output stream missing")?
            .time_base();
        let mut encoded = ffmpeg_next::Packet::empty();
        while self.encoder.receive_packet(&mut encoded).is_ok() {
            encoded.set_stream(0);
            encoded.rescale_ts(ffmpeg_next::Rational(1, fps), ost_time_base);
            encoded.write_interleaved(&mut self.octx)?;
        }
        Ok(())
    }

    fn finish(&mut self, fps: i32) -> Result<(), Box<dyn std::error::Error>> {
        self.encoder.send_eof()?;
        self.drain(fps)?;
        self.octx.write_trailer()?;
        Ok(())
    }
}

impl DisplaySurface for FfmpegRecordingSurface {
    fn present(
        &mut self,
        mut frame: Frame,
        overlays: &[Overlay],
    ) -> Result<(), Box<dyn std::error::Error>> {
        if frame.channels() != 3 {
            return Err("Recording requires RGB frames".into());
        }
        log_overlays(frame.index(), overlays);
        for overlay in overlays {
            frame_painter::draw_overlay(&mut frame, overlay);
        }

        if self.encoding.is_none() {
            self.encoding = Some(self.open(frame.width(), frame.height())?);
        }
        let fps = self.fps;
        let pts = self.frame_count as i64;
        if let Some(encoding) = self.encoding.as_mut() {
            encoding.write(&frame, pts, fps)?;
        }
        self.frame_count += 1;
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
        if let Some(mut encoding) = self.encoding.take() {
            encoding.finish(self.fps)?;
            log::info!(
                "Wrote {} frames to {}",
                self.frame_count,
                self.path.display()
            );
        }
        Ok(())
    }
}
