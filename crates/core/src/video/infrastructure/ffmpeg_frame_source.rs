use crate::shared::frame::Frame;
use crate::video::domain::frame_source::FrameSource;

/// Decodes frames from a camera device, video file or stream URL via
/// ffmpeg-next (libavdevice + libavformat + libavcodec).
///
/// Each decoded frame is scaled to the display resolution and converted
/// to RGB24.
pub struct FfmpegFrameSource {
    input_ctx: Option<ffmpeg_next::format::context::Input>,
    decoder: Option<ffmpeg_next::decoder::Video>,
    scaler: Option<ffmpeg_next::software::scaling::Context>,
    video_stream_index: usize,
    frame_index: usize,
    flushing: bool,
    done: bool,
}

// Safety: FfmpegFrameSource is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegFrameSource {}

impl FfmpegFrameSource {
    /// Opens `source`; a bare number such as `0` names a camera device.
    ///
    /// `display_size` rescales every frame; `None` keeps the native size.
    pub fn open(
        source: &str,
        display_size: Option<(u32, u32)>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;
        ffmpeg_next::device::register_all();

        let location = resolve_location(source);
        let ictx = ffmpeg_next::format::input(&location)
            .map_err(|e| format!("Cannot open video source {location}: {e}"))?;

        let (video_stream_index, decoder) = {
            let stream = ictx
                .streams()
                .best(ffmpeg_next::media::Type::Video)
                .ok_or("No video stream found")?;
            let codec_ctx =
                ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
            (stream.index(), codec_ctx.decoder().video()?)
        };

        let (out_w, out_h) = display_size.unwrap_or((decoder.width(), decoder.height()));
        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg_next::format::Pixel::RGB24,
            out_w,
            out_h,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )?;
        log::info!(
            "Opened {location}: {}x{} -> {out_w}x{out_h}",
            decoder.width(),
            decoder.height()
        );

        Ok(Self {
            input_ctx: Some(ictx),
            decoder: Some(decoder),
            scaler: Some(scaler),
            video_stream_index,
            frame_index: 0,
            flushing: false,
            done: false,
        })
    }
}

impl FrameSource for FfmpegFrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        let (Some(ictx), Some(decoder), Some(scaler)) = (
            self.input_ctx.as_mut(),
            self.decoder.as_mut(),
            self.scaler.as_mut(),
        ) else {
            return Ok(None);
        };
        if self.done {
            return Ok(None);
        }

        loop {
            if let Some(frame) = receive_rgb(decoder, scaler, self.frame_index)? {
                self.frame_index += 1;
                return Ok(Some(frame));
            }
            if self.flushing {
                self.done = true;
                return Ok(None);
            }

            match ictx.packets().next() {
                Some((stream, packet)) => {
                    if stream.index() != self.video_stream_index {
                        continue;
                    }
                    if let Err(e) = decoder.send_packet(&packet) {
                        log::trace!("Dropping undecodable packet: {e}");
                    }
                }
                None => {
                    let _ = decoder.send_eof();
                    self.flushing = true;
                }
            }
        }
    }

    fn close(&mut self) {
        self.scaler = None;
        self.decoder = None;
        self.input_ctx = None;
    }
}

/// Maps a bare camera index to its device node; anything else is passed
/// through to libavformat untouched.
fn resolve_location(source: &str) -> String {
    match source.trim().parse::<u32>() {
        Ok(index) if cfg!(target_os = "linux") => format!("/dev/video{index}"),
        _ => source.to_string(),
    }
}

fn receive_rgb(
    decoder: &mut ffmpeg_next::decoder::Video,
    scaler: &mut ffmpeg_next::software::scaling::Context,
    index: usize,
) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
    let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
    if decoder.receive_frame(&mut decoded).is_err() {
        return Ok(None);
    }
    let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
    scaler.run(&decoded, &mut rgb_frame)?;

    let (w, h) = (rgb_frame.width(), rgb_frame.height());
    let pixels = extract_rgb_pixels(&rgb_frame, w, h);
    Ok(Some(Frame::new(pixels, w, h, 3, index)))
}

/// Copies pixel data from an ffmpeg frame into a contiguous RGB buffer,
/// stripping per-row stride padding.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let row_bytes = width as usize * 3;

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + row_bytes]);
    }
    pixels
}
