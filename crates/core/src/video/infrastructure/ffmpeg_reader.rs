use std::path::Path;

use crate::shared::frame::Frame;
use crate::shared::source_info::SourceInfo;
use crate::video::domain::frame_reader::FrameReader;

/// Decodes video files via ffmpeg-next (libavformat + libavcodec).
///
/// Converts each decoded frame to RGB24 and wraps it in a [`Frame`].
pub struct FfmpegReader {
    stream: Option<StreamDecoder>,
}

// Safety: FfmpegReader is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegReader {}

impl FfmpegReader {
    pub fn new() -> Self {
        Self { stream: None }
    }
}

impl Default for FfmpegReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReader for FfmpegReader {
    fn open(&mut self, path: &Path) -> Result<SourceInfo, Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;
        let ictx = ffmpeg_next::format::input(path)?;
        let (stream, mut info) = StreamDecoder::new(ictx)?;
        info.source_path = Some(path.to_path_buf());
        self.stream = Some(stream);
        Ok(info)
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        self.stream
            .as_mut()
            .ok_or("FfmpegReader: not opened")?
            .next_frame()
    }

    fn close(&mut self) {
        self.stream = None;
    }
}

/// Pull-based decoder over the best video stream of an opened input.
///
/// Shared by the file, image and camera readers. Decoding is lazy: each
/// [`StreamDecoder::next_frame`] call reads only as many packets as needed.
pub(crate) struct StreamDecoder {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: Option<ffmpeg_next::software::scaling::Context>,
    stream_index: usize,
    frame_index: usize,
    flushing: bool,
    done: bool,
}

impl StreamDecoder {
    pub(crate) fn new(
        ictx: ffmpeg_next::format::context::Input,
    ) -> Result<(Self, SourceInfo), Box<dyn std::error::Error>> {
        let (stream_index, decoder, fps, total_frames) = {
            let stream = ictx
                .streams()
                .best(ffmpeg_next::media::Type::Video)
                .ok_or("No video stream found")?;
            let codec_ctx =
                ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
            let decoder = codec_ctx.decoder().video()?;
            let rate = stream.rate();
            let fps = if rate.denominator() != 0 {
                Some(rate.numerator() as f64 / rate.denominator() as f64)
            } else {
                None
            };
            let frames = stream.frames();
            let total_frames = if frames > 0 {
                Some(frames as usize)
            } else {
                None
            };
            (stream.index(), decoder, fps, total_frames)
        };

        let info = SourceInfo {
            width: decoder.width(),
            height: decoder.height(),
            fps: fps.filter(|f| f.is_finite() && *f > 0.0),
            total_frames,
            codec: decoder
                .codec()
                .map(|c| c.name().to_string())
                .unwrap_or_default(),
            source_path: None,
        };

        Ok((
            Self {
                ictx,
                decoder,
                scaler: None,
                stream_index,
                frame_index: 0,
                flushing: false,
                done: false,
            },
            info,
        ))
    }

    /// Next decoded frame, `Ok(None)` at end of stream.
    ///
    /// A corrupt packet or failed conversion yields `Err` for that unit only;
    /// the following call resumes with the next packet.
    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        if self.done {
            return Ok(None);
        }

        loop {
            if let Some(frame) = self.try_receive()? {
                return Ok(Some(frame));
            }
            if self.flushing {
                self.done = true;
                return Ok(None);
            }

            let mut packet = ffmpeg_next::Packet::empty();
            match packet.read(&mut self.ictx) {
                Ok(()) => {}
                Err(ffmpeg_next::Error::Eof) => {
                    let _ = self.decoder.send_eof();
                    self.flushing = true;
                    continue;
                }
                Err(ffmpeg_next::Error::Other { errno })
                    if errno == ffmpeg_next::util::error::EAGAIN =>
                {
                    std::thread::sleep(std::time::Duration::from_millis(2));
                    continue;
                }
                Err(e) => return Err(format!("read failed: {e}").into()),
            }

            if packet.stream() != self.stream_index {
                continue;
            }
            if let Err(e) = self.decoder.send_packet(&packet) {
                return Err(
                    format!("undecodable packet after frame {}: {e}", self.frame_index).into(),
                );
            }
        }
    }

    fn try_receive(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }

        let (width, height) = (decoded.width(), decoded.height());
        if self.scaler.is_none() {
            self.scaler = Some(ffmpeg_next::software::scaling::Context::get(
                decoded.format(),
                width,
                height,
                ffmpeg_next::format::Pixel::RGB24,
                width,
                height,
                ffmpeg_next::software::scaling::Flags::BILINEAR,
            )?);
        }
        let scaler = self.scaler.as_mut().ok_or("scaler missing")?;

        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
        scaler.run(&decoded, &mut rgb_frame)?;

        let pixels = extract_rgb_pixels(&rgb_frame, width, height);
        let frame = Frame::new(pixels, width, height, 3, self.frame_index);
        self.frame_index += 1;
        Ok(Some(frame))
    }
}

/// Copies pixel data from an ffmpeg frame into a contiguous RGB buffer.
///
/// ffmpeg frames may pad each row (stride > width*3); the padding is dropped.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}
