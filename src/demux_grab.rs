//! Strategy 1: container demux + forward decode.
//!
//! The fastest path and the first one tried. Parses the container, feeds
//! compressed samples to a decoder (hardware-preferring when the `hardware`
//! feature is enabled) in a single forward pass starting at the keyframe
//! preceding the first requested timestamp, and renders each decoded frame
//! against an explicit cursor over the planned timestamps. When the decode
//! rate is lower than the requested sampling rate the same decoded frame is
//! emitted for several consecutive planned timestamps.
//!
//! Portrait recordings are handled here: the track's display matrix is read
//! once and, when it is not the identity, every rendered frame is rotated
//! upright before being resized - each axis independently - to fill the
//! target raster exactly.

use ffmpeg_next::{
    codec::context::Context as CodecContext,
    format::Pixel,
    frame::Video as VideoFrame,
    media::Type as MediaType,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};
use image::{RgbaImage, imageops, imageops::FilterType};

use crate::{
    error::GifpressError,
    frames::{FrameRequest, FrameSink, FrameStrategy, GrabbedFrame},
    probe::{Orientation, stream_orientation},
    progress::CancellationToken,
    utilities,
};

/// Tolerance when comparing decoded timestamps against planned ones.
const TIMESTAMP_EPSILON: f64 = 1e-6;

const STRATEGY_NAME: &str = "demux-decode";

/// Demux-and-decode frame grabbing (strategy 1).
pub struct DemuxDecodeStrategy;

fn decode_error(reason: impl ToString) -> GifpressError {
    GifpressError::Decode {
        strategy: STRATEGY_NAME,
        reason: reason.to_string(),
    }
}

impl FrameStrategy for DemuxDecodeStrategy {
    fn name(&self) -> &'static str {
        STRATEGY_NAME
    }

    fn grab(
        &self,
        request: &FrameRequest<'_>,
        token: &CancellationToken,
        sink: &mut FrameSink<'_>,
    ) -> Result<usize, GifpressError> {
        let mut input = ffmpeg_next::format::input(&request.path).map_err(decode_error)?;

        let (stream_index, time_base, orientation, parameters) = {
            let stream = input
                .streams()
                .best(MediaType::Video)
                .ok_or_else(|| decode_error("no video stream"))?;
            (
                stream.index(),
                stream.time_base(),
                stream_orientation(&stream),
                stream.parameters(),
            )
        };

        let decoder_context = CodecContext::from_parameters(parameters).map_err(decode_error)?;

        #[cfg(feature = "hardware")]
        let mut decoder = crate::hardware::open_decoder(decoder_context).map_err(decode_error)?;
        #[cfg(not(feature = "hardware"))]
        let mut decoder = decoder_context
            .decoder()
            .video()
            .map_err(decode_error)?;

        let first_timestamp = request.timestamps[0];
        let last_timestamp = request.timestamps[request.timestamps.len() - 1];

        // Lands on the nearest preceding keyframe, which is where decoding
        // must start for the first requested timestamp to be decodable.
        let seek_target = utilities::seconds_to_stream_timestamp(first_timestamp, time_base);
        input.seek(seek_target, ..seek_target).map_err(decode_error)?;

        let mut renderer = FrameRenderer::new(orientation, request.width, request.height);
        let mut cursor = 0usize;
        let mut decoded = VideoFrame::empty();

        for (stream, packet) in input.packets() {
            if token.is_cancelled() {
                return Err(GifpressError::Aborted);
            }
            if stream.index() != stream_index {
                continue;
            }

            let packet_seconds = packet
                .pts()
                .or_else(|| packet.dts())
                .map(|ts| utilities::pts_to_seconds(ts, time_base));

            decoder.send_packet(&packet).map_err(decode_error)?;

            while decoder.receive_frame(&mut decoded).is_ok() {
                if !emit_ready_frames(
                    &decoded, time_base, request, token, sink, &mut renderer, &mut cursor,
                )? {
                    return Ok(cursor);
                }
            }

            if cursor >= request.timestamps.len() {
                break;
            }

            // Stop feeding once a keyframe at or after the last requested
            // timestamp has gone in; everything still needed is now
            // decodable from the flush.
            if let Some(seconds) = packet_seconds {
                if packet.is_key() && seconds >= last_timestamp {
                    break;
                }
            }
        }

        // Flush the decoder for the tail of the requested range.
        if cursor < request.timestamps.len() {
            decoder.send_eof().map_err(decode_error)?;
            while decoder.receive_frame(&mut decoded).is_ok() {
                if !emit_ready_frames(
                    &decoded, time_base, request, token, sink, &mut renderer, &mut cursor,
                )? {
                    return Ok(cursor);
                }
            }
        }

        if cursor == 0 {
            return Err(decode_error("no frames decoded in the requested range"));
        }

        Ok(cursor)
    }
}

/// Emit the decoded frame for every planned timestamp it satisfies.
///
/// The cursor only advances when the decoded timestamp has caught up with
/// the next planned timestamp; a single decoded frame may therefore be
/// emitted several times. Returns `false` when the sink asked to stop.
fn emit_ready_frames(
    decoded: &VideoFrame,
    time_base: ffmpeg_next::Rational,
    request: &FrameRequest<'_>,
    token: &CancellationToken,
    sink: &mut FrameSink<'_>,
    renderer: &mut FrameRenderer,
    cursor: &mut usize,
) -> Result<bool, GifpressError> {
    let timestamps = request.timestamps;
    let frame_seconds = decoded
        .pts()
        .map(|pts| utilities::pts_to_seconds(pts, time_base))
        .unwrap_or(f64::MAX);

    let mut pending = 0usize;
    while *cursor + pending < timestamps.len()
        && frame_seconds + TIMESTAMP_EPSILON >= timestamps[*cursor + pending]
    {
        pending += 1;
    }
    if pending == 0 {
        return Ok(true);
    }

    let rendered = renderer.render(decoded)?;

    for _ in 0..pending {
        if token.is_cancelled() {
            return Err(GifpressError::Aborted);
        }

        let image = rendered.clone();

        let index = *cursor;
        *cursor += 1;

        if !sink(
            index,
            GrabbedFrame {
                image,
                timestamp: frame_seconds,
            },
        ) {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Converts decoded frames to upright RGBA rasters at the target size.
///
/// The scaling context is built lazily from the first frame's actual format
/// and recreated if the stream changes mid-file.
struct FrameRenderer {
    orientation: Orientation,
    target_width: u32,
    target_height: u32,
    scaler: Option<(ScalingContext, Pixel, u32, u32)>,
    rgba_frame: VideoFrame,
}

impl FrameRenderer {
    fn new(orientation: Orientation, target_width: u32, target_height: u32) -> Self {
        Self {
            orientation,
            target_width,
            target_height,
            scaler: None,
            rgba_frame: VideoFrame::empty(),
        }
    }

    fn render(&mut self, decoded: &VideoFrame) -> Result<RgbaImage, GifpressError> {
        #[cfg(feature = "hardware")]
        let transferred =
            crate::hardware::transfer_to_system_memory(decoded).map_err(decode_error)?;
        #[cfg(feature = "hardware")]
        let decoded = transferred.as_ref().unwrap_or(decoded);

        let (format, width, height) = (decoded.format(), decoded.width(), decoded.height());

        let needs_new = !matches!(
            &self.scaler,
            Some((_, f, w, h)) if *f == format && *w == width && *h == height
        );
        if needs_new {
            let context = ScalingContext::get(
                format,
                width,
                height,
                Pixel::RGBA,
                width,
                height,
                ScalingFlags::BILINEAR,
            )
            .map_err(decode_error)?;
            self.scaler = Some((context, format, width, height));
        }

        let (scaler, ..) = self
            .scaler
            .as_mut()
            .ok_or_else(|| decode_error("scaler unavailable"))?;
        scaler.run(decoded, &mut self.rgba_frame).map_err(decode_error)?;

        let buffer = utilities::frame_to_rgba_buffer(&self.rgba_frame, width, height);
        let image = RgbaImage::from_raw(width, height, buffer)
            .ok_or_else(|| decode_error("failed to build RGBA image from decoded frame"))?;

        let upright = match self.orientation {
            Orientation::Identity => image,
            Orientation::Rotate90 => imageops::rotate90(&image),
            Orientation::Rotate180 => imageops::rotate180(&image),
            Orientation::Rotate270 => imageops::rotate270(&image),
        };

        if (upright.width(), upright.height()) == (self.target_width, self.target_height) {
            Ok(upright)
        } else {
            Ok(imageops::resize(
                &upright,
                self.target_width,
                self.target_height,
                FilterType::Triangle,
            ))
        }
    }
}
