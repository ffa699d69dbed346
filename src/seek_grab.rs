//! Strategy 2: sequential seek-and-capture.
//!
//! The compatibility fallback. Instead of a single forward pass over the
//! samples, it seeks to each requested timestamp in turn, waits for the
//! decoder to produce the frame at or after it, and captures that frame at
//! the target raster size through the scaler's native scaling. One seek is
//! awaited at a time, so frames cannot complete out of order. Slower than
//! demux-decode but tolerant of containers whose sample tables confuse the
//! single-pass path.

use ffmpeg_next::{
    codec::context::Context as CodecContext,
    format::Pixel,
    frame::Video as VideoFrame,
    media::Type as MediaType,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};
use image::RgbaImage;

use crate::{
    error::GifpressError,
    frames::{FrameRequest, FrameSink, FrameStrategy, GrabbedFrame},
    progress::CancellationToken,
    utilities,
};

const STRATEGY_NAME: &str = "seek-grab";

/// Seek-per-timestamp frame grabbing (strategy 2).
pub struct SeekGrabStrategy;

fn decode_error(reason: impl ToString) -> GifpressError {
    GifpressError::Decode {
        strategy: STRATEGY_NAME,
        reason: reason.to_string(),
    }
}

impl FrameStrategy for SeekGrabStrategy {
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

        let (stream_index, time_base, parameters) = {
            let stream = input
                .streams()
                .best(MediaType::Video)
                .ok_or_else(|| decode_error("no video stream"))?;
            (stream.index(), stream.time_base(), stream.parameters())
        };

        let mut decoder = CodecContext::from_parameters(parameters)
            .map_err(decode_error)?
            .decoder()
            .video()
            .map_err(decode_error)?;

        let mut scaler = ScalingContext::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            Pixel::RGBA,
            request.width,
            request.height,
            ScalingFlags::BILINEAR,
        )
        .map_err(decode_error)?;

        let mut produced = 0usize;

        for (index, &timestamp) in request.timestamps.iter().enumerate() {
            if token.is_cancelled() {
                return Err(GifpressError::Aborted);
            }

            let seek_target = utilities::seconds_to_stream_timestamp(timestamp, time_base);
            input.seek(seek_target, ..seek_target).map_err(decode_error)?;
            // Drop any frames buffered from the previous position.
            decoder.flush();

            let image = capture_frame_at(
                &mut input,
                &mut decoder,
                &mut scaler,
                stream_index,
                time_base,
                timestamp,
                request,
            )?;

            produced += 1;
            if !sink(index, GrabbedFrame { image, timestamp }) {
                return Ok(produced);
            }
        }

        Ok(produced)
    }
}

/// Decode forward until a frame at or after `timestamp` appears and return
/// it scaled to the target raster.
fn capture_frame_at(
    input: &mut ffmpeg_next::format::context::Input,
    decoder: &mut ffmpeg_next::decoder::Video,
    scaler: &mut ScalingContext,
    stream_index: usize,
    time_base: ffmpeg_next::Rational,
    timestamp: f64,
    request: &FrameRequest<'_>,
) -> Result<RgbaImage, GifpressError> {
    let mut decoded = VideoFrame::empty();
    let mut scaled = VideoFrame::empty();
    // After a backward-landing seek the decoder replays preceding frames;
    // keep the newest one so a short file still yields its last frame.
    let mut newest: Option<RgbaImage> = None;

    let finish = |scaled: &VideoFrame| -> Result<RgbaImage, GifpressError> {
        let buffer = utilities::frame_to_rgba_buffer(scaled, request.width, request.height);
        RgbaImage::from_raw(request.width, request.height, buffer)
            .ok_or_else(|| decode_error("failed to build RGBA image from decoded frame"))
    };

    for (stream, packet) in input.packets() {
        if stream.index() != stream_index {
            continue;
        }

        decoder.send_packet(&packet).map_err(decode_error)?;

        while decoder.receive_frame(&mut decoded).is_ok() {
            let frame_seconds = decoded
                .pts()
                .map(|pts| utilities::pts_to_seconds(pts, time_base))
                .unwrap_or(0.0);

            scaler.run(&decoded, &mut scaled).map_err(decode_error)?;

            if frame_seconds + 1e-6 >= timestamp {
                return finish(&scaled);
            }
            newest = Some(finish(&scaled)?);
        }
    }

    // End of stream before the timestamp: flush and take the final frame.
    decoder.send_eof().map_err(decode_error)?;
    while decoder.receive_frame(&mut decoded).is_ok() {
        scaler.run(&decoded, &mut scaled).map_err(decode_error)?;
        newest = Some(finish(&scaled)?);
    }

    newest.ok_or_else(|| decode_error(format!("no frame decodable at {timestamp:.3}s")))
}
