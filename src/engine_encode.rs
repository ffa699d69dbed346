//! Engine-backed GIF encoding.
//!
//! The second encoder back end: the entire combined buffer is written to
//! the external engine as one rawvideo file (pixel format, frame size, and
//! frame rate declared up front), then a single command applies the
//! two-stage palette filter graph - generate an optimal palette capped at
//! the requested color count, then map every pixel through it with the
//! requested dithering algorithm - and the finished GIF is read back.

use crate::{
    buffer::CombinedBuffer,
    engine::TranscodeEngine,
    error::GifpressError,
    options::Dither,
    plan::TimePlan,
    progress::CancellationToken,
};

const RAW_INPUT_NAME: &str = "combined.raw";
const OUTPUT_NAME: &str = "output.gif";

/// Encode the filled portion of `buffer` through the external engine.
///
/// The declared frame rate is `filled_frames / plan duration`, so a run
/// that stopped early still plays back at the intended speed. Engine
/// progress events are forwarded as percentages clamped to `0..=100`; raw
/// fractions outside `0..=1` are forwarded as indeterminate.
pub(crate) fn encode_with_engine(
    engine: &dyn TranscodeEngine,
    buffer: &CombinedBuffer,
    plan: &TimePlan,
    max_colors: u16,
    dither: Dither,
    token: &CancellationToken,
    on_progress: &mut dyn FnMut(Option<f32>),
) -> Result<Vec<u8>, GifpressError> {
    let frame_count = buffer.filled_frames();
    if frame_count == 0 {
        return Err(GifpressError::GifEncode("no frames to encode".to_string()));
    }

    let framerate = if plan.duration > 0.0 {
        frame_count as f64 / plan.duration
    } else {
        1.0
    };

    // Buffer submission has no meaningful ratio; report indeterminate.
    on_progress(None);
    engine.write_file(RAW_INPUT_NAME, buffer.as_bytes())?;

    let filter = format!(
        "split[a][b];[a]palettegen=max_colors={max_colors}[pal];[b][pal]paletteuse=dither={}",
        dither.filter_value()
    );

    let args: Vec<String> = [
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgba",
        "-s",
        &format!("{}x{}", buffer.width(), buffer.height()),
        "-framerate",
        &format!("{framerate:.6}"),
        "-i",
        RAW_INPUT_NAME,
        "-vf",
        &filter,
        "-y",
        OUTPUT_NAME,
    ]
    .into_iter()
    .map(str::to_string)
    .collect();

    let exec_result = engine.exec(args.as_slice(), token, &mut |event| {
        let percent = if (0.0..=1.0).contains(&event.fraction_complete) {
            Some((event.fraction_complete * 100.0) as f32)
        } else {
            None
        };
        on_progress(percent);
    });

    if let Err(error) = exec_result {
        let _ = engine.delete_file(RAW_INPUT_NAME);
        let _ = engine.delete_file(OUTPUT_NAME);
        return Err(error);
    }

    let bytes = engine.read_file(OUTPUT_NAME)?;
    let _ = engine.delete_file(RAW_INPUT_NAME);
    let _ = engine.delete_file(OUTPUT_NAME);

    if bytes.is_empty() {
        return Err(GifpressError::GifEncode(
            "engine produced an empty output file".to_string(),
        ));
    }

    Ok(bytes)
}
