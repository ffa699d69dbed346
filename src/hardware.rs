//! Hardware-accelerated decoding support.
//!
//! Enabled by the `hardware` feature. The demux-decode strategy prefers a
//! hardware decoder: the first hardware device the FFmpeg build can create
//! is attached to the codec context before it is opened, and decoded frames
//! living in device memory are transferred back to system memory before
//! rendering. Every failure along this path falls back to plain software
//! decoding silently - hardware is an optimization, never a requirement.

use ffmpeg_next::{
    Error as FfmpegError, codec::context::Context as CodecContext, decoder::Video as VideoDecoder,
    frame::Video as VideoFrame,
};
use ffmpeg_sys_next::{
    AVBufferRef, AVHWDeviceType, av_buffer_ref, av_buffer_unref, av_hwdevice_ctx_create,
    av_hwdevice_get_type_name, av_hwdevice_iterate_types, av_hwframe_transfer_data,
};

/// Open a video decoder, attaching a hardware device context when one is
/// available.
pub(crate) fn open_decoder(mut context: CodecContext) -> Result<VideoDecoder, FfmpegError> {
    unsafe {
        let mut device_type = AVHWDeviceType::AV_HWDEVICE_TYPE_NONE;

        loop {
            device_type = av_hwdevice_iterate_types(device_type);
            if device_type == AVHWDeviceType::AV_HWDEVICE_TYPE_NONE {
                break;
            }

            let mut device: *mut AVBufferRef = std::ptr::null_mut();
            let created = av_hwdevice_ctx_create(
                &mut device,
                device_type,
                std::ptr::null(),
                std::ptr::null_mut(),
                0,
            );
            if created < 0 {
                continue;
            }

            (*context.as_mut_ptr()).hw_device_ctx = av_buffer_ref(device);
            av_buffer_unref(&mut device);

            let name = av_hwdevice_get_type_name(device_type);
            if !name.is_null() {
                log::debug!(
                    "hardware decode device attached: {}",
                    std::ffi::CStr::from_ptr(name).to_string_lossy()
                );
            }
            break;
        }
    }

    context.decoder().video()
}

/// Transfer a decoded frame out of device memory, if it lives there.
///
/// Returns `Ok(None)` for frames already in system memory.
pub(crate) fn transfer_to_system_memory(
    frame: &VideoFrame,
) -> Result<Option<VideoFrame>, FfmpegError> {
    unsafe {
        if (*frame.as_ptr()).hw_frames_ctx.is_null() {
            return Ok(None);
        }

        let mut transferred = VideoFrame::empty();
        let status = av_hwframe_transfer_data(transferred.as_mut_ptr(), frame.as_ptr(), 0);
        if status < 0 {
            return Err(FfmpegError::from(status));
        }

        transferred.set_pts(frame.pts());
        Ok(Some(transferred))
    }
}
