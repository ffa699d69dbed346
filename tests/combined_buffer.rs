//! Combined-buffer layout and truncation tests.

use gifpress::{CombinedBuffer, GifpressError};

#[test]
fn allocates_full_planned_size() {
    let buffer = CombinedBuffer::allocate(10, 4, 3).unwrap();
    assert_eq!(buffer.frame_bytes(), 10 * 4 * 4);
    assert_eq!(buffer.planned_frames(), 3);
    assert_eq!(buffer.filled_frames(), 0);
    assert!(buffer.as_bytes().is_empty());
}

#[test]
fn frame_slices_land_at_expected_offsets() {
    let mut buffer = CombinedBuffer::allocate(2, 2, 3).unwrap();

    buffer.frame_slice_mut(1).fill(0xAB);
    buffer.set_filled(3);

    let bytes = buffer.as_bytes();
    let frame_bytes = buffer.frame_bytes();
    assert!(bytes[..frame_bytes].iter().all(|&b| b == 0));
    assert!(bytes[frame_bytes..2 * frame_bytes].iter().all(|&b| b == 0xAB));
    assert!(bytes[2 * frame_bytes..].iter().all(|&b| b == 0));
}

#[test]
fn truncation_is_logical_only() {
    let mut buffer = CombinedBuffer::allocate(4, 4, 10).unwrap();
    buffer.frame_slice_mut(9).fill(0xFF);

    buffer.set_filled(2);
    assert_eq!(buffer.filled_frames(), 2);
    assert_eq!(buffer.as_bytes().len(), 2 * buffer.frame_bytes());

    // The tail is still addressable; extending the fill exposes it again.
    buffer.set_filled(10);
    assert_eq!(buffer.frame(9)[0], 0xFF);
}

#[test]
fn set_filled_clamps_to_planned_count() {
    let mut buffer = CombinedBuffer::allocate(4, 4, 5).unwrap();
    buffer.set_filled(100);
    assert_eq!(buffer.filled_frames(), 5);
}

#[test]
fn absurd_allocation_reports_resource_exhaustion() {
    let result = CombinedBuffer::allocate(u32::MAX, u32::MAX, usize::MAX);
    assert!(matches!(
        result,
        Err(GifpressError::ResourceExhausted { .. })
    ));
}
