//! Concurrent access to the shared frame and detection regions

use face_servo_tracker::{
    frame::{BoundingBox, Frame, FrameShape},
    shared::{SharedDetectionResult, SharedFrameBuffer, SharedRegion},
    utils::clamp_box,
};
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

fn candidate_boxes() -> Vec<BoundingBox> {
    vec![
        BoundingBox::new(0, 50, 50, 0),
        BoundingBox::new(100, 400, 300, 200),
        BoundingBox::new(380, 640, 480, 540),
        BoundingBox::new(10, 20, 30, 5),
    ]
}

#[test]
fn test_concurrent_box_writer_and_reader() {
    let shape = FrameShape::new(480, 640).unwrap();
    let slot = SharedDetectionResult::new().unwrap();
    let stop = Arc::new(AtomicBool::new(false));

    let writer = {
        let slot = slot.clone();
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let boxes = candidate_boxes();
            let mut i = 0usize;
            while !stop.load(Ordering::Relaxed) {
                // Every fifth write is an explicit "no detection"
                if i % 5 == 4 {
                    slot.write(None);
                } else {
                    slot.write(Some(boxes[i % boxes.len()]));
                }
                i += 1;
            }
        })
    };

    let edges: HashSet<[i64; 4]> = candidate_boxes().iter().map(BoundingBox::to_array).collect();
    let mut reads = 0u64;
    while reads < 200_000 {
        if let Some(bbox) = slot.read() {
            // Every field is a value some write stored, even when the tuple is torn
            for (field, value) in bbox.to_array().iter().enumerate() {
                assert!(edges.iter().any(|e| e[field] == *value));
            }
            // Torn tuples either validate into the frame or are rejected
            if let Some(clamped) = clamp_box(&bbox, shape) {
                assert!(clamped.left >= 0 && clamped.right <= 640);
                assert!(clamped.top >= 0 && clamped.bottom <= 480);
                assert!(clamped.width() > 0 && clamped.height() > 0);
            }
        }
        reads += 1;
    }

    stop.store(true, Ordering::Relaxed);
    writer.join().unwrap();
}

#[test]
fn test_frame_reader_never_blocks_on_writer() {
    let shape = FrameShape::new(48, 64).unwrap();
    let buffer = SharedFrameBuffer::new(shape).unwrap();
    let stop = Arc::new(AtomicBool::new(false));

    let writer = {
        let buffer = buffer.clone();
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let frames: Vec<Frame> = [0u8, 255]
                .iter()
                .map(|&v| Frame::from_bytes(shape, vec![v; shape.byte_len()]).unwrap())
                .collect();
            let mut i = 0usize;
            while !stop.load(Ordering::Relaxed) {
                buffer.write(&frames[i % 2]).unwrap();
                i += 1;
            }
        })
    };

    while buffer.frames_published() == 0 {
        thread::yield_now();
    }
    let mut frame = Frame::zeroed(shape);
    for _ in 0..2_000 {
        buffer.read_into(&mut frame).unwrap();
        // Torn frames mix the two captures, never anything else
        assert!(frame.as_bytes().iter().all(|&b| b == 0 || b == 255));
    }

    stop.store(true, Ordering::Relaxed);
    writer.join().unwrap();
}

#[test]
fn test_named_regions_visible_across_handles() {
    let dir = tempfile::tempdir().unwrap();
    let shape = FrameShape::new(4, 4).unwrap();

    let len = SharedFrameBuffer::region_len(shape);
    let owner = Arc::new(SharedRegion::named(dir.path(), "frames", len).unwrap());
    let viewer = Arc::new(SharedRegion::named(dir.path(), "frames", len).unwrap());
    let writer = SharedFrameBuffer::with_region(owner, shape).unwrap();
    let reader = SharedFrameBuffer::with_region(viewer, shape).unwrap();

    let mut frame = Frame::zeroed(shape);
    frame.set_pixel(3, 3, [1, 2, 3]);
    assert_eq!(reader.frames_published(), 0);
    writer.write(&frame).unwrap();
    assert_eq!(reader.read(), frame);
    // The publish count travels with the mapping
    assert_eq!(reader.frames_published(), 1);
}

#[test]
fn test_detection_slot_keeps_latest_only() {
    let slot = SharedDetectionResult::new().unwrap();
    for bbox in candidate_boxes() {
        slot.write(Some(bbox));
    }
    assert_eq!(slot.read(), candidate_boxes().last().copied());
    thread::sleep(Duration::from_millis(1));
    slot.write(None);
    assert_eq!(slot.read(), None);
}
