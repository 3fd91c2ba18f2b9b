//! Benchmarks for the shared frame buffer, detection slot and detector step

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use face_servo_tracker::{
    detector::{DetectorProcess, DetectorSettings},
    devices::Camera,
    frame::{BoundingBox, Frame, FrameShape},
    lifecycle::CancellationToken,
    shared::{SharedDetectionResult, SharedDetectorRate, SharedFrameBuffer},
    sim::{BrightRegionDetector, SyntheticCamera},
    utils::clamp_box,
};

fn shapes() -> Vec<(&'static str, FrameShape)> {
    vec![
        ("320x240", FrameShape::new(240, 320).unwrap()),
        ("640x480", FrameShape::new(480, 640).unwrap()),
    ]
}

fn benchmark_frame_buffer(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_buffer");

    for (name, shape) in shapes() {
        let buffer = SharedFrameBuffer::new(shape).unwrap();
        let frame = SyntheticCamera::new(shape).read().unwrap();
        let mut scratch = Frame::zeroed(shape);

        group.bench_with_input(BenchmarkId::new("publish", name), &frame, |b, frame| {
            b.iter(|| buffer.write(black_box(frame)).unwrap());
        });

        group.bench_function(BenchmarkId::new("read_into", name), |b| {
            b.iter(|| {
                buffer.read_into(&mut scratch).unwrap();
                black_box(&scratch);
            });
        });
    }

    group.finish();
}

fn benchmark_detection_slot(c: &mut Criterion) {
    let slot = SharedDetectionResult::new().unwrap();
    let shape = FrameShape::new(480, 640).unwrap();
    let bbox = BoundingBox::new(100, 400, 300, 200);

    c.bench_function("detection_write", |b| {
        b.iter(|| slot.write(black_box(Some(bbox))));
    });

    slot.write(Some(bbox));
    c.bench_function("detection_read_validated", |b| {
        b.iter(|| black_box(slot.read().and_then(|bbox| clamp_box(&bbox, shape))));
    });
}

fn benchmark_detector_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("detector_step");
    group.sample_size(30);

    for factor in [1usize, 2, 4] {
        let shape = FrameShape::new(480, 640).unwrap();
        let frames = SharedFrameBuffer::new(shape).unwrap();
        frames.write(&SyntheticCamera::new(shape).read().unwrap()).unwrap();
        let settings = DetectorSettings {
            downsample_factor: factor,
            ..DetectorSettings::default()
        };
        let mut process = DetectorProcess::new(
            settings,
            frames,
            SharedDetectionResult::new().unwrap(),
            SharedDetectorRate::new(),
            CancellationToken::new(),
        )
        .unwrap();
        let mut detector = BrightRegionDetector::default();

        group.bench_function(BenchmarkId::new("downsample", factor), |b| {
            b.iter(|| black_box(process.step(&mut detector).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_frame_buffer,
    benchmark_detection_slot,
    benchmark_detector_step
);
criterion_main!(benches);
