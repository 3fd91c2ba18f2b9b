//! Benchmarks for servo unit conversion, PID updates and one tracking tick

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use face_servo_tracker::{
    app::build_tracker,
    config::Config,
    frame::BoundingBox,
    microcontroller::{PulseCommand, SerialMicroController},
    pid::{PidController, PidGains},
    servo::{translate, ServoIdAllocator, ServoObject, ServoSettings},
};
use std::time::{Duration, Instant};

fn benchmark_conversions(c: &mut Criterion) {
    let mut group = c.benchmark_group("servo");

    group.bench_function("translate", |b| {
        b.iter(|| translate(black_box(37.5), (-90.0, 90.0), (500.0, 2500.0), black_box(false)));
    });

    let mut servo = ServoObject::new(ServoIdAllocator::new().next_id(), &ServoSettings::default()).unwrap();
    let angles: Vec<f64> = (0..180).map(|i| f64::from(i) - 90.0).collect();
    group.bench_function("set_angle_sweep", |b| {
        b.iter(|| {
            for &angle in &angles {
                servo.set_angle(black_box(angle)).unwrap();
                black_box(servo.pulse_width());
            }
        });
    });

    group.bench_function("set_pulse_width", |b| {
        b.iter(|| {
            servo.set_pulse_width(black_box(1730.0)).unwrap();
            black_box(servo.value())
        });
    });

    let commands = [
        PulseCommand { channel: 0, pulse_width: 1500 },
        PulseCommand { channel: 1, pulse_width: 1720 },
    ];
    group.bench_function("encode_serial_line", |b| {
        b.iter(|| black_box(SerialMicroController::encode(black_box(&commands))));
    });

    group.finish();
}

fn benchmark_control(c: &mut Criterion) {
    let mut pid = PidController::new(PidGains::default()).unwrap();
    c.bench_function("pid_update", |b| {
        b.iter(|| black_box(pid.update_with_dt(black_box(120.0), 0.033)));
    });

    let mut tracker = build_tracker(&Config::default(), None).unwrap();
    let bbox = BoundingBox::new(200, 560, 300, 460);
    let start = Instant::now();
    let mut tick = 0u64;
    c.bench_function("tracking_tick", |b| {
        b.iter(|| {
            tick += 1;
            let now = start + Duration::from_millis(tick * 33);
            black_box(tracker.on_detection(Some(bbox), now).unwrap())
        });
    });
}

criterion_group!(benches, benchmark_conversions, benchmark_control);
criterion_main!(benches);
