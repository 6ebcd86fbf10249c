//! Frame codec throughput: encoding, clean decoding and decoding through noise

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use drone_link::core::{FramingConfig, Waypoint};
use drone_link::protocol::checksum::fletcher16;
use drone_link::protocol::payload::waypoint_message;
use drone_link::protocol::{FrameCodec, WaypointSubtype};

fn sample_stream(codec: &FrameCodec, frames: usize) -> Vec<u8> {
    let mut stream = Vec::new();
    for i in 0..frames {
        let wp = Waypoint::new((i % 64) as u8, 47.0 + i as f32 * 0.001, 8.0, 100);
        let message = waypoint_message(WaypointSubtype::Add, &wp).unwrap();
        stream.extend_from_slice(&codec.frame(&message));
    }
    stream
}

fn bench_checksum(c: &mut Criterion) {
    let data: Vec<u8> = (0..16u8).collect();
    c.bench_function("fletcher16_16_bytes", |b| b.iter(|| fletcher16(black_box(&data))));
}

fn bench_encode(c: &mut Criterion) {
    let codec = FrameCodec::new(&FramingConfig::default()).unwrap();
    let message =
        waypoint_message(WaypointSubtype::Add, &Waypoint::new(1, 47.0, 8.0, 100)).unwrap();
    c.bench_function("encode_waypoint_frame", |b| {
        b.iter(|| black_box(codec.frame(black_box(&message))))
    });
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    for frames in [1usize, 16, 256] {
        let codec = FrameCodec::new(&FramingConfig::default()).unwrap();
        let clean = sample_stream(&codec, frames);

        // Every tenth byte flipped, so most frames fail and are resynchronized
        let mut noisy = clean.clone();
        for byte in noisy.iter_mut().step_by(10) {
            *byte ^= 0x5A;
        }

        group.throughput(Throughput::Bytes(clean.len() as u64));
        group.bench_with_input(BenchmarkId::new("clean", frames), &clean, |b, stream| {
            b.iter(|| {
                let mut codec = FrameCodec::new(&FramingConfig::default()).unwrap();
                black_box(codec.decode_all(stream))
            })
        });
        group.bench_with_input(BenchmarkId::new("noisy", frames), &noisy, |b, stream| {
            b.iter(|| {
                let mut codec = FrameCodec::new(&FramingConfig::default()).unwrap();
                black_box(codec.decode_all(stream))
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_checksum, bench_encode, bench_decode);
criterion_main!(benches);
