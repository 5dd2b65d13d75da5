//! Benchmarks for frame encoding and decoding.
//!
//! ```bash
//! cargo bench -p master-protocol
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use master_protocol::{Frame, FrameCodec, FrameFormat, CORE_MEMORY_READ};

fn bench_core_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("core_encode");
    let codec = FrameCodec::new(FrameFormat::core());

    for len in [4usize, 36, 260].iter() {
        group.throughput(Throughput::Bytes(*len as u64));
        let frame = Frame::new(3, CORE_MEMORY_READ, vec![0xA5; *len]);
        group.bench_with_input(BenchmarkId::new("reply", len), &frame, |b, frame| {
            b.iter(|| black_box(codec.encode_reply(frame)))
        });
    }
    group.finish();
}

fn bench_core_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("core_decode");
    let encoder = FrameCodec::new(FrameFormat::core());

    for len in [4usize, 36, 260].iter() {
        group.throughput(Throughput::Bytes(*len as u64));
        let bytes = encoder
            .encode_reply(&Frame::new(3, CORE_MEMORY_READ, vec![0xA5; *len]))
            .expect("encode");
        group.bench_with_input(BenchmarkId::new("reply", len), &bytes, |b, bytes| {
            let mut codec = FrameCodec::new(FrameFormat::core());
            b.iter(|| {
                codec.push(b"\x00noise");
                codec.push(bytes);
                black_box(codec.decode_reply(None))
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_core_encode, bench_core_decode);
criterion_main!(benches);
