//! FrameCodec benchmarks.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use shardline_protocol::{Envelope, FrameCodec};
use std::io::Write;

fn compressed_frame(payload_len: usize) -> (String, Vec<u8>) {
    let frame = format!(
        r#"{{"op":0,"s":1,"t":"MESSAGE_CREATE","d":{{"content":"{}"}}}}"#,
        "a".repeat(payload_len)
    );
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(frame.as_bytes()).unwrap();
    encoder.flush().unwrap();
    (frame, encoder.get_ref().clone())
}

fn bench_inflate(c: &mut Criterion) {
    let (frame, compressed) = compressed_frame(1024);

    let mut group = c.benchmark_group("inflate");
    group.throughput(Throughput::Bytes(frame.len() as u64));
    group.bench_function("frame_1KiB", |b| {
        b.iter(|| {
            let mut codec = FrameCodec::new();
            codec.push(black_box(&compressed)).unwrap()
        })
    });
    group.finish();
}

fn bench_inflate_and_parse(c: &mut Criterion) {
    let (_, compressed) = compressed_frame(256);

    c.bench_function("inflate_parse_256B", |b| {
        b.iter(|| {
            let mut codec = FrameCodec::new();
            let text = codec.push(black_box(&compressed)).unwrap().unwrap();
            Envelope::from_json(black_box(&text)).unwrap()
        })
    });
}

criterion_group!(benches, bench_inflate, bench_inflate_and_parse);
criterion_main!(benches);
