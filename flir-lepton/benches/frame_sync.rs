use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};

use flir_lepton::vospi::{CrcPolicy, SyncConfig, VoSpi};
use flir_lepton::FrameGeometry;
use flir_lepton_test_data::frames::{
    discard_packet, frame_stream, synthetic_frame, StreamGeometry,
};
use flir_lepton_test_data::{MockPin, MockVoSpi};

fn bench_geometry(
    c: &mut Criterion,
    name: &str,
    geometry: FrameGeometry,
    stream_geometry: StreamGeometry,
) {
    let frame = synthetic_frame(geometry.stream_len(), 0x5A);
    let mut stream = discard_packet(geometry.packet_payload_len);
    stream.extend(frame_stream(&stream_geometry, &frame));

    let mut group = c.benchmark_group(name);
    group.throughput(Throughput::Bytes(stream.len() as u64));
    for crc in [CrcPolicy::Ignore, CrcPolicy::Validate] {
        let spi = MockVoSpi::new();
        let config = SyncConfig {
            crc,
            ..SyncConfig::default()
        };
        let mut vospi = VoSpi::with_config(spi.clone(), MockPin::new(true), geometry, config);
        let mut buffer = vec![0u8; geometry.stream_len()];
        group.bench_function(format!("{:?} CRC", crc), |b| {
            b.iter_batched(
                || {
                    spi.clear();
                    spi.push_bytes(&stream);
                },
                |_| {
                    // The leading discard packet means the first read finds no frame.
                    vospi.read_frame(0, &mut buffer).unwrap();
                    vospi.read_frame(0, &mut buffer).unwrap()
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

pub fn criterion_benchmark(c: &mut Criterion) {
    bench_geometry(
        c,
        "Lepton 3 RAW14 frame",
        FrameGeometry::LEPTON_3_RAW14,
        StreamGeometry::LEPTON_3_RAW14,
    );
    bench_geometry(
        c,
        "Lepton 3 RGB888 frame",
        FrameGeometry::LEPTON_3_RGB888,
        StreamGeometry::LEPTON_3_RGB888,
    );
    bench_geometry(
        c,
        "Lepton 2 RAW14 frame",
        FrameGeometry::LEPTON_2_RAW14,
        StreamGeometry::LEPTON_2_RAW14,
    );
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
