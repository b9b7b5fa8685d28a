use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use rtbridge_core::wire::{
    DataIndicationHeader, DataRequestHeader, Destination, ItsAid, PacketTransport, PacketType,
    SecurityProfile,
};

fn sample_request() -> DataRequestHeader {
    DataRequestHeader {
        packet_type: PacketType::BtpB,
        transport: PacketTransport::GeoBroadcast,
        destination_port: 2002,
        destination: Destination::rectangle(485_000_000, 92_500_000, 100, 50, 90),
        security_profile: SecurityProfile::Enabled,
        its_aid: ItsAid::Denm,
        data_length: 120,
        ..Default::default()
    }
}

fn bench_request(c: &mut Criterion) {
    let header = sample_request();
    let bytes = header.serialize();

    c.bench_function("request_serialize", |b| {
        b.iter(|| black_box(&header).serialize())
    });
    c.bench_function("request_deserialize", |b| {
        b.iter(|| DataRequestHeader::deserialize(black_box(&bytes)))
    });
}

fn bench_indication(c: &mut Criterion) {
    let bytes = DataIndicationHeader {
        its_aid: ItsAid::Cam,
        cert_id: [0xA5; 8],
        ..Default::default()
    }
    .serialize();

    c.bench_function("indication_deserialize", |b| {
        b.iter(|| DataIndicationHeader::deserialize(black_box(&bytes)))
    });
}

criterion_group!(benches, bench_request, bench_indication);
criterion_main!(benches);
