use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use radius_proto::mschapv2::{
    challenge_response, generate_authenticator_response, generate_nt_response, nt_password_hash,
};
use radius_proto::{Attribute, AttributeType, Code, Packet};
use std::hint::black_box;

const AUTH_CHALLENGE: [u8; 16] = [0x5B; 16];
const PEER_CHALLENGE: [u8; 16] = [0x21; 16];

fn bench_nt_password_hash(c: &mut Criterion) {
    let mut group = c.benchmark_group("nt_password_hash");

    for len in [8usize, 32, 128].iter() {
        let password = "p".repeat(*len);
        group.bench_with_input(BenchmarkId::from_parameter(len), &password, |b, password| {
            b.iter(|| nt_password_hash(black_box(password)).expect("password fits"));
        });
    }

    group.finish();
}

fn bench_challenge_response(c: &mut Criterion) {
    let hash = nt_password_hash("clientPass").expect("password fits");
    c.bench_function("challenge_response", |b| {
        b.iter(|| challenge_response(black_box(&[0xD0; 8]), black_box(&hash)));
    });
}

fn bench_full_exchange(c: &mut Criterion) {
    c.bench_function("nt_response_and_authenticator", |b| {
        b.iter(|| {
            let nt = generate_nt_response(&AUTH_CHALLENGE, &PEER_CHALLENGE, "User", "clientPass")
                .expect("password fits");
            generate_authenticator_response("clientPass", &nt, &PEER_CHALLENGE, &AUTH_CHALLENGE, "User")
                .expect("password fits")
        });
    });
}

fn bench_packet_roundtrip(c: &mut Criterion) {
    let mut packet = Packet::new(Code::AccessRequest, 1, [0u8; 16]);
    packet.add_attribute(
        Attribute::string(AttributeType::UserName as u8, "User").expect("User-Name fits"),
    );
    for i in 0..10 {
        packet.add_attribute(
            Attribute::string(AttributeType::ReplyMessage as u8, format!("attribute_{}", i))
                .expect("Reply-Message fits"),
        );
    }
    let bytes = packet.encode().expect("packet encodes");

    c.bench_function("packet_decode_encode", |b| {
        b.iter(|| {
            Packet::decode(black_box(&bytes))
                .and_then(|p| p.encode())
                .expect("packet round-trips")
        });
    });
}

criterion_group!(
    benches,
    bench_nt_password_hash,
    bench_challenge_response,
    bench_full_exchange,
    bench_packet_roundtrip
);
criterion_main!(benches);
