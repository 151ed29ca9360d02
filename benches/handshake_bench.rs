//! obfs3 benchmarks.
//!
//! The UniformDH modular exponentiations dominate connection setup; the
//! AES-CTR path dominates steady-state throughput.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use obfs3::crypto::{derive_cipher, StreamCipher, UniformDh};
use obfs3::protocol::{BufferedCircuit, ReceiveBuffer};
use obfs3::{Obfs3, Role};

fn bench_uniform_dh_keygen(c: &mut Criterion) {
    c.bench_function("uniform_dh_keygen", |b| b.iter(|| black_box(UniformDh::new())));
}

fn bench_uniform_dh_shared_secret(c: &mut Criterion) {
    let alice = UniformDh::new();
    let bob = UniformDh::new();

    c.bench_function("uniform_dh_shared_secret", |b| {
        b.iter(|| black_box(alice.shared_secret(bob.public_key()).unwrap()))
    });
}

fn bench_aes_ctr(c: &mut Criterion) {
    let mut cipher = StreamCipher::new(&[0x42u8; 16], &[0x24u8; 16]);
    let mut buf = vec![0u8; 16 * 1024];

    let mut group = c.benchmark_group("aes128_ctr");
    group.throughput(Throughput::Bytes(buf.len() as u64));

    group.bench_function("16k_in_place", |b| {
        b.iter(|| {
            cipher.crypt_in_place(&mut buf);
            black_box(&buf);
        })
    });

    group.finish();
}

fn bench_derive_cipher(c: &mut Criterion) {
    let alice = UniformDh::new();
    let bob = UniformDh::new();
    let shared = alice.shared_secret(bob.public_key()).unwrap();

    c.bench_function("derive_cipher", |b| {
        b.iter(|| black_box(derive_cipher(&shared, b"Initiator obfuscated data")))
    });
}

fn bench_full_handshake(c: &mut Criterion) {
    c.bench_function("full_handshake_in_memory", |b| {
        b.iter(|| {
            let mut client = Obfs3::new(Role::Initiator);
            let mut server = Obfs3::new(Role::Responder);
            let mut client_out = BufferedCircuit::new();
            let mut server_out = BufferedCircuit::new();
            let mut client_in = ReceiveBuffer::new();
            let mut server_in = ReceiveBuffer::new();

            client.circuit_connected(&mut client_out).unwrap();
            server.circuit_connected(&mut server_out).unwrap();

            for _ in 0..2 {
                server_in.extend(&client_out.take_downstream());
                server.received_downstream(&mut server_in, &mut server_out).unwrap();
                client_in.extend(&server_out.take_downstream());
                client.received_downstream(&mut client_in, &mut client_out).unwrap();
            }

            black_box((client.state(), server.state()))
        })
    });
}

criterion_group!(
    benches,
    bench_uniform_dh_keygen,
    bench_uniform_dh_shared_secret,
    bench_aes_ctr,
    bench_derive_cipher,
    bench_full_handshake,
);

criterion_main!(benches);
