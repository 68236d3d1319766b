use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use domain::translator::engine::SeqAckTranslator;

fn translator_with_rewrites(n: u32) -> SeqAckTranslator {
    let mut tr = SeqAckTranslator::new();
    let mut seq = 1_000u32;
    for i in 0..n {
        // Drive the lazy switch the way the dispatcher does: translate
        // first, then record the next rewrite.
        let _ = tr.translate_seq(seq);
        tr.record_rewrite(seq, 20, 11 * (i as i32 % 3 - 1));
        seq = seq.wrapping_add(20);
    }
    tr
}

fn bench_translate(c: &mut Criterion) {
    let mut group = c.benchmark_group("translator_translate");

    for &rewrites in &[0u32, 1, 16, 256] {
        group.bench_with_input(
            BenchmarkId::new("seq", rewrites),
            &rewrites,
            |b, &rewrites| {
                let mut tr = translator_with_rewrites(rewrites);
                let probe = 1_000u32.wrapping_add(rewrites * 20 + 5);
                b.iter(|| tr.translate_seq(black_box(probe)));
            },
        );

        group.bench_with_input(
            BenchmarkId::new("ack", rewrites),
            &rewrites,
            |b, &rewrites| {
                let mut tr = translator_with_rewrites(rewrites);
                let probe = 1_000u32.wrapping_add(rewrites * 20 + 5);
                b.iter(|| tr.translate_ack(black_box(probe)));
            },
        );
    }

    group.finish();
}

fn bench_record_rewrite(c: &mut Criterion) {
    c.bench_function("translator_record_rewrite", |b| {
        let mut tr = SeqAckTranslator::new();
        let mut seq = 0u32;
        b.iter(|| {
            tr.record_rewrite(black_box(seq), 20, 11);
            seq = seq.wrapping_add(20);
        });
    });
}

criterion_group!(benches, bench_translate, bench_record_rewrite);
criterion_main!(benches);
