//! Chunker throughput on prose and markdown-like input.
//!
//! Run with: `cargo bench --bench chunker`

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use docindex::services::{ChunkerLimits, TextChunker};

fn sample_text(paragraphs: usize) -> String {
    let sentences = [
        "Ownership rules decide which value is dropped and when.",
        "Borrowing lets a function read data without taking it over!",
        "Lifetimes describe how long a reference stays valid; the compiler checks them.",
        "Traits group behaviour, and generics use them as bounds.",
        "Is an iterator lazy? Yes, until something consumes it.",
    ];
    (0..paragraphs)
        .map(|p| {
            (0..4)
                .map(|s| sentences[(p + s) % sentences.len()])
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn bench_chunk_sizes(c: &mut Criterion) {
    let chunker = TextChunker::new(ChunkerLimits::default());
    let text = sample_text(200);

    let mut group = c.benchmark_group("chunk_size");
    group.throughput(Throughput::Bytes(text.len() as u64));
    for size in [128usize, 256, 512, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| chunker.chunk(black_box(&text), size, size / 4, usize::MAX));
        });
    }
    group.finish();
}

fn bench_without_break_points(c: &mut Criterion) {
    let chunker = TextChunker::new(ChunkerLimits::default());
    let text = "x".repeat(100_000);

    c.bench_function("no_delimiters_100k", |b| {
        b.iter(|| chunker.chunk(black_box(&text), 256, 64, usize::MAX));
    });
}

fn bench_multibyte(c: &mut Criterion) {
    let chunker = TextChunker::new(ChunkerLimits::default());
    let text = "소유권 규칙은 값이 언제 해제되는지 결정합니다. ".repeat(2_000);

    c.bench_function("multibyte_hangul", |b| {
        b.iter(|| chunker.chunk(black_box(&text), 128, 32, 50));
    });
}

criterion_group!(
    benches,
    bench_chunk_sizes,
    bench_without_break_points,
    bench_multibyte
);
criterion_main!(benches);
