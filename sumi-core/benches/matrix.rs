//! Matrix and rectangle-merger benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use sumi_core::{Matrix, Point, Rect, RectangleMerger, Style};

fn bench_matrix_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("matrix");

    // A full screen of writes followed by one commit
    group.throughput(Throughput::Elements(80 * 40));
    group.bench_function("fill_and_commit", |b| {
        b.iter(|| {
            let mut m = Matrix::new(40, 80);
            for _ in 0..(80 * 40) {
                m.write(u32::from('x'), Style::default(), false);
            }
            let mut updates = Vec::new();
            m.commit(&mut updates);
            black_box(updates)
        })
    });

    // Commits where nothing changed must stay cheap
    group.bench_function("idle_commit", |b| {
        let mut m = Matrix::new(40, 80);
        let mut updates = Vec::new();
        m.commit(&mut updates);
        b.iter(|| {
            updates.clear();
            m.commit(&mut updates);
            black_box(updates.len())
        })
    });

    group.finish();
}

fn bench_merger(c: &mut Criterion) {
    let mut group = c.benchmark_group("merger");

    // Per-cell rectangles of a line of text, as the renderer inserts them
    group.bench_function("insert_text_line", |b| {
        b.iter(|| {
            let mut merger = RectangleMerger::new();
            for i in 0..80 {
                merger.insert(Rect::sized(i * 8, 0, 8, 16));
            }
            merger.merge();
            black_box(merger.iter().count())
        })
    });

    // Scattered rectangles that mostly cannot be merged
    group.bench_function("insert_scattered", |b| {
        b.iter(|| {
            let mut merger = RectangleMerger::new();
            for i in 0..64i32 {
                let x = (i * 53) % 1024;
                let y = (i * 97) % 768;
                merger.insert(Rect::sized(x, y, 8, 16));
            }
            merger.merge();
            black_box(merger.iter().count())
        })
    });

    group.finish();
}

fn bench_scroll(c: &mut Criterion) {
    let mut group = c.benchmark_group("matrix");

    group.bench_function("scroll_full_screen", |b| {
        let mut m = Matrix::new(40, 80);
        let bounds = Rect::new(1, 1, 81, 41);
        for y in 1..=40 {
            for x in 1..=80 {
                m.set(u32::from('y'), Style::default(), Point::new(x, y));
            }
        }
        b.iter(|| {
            m.scroll(0, Style::default(), bounds, 1, 0);
        })
    });

    group.finish();
}

criterion_group!(benches, bench_matrix_commit, bench_merger, bench_scroll);
criterion_main!(benches);
