use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use prosetree_engine::html::parse_document;
use prosetree_engine::position::{self, Position};

fn build_document(paragraphs: usize) -> prosetree_engine::Document {
    let mut html = String::new();
    for i in 0..paragraphs {
        html.push_str(&format!(
            "<p>paragraph {i} with <b>some bold</b> and <i>italic</i> content</p>"
        ));
    }
    parse_document(&html).unwrap()
}

fn bench_position_stepping(c: &mut Criterion) {
    let doc = build_document(50);
    c.bench_function("position_walk_document", |b| {
        b.iter(|| {
            let mut pos = Some(Position::new(doc.body(), 0));
            let mut count = 0u64;
            while let Some(p) = pos {
                count += 1;
                pos = position::next(&doc, p);
            }
            black_box(count)
        })
    });
}

fn bench_ok_for_movement(c: &mut Criterion) {
    let doc = build_document(50);
    let positions: Vec<Position> = {
        let mut result = Vec::new();
        let mut pos = Some(Position::new(doc.body(), 0));
        while let Some(p) = pos {
            result.push(p);
            pos = position::next(&doc, p);
        }
        result
    };
    c.bench_function("ok_for_movement_all_positions", |b| {
        b.iter(|| {
            let mut valid = 0u64;
            for p in &positions {
                if position::ok_for_movement(&doc, *p, false) {
                    valid += 1;
                }
            }
            black_box(valid)
        })
    });
}

criterion_group!(benches, bench_position_stepping, bench_ok_for_movement);
criterion_main!(benches);
