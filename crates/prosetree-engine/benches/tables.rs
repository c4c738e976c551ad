use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use prosetree_engine::dom::Tag;
use prosetree_engine::html::parse_document;
use prosetree_engine::tables::analyse_structure;

fn table_html(rows: usize, cols: usize) -> String {
    let mut html = String::from("<table><tbody>");
    for r in 0..rows {
        html.push_str("<tr>");
        for c in 0..cols {
            if r % 5 == 0 && c % 4 == 0 {
                html.push_str(&format!("<td rowspan=\"2\" colspan=\"2\">r{r}c{c}</td>"));
            } else {
                html.push_str(&format!("<td>r{r}c{c}</td>"));
            }
        }
        html.push_str("</tr>");
    }
    html.push_str("</tbody></table>");
    html
}

fn bench_analyse_structure(c: &mut Criterion) {
    c.bench_function("analyse_structure_20x10", |b| {
        b.iter_batched(
            || {
                let doc = parse_document(&table_html(20, 10)).unwrap();
                let table = doc.find_first(&Tag::Table).unwrap();
                (doc, table)
            },
            |(mut doc, table)| {
                let structure = analyse_structure(&mut doc, table);
                black_box(structure.num_rows)
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_analyse_structure);
criterion_main!(benches);
