use criterion::{criterion_group, criterion_main, Criterion};
use yamlflow::{Document, Emitter, Parser, Ypath};

/// Build a reasonably large nested document without shipping a fixture.
fn large_yaml() -> String {
    let mut out = String::with_capacity(1 << 20);
    out.push_str("records:\n");
    for i in 0..2000 {
        out.push_str(&format!(
            "  - id: {i}\n    name: record-{i}\n    tags: [a, b, c]\n    attrs:\n      height: {h}\n      note: \"row {i}\"\n",
            h = i % 97,
        ));
    }
    out
}

pub fn parser(c: &mut Criterion) {
    let input = large_yaml();

    c.bench_function("parse large", |b| {
        b.iter(|| {
            let mut bytes = input.as_bytes();
            let mut parser = Parser::new();
            parser.set_input_string(&mut bytes);
            Document::load(&mut parser)
        })
    });

    c.bench_function("emit large", |b| {
        let mut buffer = Vec::with_capacity(input.len());

        let doc = {
            let mut parser = Parser::new();
            let mut bytes = input.as_bytes();
            parser.set_input_string(&mut bytes);
            Document::load(&mut parser).unwrap()
        };

        b.iter_custom(|iters| {
            let mut measurement = std::time::Duration::ZERO;
            for _ in 0..iters {
                buffer.clear();
                let start_time = std::time::Instant::now();
                let mut emitter = Emitter::new();
                emitter.set_output(&mut buffer);
                doc.dump(&mut emitter).unwrap();
                emitter.close().unwrap();
                measurement += start_time.elapsed();
            }
            measurement
        });
    });

    c.bench_function("ypath large", |b| {
        let doc = {
            let mut parser = Parser::new();
            let mut bytes = input.as_bytes();
            parser.set_input_string(&mut bytes);
            Document::load(&mut parser).unwrap()
        };
        let path = Ypath::compile("/records/*/name").unwrap();

        b.iter(|| path.query(&doc).unwrap().len())
    });
}

criterion_group!(benches, parser);
criterion_main!(benches);
