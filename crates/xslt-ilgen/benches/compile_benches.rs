use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use xslt_ilgen::{CompilerOptions, compile};
use xslt_ir::{IrGraph, NodeType, QName, XmlType};

/// `<out>` with one `<item>` per `child::item[position() < n]` plus a
/// folded arithmetic attribute, repeated `width` times.
fn sample_query(width: usize) -> IrGraph {
    let mut g = IrGraph::new();
    let mut parts = Vec::with_capacity(width);
    for n in 0..width {
        let ctx = g.xml_context();
        let content = g.content_of(ctx);
        let j = g.for_(content);
        let is_element = g.is_type(j, XmlType::ELEMENT);
        let name = g.unary(NodeType::NameOf, j);
        let item = g.qname(QName::local("item"));
        let named = g.binary(NodeType::Eq, name, item);
        let both = g.binary(NodeType::And, is_element, named);
        let items = g.filter(j, both);
        let k = g.for_(items);
        let position = g.position_of(k);
        let limit = g.int32(i32::try_from(n % 7).unwrap_or(0) + 2);
        let bounded = g.binary(NodeType::Lt, position, limit);
        let first = g.filter(k, bounded);

        let i = g.for_(first);
        let (a, b) = (g.int32(6), g.int32(7));
        let product = g.binary(NodeType::Multiply, a, b);
        let value = g.convert(product, XmlType::STRING);
        let attr = g.attribute_ctor(QName::local("answer"), value);
        let copy = g.make(NodeType::XsltCopyOf, &[i]);
        let body = g.sequence(&[attr, copy]);
        let element = g.element(QName::local("item"), body);
        parts.push(g.loop_(i, element));
    }
    let content = g.sequence(&parts);
    let root = g.element(QName::local("out"), content);
    g.qil_expression(&[], &[], &[], root);
    g
}

fn benchmark_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    for width in [1usize, 16, 128] {
        let graph = sample_query(width);
        group.bench_with_input(BenchmarkId::from_parameter(width), &graph, |b, graph| {
            b.iter(|| {
                let compiled = compile(black_box(graph.clone()), &CompilerOptions::default()).expect("compile failure");
                black_box(compiled);
            });
        });
    }
    group.finish();
}

fn benchmark_annotations_only(c: &mut Criterion) {
    let graph = sample_query(32);
    let options = CompilerOptions::default().with_speculative(false);
    c.bench_function("compile/annotations_only", |b| {
        b.iter(|| {
            let compiled = compile(black_box(graph.clone()), &options).expect("compile failure");
            black_box(compiled);
        });
    });
}

criterion_group!(benches, benchmark_compile, benchmark_annotations_only);
criterion_main!(benches);
