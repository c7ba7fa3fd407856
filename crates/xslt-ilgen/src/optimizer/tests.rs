use super::*;
use crate::patterns::{ELEMENT_QNAME, MAX_POSITION, STEP_NODE};
use rstest::rstest;
use xslt_ir::QName;

fn run(graph: &mut IrGraph, root: NodeId, speculative: bool) -> (NodeId, Annotations) {
    let mut ann = Annotations::new();
    let mut opt = Optimizer::new(graph, &mut ann, speculative);
    let result = opt.visit(root);
    (result, ann)
}

#[rstest]
fn folds_nested_arithmetic() {
    let mut g = IrGraph::new();
    let (a, b, c) = (g.int32(2), g.int32(3), g.int32(4));
    let sum = g.binary(NodeType::Add, a, b);
    let product = g.binary(NodeType::Multiply, sum, c);
    let (result, _) = run(&mut g, product, true);
    assert_eq!(g.literal(result), Some(&Literal::Int32(20)));
}

#[rstest]
fn overflow_is_left_to_the_runtime() {
    let mut g = IrGraph::new();
    let (a, b) = (g.int32(i32::MAX), g.int32(1));
    let sum = g.binary(NodeType::Add, a, b);
    let (result, _) = run(&mut g, sum, true);
    assert_eq!(g.node_type(result), NodeType::Add);
}

#[rstest]
#[case(NodeType::And, true, true)]
#[case(NodeType::And, false, false)]
#[case(NodeType::Or, true, false)]
#[case(NodeType::Or, false, true)]
fn boolean_literal_on_the_left(#[case] op: NodeType, #[case] left: bool, #[case] keeps_right: bool) {
    let mut g = IrGraph::new();
    let l = g.boolean(left);
    let ctx = g.xml_context();
    let content = g.content_of(ctx);
    let right = g.unary(NodeType::IsEmpty, content);
    let node = g.binary(op, l, right);
    let (result, _) = run(&mut g, node, true);
    if keeps_right {
        assert_eq!(g.node_type(result), NodeType::IsEmpty);
    } else {
        assert!(g.node_type(result).is_literal());
    }
}

#[rstest]
fn double_negation_disappears() {
    let mut g = IrGraph::new();
    let ctx = g.xml_context();
    let content = g.content_of(ctx);
    let test = g.unary(NodeType::IsEmpty, content);
    let not = g.unary(NodeType::Not, test);
    let not_not = g.unary(NodeType::Not, not);
    let (result, _) = run(&mut g, not_not, true);
    assert_eq!(result, test);
}

#[rstest]
fn literal_let_is_substituted_and_removed() {
    let mut g = IrGraph::new();
    let one = g.int32(1);
    let bound = g.let_(one);
    let other = g.int32(1);
    let body = g.binary(NodeType::Add, bound, other);
    let node = g.loop_(bound, body);
    let (result, _) = run(&mut g, node, true);
    assert_eq!(g.literal(result), Some(&Literal::Int32(2)));
}

#[rstest]
fn never_returning_operand_becomes_nop() {
    let mut g = IrGraph::new();
    let msg = g.string("boom");
    let err = g.error(msg);
    let one = g.int32(1);
    let sum = g.binary(NodeType::Add, err, one);
    let (result, _) = run(&mut g, sum, true);
    assert_eq!(g.node_type(result), NodeType::Nop);
    assert_eq!(g.child(result, 0), err);
    assert!(g.xml_type(result).is_none());
}

#[rstest]
fn annotations_only_when_not_speculative() {
    let mut g = IrGraph::new();
    let (a, b) = (g.int32(2), g.int32(3));
    let sum = g.binary(NodeType::Add, a, b);
    let ctx = g.xml_context();
    let content = g.content_of(ctx);
    let seq = g.sequence(&[sum, content]);
    let (result, ann) = run(&mut g, seq, false);
    assert_eq!(result, seq);
    assert_eq!(g.node_type(g.child(seq, 0)), NodeType::Add);
    assert!(ann.matches(&g, content, Pattern::Axis));
}

#[rstest]
fn count_of_union_with_single_node_is_rewritten() {
    let mut g = IrGraph::new();
    let single = g.xml_context();
    let ctx = g.xml_context();
    let others = g.content_of(ctx);
    let union = g.binary(NodeType::Union, single, others);
    let count = g.unary(NodeType::Length, union);
    let one = g.int32(1);
    let eq = g.binary(NodeType::Eq, count, one);
    let (result, _) = run(&mut g, eq, true);
    assert_eq!(g.node_type(result), NodeType::IsEmpty);
    let filter = g.child(result, 0);
    assert_eq!(g.node_type(filter), NodeType::Filter);
    let predicate = g.child(filter, 1);
    assert_eq!(g.node_type(predicate), NodeType::Not);
    assert_eq!(g.node_type(g.child(predicate, 0)), NodeType::Is);
}

#[rstest]
fn generate_id_comparison_becomes_identity() {
    let mut g = IrGraph::new();
    let a = g.xml_context();
    let b = g.xml_context();
    let root_b = g.root_of(b);
    let id_a = g.unary(NodeType::XsltGenerateId, a);
    let id_b = g.unary(NodeType::XsltGenerateId, root_b);
    let eq = g.binary(NodeType::Eq, id_a, id_b);
    let (result, _) = run(&mut g, eq, true);
    assert_eq!(g.node_type(result), NodeType::Is);
}

#[rstest]
fn element_name_filter_is_a_step() {
    let mut g = IrGraph::new();
    let ctx = g.xml_context();
    let i = g.for_(ctx);
    let content = g.content_of(i);
    let j = g.for_(content);
    let is_element = g.is_type(j, XmlType::ELEMENT);
    let name = g.unary(NodeType::NameOf, j);
    let foo = g.qname(QName::local("foo"));
    let named = g.binary(NodeType::Eq, name, foo);
    let both = g.binary(NodeType::And, is_element, named);
    let filter = g.filter(j, both);
    let node = g.loop_(i, filter);
    let (result, ann) = run(&mut g, node, true);

    assert_eq!(result, node);
    let facts = ann.read(&g, filter);
    assert!(facts.matches(Pattern::FilterElements));
    assert_eq!(facts.name_arg(ELEMENT_QNAME), Some(&QName::local("foo")));
    let step = ann.read(&g, node);
    assert!(step.matches(Pattern::Step));
    assert_eq!(step.node_arg(STEP_NODE), Some(filter));
    assert!(step.matches(Pattern::IsDocOrderDistinct));
}

#[rstest]
#[case(NodeType::Lt, 3, 2)]
#[case(NodeType::Le, 3, 3)]
#[case(NodeType::Eq, 5, 5)]
fn positional_predicates_bound_the_scan(#[case] op: NodeType, #[case] n: i32, #[case] max: i64) {
    let mut g = IrGraph::new();
    let ctx = g.xml_context();
    let content = g.content_of(ctx);
    let j = g.for_(content);
    let position = g.position_of(j);
    let limit = g.int32(n);
    let test = g.binary(op, position, limit);
    let filter = g.filter(j, test);
    let (_, ann) = run(&mut g, filter, true);
    assert_eq!(ann.read(&g, filter).int_arg(MAX_POSITION), Some(max));
    assert!(ann.matches(&g, j, Pattern::IsPositional));
    assert_eq!(ann.matches(&g, filter, Pattern::FilterPosition), op == NodeType::Eq);
}

#[rstest]
fn position_below_the_smallest_integer_has_no_bound() {
    let mut g = IrGraph::new();
    let ctx = g.xml_context();
    let content = g.content_of(ctx);
    let j = g.for_(content);
    let position = g.position_of(j);
    let limit = g.int64(i64::MIN);
    let test = g.binary(NodeType::Lt, position, limit);
    let filter = g.filter(j, test);
    let (_, ann) = run(&mut g, filter, true);
    assert!(!ann.matches(&g, filter, Pattern::MaxPosition));
    assert_eq!(ann.read(&g, filter).int_arg(MAX_POSITION), None);
}

/// `steps` applied one after another, starting at the context node.
fn path(g: &mut IrGraph, steps: &[NodeType]) -> NodeId {
    let mut path = g.xml_context();
    for &axis in steps {
        let i = g.for_(path);
        let body = g.axis(axis, i);
        path = g.loop_(i, body);
    }
    path
}

#[rstest]
#[case(&[NodeType::Content, NodeType::Content], true)]
#[case(&[NodeType::Content, NodeType::Descendant], true)]
#[case(&[NodeType::Content, NodeType::Content, NodeType::Content], true)]
#[case(&[NodeType::Descendant, NodeType::Content], false)]
#[case(&[NodeType::Content, NodeType::Parent], false)]
fn ordered_step_chains_drop_their_sort(#[case] steps: &[NodeType], #[case] dropped: bool) {
    let mut g = IrGraph::new();
    let input = path(&mut g, steps);
    assert!(!g.xml_type(input).dod);
    let node = g.doc_order_distinct(input);
    let (result, ann) = run(&mut g, node, true);
    assert_eq!(result == input, dropped);
    assert_eq!(ann.matches(&g, input, Pattern::IsDocOrderDistinct), dropped);
}

#[rstest]
fn uncalled_function_is_pruned() {
    let mut g = IrGraph::new();
    let used = g.function(QName::local("used"), &[], XmlType::STRING, false);
    let body = g.string("x");
    g.set_function_body(used, body);
    let unused = g.function(QName::local("unused"), &[], XmlType::STRING, false);
    let body = g.string("y");
    g.set_function_body(unused, body);
    let call = g.invoke(used, &[]);
    g.qil_expression(&[used, unused], &[], &[], call);

    let mut ann = Annotations::new();
    let options = CompilerOptions::default().with_root_output(false);
    optimize(&mut g, &mut ann, &options);
    let functions = g.functions().expect("functions");
    assert_eq!(g.children(functions), &[used]);
}

#[rstest]
fn side_effecting_global_survives_pruning() {
    let mut g = IrGraph::new();
    let msg = g.string("side");
    let warn = g.make(NodeType::Warning, &[msg]);
    let noisy = g.named_let(QName::local("noisy"), warn);
    let quiet_value = g.string("quiet");
    let quiet = g.named_let(QName::local("quiet"), quiet_value);
    let root = g.sequence(&[]);
    g.qil_expression(&[], &[noisy, quiet], &[], root);

    let mut ann = Annotations::new();
    optimize(&mut g, &mut ann, &CompilerOptions::default());
    let globals = g.globals().expect("globals");
    assert_eq!(g.children(globals), &[noisy]);
}
