use rstest::rstest;
use xslt_ilgen::codegen::instr::{Callee, CmpOp, Constant, Instr, ItemRepr};
use xslt_ilgen::codegen::runtime::{Check, IteratorKind, RuntimeFn, WriterOp};
use xslt_ilgen::{CompileError, Compilation, CompilerOptions, compile};
use xslt_ir::names::XML_NS;
use xslt_ir::{IrGraph, NodeId, NodeType, QName, SourceSpan, XmlType};

fn values_only() -> CompilerOptions {
    CompilerOptions::default().with_root_output(false)
}

fn compiled(mut g: IrGraph, root: NodeId, globals: &[NodeId], options: &CompilerOptions) -> Compilation {
    g.qil_expression(&[], globals, &[], root);
    compile(g, options).expect("compile")
}

fn root_code(c: &Compilation) -> &[Instr] {
    &c.program.method(c.root).expect("root method").code
}

fn writes(code: &[Instr]) -> Vec<(WriterOp, Check)> {
    code.iter()
        .filter_map(|i| match i {
            Instr::Call(Callee::Runtime(RuntimeFn::Write(op, check))) => Some((*op, *check)),
            _ => None,
        })
        .collect()
}

#[rstest]
fn constant_arithmetic_is_folded_before_lowering() {
    let mut g = IrGraph::new();
    let (a, b) = (g.int32(2), g.int32(3));
    let sum = g.binary(NodeType::Add, a, b);
    let c = compiled(g, sum, &[], &values_only());

    let code = root_code(&c);
    assert!(code.contains(&Instr::Ldc(Constant::Int32(5))));
    assert!(!code.iter().any(|i| matches!(i, Instr::Add(_))));
    assert!(c.rewrites >= 1);
}

#[rstest]
fn negated_literal_becomes_false() {
    let mut g = IrGraph::new();
    let t = g.true_();
    let not = g.unary(NodeType::Not, t);
    let c = compiled(g, not, &[], &values_only());

    let root = c.graph.root_expr().expect("root");
    assert_eq!(c.graph.node_type(root), NodeType::False);
    assert_eq!(root_code(&c), &[Instr::Ldc(Constant::Bool(false)), Instr::Ret]);
}

#[rstest]
fn element_in_known_state_uses_unchecked_writer_calls() {
    let mut g = IrGraph::new();
    let hi = g.string("hi");
    let text = g.text(hi);
    let element = g.element(QName::local("a"), text);
    let c = compiled(g, element, &[], &CompilerOptions::default());

    let unchecked = |op| (op, Check::Unchecked);
    assert_eq!(
        writes(root_code(&c)),
        vec![
            unchecked(WriterOp::StartTree),
            unchecked(WriterOp::StartElementLocalName),
            unchecked(WriterOp::StartElementContent),
            unchecked(WriterOp::String),
            unchecked(WriterOp::EndElement),
            unchecked(WriterOp::EndTree),
        ]
    );
    assert!(root_code(&c).contains(&Instr::Ldc(Constant::String("a".into()))));
}

#[rstest]
fn xml_namespace_declaration_is_elided() {
    let mut g = IrGraph::new();
    let decl = g.namespace_decl("xml", XML_NS);
    let element = g.element(QName::local("a"), decl);
    let c = compiled(g, element, &[], &CompilerOptions::default());

    assert!(!writes(root_code(&c)).iter().any(|(op, _)| *op == WriterOp::NamespaceDeclaration));
}

#[rstest]
fn other_namespace_declaration_is_written() {
    let mut g = IrGraph::new();
    let decl = g.namespace_decl("p", "urn:p");
    let element = g.element(QName::local("a"), decl);
    let c = compiled(g, element, &[], &CompilerOptions::default());

    assert!(writes(root_code(&c)).iter().any(|(op, _)| *op == WriterOp::NamespaceDeclaration));
}

#[rstest]
fn bounded_position_stops_the_scan_early() {
    let mut g = IrGraph::new();
    let ctx = g.xml_context();
    let content = g.content_of(ctx);
    let j = g.for_(content);
    let position = g.position_of(j);
    let three = g.int32(3);
    let test = g.binary(NodeType::Lt, position, three);
    let filter = g.filter(j, test);
    let c = compiled(g, filter, &[], &values_only());

    let code = root_code(&c);
    let early_exit = code.windows(3).any(|w| {
        matches!(
            w,
            [Instr::Ldc(Constant::Int32(2)), Instr::Cmp(CmpOp::Gt, ItemRepr::Int32), Instr::BrTrue(_)]
        )
    });
    assert!(early_exit, "no early exit in\n{}", c.program);
}

#[rstest]
fn count_of_union_with_single_node_needs_no_union_iterator() {
    let mut g = IrGraph::new();
    let single = g.xml_context();
    let ctx = g.xml_context();
    let others = g.content_of(ctx);
    let union = g.binary(NodeType::Union, single, others);
    let count = g.unary(NodeType::Length, union);
    let one = g.int32(1);
    let eq = g.binary(NodeType::Eq, count, one);
    let c = compiled(g, eq, &[], &values_only());

    let creates_union = c
        .program
        .instructions()
        .any(|i| *i == Instr::call(RuntimeFn::IterCreate(IteratorKind::Union)));
    assert!(!creates_union);
}

#[rstest]
fn last_writer_call_is_a_tail_call() {
    let mut g = IrGraph::new();
    let f = g.function(QName::local("emit"), &[], XmlType::ELEMENT_S, false);
    let empty = g.sequence(&[]);
    let element = g.element(QName::local("e"), empty);
    let again = g.invoke(f, &[]);
    let body = g.sequence(&[element, again]);
    g.set_function_body(f, body);
    let root = g.invoke(f, &[]);
    g.qil_expression(&[f], &[], &[], root);
    let c = compile(g, &CompilerOptions::default()).expect("compile");

    let emit = c.program.method_named("emit").expect("function method");
    assert!(emit.code.contains(&Instr::TailCall(emit.id)));
    assert!(root_code(&c).contains(&Instr::Call(Callee::Method(emit.id))));
}

#[rstest]
fn global_is_read_through_its_accessor() {
    let mut g = IrGraph::new();
    let ctx = g.xml_context();
    let content = g.content_of(ctx);
    let global = g.named_let(QName::local("g"), content);
    let c = compiled(g, global, &[global], &values_only());

    let accessor = c.program.method_named("g").expect("accessor");
    let init = c.program.method_named("g$init").expect("initializer");
    assert!(root_code(&c).contains(&Instr::Call(Callee::Method(accessor.id))));
    assert!(accessor.code.contains(&Instr::call(RuntimeFn::IsGlobalComputed)));
    assert!(init.code.contains(&Instr::call(RuntimeFn::SetGlobalValue)));
    assert_eq!(c.static_data.global_count, 1);
}

#[rstest]
#[case(true, 1)]
#[case(false, 0)]
fn sequence_points_follow_the_debug_switch(#[case] debug: bool, #[case] expected: usize) {
    let mut g = IrGraph::new();
    let value = g.string("x");
    let span = SourceSpan { start_line: 3, start_col: 1, end_line: 3, end_col: 9 };
    g.set_span(value, span);
    let c = compiled(g, value, &[], &values_only().with_debug(debug));

    let points = root_code(&c).iter().filter(|i| **i == Instr::SequencePoint(span)).count();
    assert_eq!(points, expected);
}

#[rstest]
fn graph_without_entry_is_rejected() {
    let err = compile(IrGraph::new(), &CompilerOptions::default()).expect_err("no entry");
    assert_eq!(err, CompileError::NoEntry);
}

fn calls(code: &[Instr], f: RuntimeFn) -> usize {
    code.iter().filter(|i| **i == Instr::call(f)).count()
}

fn position(code: &[Instr], f: RuntimeFn) -> usize {
    code.iter().position(|i| *i == Instr::call(f)).unwrap_or_else(|| panic!("no call of {f:?}"))
}

fn switches(code: &[Instr], arms: usize) -> usize {
    code.iter().filter(|i| matches!(i, Instr::Switch(labels) if labels.len() == arms)).count()
}

#[rstest]
fn writer_function_shared_with_a_result_tree_checks_its_writes() {
    let mut g = IrGraph::new();
    let f = g.function(QName::local("emit"), &[], XmlType::TEXT, false);
    let x = g.string("x");
    let body = g.text(x);
    g.set_function_body(f, body);
    let call = g.invoke(f, &[]);
    let root = g.element(QName::local("r"), call);
    let again = g.invoke(f, &[]);
    let base = g.string("");
    let rtf = g.make(NodeType::RtfCtor, &[again, base]);
    let tree = g.named_let(QName::local("tree"), rtf);
    g.qil_expression(&[f], &[tree], &[], root);
    let c = compile(g, &CompilerOptions::default().with_speculative(false)).expect("compile");

    let emit = c.program.method_named("emit").expect("function method");
    let body_writes = writes(&emit.code);
    assert_eq!(body_writes, vec![(WriterOp::String, Check::Checked)]);
}

#[rstest]
fn sequence_parts_share_one_dispatcher() {
    let mut g = IrGraph::new();
    let (a, b) = (g.xml_context(), g.xml_context());
    let content = g.content_of(a);
    let descendants = g.descendant_of(b);
    let both = g.sequence(&[content, descendants]);
    let c = compiled(g, both, &[], &values_only());

    let code = root_code(&c);
    assert!(
        code.windows(2).any(|w| matches!((&w[0], &w[1]), (Instr::Ldloc(_), Instr::Switch(labels)) if labels.len() == 2)),
        "{code:?}"
    );
    assert_eq!(calls(code, RuntimeFn::IterCreate(IteratorKind::AttributeContent)), 1);
    assert_eq!(calls(code, RuntimeFn::IterCreate(IteratorKind::Descendant)), 1);
}

#[rstest]
fn conditional_items_resume_in_their_arm() {
    let mut g = IrGraph::new();
    let (a, b, d) = (g.xml_context(), g.xml_context(), g.xml_context());
    let counted = g.content_of(a);
    let test = g.unary(NodeType::IsEmpty, counted);
    let then = g.content_of(b);
    let otherwise = g.descendant_of(d);
    let node = g.conditional(test, then, otherwise);
    let c = compiled(g, node, &[], &values_only());

    let code = root_code(&c);
    assert_eq!(switches(code, 2), 1, "{code:?}");
    assert!(code.iter().any(|i| matches!(i, Instr::BrFalse(_))));
}

#[rstest]
fn choice_switches_on_entry_and_on_resume() {
    let mut g = IrGraph::new();
    let (a, b, d, e) = (g.xml_context(), g.xml_context(), g.xml_context(), g.xml_context());
    let counted = g.content_of(a);
    let selector = g.unary(NodeType::Length, counted);
    let first = g.content_of(b);
    let second = g.descendant_of(d);
    let third = g.axis(NodeType::Ancestor, e);
    let node = g.choice(selector, &[first, second, third]);
    let c = compiled(g, node, &[], &values_only());

    assert_eq!(switches(root_code(&c), 3), 2);
}

#[rstest]
fn sort_accumulates_one_key_row_per_item() {
    let mut g = IrGraph::new();
    let ctx = g.xml_context();
    let content = g.content_of(ctx);
    let i = g.for_(content);
    let name = g.unary(NodeType::LocalNameOf, i);
    let key = g.sort_key(name, "http://example.com/collation", true);
    let sorted = g.sort(i, &[key]);
    let c = compiled(g, sorted, &[], &values_only());

    let code = root_code(&c);
    let create = position(code, RuntimeFn::SortKeysCreate);
    let add = position(code, RuntimeFn::SortKeyAdd(ItemRepr::String));
    let row = position(code, RuntimeFn::SortKeysFinishRow);
    let sort = position(code, RuntimeFn::SeqSortByKeys);
    assert!(create < add && add < row && row < sort, "{code:?}");
    assert!(code[..add].contains(&Instr::Ldc(Constant::Bool(true))));
    assert!(c.static_data.collations.items().iter().any(|s| s == "http://example.com/collation"));
}

#[rstest]
fn union_merges_both_operands_in_one_iterator() {
    let mut g = IrGraph::new();
    let (a, b) = (g.xml_context(), g.xml_context());
    let content = g.content_of(a);
    let descendants = g.descendant_of(b);
    let union = g.binary(NodeType::Union, content, descendants);
    let c = compiled(g, union, &[], &values_only());

    let code = root_code(&c);
    assert_eq!(calls(code, RuntimeFn::IterCreate(IteratorKind::Union)), 1);
    assert_eq!(calls(code, RuntimeFn::IterAdvance(IteratorKind::Union)), 1);
    assert_eq!(switches(code, 4), 1);
}

#[rstest]
fn key_lookup_builds_its_index_once() {
    let mut g = IrGraph::new();
    let ctx = g.xml_context();
    let content = g.content_of(ctx);
    let nodes = g.named_let(QName::local("nodes"), content);
    let j = g.for_(nodes);
    let key = g.unary(NodeType::XPathNodeValue, j);
    let wanted = g.string("k");
    let test = g.binary(NodeType::Eq, key, wanted);
    let filter = g.filter(j, test);
    let c = compiled(g, filter, &[nodes], &values_only());

    let code = root_code(&c);
    let find = position(code, RuntimeFn::IndexFind);
    let create = position(code, RuntimeFn::IndexCreate);
    let register = position(code, RuntimeFn::IndexRegister);
    let lookup = position(code, RuntimeFn::IndexLookup);
    assert!(find < create && create < register && register < lookup, "{code:?}");
    assert!(code[find..create].iter().any(|i| matches!(i, Instr::BrTrue(_))));
    assert_eq!(calls(code, RuntimeFn::IndexAdd), 1);
}

/// `ctx/step/next` built as nested loops under a document-order sort.
fn sorted_path(g: &mut IrGraph, first: NodeType, second: NodeType) -> NodeId {
    let ctx = g.xml_context();
    let i = g.for_(ctx);
    let step = g.axis(first, i);
    let inner = g.loop_(i, step);
    let j = g.for_(inner);
    let next = g.axis(second, j);
    let outer = g.loop_(j, next);
    g.doc_order_distinct(outer)
}

#[rstest]
fn step_over_ordered_input_uses_a_merge_iterator() {
    let mut g = IrGraph::new();
    let node = sorted_path(&mut g, NodeType::Descendant, NodeType::Content);
    let c = compiled(g, node, &[], &values_only());

    let code = root_code(&c);
    assert_eq!(calls(code, RuntimeFn::IterCreate(IteratorKind::ContentMerge)), 1);
    assert_eq!(calls(code, RuntimeFn::IterAdvance(IteratorKind::ContentMerge)), 1);
    assert_eq!(calls(code, RuntimeFn::SeqDocOrderDistinct), 0);
}

#[rstest]
fn child_chain_needs_no_sort() {
    let mut g = IrGraph::new();
    let node = sorted_path(&mut g, NodeType::Content, NodeType::Content);
    let c = compiled(g, node, &[], &values_only());

    let root = c.graph.root_expr().expect("root");
    assert_eq!(c.graph.node_type(root), NodeType::Loop);
    let code = root_code(&c);
    assert_eq!(calls(code, RuntimeFn::SeqDocOrderDistinct), 0);
    assert_eq!(calls(code, RuntimeFn::IterCreate(IteratorKind::ContentMerge)), 0);
}

#[rstest]
fn reverse_axis_iterates_in_document_order() {
    let mut g = IrGraph::new();
    let ctx = g.xml_context();
    let ancestors = g.axis(NodeType::Ancestor, ctx);
    let node = g.doc_order_distinct(ancestors);
    let c = compiled(g, node, &[], &values_only());

    let code = root_code(&c);
    assert_eq!(calls(code, RuntimeFn::IterCreate(IteratorKind::AncestorDocOrder)), 1);
    assert_eq!(calls(code, RuntimeFn::IterCreate(IteratorKind::Ancestor)), 0);
    assert_eq!(calls(code, RuntimeFn::SeqDocOrderDistinct), 0);
}

#[rstest]
#[case(true)]
#[case(false)]
fn result_tree_of_one_text_skips_construction(#[case] text_only: bool) {
    let mut g = IrGraph::new();
    let hi = g.string("hi");
    let content = if text_only {
        g.text(hi)
    } else {
        let text = g.text(hi);
        g.element(QName::local("a"), text)
    };
    let base = g.string("");
    let rtf = g.make(NodeType::RtfCtor, &[content, base]);
    let c = compiled(g, rtf, &[], &values_only());

    let code = root_code(&c);
    assert_eq!(calls(code, RuntimeFn::TextRtf), usize::from(text_only));
    let constructed = writes(code).contains(&(WriterOp::StartRtfConstruction, Check::Unchecked));
    assert_eq!(constructed, !text_only);
}

#[rstest]
fn shallow_copy_skips_content_it_cannot_hold() {
    let mut g = IrGraph::new();
    let ctx = g.xml_context();
    let empty = g.sequence(&[]);
    let element = g.element(QName::local("e"), empty);
    let copy = g.make(NodeType::XsltCopy, &[ctx, element]);
    let c = compiled(g, copy, &[], &CompilerOptions::default());

    let code = root_code(&c);
    let start = code
        .iter()
        .position(|i| *i == Instr::call(RuntimeFn::Write(WriterOp::StartCopy, Check::Unchecked)))
        .expect("start copy");
    assert!(matches!(code[start + 1], Instr::BrFalse(_)));
    let all = writes(code);
    assert!(all.contains(&(WriterOp::StartElementLocalName, Check::Checked)), "{all:?}");
    assert!(all.contains(&(WriterOp::EndCopy, Check::Unchecked)));
}

#[rstest]
fn name_test_on_an_unspecialized_axis_adds_no_filter_table_entry() {
    let mut g = IrGraph::new();
    let ctx = g.xml_context();
    let siblings = g.axis(NodeType::FollowingSibling, ctx);
    let j = g.for_(siblings);
    let is_element = g.is_type(j, XmlType::ELEMENT);
    let name = g.unary(NodeType::NameOf, j);
    let item = g.qname(QName::local("item"));
    let named = g.binary(NodeType::Eq, name, item);
    let both = g.binary(NodeType::And, is_element, named);
    let filter = g.filter(j, both);
    let c = compiled(g, filter, &[], &values_only().with_speculative(false));

    assert!(c.annotations.matches(&c.graph, filter, xslt_ilgen::Pattern::FilterElements));
    assert!(c.static_data.name_filters.is_empty());
    assert_eq!(calls(root_code(&c), RuntimeFn::IterCreate(IteratorKind::FollowingSibling)), 1);
}
