//! Typed node factory.
//!
//! Every factory method infers the static type of the node it creates from
//! the types of its children, so trees built here are always well-typed.

use crate::graph::{IrGraph, NodeId, Payload};
use crate::literal::Literal;
use crate::names::QName;
use crate::node::NodeType;
use crate::types::{Cardinality, NodeKinds, XmlType};
use chrono::{DateTime, FixedOffset};
use compact_str::CompactString;
use rust_decimal::Decimal;

impl IrGraph {
    /// Static type of a node of type `t` over the given children, or `None`
    /// when the type is supplied by the front end rather than derived.
    pub fn infer_type(&self, t: NodeType, children: &[NodeId]) -> Option<XmlType> {
        use NodeType as N;
        let ty = |i: usize| self.xml_type(children[i]);
        let kinds = |k: NodeKinds, card: Cardinality, dod: bool| XmlType::nodes(k, card, dod);
        Some(match t {
            N::QilExpression => XmlType::ITEM_S,
            N::FunctionList
            | N::GlobalVariableList
            | N::GlobalParameterList
            | N::ActualParameterList
            | N::FormalParameterList
            | N::SortKeyList => XmlType::EMPTY,
            N::BranchList => children
                .iter()
                .map(|&c| self.xml_type(c))
                .reduce(|a, b| a.choice(&b))
                .unwrap_or(XmlType::NONE),

            N::OptimizeBarrier | N::Nop => ty(0),
            N::Unknown | N::Parameter | N::Function | N::XsltInvokeEarlyBound => return None,
            N::DataSource => XmlType::DOCUMENT.with_card(Cardinality::ZERO_OR_ONE),
            N::Error => XmlType::NONE,
            N::Warning => XmlType::EMPTY,

            N::For => {
                let src = ty(0);
                if src.is_none() { XmlType::NONE } else { src.prime() }
            }
            N::Let => ty(0),
            N::PositionOf => XmlType::INT,

            N::True | N::False => XmlType::BOOLEAN,
            N::LiteralString => XmlType::STRING,
            N::LiteralInt32 => XmlType::INT,
            N::LiteralInt64 => XmlType::INTEGER,
            N::LiteralDouble => XmlType::DOUBLE,
            N::LiteralDecimal => XmlType::DECIMAL,
            N::LiteralQName => XmlType::QNAME,
            N::LiteralType => XmlType::ITEM,
            N::LiteralDateTime => XmlType::DATE_TIME,

            N::And | N::Or | N::Not => XmlType::BOOLEAN,
            N::Conditional => ty(1).choice(&ty(2)),
            N::Choice => ty(1),

            N::Length => XmlType::INT,
            N::Sequence => children
                .iter()
                .fold(XmlType::EMPTY, |acc, &c| acc.sequence(&self.xml_type(c))),
            N::Union => {
                let (a, b) = (ty(0), ty(1));
                let card = if a.card.never_empty() || b.card.never_empty() {
                    Cardinality::ONE_OR_MORE
                } else {
                    Cardinality::ZERO_OR_MORE
                };
                kinds(a.kinds() | b.kinds(), card, true)
            }
            N::Intersection => kinds(ty(0).kinds() & ty(1).kinds(), Cardinality::ZERO_OR_MORE, true),
            N::Difference => kinds(ty(0).kinds(), Cardinality::ZERO_OR_MORE, true),
            N::Sum => ty(0).prime(),
            N::Average | N::Minimum | N::Maximum => ty(0).with_card(Cardinality::ZERO_OR_ONE).prime_opt(),

            N::Negate => ty(0),
            N::Add | N::Subtract | N::Multiply | N::Divide | N::Modulo => {
                XmlType::new(ty(0).item.join(ty(1).item), Cardinality::ONE)
            }

            N::StrLength => XmlType::INT,
            N::StrConcat => XmlType::STRING,
            N::StrParseQName => XmlType::QNAME,

            N::Eq | N::Ne | N::Lt | N::Le | N::Gt | N::Ge | N::Is | N::Before | N::After => {
                XmlType::BOOLEAN
            }

            N::Loop => {
                // a `Let` binding runs the body once over the whole value
                let src = match self.node_type(children[0]) {
                    N::Let => XmlType::ITEM,
                    _ => self.xml_type(self.child(children[0], 0)),
                };
                let body = ty(1);
                let card = src.card.product(body.card);
                let dod = src.card.at_most_one() && body.dod;
                XmlType { item: body.item, card, dod: dod || card.at_most_one() || card.is_zero() }
            }
            N::Filter => {
                let src = self.xml_type(self.child(children[0], 0));
                src.with_card(src.card | Cardinality::ZERO)
            }
            N::Sort => {
                let src = self.xml_type(self.child(children[0], 0));
                XmlType { dod: src.card.at_most_one(), ..src }
            }
            N::SortKey => XmlType::EMPTY,
            N::DocOrderDistinct => ty(0).with_dod(true),

            N::Invoke => ty(0),

            N::Content => kinds(NodeKinds::ATTRIBUTE | NodeKinds::CONTENT, Cardinality::ZERO_OR_MORE, true),
            N::Attribute => XmlType::ATTRIBUTE_Q,
            N::Parent => kinds(NodeKinds::DOCUMENT | NodeKinds::ELEMENT, Cardinality::ZERO_OR_ONE, true),
            N::Root => XmlType::NODE,
            N::XmlContext => XmlType::NODE,
            N::Descendant | N::FollowingSibling | N::XPathFollowing => {
                kinds(NodeKinds::CONTENT, Cardinality::ZERO_OR_MORE, true)
            }
            N::DescendantOrSelf => kinds(NodeKinds::ANY, Cardinality::ZERO_OR_MORE, true),
            N::Ancestor => kinds(NodeKinds::DOCUMENT | NodeKinds::ELEMENT, Cardinality::ZERO_OR_MORE, false),
            N::AncestorOrSelf => kinds(NodeKinds::ANY, Cardinality::ZERO_OR_MORE, false),
            N::Preceding | N::PrecedingSibling | N::XPathPreceding => {
                kinds(NodeKinds::CONTENT, Cardinality::ZERO_OR_MORE, false)
            }
            N::NodeRange => XmlType::NODE_DOD_S,
            N::Deref => kinds(NodeKinds::ELEMENT, Cardinality::ZERO_OR_MORE, true),
            N::XPathNamespace => kinds(NodeKinds::NAMESPACE, Cardinality::ZERO_OR_MORE, true),

            N::ElementCtor => XmlType::ELEMENT,
            N::AttributeCtor => XmlType::ATTRIBUTE,
            N::CommentCtor => XmlType::COMMENT,
            N::PICtor => XmlType::PI,
            N::TextCtor | N::RawTextCtor => XmlType::TEXT,
            N::DocumentCtor | N::RtfCtor => XmlType::DOCUMENT,
            N::NamespaceDecl => XmlType::NAMESPACE,

            N::NameOf => XmlType::QNAME,
            N::LocalNameOf | N::NamespaceUriOf | N::PrefixOf | N::XPathNodeValue | N::XsltGenerateId => {
                XmlType::STRING
            }

            N::TypeAssert | N::XsltConvert => {
                self.literal(children[1]).and_then(Literal::as_type).unwrap_or(XmlType::ITEM_S)
            }
            N::IsType | N::IsEmpty => XmlType::BOOLEAN,

            N::XsltCopy => ty(0).prime(),
            N::XsltCopyOf => ty(0),
            N::XsltInvokeLateBound => XmlType::ITEM_S,
        })
    }

    /// Create a node and infer its type. Explicitly typed node kinds fall
    /// back to `item*`.
    pub fn make(&mut self, t: NodeType, children: &[NodeId]) -> NodeId {
        self.make_with(t, children, Payload::None)
    }

    pub fn make_with(&mut self, t: NodeType, children: &[NodeId], payload: Payload) -> NodeId {
        let ty = self.infer_type(t, children).unwrap_or(XmlType::ITEM_S);
        self.add(t, ty, children, payload)
    }

    /// Recompute the type of `id` from its current children. Nodes whose type
    /// is supplied by the front end keep it.
    pub fn retype(&mut self, id: NodeId) {
        let data = self.node(id);
        if let Some(ty) = self.infer_type(data.node_type, &data.children) {
            self.set_type(id, ty);
        }
    }

    fn literal_node(&mut self, t: NodeType, lit: Literal) -> NodeId {
        self.make_with(t, &[], Payload::Literal(lit))
    }

    pub fn true_(&mut self) -> NodeId {
        self.make(NodeType::True, &[])
    }

    pub fn false_(&mut self) -> NodeId {
        self.make(NodeType::False, &[])
    }

    pub fn boolean(&mut self, value: bool) -> NodeId {
        if value { self.true_() } else { self.false_() }
    }

    pub fn string(&mut self, value: &str) -> NodeId {
        self.literal_node(NodeType::LiteralString, Literal::String(CompactString::from(value)))
    }

    pub fn int32(&mut self, value: i32) -> NodeId {
        self.literal_node(NodeType::LiteralInt32, Literal::Int32(value))
    }

    pub fn int64(&mut self, value: i64) -> NodeId {
        self.literal_node(NodeType::LiteralInt64, Literal::Int64(value))
    }

    pub fn double(&mut self, value: f64) -> NodeId {
        self.literal_node(NodeType::LiteralDouble, Literal::Double(value))
    }

    pub fn decimal(&mut self, value: Decimal) -> NodeId {
        self.literal_node(NodeType::LiteralDecimal, Literal::Decimal(value))
    }

    pub fn qname(&mut self, value: QName) -> NodeId {
        self.literal_node(NodeType::LiteralQName, Literal::QName(value))
    }

    pub fn type_literal(&mut self, value: XmlType) -> NodeId {
        self.literal_node(NodeType::LiteralType, Literal::Type(value))
    }

    pub fn date_time(&mut self, value: DateTime<FixedOffset>) -> NodeId {
        self.literal_node(NodeType::LiteralDateTime, Literal::DateTime(value))
    }

    /// Node for an arbitrary literal value.
    pub fn literal_value(&mut self, lit: Literal) -> NodeId {
        let t = match &lit {
            Literal::String(_) => NodeType::LiteralString,
            Literal::Int32(_) => NodeType::LiteralInt32,
            Literal::Int64(_) => NodeType::LiteralInt64,
            Literal::Double(_) => NodeType::LiteralDouble,
            Literal::Decimal(_) => NodeType::LiteralDecimal,
            Literal::QName(_) => NodeType::LiteralQName,
            Literal::Type(_) => NodeType::LiteralType,
            Literal::DateTime(_) => NodeType::LiteralDateTime,
        };
        self.literal_node(t, lit)
    }

    pub fn unknown(&mut self, ty: XmlType) -> NodeId {
        self.add(NodeType::Unknown, ty, &[], Payload::None)
    }

    pub fn list(&mut self, t: NodeType, items: &[NodeId]) -> NodeId {
        debug_assert!(t.is_list(), "{t} is not a list node");
        self.make(t, items)
    }

    pub fn sequence(&mut self, items: &[NodeId]) -> NodeId {
        self.make(NodeType::Sequence, items)
    }

    pub fn for_(&mut self, source: NodeId) -> NodeId {
        self.make(NodeType::For, &[source])
    }

    pub fn let_(&mut self, value: NodeId) -> NodeId {
        self.make(NodeType::Let, &[value])
    }

    pub fn named_let(&mut self, name: QName, value: NodeId) -> NodeId {
        self.make_with(NodeType::Let, &[value], Payload::Name(name))
    }

    /// Parameter of declared type `ty` with an optional default value.
    pub fn parameter(&mut self, name: QName, ty: XmlType, default: Option<NodeId>) -> NodeId {
        let default = match default {
            Some(d) => d,
            None => self.unknown(XmlType::EMPTY),
        };
        self.add(NodeType::Parameter, ty, &[default], Payload::Name(name))
    }

    pub fn position_of(&mut self, iter: NodeId) -> NodeId {
        self.make(NodeType::PositionOf, &[iter])
    }

    pub fn loop_(&mut self, iter: NodeId, body: NodeId) -> NodeId {
        self.make(NodeType::Loop, &[iter, body])
    }

    pub fn filter(&mut self, iter: NodeId, predicate: NodeId) -> NodeId {
        self.make(NodeType::Filter, &[iter, predicate])
    }

    pub fn sort(&mut self, iter: NodeId, keys: &[NodeId]) -> NodeId {
        let list = self.list(NodeType::SortKeyList, keys);
        self.make(NodeType::Sort, &[iter, list])
    }

    pub fn sort_key(&mut self, key: NodeId, collation: &str, descending: bool) -> NodeId {
        let collation = self.string(collation);
        self.make_with(NodeType::SortKey, &[key, collation], Payload::SortKey { descending })
    }

    pub fn unary(&mut self, t: NodeType, operand: NodeId) -> NodeId {
        self.make(t, &[operand])
    }

    pub fn binary(&mut self, t: NodeType, left: NodeId, right: NodeId) -> NodeId {
        self.make(t, &[left, right])
    }

    pub fn conditional(&mut self, cond: NodeId, then: NodeId, otherwise: NodeId) -> NodeId {
        self.make(NodeType::Conditional, &[cond, then, otherwise])
    }

    pub fn choice(&mut self, selector: NodeId, branches: &[NodeId]) -> NodeId {
        let list = self.list(NodeType::BranchList, branches);
        self.make(NodeType::Choice, &[selector, list])
    }

    pub fn doc_order_distinct(&mut self, nodes: NodeId) -> NodeId {
        self.make(NodeType::DocOrderDistinct, &[nodes])
    }

    pub fn axis(&mut self, t: NodeType, context: NodeId) -> NodeId {
        debug_assert!(t.is_axis(), "{t} is not an axis");
        self.make(t, &[context])
    }

    pub fn content_of(&mut self, context: NodeId) -> NodeId {
        self.axis(NodeType::Content, context)
    }

    pub fn attribute_of(&mut self, context: NodeId, name: QName) -> NodeId {
        let name = self.qname(name);
        self.make(NodeType::Attribute, &[context, name])
    }

    pub fn parent_of(&mut self, context: NodeId) -> NodeId {
        self.axis(NodeType::Parent, context)
    }

    pub fn root_of(&mut self, context: NodeId) -> NodeId {
        self.axis(NodeType::Root, context)
    }

    pub fn descendant_of(&mut self, context: NodeId) -> NodeId {
        self.axis(NodeType::Descendant, context)
    }

    pub fn xml_context(&mut self) -> NodeId {
        self.make(NodeType::XmlContext, &[])
    }

    pub fn is_type(&mut self, value: NodeId, ty: XmlType) -> NodeId {
        let lit = self.type_literal(ty);
        self.make(NodeType::IsType, &[value, lit])
    }

    pub fn type_assert(&mut self, value: NodeId, ty: XmlType) -> NodeId {
        let lit = self.type_literal(ty);
        self.make(NodeType::TypeAssert, &[value, lit])
    }

    pub fn convert(&mut self, value: NodeId, ty: XmlType) -> NodeId {
        let lit = self.type_literal(ty);
        self.make(NodeType::XsltConvert, &[value, lit])
    }

    pub fn element(&mut self, name: QName, content: NodeId) -> NodeId {
        let name = self.qname(name);
        self.make(NodeType::ElementCtor, &[name, content])
    }

    pub fn attribute_ctor(&mut self, name: QName, value: NodeId) -> NodeId {
        let name = self.qname(name);
        self.make(NodeType::AttributeCtor, &[name, value])
    }

    pub fn text(&mut self, value: NodeId) -> NodeId {
        self.make(NodeType::TextCtor, &[value])
    }

    pub fn comment(&mut self, value: NodeId) -> NodeId {
        self.make(NodeType::CommentCtor, &[value])
    }

    pub fn pi(&mut self, target: NodeId, value: NodeId) -> NodeId {
        self.make(NodeType::PICtor, &[target, value])
    }

    pub fn namespace_decl(&mut self, prefix: &str, uri: &str) -> NodeId {
        let prefix = self.string(prefix);
        let uri = self.string(uri);
        self.make(NodeType::NamespaceDecl, &[prefix, uri])
    }

    /// Declare a function whose body is filled in later with
    /// [`IrGraph::set_function_body`], so recursive calls can refer to it.
    pub fn function(
        &mut self,
        name: QName,
        params: &[NodeId],
        result: XmlType,
        side_effects: bool,
    ) -> NodeId {
        let params = self.list(NodeType::FormalParameterList, params);
        let body = self.unknown(result);
        self.add(
            NodeType::Function,
            result,
            &[params, body],
            Payload::Function { name, side_effects },
        )
    }

    pub fn set_function_body(&mut self, function: NodeId, body: NodeId) {
        self.set_child(function, 1, body);
    }

    pub fn invoke(&mut self, function: NodeId, args: &[NodeId]) -> NodeId {
        let args = self.list(NodeType::ActualParameterList, args);
        self.make(NodeType::Invoke, &[function, args])
    }

    pub fn error(&mut self, message: NodeId) -> NodeId {
        self.make(NodeType::Error, &[message])
    }

    /// Build the `QilExpression` root and make it the graph entry.
    pub fn qil_expression(
        &mut self,
        functions: &[NodeId],
        globals: &[NodeId],
        params: &[NodeId],
        root: NodeId,
    ) -> NodeId {
        let functions = self.list(NodeType::FunctionList, functions);
        let globals = self.list(NodeType::GlobalVariableList, globals);
        let params = self.list(NodeType::GlobalParameterList, params);
        let qil = self.make(NodeType::QilExpression, &[functions, globals, params, root]);
        self.set_entry(qil);
        qil
    }
}

impl XmlType {
    /// Prime type keeping an optional cardinality.
    #[must_use]
    pub fn prime_opt(&self) -> XmlType {
        let card = if self.maybe_empty() { Cardinality::ZERO_OR_ONE } else { Cardinality::ONE };
        XmlType::new(self.item, card)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn loop_type_is_product() {
        let mut g = IrGraph::new();
        let ctx = g.xml_context();
        let kids = g.content_of(ctx);
        let it = g.for_(kids);
        let body = g.text(it);
        let lp = g.loop_(it, body);
        let ty = g.xml_type(lp);
        assert_eq!(ty.card, Cardinality::ZERO_OR_MORE);
        assert_eq!(ty.kinds(), NodeKinds::TEXT);
    }

    #[rstest]
    fn filter_adds_zero() {
        let mut g = IrGraph::new();
        let ctx = g.xml_context();
        let it = g.for_(ctx);
        let t = g.true_();
        let f = g.filter(it, t);
        assert_eq!(g.xml_type(f).card, Cardinality::ZERO_OR_ONE);
    }

    #[rstest]
    fn error_is_bottom_and_propagates_through_sequence() {
        let mut g = IrGraph::new();
        let msg = g.string("boom");
        let err = g.error(msg);
        let one = g.int32(1);
        let seq = g.sequence(&[one, err]);
        assert!(g.xml_type(err).is_none());
        assert!(g.xml_type(seq).is_none());
    }

    #[rstest]
    fn reverse_axes_are_not_doc_ordered() {
        let mut g = IrGraph::new();
        let ctx = g.xml_context();
        let anc = g.axis(NodeType::Ancestor, ctx);
        let desc = g.descendant_of(ctx);
        assert!(!g.xml_type(anc).dod);
        assert!(g.xml_type(desc).dod);
    }
}
