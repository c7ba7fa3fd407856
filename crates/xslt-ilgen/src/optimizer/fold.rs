//! Constant folding over literal operands, and folding of operators whose
//! strict operand never returns.

use super::Optimizer;
use core::cmp::Ordering;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use xslt_ir::{AtomicType, Literal, NodeId, NodeType, XmlType};

#[derive(Debug, Clone, Copy)]
enum Num {
    Int32(i32),
    Int64(i64),
    Decimal(Decimal),
    Double(f64),
}

impl Num {
    fn of(lit: &Literal) -> Option<Num> {
        Some(match lit {
            Literal::Int32(v) => Num::Int32(*v),
            Literal::Int64(v) => Num::Int64(*v),
            Literal::Decimal(v) => Num::Decimal(*v),
            Literal::Double(v) => Num::Double(*v),
            _ => return None,
        })
    }

    fn rank(self) -> u8 {
        match self {
            Num::Int32(_) => 0,
            Num::Int64(_) => 1,
            Num::Decimal(_) => 2,
            Num::Double(_) => 3,
        }
    }

    fn widen(self, rank: u8) -> Option<Num> {
        Some(match (self, rank) {
            (n, r) if n.rank() == r => n,
            (Num::Int32(v), 1) => Num::Int64(i64::from(v)),
            (Num::Int32(v), 2) => Num::Decimal(Decimal::from(v)),
            (Num::Int32(v), _) => Num::Double(f64::from(v)),
            (Num::Int64(v), 2) => Num::Decimal(Decimal::from(v)),
            (Num::Int64(v), _) => Num::Double(v as f64),
            (Num::Decimal(v), _) => Num::Double(v.to_f64()?),
            (Num::Double(_), _) => return None,
        })
    }

    fn into_literal(self) -> Literal {
        match self {
            Num::Int32(v) => Literal::Int32(v),
            Num::Int64(v) => Literal::Int64(v),
            Num::Decimal(v) => Literal::Decimal(v),
            Num::Double(v) => Literal::Double(v),
        }
    }
}

/// Bring both operands to the wider of their two representations.
fn promote(a: Num, b: Num) -> Option<(Num, Num)> {
    let rank = a.rank().max(b.rank());
    Some((a.widen(rank)?, b.widen(rank)?))
}

macro_rules! checked_arith {
    ($op:expr, $x:expr, $y:expr) => {
        match $op {
            NodeType::Add => $x.checked_add($y),
            NodeType::Subtract => $x.checked_sub($y),
            NodeType::Multiply => $x.checked_mul($y),
            NodeType::Divide => $x.checked_div($y),
            NodeType::Modulo => $x.checked_rem($y),
            _ => None,
        }
    };
}

/// Result of an arithmetic operator over two numeric literals. Integer and
/// decimal operations that overflow or divide by zero are not folded so the
/// runtime still raises the error; double arithmetic always folds.
pub fn fold_arithmetic(op: NodeType, a: &Literal, b: &Literal) -> Option<Literal> {
    let (a, b) = promote(Num::of(a)?, Num::of(b)?)?;
    let result = match (a, b) {
        (Num::Int32(x), Num::Int32(y)) => Num::Int32(checked_arith!(op, x, y)?),
        (Num::Int64(x), Num::Int64(y)) => Num::Int64(checked_arith!(op, x, y)?),
        (Num::Decimal(x), Num::Decimal(y)) => Num::Decimal(checked_arith!(op, x, y)?),
        (Num::Double(x), Num::Double(y)) => Num::Double(match op {
            NodeType::Add => x + y,
            NodeType::Subtract => x - y,
            NodeType::Multiply => x * y,
            NodeType::Divide => x / y,
            NodeType::Modulo => x % y,
            _ => return None,
        }),
        _ => return None,
    };
    Some(result.into_literal())
}

pub fn fold_negate(a: &Literal) -> Option<Literal> {
    Some(match Num::of(a)? {
        Num::Int32(v) => Literal::Int32(v.checked_neg()?),
        Num::Int64(v) => Literal::Int64(v.checked_neg()?),
        Num::Decimal(v) => Literal::Decimal(-v),
        Num::Double(v) => Literal::Double(-v),
    })
}

fn holds(op: NodeType, ordering: Ordering) -> Option<bool> {
    Some(match op {
        NodeType::Eq => ordering == Ordering::Equal,
        NodeType::Ne => ordering != Ordering::Equal,
        NodeType::Lt => ordering == Ordering::Less,
        NodeType::Le => ordering != Ordering::Greater,
        NodeType::Gt => ordering == Ordering::Greater,
        NodeType::Ge => ordering != Ordering::Less,
        _ => return None,
    })
}

/// Outcome of a value comparison over two literals of compatible kinds.
///
/// Numbers compare after promotion and NaN is unordered (only `Ne` holds).
/// Strings compare ordinally by UTF-16 code unit, qualified names support
/// equality only, and date-times compare as instants.
pub fn fold_comparison(op: NodeType, a: &Literal, b: &Literal) -> Option<bool> {
    let ordering = match (a, b) {
        (Literal::String(x), Literal::String(y)) => Some(x.encode_utf16().cmp(y.encode_utf16())),
        (Literal::QName(x), Literal::QName(y)) => {
            return match op {
                NodeType::Eq => Some(x == y),
                NodeType::Ne => Some(x != y),
                _ => None,
            };
        }
        (Literal::DateTime(x), Literal::DateTime(y)) => Some(x.cmp(y)),
        _ => match promote(Num::of(a)?, Num::of(b)?)? {
            (Num::Int32(x), Num::Int32(y)) => Some(x.cmp(&y)),
            (Num::Int64(x), Num::Int64(y)) => Some(x.cmp(&y)),
            (Num::Decimal(x), Num::Decimal(y)) => Some(x.cmp(&y)),
            (Num::Double(x), Num::Double(y)) => x.partial_cmp(&y),
            _ => return None,
        },
    };
    match ordering {
        Some(o) => holds(op, o),
        None if op.is_comparison() => Some(op == NodeType::Ne),
        None => None,
    }
}

/// XPath `number()` over a string: optional sign, digits and at most one
/// decimal point, surrounded by whitespace; anything else is NaN.
fn string_to_double(s: &str) -> f64 {
    let t = s.trim_matches(|c| matches!(c, ' ' | '\t' | '\n' | '\r'));
    let body = t.strip_prefix('-').unwrap_or(t);
    let well_formed = body.chars().any(|c| c.is_ascii_digit())
        && body.chars().all(|c| c.is_ascii_digit() || c == '.')
        && body.matches('.').count() <= 1;
    if well_formed { t.parse().unwrap_or(f64::NAN) } else { f64::NAN }
}

fn double_to_string(v: f64) -> Option<String> {
    if v.is_nan() {
        Some("NaN".to_owned())
    } else if v.is_infinite() {
        Some(if v > 0.0 { "Infinity" } else { "-Infinity" }.to_owned())
    } else if v.fract() == 0.0 && v.abs() < 1e15 {
        // negative zero prints as "0"
        Some(format!("{}", v as i64))
    } else {
        None
    }
}

fn exact_int(v: f64) -> Option<i64> {
    (v.is_finite() && v.fract() == 0.0 && v.abs() < 9.0e15).then_some(v as i64)
}

/// Literal resulting from converting `lit` to the singleton atomic type
/// `target`, when the conversion is exact.
pub fn fold_conversion(lit: &Literal, target: XmlType) -> Option<Literal> {
    if !target.is_singleton() {
        return None;
    }
    let num = Num::of(lit);
    Some(match target.atomic_type()? {
        AtomicType::String => Literal::String(
            match lit {
                Literal::String(s) => s.as_str().to_owned(),
                Literal::Int32(v) => v.to_string(),
                Literal::Int64(v) => v.to_string(),
                Literal::Decimal(v) => v.normalize().to_string(),
                Literal::Double(v) => double_to_string(*v)?,
                _ => return None,
            }
            .into(),
        ),
        AtomicType::Double => Literal::Double(match (lit, num) {
            (Literal::String(s), _) => string_to_double(s),
            (_, Some(n)) => match n.widen(3)? {
                Num::Double(v) => v,
                _ => return None,
            },
            _ => return None,
        }),
        AtomicType::Decimal => Literal::Decimal(match num? {
            Num::Int32(v) => Decimal::from(v),
            Num::Int64(v) => Decimal::from(v),
            Num::Decimal(v) => v,
            Num::Double(v) => Decimal::try_from(v).ok()?,
        }),
        AtomicType::Int => Literal::Int32(match num? {
            Num::Int32(v) => v,
            Num::Int64(v) => i32::try_from(v).ok()?,
            Num::Decimal(v) => v.fract().is_zero().then(|| v.to_i32()).flatten()?,
            Num::Double(v) => i32::try_from(exact_int(v)?).ok()?,
        }),
        AtomicType::Integer => Literal::Int64(match num? {
            Num::Int32(v) => i64::from(v),
            Num::Int64(v) => v,
            Num::Decimal(v) => v.fract().is_zero().then(|| v.to_i64()).flatten()?,
            Num::Double(v) => exact_int(v)?,
        }),
        _ => return None,
    })
}

/// Operands whose value is always demanded; if one of them never returns,
/// neither does the operator.
fn strict_operands(t: NodeType) -> &'static [usize] {
    use NodeType as N;
    match t {
        N::And | N::Or | N::Conditional | N::Choice => &[0],
        N::Loop | N::Filter | N::Sort | N::DocOrderDistinct => &[0],
        N::Not | N::Negate | N::Length | N::IsEmpty | N::Sum | N::Average | N::Minimum | N::Maximum => &[0],
        N::StrLength | N::NameOf | N::LocalNameOf | N::NamespaceUriOf | N::PrefixOf => &[0],
        N::XPathNodeValue | N::XsltGenerateId | N::TypeAssert | N::IsType | N::XsltConvert => &[0],
        N::Content | N::Parent | N::Root | N::Descendant | N::DescendantOrSelf | N::Ancestor => &[0],
        N::AncestorOrSelf | N::Preceding | N::FollowingSibling | N::PrecedingSibling => &[0],
        N::XPathFollowing | N::XPathPreceding | N::XPathNamespace | N::Attribute => &[0],
        N::Add | N::Subtract | N::Multiply | N::Divide | N::Modulo => &[0, 1],
        N::Eq | N::Ne | N::Lt | N::Le | N::Gt | N::Ge | N::Is | N::Before | N::After => &[0, 1],
        N::Union | N::Intersection | N::Difference | N::NodeRange | N::StrParseQName => &[0, 1],
        _ => &[],
    }
}

impl Optimizer<'_> {
    /// Replace an operator whose strict operand has the bottom type with
    /// `Nop(operand)`. Loops, filters and sorts test their iterator's source.
    pub(super) fn fold_none(&mut self, id: NodeId) -> Option<NodeId> {
        let t = self.nt(id);
        let operand = strict_operands(t).iter().find_map(|&index| {
            let child = self.child(id, index);
            let operand = if matches!(t, NodeType::Loop | NodeType::Filter | NodeType::Sort) {
                self.child(child, 0)
            } else {
                child
            };
            self.ty(operand).is_none().then_some(operand)
        })?;
        self.applied("fold-none", id);
        Some(self.graph.make(NodeType::Nop, &[operand]))
    }

    pub(super) fn rewrite_nop(&mut self, id: NodeId) -> Option<NodeId> {
        let inner = self.child(id, 0);
        if self.nt(inner) == NodeType::Nop {
            self.applied("nop-nop", id);
            return Some(inner);
        }
        None
    }

    pub(super) fn rewrite_negate(&mut self, id: NodeId) -> Option<NodeId> {
        let operand = self.child(id, 0);
        if let Some(folded) = self.lit(operand).and_then(fold_negate) {
            self.applied("fold-negate", id);
            return Some(self.graph.literal_value(folded));
        }
        if self.nt(operand) == NodeType::Negate {
            self.applied("negate-negate", id);
            return Some(self.child(operand, 0));
        }
        None
    }

    pub(super) fn rewrite_arithmetic(&mut self, id: NodeId) -> Option<NodeId> {
        let t = self.nt(id);
        let (left, right) = (self.child(id, 0), self.child(id, 1));
        if let (Some(a), Some(b)) = (self.lit(left), self.lit(right))
            && let Some(folded) = fold_arithmetic(t, a, b)
        {
            self.applied("fold-arithmetic", id);
            return Some(self.graph.literal_value(folded));
        }
        if t.is_commutative() && self.is_literal(left) && !self.is_literal(right) {
            self.applied("literal-right", id);
            return Some(self.graph.binary(t, right, left));
        }
        None
    }

    pub(super) fn rewrite_comparison(&mut self, id: NodeId) -> Option<NodeId> {
        let t = self.nt(id);
        let (left, right) = (self.child(id, 0), self.child(id, 1));
        if let (Some(a), Some(b)) = (self.lit(left), self.lit(right))
            && let Some(outcome) = fold_comparison(t, a, b)
        {
            self.applied("fold-comparison", id);
            return Some(self.graph.boolean(outcome));
        }
        if let (Some(a), Some(b)) = (self.bool_literal(left), self.bool_literal(right))
            && matches!(t, NodeType::Eq | NodeType::Ne)
        {
            self.applied("fold-boolean-comparison", id);
            return Some(self.graph.boolean((a == b) == (t == NodeType::Eq)));
        }
        if self.is_literal(left) && !self.is_literal(right)
            && let Some(mirrored) = t.mirrored()
        {
            self.applied("mirror-comparison", id);
            return Some(self.graph.binary(mirrored, right, left));
        }
        if matches!(t, NodeType::Eq | NodeType::Ne)
            && self.nt(left) == NodeType::XsltGenerateId
            && self.nt(right) == NodeType::XsltGenerateId
        {
            let (a, b) = (self.child(left, 0), self.child(right, 0));
            if self.ty(a).is_singleton() && self.ty(a).is_node() && self.ty(b).is_singleton() && self.ty(b).is_node() {
                self.applied("generate-id-identity", id);
                let same = self.graph.binary(NodeType::Is, a, b);
                return Some(if t == NodeType::Eq { same } else { self.graph.unary(NodeType::Not, same) });
            }
        }
        if t == NodeType::Eq {
            return self.rewrite_muenchian(id);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(NodeType::Add, Literal::Int32(2), Literal::Int32(3), Some(Literal::Int32(5)))]
    #[case(NodeType::Add, Literal::Int32(i32::MAX), Literal::Int32(1), None)]
    #[case(NodeType::Divide, Literal::Int64(7), Literal::Int64(0), None)]
    #[case(NodeType::Modulo, Literal::Int32(i32::MIN), Literal::Int32(-1), None)]
    #[case(NodeType::Multiply, Literal::Int32(4), Literal::Int64(5), Some(Literal::Int64(20)))]
    #[case(NodeType::Divide, Literal::Double(1.0), Literal::Double(0.0), Some(Literal::Double(f64::INFINITY)))]
    #[case(NodeType::Subtract, Literal::Decimal(Decimal::new(15, 1)), Literal::Int32(1), Some(Literal::Decimal(Decimal::new(5, 1))))]
    #[case(NodeType::Add, Literal::String("1".into()), Literal::Int32(1), None)]
    fn arithmetic(#[case] op: NodeType, #[case] a: Literal, #[case] b: Literal, #[case] expected: Option<Literal>) {
        assert_eq!(fold_arithmetic(op, &a, &b), expected);
    }

    #[rstest]
    #[case(NodeType::Eq, Literal::Double(f64::NAN), Literal::Double(f64::NAN), Some(false))]
    #[case(NodeType::Ne, Literal::Double(f64::NAN), Literal::Int32(1), Some(true))]
    #[case(NodeType::Lt, Literal::Int32(1), Literal::Double(1.5), Some(true))]
    #[case(NodeType::Lt, Literal::String("Z".into()), Literal::String("a".into()), Some(true))]
    #[case(NodeType::Lt, Literal::String("\u{ff61}".into()), Literal::String("\u{1f600}".into()), Some(false))]
    #[case(NodeType::Lt, Literal::QName(xslt_ir::QName::local("a")), Literal::QName(xslt_ir::QName::local("b")), None)]
    #[case(NodeType::Eq, Literal::String("1".into()), Literal::Int32(1), None)]
    fn comparison(#[case] op: NodeType, #[case] a: Literal, #[case] b: Literal, #[case] expected: Option<bool>) {
        assert_eq!(fold_comparison(op, &a, &b), expected);
    }

    #[rstest]
    #[case(Literal::String(" 12.5 ".into()), XmlType::DOUBLE, Some(Literal::Double(12.5)))]
    #[case(Literal::Double(3.0), XmlType::STRING, Some(Literal::String("3".into())))]
    #[case(Literal::Double(0.1), XmlType::STRING, None)]
    #[case(Literal::Int64(1 << 40), XmlType::INT, None)]
    #[case(Literal::Double(7.0), XmlType::INTEGER, Some(Literal::Int64(7)))]
    fn conversion(#[case] lit: Literal, #[case] target: XmlType, #[case] expected: Option<Literal>) {
        assert_eq!(fold_conversion(&lit, target), expected);
    }

    #[rstest]
    fn malformed_number_is_nan() {
        assert!(string_to_double("1e5").is_nan());
        assert!(string_to_double("-").is_nan());
        assert_eq!(string_to_double("-.5"), -0.5);
    }
}
