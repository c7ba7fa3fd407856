//! Static types attached to every IR node.
//!
//! A type is a prime item type plus a cardinality. Node types additionally
//! record whether the sequence is known to be in document order without
//! duplicates, which the optimizer uses to seed doc-order facts.

use bitflags::bitflags;
use core::fmt;
use core::str::FromStr;

bitflags! {
    /// Set of possible sequence lengths: zero, exactly one, or two and more.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Cardinality: u8 {
        const ZERO = 0b001;
        const ONE = 0b010;
        const MORE = 0b100;
    }
}

impl Cardinality {
    /// No value is ever produced (the expression always fails).
    pub const NONE: Self = Self::empty();
    pub const ZERO_OR_ONE: Self = Self::ZERO.union(Self::ONE);
    pub const NOT_ONE: Self = Self::ZERO.union(Self::MORE);
    pub const ONE_OR_MORE: Self = Self::ONE.union(Self::MORE);
    pub const ZERO_OR_MORE: Self = Self::ZERO.union(Self::ONE).union(Self::MORE);

    pub fn is_none(self) -> bool {
        self.is_empty()
    }

    pub fn is_zero(self) -> bool {
        self == Self::ZERO
    }

    pub fn is_one(self) -> bool {
        self == Self::ONE
    }

    pub fn maybe_empty(self) -> bool {
        self.contains(Self::ZERO)
    }

    pub fn maybe_many(self) -> bool {
        self.contains(Self::MORE)
    }

    pub fn never_empty(self) -> bool {
        !self.is_none() && !self.maybe_empty()
    }

    pub fn at_most_one(self) -> bool {
        !self.is_none() && !self.maybe_many()
    }

    fn counts(self) -> impl Iterator<Item = u8> {
        [(Self::ZERO, 0u8), (Self::ONE, 1), (Self::MORE, 2)]
            .into_iter()
            .filter(move |(flag, _)| self.contains(*flag))
            .map(|(_, n)| n)
    }

    fn from_count(n: u8) -> Self {
        match n {
            0 => Self::ZERO,
            1 => Self::ONE,
            _ => Self::MORE,
        }
    }

    /// Cardinality of the concatenation of two sequences.
    #[must_use]
    pub fn concat(self, other: Self) -> Self {
        let mut out = Self::NONE;
        for a in self.counts() {
            for b in other.counts() {
                out |= Self::from_count(a + b);
            }
        }
        out
    }

    /// Cardinality of a loop producing `other` items per item of `self`.
    #[must_use]
    pub fn product(self, other: Self) -> Self {
        let mut out = Self::NONE;
        for a in self.counts() {
            for b in other.counts() {
                out |= Self::from_count(a * b);
            }
        }
        out
    }

    fn suffix(self) -> &'static str {
        match self.bits() {
            0b010 => "",
            0b011 => "?",
            0b110 => "+",
            0b111 => "*",
            0b100 => "{2+}",
            0b101 => "{0,2+}",
            0b001 => "{0}",
            _ => "{none}",
        }
    }
}

bitflags! {
    /// XML node kinds a node type may range over.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NodeKinds: u8 {
        const DOCUMENT = 0b000_0001;
        const ELEMENT = 0b000_0010;
        const ATTRIBUTE = 0b000_0100;
        const TEXT = 0b000_1000;
        const COMMENT = 0b001_0000;
        const PI = 0b010_0000;
        const NAMESPACE = 0b100_0000;
    }
}

impl NodeKinds {
    /// Kinds that may appear as children of an element.
    pub const CONTENT: Self = Self::ELEMENT.union(Self::TEXT).union(Self::COMMENT).union(Self::PI);
    pub const ATTR_OR_NS: Self = Self::ATTRIBUTE.union(Self::NAMESPACE);
    pub const ANY: Self = Self::all();

    fn label(self) -> &'static str {
        if self == Self::ANY {
            return "node";
        }
        if self == Self::CONTENT {
            return "content";
        }
        match self {
            k if k == Self::DOCUMENT => "document",
            k if k == Self::ELEMENT => "element",
            k if k == Self::ATTRIBUTE => "attribute",
            k if k == Self::TEXT => "text",
            k if k == Self::COMMENT => "comment",
            k if k == Self::PI => "processing-instruction",
            k if k == Self::NAMESPACE => "namespace",
            _ => "node-kinds",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomicType {
    Any,
    String,
    Boolean,
    Double,
    Decimal,
    /// 64-bit `xs:integer`.
    Integer,
    /// 32-bit `xs:int`.
    Int,
    QName,
    DateTime,
    Untyped,
}

impl AtomicType {
    pub fn is_subtype_of(self, other: AtomicType) -> bool {
        use AtomicType::*;
        match (self, other) {
            (a, b) if a == b => true,
            (_, Any) => true,
            (Int, Integer | Decimal) | (Integer, Decimal) => true,
            _ => false,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Double | Self::Decimal | Self::Integer | Self::Int)
    }

    fn join(self, other: AtomicType) -> AtomicType {
        if self.is_subtype_of(other) {
            other
        } else if other.is_subtype_of(self) {
            self
        } else {
            AtomicType::Any
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Any => "xs:anyAtomicType",
            Self::String => "xs:string",
            Self::Boolean => "xs:boolean",
            Self::Double => "xs:double",
            Self::Decimal => "xs:decimal",
            Self::Integer => "xs:integer",
            Self::Int => "xs:int",
            Self::QName => "xs:QName",
            Self::DateTime => "xs:dateTime",
            Self::Untyped => "xs:untypedAtomic",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "xs:anyAtomicType" => Self::Any,
            "xs:string" => Self::String,
            "xs:boolean" => Self::Boolean,
            "xs:double" => Self::Double,
            "xs:decimal" => Self::Decimal,
            "xs:integer" => Self::Integer,
            "xs:int" => Self::Int,
            "xs:QName" => Self::QName,
            "xs:dateTime" => Self::DateTime,
            "xs:untypedAtomic" => Self::Untyped,
            _ => return None,
        })
    }
}

/// Prime item type of a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemType {
    /// Bottom: no item can have this type.
    None,
    Node(NodeKinds),
    Atomic(AtomicType),
    Item,
}

impl ItemType {
    pub fn is_subtype_of(self, other: ItemType) -> bool {
        match (self, other) {
            (ItemType::None, _) | (_, ItemType::Item) => true,
            (ItemType::Node(a), ItemType::Node(b)) => b.contains(a),
            (ItemType::Atomic(a), ItemType::Atomic(b)) => a.is_subtype_of(b),
            _ => false,
        }
    }

    /// Whether some item could belong to both types.
    pub fn intersects(self, other: ItemType) -> bool {
        match (self, other) {
            (ItemType::None, _) | (_, ItemType::None) => false,
            (ItemType::Item, _) | (_, ItemType::Item) => true,
            (ItemType::Node(a), ItemType::Node(b)) => a.intersects(b),
            (ItemType::Atomic(a), ItemType::Atomic(b)) => a.is_subtype_of(b) || b.is_subtype_of(a),
            _ => false,
        }
    }

    #[must_use]
    pub fn join(self, other: ItemType) -> ItemType {
        match (self, other) {
            (ItemType::None, t) | (t, ItemType::None) => t,
            (ItemType::Node(a), ItemType::Node(b)) => ItemType::Node(a | b),
            (ItemType::Atomic(a), ItemType::Atomic(b)) => ItemType::Atomic(a.join(b)),
            _ => ItemType::Item,
        }
    }
}

/// Static type of an IR node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct XmlType {
    pub item: ItemType,
    pub card: Cardinality,
    /// Node sequence is in document order and free of duplicates.
    pub dod: bool,
}

const fn atomic(t: AtomicType) -> XmlType {
    XmlType { item: ItemType::Atomic(t), card: Cardinality::ONE, dod: true }
}

const fn node(kinds: NodeKinds, card: Cardinality, dod: bool) -> XmlType {
    XmlType { item: ItemType::Node(kinds), card, dod }
}

impl XmlType {
    pub const NONE: XmlType = XmlType { item: ItemType::None, card: Cardinality::NONE, dod: true };
    pub const EMPTY: XmlType = XmlType { item: ItemType::None, card: Cardinality::ZERO, dod: true };

    pub const STRING: XmlType = atomic(AtomicType::String);
    pub const BOOLEAN: XmlType = atomic(AtomicType::Boolean);
    pub const DOUBLE: XmlType = atomic(AtomicType::Double);
    pub const DECIMAL: XmlType = atomic(AtomicType::Decimal);
    pub const INTEGER: XmlType = atomic(AtomicType::Integer);
    pub const INT: XmlType = atomic(AtomicType::Int);
    pub const QNAME: XmlType = atomic(AtomicType::QName);
    pub const DATE_TIME: XmlType = atomic(AtomicType::DateTime);
    pub const ATOMIC: XmlType = atomic(AtomicType::Any);

    pub const ITEM: XmlType = XmlType { item: ItemType::Item, card: Cardinality::ONE, dod: true };
    pub const ITEM_S: XmlType = XmlType { item: ItemType::Item, card: Cardinality::ZERO_OR_MORE, dod: false };

    pub const NODE: XmlType = node(NodeKinds::ANY, Cardinality::ONE, true);
    pub const NODE_S: XmlType = node(NodeKinds::ANY, Cardinality::ZERO_OR_MORE, false);
    pub const NODE_DOD_S: XmlType = node(NodeKinds::ANY, Cardinality::ZERO_OR_MORE, true);
    pub const DOCUMENT: XmlType = node(NodeKinds::DOCUMENT, Cardinality::ONE, true);
    pub const ELEMENT: XmlType = node(NodeKinds::ELEMENT, Cardinality::ONE, true);
    pub const ELEMENT_S: XmlType = node(NodeKinds::ELEMENT, Cardinality::ZERO_OR_MORE, false);
    pub const ATTRIBUTE: XmlType = node(NodeKinds::ATTRIBUTE, Cardinality::ONE, true);
    pub const ATTRIBUTE_Q: XmlType = node(NodeKinds::ATTRIBUTE, Cardinality::ZERO_OR_ONE, true);
    pub const TEXT: XmlType = node(NodeKinds::TEXT, Cardinality::ONE, true);
    pub const COMMENT: XmlType = node(NodeKinds::COMMENT, Cardinality::ONE, true);
    pub const PI: XmlType = node(NodeKinds::PI, Cardinality::ONE, true);
    pub const NAMESPACE: XmlType = node(NodeKinds::NAMESPACE, Cardinality::ONE, true);

    /// Type with the given item and cardinality; at-most-one sequences are
    /// trivially document ordered.
    pub fn new(item: ItemType, card: Cardinality) -> Self {
        Self { item, card, dod: card.at_most_one() || card.is_zero() }
    }

    pub fn nodes(kinds: NodeKinds, card: Cardinality, dod: bool) -> Self {
        Self { item: ItemType::Node(kinds), card, dod: dod || card.at_most_one() || card.is_zero() }
    }

    pub fn is_none(&self) -> bool {
        self.card.is_none()
    }

    pub fn is_empty(&self) -> bool {
        self.card.is_zero()
    }

    pub fn is_singleton(&self) -> bool {
        self.card.is_one()
    }

    pub fn maybe_empty(&self) -> bool {
        self.card.maybe_empty()
    }

    pub fn maybe_many(&self) -> bool {
        self.card.maybe_many()
    }

    pub fn is_node(&self) -> bool {
        matches!(self.item, ItemType::Node(_))
    }

    pub fn is_atomic(&self) -> bool {
        matches!(self.item, ItemType::Atomic(_))
    }

    pub fn atomic_type(&self) -> Option<AtomicType> {
        match self.item {
            ItemType::Atomic(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.atomic_type().is_some_and(AtomicType::is_numeric)
    }

    /// Node kinds an item of this type might be.
    pub fn kinds(&self) -> NodeKinds {
        match self.item {
            ItemType::Node(k) => k,
            ItemType::Item => NodeKinds::ANY,
            _ => NodeKinds::empty(),
        }
    }

    /// Same item type, exactly one item.
    #[must_use]
    pub fn prime(&self) -> XmlType {
        XmlType { item: self.item, card: Cardinality::ONE, dod: true }
    }

    #[must_use]
    pub fn with_card(&self, card: Cardinality) -> XmlType {
        XmlType { item: self.item, card, dod: self.dod || card.at_most_one() || card.is_zero() }
    }

    #[must_use]
    pub fn with_dod(&self, dod: bool) -> XmlType {
        XmlType { dod: dod || self.card.at_most_one() || self.card.is_zero(), ..*self }
    }

    pub fn is_subtype_of(&self, other: &XmlType) -> bool {
        if self.is_none() {
            return true;
        }
        if !other.card.contains(self.card) {
            return false;
        }
        if other.dod && !self.dod {
            return false;
        }
        // An empty sequence matches any item type.
        self.is_empty() || self.item.is_subtype_of(other.item)
    }

    /// No value of `self` can ever be an instance of `other`.
    pub fn never_subtype_of(&self, other: &XmlType) -> bool {
        if self.is_none() {
            return false;
        }
        if self.card.maybe_empty() && other.card.maybe_empty() {
            return false;
        }
        let nonempty_overlap = (self.card & other.card).difference(Cardinality::ZERO);
        nonempty_overlap.is_none() || !self.item.intersects(other.item)
    }

    /// Type of a value that is either `self` or `other`.
    #[must_use]
    pub fn choice(&self, other: &XmlType) -> XmlType {
        XmlType {
            item: self.item.join(other.item),
            card: self.card | other.card,
            dod: self.dod && other.dod,
        }
    }

    /// Type of `self` followed by `other`.
    #[must_use]
    pub fn sequence(&self, other: &XmlType) -> XmlType {
        let card = self.card.concat(other.card);
        let dod = if self.is_empty() {
            other.dod
        } else if other.is_empty() {
            self.dod
        } else {
            card.at_most_one()
        };
        XmlType { item: self.item.join(other.item), card, dod }
    }
}

impl fmt::Display for XmlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return write!(f, "none");
        }
        if self.is_empty() {
            return write!(f, "empty");
        }
        match self.item {
            ItemType::None => write!(f, "none")?,
            ItemType::Item => write!(f, "item")?,
            ItemType::Atomic(t) => write!(f, "{}", t.name())?,
            ItemType::Node(k) => write!(f, "{}", k.label())?,
        }
        write!(f, "{}", self.card.suffix())?;
        if self.dod && self.is_node() && self.maybe_many() {
            write!(f, " dod")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid type syntax: {0}")]
pub struct TypeSyntaxError(pub String);

impl FromStr for XmlType {
    type Err = TypeSyntaxError;

    /// Parse forms such as `element*`, `xs:string?`, `node* dod`, `none`, `empty`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        match text {
            "none" => return Ok(XmlType::NONE),
            "empty" => return Ok(XmlType::EMPTY),
            _ => {}
        }
        let (body, dod) = match text.strip_suffix(" dod") {
            Some(b) => (b.trim_end(), true),
            None => (text, false),
        };
        let (name, card) = match body.chars().last() {
            Some('?') => (&body[..body.len() - 1], Cardinality::ZERO_OR_ONE),
            Some('*') => (&body[..body.len() - 1], Cardinality::ZERO_OR_MORE),
            Some('+') => (&body[..body.len() - 1], Cardinality::ONE_OR_MORE),
            _ => (body, Cardinality::ONE),
        };
        let item = match name {
            "item" => ItemType::Item,
            "node" => ItemType::Node(NodeKinds::ANY),
            "content" => ItemType::Node(NodeKinds::CONTENT),
            "document" => ItemType::Node(NodeKinds::DOCUMENT),
            "element" => ItemType::Node(NodeKinds::ELEMENT),
            "attribute" => ItemType::Node(NodeKinds::ATTRIBUTE),
            "text" => ItemType::Node(NodeKinds::TEXT),
            "comment" => ItemType::Node(NodeKinds::COMMENT),
            "processing-instruction" => ItemType::Node(NodeKinds::PI),
            "namespace" => ItemType::Node(NodeKinds::NAMESPACE),
            other => ItemType::Atomic(
                AtomicType::from_name(other).ok_or_else(|| TypeSyntaxError(s.to_string()))?,
            ),
        };
        Ok(XmlType::new(item, card).with_dod(dod))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Cardinality::ONE, Cardinality::ONE, Cardinality::MORE)]
    #[case(Cardinality::ZERO, Cardinality::ZERO_OR_ONE, Cardinality::ZERO_OR_ONE)]
    #[case(Cardinality::ZERO_OR_ONE, Cardinality::ONE, Cardinality::ONE_OR_MORE)]
    #[case(Cardinality::NONE, Cardinality::ONE, Cardinality::NONE)]
    fn concat_table(#[case] a: Cardinality, #[case] b: Cardinality, #[case] expected: Cardinality) {
        assert_eq!(a.concat(b), expected);
    }

    #[rstest]
    #[case(Cardinality::ONE, Cardinality::ZERO_OR_MORE, Cardinality::ZERO_OR_MORE)]
    #[case(Cardinality::ZERO, Cardinality::ONE_OR_MORE, Cardinality::ZERO)]
    #[case(Cardinality::ONE_OR_MORE, Cardinality::ONE, Cardinality::ONE_OR_MORE)]
    fn product_table(#[case] a: Cardinality, #[case] b: Cardinality, #[case] expected: Cardinality) {
        assert_eq!(a.product(b), expected);
    }

    #[rstest]
    fn subtype_respects_card_and_kinds() {
        assert!(XmlType::ELEMENT.is_subtype_of(&XmlType::NODE_S));
        assert!(!XmlType::NODE_S.is_subtype_of(&XmlType::ELEMENT));
        assert!(XmlType::INT.is_subtype_of(&XmlType::DECIMAL));
        assert!(XmlType::EMPTY.is_subtype_of(&XmlType::ELEMENT_S));
    }

    #[rstest]
    fn never_subtype_detects_disjoint_kinds() {
        assert!(XmlType::TEXT.never_subtype_of(&XmlType::ELEMENT));
        assert!(!XmlType::NODE.never_subtype_of(&XmlType::ELEMENT));
        // both may be empty, so a value could satisfy both
        assert!(!XmlType::ATTRIBUTE_Q.never_subtype_of(&XmlType::ELEMENT_S));
    }

    #[rstest]
    #[case("element*")]
    #[case("xs:string?")]
    #[case("none")]
    #[case("node* dod")]
    fn display_round_trips_through_parse(#[case] text: &str) {
        let ty: XmlType = text.parse().expect("parse");
        assert_eq!(ty.to_string(), text);
    }
}
