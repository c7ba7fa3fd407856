//! Node-type catalog.
//!
//! Every tag carries its group and its child arity in one table, so
//! classification never depends on the declaration order of the variants.

use core::fmt;
use core::str::FromStr;

/// Named classification of node types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeGroup {
    Root,
    List,
    Special,
    Iterator,
    Literal,
    Boolean,
    Control,
    Collection,
    Arithmetic,
    String,
    Comparison,
    NodeComparison,
    LoopSort,
    Function,
    Axis,
    Constructor,
    NodeProperty,
    TypeOperator,
    XPath,
    Xslt,
}

/// Number of children a node of a given type carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Fixed(u8),
    /// Any number of children (list nodes and sequences).
    List,
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Fixed(n) => count == n as usize,
            Arity::List => true,
        }
    }
}

macro_rules! node_types {
    ($($variant:ident => $group:ident, $arity:expr;)*) => {
        /// Tag of an IR node.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum NodeType {
            $($variant,)*
        }

        impl NodeType {
            pub const ALL: &'static [NodeType] = &[$(NodeType::$variant,)*];

            pub fn name(self) -> &'static str {
                match self {
                    $(NodeType::$variant => stringify!($variant),)*
                }
            }

            pub fn group(self) -> NodeGroup {
                match self {
                    $(NodeType::$variant => NodeGroup::$group,)*
                }
            }

            pub fn arity(self) -> Arity {
                match self {
                    $(NodeType::$variant => $arity,)*
                }
            }
        }
    };
}

use Arity::{Fixed, List};

node_types! {
    // children: functions, globals, parameters, root expression
    QilExpression => Root, Fixed(4);
    FunctionList => List, List;
    GlobalVariableList => List, List;
    GlobalParameterList => List, List;
    ActualParameterList => List, List;
    FormalParameterList => List, List;
    SortKeyList => List, List;
    BranchList => List, List;

    OptimizeBarrier => Special, Fixed(1);
    Unknown => Special, Fixed(0);
    DataSource => Special, Fixed(2);
    Nop => Special, Fixed(1);
    Error => Special, Fixed(1);
    Warning => Special, Fixed(1);

    For => Iterator, Fixed(1);
    Let => Iterator, Fixed(1);
    Parameter => Iterator, Fixed(1);
    PositionOf => Iterator, Fixed(1);

    True => Literal, Fixed(0);
    False => Literal, Fixed(0);
    LiteralString => Literal, Fixed(0);
    LiteralInt32 => Literal, Fixed(0);
    LiteralInt64 => Literal, Fixed(0);
    LiteralDouble => Literal, Fixed(0);
    LiteralDecimal => Literal, Fixed(0);
    LiteralQName => Literal, Fixed(0);
    LiteralType => Literal, Fixed(0);
    LiteralDateTime => Literal, Fixed(0);

    And => Boolean, Fixed(2);
    Or => Boolean, Fixed(2);
    Not => Boolean, Fixed(1);
    Conditional => Control, Fixed(3);
    // children: selector, branch list
    Choice => Control, Fixed(2);

    Length => Collection, Fixed(1);
    Sequence => Collection, List;
    Union => Collection, Fixed(2);
    Intersection => Collection, Fixed(2);
    Difference => Collection, Fixed(2);
    Sum => Collection, Fixed(1);
    Average => Collection, Fixed(1);
    Minimum => Collection, Fixed(1);
    Maximum => Collection, Fixed(1);

    Negate => Arithmetic, Fixed(1);
    Add => Arithmetic, Fixed(2);
    Subtract => Arithmetic, Fixed(2);
    Multiply => Arithmetic, Fixed(2);
    Divide => Arithmetic, Fixed(2);
    Modulo => Arithmetic, Fixed(2);

    StrLength => String, Fixed(1);
    // children: delimiter, values
    StrConcat => String, Fixed(2);
    StrParseQName => String, Fixed(2);

    Eq => Comparison, Fixed(2);
    Ne => Comparison, Fixed(2);
    Lt => Comparison, Fixed(2);
    Le => Comparison, Fixed(2);
    Gt => Comparison, Fixed(2);
    Ge => Comparison, Fixed(2);
    Is => NodeComparison, Fixed(2);
    Before => NodeComparison, Fixed(2);
    After => NodeComparison, Fixed(2);

    // children: binding iterator, body
    Loop => LoopSort, Fixed(2);
    // children: binding iterator, predicate
    Filter => LoopSort, Fixed(2);
    // children: binding iterator, sort key list
    Sort => LoopSort, Fixed(2);
    // children: key, collation
    SortKey => LoopSort, Fixed(2);
    DocOrderDistinct => LoopSort, Fixed(1);

    // children: formal parameters, body
    Function => Function, Fixed(2);
    // children: function reference, actual parameters
    Invoke => Function, Fixed(2);

    Content => Axis, Fixed(1);
    // children: context, name
    Attribute => Axis, Fixed(2);
    Parent => Axis, Fixed(1);
    Root => Axis, Fixed(1);
    XmlContext => Axis, Fixed(0);
    Descendant => Axis, Fixed(1);
    DescendantOrSelf => Axis, Fixed(1);
    Ancestor => Axis, Fixed(1);
    AncestorOrSelf => Axis, Fixed(1);
    Preceding => Axis, Fixed(1);
    FollowingSibling => Axis, Fixed(1);
    PrecedingSibling => Axis, Fixed(1);
    NodeRange => Axis, Fixed(2);
    // children: context, id values
    Deref => Axis, Fixed(2);

    // children: name, content
    ElementCtor => Constructor, Fixed(2);
    // children: name, value
    AttributeCtor => Constructor, Fixed(2);
    CommentCtor => Constructor, Fixed(1);
    // children: target, value
    PICtor => Constructor, Fixed(2);
    TextCtor => Constructor, Fixed(1);
    RawTextCtor => Constructor, Fixed(1);
    DocumentCtor => Constructor, Fixed(1);
    // children: prefix, uri
    NamespaceDecl => Constructor, Fixed(2);
    // children: content, base uri
    RtfCtor => Constructor, Fixed(2);

    NameOf => NodeProperty, Fixed(1);
    LocalNameOf => NodeProperty, Fixed(1);
    NamespaceUriOf => NodeProperty, Fixed(1);
    PrefixOf => NodeProperty, Fixed(1);

    // children: expression, type literal
    TypeAssert => TypeOperator, Fixed(2);
    IsType => TypeOperator, Fixed(2);
    IsEmpty => TypeOperator, Fixed(1);

    XPathNodeValue => XPath, Fixed(1);
    XPathFollowing => XPath, Fixed(1);
    XPathPreceding => XPath, Fixed(1);
    XPathNamespace => XPath, Fixed(1);

    XsltGenerateId => Xslt, Fixed(1);
    // children: node, content
    XsltCopy => Xslt, Fixed(2);
    XsltCopyOf => Xslt, Fixed(1);
    // children: expression, target type literal
    XsltConvert => Xslt, Fixed(2);
    // children: name, actual parameters
    XsltInvokeLateBound => Xslt, Fixed(2);
    XsltInvokeEarlyBound => Xslt, Fixed(2);
}

impl NodeType {
    pub fn is_literal(self) -> bool {
        self.group() == NodeGroup::Literal
    }

    /// Nodes that bind a value and may be referenced elsewhere in the tree.
    pub fn is_iterator(self) -> bool {
        matches!(self, NodeType::For | NodeType::Let | NodeType::Parameter)
    }

    pub fn is_list(self) -> bool {
        self.group() == NodeGroup::List
    }

    pub fn is_axis(self) -> bool {
        self.group() == NodeGroup::Axis
            || matches!(self, NodeType::XPathFollowing | NodeType::XPathPreceding | NodeType::XPathNamespace)
    }

    /// Axes producing nodes in reverse document order.
    pub fn is_reverse_axis(self) -> bool {
        matches!(
            self,
            NodeType::Ancestor
                | NodeType::AncestorOrSelf
                | NodeType::Preceding
                | NodeType::PrecedingSibling
                | NodeType::XPathPreceding
        )
    }

    pub fn is_constructor(self) -> bool {
        self.group() == NodeGroup::Constructor
    }

    pub fn is_arithmetic(self) -> bool {
        self.group() == NodeGroup::Arithmetic
    }

    /// Value comparisons (`=`, `!=`, `<`, `<=`, `>`, `>=`).
    pub fn is_comparison(self) -> bool {
        self.group() == NodeGroup::Comparison
    }

    pub fn is_set_op(self) -> bool {
        matches!(self, NodeType::Union | NodeType::Intersection | NodeType::Difference)
    }

    pub fn is_commutative(self) -> bool {
        matches!(self, NodeType::Add | NodeType::Multiply | NodeType::Eq | NodeType::Ne)
    }

    /// Comparison obtained by swapping the operands.
    pub fn mirrored(self) -> Option<NodeType> {
        Some(match self {
            NodeType::Eq => NodeType::Eq,
            NodeType::Ne => NodeType::Ne,
            NodeType::Lt => NodeType::Gt,
            NodeType::Le => NodeType::Ge,
            NodeType::Gt => NodeType::Lt,
            NodeType::Ge => NodeType::Le,
            _ => return None,
        })
    }

    /// Comparison whose outcome is the negation of this one.
    pub fn negated(self) -> Option<NodeType> {
        Some(match self {
            NodeType::Eq => NodeType::Ne,
            NodeType::Ne => NodeType::Eq,
            NodeType::Lt => NodeType::Ge,
            NodeType::Le => NodeType::Gt,
            NodeType::Gt => NodeType::Le,
            NodeType::Ge => NodeType::Lt,
            _ => return None,
        })
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown node type: {0}")]
pub struct UnknownNodeType(pub String);

impl FromStr for NodeType {
    type Err = UnknownNodeType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeType::ALL
            .iter()
            .copied()
            .find(|t| t.name() == s)
            .ok_or_else(|| UnknownNodeType(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn every_name_parses_back() {
        for &t in NodeType::ALL {
            assert_eq!(t.name().parse::<NodeType>(), Ok(t));
        }
    }

    #[rstest]
    #[case(NodeType::Lt, NodeType::Gt)]
    #[case(NodeType::Ge, NodeType::Le)]
    #[case(NodeType::Eq, NodeType::Eq)]
    fn mirrored_comparisons(#[case] t: NodeType, #[case] expected: NodeType) {
        assert_eq!(t.mirrored(), Some(expected));
    }

    #[rstest]
    fn groups_are_explicit() {
        assert!(NodeType::Descendant.is_axis());
        assert!(NodeType::XPathFollowing.is_axis());
        assert!(!NodeType::Is.is_comparison());
        assert!(NodeType::LiteralDecimal.is_literal());
        assert!(NodeType::Sequence.arity().accepts(5));
        assert!(!NodeType::Add.arity().accepts(1));
    }
}
