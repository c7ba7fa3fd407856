//! Catalog of runtime support operations called by generated code.

use crate::codegen::instr::ItemRepr;
use core::fmt;
use serde::Serialize;

/// Specialized runtime iterators. Each kind exposes the same
/// create / advance / current triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IteratorKind {
    Content,
    ElementContent,
    NodeKindContent,
    Attribute,
    AttributeContent,
    Descendant,
    DescendantOrSelf,
    ElementDescendant,
    NodeKindDescendant,
    Ancestor,
    AncestorDocOrder,
    Preceding,
    PrecedingDocOrder,
    FollowingSibling,
    PrecedingSibling,
    PrecedingSiblingDocOrder,
    XPathFollowing,
    XPathPreceding,
    XPathPrecedingDocOrder,
    Namespace,
    NodeRange,
    Id,
    Union,
    Intersect,
    Difference,
    ContentMerge,
    DescendantMerge,
    /// Walks a materialized sequence by index.
    Cached,
}

impl IteratorKind {
    /// Merge iterators are driven by feeding nodes and report a
    /// [`SetIteratorResult`] from `advance`.
    pub fn is_merge(self) -> bool {
        matches!(
            self,
            Self::Union | Self::Intersect | Self::Difference | Self::ContentMerge | Self::DescendantMerge
        )
    }
}

/// Values returned by a merge iterator's advance call, in switch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(i32)]
pub enum SetIteratorResult {
    NoMoreNodes = 0,
    InitRightIterator = 1,
    NeedLeftNode = 2,
    NeedRightNode = 3,
    HaveCurrentNode = 4,
}

/// Output sink operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WriterOp {
    StartTree,
    EndTree,
    StartRoot,
    EndRoot,
    /// Start tag from a static name index.
    StartElement,
    /// Start tag of an unprefixed name in no namespace.
    StartElementLocalName,
    /// Start tag from a runtime QName resolved against a prefix-mapping group.
    StartElementComputed,
    /// Start tag whose attributes are buffered until content starts.
    StartElementCached,
    /// Close the start tag of the current element.
    StartElementContent,
    EndElement,
    StartAttribute,
    StartAttributeComputed,
    EndAttribute,
    NamespaceDeclaration,
    String,
    RawString,
    StartComment,
    EndComment,
    StartPI,
    EndPI,
    /// Copy one item (node or atomic value) to the output.
    CopyOf,
    /// Shallow copy; returns whether content follows.
    StartCopy,
    EndCopy,
    StartSequenceConstruction,
    EndSequenceConstruction,
    StartRtfConstruction,
    EndRtfConstruction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RuntimeFn {
    IterCreate(IteratorKind),
    IterAdvance(IteratorKind),
    IterCurrent(IteratorKind),

    SeqCreate(ItemRepr),
    SeqAdd(ItemRepr),
    SeqCount,
    SeqItem(ItemRepr),
    SeqSortByKeys,
    SeqReverse,
    SeqDocOrderDistinct,

    SortKeysCreate,
    SortKeyAdd(ItemRepr),
    SortKeysFinishRow,

    ToItem(ItemRepr),
    ItemTo(ItemRepr),
    ToString(ItemRepr),
    ToDouble(ItemRepr),
    ToDecimal(ItemRepr),

    DecimalAdd,
    DecimalSub,
    DecimalMul,
    DecimalDiv,
    DecimalRem,
    DecimalNeg,
    DecimalCompare,
    StringCompare,
    QNameEqual,
    DateTimeCompare,
    StrLength,
    StrConcatCreate,
    StrConcatDelimiter,
    StrConcatAdd,
    StrConcatResult,
    ParseQName,

    AggregateCreate(ItemRepr),
    AggregateAdd(ItemRepr),
    AggregateSum(ItemRepr),
    AggregateAverage(ItemRepr),
    AggregateMinimum(ItemRepr),
    AggregateMaximum(ItemRepr),
    AggregateIsEmpty,

    ContextNode,
    Root,
    Parent,
    AttributeByName,
    NodeValue,
    IsSameNode,
    /// Pushes -1, 0 or 1 for before, same and after.
    ComparePosition,
    NameOf,
    LocalNameOf,
    NamespaceUriOf,
    PrefixOf,
    IsNodeKind,
    MatchesType,
    TypeAssert,
    GenerateId,
    DataSource,
    TextRtf,

    IndexFind,
    IndexCreate,
    IndexAdd,
    IndexRegister,
    IndexLookup,

    Write(WriterOp, Check),

    IsGlobalComputed,
    GetGlobalValue,
    SetGlobalValue,
    GetParameter,

    ThrowError,
    SendMessage,
    InvokeLateBound,
}

/// Whether a writer call validates the output state at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Check {
    Checked,
    Unchecked,
}

impl Check {
    pub fn from_needed(needed: bool) -> Self {
        if needed { Check::Checked } else { Check::Unchecked }
    }
}

impl fmt::Display for RuntimeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeFn::Write(op, Check::Checked) => write!(f, "Writer.{op:?}"),
            RuntimeFn::Write(op, Check::Unchecked) => write!(f, "Writer.{op:?}Unchecked"),
            other => write!(f, "Runtime.{other:?}"),
        }
    }
}
