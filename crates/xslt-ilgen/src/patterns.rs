//! Pattern facts recorded on IR nodes by the optimizer.
//!
//! A node carries a bitset over the closed [`Pattern`] catalog plus up to
//! three arguments. Nodes without a record read a shared default derived
//! from their static type.

use std::sync::OnceLock;
use xslt_ir::{NodeId, QName, XmlType};

macro_rules! patterns {
    ($($variant:ident => [$($arg:expr),*];)*) => {
        /// Named fact that may hold for a node.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Pattern {
            $($variant,)*
        }

        impl Pattern {
            pub const ALL: &'static [Pattern] = &[$(Pattern::$variant,)*];
            pub const COUNT: usize = Self::ALL.len();

            /// Argument slots copied along with the fact by [`PatternFacts::inherit_from`].
            pub fn copied_args(self) -> &'static [usize] {
                match self {
                    $(Pattern::$variant => &[$($arg),*],)*
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $(Pattern::$variant => stringify!($variant),)*
                }
            }
        }
    };
}

/// Argument slot holding the step expression (or a filter's iterator).
pub const STEP_NODE: usize = 0;
/// Argument slot holding the input of a step or filter.
pub const STEP_INPUT: usize = 1;
pub const ELEMENT_QNAME: usize = 2;
pub const KIND_TEST_TYPE: usize = 2;
pub const POSITION_VALUE: usize = 2;
pub const INDEXED_NODES: usize = 0;
pub const KEY_EXPRESSION: usize = 1;
pub const LOOKUP_VALUE: usize = 2;
pub const DOD_STEP: usize = 2;
pub const MAX_POSITION: usize = 2;
pub const RTF_TEXT: usize = 2;

patterns! {
    Axis => [];
    DodReverse => [DOD_STEP];
    EqualityIndex => [INDEXED_NODES, KEY_EXPRESSION, LOOKUP_VALUE];
    FilterAttributeKind => [STEP_NODE, STEP_INPUT];
    FilterContentKind => [STEP_NODE, STEP_INPUT, KIND_TEST_TYPE];
    FilterElements => [STEP_NODE, STEP_INPUT, ELEMENT_QNAME];
    FilterLast => [];
    FilterPosition => [POSITION_VALUE];
    IsDocOrderDistinct => [];
    IsPositional => [];
    IsReferenced => [];
    JoinAndDod => [DOD_STEP];
    MaxPosition => [MAX_POSITION];
    MaybeSideEffects => [];
    SameDepth => [];
    SingleTextRtf => [RTF_TEXT];
    Step => [STEP_NODE, STEP_INPUT];
    TailCall => [];
}

const WORDS: usize = Pattern::COUNT.div_ceil(64);

#[derive(Debug, Clone, PartialEq)]
pub enum PatternArg {
    Node(NodeId),
    Name(QName),
    Type(XmlType),
    Int(i64),
}

/// Bitset of patterns plus their arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatternFacts {
    bits: [u64; WORDS],
    args: [Option<PatternArg>; 3],
}

impl PatternFacts {
    pub fn matches(&self, pattern: Pattern) -> bool {
        let i = pattern as usize;
        self.bits[i / 64] & (1 << (i % 64)) != 0
    }

    pub fn add(&mut self, pattern: Pattern) {
        let i = pattern as usize;
        self.bits[i / 64] |= 1 << (i % 64);
    }

    pub fn with(mut self, pattern: Pattern) -> Self {
        self.add(pattern);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|w| *w == 0)
    }

    pub fn iter(&self) -> impl Iterator<Item = Pattern> + '_ {
        Pattern::ALL.iter().copied().filter(|p| self.matches(*p))
    }

    pub fn arg(&self, slot: usize) -> Option<&PatternArg> {
        self.args[slot].as_ref()
    }

    pub fn set_arg(&mut self, slot: usize, arg: PatternArg) {
        self.args[slot] = Some(arg);
    }

    pub fn node_arg(&self, slot: usize) -> Option<NodeId> {
        match self.arg(slot) {
            Some(PatternArg::Node(id)) => Some(*id),
            _ => None,
        }
    }

    pub fn name_arg(&self, slot: usize) -> Option<&QName> {
        match self.arg(slot) {
            Some(PatternArg::Name(name)) => Some(name),
            _ => None,
        }
    }

    pub fn type_arg(&self, slot: usize) -> Option<XmlType> {
        match self.arg(slot) {
            Some(PatternArg::Type(ty)) => Some(*ty),
            _ => None,
        }
    }

    pub fn int_arg(&self, slot: usize) -> Option<i64> {
        match self.arg(slot) {
            Some(PatternArg::Int(v)) => Some(*v),
            _ => None,
        }
    }

    /// Copy `pattern` and its arguments from `source` if it holds there.
    pub fn inherit_from(&mut self, source: &PatternFacts, pattern: Pattern) {
        if !source.matches(pattern) {
            return;
        }
        self.add(pattern);
        for &slot in pattern.copied_args() {
            self.args[slot] = source.args[slot].clone();
        }
    }

    /// Facts implied by a static type alone.
    pub fn defaults_for(ty: &XmlType) -> &'static PatternFacts {
        static DEFAULTS: OnceLock<[PatternFacts; 3]> = OnceLock::new();
        let defaults = DEFAULTS.get_or_init(|| {
            [
                PatternFacts::default(),
                PatternFacts::default().with(Pattern::IsDocOrderDistinct),
                PatternFacts::default().with(Pattern::IsDocOrderDistinct).with(Pattern::SameDepth),
            ]
        });
        if !ty.is_node() {
            &defaults[0]
        } else if !ty.maybe_many() {
            &defaults[2]
        } else if ty.dod {
            &defaults[1]
        } else {
            &defaults[0]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn bitset_covers_whole_catalog() {
        let mut facts = PatternFacts::default();
        for &p in Pattern::ALL {
            facts.add(p);
        }
        assert_eq!(facts.iter().count(), Pattern::COUNT);
    }

    #[rstest]
    #[case(XmlType::ELEMENT, true, true)]
    #[case(XmlType::NODE_DOD_S, true, false)]
    #[case(XmlType::NODE_S, false, false)]
    #[case(XmlType::STRING, false, false)]
    fn defaults_follow_type(#[case] ty: XmlType, #[case] dod: bool, #[case] same_depth: bool) {
        let facts = PatternFacts::defaults_for(&ty);
        assert_eq!(facts.matches(Pattern::IsDocOrderDistinct), dod);
        assert_eq!(facts.matches(Pattern::SameDepth), same_depth);
    }

    #[rstest]
    fn inherit_copies_listed_args_only() {
        let mut src = PatternFacts::default().with(Pattern::MaxPosition);
        src.set_arg(MAX_POSITION, PatternArg::Int(2));
        src.set_arg(STEP_NODE, PatternArg::Int(9));
        let mut dst = PatternFacts::default();
        dst.inherit_from(&src, Pattern::MaxPosition);
        dst.inherit_from(&src, Pattern::Step);
        assert!(dst.matches(Pattern::MaxPosition));
        assert!(!dst.matches(Pattern::Step));
        assert_eq!(dst.int_arg(MAX_POSITION), Some(2));
        assert_eq!(dst.arg(STEP_NODE), None);
    }
}
