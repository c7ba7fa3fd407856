//! Construction-method and serialization-state facts.

use core::fmt;
use serde::Serialize;

/// How a node's value is produced by generated code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ConstructMethod {
    /// Pulled through the sequence interface.
    #[default]
    Iterator,
    /// Pushed directly to the output sink.
    Writer,
    /// Pulled, then each item is copied to the output sink.
    IteratorThenWriter,
    /// Pushed into a fresh sequence writer, then iterated.
    WriterThenIterator,
}

impl ConstructMethod {
    pub fn pushes_to_writer(self) -> bool {
        matches!(self, Self::Writer | Self::WriterThenIterator)
    }
}

/// Abstract position within the output stream. `Any` is the top of the
/// lattice and means the position is not statically known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum XmlState {
    #[default]
    None,
    WithinSequence,
    EnumAttrs,
    WithinContent,
    WithinAttr,
    WithinComment,
    WithinPI,
    Any,
}

impl XmlState {
    /// Least upper bound of two states.
    #[must_use]
    pub fn join(self, other: XmlState) -> XmlState {
        match (self, other) {
            (XmlState::None, s) | (s, XmlState::None) => s,
            (a, b) if a == b => a,
            _ => XmlState::Any,
        }
    }

    pub fn is_known(self) -> bool {
        !matches!(self, XmlState::None | XmlState::Any)
    }
}

impl fmt::Display for XmlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Construction facts of one node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConstructInfo {
    pub method: ConstructMethod,
    pub initial: XmlState,
    pub final_state: XmlState,
    /// State at the top of each iteration, for loops.
    pub begin_loop: XmlState,
    pub end_loop: XmlState,
    pub might_have_attributes: bool,
    pub might_have_duplicate_attributes: bool,
    pub might_have_namespaces: bool,
    pub might_have_namespaces_after_attributes: bool,
    /// The namespace this node would declare is already in scope.
    pub is_namespace_in_scope: bool,
    /// Join of the states a writer function is called in.
    pub caller_states: XmlState,
}

impl ConstructInfo {
    pub fn new(method: ConstructMethod) -> Self {
        Self { method, ..Self::default() }
    }

    /// Writing an element, text, comment or PI here needs a runtime check.
    pub fn needs_content_check(&self) -> bool {
        !matches!(self.initial, XmlState::WithinSequence | XmlState::EnumAttrs | XmlState::WithinContent)
    }

    /// Text may also go into attribute, comment and PI values.
    pub fn needs_text_check(&self) -> bool {
        !self.initial.is_known()
    }

    /// Writing an attribute or namespace here needs a runtime check.
    pub fn needs_attribute_check(&self) -> bool {
        !matches!(self.initial, XmlState::WithinSequence | XmlState::EnumAttrs)
    }

    /// Attributes must be cached until the start tag closes.
    pub fn needs_attribute_cache(&self) -> bool {
        self.might_have_duplicate_attributes || self.might_have_namespaces_after_attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(XmlState::None, XmlState::EnumAttrs, XmlState::EnumAttrs)]
    #[case(XmlState::WithinContent, XmlState::WithinContent, XmlState::WithinContent)]
    #[case(XmlState::WithinContent, XmlState::EnumAttrs, XmlState::Any)]
    #[case(XmlState::Any, XmlState::WithinSequence, XmlState::Any)]
    fn join_is_lattice_union(#[case] a: XmlState, #[case] b: XmlState, #[case] expected: XmlState) {
        assert_eq!(a.join(b), expected);
        assert_eq!(b.join(a), expected);
    }

    #[rstest]
    #[case(XmlState::EnumAttrs, false, false)]
    #[case(XmlState::WithinContent, false, true)]
    #[case(XmlState::Any, true, true)]
    #[case(XmlState::WithinAttr, true, true)]
    fn check_requirements(#[case] initial: XmlState, #[case] content: bool, #[case] attribute: bool) {
        let info = ConstructInfo { initial, ..ConstructInfo::default() };
        assert_eq!(info.needs_content_check(), content);
        assert_eq!(info.needs_attribute_check(), attribute);
    }
}
