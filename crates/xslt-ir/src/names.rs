use core::fmt;
use core::hash::{Hash, Hasher};
use string_cache::DefaultAtom;

/// Namespace bound to the `xml` prefix in every scope.
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";
/// Namespace of namespace declarations themselves.
pub const XMLNS_NS: &str = "http://www.w3.org/2000/xmlns/";
/// XML Schema datatypes namespace (used when printing atomic types).
pub const XS_NS: &str = "http://www.w3.org/2001/XMLSchema";

/// Qualified name with an interned prefix, local part and namespace URI.
///
/// Two names are equal when local part and namespace match; the prefix is
/// carried only for serialization.
#[derive(Debug, Clone)]
pub struct QName {
    pub prefix: DefaultAtom,
    pub local: DefaultAtom,
    pub ns: DefaultAtom,
}

impl QName {
    pub fn new(prefix: &str, local: &str, ns: &str) -> Self {
        Self {
            prefix: DefaultAtom::from(prefix),
            local: DefaultAtom::from(local),
            ns: DefaultAtom::from(ns),
        }
    }

    /// Name in no namespace and without prefix.
    pub fn local(local: &str) -> Self {
        Self::new("", local, "")
    }

    pub fn has_namespace(&self) -> bool {
        !self.ns.is_empty()
    }

    /// Parse `prefix:local`, `Q{ns}local` or a bare local name. A prefixed
    /// form only resolves the well-known `xml` prefix; other prefixes keep an
    /// empty namespace.
    pub fn parse(text: &str) -> Self {
        if let Some(body) = text.strip_prefix("Q{")
            && let Some((ns, local)) = body.split_once('}')
        {
            return Self::new("", local, ns);
        }
        if let Some((prefix, local)) = text.split_once(':') {
            let ns = if prefix == "xml" { XML_NS } else { "" };
            return Self::new(prefix, local, ns);
        }
        Self::local(text)
    }
}

impl PartialEq for QName {
    fn eq(&self, other: &Self) -> bool {
        self.local == other.local && self.ns == other.ns
    }
}

impl Eq for QName {}

impl Hash for QName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.local.hash(state);
        self.ns.hash(state);
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.prefix.is_empty() {
            write!(f, "{}:{}", self.prefix, self.local)
        } else if !self.ns.is_empty() {
            write!(f, "Q{{{}}}{}", self.ns, self.local)
        } else {
            write!(f, "{}", self.local)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn prefix_is_ignored_by_equality() {
        let a = QName::new("a", "item", "urn:x");
        let b = QName::new("b", "item", "urn:x");
        assert_eq!(a, b);
    }

    #[rstest]
    #[case("xml:lang", "lang", XML_NS)]
    #[case("Q{urn:x}item", "item", "urn:x")]
    #[case("plain", "plain", "")]
    fn parse_forms(#[case] text: &str, #[case] local: &str, #[case] ns: &str) {
        let q = QName::parse(text);
        assert_eq!(q.local.as_ref(), local);
        assert_eq!(q.ns.as_ref(), ns);
    }
}
