//! Compile-time constant tables referenced by generated code by index.

use compact_str::CompactString;
use serde::Serialize;
use std::collections::HashMap;
use std::hash::Hash;
use xslt_ir::{QName, XmlType};

/// Name test; `None` parts match anything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct NameFilter {
    pub local: Option<CompactString>,
    pub ns: Option<CompactString>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PrefixMapping {
    pub prefix: CompactString,
    pub ns: CompactString,
}

/// Append-only list that hands out the index of an equal existing entry.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct UniqueList<T: Eq + Hash + Clone> {
    items: Vec<T>,
    #[serde(skip)]
    lookup: HashMap<T, u32>,
}

impl<T: Eq + Hash + Clone> Default for UniqueList<T> {
    fn default() -> Self {
        Self { items: Vec::new(), lookup: HashMap::new() }
    }
}

impl<T: Eq + Hash + Clone> UniqueList<T> {
    pub fn add(&mut self, item: T) -> u32 {
        if let Some(&index) = self.lookup.get(&item) {
            return index;
        }
        let index = self.items.len() as u32;
        self.lookup.insert(item.clone(), index);
        self.items.push(item);
        index
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct NameEntry {
    pub prefix: CompactString,
    pub local: CompactString,
    pub ns: CompactString,
}

impl From<&QName> for NameEntry {
    fn from(q: &QName) -> Self {
        Self {
            prefix: CompactString::from(&*q.prefix),
            local: CompactString::from(&*q.local),
            ns: CompactString::from(&*q.ns),
        }
    }
}

/// Everything generated code loads by index at run time.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StaticData {
    pub names: UniqueList<NameEntry>,
    pub name_filters: UniqueList<NameFilter>,
    pub prefix_mappings: UniqueList<Vec<PrefixMapping>>,
    pub collations: UniqueList<CompactString>,
    pub early_bound_types: UniqueList<CompactString>,
    #[serde(serialize_with = "serialize_types")]
    pub types: UniqueList<XmlType>,
    pub global_count: u32,
    pub index_count: u32,
}

fn serialize_types<S: serde::Serializer>(types: &UniqueList<XmlType>, s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(types.items().iter().map(ToString::to_string))
}

impl StaticData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(&mut self, name: &QName) -> u32 {
        self.names.add(NameEntry::from(name))
    }

    pub fn name_filter(&mut self, local: Option<&str>, ns: Option<&str>) -> u32 {
        self.name_filters.add(NameFilter {
            local: local.map(CompactString::from),
            ns: ns.map(CompactString::from),
        })
    }

    pub fn prefix_mappings<'a>(&mut self, mappings: impl IntoIterator<Item = (&'a str, &'a str)>) -> u32 {
        let group = mappings
            .into_iter()
            .map(|(prefix, ns)| PrefixMapping { prefix: prefix.into(), ns: ns.into() })
            .collect();
        self.prefix_mappings.add(group)
    }

    pub fn collation(&mut self, uri: &str) -> u32 {
        self.collations.add(CompactString::from(uri))
    }

    pub fn early_bound_type(&mut self, type_name: &str) -> u32 {
        self.early_bound_types.add(CompactString::from(type_name))
    }

    pub fn xml_type(&mut self, ty: XmlType) -> u32 {
        self.types.add(ty)
    }

    /// Reserve a slot for a lazily computed global value.
    pub fn global_slot(&mut self) -> u32 {
        self.global_count += 1;
        self.global_count - 1
    }

    /// Reserve an id for a runtime-cached equality index.
    pub fn index_id(&mut self) -> u32 {
        self.index_count += 1;
        self.index_count - 1
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn names_deduplicate_by_value() {
        let mut data = StaticData::new();
        let a = data.name(&QName::new("p", "item", "urn:x"));
        let b = data.name(&QName::new("p", "item", "urn:x"));
        let c = data.name(&QName::local("item"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(data.names.len(), 2);
    }

    #[rstest]
    fn slots_are_sequential() {
        let mut data = StaticData::new();
        assert_eq!(data.global_slot(), 0);
        assert_eq!(data.global_slot(), 1);
        assert_eq!(data.global_count, 2);
    }

    #[rstest]
    fn blob_lists_types_textually() {
        let mut data = StaticData::new();
        data.xml_type(XmlType::ELEMENT_S);
        data.collation("http://www.w3.org/2005/xpath-functions/collation/codepoint");
        let json = data.to_json().expect("json");
        assert!(json.contains("\"element*\""));
        assert!(json.contains("codepoint"));
    }
}
