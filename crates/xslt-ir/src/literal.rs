use crate::names::QName;
use crate::types::XmlType;
use chrono::{DateTime, FixedOffset};
use compact_str::CompactString;
use core::fmt;
use rust_decimal::Decimal;

/// Value carried by a literal node.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(CompactString),
    Int32(i32),
    Int64(i64),
    Double(f64),
    Decimal(Decimal),
    QName(QName),
    Type(XmlType),
    DateTime(DateTime<FixedOffset>),
}

impl Literal {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Literal::Int32(v) => Some(i64::from(*v)),
            Literal::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_qname(&self) -> Option<&QName> {
        match self {
            Literal::QName(q) => Some(q),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<XmlType> {
        match self {
            Literal::Type(t) => Some(*t),
            _ => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => write!(f, "{s:?}"),
            Literal::Int32(v) => write!(f, "{v}"),
            Literal::Int64(v) => write!(f, "{v}L"),
            Literal::Double(v) => write!(f, "{v:?}"),
            Literal::Decimal(v) => write!(f, "{v}m"),
            Literal::QName(q) => write!(f, "{q}"),
            Literal::Type(t) => write!(f, "{t}"),
            Literal::DateTime(d) => write!(f, "{}", d.to_rfc3339()),
        }
    }
}
