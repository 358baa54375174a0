//! Row validation.
//!
//! A row is valid when its trimmed identifier is non-empty. Valid rows
//! come out trimmed; rejected rows keep their raw values for the error
//! artifact.

use csv::ByteRecord;

use crate::db::product_repo::ProductRecord;

/// A data row as read from the file, before any trimming.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    pub identifier: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Valid(ProductRecord),
    Rejected(RawRow),
}

pub fn validate(raw: RawRow) -> RowOutcome {
    let identifier = raw.identifier.trim();
    if identifier.is_empty() {
        return RowOutcome::Rejected(raw);
    }

    RowOutcome::Valid(ProductRecord {
        identifier: identifier.to_string(),
        name: raw.name.trim().to_string(),
        description: raw.description.trim().to_string(),
    })
}

/// Column positions resolved from the header row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnMap {
    identifier: Option<usize>,
    name: Option<usize>,
    description: Option<usize>,
}

impl ColumnMap {
    /// Header names match ASCII case-insensitively. `sku` is accepted
    /// when there is no `identifier` column.
    pub fn from_headers(headers: &ByteRecord) -> Self {
        let find = |wanted: &[u8]| headers.iter().position(|h| h.eq_ignore_ascii_case(wanted));
        Self {
            identifier: find(b"identifier").or_else(|| find(b"sku")),
            name: find(b"name"),
            description: find(b"description"),
        }
    }

    pub fn has_identifier(&self) -> bool {
        self.identifier.is_some()
    }

    /// Missing columns and short rows read as empty strings.
    pub fn raw_row(&self, record: &ByteRecord) -> RawRow {
        let field = |idx: Option<usize>| {
            idx.and_then(|i| record.get(i))
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_default()
        };
        RawRow {
            identifier: field(self.identifier),
            name: field(self.name),
            description: field(self.description),
        }
    }
}
