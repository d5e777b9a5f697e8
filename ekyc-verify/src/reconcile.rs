//! Dual-source extraction reconciliation
//!
//! Two recognition providers with different accuracy profiles extract the
//! same document; `merge` folds both field-level results into one
//! canonical record. The merge is deliberately lossy (no per-field
//! provenance survives) and order-sensitive: on equal-length ties the
//! first provider wins, so `merge(a, b)` and `merge(b, a)` can differ.
//! Downstream validation and persistence operate on the single merged
//! record per user.
//!
//! No I/O happens here; both inputs are already-fetched extraction maps.

use crate::validation::is_document_number_shaped;
use serde::{Deserialize, Serialize};

/// Field-level extraction result for one identity document
///
/// Doubles as the reconciled record: the merge output has the same shape
/// as its inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFields {
    pub document_number: Option<String>,
    pub full_name: Option<String>,
    pub guardian_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub issue_date: Option<String>,
    pub expiry_date: Option<String>,
}

impl DocumentFields {
    /// True when no field carries a usable value
    pub fn is_empty(&self) -> bool {
        [
            &self.document_number,
            &self.full_name,
            &self.guardian_name,
            &self.date_of_birth,
            &self.gender,
            &self.address,
            &self.issue_date,
            &self.expiry_date,
        ]
        .iter()
        .all(|f| non_empty(f.as_deref()).is_none())
    }
}

/// Merge two independent extractions of the same document
///
/// Field-by-field policy, applied independently per field and in this
/// exact order:
/// 1. exactly one provider returned a non-empty value: take it;
/// 2. both non-empty, document-number field: prefer the value matching
///    the canonical pattern; both or neither matching falls back to the
///    primary provider (fixed precedence, a deterministic tie-break, not
///    an accuracy judgment);
/// 3. both non-empty, any other field: prefer the longer string; ties
///    keep the primary provider's value;
/// 4. both empty: None.
pub fn merge(primary: &DocumentFields, secondary: &DocumentFields) -> DocumentFields {
    DocumentFields {
        document_number: merge_document_number(
            primary.document_number.as_deref(),
            secondary.document_number.as_deref(),
        ),
        full_name: merge_text(primary.full_name.as_deref(), secondary.full_name.as_deref()),
        guardian_name: merge_text(
            primary.guardian_name.as_deref(),
            secondary.guardian_name.as_deref(),
        ),
        date_of_birth: merge_text(
            primary.date_of_birth.as_deref(),
            secondary.date_of_birth.as_deref(),
        ),
        gender: merge_text(primary.gender.as_deref(), secondary.gender.as_deref()),
        address: merge_text(primary.address.as_deref(), secondary.address.as_deref()),
        issue_date: merge_text(primary.issue_date.as_deref(), secondary.issue_date.as_deref()),
        expiry_date: merge_text(
            primary.expiry_date.as_deref(),
            secondary.expiry_date.as_deref(),
        ),
    }
}

/// Empty and whitespace-only strings count as "provider returned nothing"
fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn merge_text(primary: Option<&str>, secondary: Option<&str>) -> Option<String> {
    match (non_empty(primary), non_empty(secondary)) {
        (Some(p), None) => Some(p.to_string()),
        (None, Some(s)) => Some(s.to_string()),
        // Longer wins as a proxy for completeness; ties keep primary.
        // Length is counted in characters, not bytes, so multi-byte
        // scripts compare the same as ASCII.
        (Some(p), Some(s)) => {
            if s.chars().count() > p.chars().count() {
                Some(s.to_string())
            } else {
                Some(p.to_string())
            }
        }
        (None, None) => None,
    }
}

fn merge_document_number(primary: Option<&str>, secondary: Option<&str>) -> Option<String> {
    match (non_empty(primary), non_empty(secondary)) {
        (Some(p), None) => Some(p.to_string()),
        (None, Some(s)) => Some(s.to_string()),
        (Some(p), Some(s)) => {
            let p_matches = is_document_number_shaped(p);
            let s_matches = is_document_number_shaped(s);
            if s_matches && !p_matches {
                Some(s.to_string())
            } else {
                Some(p.to_string())
            }
        }
        (None, None) => None,
    }
}
