//! Structural and semantic document validation
//!
//! All checks run in one pass with no short-circuiting so the caller can
//! present the complete error list in a single round trip. Hard failures
//! (format, age, expiry, missing required fields) block the document
//! step; the declared-name cross match is a soft check that is reported
//! but does not flip validity.

use crate::reconcile::DocumentFields;
use chrono::{Datelike, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Canonical document-number shape: 5 digits, hyphen, 7 digits, hyphen,
/// 1 digit
fn document_number_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{5}-\d{7}-\d$").expect("valid pattern"))
}

/// Whether a candidate value has the canonical document-number shape
/// (after trimming and stripping internal spaces)
pub fn is_document_number_shaped(value: &str) -> bool {
    let cleaned: String = value.trim().replace(' ', "");
    document_number_regex().is_match(&cleaned)
}

/// Accepted day-month-year separator conventions
const DATE_FORMATS: [&str; 3] = ["%d.%m.%Y", "%d/%m/%Y", "%d-%m-%Y"];

/// Parse a document date in any of the three accepted shapes
pub fn parse_document_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

/// Outcome of a full validation pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    /// True when no hard check failed; soft name mismatches do not
    /// affect this
    pub is_valid: bool,
    /// Every failing check, hard and soft, in check order
    pub errors: Vec<String>,
}

/// Document validator with configurable age and name-match thresholds
#[derive(Debug, Clone)]
pub struct DocumentValidator {
    min_age: u32,
    name_match_threshold: f64,
}

impl DocumentValidator {
    pub fn new(min_age: u32, name_match_threshold: f64) -> Self {
        Self {
            min_age,
            name_match_threshold: name_match_threshold.clamp(0.0, 1.0),
        }
    }

    /// Validate a reconciled record against today's date
    ///
    /// `declared_name` is the name the user supplied during collection,
    /// when available; it drives the soft cross-match check.
    pub fn validate(
        &self,
        record: &DocumentFields,
        declared_name: Option<&str>,
    ) -> ValidationReport {
        self.validate_at(record, declared_name, Utc::now().date_naive())
    }

    /// Validation against an explicit "today" (deterministic tests)
    pub fn validate_at(
        &self,
        record: &DocumentFields,
        declared_name: Option<&str>,
        today: NaiveDate,
    ) -> ValidationReport {
        let mut errors = Vec::new();
        let mut hard_failures = 0usize;

        // Document number format
        match record.document_number.as_deref() {
            Some(number) if !number.trim().is_empty() => {
                if !is_document_number_shaped(number) {
                    errors.push(
                        "Invalid document number format. Should be XXXXX-XXXXXXX-X".to_string(),
                    );
                    hard_failures += 1;
                }
            }
            _ => {
                errors.push("Document number not found".to_string());
                hard_failures += 1;
            }
        }

        // Date of birth and age
        match record.date_of_birth.as_deref() {
            Some(dob_str) if !dob_str.trim().is_empty() => match parse_document_date(dob_str) {
                Some(dob) => {
                    let age = age_at(dob, today);
                    if age < self.min_age as i32 {
                        errors.push(format!(
                            "Must be at least {} years old to open an account",
                            self.min_age
                        ));
                        hard_failures += 1;
                    }
                }
                None => {
                    errors.push("Invalid date of birth format".to_string());
                    hard_failures += 1;
                }
            },
            _ => {
                errors.push("Date of birth not found".to_string());
                hard_failures += 1;
            }
        }

        // Expiry
        match record.expiry_date.as_deref() {
            Some(expiry_str) if !expiry_str.trim().is_empty() => {
                match parse_document_date(expiry_str) {
                    Some(expiry) => {
                        if expiry < today {
                            errors.push(
                                "Document has expired. Please renew your document.".to_string(),
                            );
                            hard_failures += 1;
                        }
                    }
                    None => {
                        errors.push("Invalid expiry date format".to_string());
                        hard_failures += 1;
                    }
                }
            }
            _ => {
                errors.push("Document expiry date not found".to_string());
                hard_failures += 1;
            }
        }

        // Required fields, independent of the per-field format checks
        // above (absence and format errors may both fire)
        let required: [(&str, Option<&str>); 3] = [
            ("document_number", record.document_number.as_deref()),
            ("full_name", record.full_name.as_deref()),
            ("date_of_birth", record.date_of_birth.as_deref()),
        ];
        for (field, value) in required {
            if value.map(str::trim).map_or(true, str::is_empty) {
                errors.push(format!("Required field '{}' is missing", field));
                hard_failures += 1;
            }
        }

        // Soft declared-name cross match
        if let (Some(extracted), Some(declared)) = (record.full_name.as_deref(), declared_name) {
            if !extracted.trim().is_empty() && !declared.trim().is_empty() {
                let (is_match, similarity) = self.names_match(extracted, declared);
                if !is_match {
                    errors.push(format!(
                        "Name mismatch: document shows '{}' but you provided '{}' (similarity: {:.2})",
                        extracted.trim(),
                        declared.trim(),
                        similarity
                    ));
                }
            }
        }

        ValidationReport {
            is_valid: hard_failures == 0,
            errors,
        }
    }

    /// Case-insensitive, whitespace-trimmed similarity check
    pub fn names_match(&self, a: &str, b: &str) -> (bool, f64) {
        let a_norm = a.trim().to_lowercase();
        let b_norm = b.trim().to_lowercase();
        if a_norm.is_empty() || b_norm.is_empty() {
            return (false, 0.0);
        }
        let similarity = strsim::normalized_levenshtein(&a_norm, &b_norm);
        (similarity >= self.name_match_threshold, similarity)
    }
}

/// Calendar-aware age: subtract one when today's month/day precedes the
/// birth month/day
fn age_at(dob: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - dob.year();
    if (today.month(), today.day()) < (dob.month(), dob.day()) {
        age -= 1;
    }
    age
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> DocumentValidator {
        DocumentValidator::new(18, 0.8)
    }

    fn complete_record() -> DocumentFields {
        DocumentFields {
            document_number: Some("12345-1234567-1".to_string()),
            full_name: Some("Ali Khan".to_string()),
            date_of_birth: Some("01.01.1990".to_string()),
            expiry_date: Some("01.01.2099".to_string()),
            ..Default::default()
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 27).unwrap()
    }

    #[test]
    fn test_complete_record_passes() {
        let report = validator().validate_at(&complete_record(), None, today());
        assert!(report.is_valid, "errors: {:?}", report.errors);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn test_document_number_shapes() {
        assert!(is_document_number_shaped("12345-1234567-1"));
        assert!(is_document_number_shaped(" 12345-1234567-1 "));
        assert!(!is_document_number_shaped("1234-1234567-1"));
        assert!(!is_document_number_shaped("12345123456 71"));
        assert!(!is_document_number_shaped("12345-1234567-12"));
        assert!(!is_document_number_shaped(""));
    }

    #[test]
    fn test_malformed_number_is_hard_error() {
        let mut record = complete_record();
        record.document_number = Some("1234-1234567-1".to_string());
        let report = validator().validate_at(&record, None, today());
        assert!(!report.is_valid);
        assert!(report.errors.iter().any(|e| e.contains("Invalid document number")));
    }

    #[test]
    fn test_all_three_date_separators_accepted() {
        assert!(parse_document_date("01.02.1990").is_some());
        assert!(parse_document_date("01/02/1990").is_some());
        assert!(parse_document_date("01-02-1990").is_some());
        assert!(parse_document_date("1990-02-01").is_none());
        assert!(parse_document_date("02.31.1990").is_none());
    }

    #[test]
    fn test_age_exactly_eighteen_passes() {
        let mut record = complete_record();
        record.date_of_birth = Some("27.08.2008".to_string());
        let report = validator().validate_at(&record, None, today());
        assert!(report.is_valid, "errors: {:?}", report.errors);
    }

    #[test]
    fn test_age_eighteen_minus_one_day_fails() {
        let mut record = complete_record();
        record.date_of_birth = Some("28.08.2008".to_string());
        let report = validator().validate_at(&record, None, today());
        assert!(!report.is_valid);
        assert!(report.errors.iter().any(|e| e.contains("at least 18")));
    }

    #[test]
    fn test_expired_document_fails() {
        let mut record = complete_record();
        record.expiry_date = Some("26.08.2026".to_string());
        let report = validator().validate_at(&record, None, today());
        assert!(!report.is_valid);
        assert!(report.errors.iter().any(|e| e.contains("expired")));
    }

    #[test]
    fn test_expiry_today_still_valid() {
        let mut record = complete_record();
        record.expiry_date = Some("27.08.2026".to_string());
        let report = validator().validate_at(&record, None, today());
        assert!(report.is_valid, "errors: {:?}", report.errors);
    }

    #[test]
    fn test_missing_dob_reports_both_absence_errors() {
        let mut record = complete_record();
        record.date_of_birth = None;
        let report = validator().validate_at(&record, None, today());
        assert!(!report.is_valid);
        // Absence fires as its own error and as the required-field error
        assert!(report.errors.iter().any(|e| e == "Date of birth not found"));
        assert!(report
            .errors
            .iter()
            .any(|e| e == "Required field 'date_of_birth' is missing"));
    }

    #[test]
    fn test_no_short_circuit_collects_all_errors() {
        let record = DocumentFields::default();
        let report = validator().validate_at(&record, None, today());
        assert!(!report.is_valid);
        // Number, dob, expiry absence plus three required-field errors
        assert!(report.errors.len() >= 6, "errors: {:?}", report.errors);
    }

    #[test]
    fn test_name_mismatch_is_soft() {
        let report = validator().validate_at(
            &complete_record(),
            Some("Completely Different Person"),
            today(),
        );
        // Reported with its similarity, but validity is untouched
        assert!(report.is_valid);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("Name mismatch"));
        assert!(report.errors[0].contains("similarity:"));
    }

    #[test]
    fn test_name_match_is_case_and_whitespace_insensitive() {
        let (is_match, similarity) = validator().names_match("  ALI KHAN ", "ali khan");
        assert!(is_match);
        assert!((similarity - 1.0).abs() < f64::EPSILON);
    }
}
