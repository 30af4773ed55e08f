//! The CSPReport normalisation: two incompatible on-wire dialects (the
//! deprecated `application/csp-report` hyphenated form, shared by CSP2 and
//! the deprecated CSP3 single-report form, and the current
//! `application/reports+json` camelCase form) projected into one typed
//! record. Grounded in `actix_web_csp`'s `process_violation_report`
//! (unwrap-one-level-if-present) and servo's reporting-endpoint field
//! naming conventions.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A CSP violation report, normalised from either wire dialect. Unknown
/// fields are discarded; missing strings become empty; missing or
/// non-numeric numbers become zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CspReport {
    pub blocked_url: String,
    pub disposition: String,
    pub document_url: String,
    pub effective_directive: String,
    pub original_policy: String,
    pub referrer: String,
    pub sample: String,
    pub status_code: u32,
    pub violated_directive: String,
    pub source_file: String,
    pub line_number: u32,
    pub column_number: u32,
}

impl CspReport {
    /// Projects a JSON object using the hyphenated field names shared by
    /// CSP2 (`{"csp-report": {...}}`) and the deprecated CSP3 single-report
    /// form (the same object with no `csp-report` wrapper).
    pub fn from_hyphenated_object(obj: &Map<String, Value>) -> Self {
        CspReport {
            blocked_url: coerce_string(obj.get("blocked-uri")),
            disposition: coerce_string(obj.get("disposition")),
            document_url: coerce_string(obj.get("document-uri")),
            effective_directive: coerce_string(obj.get("effective-directive")),
            original_policy: coerce_string(obj.get("original-policy")),
            referrer: coerce_string(obj.get("referrer")),
            sample: coerce_string(obj.get("script-sample")),
            status_code: coerce_u32(obj.get("status-code")),
            violated_directive: coerce_string(obj.get("violated-directive")),
            source_file: coerce_string(obj.get("source-file")),
            line_number: coerce_u32(obj.get("lineno").or_else(|| obj.get("line-number"))),
            column_number: coerce_u32(obj.get("colno").or_else(|| obj.get("column-number"))),
        }
    }

    /// Projects a JSON object using the camelCase field names of a CSP3
    /// report delivered through the generic `application/reports+json`
    /// envelope. `violated_directive` is back-filled from
    /// `effective_directive` for compatibility with consumers written
    /// against the deprecated dialect.
    pub fn from_camel_case_object(obj: &Map<String, Value>) -> Self {
        let effective_directive = coerce_string(obj.get("effectiveDirective"));
        CspReport {
            blocked_url: coerce_string(obj.get("blockedURL")),
            disposition: coerce_string(obj.get("disposition")),
            document_url: coerce_string(obj.get("documentURL")),
            violated_directive: effective_directive.clone(),
            effective_directive,
            original_policy: coerce_string(obj.get("originalPolicy")),
            referrer: coerce_string(obj.get("referrer")),
            sample: coerce_string(obj.get("sample")),
            status_code: coerce_u32(obj.get("statusCode")),
            source_file: coerce_string(obj.get("sourceFile")),
            line_number: coerce_u32(obj.get("lineNumber")),
            column_number: coerce_u32(obj.get("columnNumber")),
        }
    }
}

/// Missing or non-string → empty string; never panics on an unexpected JSON
/// shape.
pub(crate) fn coerce_string(value: Option<&Value>) -> String {
    value.and_then(Value::as_str).unwrap_or("").to_string()
}

/// JSON numbers arrive as floating point; negative values and non-numbers
/// map to zero.
pub(crate) fn coerce_u32(value: Option<&Value>) -> u32 {
    value
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v as u32)
        .unwrap_or(0)
}

pub(crate) fn coerce_u64(value: Option<&Value>) -> u64 {
    value
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csp2_round_trip() {
        let value: Value = serde_json::json!({"csp-report": {"blocked-uri": "x"}});
        let obj = value
            .get("csp-report")
            .and_then(Value::as_object)
            .unwrap();
        let report = CspReport::from_hyphenated_object(obj);
        assert_eq!(
            report,
            CspReport {
                blocked_url: "x".to_string(),
                ..Default::default()
            }
        );
    }

    #[test]
    fn csp3_sets_violated_directive_from_effective() {
        let value: Value =
            serde_json::json!({"blockedURL": "x", "effectiveDirective": "d"});
        let obj = value.as_object().unwrap();
        let report = CspReport::from_camel_case_object(obj);
        assert_eq!(report.blocked_url, "x");
        assert_eq!(report.effective_directive, "d");
        assert_eq!(report.violated_directive, "d");
    }

    #[test]
    fn lineno_preferred_over_line_number() {
        let value: Value = serde_json::json!({"lineno": 5, "line-number": 9});
        let obj = value.as_object().unwrap();
        assert_eq!(CspReport::from_hyphenated_object(obj).line_number, 5);

        let value: Value = serde_json::json!({"line-number": 9});
        let obj = value.as_object().unwrap();
        assert_eq!(CspReport::from_hyphenated_object(obj).line_number, 9);
    }

    #[test]
    fn negative_and_missing_numbers_coerce_to_zero() {
        let value: Value = serde_json::json!({"status-code": -1});
        let obj = value.as_object().unwrap();
        assert_eq!(CspReport::from_hyphenated_object(obj).status_code, 0);
        assert_eq!(CspReport::from_hyphenated_object(obj).line_number, 0);
    }
}
