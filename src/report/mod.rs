//! The report collector: a protocol decoder for the two W3C reporting
//! endpoint content types. See `collector` for the HTTP-facing state
//! machine and `csp` for the CSPReport dialect normalisation.

pub mod collector;
pub mod csp;

pub use collector::ReportCollector;
pub use csp::CspReport;

use serde_json::{Map, Value};

/// One entry of a generic `application/reports+json` array.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub report_type: String,
    pub age: u64,
    pub url: String,
    pub user_agent: String,
    pub body: ReportBody,
}

/// `Report.body`'s typed variant, resolved by consulting `type`: a
/// `csp-violation` report is decoded into a [`CspReport`]; anything else is
/// kept as the raw JSON object so a caller can project its own shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportBody {
    Csp(CspReport),
    Generic(Map<String, Value>),
}
