// check.rs — Phase orchestration and report assembly
//
// Runs lex → parse → walk → validate over one template source and collects
// every finding as a diagnostic. Semantic phases are gated on an error-free
// parse, matching the staged front end this tool is built as.
//
// Preconditions: source is the full template text.
// Postconditions: `CheckResult` holds all diagnostics for the source plus
//                provenance; the replication report is present iff the
//                parse was clean.
// Failure modes: none — all findings are accumulated, nothing aborts.
// Side effects: none.

use chumsky::span::Span as _;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::ast::Template;
use crate::diag::{DiagLevel, Diagnostic};
use crate::parser;
use crate::replication::ReplicationReport;
use crate::walk;

// ── Provenance ───────────────────────────────────────────────────────────

/// Identifies exactly what was checked.
///
/// `source_hash`: SHA-256 of the raw template text, hex-encoded.
/// `version`: crate version from `Cargo.toml`.
#[derive(Debug, Clone, Serialize)]
pub struct Provenance {
    pub source_hash: String,
    pub version: &'static str,
}

impl Provenance {
    fn of(source: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        Provenance {
            source_hash: format!("{:x}", hasher.finalize()),
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

// ── Result ───────────────────────────────────────────────────────────────

/// Everything one check run produced.
#[derive(Debug)]
pub struct CheckResult {
    pub template: Option<Template>,
    /// Present iff the parse was clean.
    pub report: Option<ReplicationReport>,
    /// All findings in phase order: syntax, traversal, replication.
    pub diagnostics: Vec<Diagnostic>,
    pub provenance: Provenance,
}

impl CheckResult {
    /// No error-level findings anywhere.
    pub fn is_valid(&self) -> bool {
        self.diagnostics
            .iter()
            .all(|d| d.level != DiagLevel::Error)
    }

    pub fn descriptor_count(&self) -> usize {
        self.report.as_ref().map_or(0, |r| r.descriptor_count)
    }

    /// Render the result as the text report printed by the CLI.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for diag in &self.diagnostics {
            out.push_str(&diag.to_string());
            out.push('\n');
        }
        if self.is_valid() {
            out.push_str(&format!(
                "template structurally valid ({} descriptors)\n",
                self.descriptor_count()
            ));
        }
        out
    }

    /// Serializable report document for `--format json`.
    pub fn to_json(&self) -> JsonReport {
        JsonReport {
            valid: self.is_valid(),
            descriptor_count: self.descriptor_count(),
            diagnostics: self.diagnostics.iter().map(JsonDiagnostic::from).collect(),
            provenance: self.provenance.clone(),
        }
    }
}

// ── JSON document ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct JsonReport {
    pub valid: bool,
    pub descriptor_count: usize,
    pub diagnostics: Vec<JsonDiagnostic>,
    pub provenance: Provenance,
}

#[derive(Debug, Serialize)]
pub struct JsonDiagnostic {
    pub code: Option<&'static str>,
    pub level: &'static str,
    pub message: String,
    pub hint: Option<String>,
    pub start: usize,
    pub end: usize,
}

impl From<&Diagnostic> for JsonDiagnostic {
    fn from(d: &Diagnostic) -> Self {
        JsonDiagnostic {
            code: d.code.map(|c| c.0),
            level: match d.level {
                DiagLevel::Error => "error",
                DiagLevel::Warning => "warning",
            },
            message: d.message.clone(),
            hint: d.hint.clone(),
            start: d.span.start(),
            end: d.span.end(),
        }
    }
}

// ── Entry point ──────────────────────────────────────────────────────────

/// Check one template source end to end.
pub fn check_source(source: &str) -> CheckResult {
    let provenance = Provenance::of(source);
    let parse_result = parser::parse(source);

    let mut diagnostics: Vec<Diagnostic> = parse_result
        .errors
        .iter()
        .map(|e| Diagnostic::new(DiagLevel::Error, *e.span(), format!("syntax error: {e}")))
        .collect();

    // Replication accounting runs only on a clean parse: clamped or
    // missing descriptors would produce misleading counts.
    let parse_ok = parse_result.errors.is_empty();
    let (template, report) = match parse_result.template {
        Some(template) if parse_ok => {
            let result = walk::walk_template(&template);
            diagnostics.extend(result.diagnostics);
            diagnostics.extend(result.report.to_diagnostics());
            (Some(template), Some(result.report))
        }
        template => (template, None),
    };

    CheckResult {
        template,
        report,
        diagnostics,
        provenance,
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::codes;

    #[test]
    fn valid_template() {
        let result = check_source("3 01 021\n1 02 002\n0 10 004\n0 12 101\n");
        assert!(result.is_valid());
        assert_eq!(result.descriptor_count(), 4);
        assert!(result.report.is_some());
    }

    #[test]
    fn syntax_errors_gate_validation() {
        let result = check_source("1 05\n0 01 001");
        assert!(!result.is_valid());
        assert!(result.report.is_none());
        assert!(result
            .diagnostics
            .iter()
            .all(|d| d.message.starts_with("syntax error:")));
    }

    #[test]
    fn structural_errors_reported() {
        let result = check_source("1 03 002\n0 01 001");
        assert!(!result.is_valid());
        let codes_seen: Vec<_> = result.diagnostics.iter().filter_map(|d| d.code).collect();
        assert_eq!(codes_seen, vec![codes::E0002]);
    }

    #[test]
    fn walk_and_replication_findings_combine() {
        // Missing delay count and an unsatisfied replication in one run.
        let result = check_source("1 02 000\n0 01 001");
        let codes_seen: Vec<_> = result.diagnostics.iter().filter_map(|d| d.code).collect();
        assert_eq!(codes_seen, vec![codes::E0003, codes::E0002]);
    }

    #[test]
    fn provenance_is_stable() {
        let a = check_source("0 01 001\n");
        let b = check_source("0 01 001\n");
        assert_eq!(a.provenance.source_hash, b.provenance.source_hash);
        assert_ne!(
            a.provenance.source_hash,
            check_source("0 01 002\n").provenance.source_hash
        );
        assert_eq!(a.provenance.source_hash.len(), 64);
    }

    #[test]
    fn text_rendering_on_success() {
        let result = check_source("0 01 001\n0 01 002\n");
        assert_eq!(
            result.render_text(),
            "template structurally valid (2 descriptors)\n"
        );
    }

    #[test]
    fn json_document_shape() {
        let result = check_source("2 36 000\n");
        let doc = result.to_json();
        assert!(!doc.valid);
        assert_eq!(doc.diagnostics.len(), 1);
        assert_eq!(doc.diagnostics[0].code, Some("E0001"));
        assert_eq!(doc.diagnostics[0].level, "error");
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["valid"], false);
        assert_eq!(json["provenance"]["version"], env!("CARGO_PKG_VERSION"));
    }
}
