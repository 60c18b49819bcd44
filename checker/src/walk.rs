// walk.rs — Template traversal
//
// Classifies each descriptor of a parsed template into the event stream
// consumed by the replication checker, in template order. A delayed
// replication absorbs the delay-count descriptor that follows it: the pair
// forms one expression, so the delay descriptor never produces a consuming
// event of its own — the checker charges enclosing contexts two slots for
// it instead.
//
// Preconditions: the template parsed without errors (field ranges hold).
// Postconditions: exactly one event per descriptor, plus one marker per
//                replication descriptor; checker finalized once.
// Failure modes: a delayed replication with no delay-count descriptor
//               produces diagnostic E0003; the walk continues.
// Side effects: none.

use crate::ast::{Descriptor, Span, Template};
use crate::diag::{codes, DiagLevel, Diagnostic};
use crate::replication::{DescriptorEvent, ReplicationChecker, ReplicationReport};

/// Outcome of walking one template.
#[derive(Debug)]
pub struct WalkResult {
    pub report: ReplicationReport,
    /// Traversal-level findings (currently only E0003).
    pub diagnostics: Vec<Diagnostic>,
}

/// Classify a template into its descriptor-kind event stream.
///
/// Returns the events in template order together with any traversal
/// diagnostics. Exposed separately from `walk_template` so the stream
/// itself can be inspected and tested.
pub fn events(template: &Template) -> (Vec<(DescriptorEvent, Span)>, Vec<Diagnostic>) {
    let mut out = Vec::with_capacity(template.descriptors.len());
    let mut diagnostics = Vec::new();

    let mut iter = template.descriptors.iter().peekable();
    while let Some(d) = iter.next() {
        if d.is_replication() {
            // The generic replication rule fires alongside the specific
            // fixed/delayed one; the marker carries no effect.
            out.push((DescriptorEvent::Replication, d.span));
            let name = d.to_string();
            let count = u32::from(d.x);
            if d.is_delayed_replication() {
                out.push((DescriptorEvent::DelayedReplication { name, count }, d.span));
                match iter.peek() {
                    Some(next) if next.is_delay_count() => {
                        // Absorbed into the delayed replication expression.
                        iter.next();
                    }
                    _ => diagnostics.push(missing_delay_count(d)),
                }
            } else {
                out.push((DescriptorEvent::FixedReplication { name, count }, d.span));
            }
        } else {
            out.push((classify(d), d.span));
        }
    }

    (out, diagnostics)
}

/// Walk a template: classify it and drive a fresh checker to completion.
pub fn walk_template(template: &Template) -> WalkResult {
    let (stream, diagnostics) = events(template);
    let mut checker = ReplicationChecker::new();
    for (event, span) in stream {
        checker.observe(event, span);
    }
    WalkResult {
        report: checker.finish(),
        diagnostics,
    }
}

/// Event for a non-replication descriptor.
fn classify(d: &Descriptor) -> DescriptorEvent {
    match d.f {
        0 if d.is_associated_field_significance() => DescriptorEvent::AssociatedFieldSignificance,
        0 if d.is_data_present_indicator() => DescriptorEvent::DataPresentIndicator,
        0 => DescriptorEvent::Element,
        2 if d.is_bitmap_operator() => DescriptorEvent::BitmapOperator,
        2 => DescriptorEvent::Operator,
        // F is two bits; the parser admits nothing above 3.
        _ => DescriptorEvent::Sequence,
    }
}

fn missing_delay_count(d: &Descriptor) -> Diagnostic {
    Diagnostic::new(
        DiagLevel::Error,
        d.span,
        format!("delayed replication {d} is not followed by a delay-count descriptor"),
    )
    .with_code(codes::E0003)
    .with_hint("insert a 0 31 YYY descriptor carrying the decode-time repeat count")
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn template(source: &str) -> Template {
        let result = parse(source);
        assert!(
            result.errors.is_empty(),
            "unexpected parse errors: {:#?}",
            result.errors
        );
        result.template.expect("expected template")
    }

    fn event_stream(source: &str) -> Vec<DescriptorEvent> {
        let (stream, diagnostics) = events(&template(source));
        assert!(diagnostics.is_empty(), "unexpected: {diagnostics:#?}");
        stream.into_iter().map(|(e, _)| e).collect()
    }

    // ── Classification ──

    #[test]
    fn element_operator_sequence() {
        assert_eq!(
            event_stream("0 01 001\n2 01 132\n3 01 021"),
            vec![
                DescriptorEvent::Element,
                DescriptorEvent::Operator,
                DescriptorEvent::Sequence,
            ]
        );
    }

    #[test]
    fn class_31_specials_classified() {
        assert_eq!(
            event_stream("0 31 021\n0 31 031"),
            vec![
                DescriptorEvent::AssociatedFieldSignificance,
                DescriptorEvent::DataPresentIndicator,
            ]
        );
    }

    #[test]
    fn bitmap_operator_distinguished() {
        assert_eq!(
            event_stream("0 01 001\n2 36 000"),
            vec![DescriptorEvent::Element, DescriptorEvent::BitmapOperator]
        );
    }

    #[test]
    fn fixed_replication_emits_marker_then_open() {
        assert_eq!(
            event_stream("1 02 003\n0 01 001\n0 01 002"),
            vec![
                DescriptorEvent::Replication,
                DescriptorEvent::FixedReplication {
                    name: "1 02 003".to_string(),
                    count: 2,
                },
                DescriptorEvent::Element,
                DescriptorEvent::Element,
            ]
        );
    }

    #[test]
    fn delayed_replication_absorbs_delay_count() {
        // 0 31 001 belongs to the delayed replication expression and must
        // not appear as an event of its own.
        assert_eq!(
            event_stream("1 02 000\n0 31 001\n0 01 001\n0 01 002"),
            vec![
                DescriptorEvent::Replication,
                DescriptorEvent::DelayedReplication {
                    name: "1 02 000".to_string(),
                    count: 2,
                },
                DescriptorEvent::Element,
                DescriptorEvent::Element,
            ]
        );
    }

    #[test]
    fn delay_count_elsewhere_is_plain_element() {
        assert_eq!(
            event_stream("0 31 001\n0 01 001"),
            vec![DescriptorEvent::Element, DescriptorEvent::Element]
        );
    }

    // ── Missing delay count ──

    #[test]
    fn missing_delay_count_reported() {
        let (stream, diagnostics) = events(&template("1 01 000\n0 01 001"));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, Some(codes::E0003));
        // The delayed open is still emitted; the element that follows is
        // processed normally.
        assert_eq!(stream.len(), 3);
    }

    // ── End-to-end walks ──

    #[test]
    fn valid_nested_template() {
        let result = walk_template(&template(
            "3 01 021\n1 05 002\n0 02 001\n1 02 000\n0 31 001\n0 10 004\n0 12 101\n0 07 004",
        ));
        assert!(result.diagnostics.is_empty());
        assert!(result.report.is_valid(), "{:?}", result.report.errors);
    }

    #[test]
    fn unsatisfied_replication_surfaces() {
        let result = walk_template(&template("1 03 002\n0 01 001"));
        assert!(!result.report.is_valid());
        assert_eq!(
            result.report.messages(),
            vec![
                "unresolved replication(s) detected".to_string(),
                "position 0: 1 03 002 (fixed replication), remaining 2".to_string(),
            ]
        );
    }

    #[test]
    fn leading_bitmap_template() {
        let result = walk_template(&template("2 36 000\n0 01 001"));
        assert_eq!(
            result.report.messages(),
            vec!["bit-map operator at the beginning of template is not allowed".to_string()]
        );
    }

    #[test]
    fn absorbed_delay_count_not_double_counted() {
        // Walked descriptors: replication + element; the absorbed delay
        // descriptor is folded into the delayed open and not re-counted.
        let result = walk_template(&template("0 01 001\n1 01 000\n0 31 001\n0 01 002"));
        assert!(result.report.is_valid());
        assert_eq!(result.report.descriptor_count, 3);
    }
}
