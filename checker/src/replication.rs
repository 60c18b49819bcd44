// replication.rs — Replication accounting for BUFR templates
//
// Tracks every replication descriptor as an open countdown context and
// verifies that each declared descriptor count is consumed exactly before
// the template ends. Multiple contexts can be open at once (nested
// replications); every consuming descriptor decrements all of them, and a
// context closes the instant its remaining count reaches zero. There is no
// stack discipline — closure happens only by countdown.
//
// Preconditions: events arrive in template traversal order; `finish` is
//               called exactly once after the last event.
// Postconditions: `finish` returns every structural finding for the whole
//                template, in detection order.
// Failure modes: none — malformed templates produce findings, never
//               failures; the walk always completes.
// Side effects: none.

use std::fmt;

use crate::ast::Span;
use crate::diag::{codes, DiagLevel, Diagnostic};

// ── Event contract ───────────────────────────────────────────────────────

/// One descriptor-kind event, supplied by the template walker.
///
/// `name` is the rendered descriptor text, kept for diagnostics only;
/// `count` is the declared number of descriptors the replication covers
/// (the X field, already parsed — the checker never touches raw text).
#[derive(Debug, Clone, PartialEq)]
pub enum DescriptorEvent {
    /// Fixed replication: the next `count` descriptors repeat.
    FixedReplication { name: String, count: u32 },
    /// Delayed replication: covers `count` descriptors, repeat count
    /// supplied at decode time by an absorbed delay-count descriptor.
    DelayedReplication { name: String, count: u32 },
    Element,
    Operator,
    Sequence,
    DataPresentIndicator,
    AssociatedFieldSignificance,
    /// The bit-map definition operator (2 36 000) — invalid as the first
    /// descriptor of a template.
    BitmapOperator,
    /// Marker for the generic replication rule; observational only.
    Replication,
}

// ── Open context ─────────────────────────────────────────────────────────

/// Kind of a replication context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    Fixed,
    Delayed,
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextKind::Fixed => write!(f, "fixed"),
            ContextKind::Delayed => write!(f, "delayed"),
        }
    }
}

/// One still-unsatisfied replication group.
///
/// `remaining` is signed: a delayed-replication open subtracts 2 from every
/// enclosing context, which can push a nearly-spent context below zero.
/// Such a context never reaches exactly zero and stays open until `finish`
/// reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicationContext {
    /// Ordinal index into the open list at creation time.
    pub position: usize,
    /// Rendered text of the opening descriptor.
    pub name: String,
    pub kind: ContextKind,
    /// Descriptor slots still owed to this context.
    pub remaining: i64,
    /// Source location of the opening descriptor.
    pub span: Span,
}

impl fmt::Display for ReplicationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "position {}: {} ({} replication), remaining {}",
            self.position, self.name, self.kind, self.remaining
        )
    }
}

// ── Findings ─────────────────────────────────────────────────────────────

/// A structural defect detected during the walk.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuralError {
    /// The bit-map operator opened the template.
    IllegalLeadingOperator { span: Span },
    /// One or more replication counts were never satisfied; carries a
    /// snapshot of every context still open at the end of the template.
    UnresolvedReplication(Vec<ReplicationContext>),
}

impl fmt::Display for StructuralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuralError::IllegalLeadingOperator { .. } => {
                write!(f, "bit-map operator at the beginning of template is not allowed")
            }
            StructuralError::UnresolvedReplication(contexts) => {
                write!(f, "unresolved replication(s) detected")?;
                for ctx in contexts {
                    write!(f, "\n{ctx}")?;
                }
                Ok(())
            }
        }
    }
}

// ── Checker ──────────────────────────────────────────────────────────────

/// Per-template validation state. One instance per walk; driven by
/// `observe`, read out once via `finish`.
#[derive(Debug, Default)]
pub struct ReplicationChecker {
    /// All descriptors seen so far; only consulted to detect the
    /// first-descriptor position.
    descriptor_count: usize,
    /// Most recently announced fixed replication total. Informational:
    /// mirrors the open list but gates nothing.
    pending_fixed: u32,
    /// Most recently announced delayed replication total. Informational.
    pending_delayed: u32,
    /// Open contexts in insertion order.
    open: Vec<ReplicationContext>,
    errors: Vec<StructuralError>,
}

impl ReplicationChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contexts currently awaiting descriptors, in insertion order.
    pub fn open_contexts(&self) -> &[ReplicationContext] {
        &self.open
    }

    /// Process the next descriptor-kind event.
    pub fn observe(&mut self, event: DescriptorEvent, span: Span) {
        match event {
            DescriptorEvent::FixedReplication { name, count } => {
                self.reduce_open(1);
                self.pending_fixed = count;
                self.open_context(ContextKind::Fixed, name, count, span);
                self.descriptor_count += 1;
            }
            DescriptorEvent::DelayedReplication { name, count } => {
                // The absorbed delay-count descriptor occupies a slot of
                // its own in every enclosing replication.
                self.reduce_open(2);
                self.pending_delayed = count;
                self.open_context(ContextKind::Delayed, name, count, span);
                self.descriptor_count += 1;
            }
            DescriptorEvent::Element => {
                self.descriptor_count += 1;
                if self.pending_fixed > 0 {
                    self.pending_fixed -= 1;
                }
                if self.pending_delayed > 0 {
                    self.pending_delayed -= 1;
                }
                self.reduce_open(1);
            }
            DescriptorEvent::Operator
            | DescriptorEvent::Sequence
            | DescriptorEvent::DataPresentIndicator
            | DescriptorEvent::AssociatedFieldSignificance => {
                self.descriptor_count += 1;
                self.reduce_open(1);
            }
            DescriptorEvent::BitmapOperator => {
                if self.descriptor_count == 0 {
                    self.errors
                        .push(StructuralError::IllegalLeadingOperator { span });
                }
                self.descriptor_count += 1;
                self.reduce_open(1);
            }
            DescriptorEvent::Replication => {}
        }
    }

    /// Finalize the walk: any context still open is a structural error.
    pub fn finish(mut self) -> ReplicationReport {
        if !self.open.is_empty() {
            self.errors
                .push(StructuralError::UnresolvedReplication(std::mem::take(
                    &mut self.open,
                )));
        }
        ReplicationReport {
            descriptor_count: self.descriptor_count,
            errors: self.errors,
        }
    }

    /// Subtract `units` slots from every open context and drop the ones
    /// that reach exactly zero. Removal is order-independent — contexts
    /// never interact with each other.
    fn reduce_open(&mut self, units: i64) {
        for ctx in &mut self.open {
            ctx.remaining -= units;
        }
        self.open.retain(|ctx| ctx.remaining != 0);
    }

    /// Append a new context. A declared count of zero is satisfied at
    /// creation and never tracked.
    fn open_context(&mut self, kind: ContextKind, name: String, count: u32, span: Span) {
        if count == 0 {
            return;
        }
        let position = self.open.len();
        self.open.push(ReplicationContext {
            position,
            name,
            kind,
            remaining: i64::from(count),
            span,
        });
    }
}

// ── Report ───────────────────────────────────────────────────────────────

/// Outcome of one template walk.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicationReport {
    /// Total descriptors observed (markers excluded).
    pub descriptor_count: usize,
    /// Structural findings in detection order; empty means the template
    /// nests correctly.
    pub errors: Vec<StructuralError>,
}

impl ReplicationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Ordered error-message lines. Each unresolved context produces its
    /// own line after the summary line.
    pub fn messages(&self) -> Vec<String> {
        let mut out = Vec::new();
        for error in &self.errors {
            match error {
                StructuralError::IllegalLeadingOperator { .. } => {
                    out.push(error.to_string());
                }
                StructuralError::UnresolvedReplication(contexts) => {
                    out.push("unresolved replication(s) detected".to_string());
                    out.extend(contexts.iter().map(|ctx| ctx.to_string()));
                }
            }
        }
        out
    }

    /// Render findings as coded diagnostics.
    pub fn to_diagnostics(&self) -> Vec<Diagnostic> {
        self.errors
            .iter()
            .map(|error| match error {
                StructuralError::IllegalLeadingOperator { span } => Diagnostic::new(
                    DiagLevel::Error,
                    *span,
                    "bit-map operator at the beginning of template is not allowed",
                )
                .with_code(codes::E0001)
                .with_hint("the bit-map must follow the data descriptors it applies to"),
                StructuralError::UnresolvedReplication(contexts) => {
                    let span = contexts.first().map(|c| c.span).unwrap_or_else(|| {
                        use chumsky::span::Span as _;
                        Span::new((), 0..0)
                    });
                    let mut d = Diagnostic::new(
                        DiagLevel::Error,
                        span,
                        "unresolved replication(s) detected",
                    )
                    .with_code(codes::E0002)
                    .with_hint(
                        "each replication must be followed by exactly the number of \
                         descriptors it declares",
                    );
                    for ctx in contexts {
                        d = d.with_related(
                            ctx.span,
                            format!(
                                "{} opened here ({} replication), remaining {}",
                                ctx.name, ctx.kind, ctx.remaining
                            ),
                        );
                    }
                    d
                }
            })
            .collect()
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
