// Parser for textual BUFR template files.
//
// Parses a token stream (from the lexer) into a `Template`: one `F XX YYY`
// descriptor per line. Uses chumsky combinators.
//
// Preconditions: input is a valid token stream from `lexer::lex()`.
// Postconditions: returns a Template plus any parse errors (non-fatal).
// Failure modes: syntax and range errors produce `Rich` diagnostics;
//                parsing continues with clamped field values.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::ast::{Descriptor, Template};
use crate::lexer::Token;

/// Result of parsing: template plus any errors.
#[derive(Debug)]
pub struct ParseResult {
    pub template: Option<Template>,
    pub errors: Vec<Rich<'static, Token, SimpleSpan>>,
}

/// Parse a template source string. Lexes then parses.
///
/// Returns a `Template` (if parsing succeeded) plus any errors. Out-of-range
/// descriptor fields are reported and clamped so later descriptors still
/// parse; callers must gate semantic phases on an empty error list.
pub fn parse(source: &str) -> ParseResult {
    let lex_result = crate::lexer::lex(source);
    let len = source.len();

    // Convert lexer output to chumsky stream.
    let token_iter = lex_result.tokens.into_iter().map(|(tok, span)| {
        let cspan: SimpleSpan = (span.start..span.end).into();
        (tok, cspan)
    });
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let parser = template_parser();
    let (template, parse_errors) = parser.parse(stream).into_output_errors();

    // Merge lex errors + parse errors.
    let mut all_errors: Vec<Rich<'static, Token, SimpleSpan>> = lex_result
        .errors
        .into_iter()
        .map(|e| {
            let span: SimpleSpan = (e.span.start..e.span.end).into();
            Rich::custom(span, e.message)
        })
        .collect();
    all_errors.extend(parse_errors.into_iter().map(|e| e.into_owned()));

    ParseResult {
        template,
        errors: all_errors,
    }
}

// ── Parser builder ──

fn template_parser<'tokens, I>(
) -> impl Parser<'tokens, I, Template, extra::Err<Rich<'tokens, Token, SimpleSpan>>>
where
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    let nl = just(Token::Newline).repeated().ignored();

    // One descriptor field, range-checked against its BUFR bit width.
    // Out-of-range values are reported and clamped so the descriptor is
    // still produced; semantic phases are gated on an error-free parse.
    let field = |max: u32, what: &'static str| {
        select! { Token::Num(n) => n }
            .map_with(|n, e| (n, e.span()))
            .validate(move |(n, span): (u32, SimpleSpan), _, emitter| {
                if n > max {
                    emitter.emit(Rich::custom(
                        span,
                        format!("descriptor {what} {n} exceeds maximum {max}"),
                    ));
                }
                n.min(max)
            })
    };

    let descriptor = field(3, "F value")
        .then(field(63, "X value"))
        .then(field(255, "Y value"))
        .map_with(|((f, x), y), e| Descriptor {
            f: f as u8,
            x: x as u8,
            y: y as u16,
            span: e.span(),
        });

    // ── Template: descriptors separated by newlines ──

    nl.clone().ignore_then(
        descriptor
            .separated_by(just(Token::Newline).repeated().at_least(1))
            .allow_trailing()
            .collect::<Vec<_>>(),
    )
    .then_ignore(nl)
    .map_with(|descriptors, e| Template {
        descriptors,
        span: e.span(),
    })
}

// ── Tests ──
