//! End-to-end pipeline tests: a miniature inline-markup grammar assembled
//! from the combinators and the delimited scanner, producing a tree with
//! resolver nodes, rewritten against a resolution context.

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;

use common::{ReferenceSpan, TitleBlock};
use patra::combinator::{any_but, character, Parser};
use patra::context::{Config, ResolutionContext};
use patra::document::{Block, Choice, Element, Span};
use patra::errors::ErrorKind;
use patra::rewrite::{rewrite_document, RuleSet};
use patra::scan::DelimitedText;

/// Inline syntax: plain text, `*emphasis*`, and `[name]` references that
/// stay unresolved until rewriting.
fn inline_markup() -> Parser<Vec<Span>> {
    let plain = any_but("*[").min(1).parser().map(Span::text);
    let emphasis = character('*')
        .keep_right(DelimitedText::until_char('*').fail_on("\n").parser())
        .map(|content| Span::Styled {
            style: "emphasis".to_string(),
            content: vec![Span::text(content)],
        });
    let reference = character('[')
        .keep_right(DelimitedText::until_char(']').fail_on("\n").parser())
        .map(|name| Span::Resolver(ReferenceSpan::arc(&name)));
    plain
        .or_else(emphasis)
        .or_else(reference)
        .repeated()
        .min(1)
        .parser()
}

fn paragraph() -> Parser<Block> {
    inline_markup().map(Block::Paragraph)
}

#[test]
fn parse_then_rewrite_resolves_references_and_merges_text() {
    let source = "Visit [site] for *fresh* docs and [missing].";
    let parsed = paragraph().parse_all(source).unwrap();

    let context = ResolutionContext::new(Config::new())
        .with_reference("site", Element::Span(Span::text("patra.dev")));
    let rewritten = rewrite_document(parsed, &RuleSet::new(), &context).unwrap();

    assert_eq!(
        rewritten,
        Block::Paragraph(vec![
            Span::text("Visit patra.dev for "),
            Span::Styled {
                style: "emphasis".to_string(),
                content: vec![Span::text("fresh")],
            },
            Span::text(" docs and "),
            Span::Invalid {
                message: "unknown reference 'missing'".to_string(),
            },
            Span::text("."),
        ])
    );
}

#[test]
fn unterminated_references_surface_as_diagnostics() {
    let err = paragraph().parse_all("Visit [broken").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnconsumedInput { ref remaining } if remaining.starts_with('[')));
}

#[test]
fn a_full_document_rewrite_with_config_and_selections() {
    // Template-level configuration loses to the document's on conflict.
    let template_config = Config::new()
        .with("title", "Untitled")
        .with("ref", serde_json::json!({ "support": "help@patra.dev" }));
    let document_config = Config::new().with("title", "Getting Started");
    let merged = document_config.merged_with(&template_config);

    let body = paragraph()
        .parse_all("Questions go to [support].")
        .unwrap();
    let root = Block::BlockSequence(vec![
        Block::Resolver(Arc::new(TitleBlock)),
        body,
        Block::Selection {
            name: "format".to_string(),
            choices: vec![
                Choice {
                    label: "web".to_string(),
                    content: vec![Block::paragraph("Rendered for the browser.")],
                },
                Choice {
                    label: "print".to_string(),
                    content: vec![Block::paragraph("Rendered for paper.")],
                },
            ],
        },
    ]);

    let context = ResolutionContext::new(merged).with_selection("format", "print");
    let rewritten = rewrite_document(root, &RuleSet::new(), &context).unwrap();

    assert_eq!(
        rewritten,
        Block::BlockSequence(vec![
            Block::heading(1, "Getting Started"),
            Block::Paragraph(vec![Span::text("Questions go to help@patra.dev.")]),
            Block::BlockSequence(vec![Block::paragraph("Rendered for paper.")]),
        ])
    );
}
