//! # Rewrite Rule Engine
//!
//! Generic tree rewriting: given a set of per-node-kind rules and a
//! document's [`ResolutionContext`], rewrites an entire tree in a single
//! bottom-up traversal. The engine's own transitions run before any user
//! rule, in priority order per node:
//!
//! 1. A resolver node is replaced by the result of its `resolve(context)`
//!    call, and the replacement is recursively rewritten with the same rule
//!    set before substitution - a resolver may produce another resolver or a
//!    subtree containing one. Chains are bounded by [`MAX_RESOLVE_DEPTH`].
//! 2. A choice group with a recorded selection is replaced by the content
//!    of the selected choice only; unchosen branches are discarded without
//!    evaluation, so no side effect of theirs is ever observed.
//! 3. Containers of adjacent unstyled text spans are merged into single
//!    text nodes.
//! 4. An `Unresolved` marker becomes a terminal `Invalid` placeholder
//!    embedding its message.
//! 5. Otherwise the node is kept, its children already rewritten, and the
//!    user rules are consulted: first match wins, falling through to "keep".
//!
//! Resolution failures become data (`Invalid` nodes) and never abort the
//! rewrite; only configuration errors are returned as `Err`, fatal for this
//! document but not for siblings in a batch.

use std::sync::Arc;

use serde::Serialize;

use crate::context::ResolutionContext;
use crate::document::{Block, Choice, ResolveError, Span, TemplateSpan};
use crate::errors::{ErrorReporting, PatraError};

/// Bound on resolver chains (a resolver producing a resolver, and so on).
/// Exceeding it turns the offending node into an `Invalid` placeholder - a
/// resolution failure, never a panic.
pub const MAX_RESOLVE_DEPTH: usize = 128;

// ============================================================================
// RULES
// ============================================================================

/// The verdict of a rewrite rule for one node.
#[derive(Debug, Clone, PartialEq)]
pub enum RewriteAction<T> {
    Keep,
    Replace(T),
    Remove,
}

pub type BlockRule = Arc<dyn Fn(&Block) -> Option<RewriteAction<Block>> + Send + Sync>;
pub type SpanRule = Arc<dyn Fn(&Span) -> Option<RewriteAction<Span>> + Send + Sync>;
pub type TemplateRule =
    Arc<dyn Fn(&TemplateSpan) -> Option<RewriteAction<TemplateSpan>> + Send + Sync>;

/// An ordered collection of partial rewrite rules, grouped by node kind.
///
/// A node is tested only against the rules registered for its kind, in
/// declared order; the first rule returning a verdict wins. Rule sets
/// compose additively with [`RuleSet::and`].
///
/// A replacement produced by a rule is taken as final unless it is itself a
/// resolver or unresolved marker, in which case the engine's own transitions
/// run on it so no pending node can survive a pass.
#[derive(Clone, Default)]
pub struct RuleSet {
    block_rules: Vec<BlockRule>,
    span_rules: Vec<SpanRule>,
    template_rules: Vec<TemplateRule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block_rule(
        mut self,
        rule: impl Fn(&Block) -> Option<RewriteAction<Block>> + Send + Sync + 'static,
    ) -> Self {
        self.block_rules.push(Arc::new(rule));
        self
    }

    pub fn span_rule(
        mut self,
        rule: impl Fn(&Span) -> Option<RewriteAction<Span>> + Send + Sync + 'static,
    ) -> Self {
        self.span_rules.push(Arc::new(rule));
        self
    }

    pub fn template_rule(
        mut self,
        rule: impl Fn(&TemplateSpan) -> Option<RewriteAction<TemplateSpan>> + Send + Sync + 'static,
    ) -> Self {
        self.template_rules.push(Arc::new(rule));
        self
    }

    /// Appends another rule set after this one, per node kind.
    pub fn and(mut self, other: RuleSet) -> Self {
        self.block_rules.extend(other.block_rules);
        self.span_rules.extend(other.span_rules);
        self.template_rules.extend(other.template_rules);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.block_rules.is_empty() && self.span_rules.is_empty() && self.template_rules.is_empty()
    }
}

// ============================================================================
// REWRITE TRACE
// ============================================================================

/// One engine action during a traced rewrite, for inspectability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RewriteStep {
    pub node_kind: &'static str,
    pub name: String,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StepOutcome {
    Resolved,
    Invalidated { message: String },
    Selected { choice: String },
}

// ============================================================================
// ENTRY POINTS
// ============================================================================

/// Rewrites a document tree to its final form: no resolver or unresolved
/// node is reachable from the returned root. A removed root yields an empty
/// block sequence.
pub fn rewrite_document(
    root: Block,
    rules: &RuleSet,
    context: &ResolutionContext,
) -> Result<Block, PatraError> {
    let mut rewriter = Rewriter {
        rules,
        context,
        trace: None,
    };
    Ok(rewriter
        .rewrite_block(root, 0)?
        .unwrap_or(Block::BlockSequence(Vec::new())))
}

/// Like [`rewrite_document`], also returning the ordered trace of resolver
/// substitutions, invalidations and choice selections the engine performed.
pub fn rewrite_document_traced(
    root: Block,
    rules: &RuleSet,
    context: &ResolutionContext,
) -> Result<(Block, Vec<RewriteStep>), PatraError> {
    let mut rewriter = Rewriter {
        rules,
        context,
        trace: Some(Vec::new()),
    };
    let rewritten = rewriter
        .rewrite_block(root, 0)?
        .unwrap_or(Block::BlockSequence(Vec::new()));
    Ok((rewritten, rewriter.trace.unwrap_or_default()))
}

// ============================================================================
// ENGINE
// ============================================================================

struct Rewriter<'a> {
    rules: &'a RuleSet,
    context: &'a ResolutionContext,
    trace: Option<Vec<RewriteStep>>,
}

impl<'a> Rewriter<'a> {
    fn record(&mut self, node_kind: &'static str, name: &str, outcome: StepOutcome) {
        if let Some(trace) = &mut self.trace {
            trace.push(RewriteStep {
                node_kind,
                name: name.to_string(),
                outcome,
            });
        }
    }

    fn rewrite_block(&mut self, block: Block, depth: usize) -> Result<Option<Block>, PatraError> {
        match block {
            Block::Resolver(resolver) => {
                if depth >= MAX_RESOLVE_DEPTH {
                    let message = format!(
                        "resolver '{}' exceeded the resolution depth limit of {}",
                        resolver.name(),
                        MAX_RESOLVE_DEPTH
                    );
                    self.record(
                        "block",
                        resolver.name(),
                        StepOutcome::Invalidated {
                            message: message.clone(),
                        },
                    );
                    return Ok(Some(Block::Invalid { message }));
                }
                match resolver.resolve(self.context) {
                    Ok(replacement) => {
                        self.record("block", resolver.name(), StepOutcome::Resolved);
                        self.rewrite_block(replacement, depth + 1)
                    }
                    Err(ResolveError::Missing(message)) => {
                        self.record(
                            "block",
                            resolver.name(),
                            StepOutcome::Invalidated {
                                message: message.clone(),
                            },
                        );
                        Ok(Some(Block::Invalid { message }))
                    }
                    Err(ResolveError::Config(error)) => Err(error),
                }
            }
            Block::Selection { name, mut choices } => {
                match self.context.selection(&name).map(str::to_string) {
                    Some(label) => {
                        let Some(index) = choices.iter().position(|c| c.label == label) else {
                            return Err(self.context.invalid_selection(&name, &label));
                        };
                        // Unchosen branches are dropped without evaluation.
                        let selected = choices.swap_remove(index);
                        self.record("block", &name, StepOutcome::Selected { choice: label });
                        let content = self.rewrite_blocks(selected.content, depth)?;
                        Ok(Some(Block::BlockSequence(content)))
                    }
                    None => {
                        let mut rewritten = Vec::with_capacity(choices.len());
                        for choice in choices {
                            rewritten.push(Choice {
                                label: choice.label,
                                content: self.rewrite_blocks(choice.content, depth)?,
                            });
                        }
                        self.apply_block_rules(
                            Block::Selection {
                                name,
                                choices: rewritten,
                            },
                            depth,
                        )
                    }
                }
            }
            Block::Unresolved { message } => {
                self.record(
                    "block",
                    "unresolved",
                    StepOutcome::Invalidated {
                        message: message.clone(),
                    },
                );
                Ok(Some(Block::Invalid { message }))
            }
            terminal @ Block::Invalid { .. } => Ok(Some(terminal)),
            Block::Paragraph(spans) => {
                let spans = self.rewrite_spans(spans, depth)?;
                self.apply_block_rules(Block::Paragraph(spans), depth)
            }
            Block::Heading { level, content } => {
                let content = self.rewrite_spans(content, depth)?;
                self.apply_block_rules(Block::Heading { level, content }, depth)
            }
            Block::BlockSequence(children) => {
                let children = self.rewrite_blocks(children, depth)?;
                self.apply_block_rules(Block::BlockSequence(children), depth)
            }
            Block::Template(spans) => {
                let spans = self.rewrite_template_spans(spans, depth)?;
                self.apply_block_rules(Block::Template(spans), depth)
            }
        }
    }

    fn rewrite_blocks(
        &mut self,
        blocks: Vec<Block>,
        depth: usize,
    ) -> Result<Vec<Block>, PatraError> {
        let mut rewritten = Vec::with_capacity(blocks.len());
        for block in blocks {
            if let Some(block) = self.rewrite_block(block, depth)? {
                rewritten.push(block);
            }
        }
        Ok(rewritten)
    }

    fn rewrite_span(&mut self, span: Span, depth: usize) -> Result<Option<Span>, PatraError> {
        match span {
            Span::Resolver(resolver) => {
                if depth >= MAX_RESOLVE_DEPTH {
                    let message = format!(
                        "resolver '{}' exceeded the resolution depth limit of {}",
                        resolver.name(),
                        MAX_RESOLVE_DEPTH
                    );
                    self.record(
                        "span",
                        resolver.name(),
                        StepOutcome::Invalidated {
                            message: message.clone(),
                        },
                    );
                    return Ok(Some(Span::Invalid { message }));
                }
                match resolver.resolve(self.context) {
                    Ok(replacement) => {
                        self.record("span", resolver.name(), StepOutcome::Resolved);
                        self.rewrite_span(replacement, depth + 1)
                    }
                    Err(ResolveError::Missing(message)) => {
                        self.record(
                            "span",
                            resolver.name(),
                            StepOutcome::Invalidated {
                                message: message.clone(),
                            },
                        );
                        Ok(Some(Span::Invalid { message }))
                    }
                    Err(ResolveError::Config(error)) => Err(error),
                }
            }
            Span::Unresolved { message } => {
                self.record(
                    "span",
                    "unresolved",
                    StepOutcome::Invalidated {
                        message: message.clone(),
                    },
                );
                Ok(Some(Span::Invalid { message }))
            }
            terminal @ Span::Invalid { .. } => Ok(Some(terminal)),
            text @ Span::Text { .. } => self.apply_span_rules(text, depth),
            Span::Styled { style, content } => {
                let content = self.rewrite_spans(content, depth)?;
                self.apply_span_rules(Span::Styled { style, content }, depth)
            }
        }
    }

    fn rewrite_spans(&mut self, spans: Vec<Span>, depth: usize) -> Result<Vec<Span>, PatraError> {
        let mut rewritten = Vec::with_capacity(spans.len());
        for span in spans {
            if let Some(span) = self.rewrite_span(span, depth)? {
                rewritten.push(span);
            }
        }
        Ok(merge_text_spans(rewritten))
    }

    fn rewrite_template_span(
        &mut self,
        span: TemplateSpan,
        depth: usize,
    ) -> Result<Option<TemplateSpan>, PatraError> {
        match span {
            TemplateSpan::Resolver(resolver) => {
                if depth >= MAX_RESOLVE_DEPTH {
                    let message = format!(
                        "resolver '{}' exceeded the resolution depth limit of {}",
                        resolver.name(),
                        MAX_RESOLVE_DEPTH
                    );
                    self.record(
                        "template",
                        resolver.name(),
                        StepOutcome::Invalidated {
                            message: message.clone(),
                        },
                    );
                    return Ok(Some(TemplateSpan::Invalid { message }));
                }
                match resolver.resolve(self.context) {
                    Ok(replacement) => {
                        self.record("template", resolver.name(), StepOutcome::Resolved);
                        self.rewrite_template_span(replacement, depth + 1)
                    }
                    Err(ResolveError::Missing(message)) => {
                        self.record(
                            "template",
                            resolver.name(),
                            StepOutcome::Invalidated {
                                message: message.clone(),
                            },
                        );
                        Ok(Some(TemplateSpan::Invalid { message }))
                    }
                    Err(ResolveError::Config(error)) => Err(error),
                }
            }
            TemplateSpan::Unresolved { message } => {
                self.record(
                    "template",
                    "unresolved",
                    StepOutcome::Invalidated {
                        message: message.clone(),
                    },
                );
                Ok(Some(TemplateSpan::Invalid { message }))
            }
            terminal @ TemplateSpan::Invalid { .. } => Ok(Some(terminal)),
            literal @ TemplateSpan::Literal(_) => self.apply_template_rules(literal, depth),
            TemplateSpan::Embedded { root, indent } => {
                match self.rewrite_block(*root, depth)? {
                    None => Ok(None),
                    Some(rewritten) => self.apply_template_rules(
                        TemplateSpan::Embedded {
                            root: Box::new(rewritten),
                            indent,
                        },
                        depth,
                    ),
                }
            }
        }
    }

    fn rewrite_template_spans(
        &mut self,
        spans: Vec<TemplateSpan>,
        depth: usize,
    ) -> Result<Vec<TemplateSpan>, PatraError> {
        let mut rewritten = Vec::with_capacity(spans.len());
        for span in spans {
            if let Some(span) = self.rewrite_template_span(span, depth)? {
                rewritten.push(span);
            }
        }
        Ok(tag_indentation(merge_template_literals(rewritten)))
    }

    fn apply_block_rules(
        &mut self,
        node: Block,
        depth: usize,
    ) -> Result<Option<Block>, PatraError> {
        let rules = self.rules;
        for rule in &rules.block_rules {
            match (**rule)(&node) {
                None => continue,
                Some(RewriteAction::Keep) => return Ok(Some(node)),
                Some(RewriteAction::Remove) => return Ok(None),
                Some(RewriteAction::Replace(replacement)) => {
                    return if replacement.is_pending() {
                        self.rewrite_block(replacement, depth)
                    } else {
                        Ok(Some(replacement))
                    };
                }
            }
        }
        Ok(Some(node))
    }

    fn apply_span_rules(&mut self, node: Span, depth: usize) -> Result<Option<Span>, PatraError> {
        let rules = self.rules;
        for rule in &rules.span_rules {
            match (**rule)(&node) {
                None => continue,
                Some(RewriteAction::Keep) => return Ok(Some(node)),
                Some(RewriteAction::Remove) => return Ok(None),
                Some(RewriteAction::Replace(replacement)) => {
                    return if replacement.is_pending() {
                        self.rewrite_span(replacement, depth)
                    } else {
                        Ok(Some(replacement))
                    };
                }
            }
        }
        Ok(Some(node))
    }

    fn apply_template_rules(
        &mut self,
        node: TemplateSpan,
        depth: usize,
    ) -> Result<Option<TemplateSpan>, PatraError> {
        let rules = self.rules;
        for rule in &rules.template_rules {
            match (**rule)(&node) {
                None => continue,
                Some(RewriteAction::Keep) => return Ok(Some(node)),
                Some(RewriteAction::Remove) => return Ok(None),
                Some(RewriteAction::Replace(replacement)) => {
                    return if replacement.is_pending() {
                        self.rewrite_template_span(replacement, depth)
                    } else {
                        Ok(Some(replacement))
                    };
                }
            }
        }
        Ok(Some(node))
    }
}

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Merges consecutive unstyled text spans into single text nodes. Styled or
/// otherwise marked text is never merged.
fn merge_text_spans(spans: Vec<Span>) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::with_capacity(spans.len());
    for span in spans {
        match span {
            Span::Text {
                content,
                style: None,
            } => {
                if let Some(Span::Text {
                    content: previous,
                    style: None,
                }) = merged.last_mut()
                {
                    previous.push_str(&content);
                } else {
                    merged.push(Span::Text {
                        content,
                        style: None,
                    });
                }
            }
            other => merged.push(other),
        }
    }
    merged
}

fn merge_template_literals(spans: Vec<TemplateSpan>) -> Vec<TemplateSpan> {
    let mut merged: Vec<TemplateSpan> = Vec::with_capacity(spans.len());
    for span in spans {
        match span {
            TemplateSpan::Literal(text) => {
                if let Some(TemplateSpan::Literal(previous)) = merged.last_mut() {
                    previous.push_str(&text);
                } else {
                    merged.push(TemplateSpan::Literal(text));
                }
            }
            other => merged.push(other),
        }
    }
    merged
}

/// Tags each embedded structural fragment that directly follows a literal
/// with the indentation implied by the literal's trailing whitespace, so
/// renderers can re-indent nested output. A two-element sliding window,
/// applied after all resolution; already-tagged fragments are left alone.
fn tag_indentation(spans: Vec<TemplateSpan>) -> Vec<TemplateSpan> {
    let mut tagged: Vec<TemplateSpan> = Vec::with_capacity(spans.len());
    for span in spans {
        let span = match span {
            TemplateSpan::Embedded { root, indent: None } => {
                let indent = tagged.last().and_then(trailing_indent);
                TemplateSpan::Embedded { root, indent }
            }
            other => other,
        };
        tagged.push(span);
    }
    tagged
}

/// The indentation level implied by a literal's last line, if that line is
/// pure whitespace.
fn trailing_indent(span: &TemplateSpan) -> Option<usize> {
    let TemplateSpan::Literal(text) = span else {
        return None;
    };
    let last_line = &text[text.rfind('\n')? + 1..];
    last_line
        .chars()
        .all(|c| c == ' ' || c == '\t')
        .then(|| last_line.chars().count())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unstyled_text_spans_merge() {
        let merged = merge_text_spans(vec![
            Span::text("a"),
            Span::text("b"),
            Span::styled_text("em", "c"),
            Span::text("d"),
        ]);
        assert_eq!(
            merged,
            vec![
                Span::text("ab"),
                Span::styled_text("em", "c"),
                Span::text("d"),
            ]
        );
    }

    #[test]
    fn trailing_whitespace_determines_indent() {
        let literal = TemplateSpan::Literal("<nav>\n    ".to_string());
        assert_eq!(trailing_indent(&literal), Some(4));

        let no_newline = TemplateSpan::Literal("    ".to_string());
        assert_eq!(trailing_indent(&no_newline), None);

        let non_blank_tail = TemplateSpan::Literal("<nav>\n  x ".to_string());
        assert_eq!(trailing_indent(&non_blank_tail), None);
    }

    #[test]
    fn indentation_is_tagged_after_a_literal() {
        let spans = tag_indentation(vec![
            TemplateSpan::Literal("<body>\n  ".to_string()),
            TemplateSpan::embedded(Block::paragraph("content")),
        ]);
        assert!(matches!(
            spans[1],
            TemplateSpan::Embedded {
                indent: Some(2),
                ..
            }
        ));
    }
}
