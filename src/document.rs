//! Document tree model.
//!
//! The tree produced by parsing is polymorphic over three node capabilities:
//! blocks, spans and template spans. Each is a closed enum mixing ordinary
//! content nodes with three marker variants the rewrite engine acts on:
//!
//! - `Resolver`: not yet final; owns a `resolve(context)` operation
//!   producing the node that should replace it. Resolvers are trait objects
//!   so external node types can participate in rewriting.
//! - `Unresolved`: a failure marker carrying a human-readable message,
//!   produced when an earlier step could not supply a value.
//! - `Invalid`: the terminal diagnostic placeholder an `Unresolved` marker
//!   (or a failed resolver) becomes, rendered visibly so authors see broken
//!   references in output instead of silently losing content.
//!
//! Invariant: after a full rewrite pass, no `Resolver` or `Unresolved` node
//! is reachable from the root - only content nodes and `Invalid`
//! placeholders, which are stable.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::context::ResolutionContext;
use crate::errors::PatraError;

// ============================================================================
// RESOLVER CAPABILITY CONTRACT
// ============================================================================

/// Why a resolver could not produce its final value.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// A referenced value does not exist. Converted into a visible
    /// [`Invalid`](Block::Invalid) placeholder, never aborting the rewrite.
    #[error("unresolved reference: {0}")]
    Missing(String),
    /// A configuration lookup failed. Fatal for the document being
    /// rewritten, but not for sibling documents in a batch.
    #[error(transparent)]
    Config(#[from] PatraError),
}

/// A deferred block node. `resolve` is given the document's resolution
/// context and returns the block that should take this node's place; the
/// replacement is itself rewritten, so a resolver may legitimately produce
/// another resolver or a subtree containing one.
pub trait BlockResolver: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;
    fn resolve(&self, context: &ResolutionContext) -> Result<Block, ResolveError>;
}

/// A deferred span node.
pub trait SpanResolver: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;
    fn resolve(&self, context: &ResolutionContext) -> Result<Span, ResolveError>;
}

/// A deferred template span.
pub trait TemplateResolver: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;
    fn resolve(&self, context: &ResolutionContext) -> Result<TemplateSpan, ResolveError>;
}

// ============================================================================
// TREE NODES
// ============================================================================

/// A block-level node.
#[derive(Debug, Clone)]
pub enum Block {
    Paragraph(Vec<Span>),
    Heading { level: u8, content: Vec<Span> },
    BlockSequence(Vec<Block>),
    /// A template: literal text interleaved with embedded structure.
    Template(Vec<TemplateSpan>),
    /// A multi-branch choice group; exactly one branch is retained when the
    /// resolution context records a selection for `name`.
    Selection { name: String, choices: Vec<Choice> },
    Resolver(Arc<dyn BlockResolver>),
    Unresolved { message: String },
    Invalid { message: String },
}

/// An inline node.
#[derive(Debug, Clone)]
pub enum Span {
    Text {
        content: String,
        style: Option<String>,
    },
    Styled {
        style: String,
        content: Vec<Span>,
    },
    Resolver(Arc<dyn SpanResolver>),
    Unresolved {
        message: String,
    },
    Invalid {
        message: String,
    },
}

/// A node inside a template sequence.
#[derive(Debug, Clone)]
pub enum TemplateSpan {
    Literal(String),
    /// An embedded sub-document. `indent` is tagged by the rewrite engine
    /// from the trailing whitespace of a preceding literal, so renderers can
    /// re-indent nested output.
    Embedded {
        root: Box<Block>,
        indent: Option<usize>,
    },
    Resolver(Arc<dyn TemplateResolver>),
    Unresolved {
        message: String,
    },
    Invalid {
        message: String,
    },
}

/// One branch of a choice group.
#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    pub label: String,
    pub content: Vec<Block>,
}

/// Any tree node, as produced by reference lookups.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Block(Block),
    Span(Span),
    Template(TemplateSpan),
}

// ============================================================================
// CONSTRUCTORS AND ACCESSORS
// ============================================================================

impl Block {
    /// A paragraph holding a single unstyled text span.
    pub fn paragraph(text: impl Into<String>) -> Block {
        Block::Paragraph(vec![Span::text(text)])
    }

    pub fn heading(level: u8, text: impl Into<String>) -> Block {
        Block::Heading {
            level,
            content: vec![Span::text(text)],
        }
    }

    /// Returns the node kind as a string, for diagnostics and traces.
    pub fn kind(&self) -> &'static str {
        match self {
            Block::Paragraph(_) => "Paragraph",
            Block::Heading { .. } => "Heading",
            Block::BlockSequence(_) => "BlockSequence",
            Block::Template(_) => "Template",
            Block::Selection { .. } => "Selection",
            Block::Resolver(_) => "Resolver",
            Block::Unresolved { .. } => "Unresolved",
            Block::Invalid { .. } => "Invalid",
        }
    }

    /// True for the marker variants the rewrite engine must eliminate.
    pub fn is_pending(&self) -> bool {
        matches!(self, Block::Resolver(_) | Block::Unresolved { .. })
    }
}

impl Span {
    pub fn text(content: impl Into<String>) -> Span {
        Span::Text {
            content: content.into(),
            style: None,
        }
    }

    pub fn styled_text(style: impl Into<String>, content: impl Into<String>) -> Span {
        Span::Text {
            content: content.into(),
            style: Some(style.into()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Span::Text { .. } => "Text",
            Span::Styled { .. } => "Styled",
            Span::Resolver(_) => "Resolver",
            Span::Unresolved { .. } => "Unresolved",
            Span::Invalid { .. } => "Invalid",
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Span::Resolver(_) | Span::Unresolved { .. })
    }
}

impl TemplateSpan {
    pub fn embedded(root: Block) -> TemplateSpan {
        TemplateSpan::Embedded {
            root: Box::new(root),
            indent: None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TemplateSpan::Literal(_) => "Literal",
            TemplateSpan::Embedded { .. } => "Embedded",
            TemplateSpan::Resolver(_) => "Resolver",
            TemplateSpan::Unresolved { .. } => "Unresolved",
            TemplateSpan::Invalid { .. } => "Invalid",
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            TemplateSpan::Resolver(_) | TemplateSpan::Unresolved { .. }
        )
    }
}

// ============================================================================
// EQUALITY
// ============================================================================
//
// Resolver variants carry trait objects, so equality is implemented by hand:
// two resolver nodes are equal only when they are the same object. Resolved
// trees contain no resolver nodes, which keeps tree comparison in tests
// purely structural.

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Block::Paragraph(a), Block::Paragraph(b)) => a == b,
            (
                Block::Heading {
                    level: al,
                    content: ac,
                },
                Block::Heading {
                    level: bl,
                    content: bc,
                },
            ) => al == bl && ac == bc,
            (Block::BlockSequence(a), Block::BlockSequence(b)) => a == b,
            (Block::Template(a), Block::Template(b)) => a == b,
            (
                Block::Selection {
                    name: an,
                    choices: ac,
                },
                Block::Selection {
                    name: bn,
                    choices: bc,
                },
            ) => an == bn && ac == bc,
            (Block::Resolver(a), Block::Resolver(b)) => Arc::ptr_eq(a, b),
            (Block::Unresolved { message: a }, Block::Unresolved { message: b }) => a == b,
            (Block::Invalid { message: a }, Block::Invalid { message: b }) => a == b,
            _ => false,
        }
    }
}

impl PartialEq for Span {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Span::Text {
                    content: ac,
                    style: asty,
                },
                Span::Text {
                    content: bc,
                    style: bsty,
                },
            ) => ac == bc && asty == bsty,
            (
                Span::Styled {
                    style: asty,
                    content: ac,
                },
                Span::Styled {
                    style: bsty,
                    content: bc,
                },
            ) => asty == bsty && ac == bc,
            (Span::Resolver(a), Span::Resolver(b)) => Arc::ptr_eq(a, b),
            (Span::Unresolved { message: a }, Span::Unresolved { message: b }) => a == b,
            (Span::Invalid { message: a }, Span::Invalid { message: b }) => a == b,
            _ => false,
        }
    }
}

impl PartialEq for TemplateSpan {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TemplateSpan::Literal(a), TemplateSpan::Literal(b)) => a == b,
            (
                TemplateSpan::Embedded {
                    root: ar,
                    indent: ai,
                },
                TemplateSpan::Embedded {
                    root: br,
                    indent: bi,
                },
            ) => ar == br && ai == bi,
            (TemplateSpan::Resolver(a), TemplateSpan::Resolver(b)) => Arc::ptr_eq(a, b),
            (TemplateSpan::Unresolved { message: a }, TemplateSpan::Unresolved { message: b }) => {
                a == b
            }
            (TemplateSpan::Invalid { message: a }, TemplateSpan::Invalid { message: b }) => a == b,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Fixed;

    impl SpanResolver for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        fn resolve(&self, _context: &ResolutionContext) -> Result<Span, ResolveError> {
            Ok(Span::text("fixed"))
        }
    }

    #[test]
    fn resolver_nodes_compare_by_identity() {
        let resolver: Arc<dyn SpanResolver> = Arc::new(Fixed);
        let a = Span::Resolver(Arc::clone(&resolver));
        let b = Span::Resolver(resolver);
        let c = Span::Resolver(Arc::new(Fixed));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn pending_markers_are_flagged() {
        assert!(Block::Unresolved {
            message: "x".into()
        }
        .is_pending());
        assert!(!Block::paragraph("done").is_pending());
        assert!(!Block::Invalid {
            message: "x".into()
        }
        .is_pending());
    }
}
