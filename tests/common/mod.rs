//! Shared helpers for integration tests: small resolver implementations and
//! tree builders exercising the rewrite engine the way external grammars and
//! renderers do.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use patra::context::ResolutionContext;
use patra::document::{
    Block, BlockResolver, Element, ResolveError, Span, SpanResolver,
};

/// Span resolver substituting a named reference from the context's table.
/// An unknown name is a resolution failure, surfaced as a visible `Invalid`
/// placeholder rather than an error.
#[derive(Debug)]
pub struct ReferenceSpan {
    pub name: String,
}

impl ReferenceSpan {
    pub fn arc(name: &str) -> Arc<dyn SpanResolver> {
        Arc::new(Self {
            name: name.to_string(),
        })
    }
}

impl SpanResolver for ReferenceSpan {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolve(&self, context: &ResolutionContext) -> Result<Span, ResolveError> {
        match context.reference(&self.name) {
            Some(Element::Span(span)) => Ok(span),
            Some(_) => Err(ResolveError::Missing(format!(
                "reference '{}' is not a span",
                self.name
            ))),
            None => Err(ResolveError::Missing(format!(
                "unknown reference '{}'",
                self.name
            ))),
        }
    }
}

/// Block resolver that counts its invocations. Used to prove that unchosen
/// branches of a choice group are never evaluated.
#[derive(Debug, Default)]
pub struct ProbeBlock {
    pub calls: AtomicUsize,
}

impl ProbeBlock {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl BlockResolver for ProbeBlock {
    fn name(&self) -> &str {
        "probe"
    }

    fn resolve(&self, _context: &ResolutionContext) -> Result<Block, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Block::paragraph("probed"))
    }
}

/// Block resolver reading the `title` configuration key. A missing or
/// mistyped value is a configuration error - the fatal category - unlike a
/// missing reference.
#[derive(Debug)]
pub struct TitleBlock;

impl BlockResolver for TitleBlock {
    fn name(&self) -> &str {
        "title"
    }

    fn resolve(&self, context: &ResolutionContext) -> Result<Block, ResolveError> {
        let title: String = context.config().get("title")?;
        Ok(Block::heading(1, title))
    }
}

/// Span resolver that resolves to another resolver `remaining` times before
/// producing text. Drives the resolution depth guard.
#[derive(Debug)]
pub struct ChainSpan {
    pub remaining: usize,
}

impl SpanResolver for ChainSpan {
    fn name(&self) -> &str {
        "chain"
    }

    fn resolve(&self, _context: &ResolutionContext) -> Result<Span, ResolveError> {
        if self.remaining == 0 {
            Ok(Span::text("done"))
        } else {
            Ok(Span::Resolver(Arc::new(ChainSpan {
                remaining: self.remaining - 1,
            })))
        }
    }
}
