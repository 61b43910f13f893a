//! Parse-tree abstraction consumed by the chunker.

/// Owned syntax node: kind, byte span and 1-indexed inclusive line span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxNode {
    pub kind: String,
    pub start_byte: usize,
    pub end_byte: usize,
    pub start_line: usize,
    pub end_line: usize,
    pub children: Vec<SyntaxNode>,
}

impl SyntaxNode {
    #[must_use]
    pub fn new(kind: impl Into<String>, bytes: (usize, usize), lines: (usize, usize)) -> Self {
        Self {
            kind: kind.into(),
            start_byte: bytes.0,
            end_byte: bytes.1,
            start_line: lines.0,
            end_line: lines.1,
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_children(mut self, children: Vec<SyntaxNode>) -> Self {
        self.children = children;
        self
    }

    /// Source text covered by this node, or `""` if the span is out of bounds.
    #[must_use]
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        source.get(self.start_byte..self.end_byte).unwrap_or("")
    }
}

/// Produces parse trees for source text.
///
/// Returning `None` means no tree is available for the language; the chunker
/// treats that the same as a tree with no semantic nodes.
pub trait ParseTreeProvider: Send + Sync {
    fn parse(&self, language_id: &str, text: &str) -> Option<SyntaxNode>;
}

/// Provider that never yields a tree, forcing window chunking.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoParseTrees;

impl ParseTreeProvider for NoParseTrees {
    fn parse(&self, _language_id: &str, _text: &str) -> Option<SyntaxNode> {
        None
    }
}
