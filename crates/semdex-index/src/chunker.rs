//! Semantic chunking over a parse tree, with gap filling and a line-window fallback.

use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::languages::chunk_kind_for;
use crate::syntax::{ParseTreeProvider, SyntaxNode};

/// Semantic label of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Function,
    Method,
    Class,
    Interface,
    Type,
    Module,
    Block,
    Unknown,
}

impl ChunkKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Type => "type",
            Self::Module => "module",
            Self::Block => "block",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "function" => Self::Function,
            "method" => Self::Method,
            "class" => Self::Class,
            "interface" => Self::Interface,
            "type" => Self::Type,
            "module" => Self::Module,
            "block" => Self::Block,
            _ => Self::Unknown,
        })
    }
}

/// One contiguous, labeled span of a file. Lines are 1-indexed and inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub line_start: usize,
    pub line_end: usize,
    pub kind: ChunkKind,
    pub symbol_name: Option<String>,
}

impl Chunk {
    fn new(kind: ChunkKind, text: String, line_start: usize, line_end: usize) -> Self {
        let symbol_name = extract_symbol_name(kind, &text);
        Self {
            text,
            line_start,
            line_end,
            kind,
            symbol_name,
        }
    }
}

/// How a chunk list was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkSource {
    Tree,
    Windows,
}

/// Chunker configuration.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Smallest chunk, in characters, worth emitting (default: 50).
    pub min_chunk_chars: usize,
    /// Semantic nodes larger than this are split into their children (default: 4000).
    pub max_chunk_chars: usize,
    /// Lines per window when no tree is available (default: 40).
    pub window_lines: usize,
    /// Lines shared by consecutive windows (default: 10).
    pub overlap_lines: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            min_chunk_chars: 50,
            max_chunk_chars: 4000,
            window_lines: 40,
            overlap_lines: 10,
        }
    }
}

/// Splits files into chunks using parse trees from a [`ParseTreeProvider`].
#[derive(Clone)]
pub struct Chunker {
    parser: Arc<dyn ParseTreeProvider>,
    config: ChunkerConfig,
}

impl std::fmt::Debug for Chunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunker")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Chunker {
    #[must_use]
    pub fn new(parser: Arc<dyn ParseTreeProvider>, config: ChunkerConfig) -> Self {
        Self { parser, config }
    }

    #[must_use]
    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    #[must_use]
    pub fn chunk(&self, text: &str, language_id: &str) -> Vec<Chunk> {
        self.chunk_with_source(text, language_id).0
    }

    /// Chunk `text`, reporting whether the tree walk or the window fallback produced it.
    #[must_use]
    pub fn chunk_with_source(&self, text: &str, language_id: &str) -> (Vec<Chunk>, ChunkSource) {
        if text.trim().is_empty() {
            return (Vec::new(), ChunkSource::Tree);
        }
        if let Some(root) = self.parser.parse(language_id, text) {
            let chunks = chunk_tree(text, &root, &self.config);
            if !chunks.is_empty() {
                return (chunks, ChunkSource::Tree);
            }
        }
        (chunk_windows(text, &self.config), ChunkSource::Windows)
    }
}

/// Walk `root` for semantic chunks, then gap-fill.
///
/// Returns an empty list when the tree has no semantic node of acceptable size.
#[must_use]
pub fn chunk_tree(text: &str, root: &SyntaxNode, config: &ChunkerConfig) -> Vec<Chunk> {
    let lines: Vec<&str> = text.lines().collect();
    let mut found = Vec::new();
    collect_semantic(root, text, &lines, config, &mut found);
    if found.is_empty() {
        return found;
    }
    fill_gaps(&lines, found, config.min_chunk_chars)
}

fn collect_semantic(
    node: &SyntaxNode,
    source: &str,
    lines: &[&str],
    config: &ChunkerConfig,
    out: &mut Vec<Chunk>,
) {
    let Some(kind) = chunk_kind_for(&node.kind) else {
        for child in &node.children {
            collect_semantic(child, source, lines, config, out);
        }
        return;
    };

    let text = node.text(source);
    let len = text.chars().count();
    if len > config.max_chunk_chars {
        for child in &node.children {
            collect_semantic(child, source, lines, config, out);
        }
        return;
    }
    if len < config.min_chunk_chars || node.start_line == 0 || node.start_line > lines.len() {
        return;
    }

    let line_end = node.end_line.clamp(node.start_line, lines.len());
    out.push(Chunk::new(kind, text.to_owned(), node.start_line, line_end));
}

/// Sort, merge chunks that share a line, and turn large uncovered runs into `block` chunks.
fn fill_gaps(lines: &[&str], mut chunks: Vec<Chunk>, min_chars: usize) -> Vec<Chunk> {
    chunks.sort_by_key(|c| (c.line_start, c.line_end));

    let mut merged: Vec<Chunk> = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        if let Some(last) = merged.last_mut()
            && chunk.line_start <= last.line_end
        {
            if chunk.line_end > last.line_end {
                last.line_end = chunk.line_end;
                last.text = join_lines(lines, last.line_start, last.line_end);
            }
            continue;
        }
        merged.push(chunk);
    }

    let mut out = Vec::with_capacity(merged.len() * 2);
    let mut next_line = 1;
    for chunk in merged {
        if chunk.line_start > next_line {
            push_gap(lines, next_line, chunk.line_start - 1, min_chars, &mut out);
        }
        next_line = chunk.line_end + 1;
        out.push(chunk);
    }
    if next_line <= lines.len() {
        push_gap(lines, next_line, lines.len(), min_chars, &mut out);
    }
    out
}

fn push_gap(lines: &[&str], start: usize, end: usize, min_chars: usize, out: &mut Vec<Chunk>) {
    let text = join_lines(lines, start, end);
    if content_len(&text) >= min_chars {
        out.push(Chunk::new(ChunkKind::Block, text, start, end));
    }
}

/// Fixed-size overlapping line windows, each labeled `block`.
#[must_use]
pub fn chunk_windows(text: &str, config: &ChunkerConfig) -> Vec<Chunk> {
    let lines: Vec<&str> = text.lines().collect();
    let window = config.window_lines.max(1);
    let step = window.saturating_sub(config.overlap_lines).max(1);

    let mut out = Vec::new();
    let mut start = 0;
    while start < lines.len() {
        let end = (start + window).min(lines.len());
        let body = join_lines(&lines, start + 1, end);
        if content_len(&body) >= config.min_chunk_chars {
            out.push(Chunk::new(ChunkKind::Block, body, start + 1, end));
        }
        if end == lines.len() {
            break;
        }
        start += step;
    }
    out
}

/// Join 1-indexed inclusive line range.
fn join_lines(lines: &[&str], start: usize, end: usize) -> String {
    lines[start - 1..end].join("\n")
}

/// Length ignoring leading and trailing whitespace, so blank runs never become chunks.
fn content_len(text: &str) -> usize {
    text.trim().chars().count()
}

static FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:fn|function\*?|def|func)\s+(?:\([^)]*\)\s*)?([A-Za-z_$][\w$]*)")
        .unwrap_or_else(|e| unreachable!("invalid builtin regex: {e}"))
});

static METHOD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:(?:async|static|get|set|public|private|protected)\s+)*\*?([A-Za-z_$#][\w$]*)\s*\(")
        .unwrap_or_else(|e| unreachable!("invalid builtin regex: {e}"))
});

static CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:class|struct|impl(?:\s*<[^>]*>)?)\s+([A-Za-z_$][\w$]*)")
        .unwrap_or_else(|e| unreachable!("invalid builtin regex: {e}"))
});

static INTERFACE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:interface|trait)\s+([A-Za-z_$][\w$]*)")
        .unwrap_or_else(|e| unreachable!("invalid builtin regex: {e}"))
});

static TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:type|enum)\s+([A-Za-z_$][\w$]*)")
        .unwrap_or_else(|e| unreachable!("invalid builtin regex: {e}"))
});

static MODULE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:mod|module|namespace)\s+([A-Za-z_$][\w$.]*)")
        .unwrap_or_else(|e| unreachable!("invalid builtin regex: {e}"))
});

/// Best-effort symbol name for a chunk of the given kind.
#[must_use]
pub fn extract_symbol_name(kind: ChunkKind, text: &str) -> Option<String> {
    let capture = |re: &Regex| {
        re.captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_owned())
    };
    match kind {
        ChunkKind::Function => capture(&FUNCTION_RE),
        ChunkKind::Method => capture(&FUNCTION_RE).or_else(|| capture(&METHOD_RE)),
        ChunkKind::Class => capture(&CLASS_RE),
        ChunkKind::Interface => capture(&INTERFACE_RE),
        ChunkKind::Type => capture(&TYPE_RE),
        ChunkKind::Module => capture(&MODULE_RE),
        ChunkKind::Block | ChunkKind::Unknown => None,
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::syntax::NoParseTrees;

    fn small_config() -> ChunkerConfig {
        ChunkerConfig {
            min_chunk_chars: 10,
            max_chunk_chars: 200,
            window_lines: 4,
            overlap_lines: 1,
        }
    }

    /// Byte and line span of `needle` in `source`.
    fn node(source: &str, kind: &str, needle: &str) -> SyntaxNode {
        let start = source.find(needle).unwrap();
        let end = start + needle.len();
        let start_line = source[..start].matches('\n').count() + 1;
        let end_line = start_line + needle.trim_end_matches('\n').matches('\n').count();
        SyntaxNode::new(kind, (start, end), (start_line, end_line))
    }

    fn root(source: &str, children: Vec<SyntaxNode>) -> SyntaxNode {
        let lines = source.lines().count();
        SyntaxNode::new("source_file", (0, source.len()), (1, lines)).with_children(children)
    }

    fn assert_disjoint(chunks: &[Chunk]) {
        for pair in chunks.windows(2) {
            assert!(pair[0].line_end < pair[1].line_start, "{pair:?}");
        }
        for c in chunks {
            assert!(c.line_start <= c.line_end);
        }
    }

    #[test]
    fn semantic_nodes_become_chunks_with_symbols() {
        let source = "fn alpha() {\n    do_something();\n}\n\nfn beta() {\n    other_thing();\n}\n";
        let tree = root(
            source,
            vec![
                node(source, "function_item", "fn alpha() {\n    do_something();\n}"),
                node(source, "function_item", "fn beta() {\n    other_thing();\n}"),
            ],
        );
        let chunks = chunk_tree(source, &tree, &small_config());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].kind, ChunkKind::Function);
        assert_eq!(chunks[0].symbol_name.as_deref(), Some("alpha"));
        assert_eq!((chunks[0].line_start, chunks[0].line_end), (1, 3));
        assert_eq!(chunks[1].symbol_name.as_deref(), Some("beta"));
        assert_eq!((chunks[1].line_start, chunks[1].line_end), (5, 7));
    }

    #[test]
    fn oversized_node_recurses_into_children() {
        let body = "    fn inner_one() { let value = compute(1); }\n    fn inner_two() { let value = compute(2); }\n";
        let source = format!("impl Big {{\n{body}}}\n");
        let inner_one = node(&source, "function_item", "fn inner_one() { let value = compute(1); }");
        let inner_two = node(&source, "function_item", "fn inner_two() { let value = compute(2); }");
        let imp = node(&source, "impl_item", source.trim_end())
            .with_children(vec![inner_one, inner_two]);
        let tree = root(&source, vec![imp]);

        let config = ChunkerConfig {
            max_chunk_chars: 60,
            ..small_config()
        };
        let chunks = chunk_tree(&source, &tree, &config);
        let names: Vec<_> = chunks.iter().filter_map(|c| c.symbol_name.as_deref()).collect();
        assert_eq!(names, vec!["inner_one", "inner_two"]);
        assert!(chunks.iter().all(|c| c.kind != ChunkKind::Class));
    }

    #[test]
    fn semantic_node_within_bounds_hides_children() {
        let source = "class Greeter {\n  greet() { return 'hello there'; }\n}\n";
        let method = node(source, "method_definition", "greet() { return 'hello there'; }");
        let class = node(source, "class_declaration", source.trim_end()).with_children(vec![method]);
        let chunks = chunk_tree(source, &root(source, vec![class]), &small_config());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::Class);
        assert_eq!(chunks[0].symbol_name.as_deref(), Some("Greeter"));
    }

    #[test]
    fn large_gap_becomes_block_and_small_gap_dropped() {
        let source = "use std::collections::HashMap;\nuse std::sync::Arc;\n\nfn alpha() {\n    do_something();\n}\nx\nfn beta() {\n    other_thing();\n}\n";
        let tree = root(
            source,
            vec![
                node(source, "function_item", "fn alpha() {\n    do_something();\n}"),
                node(source, "function_item", "fn beta() {\n    other_thing();\n}"),
            ],
        );
        let chunks = chunk_tree(source, &tree, &small_config());
        assert_eq!(chunks[0].kind, ChunkKind::Block);
        assert_eq!((chunks[0].line_start, chunks[0].line_end), (1, 3));
        assert!(chunks[0].symbol_name.is_none());
        // the lone "x" on line 7 is below the minimum
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].line_start, 8);
        assert_disjoint(&chunks);
    }

    #[test]
    fn chunks_sharing_a_line_are_merged() {
        let source = "function first_fn() { a(); } function second_fn() { b(); }\n";
        let tree = root(
            source,
            vec![
                node(source, "function_declaration", "function first_fn() { a(); }"),
                node(source, "function_declaration", "function second_fn() { b(); }"),
            ],
        );
        let chunks = chunk_tree(source, &tree, &small_config());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].symbol_name.as_deref(), Some("first_fn"));
    }

    #[test]
    fn tiny_semantic_nodes_yield_no_tree_chunks() {
        let source = "fn a() {}\n";
        let tree = root(source, vec![node(source, "function_item", "fn a() {}")]);
        assert!(chunk_tree(source, &tree, &small_config()).is_empty());
    }

    #[test]
    fn windows_overlap_and_drop_small() {
        let source = (1..=10)
            .map(|i| format!("let variable_{i} = {i};"))
            .collect::<Vec<_>>()
            .join("\n");
        let chunks = chunk_windows(&source, &small_config());
        let spans: Vec<_> = chunks.iter().map(|c| (c.line_start, c.line_end)).collect();
        assert_eq!(spans, vec![(1, 4), (4, 7), (7, 10)]);
        assert!(chunks.iter().all(|c| c.kind == ChunkKind::Block));
    }

    #[test]
    fn window_fallback_when_no_tree() {
        let chunker = Chunker::new(Arc::new(NoParseTrees), small_config());
        let (chunks, source) =
            chunker.chunk_with_source("some plain text that is long enough\n", "plaintext");
        assert_eq!(source, ChunkSource::Windows);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn empty_text_has_no_chunks() {
        let chunker = Chunker::new(Arc::new(NoParseTrees), small_config());
        assert!(chunker.chunk("   \n\n", "rust").is_empty());
    }

    #[test]
    fn symbol_regexes_per_kind() {
        let cases = [
            (ChunkKind::Function, "pub async fn load_config(path: &Path)", "load_config"),
            (ChunkKind::Function, "function handleClick(e) {", "handleClick"),
            (ChunkKind::Function, "def parse(self):", "parse"),
            (ChunkKind::Method, "func (s *Server) Start() error {", "Start"),
            (ChunkKind::Method, "  async fetchAll(ids) {", "fetchAll"),
            (ChunkKind::Class, "export class UserService {", "UserService"),
            (ChunkKind::Class, "impl<T> Store {", "Store"),
            (ChunkKind::Interface, "pub trait Provider {", "Provider"),
            (ChunkKind::Type, "type Handler = fn();", "Handler"),
            (ChunkKind::Module, "mod tests {", "tests"),
        ];
        for (kind, text, expected) in cases {
            assert_eq!(
                extract_symbol_name(kind, text).as_deref(),
                Some(expected),
                "{kind} {text}"
            );
        }
        assert_eq!(extract_symbol_name(ChunkKind::Function, "42 + 1"), None);
        assert_eq!(extract_symbol_name(ChunkKind::Block, "fn a() {}"), None);
    }

    #[test]
    fn chunk_kind_parse_roundtrip() {
        for kind in [
            ChunkKind::Function,
            ChunkKind::Method,
            ChunkKind::Class,
            ChunkKind::Interface,
            ChunkKind::Type,
            ChunkKind::Module,
            ChunkKind::Block,
            ChunkKind::Unknown,
        ] {
            assert_eq!(kind.as_str().parse::<ChunkKind>().unwrap(), kind);
        }
        assert_eq!("garbage".parse::<ChunkKind>().unwrap(), ChunkKind::Unknown);
    }

    #[cfg(feature = "lang-rust")]
    #[test]
    fn tree_sitter_rust_end_to_end() {
        let chunker = Chunker::new(
            Arc::new(crate::languages::TreeSitterProvider),
            ChunkerConfig::default(),
        );
        let source = r#"
use std::fmt;

pub struct Config {
    pub name: String,
    pub retries: u32,
}

impl Config {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_owned(), retries: 3 }
    }
}
"#;
        let (chunks, source_kind) = chunker.chunk_with_source(source, "rust");
        assert_eq!(source_kind, ChunkSource::Tree);
        assert!(chunks.iter().any(|c| c.symbol_name.as_deref() == Some("Config")));
        assert_disjoint(&chunks);
    }

    proptest! {
        #[test]
        fn tree_chunks_never_overlap_and_cover_large_gaps(
            body in proptest::collection::vec("[a-z ]{0,30}", 1..60),
            picks in proptest::collection::vec((0usize..60, 0usize..5), 0..8),
        ) {
            let source = body.join("\n");
            let lines: Vec<&str> = source.lines().collect();
            prop_assume!(!lines.is_empty());

            let mut offsets = Vec::with_capacity(lines.len());
            let mut pos = 0;
            for line in &lines {
                offsets.push(pos);
                pos += line.len() + 1;
            }
            let children = picks
                .iter()
                .filter(|(s, _)| *s < lines.len())
                .map(|&(s, span)| {
                    let e = (s + span).min(lines.len() - 1);
                    let end_byte = offsets[e] + lines[e].len();
                    SyntaxNode::new("function_item", (offsets[s], end_byte), (s + 1, e + 1))
                })
                .collect();
            let tree = SyntaxNode::new("source_file", (0, source.len()), (1, lines.len()))
                .with_children(children);

            let config = small_config();
            let chunks = chunk_tree(&source, &tree, &config);
            let mut covered = vec![false; lines.len() + 1];
            for c in &chunks {
                prop_assert!(c.line_start >= 1 && c.line_end <= lines.len());
                for line in c.line_start..=c.line_end {
                    prop_assert!(!covered[line], "line {} covered twice", line);
                    covered[line] = true;
                }
            }
            if !chunks.is_empty() {
                let mut run_start = None;
                for line in 1..=lines.len() + 1 {
                    let open = line <= lines.len() && !covered[line];
                    match (open, run_start) {
                        (true, None) => run_start = Some(line),
                        (false, Some(s)) => {
                            let gap = join_lines(&lines, s, line - 1);
                            prop_assert!(content_len(&gap) < config.min_chunk_chars);
                            run_start = None;
                        }
                        _ => {}
                    }
                }
            }
        }
    }
}
