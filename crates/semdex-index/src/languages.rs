//! Language detection, tree-sitter grammar registry and node-kind mapping.

use std::path::Path;

use tree_sitter::{Node, Parser};

use crate::chunker::ChunkKind;
use crate::syntax::{ParseTreeProvider, SyntaxNode};

/// Language with a tree-sitter grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lang {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Tsx,
    Go,
}

impl Lang {
    /// Editor-style language identifier.
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Rust => "rust",
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Tsx => "typescriptreact",
            Self::Go => "go",
        }
    }

    #[must_use]
    pub fn from_language_id(id: &str) -> Option<Self> {
        match id {
            "rust" => Some(Self::Rust),
            "python" => Some(Self::Python),
            "javascript" | "javascriptreact" => Some(Self::JavaScript),
            "typescript" => Some(Self::TypeScript),
            "typescriptreact" => Some(Self::Tsx),
            "go" => Some(Self::Go),
            _ => None,
        }
    }

    /// Get the tree-sitter grammar. Returns `None` if the
    /// corresponding feature is not enabled.
    #[must_use]
    pub fn grammar(self) -> Option<tree_sitter::Language> {
        match self {
            #[cfg(feature = "lang-rust")]
            Self::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
            #[cfg(feature = "lang-python")]
            Self::Python => Some(tree_sitter_python::LANGUAGE.into()),
            #[cfg(feature = "lang-js")]
            Self::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
            #[cfg(feature = "lang-js")]
            Self::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            #[cfg(feature = "lang-js")]
            Self::Tsx => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
            #[cfg(feature = "lang-go")]
            Self::Go => Some(tree_sitter_go::LANGUAGE.into()),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Map a file extension to a language id. Files without a grammar still index via line windows.
#[must_use]
pub fn language_id_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?;
    let id = match ext {
        "rs" => "rust",
        "py" | "pyi" => "python",
        "js" | "mjs" | "cjs" => "javascript",
        "jsx" => "javascriptreact",
        "ts" | "mts" | "cts" => "typescript",
        "tsx" => "typescriptreact",
        "go" => "go",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "c" | "h" => "c",
        "cc" | "cpp" | "cxx" | "hpp" | "hh" => "cpp",
        "cs" => "csharp",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "scala" => "scala",
        "lua" => "lua",
        "sh" | "bash" => "shellscript",
        _ => return None,
    };
    Some(id)
}

/// Extensions accepted by the default workspace allowlist.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "rs", "py", "pyi", "js", "mjs", "cjs", "jsx", "ts", "mts", "cts", "tsx", "go", "java", "kt",
    "kts", "c", "h", "cc", "cpp", "cxx", "hpp", "hh", "cs", "rb", "php", "swift", "scala", "lua",
    "sh", "bash",
];

/// Semantic chunk kind for a syntax node kind, across all supported grammars.
#[must_use]
pub fn chunk_kind_for(node_kind: &str) -> Option<ChunkKind> {
    let kind = match node_kind {
        "function_item"
        | "function_declaration"
        | "function_definition"
        | "generator_function_declaration" => ChunkKind::Function,
        "method_definition" | "method_declaration" => ChunkKind::Method,
        "class_declaration"
        | "class_definition"
        | "abstract_class_declaration"
        | "struct_item"
        | "impl_item" => ChunkKind::Class,
        "interface_declaration" | "trait_item" => ChunkKind::Interface,
        "type_item" | "type_alias_declaration" | "enum_item" | "enum_declaration"
        | "type_declaration" => ChunkKind::Type,
        "mod_item" | "internal_module" | "module_declaration" => ChunkKind::Module,
        _ => return None,
    };
    Some(kind)
}

/// Parse-tree provider backed by the compiled-in tree-sitter grammars.
#[derive(Debug, Default, Clone, Copy)]
pub struct TreeSitterProvider;

impl ParseTreeProvider for TreeSitterProvider {
    fn parse(&self, language_id: &str, text: &str) -> Option<SyntaxNode> {
        let grammar = Lang::from_language_id(language_id)?.grammar()?;
        let mut parser = Parser::new();
        if let Err(e) = parser.set_language(&grammar) {
            tracing::warn!(language_id, "set_language failed: {e}");
            return None;
        }
        let tree = parser.parse(text, None)?;
        Some(convert(&tree.root_node()))
    }
}

fn convert(node: &Node) -> SyntaxNode {
    let start = node.start_position();
    let end = node.end_position();
    // a span ending at column 0 stops before that line
    let end_line = if end.column == 0 && end.row > start.row {
        end.row
    } else {
        end.row + 1
    };

    let child_count = u32::try_from(node.named_child_count()).unwrap_or(u32::MAX);
    let children = (0..child_count)
        .filter_map(|i| node.named_child(i))
        .map(|child| convert(&child))
        .collect();

    SyntaxNode::new(
        node.kind(),
        (node.start_byte(), node.end_byte()),
        (start.row + 1, end_line),
    )
    .with_children(children)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_id_for_common_extensions() {
        assert_eq!(language_id_for_path(Path::new("src/main.rs")), Some("rust"));
        assert_eq!(language_id_for_path(Path::new("a/b.py")), Some("python"));
        assert_eq!(
            language_id_for_path(Path::new("App.tsx")),
            Some("typescriptreact")
        );
        assert_eq!(language_id_for_path(Path::new("Main.java")), Some("java"));
    }

    #[test]
    fn language_id_unknown_ext_returns_none() {
        assert_eq!(language_id_for_path(Path::new("file.xyz")), None);
        assert_eq!(language_id_for_path(Path::new("Makefile")), None);
    }

    #[test]
    fn default_extensions_all_resolve() {
        for ext in DEFAULT_EXTENSIONS {
            let path = format!("file.{ext}");
            assert!(
                language_id_for_path(Path::new(&path)).is_some(),
                "failed for .{ext}"
            );
        }
    }

    #[test]
    fn lang_id_roundtrip() {
        for lang in [
            Lang::Rust,
            Lang::Python,
            Lang::JavaScript,
            Lang::TypeScript,
            Lang::Tsx,
            Lang::Go,
        ] {
            assert_eq!(Lang::from_language_id(lang.id()), Some(lang));
            assert_eq!(lang.to_string(), lang.id());
        }
    }

    #[test]
    fn chunk_kind_mapping() {
        assert_eq!(chunk_kind_for("function_item"), Some(ChunkKind::Function));
        assert_eq!(chunk_kind_for("method_definition"), Some(ChunkKind::Method));
        assert_eq!(chunk_kind_for("class_definition"), Some(ChunkKind::Class));
        assert_eq!(chunk_kind_for("trait_item"), Some(ChunkKind::Interface));
        assert_eq!(chunk_kind_for("enum_item"), Some(ChunkKind::Type));
        assert_eq!(chunk_kind_for("mod_item"), Some(ChunkKind::Module));
        assert_eq!(chunk_kind_for("source_file"), None);
        assert_eq!(chunk_kind_for("module"), None);
    }

    #[test]
    fn unknown_language_has_no_tree() {
        assert!(TreeSitterProvider.parse("cobol", "IDENTIFICATION DIVISION.").is_none());
    }

    #[cfg(feature = "lang-rust")]
    #[test]
    fn rust_tree_has_line_spans() {
        let source = "fn a() {\n    1;\n}\n\nstruct B;\n";
        let root = TreeSitterProvider.parse("rust", source).unwrap();
        assert_eq!(root.kind, "source_file");
        let func = &root.children[0];
        assert_eq!(func.kind, "function_item");
        assert_eq!((func.start_line, func.end_line), (1, 3));
        let item = &root.children[1];
        assert_eq!(item.kind, "struct_item");
        assert_eq!((item.start_line, item.end_line), (5, 5));
    }

    #[cfg(feature = "lang-python")]
    #[test]
    fn python_tree_parses() {
        let root = TreeSitterProvider
            .parse("python", "def f():\n    return 1\n")
            .unwrap();
        assert_eq!(root.children[0].kind, "function_definition");
    }
}
