use std::cell::RefCell;
use tree_sitter::{Node, Parser, Tree};

use super::{best_keyword_line, keyword_window, mentions, SectionAnalyzer};

thread_local! {
    static RUST_PARSER: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        let _ = p.set_language(&tree_sitter_rust::LANGUAGE.into());
        p
    });
    static GO_PARSER: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        let _ = p.set_language(&tree_sitter_go::LANGUAGE.into());
        p
    });
}

/// Grammars with a parse-tree analyzer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grammar {
    Rust,
    Go,
}

impl Grammar {
    fn parse(self, content: &str) -> Option<Tree> {
        match self {
            Grammar::Rust => RUST_PARSER.with(|p| p.borrow_mut().parse(content, None)),
            Grammar::Go => GO_PARSER.with(|p| p.borrow_mut().parse(content, None)),
        }
    }
}

/// A named item found in the parse tree, rows inclusive
#[derive(Debug, Clone, PartialEq, Eq)]
struct Item {
    name: String,
    start: usize,
    end: usize,
}

/// Locates functions, types and impls through a tree-sitter parse
pub struct TreeSitterAnalyzer {
    grammar: Grammar,
}

impl TreeSitterAnalyzer {
    pub fn new(grammar: Grammar) -> Self {
        Self { grammar }
    }

    fn items(&self, content: &str) -> Vec<Item> {
        let Some(tree) = self.grammar.parse(content) else {
            return Vec::new();
        };

        let mut items = Vec::new();
        let mut stack = vec![tree.root_node()];
        while let Some(node) = stack.pop() {
            if let Some(name) = self.item_name(&node, content) {
                items.push(Item {
                    name,
                    start: node.start_position().row,
                    end: end_row(&node),
                });
            }
            let mut cursor = node.walk();
            stack.extend(node.named_children(&mut cursor));
        }
        items
    }

    fn item_name(&self, node: &Node, content: &str) -> Option<String> {
        let name_node = match (self.grammar, node.kind()) {
            (
                Grammar::Rust,
                "function_item" | "function_signature_item" | "struct_item" | "enum_item" | "union_item"
                | "trait_item" | "mod_item" | "type_item" | "const_item" | "static_item" | "macro_definition",
            ) => node.child_by_field_name("name"),
            (Grammar::Rust, "impl_item") => node.child_by_field_name("type"),
            (Grammar::Go, "function_declaration" | "method_declaration") => node.child_by_field_name("name"),
            (Grammar::Go, "type_declaration") => {
                let mut cursor = node.walk();
                let spec = node.named_children(&mut cursor).find(|c| c.kind() == "type_spec");
                spec.and_then(|s| s.child_by_field_name("name"))
            }
            _ => None,
        }?;

        let text = name_node.utf8_text(content.as_bytes()).ok()?;
        // `Foo<T>` in impl headers matches on `Foo`
        let base = text.split('<').next().unwrap_or(text).trim();
        (!base.is_empty()).then(|| base.to_string())
    }
}

impl SectionAnalyzer for TreeSitterAnalyzer {
    fn name(&self) -> &'static str {
        match self.grammar {
            Grammar::Rust => "tree-sitter-rust",
            Grammar::Go => "tree-sitter-go",
        }
    }

    fn top_of_file_lines(&self) -> usize {
        match self.grammar {
            Grammar::Rust => 15,
            Grammar::Go => 10,
        }
    }

    fn locate(&self, lines: &[&str], instruction: &str) -> Option<(usize, usize)> {
        let content = lines.join("\n");

        // Longest mentioned name wins, then the tightest span
        let chosen = self
            .items(&content)
            .into_iter()
            .filter(|item| mentions(instruction, &item.name))
            .min_by(|a, b| {
                b.name
                    .len()
                    .cmp(&a.name.len())
                    .then((a.end - a.start).cmp(&(b.end - b.start)))
                    .then(a.start.cmp(&b.start))
            });

        if let Some(item) = chosen {
            let start = include_leading_comments(lines, item.start);
            return Some((start, item.end.min(lines.len().saturating_sub(1))));
        }

        best_keyword_line(lines, instruction).map(|best| keyword_window(lines.len(), best))
    }
}

/// Last row that holds part of the node
fn end_row(node: &Node) -> usize {
    let start = node.start_position();
    let end = node.end_position();
    if end.column == 0 && end.row > start.row {
        end.row - 1
    } else {
        end.row
    }
}

/// Move the start up over doc comments and attributes attached to the item
fn include_leading_comments(lines: &[&str], start: usize) -> usize {
    let mut start = start;
    while start > 0 {
        let prev = lines[start - 1].trim_start();
        if prev.starts_with("//") || prev.starts_with("#[") {
            start -= 1;
        } else {
            break;
        }
    }
    start
}
