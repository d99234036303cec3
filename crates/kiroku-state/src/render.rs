//! Read-only views over a state: snippet, validation, debug tree.

use std::collections::HashMap;
use std::fmt::Write;

use kiroku_types::keys::SNIPPET;
use kiroku_types::{BlockContent, TextStyle, Value};

use crate::{DocumentState, StateError};

/// Collecting text stops once the snippet is at least this long.
const SNIPPET_MIN_CHARS: usize = 50;
const SNIPPET_MAX_CHARS: usize = 300;

impl DocumentState {
    /// Plain-text preview from the first text blocks in document order.
    /// Titles and descriptions are skipped.
    pub fn snippet(&self) -> String {
        let mut snippet = String::new();
        self.iterate(|block| {
            let BlockContent::Text(text) = &block.content else {
                return true;
            };
            if matches!(text.style, TextStyle::Title | TextStyle::Description) {
                return true;
            }
            let next = text.text.trim();
            if next.is_empty() {
                return true;
            }
            if !snippet.is_empty() {
                snippet.push('\n');
            }
            snippet.push_str(next);
            snippet.chars().count() < SNIPPET_MIN_CHARS
        });
        match snippet.char_indices().nth(SNIPPET_MAX_CHARS) {
            Some((end, _)) => snippet[..end].to_string(),
            None => snippet,
        }
    }

    /// Refreshes the derived `snippet` local detail.
    pub(crate) fn update_snippet(&mut self) {
        let snippet = self.snippet();
        let current = self.detail(SNIPPET).and_then(Value::as_str).unwrap_or_default();
        if current == snippet {
            return;
        }
        if snippet.is_empty() {
            self.remove_detail(SNIPPET);
        } else {
            self.set_detail(SNIPPET, Value::String(snippet));
        }
    }

    /// Checks the visible tree without changing it: every child must exist
    /// and have exactly one parent.
    pub fn validate(&self) -> Result<(), StateError> {
        let mut parents: HashMap<&str, &str> = HashMap::new();
        let mut problem = None;
        self.iterate(|block| {
            for child in &block.children_ids {
                if let Some(first) = parents.insert(child, &block.id) {
                    problem = Some(StateError::DuplicateChild {
                        child: child.clone(),
                        first: first.to_string(),
                        second: block.id.clone(),
                    });
                    return false;
                }
                if !self.exists(child) {
                    problem = Some(StateError::MissingChild {
                        parent: block.id.clone(),
                        child: child.clone(),
                    });
                    return false;
                }
            }
            true
        });
        match problem {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Tab-indented dump of the block tree for debugging.
    pub fn to_tree_string(&self) -> String {
        let mut out = String::new();
        let mut stack = vec![(self.root_id.as_str(), 0usize)];
        let mut seen = std::collections::HashSet::new();
        while let Some((id, depth)) = stack.pop() {
            let indent = "\t".repeat(depth);
            let Some(block) = self.pick(id) else {
                let _ = writeln!(out, "{indent}{id} MISSING");
                continue;
            };
            if !seen.insert(id) {
                let _ = writeln!(out, "{indent}{id} (seen)");
                continue;
            }
            let kind = match block.layout_style() {
                Some(style) => format!("layout/{style}"),
                None => block.kind().to_string(),
            };
            let _ = writeln!(out, "{indent}{id} {kind}");
            stack.extend(block.children_ids.iter().rev().map(|c| (c.as_str(), depth + 1)));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiroku_types::{Block, TextContent};

    fn titled(id: &str, text: &str, style: TextStyle) -> Block {
        Block::new(
            id,
            BlockContent::Text(TextContent {
                text: text.into(),
                style,
                ..Default::default()
            }),
        )
    }

    #[test]
    fn test_snippet_skips_title_and_stops() {
        let long = "x".repeat(60);
        let state = DocumentState::with_blocks(
            "root",
            [
                Block::new("root", Default::default()).with_children(["t", "a", "b", "c"]),
                titled("t", "Title", TextStyle::Title),
                Block::text("a", "  first  "),
                Block::text("b", &long),
                Block::text("c", "never"),
            ],
        );
        assert_eq!(state.snippet(), format!("first\n{long}"));
    }

    #[test]
    fn test_snippet_truncates() {
        let long = "é".repeat(400);
        let state = DocumentState::with_blocks(
            "root",
            [
                Block::new("root", Default::default()).with_children(["a"]),
                Block::text("a", &long),
            ],
        );
        assert_eq!(state.snippet().chars().count(), 300);
    }

    #[test]
    fn test_validate() {
        let ok = DocumentState::with_blocks(
            "root",
            [Block::new("root", Default::default()).with_children(["a"]), Block::text("a", "")],
        );
        assert!(ok.validate().is_ok());

        let missing = DocumentState::with_blocks("root", [Block::new("root", Default::default()).with_children(["a"])]);
        assert_eq!(
            missing.validate(),
            Err(StateError::MissingChild {
                parent: "root".into(),
                child: "a".into(),
            })
        );

        let twice = DocumentState::with_blocks(
            "root",
            [
                Block::new("root", Default::default()).with_children(["a", "b"]),
                Block::text("a", "").with_children(["c"]),
                Block::text("b", "").with_children(["c"]),
                Block::text("c", ""),
            ],
        );
        assert!(matches!(twice.validate(), Err(StateError::DuplicateChild { .. })));
    }

    #[test]
    fn test_tree_string() {
        let state = DocumentState::with_blocks(
            "root",
            [
                Block::new("root", Default::default()).with_children(["a", "gone"]),
                Block::text("a", ""),
            ],
        );
        assert_eq!(state.to_tree_string(), "root smartblock\n\ta text\n\tgone MISSING\n");
    }
}
