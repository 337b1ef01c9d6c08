//! Newick reader and writer.
//!
//! Supports the subset produced by common tree builders:
//! - nested `( … , … )` groups with optional labels
//! - `:length` branch lengths
//! - single-quoted labels (`''` escapes a quote)
//! - `[ … ]` comments and insignificant whitespace

use insertster_shared::{InsertsterError, NodeId, Result};

use crate::Tree;

/// Characters that end an unquoted label.
const DELIMITERS: &[char] = &['(', ')', ',', ':', ';', '[', ']', '\''];

/// Node produced by the parser before arena construction. Nodes are kept
/// flat (children by index) so deep trees never recurse.
#[derive(Debug, Default)]
struct RawNode {
    name: Option<String>,
    length: Option<f64>,
    children: Vec<usize>,
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Parse a Newick string into a [`Tree`].
pub fn parse(input: &str) -> Result<Tree> {
    let mut parser = Parser {
        chars: input.chars().collect(),
        pos: 0,
    };

    let nodes = parser.nodes()?;
    parser.skip_insignificant()?;
    match parser.peek() {
        Some(';') => parser.pos += 1,
        Some(c) => return Err(parser.error(format!("unexpected '{c}' after tree"))),
        None => return Err(parser.error("missing terminating ';'")),
    }
    parser.skip_insignificant()?;
    if parser.peek().is_some() {
        return Err(parser.error("trailing content after ';'"));
    }

    build(nodes)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn error(&self, msg: impl std::fmt::Display) -> InsertsterError {
        InsertsterError::parse(format!("newick: {msg} at offset {}", self.pos))
    }

    fn skip_insignificant(&mut self) -> Result<()> {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += 1;
            } else if c == '[' {
                let start = self.pos;
                while let Some(c) = self.peek() {
                    self.pos += 1;
                    if c == ']' {
                        break;
                    }
                }
                if self.chars.get(self.pos - 1) != Some(&']') {
                    self.pos = start;
                    return Err(self.error("unterminated comment"));
                }
            } else {
                break;
            }
        }
        Ok(())
    }

    /// Parse the whole tree. Index 0 is the root; every other node is
    /// pushed after its parent.
    fn nodes(&mut self) -> Result<Vec<RawNode>> {
        let mut nodes = vec![RawNode::default()];
        // groups whose ')' has not been read yet
        let mut open: Vec<usize> = Vec::new();
        let mut current = 0;

        loop {
            self.skip_insignificant()?;
            if self.peek() == Some('(') {
                self.pos += 1;
                open.push(current);
                current = push_child(&mut nodes, current);
                continue;
            }

            // Close nodes until a sibling follows or the root is done.
            loop {
                let (name, length) = self.suffix()?;
                nodes[current].name = name;
                nodes[current].length = length;

                let Some(&parent) = open.last() else {
                    return Ok(nodes);
                };
                self.skip_insignificant()?;
                match self.peek() {
                    Some(',') => {
                        self.pos += 1;
                        current = push_child(&mut nodes, parent);
                        break;
                    }
                    Some(')') => {
                        self.pos += 1;
                        open.pop();
                        current = parent;
                    }
                    Some(c) => return Err(self.error(format!("expected ',' or ')', got '{c}'"))),
                    None => return Err(self.error("unbalanced parentheses")),
                }
            }
        }
    }

    /// Label and branch length following a node.
    fn suffix(&mut self) -> Result<(Option<String>, Option<f64>)> {
        self.skip_insignificant()?;
        let name = self.label()?;
        self.skip_insignificant()?;

        let mut length = None;
        if self.peek() == Some(':') {
            self.pos += 1;
            self.skip_insignificant()?;
            length = Some(self.length()?);
        }

        Ok((name, length))
    }

    fn label(&mut self) -> Result<Option<String>> {
        if self.peek() == Some('\'') {
            self.pos += 1;
            let mut label = String::new();
            loop {
                match self.peek() {
                    Some('\'') if self.chars.get(self.pos + 1) == Some(&'\'') => {
                        label.push('\'');
                        self.pos += 2;
                    }
                    Some('\'') => {
                        self.pos += 1;
                        break;
                    }
                    Some(c) => {
                        label.push(c);
                        self.pos += 1;
                    }
                    None => return Err(self.error("unterminated quoted label")),
                }
            }
            return Ok(Some(label));
        }

        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_whitespace() || DELIMITERS.contains(&c) {
                break;
            }
            self.pos += 1;
        }

        if self.pos == start {
            Ok(None)
        } else {
            Ok(Some(self.chars[start..self.pos].iter().collect()))
        }
    }

    fn length(&mut self) -> Result<f64> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E') {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        let value: f64 = text
            .parse()
            .map_err(|_| self.error(format!("invalid branch length '{text}'")))?;
        if !value.is_finite() || value < 0.0 {
            return Err(self.error(format!("branch length must be >= 0, got {value}")));
        }
        Ok(value)
    }
}

fn push_child(nodes: &mut Vec<RawNode>, parent: usize) -> usize {
    let index = nodes.len();
    nodes.push(RawNode::default());
    nodes[parent].children.push(index);
    index
}

/// Convert the parsed nodes into an arena tree (ids in preorder).
fn build(mut nodes: Vec<RawNode>) -> Result<Tree> {
    let mut tree = Tree::new(nodes[0].name.take());
    if nodes[0].length.is_some() {
        tracing::debug!("ignoring branch length on the root");
    }

    let root_children = std::mem::take(&mut nodes[0].children);
    let mut stack: Vec<(NodeId, std::vec::IntoIter<usize>)> =
        vec![(tree.root(), root_children.into_iter())];

    while let Some((parent, children)) = stack.last_mut() {
        let parent = *parent;
        match children.next() {
            Some(index) => {
                let raw = &mut nodes[index];
                let id = tree
                    .add_child(parent, raw.name.take(), raw.length)
                    .map_err(|e| InsertsterError::parse(format!("newick: {e}")))?;
                let grandchildren = std::mem::take(&mut raw.children);
                stack.push((id, grandchildren.into_iter()));
            }
            None => {
                stack.pop();
            }
        }
    }

    Ok(tree)
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Serialize a [`Tree`] to a Newick string terminated by `;`.
pub fn write(tree: &Tree) -> String {
    let mut out = String::new();
    write_node(tree, tree.root(), &mut out);
    out.push(';');
    out
}

enum Step {
    Enter(NodeId),
    Close(NodeId),
    Comma,
}

fn write_node(tree: &Tree, root: NodeId, out: &mut String) {
    let mut stack = vec![Step::Enter(root)];

    while let Some(step) = stack.pop() {
        match step {
            Step::Enter(id) => {
                let children = tree.children(id);
                if children.is_empty() {
                    push_suffix(tree, id, out);
                    continue;
                }
                out.push('(');
                stack.push(Step::Close(id));
                for (i, &child) in children.iter().enumerate().rev() {
                    stack.push(Step::Enter(child));
                    if i > 0 {
                        stack.push(Step::Comma);
                    }
                }
            }
            Step::Close(id) => {
                out.push(')');
                push_suffix(tree, id, out);
            }
            Step::Comma => out.push(','),
        }
    }
}

fn push_suffix(tree: &Tree, id: NodeId, out: &mut String) {
    if let Some(name) = tree.name(id) {
        push_label(name, out);
    }

    if !tree.is_root(id) {
        if let Some(length) = tree.length(id) {
            out.push(':');
            out.push_str(&length.to_string());
        }
    }
}

fn push_label(name: &str, out: &mut String) {
    let needs_quotes = name.is_empty()
        || name
            .chars()
            .any(|c| c.is_whitespace() || DELIMITERS.contains(&c));
    if needs_quotes {
        out.push('\'');
        out.push_str(&name.replace('\'', "''"));
        out.push('\'');
    } else {
        out.push_str(name);
    }
}
