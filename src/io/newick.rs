//! Rooted binary Newick parser for species-tree input.
//!
//! Narrow interface: turns Newick text into a [`RawNode`] tree. Branch
//! lengths are parsed (so that malformed numbers are still rejected) but
//! discarded: the species tree's branch lengths are the tau parameters
//! estimated by the MCMC, not fixed input.

use crate::errors::Error;

#[derive(Debug, Clone)]
pub struct RawNode {
    pub label: Option<String>,
    pub children: Vec<RawNode>,
}

impl RawNode {
    pub fn is_tip(&self) -> bool {
        self.children.is_empty()
    }
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

pub fn parse(input: &str) -> Result<RawNode, Error> {
    let trimmed = input.trim();
    let trimmed = trimmed.strip_suffix(';').unwrap_or(trimmed);
    let mut parser = Parser {
        bytes: trimmed.as_bytes(),
        pos: 0,
    };
    let mut root = parser.parse_node()?;
    parser.skip_ws();
    if parser.pos != parser.bytes.len() {
        return Err(Error::InvalidNewick {
            msg: format!("trailing garbage at byte {}", parser.pos),
        });
    }
    // A single-child root, e.g. "(A);", denotes the degenerate one-population
    // tree: the lone child's label becomes the tree's single tip-and-root.
    if root.children.len() == 1 {
        root = root.children.into_iter().next().unwrap();
    }
    if root.is_tip() && root.label.is_none() {
        return Err(Error::InvalidNewick {
            msg: "root must be labeled when the tree has a single population".to_string(),
        });
    }
    validate_binary(&root)?;
    Ok(root)
}

fn validate_binary(node: &RawNode) -> Result<(), Error> {
    if !node.is_tip() && node.children.len() != 2 {
        return Err(Error::InvalidNewick {
            msg: format!(
                "internal node '{}' has {} children, rooted binary trees require exactly 2",
                node.label.as_deref().unwrap_or(""),
                node.children.len()
            ),
        });
    }
    for child in &node.children {
        validate_binary(child)?;
    }
    Ok(())
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r')) {
            self.pos += 1;
        }
    }

    fn parse_node(&mut self) -> Result<RawNode, Error> {
        self.skip_ws();
        let mut children = Vec::new();
        if self.peek() == Some(b'(') {
            self.pos += 1;
            loop {
                let child = self.parse_node()?;
                children.push(child);
                self.skip_ws();
                match self.peek() {
                    Some(b',') => {
                        self.pos += 1;
                        continue;
                    }
                    Some(b')') => {
                        self.pos += 1;
                        break;
                    }
                    _ => {
                        return Err(Error::InvalidNewick {
                            msg: format!("expected ',' or ')' at byte {}", self.pos),
                        })
                    }
                }
            }
        }
        self.skip_ws();
        let label = self.parse_label();
        self.skip_branch_length()?;
        Ok(RawNode { label, children })
    }

    fn parse_label(&mut self) -> Option<String> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == b':' || b == b',' || b == b')' || b == b'(' || b == b';' {
                break;
            }
            self.pos += 1;
        }
        let s = std::str::from_utf8(&self.bytes[start..self.pos])
            .unwrap()
            .trim();
        if s.is_empty() {
            None
        } else {
            Some(s.to_string())
        }
    }

    fn skip_branch_length(&mut self) -> Result<(), Error> {
        self.skip_ws();
        if self.peek() == Some(b':') {
            self.pos += 1;
            let start = self.pos;
            while let Some(b) = self.peek() {
                if b == b',' || b == b')' || b == b';' {
                    break;
                }
                self.pos += 1;
            }
            let s = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap().trim();
            s.parse::<f64>().map_err(|_| Error::InvalidNewick {
                msg: format!("invalid branch length '{}'", s),
            })?;
        }
        Ok(())
    }
}
