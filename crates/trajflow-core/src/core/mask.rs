//! Amber-style atom mask expressions.
//!
//! Supported syntax:
//!
//! - `*` selects every atom
//! - `:1-10,15,ALA,GL*` selects residues by 1-based index, index range or name
//! - `@CA,N*,1-20` selects atoms by name or 1-based index
//! - `:ALA@CA` selects the named atoms inside the named residues
//! - `!`, `&`, `|` and parentheses combine terms, binding in that order
//!
//! Names may contain `*` (any run of characters) and `?` (any single character).

use crate::core::models::topology::Topology;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MaskError {
    #[error("Empty mask expression")]
    Empty,
    #[error("Unexpected character '{ch}' at position {pos} in mask '{expr}'")]
    UnexpectedChar { expr: String, pos: usize, ch: char },
    #[error("Mask '{0}' ended unexpectedly")]
    UnexpectedEnd(String),
    #[error("Invalid range '{range}' in mask '{expr}'")]
    InvalidRange { expr: String, range: String },
}

#[derive(Debug, Clone, PartialEq)]
enum Item {
    Range(usize, usize),
    Name(String),
}

impl Item {
    fn matches(&self, number: usize, name: &str) -> bool {
        match self {
            Item::Range(lo, hi) => (*lo..=*hi).contains(&number),
            Item::Name(pattern) => glob_match(pattern.as_bytes(), name.as_bytes()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    All,
    Residues(Vec<Item>),
    Atoms(Vec<Item>),
    ResidueAtoms(Vec<Item>, Vec<Item>),
    Not(Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
}

fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    match (pattern.first(), text.first()) {
        (None, None) => true,
        (Some(b'*'), _) => {
            glob_match(&pattern[1..], text) || (!text.is_empty() && glob_match(pattern, &text[1..]))
        }
        (Some(b'?'), Some(_)) => glob_match(&pattern[1..], &text[1..]),
        (Some(p), Some(t)) if p == t => glob_match(&pattern[1..], &text[1..]),
        _ => false,
    }
}

struct Parser<'a> {
    expr: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(expr: &'a str) -> Self {
        Self {
            expr,
            chars: expr.chars().collect(),
            pos: 0,
        }
    }

    fn skip_ws(&mut self) {
        while self.chars.get(self.pos).is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.chars.get(self.pos).copied()
    }

    fn unexpected(&self, ch: char) -> MaskError {
        MaskError::UnexpectedChar {
            expr: self.expr.to_string(),
            pos: self.pos,
            ch,
        }
    }

    fn parse(mut self) -> Result<Node, MaskError> {
        let node = self.parse_or()?;
        match self.peek() {
            None => Ok(node),
            Some(ch) => Err(self.unexpected(ch)),
        }
    }

    fn parse_or(&mut self) -> Result<Node, MaskError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some('|') {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Node::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Node, MaskError> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some('&') {
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Node::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Node, MaskError> {
        if self.peek() == Some('!') {
            self.pos += 1;
            return Ok(Node::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Node, MaskError> {
        match self.peek() {
            None => Err(MaskError::UnexpectedEnd(self.expr.to_string())),
            Some('(') => {
                self.pos += 1;
                let inner = self.parse_or()?;
                match self.peek() {
                    Some(')') => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    Some(ch) => Err(self.unexpected(ch)),
                    None => Err(MaskError::UnexpectedEnd(self.expr.to_string())),
                }
            }
            Some('*') => {
                self.pos += 1;
                Ok(Node::All)
            }
            Some(':') => {
                self.pos += 1;
                let residues = self.parse_items()?;
                if self.chars.get(self.pos) == Some(&'@') {
                    self.pos += 1;
                    let atoms = self.parse_items()?;
                    return Ok(Node::ResidueAtoms(residues, atoms));
                }
                Ok(Node::Residues(residues))
            }
            Some('@') => {
                self.pos += 1;
                Ok(Node::Atoms(self.parse_items()?))
            }
            Some(ch) => Err(self.unexpected(ch)),
        }
    }

    /// Reads a comma-separated selector list up to the next operator.
    fn parse_items(&mut self) -> Result<Vec<Item>, MaskError> {
        let start = self.pos;
        while let Some(&c) = self.chars.get(self.pos) {
            if matches!(c, '&' | '|' | ')' | '(' | '@' | '!' | ':') || c.is_whitespace() {
                break;
            }
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        if text.is_empty() {
            return match self.chars.get(self.pos) {
                Some(&ch) => Err(self.unexpected(ch)),
                None => Err(MaskError::UnexpectedEnd(self.expr.to_string())),
            };
        }
        text.split(',')
            .filter(|s| !s.is_empty())
            .map(|s| self.parse_item(s))
            .collect()
    }

    fn parse_item(&self, text: &str) -> Result<Item, MaskError> {
        let invalid = || MaskError::InvalidRange {
            expr: self.expr.to_string(),
            range: text.to_string(),
        };
        if !text.starts_with(|c: char| c.is_ascii_digit()) {
            return Ok(Item::Name(text.to_string()));
        }
        match text.split_once('-') {
            Some((lo, hi)) => {
                let lo: usize = lo.parse().map_err(|_| invalid())?;
                let hi: usize = hi.parse().map_err(|_| invalid())?;
                if lo == 0 || hi < lo {
                    return Err(invalid());
                }
                Ok(Item::Range(lo, hi))
            }
            None => match text.parse::<usize>() {
                Ok(0) => Err(invalid()),
                Ok(n) => Ok(Item::Range(n, n)),
                // Names such as "1HB" start with a digit.
                Err(_) => Ok(Item::Name(text.to_string())),
            },
        }
    }
}

fn evaluate(node: &Node, top: &Topology) -> Vec<bool> {
    let natom = top.natom();
    match node {
        Node::All => vec![true; natom],
        Node::Residues(items) => {
            let mut sel = vec![false; natom];
            for (r, residue) in top.residues.iter().enumerate() {
                if items.iter().any(|it| it.matches(r + 1, &residue.name)) {
                    for i in residue.atoms() {
                        sel[i] = true;
                    }
                }
            }
            sel
        }
        Node::Atoms(items) => top
            .atoms
            .iter()
            .enumerate()
            .map(|(i, atom)| items.iter().any(|it| it.matches(i + 1, &atom.name)))
            .collect(),
        Node::ResidueAtoms(res_items, atom_items) => {
            let residues = evaluate(&Node::Residues(res_items.clone()), top);
            let atoms = evaluate(&Node::Atoms(atom_items.clone()), top);
            residues.iter().zip(&atoms).map(|(a, b)| *a && *b).collect()
        }
        Node::Not(inner) => evaluate(inner, top).into_iter().map(|b| !b).collect(),
        Node::And(a, b) => evaluate(a, top)
            .into_iter()
            .zip(evaluate(b, top))
            .map(|(x, y)| x && y)
            .collect(),
        Node::Or(a, b) => evaluate(a, top)
            .into_iter()
            .zip(evaluate(b, top))
            .map(|(x, y)| x || y)
            .collect(),
    }
}

/// A parsed mask plus the atom indices it selected at the last [`AtomMask::setup`].
#[derive(Debug, Clone)]
pub struct AtomMask {
    expression: String,
    root: Node,
    selected: Vec<usize>,
}

impl AtomMask {
    pub fn new(expression: &str) -> Result<Self, MaskError> {
        let trimmed = expression.trim();
        if trimmed.is_empty() {
            return Err(MaskError::Empty);
        }
        let root = Parser::new(trimmed).parse()?;
        Ok(Self {
            expression: trimmed.to_string(),
            root,
            selected: Vec::new(),
        })
    }

    /// A mask selecting every atom.
    pub fn all() -> Self {
        Self {
            expression: "*".to_string(),
            root: Node::All,
            selected: Vec::new(),
        }
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Binds the mask to `topology`, returning the number of selected atoms.
    pub fn setup(&mut self, topology: &Topology) -> usize {
        self.selected = evaluate(&self.root, topology)
            .into_iter()
            .enumerate()
            .filter_map(|(i, keep)| keep.then_some(i))
            .collect();
        self.selected.len()
    }

    pub fn selected(&self) -> &[usize] {
        &self.selected
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }
}

impl fmt::Display for AtomMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.expression)
    }
}
