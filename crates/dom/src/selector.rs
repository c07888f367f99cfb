//! A small CSS selector engine for the in-memory DOM.
//!
//! Supported: type and universal selectors, `#id`, `.class`, attribute
//! selectors (`[a]`, `[a=v]`, `[a~=v]`, `[a^=v]`, `[a$=v]`, `[a*=v]`),
//! descendant and child (`>`) combinators, and comma-separated lists.
//! Anything else (pseudo-classes, sibling combinators) is a syntax error.

use std::{iter::Peekable, str::CharIndices};

use crate::error::{DomError, Result};

/// The element facts a selector is evaluated against.
pub trait Subject {
    fn tag(&self) -> &str;
    fn id(&self) -> Option<&str>;
    fn has_class(&self, class: &str) -> bool;
    fn attribute(&self, name: &str) -> Option<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrOp {
    Equals,
    Includes,
    Prefix,
    Suffix,
    Substring,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrSelector {
    pub name: String,
    pub condition: Option<(AttrOp, String)>,
}

impl AttrSelector {
    fn matches(&self, value: Option<String>) -> bool {
        let Some(value) = value else {
            return false;
        };
        match &self.condition {
            None => true,
            Some((AttrOp::Equals, v)) => &value == v,
            Some((AttrOp::Includes, v)) => value.split_whitespace().any(|w| w == v),
            Some((AttrOp::Prefix, v)) => !v.is_empty() && value.starts_with(v.as_str()),
            Some((AttrOp::Suffix, v)) => !v.is_empty() && value.ends_with(v.as_str()),
            Some((AttrOp::Substring, v)) => !v.is_empty() && value.contains(v.as_str()),
        }
    }
}

/// A sequence of simple selectors with no combinator, e.g. `div.card[data-id]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compound {
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attrs: Vec<AttrSelector>,
}

impl Compound {
    pub fn matches(&self, el: &impl Subject) -> bool {
        if let Some(tag) = &self.tag
            && !tag.eq_ignore_ascii_case(el.tag())
        {
            return false;
        }
        if let Some(id) = &self.id
            && el.id() != Some(id.as_str())
        {
            return false;
        }
        self.classes.iter().all(|c| el.has_class(c))
            && self.attrs.iter().all(|a| a.matches(el.attribute(&a.name)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    Descendant,
    Child,
}

/// Compounds joined by combinators, stored left to right.
///
/// `combinators[i]` joins `compounds[i]` and `compounds[i + 1]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Complex {
    pub compounds: Vec<Compound>,
    pub combinators: Vec<Combinator>,
}

/// A parsed, comma-separated selector list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList {
    pub selectors: Vec<Complex>,
}

impl SelectorList {
    pub fn parse(input: &str) -> Result<Self> {
        Parser::new(input).parse_list()
    }
}

/// Anything that can walk from an element to its parent.
pub trait Tree {
    type Node: Copy;
    type Subject: Subject;

    fn subject(&self, node: Self::Node) -> &Self::Subject;
    fn parent(&self, node: Self::Node) -> Option<Self::Node>;
}

/// True if any selector in `list` matches `node`.
pub fn matches_list<T: Tree>(tree: &T, list: &SelectorList, node: T::Node) -> bool {
    list.selectors.iter().any(|c| matches_complex(tree, c, node))
}

fn matches_complex<T: Tree>(tree: &T, complex: &Complex, node: T::Node) -> bool {
    match complex.compounds.len() {
        0 => false,
        n => matches_from(tree, complex, node, n - 1),
    }
}

fn matches_from<T: Tree>(tree: &T, complex: &Complex, node: T::Node, k: usize) -> bool {
    if !complex.compounds[k].matches(tree.subject(node)) {
        return false;
    }
    if k == 0 {
        return true;
    }
    match complex.combinators[k - 1] {
        Combinator::Child => tree
            .parent(node)
            .is_some_and(|p| matches_from(tree, complex, p, k - 1)),
        Combinator::Descendant => {
            let mut current = tree.parent(node);
            while let Some(ancestor) = current {
                if matches_from(tree, complex, ancestor, k - 1) {
                    return true;
                }
                current = tree.parent(ancestor);
            }
            false
        },
    }
}

// ── Parser ──────────────────────────────────────────────────────────────────

struct Parser<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    fn error(&self, reason: impl Into<String>) -> DomError {
        DomError::selector_syntax(self.input, reason)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn skip_whitespace(&mut self) -> bool {
        let mut skipped = false;
        while self.peek().is_some_and(char::is_whitespace) {
            self.chars.next();
            skipped = true;
        }
        skipped
    }

    fn parse_list(mut self) -> Result<SelectorList> {
        let mut selectors = Vec::new();
        loop {
            self.skip_whitespace();
            selectors.push(self.parse_complex()?);
            self.skip_whitespace();
            match self.chars.next() {
                None => break,
                Some((_, ',')) => continue,
                Some((_, c)) => return Err(self.error(format!("unexpected '{c}'"))),
            }
        }
        Ok(SelectorList { selectors })
    }

    fn parse_complex(&mut self) -> Result<Complex> {
        let mut compounds = vec![self.parse_compound()?];
        let mut combinators = Vec::new();
        loop {
            let had_space = self.skip_whitespace();
            let combinator = match self.peek() {
                None | Some(',') => break,
                Some('>') => {
                    self.chars.next();
                    self.skip_whitespace();
                    Combinator::Child
                },
                Some('+' | '~') => return Err(self.error("sibling combinators are not supported")),
                Some(_) if had_space => Combinator::Descendant,
                Some(c) => return Err(self.error(format!("unexpected '{c}'"))),
            };
            combinators.push(combinator);
            compounds.push(self.parse_compound()?);
        }
        Ok(Complex {
            compounds,
            combinators,
        })
    }

    fn parse_compound(&mut self) -> Result<Compound> {
        let mut compound = Compound::default();
        let mut empty = true;

        match self.peek() {
            Some('*') => {
                self.chars.next();
                empty = false;
            },
            Some(c) if is_ident_start(c) => {
                compound.tag = Some(self.parse_ident()?.to_ascii_lowercase());
                empty = false;
            },
            _ => {},
        }

        loop {
            match self.peek() {
                Some('#') => {
                    self.chars.next();
                    compound.id = Some(self.parse_ident()?);
                },
                Some('.') => {
                    self.chars.next();
                    compound.classes.push(self.parse_ident()?);
                },
                Some('[') => {
                    self.chars.next();
                    compound.attrs.push(self.parse_attr()?);
                },
                Some(':') => return Err(self.error("pseudo-classes are not supported")),
                _ => break,
            }
            empty = false;
        }

        if empty {
            return Err(match self.peek() {
                None => self.error("expected a selector"),
                Some(c) => self.error(format!("unexpected '{c}'")),
            });
        }
        Ok(compound)
    }

    fn parse_ident(&mut self) -> Result<String> {
        let mut ident = String::new();
        while let Some(c) = self.peek() {
            if is_ident_char(c) {
                ident.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        if ident.is_empty() {
            return Err(self.error("expected an identifier"));
        }
        Ok(ident)
    }

    fn parse_attr(&mut self) -> Result<AttrSelector> {
        self.skip_whitespace();
        let name = self.parse_ident()?.to_ascii_lowercase();
        self.skip_whitespace();

        let op = match self.chars.next() {
            Some((_, ']')) => {
                return Ok(AttrSelector {
                    name,
                    condition: None,
                });
            },
            Some((_, '=')) => AttrOp::Equals,
            Some((_, c @ ('~' | '^' | '$' | '*'))) => {
                if self.chars.next().map(|(_, c)| c) != Some('=') {
                    return Err(self.error("expected '=' in attribute selector"));
                }
                match c {
                    '~' => AttrOp::Includes,
                    '^' => AttrOp::Prefix,
                    '$' => AttrOp::Suffix,
                    _ => AttrOp::Substring,
                }
            },
            Some((_, c)) => return Err(self.error(format!("unexpected '{c}' in attribute"))),
            None => return Err(self.error("unterminated attribute selector")),
        };

        self.skip_whitespace();
        let value = match self.peek() {
            Some(q @ ('"' | '\'')) => {
                self.chars.next();
                let mut value = String::new();
                loop {
                    match self.chars.next() {
                        Some((_, c)) if c == q => break,
                        Some((_, c)) => value.push(c),
                        None => return Err(self.error("unterminated string")),
                    }
                }
                value
            },
            _ => self.parse_ident()?,
        };
        self.skip_whitespace();
        if self.chars.next().map(|(_, c)| c) != Some(']') {
            return Err(self.error("expected ']'"));
        }
        Ok(AttrSelector {
            name,
            condition: Some((op, value)),
        })
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '-' || !c.is_ascii()
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || !c.is_ascii()
}
