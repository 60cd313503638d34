//! CSS selector subset: type, universal, `#id`, `.class`, attribute
//! selectors (`[a]`, `[a=v]`, `[a~=v]`, `[a^=v]`, `[a$=v]`, `[a*=v]`),
//! descendant and child combinators, and selector lists.

use super::{Document, NodeId};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("'{selector}' is not a valid selector: {reason}")]
pub struct SelectorError {
    pub selector: String,
    pub reason: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals,
    Includes,
    Prefix,
    Suffix,
    Substring,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrSelector {
    name: String,
    op: AttrOp,
    value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrSelector>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

/// One complex selector, stored right-to-left: the subject, then each
/// ancestor compound (nearest first) with the combinator that leads to it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Complex {
    subject: Compound,
    ancestors: Vec<(Combinator, Compound)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList(Vec<Complex>);

impl SelectorList {
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let fail = |reason| SelectorError {
            selector: input.to_string(),
            reason,
        };
        let mut list = Vec::new();
        for part in input.split(',') {
            let mut compounds = Vec::new();
            let mut combinators = Vec::new();
            let mut pending = None;
            for token in tokenize(part).map_err(fail)? {
                match token {
                    Token::Combinator(c) => {
                        if compounds.is_empty() {
                            return Err(fail("leading combinator"));
                        }
                        // A '>' surrounded by spaces overrides the descendant.
                        if pending.is_none() || c == Combinator::Child {
                            pending = Some(c);
                        }
                    }
                    Token::Compound(compound) => {
                        if let Some(c) = pending.take() {
                            combinators.push(c);
                        } else if !compounds.is_empty() {
                            return Err(fail("missing combinator"));
                        }
                        compounds.push(compound);
                    }
                }
            }
            if pending.is_some() && pending != Some(Combinator::Descendant) {
                return Err(fail("trailing combinator"));
            }
            let Some(subject) = compounds.pop() else {
                return Err(fail("empty selector"));
            };
            let mut ancestors = Vec::new();
            while let Some(compound) = compounds.pop() {
                let combinator = combinators.pop().unwrap_or(Combinator::Descendant);
                ancestors.push((combinator, compound));
            }
            list.push(Complex { subject, ancestors });
        }
        Ok(SelectorList(list))
    }

    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        self.0.iter().any(|complex| complex.matches(doc, node))
    }
}

impl Complex {
    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        self.subject.matches(doc, node) && match_ancestors(doc, node, &self.ancestors)
    }
}

fn match_ancestors(doc: &Document, node: NodeId, rest: &[(Combinator, Compound)]) -> bool {
    let Some(((combinator, compound), rest)) = rest.split_first() else {
        return true;
    };
    let mut current = doc.parent(node);
    while let Some(candidate) = current {
        if compound.matches(doc, candidate) && match_ancestors(doc, candidate, rest) {
            return true;
        }
        if *combinator == Combinator::Child {
            return false;
        }
        current = doc.parent(candidate);
    }
    false
}

impl Compound {
    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        let Some(el) = doc.element(node) else {
            return false;
        };
        if let Some(tag) = &self.tag {
            if *tag != el.tag {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if el.attr("id") != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.is_empty() {
            let class_attr = el.attr("class").unwrap_or_default();
            if !self
                .classes
                .iter()
                .all(|c| class_attr.split_ascii_whitespace().any(|have| have == c))
            {
                return false;
            }
        }
        self.attrs.iter().all(|a| {
            let Some(value) = el.attr(&a.name) else {
                return false;
            };
            match a.op {
                AttrOp::Exists => true,
                AttrOp::Equals => value == a.value,
                AttrOp::Includes => value.split_ascii_whitespace().any(|v| v == a.value),
                AttrOp::Prefix => !a.value.is_empty() && value.starts_with(&a.value),
                AttrOp::Suffix => !a.value.is_empty() && value.ends_with(&a.value),
                AttrOp::Substring => !a.value.is_empty() && value.contains(&a.value),
            }
        })
    }
}

enum Token {
    Compound(Compound),
    Combinator(Combinator),
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

fn tokenize(input: &str) -> Result<Vec<Token>, &'static str> {
    let chars: Vec<char> = input.trim().chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let ident = |i: &mut usize| -> String {
        let start = *i;
        while *i < chars.len() && is_ident_char(chars[*i]) {
            *i += 1;
        }
        chars[start..*i].iter().collect()
    };

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            while i < chars.len() && chars[i].is_whitespace() {
                i += 1;
            }
            tokens.push(Token::Combinator(Combinator::Descendant));
            continue;
        }
        if c == '>' {
            i += 1;
            tokens.push(Token::Combinator(Combinator::Child));
            continue;
        }
        if matches!(c, '+' | '~') {
            return Err("sibling combinators are not supported");
        }

        let mut compound = Compound::default();
        let mut any = false;
        if c == '*' {
            i += 1;
            any = true;
        } else if is_ident_char(c) {
            compound.tag = Some(ident(&mut i).to_ascii_lowercase());
            any = true;
        }
        while i < chars.len() {
            match chars[i] {
                '#' => {
                    i += 1;
                    let name = ident(&mut i);
                    if name.is_empty() {
                        return Err("empty id");
                    }
                    compound.id = Some(name);
                }
                '.' => {
                    i += 1;
                    let name = ident(&mut i);
                    if name.is_empty() {
                        return Err("empty class");
                    }
                    compound.classes.push(name);
                }
                '[' => {
                    i += 1;
                    let close = chars[i..]
                        .iter()
                        .position(|c| *c == ']')
                        .ok_or("unterminated attribute selector")?;
                    let inner: String = chars[i..i + close].iter().collect();
                    i += close + 1;
                    compound.attrs.push(parse_attr(&inner)?);
                }
                ':' => return Err("pseudo-classes are not supported"),
                _ => break,
            }
            any = true;
        }
        if !any {
            return Err("unexpected character");
        }
        tokens.push(Token::Compound(compound));
    }
    Ok(tokens)
}

fn parse_attr(inner: &str) -> Result<AttrSelector, &'static str> {
    let ops = [
        ("~=", AttrOp::Includes),
        ("^=", AttrOp::Prefix),
        ("$=", AttrOp::Suffix),
        ("*=", AttrOp::Substring),
        ("=", AttrOp::Equals),
    ];
    for (token, op) in ops {
        if let Some((name, value)) = inner.split_once(token) {
            let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
            let name = name.trim();
            if name.is_empty() {
                return Err("empty attribute name");
            }
            return Ok(AttrSelector {
                name: name.to_ascii_lowercase(),
                op,
                value: value.to_string(),
            });
        }
    }
    let name = inner.trim();
    if name.is_empty() {
        return Err("empty attribute name");
    }
    Ok(AttrSelector {
        name: name.to_ascii_lowercase(),
        op: AttrOp::Exists,
        value: String::new(),
    })
}
