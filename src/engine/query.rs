//! Query language (§4.4): whitespace means AND, `OR`/`|` means OR, a
//! leading `-` or the word `NOT` negates the following term, and
//! parentheses group. `id:`/`mid:` ranges and the symbolic `ALL` term are
//! recognized as leaves with their own evaluation rule instead of a plain
//! keyword lookup.
//!
//! Grounded on `engine.py`'s `_search`/`explain_ops`: the parser builds an
//! `(op, *args)`-shaped tree (here an `OpTree` enum) and a separate
//! `explain` pass turns it back into readable text.

use crate::engine::magic::{MagicRewrite, StatusMagic};
use crate::error::{Error, Result};

#[derive(Clone, Debug, PartialEq)]
pub enum IdSpec {
    Single(u64),
    Range(u64, u64),
}

#[derive(Clone, Debug, PartialEq)]
pub enum OpTree {
    Term(String),
    And(Vec<OpTree>),
    Or(Vec<OpTree>),
    Not(Box<OpTree>),
    /// `id:10..12,20` / `mid:<hash>` — evaluated directly against id
    /// arithmetic instead of a keyword lookup.
    Ids(Vec<IdSpec>),
    /// `ALL` or `ALL:namespace`.
    All(Option<String>),
    /// A term containing `*`, expanded against the wordblob at eval time
    /// into an `Or` of the keywords it matches.
    Wildcard(String),
}

struct Tokenizer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    src: &'a str,
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    LParen,
    RParen,
    Or,
    Word(String),
}

impl<'a> Tokenizer<'a> {
    fn new(src: &'a str) -> Tokenizer<'a> {
        Tokenizer {
            chars: src.char_indices().peekable(),
            src,
        }
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_whitespace() {
                self.chars.next();
                continue;
            }
            break;
        }

        let &(start, c) = self.chars.peek()?;
        match c {
            '(' => {
                self.chars.next();
                Some(Token::LParen)
            }
            ')' => {
                self.chars.next();
                Some(Token::RParen)
            }
            '|' => {
                self.chars.next();
                Some(Token::Or)
            }
            '"' => {
                self.chars.next();
                let mut end = start + 1;
                for (i, ch) in self.chars.by_ref() {
                    end = i + ch.len_utf8();
                    if ch == '"' {
                        break;
                    }
                }
                let word = self.src[start + 1..end.saturating_sub(1).max(start + 1)].to_string();
                Some(Token::Word(word))
            }
            _ => {
                let mut end = start;
                while let Some(&(i, ch)) = self.chars.peek() {
                    if ch.is_whitespace() || ch == '(' || ch == ')' || ch == '|' {
                        break;
                    }
                    end = i + ch.len_utf8();
                    self.chars.next();
                }
                let word = self.src[start..end].to_string();
                if word.eq_ignore_ascii_case("or") {
                    Some(Token::Or)
                } else {
                    Some(Token::Word(word))
                }
            }
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// The active tag-namespace (§3), if any. Threaded through leaf
    /// parsing so `in:…`/`tag:…` terms get the `@NS` suffix (§4.4's magic
    /// table) and the `in:`/`all:mail`/`*` aliases resolve to this
    /// namespace's `ALL` instead of the global one.
    namespace: Option<String>,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn parse_or(&mut self) -> Result<OpTree> {
        let mut terms = vec![self.parse_and()?];
        while matches!(self.peek(), Some(Token::Or)) {
            self.pos += 1;
            terms.push(self.parse_and()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            OpTree::Or(terms)
        })
    }

    fn parse_and(&mut self) -> Result<OpTree> {
        let mut terms = vec![];
        loop {
            match self.peek() {
                None | Some(Token::RParen) | Some(Token::Or) => break,
                _ => terms.push(self.parse_unary()?),
            }
        }
        if terms.is_empty() {
            return Err(Error::InvalidQuery("empty expression".into()));
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            OpTree::And(terms)
        })
    }

    fn parse_unary(&mut self) -> Result<OpTree> {
        match self.peek() {
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.parse_or()?;
                match self.bump() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(Error::InvalidQuery("unclosed parenthesis".into())),
                }
            }
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("not") => {
                self.pos += 1;
                Ok(OpTree::Not(Box::new(self.parse_unary()?)))
            }
            Some(Token::Word(w)) if w.starts_with('-') && w.len() > 1 => {
                let rest = w[1..].to_string();
                self.tokens[self.pos] = Token::Word(rest);
                Ok(OpTree::Not(Box::new(self.parse_unary()?)))
            }
            Some(Token::Word(_)) => {
                let w = match self.bump() {
                    Some(Token::Word(w)) => w,
                    _ => unreachable!(),
                };
                self.parse_leaf(&w)
            }
            other => Err(Error::InvalidQuery(format!("unexpected token {:?}", other))),
        }
    }

    /// `in:`, `all:mail`, and a bare `*` are all aliases for the symbolic
    /// `ALL` term (§4.4's `_search` evaluation rule), scoped to whichever
    /// namespace is active.
    fn is_all_alias(word: &str) -> bool {
        word == "*" || word.eq_ignore_ascii_case("in:") || word.eq_ignore_ascii_case("all:mail")
    }

    fn parse_leaf(&self, word: &str) -> Result<OpTree> {
        if Self::is_all_alias(word) {
            return Ok(OpTree::All(self.namespace.clone()));
        }
        if word.eq_ignore_ascii_case("all") {
            return Ok(OpTree::All(None));
        }
        if let Some(ns) = word.strip_prefix("ALL:").or_else(|| word.strip_prefix("all:")) {
            return Ok(OpTree::All(Some(ns.to_string())));
        }
        if let Some(spec) = word.strip_prefix("id:").or_else(|| word.strip_prefix("mid:")) {
            return Ok(OpTree::Ids(parse_id_specs(spec)?));
        }

        // `tag:foo` is an input alias for `in:foo` (§4.4 magic table).
        let word = match word.strip_prefix("tag:") {
            Some(body) => format!("in:{}", body),
            None => word.to_string(),
        };

        if let Some(rewritten) = StatusMagic.rewrite(&word) {
            let mut parser = Parser {
                tokens: Tokenizer::new(&rewritten).collect(),
                pos: 0,
                namespace: self.namespace.clone(),
            };
            return parser.parse_unary();
        }

        // Suffix `in:…` terms with the active namespace, unless the
        // caller already qualified one explicitly.
        let word = if word.starts_with("in:") && !word.contains('@') {
            match &self.namespace {
                Some(ns) => format!("{}@{}", word, ns),
                None => word,
            }
        } else {
            word
        };

        if word.contains('*') {
            return Ok(OpTree::Wildcard(word));
        }
        Ok(OpTree::Term(word))
    }
}

fn parse_id_specs(spec: &str) -> Result<Vec<IdSpec>> {
    spec.split(',')
        .map(|part| {
            if let Some((a, b)) = part.split_once("..") {
                let a: u64 = a
                    .parse()
                    .map_err(|_| Error::InvalidQuery(format!("bad id range start {:?}", a)))?;
                let b: u64 = b
                    .parse()
                    .map_err(|_| Error::InvalidQuery(format!("bad id range end {:?}", b)))?;
                Ok(IdSpec::Range(a, b))
            } else {
                let n: u64 = part
                    .parse()
                    .map_err(|_| Error::InvalidQuery(format!("bad id {:?}", part)))?;
                Ok(IdSpec::Single(n))
            }
        })
        .collect()
}

/// Parse a full query string into an `OpTree`, scoped to `namespace` (§3):
/// `in:…`/`tag:…` leaves get the `@NS` suffix, and the `in:`/`all:mail`/`*`
/// aliases resolve to that namespace's `ALL` instead of the global one.
pub fn parse_terms_in_namespace(query: &str, namespace: Option<&str>) -> Result<OpTree> {
    let tokens: Vec<Token> = Tokenizer::new(query).collect();
    if tokens.is_empty() {
        return Err(Error::InvalidQuery("empty query".into()));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        namespace: namespace.map(str::to_string),
    };
    let tree = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(Error::InvalidQuery(format!(
            "trailing tokens after position {}",
            parser.pos
        )));
    }
    Ok(tree)
}

/// Parse a query string with no active namespace.
pub fn parse_terms(query: &str) -> Result<OpTree> {
    parse_terms_in_namespace(query, None)
}

/// Pretty-print an `OpTree` the way `engine.py`'s `explain_ops` does:
/// `(a AND b)`-style parenthesized text.
pub fn explain(tree: &OpTree) -> String {
    match tree {
        OpTree::Term(t) => t.clone(),
        OpTree::And(items) => format!(
            "({})",
            items.iter().map(explain).collect::<Vec<_>>().join(" AND ")
        ),
        OpTree::Or(items) => format!(
            "({})",
            items.iter().map(explain).collect::<Vec<_>>().join(" OR ")
        ),
        OpTree::Not(inner) => format!("NOT {}", explain(inner)),
        OpTree::Ids(specs) => format!(
            "id:{}",
            specs
                .iter()
                .map(|s| match s {
                    IdSpec::Single(n) => n.to_string(),
                    IdSpec::Range(a, b) => format!("{}..{}", a, b),
                })
                .collect::<Vec<_>>()
                .join(",")
        ),
        OpTree::All(None) => "ALL".to_string(),
        OpTree::All(Some(ns)) => format!("ALL:{}", ns),
        OpTree::Wildcard(pattern) => pattern.clone(),
    }
}

#[cfg(test)]
#[path = "query_test.rs"]
mod query_test;
