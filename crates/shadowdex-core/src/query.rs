//! Query parsing.
//!
//! Turns free text plus optional structured clauses into a [`ParsedQuery`]
//! the full-text engine can execute. The free-text syntax follows the usual
//! Lucene conventions:
//!
//! ```text
//! rust borrow         optional terms (rank only)
//! +rust -python       required / excluded terms
//! "borrow checker"    phrase
//! own*                prefix match
//! title:intro         field-scoped term (title, author)
//! doctype:forum       restrict to one doctype
//! ```
//!
//! Degenerate queries made only of wildcard characters are rejected.

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Which indexed field a term must match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Field {
    Any,
    Title,
    Author,
}

/// A single search term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub text: String,
    pub field: Field,
    /// Match any word starting with `text`.
    pub prefix: bool,
    /// `text` holds several words that must appear in sequence.
    pub phrase: bool,
}

impl Term {
    pub fn word(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            field: Field::Any,
            prefix: false,
            phrase: false,
        }
    }

    pub fn in_field(mut self, field: Field) -> Self {
        self.field = field;
        self
    }

    fn render(&self) -> String {
        let field = match self.field {
            Field::Any => "",
            Field::Title => "title:",
            Field::Author => "author:",
        };
        if self.phrase {
            format!("{}\"{}\"", field, self.text)
        } else if self.prefix {
            format!("{}{}*", field, self.text)
        } else {
            format!("{}{}", field, self.text)
        }
    }
}

/// Structured clauses from an advanced search form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvancedQuery {
    pub must_appear: Vec<String>,
    pub not_appear: Vec<String>,
    pub can_appear: Vec<String>,
    pub doc_type: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
}

/// An executable query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedQuery {
    pub required: Vec<Term>,
    pub optional: Vec<Term>,
    pub excluded: Vec<Term>,
    pub doc_type: Option<String>,
}

impl ParsedQuery {
    /// Lucene-style rendering. Stable for equal queries, so it doubles as
    /// the result cache key.
    pub fn to_query_string(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        parts.extend(self.required.iter().map(|t| format!("+{}", t.render())));
        parts.extend(self.optional.iter().map(Term::render));
        parts.extend(self.excluded.iter().map(|t| format!("-{}", t.render())));
        if let Some(dt) = &self.doc_type {
            parts.push(format!("+doctype:{}", dt));
        }
        parts.join(" ")
    }

    /// Terms a document can match on: required first, then optional.
    pub fn positive_terms(&self) -> impl Iterator<Item = &Term> {
        self.required.iter().chain(self.optional.iter())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Occur {
    Required,
    Optional,
    Excluded,
}

/// Parse free text and advanced clauses into a [`ParsedQuery`].
pub fn parse(text: &str, advanced: &AdvancedQuery) -> Result<ParsedQuery, ParseError> {
    let mut query = ParsedQuery::default();
    let mut saw_wildcard = false;

    for token in tokenize(text) {
        let (occur, rest) = match token.as_bytes().first() {
            Some(b'+') => (Occur::Required, &token[1..]),
            Some(b'-') => (Occur::Excluded, &token[1..]),
            _ => (Occur::Optional, token.as_str()),
        };

        let (field, value) = split_field(rest);
        if field == Some("doctype") {
            let dt = strip_quotes(value).trim();
            if !dt.is_empty() {
                query.doc_type = Some(dt.to_string());
            }
            continue;
        }
        let field = match field {
            Some("title") => Field::Title,
            Some("author") => Field::Author,
            _ => Field::Any,
        };

        match make_term(value, field) {
            Some(term) => push(&mut query, occur, term),
            None => saw_wildcard |= is_wildcard_only(value),
        }
    }

    for (words, occur) in [
        (&advanced.must_appear, Occur::Required),
        (&advanced.can_appear, Occur::Optional),
        (&advanced.not_appear, Occur::Excluded),
    ] {
        for word in words.iter().flat_map(|w| w.split_whitespace()) {
            match make_term(word, Field::Any) {
                Some(term) => push(&mut query, occur, term),
                None => saw_wildcard |= is_wildcard_only(word),
            }
        }
    }
    if let Some(title) = advanced.title.as_deref() {
        if let Some(term) = make_term(title.trim(), Field::Title) {
            query.required.push(term);
        }
    }
    if let Some(author) = advanced.author.as_deref() {
        if let Some(term) = make_term(author.trim(), Field::Author) {
            query.required.push(term);
        }
    }
    if let Some(dt) = advanced.doc_type.as_deref().map(str::trim) {
        if !dt.is_empty() {
            query.doc_type = Some(dt.to_string());
        }
    }

    if query.required.is_empty() && query.optional.is_empty() {
        if saw_wildcard && query.excluded.is_empty() {
            return Err(ParseError::WildcardOnly);
        }
        if query.excluded.is_empty() && query.doc_type.is_none() {
            return Err(ParseError::Empty);
        }
        return Err(ParseError::NoPositiveTerm);
    }

    Ok(query)
}

fn push(query: &mut ParsedQuery, occur: Occur, term: Term) {
    match occur {
        Occur::Required => query.required.push(term),
        Occur::Optional => query.optional.push(term),
        Occur::Excluded => query.excluded.push(term),
    }
}

/// Split on whitespace outside double quotes.
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in text.chars() {
        if c == '"' {
            in_quotes = !in_quotes;
            current.push(c);
        } else if c.is_whitespace() && !in_quotes {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn split_field(token: &str) -> (Option<&'static str>, &str) {
    if let Some((name, value)) = token.split_once(':') {
        for known in ["doctype", "title", "author"] {
            if name.eq_ignore_ascii_case(known) {
                return (Some(known), value);
            }
        }
    }
    (None, token)
}

fn strip_quotes(value: &str) -> &str {
    value.trim_matches('"')
}

fn is_wildcard_char(c: char) -> bool {
    c == '*' || c == '?'
}

fn is_wildcard_only(value: &str) -> bool {
    let v = strip_quotes(value);
    !v.is_empty() && v.chars().all(is_wildcard_char)
}

fn make_term(value: &str, field: Field) -> Option<Term> {
    let quoted = value.len() >= 2 && value.starts_with('"') && value.ends_with('"');
    let inner = strip_quotes(value).trim();
    if inner.is_empty() {
        return None;
    }

    if quoted || inner.contains(char::is_whitespace) {
        let words: Vec<&str> = inner
            .split_whitespace()
            .filter(|w| !w.chars().all(is_wildcard_char))
            .collect();
        if words.is_empty() {
            return None;
        }
        if words.len() == 1 {
            return make_term(words[0], field);
        }
        return Some(Term {
            text: words.join(" "),
            field,
            prefix: false,
            phrase: true,
        });
    }

    // Anything from the first wildcard on collapses into a prefix match.
    let trimmed = inner.trim_start_matches(is_wildcard_char);
    match trimmed.find(is_wildcard_char) {
        Some(0) => None,
        Some(i) => Some(Term {
            text: trimmed[..i].to_string(),
            field,
            prefix: true,
            phrase: false,
        }),
        None if trimmed.is_empty() => None,
        None => Some(Term {
            text: trimmed.to_string(),
            field,
            prefix: false,
            phrase: false,
        }),
    }
}
