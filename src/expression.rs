use crate::error::{Error, Result};
use crate::feature::{Feature, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^\s*(?:\[(?P<attr>[^\]]+)\]|'(?P<sq>(?:[^'\\]|\\.)*)'|"(?P<dq>(?:[^"\\]|\\.)*)"|(?P<num>-?\d+(?:\.\d+)?)|(?P<plus>\+))"#,
    )
    .unwrap()
});

#[derive(Debug, Clone, PartialEq)]
enum Term {
    Attribute(String),
    Literal(Value),
}

/// Feature attribute expression: `[name]`, `'literal'` and numbers joined by `+`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Expression {
    source: String,
    terms: Vec<Term>,
}

impl Expression {
    pub fn parse(input: &str) -> Result<Self> {
        let err = |reason: &str| Error::Expression {
            input: input.to_string(),
            reason: reason.to_string(),
        };
        let mut terms = Vec::new();
        let mut rest = input;
        let mut expect_term = true;
        while !rest.trim().is_empty() {
            let caps = TOKEN_RE
                .captures(rest)
                .ok_or_else(|| err(&format!("unexpected input at '{}'", rest.trim())))?;
            let whole = caps.get(0).map(|m| m.end()).unwrap_or(0);
            if caps.name("plus").is_some() {
                if expect_term {
                    return Err(err("'+' without a left operand"));
                }
                expect_term = true;
            } else {
                if !expect_term {
                    return Err(err("missing '+' between terms"));
                }
                let term = if let Some(attr) = caps.name("attr") {
                    Term::Attribute(attr.as_str().trim().to_string())
                } else if let Some(s) = caps.name("sq").or_else(|| caps.name("dq")) {
                    Term::Literal(Value::String(unescape(s.as_str())))
                } else if let Some(num) = caps.name("num") {
                    let value: f64 = num
                        .as_str()
                        .parse()
                        .map_err(|_| err("invalid number"))?;
                    Term::Literal(Value::Number(value))
                } else {
                    return Err(err("unrecognised token"));
                };
                terms.push(term);
                expect_term = false;
            }
            rest = &rest[whole..];
        }
        if terms.is_empty() {
            return Err(err("empty expression"));
        }
        if expect_term {
            return Err(err("dangling '+'"));
        }
        Ok(Self {
            source: input.to_string(),
            terms,
        })
    }

    /// A single-term expression keeps its value type; longer ones concatenate.
    pub fn evaluate(&self, feature: &Feature) -> Value {
        let eval = |term: &Term| match term {
            Term::Attribute(name) => feature.get(name).cloned().unwrap_or_default(),
            Term::Literal(value) => value.clone(),
        };
        if let [single] = self.terms.as_slice() {
            return eval(single);
        }
        let mut out = String::new();
        for term in &self.terms {
            out.push_str(&eval(term).to_string());
        }
        Value::String(out)
    }

    pub fn evaluate_text(&self, feature: &Feature) -> String {
        self.evaluate(feature).to_string()
    }

    pub fn evaluate_number(&self, feature: &Feature) -> f64 {
        self.evaluate(feature).to_f64()
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(ch);
        }
    }
    out
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl TryFrom<String> for Expression {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Expression::parse(&value)
    }
}

impl From<Expression> for String {
    fn from(value: Expression) -> Self {
        value.source
    }
}
