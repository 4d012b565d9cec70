use serde::{Deserialize, Serialize};
use tracing::warn;

use super::StyledRun;
use crate::expression::Expression;
use crate::feature::Feature;
use crate::style::{StyleOverrides, StyleProperties};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Text(Expression),
    StyleOpen(StyleOverrides),
    StyleClose,
}

/// Label content as written in a map file: an expression string, or a
/// format block whose overrides apply to its children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FormatNode {
    Text(Expression),
    Format {
        #[serde(default)]
        format: StyleOverrides,
        #[serde(default)]
        children: Vec<FormatNode>,
    },
}

impl FormatNode {
    pub fn text(expr: Expression) -> Self {
        FormatNode::Text(expr)
    }

    pub fn format(format: StyleOverrides, children: Vec<FormatNode>) -> Self {
        FormatNode::Format { format, children }
    }
}

/// Depth-first flattening into open, children, close.
pub fn flatten(nodes: &[FormatNode]) -> Vec<Token> {
    let mut tokens = Vec::new();
    for node in nodes {
        flatten_into(node, &mut tokens);
    }
    tokens
}

fn flatten_into(node: &FormatNode, tokens: &mut Vec<Token>) {
    match node {
        FormatNode::Text(expr) => tokens.push(Token::Text(expr.clone())),
        FormatNode::Format { format, children } => {
            tokens.push(Token::StyleOpen(format.clone()));
            for child in children {
                flatten_into(child, tokens);
            }
            tokens.push(Token::StyleClose);
        }
    }
}

/// Turns a token list and a feature into styled runs.
#[derive(Debug, Clone)]
pub struct FormattingPipeline {
    tokens: Vec<Token>,
    defaults: StyleProperties,
}

impl FormattingPipeline {
    pub fn new(tokens: Vec<Token>, defaults: StyleProperties) -> Self {
        Self { tokens, defaults }
    }

    pub fn from_nodes(nodes: &[FormatNode], defaults: StyleProperties) -> Self {
        Self::new(flatten(nodes), defaults)
    }

    pub fn process(&self, feature: &Feature) -> Vec<StyledRun> {
        let mut stack = vec![self.defaults.clone()];
        let mut runs = Vec::new();
        for token in &self.tokens {
            match token {
                Token::Text(expr) => {
                    let Some(top) = stack.last() else { break };
                    let text = top.text_transform.apply(&expr.evaluate_text(feature));
                    if !text.is_empty() {
                        runs.push(StyledRun::new(text, top.clone()));
                    }
                }
                Token::StyleOpen(overrides) => {
                    let Some(top) = stack.last() else { break };
                    let next = overrides.applied_to(top);
                    stack.push(next);
                }
                Token::StyleClose => {
                    if stack.len() <= 1 {
                        warn!(feature = feature.id, "format stack underflow, dropping label text");
                        return Vec::new();
                    }
                    stack.pop();
                }
            }
        }
        runs
    }
}
