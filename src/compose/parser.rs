//! Composition expression parser
//!
//! Grammar (loosest to tightest binding):
//!
//! ```text
//! expr      := kleisli
//! kleisli   := sequence (">=>" sequence)*
//! sequence  := parallel (("→" | "->") parallel)*
//! parallel  := tensor ("||" tensor)*
//! tensor    := primary ("⊗" primary)*
//! primary   := IDENT modifier* | "(" expr ")" modifier*
//! modifier  := "@" key ":" value
//! ```
//!
//! Modifier keys are closed: `quality`, `max_iterations`, `budget`. Unknown
//! keys are rejected, never ignored. On a stage they set stage-level
//! settings; on a parenthesized Kleisli chain they set the chain threshold
//! and iteration cap. As a convenience, chain-level `quality` and
//! `max_iterations` written on the final stage of an unparenthesized `>=>`
//! chain are hoisted to the chain.
//!
//! Every parse failure names the offending token and its byte position.

use thiserror::Error;

use super::node::{CompositionNode, Stage};

/// Errors raised while parsing a composition expression
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("unexpected token '{token}' at position {position}")]
    UnexpectedToken { token: String, position: usize },

    #[error("unexpected end of expression")]
    UnexpectedEof,

    #[error("unknown modifier key '{key}' at position {position}")]
    UnknownModifier { key: String, position: usize },

    #[error("modifier '@{key}' does not apply to this expression at position {position}")]
    ModifierNotApplicable { key: String, position: usize },

    #[error("invalid value '{value}' for modifier '@{key}' at position {position}")]
    InvalidModifierValue {
        key: String,
        value: String,
        position: usize,
    },
}

/// Defaults for Kleisli chains without explicit modifiers
#[derive(Debug, Clone, Copy)]
pub struct ChainDefaults {
    pub threshold: f64,
    pub max_iterations: u32,
}

impl Default for ChainDefaults {
    fn default() -> Self {
        Self {
            threshold: 0.85,
            max_iterations: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Ident(String),
    Arrow,
    Parallel,
    Tensor,
    Kleisli,
    LParen,
    RParen,
    Modifier { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    position: usize,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((position, c)) = chars.next() {
        match c {
            ' ' | '\t' | '\n' => {}
            '(' => tokens.push(Token {
                kind: TokenKind::LParen,
                position,
            }),
            ')' => tokens.push(Token {
                kind: TokenKind::RParen,
                position,
            }),
            '→' => tokens.push(Token {
                kind: TokenKind::Arrow,
                position,
            }),
            '⊗' => tokens.push(Token {
                kind: TokenKind::Tensor,
                position,
            }),
            '-' => match chars.peek() {
                Some((_, '>')) => {
                    chars.next();
                    tokens.push(Token {
                        kind: TokenKind::Arrow,
                        position,
                    });
                }
                _ => {
                    return Err(ParseError::UnexpectedToken {
                        token: "-".to_string(),
                        position,
                    });
                }
            },
            '|' => match chars.peek() {
                Some((_, '|')) => {
                    chars.next();
                    tokens.push(Token {
                        kind: TokenKind::Parallel,
                        position,
                    });
                }
                _ => {
                    return Err(ParseError::UnexpectedToken {
                        token: "|".to_string(),
                        position,
                    });
                }
            },
            '>' => {
                // ">=>"
                match (chars.next(), chars.next()) {
                    (Some((_, '=')), Some((_, '>'))) => tokens.push(Token {
                        kind: TokenKind::Kleisli,
                        position,
                    }),
                    _ => {
                        return Err(ParseError::UnexpectedToken {
                            token: ">".to_string(),
                            position,
                        });
                    }
                }
            }
            '@' => {
                let mut key = String::new();
                while let Some((_, k)) = chars.peek() {
                    if is_ident_continue(*k) {
                        key.push(*k);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match chars.peek() {
                    Some((_, ':')) => {
                        chars.next();
                    }
                    _ => {
                        return Err(ParseError::UnexpectedToken {
                            token: format!("@{}", key),
                            position,
                        });
                    }
                }
                let mut value = String::new();
                while let Some((_, v)) = chars.peek() {
                    if v.is_ascii_alphanumeric() || *v == '.' {
                        value.push(*v);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if key.is_empty() || value.is_empty() {
                    return Err(ParseError::UnexpectedToken {
                        token: format!("@{}:{}", key, value),
                        position,
                    });
                }
                tokens.push(Token {
                    kind: TokenKind::Modifier { key, value },
                    position,
                });
            }
            c if is_ident_start(c) => {
                let mut name = String::from(c);
                while let Some((_, n)) = chars.peek() {
                    if is_ident_continue(*n) {
                        name.push(*n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Ident(name),
                    position,
                });
            }
            other => {
                return Err(ParseError::UnexpectedToken {
                    token: other.to_string(),
                    position,
                });
            }
        }
    }
    Ok(tokens)
}

/// Parse an expression with default chain settings
pub fn parse_expression(input: &str) -> Result<CompositionNode, ParseError> {
    parse_expression_with(input, ChainDefaults::default())
}

/// Parse an expression, supplying Kleisli chain defaults
pub fn parse_expression_with(input: &str, defaults: ChainDefaults) -> Result<CompositionNode, ParseError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        defaults,
    };
    let node = parser.parse_kleisli()?;
    if let Some(extra) = parser.peek() {
        return Err(ParseError::UnexpectedToken {
            token: token_text(&extra.kind),
            position: extra.position,
        });
    }
    Ok(node)
}

fn token_text(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Ident(name) => name.clone(),
        TokenKind::Arrow => "→".to_string(),
        TokenKind::Parallel => "||".to_string(),
        TokenKind::Tensor => "⊗".to_string(),
        TokenKind::Kleisli => ">=>".to_string(),
        TokenKind::LParen => "(".to_string(),
        TokenKind::RParen => ")".to_string(),
        TokenKind::Modifier { key, value } => format!("@{}:{}", key, value),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    defaults: ChainDefaults,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).cloned()
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.tokens.get(self.pos).map(|t| &t.kind) == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_kleisli(&mut self) -> Result<CompositionNode, ParseError> {
        let mut nodes = vec![self.parse_sequence()?];
        while self.eat(&TokenKind::Kleisli) {
            nodes.push(self.parse_sequence()?);
        }
        if nodes.len() == 1 {
            return Ok(nodes.pop().unwrap_or_else(|| unreachable!("len checked")));
        }

        // Chain-level settings may be written on the final stage
        let mut threshold = self.defaults.threshold;
        let mut max_iterations = self.defaults.max_iterations;
        if let Some(CompositionNode::Leaf { stage }) = nodes.last_mut() {
            if let Some(q) = stage.modifiers.quality.take() {
                threshold = q;
            }
            if let Some(cap) = stage.modifiers.max_iterations.take() {
                max_iterations = cap;
            }
        }
        Ok(CompositionNode::kleisli(nodes, threshold, max_iterations))
    }

    fn parse_sequence(&mut self) -> Result<CompositionNode, ParseError> {
        let mut nodes = vec![self.parse_parallel()?];
        while self.eat(&TokenKind::Arrow) {
            nodes.push(self.parse_parallel()?);
        }
        Ok(CompositionNode::sequence(nodes))
    }

    fn parse_parallel(&mut self) -> Result<CompositionNode, ParseError> {
        let mut nodes = vec![self.parse_tensor()?];
        while self.eat(&TokenKind::Parallel) {
            nodes.push(self.parse_tensor()?);
        }
        if nodes.len() == 1 {
            Ok(nodes.pop().unwrap_or_else(|| unreachable!("len checked")))
        } else {
            Ok(CompositionNode::parallel(nodes))
        }
    }

    fn parse_tensor(&mut self) -> Result<CompositionNode, ParseError> {
        let mut node = self.parse_primary()?;
        while self.eat(&TokenKind::Tensor) {
            let right = self.parse_primary()?;
            node = CompositionNode::tensor(node, right);
        }
        Ok(node)
    }

    fn parse_primary(&mut self) -> Result<CompositionNode, ParseError> {
        let token = self.advance().ok_or(ParseError::UnexpectedEof)?;
        match token.kind {
            TokenKind::Ident(name) => {
                let mut node = CompositionNode::leaf(Stage::new(name));
                self.apply_modifiers(&mut node)?;
                Ok(node)
            }
            TokenKind::LParen => {
                let mut node = self.parse_kleisli()?;
                match self.advance() {
                    Some(Token {
                        kind: TokenKind::RParen,
                        ..
                    }) => {}
                    Some(other) => {
                        return Err(ParseError::UnexpectedToken {
                            token: token_text(&other.kind),
                            position: other.position,
                        });
                    }
                    None => return Err(ParseError::UnexpectedEof),
                }
                self.apply_modifiers(&mut node)?;
                Ok(node)
            }
            other => Err(ParseError::UnexpectedToken {
                token: token_text(&other),
                position: token.position,
            }),
        }
    }

    /// Consume trailing modifiers and apply them to `node`
    fn apply_modifiers(&mut self, node: &mut CompositionNode) -> Result<(), ParseError> {
        while let Some(Token {
            kind: TokenKind::Modifier { key, value },
            position,
        }) = self.peek()
        {
            self.pos += 1;
            match (key.as_str(), &mut *node) {
                ("budget", CompositionNode::Leaf { stage }) => {
                    stage.modifiers.budget = Some(parse_value::<u64>(&key, &value, position)?);
                }
                ("quality", CompositionNode::Leaf { stage }) => {
                    stage.modifiers.quality = Some(parse_value::<f64>(&key, &value, position)?);
                }
                ("max_iterations", CompositionNode::Leaf { stage }) => {
                    stage.modifiers.max_iterations = Some(parse_value::<u32>(&key, &value, position)?);
                }
                ("quality", CompositionNode::Kleisli { threshold, .. }) => {
                    *threshold = parse_value::<f64>(&key, &value, position)?;
                }
                ("max_iterations", CompositionNode::Kleisli { max_iterations, .. }) => {
                    *max_iterations = parse_value::<u32>(&key, &value, position)?;
                }
                ("budget" | "quality" | "max_iterations", _) => {
                    return Err(ParseError::ModifierNotApplicable { key, position });
                }
                _ => return Err(ParseError::UnknownModifier { key, position }),
            }
        }
        Ok(())
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str, position: usize) -> Result<T, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidModifierValue {
        key: key.to_string(),
        value: value.to_string(),
        position,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_stage() {
        let node = parse_expression("draft").unwrap();
        assert!(matches!(node, CompositionNode::Leaf { ref stage } if stage.name == "draft"));
    }

    #[test]
    fn test_sequence() {
        let node = parse_expression("draft → review → polish").unwrap();
        match node {
            CompositionNode::Sequence { nodes } => assert_eq!(nodes.len(), 3),
            other => panic!("expected sequence, got {:?}", other),
        }
    }

    #[test]
    fn test_ascii_arrow_alias() {
        assert_eq!(parse_expression("a -> b").unwrap(), parse_expression("a → b").unwrap());
    }

    #[test]
    fn test_parallel_and_tensor_precedence() {
        // Tensor binds tighter than parallel
        let node = parse_expression("a ⊗ b || c").unwrap();
        match node {
            CompositionNode::Parallel { nodes } => {
                assert!(matches!(nodes[0], CompositionNode::Tensor { .. }));
                assert!(matches!(nodes[1], CompositionNode::Leaf { .. }));
            }
            other => panic!("expected parallel, got {:?}", other),
        }
    }

    #[test]
    fn test_parallel_binds_tighter_than_sequence() {
        let node = parse_expression("a → b || c").unwrap();
        match node {
            CompositionNode::Sequence { nodes } => {
                assert!(matches!(nodes[0], CompositionNode::Leaf { .. }));
                assert!(matches!(nodes[1], CompositionNode::Parallel { .. }));
            }
            other => panic!("expected sequence, got {:?}", other),
        }
    }

    #[test]
    fn test_kleisli_chain_with_modifiers() {
        let node = parse_expression("draft >=> polish @quality:0.85 @max_iterations:5").unwrap();
        match node {
            CompositionNode::Kleisli {
                stages,
                threshold,
                max_iterations,
            } => {
                assert_eq!(stages.len(), 2);
                assert_eq!(threshold, 0.85);
                assert_eq!(max_iterations, 5);
            }
            other => panic!("expected kleisli, got {:?}", other),
        }
    }

    #[test]
    fn test_parenthesized_kleisli_modifiers() {
        let node = parse_expression("(draft >=> polish) @quality:0.9").unwrap();
        assert!(matches!(node, CompositionNode::Kleisli { threshold, .. } if threshold == 0.9));
    }

    #[test]
    fn test_stage_budget_modifier() {
        let node = parse_expression("draft @budget:20000 → review").unwrap();
        match node {
            CompositionNode::Sequence { nodes } => match &nodes[0] {
                CompositionNode::Leaf { stage } => assert_eq!(stage.modifiers.budget, Some(20000)),
                other => panic!("expected leaf, got {:?}", other),
            },
            other => panic!("expected sequence, got {:?}", other),
        }
    }

    #[test]
    fn test_parentheses_group() {
        let node = parse_expression("(a → b) || c").unwrap();
        match node {
            CompositionNode::Parallel { nodes } => {
                assert!(matches!(nodes[0], CompositionNode::Sequence { .. }));
            }
            other => panic!("expected parallel, got {:?}", other),
        }
    }

    #[test]
    fn test_stray_operator_reports_position() {
        // "A → || B": the stray "||" starts at byte 6 ("→" is 3 bytes)
        let err = parse_expression("A → || B").unwrap_err();
        assert_eq!(
            err,
            ParseError::UnexpectedToken {
                token: "||".to_string(),
                position: 6
            }
        );
    }

    #[test]
    fn test_unknown_modifier_rejected() {
        let err = parse_expression("a @retries:3").unwrap_err();
        assert!(matches!(err, ParseError::UnknownModifier { ref key, .. } if key == "retries"));
    }

    #[test]
    fn test_modifier_on_plain_group_rejected() {
        let err = parse_expression("(a → b) @budget:1000").unwrap_err();
        assert!(matches!(err, ParseError::ModifierNotApplicable { ref key, .. } if key == "budget"));
    }

    #[test]
    fn test_invalid_modifier_value() {
        let err = parse_expression("a @budget:lots").unwrap_err();
        assert!(matches!(err, ParseError::InvalidModifierValue { .. }));
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        let err = parse_expression("a b").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedToken { ref token, .. } if token == "b"));
    }

    #[test]
    fn test_empty_expression() {
        assert_eq!(parse_expression(""), Err(ParseError::UnexpectedEof));
    }

    #[test]
    fn test_unclosed_paren() {
        assert_eq!(parse_expression("(a → b"), Err(ParseError::UnexpectedEof));
    }
}
