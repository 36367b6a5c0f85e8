//! Tokenizer and recursive-descent parser for partition expressions.
//!
//! Grammar:
//!
//! ```text
//! expr    := value EOF
//! value   := call | list | STRING | INTEGER
//! call    := IDENT '(' [ value { ',' value } ] ')'
//! list    := '[' [ value { ',' value } ] ']'
//! ```
//!
//! The parser accepts any well-formed value; deciding whether the value has
//! the shape of a strategy is left to evaluation. Lists and calls may nest at
//! most [`MAX_NESTING`] levels deep.

use snafu::prelude::*;

use crate::expression::{ExpressionResult, SyntaxSnafu};

/// Deepest allowed nesting of lists and calls.
pub(crate) const MAX_NESTING: usize = 64;

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Str(String),
    Int(i64),
    Call { name: String, args: Vec<Node> },
    List(Vec<Node>),
}

impl Node {
    pub(crate) fn describe(&self) -> String {
        match self {
            Node::Str(s) => format!("string literal {s:?}"),
            Node::Int(i) => format!("integer literal {i}"),
            Node::Call { name, .. } => format!("call to {name}()"),
            Node::List(items) => format!("list of {} elements", items.len()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(s) => format!("identifier '{s}'"),
            Token::Str(s) => format!("string {s:?}"),
            Token::Int(i) => format!("integer {i}"),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::LBracket => "'['".to_string(),
            Token::RBracket => "']'".to_string(),
            Token::Comma => "','".to_string(),
        }
    }
}

fn tokenize(input: &str) -> ExpressionResult<Vec<(usize, Token)>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' | ')' | '[' | ']' | ',' => {
                chars.next();
                let token = match c {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    _ => Token::Comma,
                };
                tokens.push((pos, token));
            }
            '"' => {
                chars.next();
                let mut s = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some((_, esc @ ('"' | '\\'))) => s.push(esc),
                            Some((p, other)) => {
                                return SyntaxSnafu {
                                    position: p,
                                    message: format!("unsupported escape '\\{other}'"),
                                }
                                .fail();
                            }
                            None => break,
                        },
                        other => s.push(other),
                    }
                }
                ensure!(
                    closed,
                    SyntaxSnafu {
                        position: pos,
                        message: "unterminated string literal",
                    }
                );
                tokens.push((pos, Token::Str(s)));
            }
            c if c == '-' || c.is_ascii_digit() => {
                let mut text = String::new();
                text.push(c);
                chars.next();
                while let Some(&(_, d)) = chars.peek() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    text.push(d);
                    chars.next();
                }
                let value = text.parse::<i64>().map_err(|e| {
                    SyntaxSnafu {
                        position: pos,
                        message: format!("invalid integer literal '{text}': {e}"),
                    }
                    .build()
                })?;
                tokens.push((pos, Token::Int(value)));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&(_, d)) = chars.peek() {
                    if !(d.is_ascii_alphanumeric() || d == '_') {
                        break;
                    }
                    ident.push(d);
                    chars.next();
                }
                tokens.push((pos, Token::Ident(ident)));
            }
            other => {
                return SyntaxSnafu {
                    position: pos,
                    message: format!("unexpected character '{other}'"),
                }
                .fail();
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |(p, _)| *p)
    }

    fn next(&mut self) -> ExpressionResult<Token> {
        let offset = self.offset();
        let (_, token) = self.tokens.get(self.pos).cloned().context(SyntaxSnafu {
            position: offset,
            message: "unexpected end of expression",
        })?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, expected: Token) -> ExpressionResult<()> {
        let offset = self.offset();
        let token = self.next()?;
        ensure!(
            token == expected,
            SyntaxSnafu {
                position: offset,
                message: format!("expected {} but found {}", expected.describe(), token.describe()),
            }
        );
        Ok(())
    }

    fn value(&mut self) -> ExpressionResult<Node> {
        let offset = self.offset();
        match self.next()? {
            Token::Str(s) => Ok(Node::Str(s)),
            Token::Int(i) => Ok(Node::Int(i)),
            Token::LBracket => Ok(Node::List(self.nested(offset, Token::RBracket)?)),
            Token::Ident(name) => {
                self.expect(Token::LParen)?;
                let args = self.nested(offset, Token::RParen)?;
                Ok(Node::Call { name, args })
            }
            other => SyntaxSnafu {
                position: offset,
                message: format!("unexpected {}", other.describe()),
            }
            .fail(),
        }
    }

    fn nested(&mut self, offset: usize, close: Token) -> ExpressionResult<Vec<Node>> {
        ensure!(
            self.depth < MAX_NESTING,
            SyntaxSnafu {
                position: offset,
                message: format!("nesting deeper than {MAX_NESTING} levels"),
            }
        );
        self.depth += 1;
        let items = self.sequence(close);
        self.depth -= 1;
        items
    }

    /// Comma-separated values up to and including `close`.
    fn sequence(&mut self, close: Token) -> ExpressionResult<Vec<Node>> {
        let mut items = Vec::new();
        if self.peek() == Some(&close) {
            self.pos += 1;
            return Ok(items);
        }
        loop {
            items.push(self.value()?);
            let offset = self.offset();
            match self.next()? {
                Token::Comma => continue,
                t if t == close => return Ok(items),
                other => {
                    return SyntaxSnafu {
                        position: offset,
                        message: format!(
                            "expected ',' or {} but found {}",
                            close.describe(),
                            other.describe()
                        ),
                    }
                    .fail();
                }
            }
        }
    }
}

pub(crate) fn parse(input: &str) -> ExpressionResult<Node> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: input.len(),
        depth: 0,
    };
    let node = parser.value()?;
    if let Some(token) = parser.peek() {
        return SyntaxSnafu {
            position: parser.offset(),
            message: format!("unexpected trailing {}", token.describe()),
        }
        .fail();
    }
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::ExpressionError;

    #[test]
    fn parses_nested_calls_and_lists() {
        let node = parse(r#"[hash("a", 2), range("b", -1, 10)]"#).unwrap();
        assert_eq!(
            node,
            Node::List(vec![
                Node::Call {
                    name: "hash".into(),
                    args: vec![Node::Str("a".into()), Node::Int(2)],
                },
                Node::Call {
                    name: "range".into(),
                    args: vec![Node::Str("b".into()), Node::Int(-1), Node::Int(10)],
                },
            ])
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            parse(r#""say \"hi\" \\ there""#).unwrap(),
            Node::Str(r#"say "hi" \ there"#.into())
        );
    }

    #[test]
    fn reports_position_of_syntax_errors() {
        let err = parse(r#"hash("a" 2)"#).unwrap_err();
        assert!(matches!(err, ExpressionError::Syntax { position: 9, .. }), "{err:?}");

        let err = parse(r#"hash("a", 2"#).unwrap_err();
        assert!(matches!(err, ExpressionError::Syntax { position: 11, .. }), "{err:?}");

        assert!(parse(r#""open"#).is_err());
        assert!(parse("hash(1) extra").is_err());
        assert!(parse("hash(1) $").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn deep_nesting_is_a_syntax_error() {
        let err = parse(&"[".repeat(200_000)).unwrap_err();
        assert!(matches!(err, ExpressionError::Syntax { .. }), "{err:?}");

        let err = parse(&format!("{}1{}", "f(".repeat(MAX_NESTING + 1), ")".repeat(MAX_NESTING + 1)))
            .unwrap_err();
        assert!(matches!(err, ExpressionError::Syntax { .. }), "{err:?}");

        let at_limit = format!("{}1{}", "[".repeat(MAX_NESTING), "]".repeat(MAX_NESTING));
        assert!(parse(&at_limit).is_ok());
    }
}
