mod error;
mod token;

use crate::ast::{Ast, NodeId, NodeKind, Op, Span};
use crate::config::{Config, FractionMode};
use crate::symbols::{CapacityError, SymbolTable};

pub use error::{LexError, LexResult};
pub use token::{Token, TokenKind};

pub struct Lexer<'a> {
    input: &'a str,
    bytes: &'a [u8],
    position: usize,
    line: usize,
    column: usize,
    fractions: FractionMode,
    max_name_len: usize,
    finished: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str, config: &Config) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            position: 0,
            line: 1,
            column: 1,
            fractions: config.lexer.fractions,
            max_name_len: config.limits.max_name_len,
            finished: false,
        }
    }

    /// Produces the next token. After the `$` marker, or once the input is
    /// exhausted, every call yields the end marker.
    pub fn next_token(&mut self) -> LexResult<Token<'a>> {
        if !self.finished {
            self.skip_whitespace();
        }
        let start = self.position;
        let (line, column) = (self.line, self.column);

        let byte = match self.bytes.get(self.position) {
            Some(&byte) if !self.finished => byte,
            _ => {
                self.finished = true;
                return Ok(self.operator(Op::End, start));
            }
        };

        match byte {
            b'0'..=b'9' => self.read_number(start, line, column),
            b'+' => Ok(self.single(Op::Add, start)),
            b'-' => Ok(self.single(Op::Sub, start)),
            b'*' => Ok(self.single(Op::Mul, start)),
            b'/' => Ok(self.single(Op::Div, start)),
            b'^' => Ok(self.single(Op::Pow, start)),
            b'(' => Ok(self.single(Op::LParen, start)),
            b')' => Ok(self.single(Op::RParen, start)),
            b'{' => Ok(self.single(Op::LBrace, start)),
            b'}' => Ok(self.single(Op::RBrace, start)),
            b';' => Ok(self.single(Op::Semicolon, start)),
            b'$' => {
                self.finished = true;
                Ok(self.single(Op::End, start))
            }
            b'=' => Ok(self.with_equals(Op::Assign, Op::Equal, start)),
            b'>' => Ok(self.with_equals(Op::Above, Op::AboveEq, start)),
            b'<' => Ok(self.with_equals(Op::Below, Op::BelowEq, start)),
            b'!' => {
                if self.bytes.get(start + 1) == Some(&b'=') {
                    self.advance();
                    self.advance();
                    Ok(self.operator(Op::NotEqual, start))
                } else {
                    Err(LexError::IncompleteOperator {
                        glyph: '!',
                        line,
                        column,
                    })
                }
            }
            c if c.is_ascii_alphabetic() || c == b'_' => self.read_identifier(start, line, column),
            _ => Err(LexError::UnexpectedCharacter {
                character: self.input[start..].chars().next().unwrap_or('\0'),
                line,
                column,
            }),
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(&byte) = self.bytes.get(self.position) {
            if byte.is_ascii_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn single(&mut self, op: Op, start: usize) -> Token<'a> {
        self.advance();
        self.operator(op, start)
    }

    fn with_equals(&mut self, single: Op, double: Op, start: usize) -> Token<'a> {
        self.advance();
        if self.bytes.get(self.position) == Some(&b'=') {
            self.advance();
            self.operator(double, start)
        } else {
            self.operator(single, start)
        }
    }

    fn operator(&self, op: Op, start: usize) -> Token<'a> {
        Token::new(
            TokenKind::Operator(op),
            Span {
                start,
                end: self.position,
            },
        )
    }

    fn read_number(&mut self, start: usize, line: usize, column: usize) -> LexResult<Token<'a>> {
        let mut value: i32 = 0;
        self.read_digits(&mut value, start, line, column)?;

        let mut fraction_digits = 0;
        if self.bytes.get(self.position) == Some(&b'.') {
            self.advance();
            fraction_digits = self.read_digits(&mut value, start, line, column)?;
        }

        let value = match (fraction_digits, self.fractions) {
            (0, _) => f64::from(value),
            (count, FractionMode::DigitCount) => f64::from(value) / f64::from(count),
            (count, FractionMode::Positional) => f64::from(value) / 10f64.powi(count as i32),
        };
        Ok(Token::new(
            TokenKind::Number(value),
            Span {
                start,
                end: self.position,
            },
        ))
    }

    /// Accumulates a digit run into `value`, returning how many digits it read.
    fn read_digits(
        &mut self,
        value: &mut i32,
        start: usize,
        line: usize,
        column: usize,
    ) -> LexResult<u32> {
        let mut count = 0;
        while let Some(&byte) = self.bytes.get(self.position) {
            if !byte.is_ascii_digit() {
                break;
            }
            let digit = i32::from(byte - b'0');
            match value.checked_mul(10).and_then(|shifted| shifted.checked_add(digit)) {
                Some(next) => *value = next,
                None => {
                    while self
                        .bytes
                        .get(self.position)
                        .is_some_and(|b| b.is_ascii_digit() || *b == b'.')
                    {
                        self.advance();
                    }
                    return Err(LexError::IntegerOverflow {
                        literal: self.input[start..self.position].to_string(),
                        line,
                        column,
                    });
                }
            }
            self.advance();
            count += 1;
        }
        Ok(count)
    }

    fn read_identifier(&mut self, start: usize, line: usize, column: usize) -> LexResult<Token<'a>> {
        while self
            .bytes
            .get(self.position)
            .is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_')
        {
            self.advance();
        }

        let word = &self.input[start..self.position];
        if word.len() > self.max_name_len {
            return Err(LexError::IdentifierTooLong {
                name: word.to_string(),
                limit: self.max_name_len,
                line,
                column,
            });
        }

        let kind = match Op::keyword(word) {
            Some(op) => TokenKind::Operator(op),
            None => TokenKind::Identifier(word),
        };
        Ok(Token::new(
            kind,
            Span {
                start,
                end: self.position,
            },
        ))
    }

    fn advance(&mut self) {
        if let Some(&byte) = self.bytes.get(self.position) {
            self.position += 1;
            if byte == b'\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = LexResult<Token<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        Some(self.next_token())
    }
}

/// Splits `input` into tokens, always ending with exactly one end marker.
pub fn tokenize<'a>(input: &'a str, config: &Config) -> LexResult<Vec<Token<'a>>> {
    Lexer::new(input, config).collect()
}

/// Moves tokens into the arena as nodes, registering identifiers in `names`.
///
/// The returned handles are the parser's token stream; the same nodes become
/// the tree.
pub fn load_tokens(
    tokens: &[Token<'_>],
    ast: &mut Ast,
    names: &mut SymbolTable,
) -> Result<Vec<NodeId>, CapacityError> {
    tokens
        .iter()
        .map(|token| -> Result<NodeId, CapacityError> {
            let kind = match token.kind {
                TokenKind::Number(value) => NodeKind::Number(value),
                TokenKind::Identifier(name) => NodeKind::Variable(names.intern(name)?),
                TokenKind::Operator(op) => NodeKind::Operator(op),
            };
            Ok(ast.push(kind, token.span))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn kinds(input: &str) -> Vec<TokenKind<'_>> {
        tokenize(input, &Config::default())
            .expect("tokenize should succeed")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn test_simple_program() {
        let input = indoc! {"
            decl main() {
                var n = 4 + x1;
                print n;
            };
            $
        "};
        let expected = vec![
            TokenKind::Operator(Op::Decl),
            TokenKind::Identifier("main"),
            TokenKind::Operator(Op::LParen),
            TokenKind::Operator(Op::RParen),
            TokenKind::Operator(Op::LBrace),
            TokenKind::Operator(Op::Var),
            TokenKind::Identifier("n"),
            TokenKind::Operator(Op::Assign),
            TokenKind::Number(4.0),
            TokenKind::Operator(Op::Add),
            TokenKind::Identifier("x1"),
            TokenKind::Operator(Op::Semicolon),
            TokenKind::Operator(Op::Print),
            TokenKind::Identifier("n"),
            TokenKind::Operator(Op::Semicolon),
            TokenKind::Operator(Op::RBrace),
            TokenKind::Operator(Op::Semicolon),
            TokenKind::Operator(Op::End),
        ];
        assert_eq!(kinds(input), expected);
    }

    #[test]
    fn two_character_comparisons() {
        assert_eq!(
            kinds("a==b!=c>=d<=e>f<g=h"),
            vec![
                TokenKind::Identifier("a"),
                TokenKind::Operator(Op::Equal),
                TokenKind::Identifier("b"),
                TokenKind::Operator(Op::NotEqual),
                TokenKind::Identifier("c"),
                TokenKind::Operator(Op::AboveEq),
                TokenKind::Identifier("d"),
                TokenKind::Operator(Op::BelowEq),
                TokenKind::Identifier("e"),
                TokenKind::Operator(Op::Above),
                TokenKind::Identifier("f"),
                TokenKind::Operator(Op::Below),
                TokenKind::Identifier("g"),
                TokenKind::Operator(Op::Assign),
                TokenKind::Identifier("h"),
                TokenKind::Operator(Op::End),
            ]
        );
    }

    #[test]
    fn fraction_digits_divide_by_their_count() {
        assert_eq!(kinds("3.14")[0], TokenKind::Number(157.0));
        assert_eq!(kinds("1.5")[0], TokenKind::Number(15.0));
        assert_eq!(kinds("7.")[0], TokenKind::Number(7.0));
    }

    #[test]
    fn positional_fractions_when_configured() {
        let mut config = Config::default();
        config.lexer.fractions = FractionMode::Positional;
        let tokens = tokenize("3.25", &config).expect("tokenize should succeed");
        assert_eq!(tokens[0].kind, TokenKind::Number(3.25));
    }

    #[test]
    fn stops_at_end_marker() {
        let tokens = kinds("x $ this is ignored @");
        assert_eq!(
            tokens,
            vec![TokenKind::Identifier("x"), TokenKind::Operator(Op::End)]
        );
    }

    #[test]
    fn keyword_aliases() {
        assert_eq!(kinds("tan")[0], TokenKind::Operator(Op::Tg));
        assert_eq!(kinds("sinus")[0], TokenKind::Identifier("sinus"));
    }

    #[test]
    fn errors_on_invalid_character() {
        let err = tokenize("x = 1 @ 2", &Config::default()).expect_err("expected lexing failure");
        assert_eq!(
            err.to_string(),
            "Unexpected character '@' at line 1, column 7"
        );
    }

    #[test]
    fn errors_on_lone_bang() {
        let err = tokenize("a ! b", &Config::default()).expect_err("expected lexing failure");
        assert!(matches!(err, LexError::IncompleteOperator { glyph: '!', .. }));
    }

    #[test]
    fn errors_on_integer_overflow() {
        let err = tokenize("\n n = 99999999999", &Config::default()).expect_err("expected overflow");
        assert_eq!(
            err,
            LexError::IntegerOverflow {
                literal: "99999999999".to_string(),
                line: 2,
                column: 6,
            }
        );
    }

    #[test]
    fn errors_on_long_identifier() {
        let err = tokenize("abcdefghijklmnopqrstu", &Config::default()).expect_err("too long");
        assert!(err.to_string().contains("longer than 20 characters"));
    }

    #[test]
    fn load_tokens_interns_identifiers_in_order() {
        let tokens = tokenize("b a b", &Config::default()).expect("tokenize should succeed");
        let mut ast = Ast::new();
        let mut names = SymbolTable::new("variables", 8);
        let ids = load_tokens(&tokens, &mut ast, &mut names).expect("room");

        assert_eq!(ids.len(), 4);
        assert_eq!(ast.kind(ids[0]), NodeKind::Variable(0));
        assert_eq!(ast.kind(ids[1]), NodeKind::Variable(1));
        assert_eq!(ast.kind(ids[2]), NodeKind::Variable(0));
        assert_eq!(names.name(1), Some("a"));
    }
}
