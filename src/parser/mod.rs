/*
    This module parses rule bodies written in the rule syntax
*/

mod lexer;

use thiserror::Error;

use crate::error_handling::*;
use crate::grammar::Node;
use lexer::*;

#[derive(Debug, PartialEq, Clone, Error)]
pub enum SyntaxErrorType {
    // There is an unclosed quote
    #[error("Unmatched quotes")]
    UnmatchedQuote,
    // A `<` or `{` never got its closing bracket
    #[error("Expected `{0}` to close the reference")]
    UnterminatedReference(char),
    #[error("Reference has no name")]
    EmptyReference,
    // A `(` or `[` never got closed
    #[error("Unclosed `{0}`")]
    UnclosedGroup(char),
    #[error("Unexpected `{0}`")]
    UnexpectedCharacter(char),
    // `()`, `[]`, or an empty side of `|`
    #[error("Empty group or alternative")]
    EmptyGroup,
    #[error("`{0}` must follow a word, reference, or group")]
    MisplacedRepeat(char),
    #[error("Rule has no body")]
    EmptyRule,
}

impl ErrorType for SyntaxErrorType {}

pub type SyntaxError = Error<SyntaxErrorType>;

pub type Result<T> = std::result::Result<T, SyntaxErrorType>;
type ColumnResult<T> = std::result::Result<T, (SyntaxErrorType, usize)>;

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn column(&self) -> usize {
        match self.tokens.get(self.pos) {
            Some((_, column)) => *column,
            None => self.tokens.last().map(|(_, c)| *c).unwrap_or(0),
        }
    }

    fn fail<T>(&self, error: SyntaxErrorType) -> ColumnResult<T> {
        Err((error, self.column()))
    }

    // alternatives = sequence ("|" sequence)*
    fn parse_alternatives(&mut self) -> ColumnResult<Node> {
        let mut branches = vec![self.parse_sequence()?];
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            branches.push(self.parse_sequence()?);
        }

        if branches.len() == 1 {
            Ok(branches.remove(0))
        } else {
            Ok(Node::Alternation(branches))
        }
    }

    // sequence = item+ where item = atom ("*" | "+")?
    fn parse_sequence(&mut self) -> ColumnResult<Node> {
        let mut items = Vec::new();
        while let Some(item) = self.parse_atom()? {
            items.push(self.parse_repeat(item));
        }

        if items.is_empty() {
            return self.fail(SyntaxErrorType::EmptyGroup);
        }
        Ok(Node::Sequence(items))
    }

    fn parse_atom(&mut self) -> ColumnResult<Option<Node>> {
        let Some(token) = self.peek().cloned() else {
            return Ok(None);
        };
        let column = self.column();

        let node = match token {
            Token::Word(text) => Node::literal(text),
            Token::Rule(name) => Node::rule(name),
            Token::List(name) => Node::list(name),
            Token::OpenGroup => {
                self.pos += 1;
                let inner = self.parse_alternatives()?;
                self.expect(Token::CloseGroup, '(', column)?;
                return Ok(Some(inner));
            }
            Token::OpenOptional => {
                self.pos += 1;
                let inner = self.parse_alternatives()?;
                self.expect(Token::CloseOptional, '[', column)?;
                let children = match inner {
                    Node::Sequence(items) => items,
                    other => vec![other],
                };
                return Ok(Some(Node::Optional(children)));
            }
            Token::Star => return self.fail(SyntaxErrorType::MisplacedRepeat('*')),
            Token::Plus => return self.fail(SyntaxErrorType::MisplacedRepeat('+')),
            Token::Or | Token::CloseGroup | Token::CloseOptional => return Ok(None),
        };
        self.pos += 1;
        Ok(Some(node))
    }

    fn parse_repeat(&mut self, item: Node) -> Node {
        let repeated = |item: Node| match item {
            Node::Sequence(items) => Node::Repetition(items),
            other => Node::Repetition(vec![other]),
        };

        match self.peek() {
            Some(Token::Star) => {
                self.pos += 1;
                repeated(item)
            }
            // One or more is one copy followed by zero or more
            Some(Token::Plus) => {
                self.pos += 1;
                Node::Sequence(vec![item.clone(), repeated(item)])
            }
            _ => item,
        }
    }

    fn expect(&mut self, closer: Token, opener: char, column: usize) -> ColumnResult<()> {
        if self.peek() == Some(&closer) {
            self.pos += 1;
            Ok(())
        } else {
            Err((SyntaxErrorType::UnclosedGroup(opener), column))
        }
    }
}

fn parse_tokens(tokens: Vec<(Token, usize)>) -> ColumnResult<Node> {
    if tokens.is_empty() {
        return Err((SyntaxErrorType::EmptyRule, 0));
    }

    let mut parser = Parser { tokens, pos: 0 };
    let body = parser.parse_alternatives()?;

    // Anything left over is a closer without an opener
    match parser.peek() {
        Some(Token::CloseGroup) => parser.fail(SyntaxErrorType::UnexpectedCharacter(')')),
        Some(Token::CloseOptional) => parser.fail(SyntaxErrorType::UnexpectedCharacter(']')),
        Some(_) => parser.fail(SyntaxErrorType::EmptyGroup),
        None => Ok(body),
    }
}

// Parses one rule body. The result is a Sequence, or an Alternation when the
// body has a top-level `|`.
pub fn parse_rule(rule: &str, text: &str) -> std::result::Result<Node, SyntaxError> {
    lex_line(text)
        .and_then(parse_tokens)
        .map_err(|(error, column)| SyntaxError {
            location: Location::rule(rule).at(column),
            error,
        })
}
