use itertools::{Itertools, PeekingNext};

use super::{Result, SyntaxErrorType};

#[derive(PartialEq, Debug, Clone)]
pub enum Token {
    Word(String),
    Rule(String),
    List(String),
    OpenGroup,
    CloseGroup,
    OpenOptional,
    CloseOptional,
    Or,
    Star,
    Plus,
}

fn is_special(c: char) -> bool {
    "()[]<>{}|*+\"".contains(c)
}

pub fn lex_quoted(line: &mut impl PeekingNext<Item = char>) -> Result<Token> {
    line.next(); // Consume open quote
    let token_text = line.peeking_take_while(|&c| c != '\"').collect();

    // Check if there is a close quote and consume it if there is
    if line.next() != Some('\"') {
        return Err(SyntaxErrorType::UnmatchedQuote);
    }

    Ok(Token::Word(token_text))
}

// Lexes `<name>` or `{name}` once the opening bracket has been peeked
pub fn lex_reference(line: &mut impl PeekingNext<Item = char>) -> Result<Token> {
    let open = line.next();
    let close = if open == Some('<') { '>' } else { '}' };
    let name: String = line.peeking_take_while(|&c| c != close).collect();

    if line.next() != Some(close) {
        return Err(SyntaxErrorType::UnterminatedReference(close));
    }
    let name = name.trim();
    if name.is_empty() {
        return Err(SyntaxErrorType::EmptyReference);
    }

    if close == '>' {
        Ok(Token::Rule(name.to_string()))
    } else {
        Ok(Token::List(name.to_string()))
    }
}

pub fn lex_word(line: &mut impl PeekingNext<Item = char>) -> Result<Token> {
    Ok(Token::Word(line.peeking_take_while(|&c| !c.is_whitespace() && !is_special(c)).collect()))
}

// Returns every token with the 1-based column it starts at
pub fn lex_line(line: &str) -> std::result::Result<Vec<(Token, usize)>, (SyntaxErrorType, usize)> {
    let mut tokens = Vec::new();

    let mut line_chars = line.chars();
    let mut column = 1;

    while let Some(c) = line_chars.clone().next() {
        let before = line_chars.as_str();
        let token = match c {
            '(' => Some(Token::OpenGroup),
            ')' => Some(Token::CloseGroup),
            '[' => Some(Token::OpenOptional),
            ']' => Some(Token::CloseOptional),
            '|' => Some(Token::Or),
            '*' => Some(Token::Star),
            '+' => Some(Token::Plus),
            _ => None,
        };
        if let Some(token) = token {
            line_chars.next();
            tokens.push((token, column));
        } else if c == '\"' {
            tokens.push((lex_quoted(&mut line_chars).map_err(|e| (e, column))?, column));
        } else if c == '<' || c == '{' {
            tokens.push((lex_reference(&mut line_chars).map_err(|e| (e, column))?, column));
        } else if c == '>' || c == '}' {
            return Err((SyntaxErrorType::UnexpectedCharacter(c), column));
        } else if !c.is_whitespace() {
            tokens.push((lex_word(&mut line_chars).map_err(|e| (e, column))?, column));
        } else {
            line_chars.next();
        }
        // Only the text consumed by this token is counted
        let consumed = before.len() - line_chars.as_str().len();
        column += before[..consumed].chars().count();
    }

    return Ok(tokens);
}
