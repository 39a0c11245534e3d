//! # Tokenizer
//!
//! Splits source text into tokens with their line and column. Whitespace and
//! comments are consumed here; newlines are not emitted but are visible to the
//! parser through the line numbers, which is how optional semicolons work.

use strum_macros::{Display, EnumString};

use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, is_not, tag, take_until, take_while, take_while1},
    character::complete::{char, digit1, multispace1, not_line_ending},
    combinator::{map, map_res, opt, recognize, value},
    error::{context, VerboseError},
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};

use crate::eval::diagnostic::Location;

use super::InterpreterError;

pub type ParserResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Keyword {
    Let,
    Const,
    If,
    Else,
    While,
    True,
    False,
    Null,
    Undefined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Operator {
    #[strum(serialize = "===")]
    StrictEqual,
    #[strum(serialize = "!==")]
    StrictNotEqual,
    #[strum(serialize = "==")]
    Equal,
    #[strum(serialize = "!=")]
    NotEqual,
    #[strum(serialize = "<=")]
    LessEqual,
    #[strum(serialize = ">=")]
    GreaterEqual,
    #[strum(serialize = "&&")]
    And,
    #[strum(serialize = "||")]
    Or,
    #[strum(serialize = "<")]
    Less,
    #[strum(serialize = ">")]
    Greater,
    #[strum(serialize = "+")]
    Plus,
    #[strum(serialize = "-")]
    Minus,
    #[strum(serialize = "*")]
    Multiply,
    #[strum(serialize = "/")]
    Divide,
    #[strum(serialize = "%")]
    Modulo,
    #[strum(serialize = "!")]
    Not,
    #[strum(serialize = "=")]
    Assign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    OpenParen,
    CloseParen,
    OpenBrace,
    CloseBrace,
    Semicolon,
}

// Written by hand: strum's `Display` derive rejects a lone `}` in `serialize`.
impl std::fmt::Display for Delimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Delimiter::OpenParen => "(",
            Delimiter::CloseParen => ")",
            Delimiter::OpenBrace => "{",
            Delimiter::CloseBrace => "}",
            Delimiter::Semicolon => ";",
        };
        f.pad(text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Keyword(Keyword),
    Identifier(String),
    Number(f64),
    String(String),
    Operator(Operator),
    Delimiter(Delimiter),
    /// Whitespace or a comment; dropped from the token stream.
    Trivia,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenSpan {
    pub token: Token,
    pub line: usize,
    pub column: usize,
}

impl TokenSpan {
    pub fn location(&self) -> Location {
        Location::new(self.line, self.column)
    }
}

#[tracing::instrument(level = "debug", skip(input))]
fn parse_trivia(input: &str) -> ParserResult<Token> {
    context(
        "trivia",
        value(
            Token::Trivia,
            alt((
                multispace1,
                preceded(tag("//"), not_line_ending),
                delimited(tag("/*"), take_until("*/"), tag("*/")),
            )),
        ),
    )(input)
}

fn parse_number(input: &str) -> ParserResult<Token> {
    context(
        "number",
        map_res(
            recognize(tuple((digit1, opt(pair(char('.'), digit1))))),
            |digits: &str| digits.parse::<f64>().map(Token::Number),
        ),
    )(input)
}

fn string_body(quote: char) -> impl FnMut(&str) -> ParserResult<String> {
    move |input: &str| {
        let stop: &str = if quote == '"' { "\"\\\n" } else { "'\\\n" };
        let (input, body) = opt(escaped_transform(
            is_not(stop),
            '\\',
            alt((
                value("\\", tag("\\")),
                value("\"", tag("\"")),
                value("'", tag("'")),
                value("\n", tag("n")),
                value("\t", tag("t")),
            )),
        ))(input)?;
        Ok((input, body.unwrap_or_default()))
    }
}

#[tracing::instrument(level = "debug", skip(input))]
fn parse_string(input: &str) -> ParserResult<Token> {
    context(
        "string",
        map(
            alt((
                delimited(char('"'), string_body('"'), char('"')),
                delimited(char('\''), string_body('\''), char('\'')),
            )),
            Token::String,
        ),
    )(input)
}

fn parse_word(input: &str) -> ParserResult<Token> {
    let (input, word) = context(
        "identifier",
        recognize(pair(
            take_while1(|c: char| c.is_alphabetic() || c == '_' || c == '$'),
            take_while(|c: char| c.is_alphanumeric() || c == '_' || c == '$'),
        )),
    )(input)?;

    match word.parse::<Keyword>() {
        Ok(keyword) => Ok((input, Token::Keyword(keyword))),
        Err(_) => Ok((input, Token::Identifier(word.to_string()))),
    }
}

fn parse_operator(input: &str) -> ParserResult<Token> {
    let (input, operator) = context(
        "operator",
        alt((
            alt((
                value(Operator::StrictEqual, tag("===")),
                value(Operator::StrictNotEqual, tag("!==")),
                value(Operator::Equal, tag("==")),
                value(Operator::NotEqual, tag("!=")),
                value(Operator::LessEqual, tag("<=")),
                value(Operator::GreaterEqual, tag(">=")),
                value(Operator::And, tag("&&")),
                value(Operator::Or, tag("||")),
            )),
            alt((
                value(Operator::Less, tag("<")),
                value(Operator::Greater, tag(">")),
                value(Operator::Plus, tag("+")),
                value(Operator::Minus, tag("-")),
                value(Operator::Multiply, tag("*")),
                value(Operator::Divide, tag("/")),
                value(Operator::Modulo, tag("%")),
                value(Operator::Not, tag("!")),
                value(Operator::Assign, tag("=")),
            )),
        )),
    )(input)?;
    Ok((input, Token::Operator(operator)))
}

fn parse_delimiter(input: &str) -> ParserResult<Token> {
    let (input, delimiter) = context(
        "delimiter",
        alt((
            value(Delimiter::OpenParen, char('(')),
            value(Delimiter::CloseParen, char(')')),
            value(Delimiter::OpenBrace, char('{')),
            value(Delimiter::CloseBrace, char('}')),
            value(Delimiter::Semicolon, char(';')),
        )),
    )(input)?;
    Ok((input, Token::Delimiter(delimiter)))
}

#[derive(Debug, Clone)]
pub struct Tokenizer {
    current_line: usize,
    current_column: usize,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer {
    pub fn new() -> Self {
        Self {
            current_line: 1,
            current_column: 1,
        }
    }

    #[tracing::instrument(level = "debug", skip(self, input))]
    pub fn tokenize(&mut self, input: &str) -> Result<Vec<TokenSpan>, InterpreterError> {
        let mut tokens = Vec::new();
        let mut remaining = input;

        while !remaining.is_empty() {
            let line = self.current_line;
            let column = self.current_column;

            let result = alt((
                parse_trivia,
                parse_number,
                parse_string,
                parse_word,
                parse_operator,
                parse_delimiter,
            ))(remaining);

            match result {
                Ok((rest, token)) => {
                    let consumed = &remaining[..remaining.len() - rest.len()];
                    self.update_position(consumed);
                    if token != Token::Trivia {
                        tokens.push(TokenSpan {
                            token,
                            line,
                            column,
                        });
                    }
                    remaining = rest;
                }
                Err(_) => {
                    let found: String = remaining.chars().take(1).collect();
                    let message = if found == "\"" || found == "'" {
                        "Unterminated string literal.".to_string()
                    } else {
                        format!("Unexpected character '{}'.", found)
                    };
                    return Err(InterpreterError::Syntax {
                        message,
                        location: Some(Location::new(line, column)),
                    });
                }
            }
        }

        Ok(tokens)
    }

    fn update_position(&mut self, text: &str) {
        for c in text.chars() {
            if c == '\n' {
                self.current_line += 1;
                self.current_column = 1;
            } else {
                self.current_column += 1;
            }
        }
    }
}

pub fn tokenize(input: &str) -> Result<Vec<TokenSpan>, InterpreterError> {
    Tokenizer::new().tokenize(input)
}
