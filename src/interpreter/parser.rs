//! # Parser
//!
//! Recursive descent over the token stream produced by [`super::token`].
//!
//! Precedence, lowest first: `||`, `&&`, equality, comparison, `+ -`, `* / %`,
//! unary `! -`. A statement ends at `;`, at a closing brace, at end of input or at
//! a line break.
//!
//! Nesting is bounded. Every nested statement, parenthesised or unary expression
//! and chained operator counts one level; past the limit parsing fails with a
//! syntax error instead of recursing further.

use tracing::debug;

use crate::{config::InterpreterConfig, eval::diagnostic::Location};

use super::{
    ast::{
        BinaryOperator, Expression, ExpressionKind, LogicalOperator, Program, Statement,
        StatementKind, UnaryOperator,
    },
    token::{tokenize, Delimiter, Keyword, Operator, Token, TokenSpan},
    value::Value,
    InterpreterError,
};

type ParseResult<T> = Result<T, InterpreterError>;

pub fn parse_program(source: &str) -> ParseResult<Program> {
    parse_program_with_limit(source, InterpreterConfig::default().max_depth)
}

#[tracing::instrument(level = "debug", skip(source))]
pub fn parse_program_with_limit(source: &str, max_depth: usize) -> ParseResult<Program> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(tokens, max_depth);
    let program = parser.program()?;
    debug!("Parsed {} statement(s)", program.statements.len());
    Ok(program)
}

struct Parser {
    tokens: Vec<TokenSpan>,
    position: usize,
    depth: usize,
    max_depth: usize,
}

impl Parser {
    fn new(tokens: Vec<TokenSpan>, max_depth: usize) -> Self {
        Self {
            tokens,
            position: 0,
            depth: 0,
            max_depth,
        }
    }

    fn program(&mut self) -> ParseResult<Program> {
        let mut statements = Vec::new();
        while !self.is_at_end() {
            statements.push(self.statement()?);
        }
        Ok(Program { statements })
    }

    fn statement(&mut self) -> ParseResult<Statement> {
        self.descend("Statement")?;
        let statement = self.statement_body()?;
        self.ascend(1);
        Ok(statement)
    }

    fn statement_body(&mut self) -> ParseResult<Statement> {
        let location = self.location();
        match self.peek() {
            Some(Token::Delimiter(Delimiter::Semicolon)) => {
                self.advance();
                Ok(Statement::new(StatementKind::Empty, location))
            }
            Some(Token::Delimiter(Delimiter::OpenBrace)) => self.block(),
            Some(Token::Keyword(Keyword::Let)) => self.declaration(true),
            Some(Token::Keyword(Keyword::Const)) => self.declaration(false),
            Some(Token::Keyword(Keyword::If)) => self.if_statement(),
            Some(Token::Keyword(Keyword::While)) => self.while_statement(),
            Some(Token::Identifier(name))
                if self.peek_at(1) == Some(&Token::Operator(Operator::Assign)) =>
            {
                let name = name.clone();
                self.advance();
                self.advance();
                let value = self.expression()?;
                self.terminator()?;
                Ok(Statement::new(
                    StatementKind::Assignment { name, value },
                    location,
                ))
            }
            _ => {
                let expression = self.expression()?;
                self.terminator()?;
                Ok(Statement::new(
                    StatementKind::Expression(expression),
                    location,
                ))
            }
        }
    }

    fn block(&mut self) -> ParseResult<Statement> {
        let location = self.location();
        self.expect_delimiter(Delimiter::OpenBrace)?;
        let mut statements = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Delimiter(Delimiter::CloseBrace)) => {
                    self.advance();
                    break;
                }
                None => return Err(self.error("Expected '}' before end of input.")),
                _ => statements.push(self.statement()?),
            }
        }
        Ok(Statement::new(StatementKind::Block(statements), location))
    }

    fn declaration(&mut self, mutable: bool) -> ParseResult<Statement> {
        let location = self.location();
        self.advance();
        let name = match self.peek() {
            Some(Token::Identifier(name)) => name.clone(),
            _ => return Err(self.error("Expected a name after declaration keyword.")),
        };
        self.advance();

        let initializer = if self.check(&Token::Operator(Operator::Assign)) {
            self.advance();
            Some(self.expression()?)
        } else if mutable {
            None
        } else {
            return Err(self.error(format!("Missing initializer in const declaration {}.", name)));
        };
        self.terminator()?;

        Ok(Statement::new(
            StatementKind::Declaration {
                name,
                mutable,
                initializer,
            },
            location,
        ))
    }

    fn if_statement(&mut self) -> ParseResult<Statement> {
        let location = self.location();
        self.advance();
        let condition = self.parenthesized()?;
        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.check(&Token::Keyword(Keyword::Else)) {
            self.advance();
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Statement::new(
            StatementKind::If {
                condition,
                then_branch,
                else_branch,
            },
            location,
        ))
    }

    fn while_statement(&mut self) -> ParseResult<Statement> {
        let location = self.location();
        self.advance();
        let condition = self.parenthesized()?;
        let body = Box::new(self.statement()?);
        Ok(Statement::new(
            StatementKind::While { condition, body },
            location,
        ))
    }

    fn parenthesized(&mut self) -> ParseResult<Expression> {
        self.expect_delimiter(Delimiter::OpenParen)?;
        let expression = self.expression()?;
        self.expect_delimiter(Delimiter::CloseParen)?;
        Ok(expression)
    }

    fn expression(&mut self) -> ParseResult<Expression> {
        self.descend("Expression")?;
        let expression = self.logical_or()?;
        self.ascend(1);
        Ok(expression)
    }

    fn logical_or(&mut self) -> ParseResult<Expression> {
        let mut left = self.logical_and()?;
        let mut chained = 0;
        while self.check(&Token::Operator(Operator::Or)) {
            self.chain(&mut chained)?;
            let location = self.location();
            self.advance();
            let right = self.logical_and()?;
            left = logical(LogicalOperator::Or, left, right, location);
        }
        self.ascend(chained);
        Ok(left)
    }

    fn logical_and(&mut self) -> ParseResult<Expression> {
        let mut left = self.equality()?;
        let mut chained = 0;
        while self.check(&Token::Operator(Operator::And)) {
            self.chain(&mut chained)?;
            let location = self.location();
            self.advance();
            let right = self.equality()?;
            left = logical(LogicalOperator::And, left, right, location);
        }
        self.ascend(chained);
        Ok(left)
    }

    fn equality(&mut self) -> ParseResult<Expression> {
        let mut left = self.comparison()?;
        let mut chained = 0;
        loop {
            let operator = match self.peek() {
                Some(Token::Operator(Operator::StrictEqual | Operator::Equal)) => {
                    BinaryOperator::Equal
                }
                Some(Token::Operator(Operator::StrictNotEqual | Operator::NotEqual)) => {
                    BinaryOperator::NotEqual
                }
                _ => break,
            };
            self.chain(&mut chained)?;
            let location = self.location();
            self.advance();
            let right = self.comparison()?;
            left = binary(operator, left, right, location);
        }
        self.ascend(chained);
        Ok(left)
    }

    fn comparison(&mut self) -> ParseResult<Expression> {
        let mut left = self.additive()?;
        let mut chained = 0;
        loop {
            let operator = match self.peek() {
                Some(Token::Operator(Operator::Less)) => BinaryOperator::Less,
                Some(Token::Operator(Operator::LessEqual)) => BinaryOperator::LessEqual,
                Some(Token::Operator(Operator::Greater)) => BinaryOperator::Greater,
                Some(Token::Operator(Operator::GreaterEqual)) => BinaryOperator::GreaterEqual,
                _ => break,
            };
            self.chain(&mut chained)?;
            let location = self.location();
            self.advance();
            let right = self.additive()?;
            left = binary(operator, left, right, location);
        }
        self.ascend(chained);
        Ok(left)
    }

    fn additive(&mut self) -> ParseResult<Expression> {
        let mut left = self.multiplicative()?;
        let mut chained = 0;
        loop {
            let operator = match self.peek() {
                Some(Token::Operator(Operator::Plus)) => BinaryOperator::Add,
                Some(Token::Operator(Operator::Minus)) => BinaryOperator::Subtract,
                _ => break,
            };
            self.chain(&mut chained)?;
            let location = self.location();
            self.advance();
            let right = self.multiplicative()?;
            left = binary(operator, left, right, location);
        }
        self.ascend(chained);
        Ok(left)
    }

    fn multiplicative(&mut self) -> ParseResult<Expression> {
        let mut left = self.unary()?;
        let mut chained = 0;
        loop {
            let operator = match self.peek() {
                Some(Token::Operator(Operator::Multiply)) => BinaryOperator::Multiply,
                Some(Token::Operator(Operator::Divide)) => BinaryOperator::Divide,
                Some(Token::Operator(Operator::Modulo)) => BinaryOperator::Modulo,
                _ => break,
            };
            self.chain(&mut chained)?;
            let location = self.location();
            self.advance();
            let right = self.unary()?;
            left = binary(operator, left, right, location);
        }
        self.ascend(chained);
        Ok(left)
    }

    fn unary(&mut self) -> ParseResult<Expression> {
        let location = self.location();
        let operator = match self.peek() {
            Some(Token::Operator(Operator::Minus)) => UnaryOperator::Negate,
            Some(Token::Operator(Operator::Not)) => UnaryOperator::Not,
            _ => return self.primary(),
        };
        self.descend("Expression")?;
        self.advance();
        let operand = Box::new(self.unary()?);
        self.ascend(1);
        Ok(Expression::new(
            ExpressionKind::Unary { operator, operand },
            location,
        ))
    }

    fn primary(&mut self) -> ParseResult<Expression> {
        let location = self.location();
        let kind = match self.peek() {
            Some(Token::Number(n)) => ExpressionKind::Literal(Value::Number(*n)),
            Some(Token::String(s)) => ExpressionKind::Literal(Value::String(s.clone())),
            Some(Token::Keyword(Keyword::True)) => ExpressionKind::Literal(Value::Boolean(true)),
            Some(Token::Keyword(Keyword::False)) => {
                ExpressionKind::Literal(Value::Boolean(false))
            }
            Some(Token::Keyword(Keyword::Null)) => ExpressionKind::Literal(Value::Null),
            Some(Token::Keyword(Keyword::Undefined)) => ExpressionKind::Literal(Value::Undefined),
            Some(Token::Identifier(name)) => ExpressionKind::Variable(name.clone()),
            Some(Token::Delimiter(Delimiter::OpenParen)) => {
                self.advance();
                let expression = self.expression()?;
                self.expect_delimiter(Delimiter::CloseParen)?;
                return Ok(expression);
            }
            Some(token) => {
                let message = format!("Unexpected token {}.", describe(token));
                return Err(self.error(message));
            }
            None => return Err(self.error("Unexpected end of input.")),
        };
        self.advance();
        Ok(Expression::new(kind, location))
    }

    fn terminator(&mut self) -> ParseResult<()> {
        match self.peek() {
            Some(Token::Delimiter(Delimiter::Semicolon)) => {
                self.advance();
                Ok(())
            }
            None | Some(Token::Delimiter(Delimiter::CloseBrace)) => Ok(()),
            Some(_) if self.on_new_line() => Ok(()),
            Some(token) => {
                let message = format!("Expected ';' but found {}.", describe(token));
                Err(self.error(message))
            }
        }
    }

    fn expect_delimiter(&mut self, delimiter: Delimiter) -> ParseResult<()> {
        if self.check(&Token::Delimiter(delimiter)) {
            self.advance();
            Ok(())
        } else {
            let found = self
                .peek()
                .map(describe)
                .unwrap_or_else(|| "end of input".to_string());
            Err(self.error(format!("Expected '{}' but found {}.", delimiter, found)))
        }
    }

    fn descend(&mut self, what: &str) -> ParseResult<()> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(self.error(format!("{} nested too deeply.", what)));
        }
        Ok(())
    }

    fn ascend(&mut self, levels: usize) {
        self.depth = self.depth.saturating_sub(levels);
    }

    /// One more operator folded into a left-associative chain.
    fn chain(&mut self, chained: &mut usize) -> ParseResult<()> {
        self.descend("Expression")?;
        *chained += 1;
        Ok(())
    }

    fn on_new_line(&self) -> bool {
        match (
            self.position.checked_sub(1).and_then(|i| self.tokens.get(i)),
            self.tokens.get(self.position),
        ) {
            (Some(previous), Some(current)) => current.line > previous.line,
            _ => false,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.position + offset).map(|span| &span.token)
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == Some(token)
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.tokens.len()
    }

    fn location(&self) -> Location {
        self.tokens
            .get(self.position)
            .or_else(|| self.tokens.last())
            .map(TokenSpan::location)
            .unwrap_or_else(|| Location::new(1, 1))
    }

    fn error(&self, message: impl Into<String>) -> InterpreterError {
        InterpreterError::Syntax {
            message: message.into(),
            location: Some(self.location()),
        }
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Keyword(keyword) => format!("'{}'", keyword),
        Token::Identifier(name) => format!("'{}'", name),
        Token::Number(n) => format!("'{}'", Value::Number(*n)),
        Token::String(s) => format!("'\"{}\"'", s),
        Token::Operator(operator) => format!("'{}'", operator),
        Token::Delimiter(delimiter) => format!("'{}'", delimiter),
        Token::Trivia => "whitespace".to_string(),
    }
}

fn binary(
    operator: BinaryOperator,
    left: Expression,
    right: Expression,
    location: Location,
) -> Expression {
    Expression::new(
        ExpressionKind::Binary {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        },
        location,
    )
}

fn logical(
    operator: LogicalOperator,
    left: Expression,
    right: Expression,
    location: Location,
) -> Expression {
    Expression::new(
        ExpressionKind::Logical {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        },
        location,
    )
}
