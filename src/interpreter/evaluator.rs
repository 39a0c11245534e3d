//! # Source Interpreter
//!
//! Tree-walking evaluator for the built-in language.
//!
//! Top-level `let`/`const` bindings live on the [`ExecutionContext`], so they
//! survive between REPL submissions and disappear when the editor resets the
//! context. Bindings declared inside a block are local to this run.
//!
//! Every statement and every loop iteration is a step. A step checks the run
//! token, enforces the optional step budget and periodically yields to the
//! scheduler so an interrupt can be observed even in a tight loop.
//!
//! [`ExecutionContext`]: crate::eval::context::ExecutionContext

use std::collections::HashMap;

use async_recursion::async_recursion;
use async_trait::async_trait;
use tracing::{debug, trace};

use crate::{
    config::InterpreterConfig,
    eval::{
        context::{Binding, ContextError},
        diagnostic::Location,
        request::{EvaluationOutcome, EvaluationRequest},
    },
};

use super::{
    ast::{
        BinaryOperator, Expression, ExpressionKind, LogicalOperator, Statement, StatementKind,
        UnaryOperator,
    },
    parser::parse_program_with_limit,
    value::Value,
    Interpreter, InterpreterError,
};

type EvalResult<T> = Result<T, InterpreterError>;

pub struct SourceInterpreter {
    config: InterpreterConfig,
}

impl Default for SourceInterpreter {
    fn default() -> Self {
        Self::new(InterpreterConfig::default())
    }
}

impl SourceInterpreter {
    pub fn new(config: InterpreterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// Parses and executes the request's code, returning the program value.
    pub async fn execute(&self, request: &EvaluationRequest) -> EvalResult<Value> {
        let program = parse_program_with_limit(request.code(), self.config.max_depth)?;
        let mut run = Run::new(request.clone(), self.config.clone());
        for statement in &program.statements {
            run.statement(statement).await?;
        }
        debug!("Run {} took {} step(s)", request.token().id(), run.steps);
        Ok(run.completion)
    }
}

#[async_trait]
impl Interpreter for SourceInterpreter {
    async fn run(&self, request: &EvaluationRequest) -> EvaluationOutcome {
        let error = match self.execute(request).await {
            Ok(value) if !request.is_interrupted() => return EvaluationOutcome::finished(value),
            Ok(_) => return EvaluationOutcome::Interrupted,
            Err(e) => e,
        };

        if error.is_interruption() {
            return EvaluationOutcome::Interrupted;
        }
        let diagnostic = error.to_diagnostic();
        match request
            .context()
            .push_error(request.token(), diagnostic)
            .await
        {
            Ok(()) => EvaluationOutcome::ErrorRaised,
            Err(_) => EvaluationOutcome::Interrupted,
        }
    }
}

/// State of one execution.
struct Run {
    request: EvaluationRequest,
    config: InterpreterConfig,
    scopes: Vec<HashMap<String, Binding>>,
    steps: u64,
    completion: Value,
}

impl Run {
    fn new(request: EvaluationRequest, config: InterpreterConfig) -> Self {
        Self {
            request,
            config,
            scopes: Vec::new(),
            steps: 0,
            completion: Value::Undefined,
        }
    }

    async fn step(&mut self, location: Location) -> EvalResult<()> {
        if self.request.is_interrupted() {
            return Err(InterpreterError::Interrupted);
        }
        self.steps += 1;
        if let Some(limit) = self.config.max_steps {
            if self.steps > limit {
                return Err(InterpreterError::StepLimitExceeded {
                    limit,
                    location: Some(location),
                });
            }
        }
        if self.steps % self.config.yield_interval.max(1) == 0 {
            trace!("Yielding after {} steps", self.steps);
            tokio::task::yield_now().await;
            if self.request.is_interrupted() {
                return Err(InterpreterError::Interrupted);
            }
        }
        Ok(())
    }

    #[async_recursion]
    async fn statement(&mut self, statement: &Statement) -> EvalResult<()> {
        self.step(statement.location).await?;
        let location = statement.location;

        match &statement.kind {
            StatementKind::Empty => Ok(()),
            StatementKind::Expression(expression) => {
                self.completion = self.expression(expression).await?;
                Ok(())
            }
            StatementKind::Declaration {
                name,
                mutable,
                initializer,
            } => {
                let value = match initializer {
                    Some(expression) => self.expression(expression).await?,
                    None => Value::Undefined,
                };
                self.declare(name, value, *mutable, location).await
            }
            StatementKind::Assignment { name, value } => {
                let value = self.expression(value).await?;
                self.assign(name, value, location).await
            }
            StatementKind::Block(statements) => {
                self.scopes.push(HashMap::new());
                let mut result = Ok(());
                for statement in statements {
                    result = self.statement(statement).await;
                    if result.is_err() {
                        break;
                    }
                }
                self.scopes.pop();
                result
            }
            StatementKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.expression(condition).await?.is_truthy() {
                    self.statement(then_branch).await
                } else if let Some(else_branch) = else_branch {
                    self.statement(else_branch).await
                } else {
                    Ok(())
                }
            }
            StatementKind::While { condition, body } => {
                while self.expression(condition).await?.is_truthy() {
                    self.statement(body).await?;
                    self.step(location).await?;
                }
                Ok(())
            }
        }
    }

    #[async_recursion]
    async fn expression(&mut self, expression: &Expression) -> EvalResult<Value> {
        let location = expression.location;
        match &expression.kind {
            ExpressionKind::Literal(value) => Ok(value.clone()),
            ExpressionKind::Variable(name) => self.lookup(name, location).await,
            ExpressionKind::Unary { operator, operand } => {
                let operand = self.expression(operand).await?;
                unary(*operator, operand, location)
            }
            ExpressionKind::Binary {
                operator,
                left,
                right,
            } => {
                let left = self.expression(left).await?;
                let right = self.expression(right).await?;
                binary(*operator, left, right, location)
            }
            ExpressionKind::Logical {
                operator,
                left,
                right,
            } => {
                let left = self.expression(left).await?;
                let short_circuit = match operator {
                    LogicalOperator::And => !left.is_truthy(),
                    LogicalOperator::Or => left.is_truthy(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.expression(right).await
                }
            }
        }
    }

    async fn lookup(&self, name: &str, location: Location) -> EvalResult<Value> {
        for scope in self.scopes.iter().rev() {
            if let Some(binding) = scope.get(name) {
                return Ok(binding.value.clone());
            }
        }
        self.request
            .context()
            .lookup(name)
            .await
            .ok_or_else(|| {
                InterpreterError::from_context(ContextError::NotDeclared(name.to_string()), location)
            })
    }

    async fn declare(
        &mut self,
        name: &str,
        value: Value,
        mutable: bool,
        location: Location,
    ) -> EvalResult<()> {
        match self.scopes.last_mut() {
            Some(scope) => {
                if scope.contains_key(name) {
                    return Err(InterpreterError::from_context(
                        ContextError::AlreadyDeclared(name.to_string()),
                        location,
                    ));
                }
                scope.insert(name.to_string(), Binding { value, mutable });
                Ok(())
            }
            None => self
                .request
                .context()
                .declare(self.request.token(), name, value, mutable)
                .await
                .map_err(|e| InterpreterError::from_context(e, location)),
        }
    }

    async fn assign(&mut self, name: &str, value: Value, location: Location) -> EvalResult<()> {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(binding) = scope.get_mut(name) {
                if !binding.mutable {
                    return Err(InterpreterError::from_context(
                        ContextError::ConstantAssignment(name.to_string()),
                        location,
                    ));
                }
                binding.value = value;
                return Ok(());
            }
        }
        self.request
            .context()
            .assign(self.request.token(), name, value)
            .await
            .map_err(|e| InterpreterError::from_context(e, location))
    }
}

fn type_error(message: String, location: Location) -> InterpreterError {
    InterpreterError::Type {
        message,
        location: Some(location),
    }
}

fn unary(operator: UnaryOperator, operand: Value, location: Location) -> EvalResult<Value> {
    match (operator, operand) {
        (UnaryOperator::Not, operand) => Ok(Value::Boolean(!operand.is_truthy())),
        (UnaryOperator::Negate, Value::Number(n)) => Ok(Value::Number(-n)),
        (UnaryOperator::Negate, operand) => Err(type_error(
            format!("Cannot negate a {}.", operand.type_name()),
            location,
        )),
    }
}

fn binary(
    operator: BinaryOperator,
    left: Value,
    right: Value,
    location: Location,
) -> EvalResult<Value> {
    use BinaryOperator::*;

    match (operator, &left, &right) {
        (Equal, _, _) => Ok(Value::Boolean(left == right)),
        (NotEqual, _, _) => Ok(Value::Boolean(left != right)),
        (Add, Value::String(_), _) | (Add, _, Value::String(_)) => {
            Ok(Value::String(left.to_text() + &right.to_text()))
        }
        (Divide | Modulo, Value::Number(_), Value::Number(r)) if *r == 0.0 => {
            Err(InterpreterError::Runtime {
                message: "Division by zero.".to_string(),
                location: Some(location),
            })
        }
        (_, Value::Number(l), Value::Number(r)) => {
            let (l, r) = (*l, *r);
            Ok(match operator {
                Add => Value::Number(l + r),
                Subtract => Value::Number(l - r),
                Multiply => Value::Number(l * r),
                Divide => Value::Number(l / r),
                Modulo => Value::Number(l % r),
                Less => Value::Boolean(l < r),
                LessEqual => Value::Boolean(l <= r),
                Greater => Value::Boolean(l > r),
                _ => Value::Boolean(l >= r),
            })
        }
        (Less | LessEqual | Greater | GreaterEqual, Value::String(l), Value::String(r)) => {
            Ok(Value::Boolean(match operator {
                Less => l < r,
                LessEqual => l <= r,
                Greater => l > r,
                _ => l >= r,
            }))
        }
        _ => Err(type_error(
            format!(
                "Operator {} cannot be applied to {} and {}.",
                operator,
                left.type_name(),
                right.type_name()
            ),
            location,
        )),
    }
}
