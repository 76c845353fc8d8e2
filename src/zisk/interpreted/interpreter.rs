use std::cell::RefCell;
use std::io;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use tracing::{debug, trace, warn};

use crate::zisk::common::error::{convert_error, ErrorInfo, ZiskResult};
use crate::zisk::common::lexer::tokenize;
use crate::zisk::common::utils::{rcrc, RcRc};
use crate::zisk::interpreted::ast::{CatchClause, Expression, FunctionDef, Program, Statement};
use crate::zisk::interpreted::interpreter::environment::{Binding, Environment, Scope};
use crate::zisk::interpreted::interpreter::result::{Flow, InterpretResult, RuntimeError};
use crate::zisk::interpreted::interpreter::value::{ClassDescriptor, Instance, Module, ZiskValue};
use crate::zisk::interpreted::optimizer::optimize;
use crate::zisk::interpreted::interpreter::stack::StackGuard;
use crate::zisk::interpreted::parser::{parse_with_limit, DEFAULT_MAX_NESTING};
use crate::zisk::interpreted::transpiler::transpile;
use crate::zisk::interpreted::types::TypeSystem;

pub mod classes;
pub mod environment;
pub mod expression;
pub mod modules;
pub mod natives;
pub mod operators;
pub mod result;
pub mod stack;
pub mod value;

#[derive(Debug, Clone, PartialEq)]
pub struct InterpreterConfig {
    /// Nested function/method calls allowed before a RuntimeError is raised.
    pub max_call_depth: usize,
    /// Native stack an evaluation may use before calls fail with a RuntimeError. Must stay well
    /// below the stack size of the thread running the interpreter.
    pub max_stack_bytes: usize,
    /// How deeply statements and expressions may nest in source code.
    pub max_nesting: usize,
    pub max_import_depth: usize,
    /// Module paths are resolved against this directory.
    pub module_root: PathBuf,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            max_call_depth: 1000,
            // Half of the smallest thread stack in common use (2 MiB).
            max_stack_bytes: 1024 * 1024,
            max_nesting: DEFAULT_MAX_NESTING,
            max_import_depth: 32,
            module_root: PathBuf::from("."),
        }
    }
}

/// One execution context. Every imported module gets its own, sharing only the type system and
/// the IO streams with its importer.
pub struct Interpreter {
    environment: Environment,
    functions: IndexMap<String, Rc<FunctionDef>>,
    classes: IndexMap<String, Rc<ClassDescriptor>>,
    modules: IndexMap<String, Rc<Module>>,
    // The module this interpreter runs; dangling for the top-level one.
    home: Weak<Module>,
    type_system: RcRc<TypeSystem>,
    stack: Rc<StackGuard>,
    // The instance `este` refers to; `None` outside instance methods.
    receiver: Option<RcRc<Instance>>,
    loop_depth: usize,
    function_depth: usize,
    import_depth: usize,
    config: InterpreterConfig,
    output: Rc<RefCell<dyn Write>>,
    input: Rc<RefCell<dyn BufRead>>,
}

impl Default for Interpreter {
    fn default() -> Self { Interpreter::new() }
}

impl Interpreter {
    pub fn new() -> Self { Interpreter::with_config(InterpreterConfig::default()) }

    pub fn with_config(config: InterpreterConfig) -> Self {
        Interpreter {
            environment: Environment::new(),
            functions: IndexMap::new(),
            classes: IndexMap::new(),
            modules: IndexMap::new(),
            home: Weak::new(),
            type_system: rcrc(TypeSystem::new()),
            stack: Rc::new(StackGuard::default()),
            receiver: None,
            loop_depth: 0,
            function_depth: 0,
            import_depth: 0,
            config,
            output: Rc::new(RefCell::new(io::stdout())),
            input: Rc::new(RefCell::new(io::BufReader::new(io::stdin()))),
        }
    }

    /// Redirects what `mostrar` writes and what `ingresar` reads.
    pub fn with_streams(mut self, output: Rc<RefCell<dyn Write>>, input: Rc<RefCell<dyn BufRead>>) -> Self {
        self.output = output;
        self.input = input;
        self
    }

    // A fresh context for an imported module.
    fn for_module(&self) -> Interpreter {
        Interpreter {
            type_system: self.type_system.clone(),
            stack: self.stack.clone(),
            import_depth: self.import_depth + 1,
            config: self.config.clone(),
            output: self.output.clone(),
            input: self.input.clone(),
            ..Interpreter::with_config(self.config.clone())
        }
    }

    pub fn config(&self) -> &InterpreterConfig { &self.config }
    pub fn type_system(&self) -> &RcRc<TypeSystem> { &self.type_system }
    pub fn globals(&self) -> &Scope { self.environment.globals() }
    pub fn functions(&self) -> &IndexMap<String, Rc<FunctionDef>> { &self.functions }
    pub fn classes(&self) -> &IndexMap<String, Rc<ClassDescriptor>> { &self.classes }
    pub fn modules(&self) -> &IndexMap<String, Rc<Module>> { &self.modules }

    /// Runs `source` to completion. Returns the value of the last top-level statement along with
    /// the transpiled rendering of the program that ran.
    pub fn evaluate(&mut self, source: &str, optimize_ast: bool) -> ZiskResult<(ZiskValue, String)> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Ok((ZiskValue::Null, String::new()));
        }
        trace!(tokens = tokens.len(), "tokenized");
        let program = parse_with_limit(&tokens, self.config.max_nesting)?;
        let program = if optimize_ast { optimize(program) } else { program };
        let transpiled = transpile(&program);
        debug!(statements = program.statements.len(), optimized = optimize_ast, "executing program");
        let value = convert_error(self.execute_program(&program))?;
        Ok((value, transpiled))
    }

    pub fn execute_program(&mut self, program: &Program) -> InterpretResult<ZiskValue> {
        let entered = self.stack.enter();
        let result = self.execute_top_level(&program.statements);
        self.stack.leave(entered);
        result
    }

    fn execute_top_level(&mut self, statements: &[Statement]) -> InterpretResult<ZiskValue> {
        let mut last = ZiskValue::Null;
        for statement in statements {
            if let Flow::Normal(value) = self.execute(statement)? {
                last = value;
            }
        }
        Ok(last)
    }

    fn execute(&mut self, statement: &Statement) -> InterpretResult<Flow> {
        match statement {
            Statement::Block(statements) => self.execute_scoped(statements),
            Statement::Variable { name, declared_type, value, error_info } => {
                let value = match value {
                    Some(e) => self.evaluate_expression(e)?,
                    None => ZiskValue::Null,
                };
                self.declare_variable(name, declared_type, value, false, *error_info)?;
                Ok(Flow::Normal(ZiskValue::Null))
            }
            Statement::Constant { name, declared_type, value, error_info } => {
                let value = self.evaluate_expression(value)?;
                self.declare_variable(name, declared_type, value, true, *error_info)?;
                Ok(Flow::Normal(ZiskValue::Null))
            }
            Statement::Function(def) => {
                debug!(function = %def.name, arity = def.arity(), "declared function");
                self.functions.insert(def.name.to_owned(), Rc::new(def.clone()));
                Ok(Flow::Normal(ZiskValue::Null))
            }
            Statement::Class(def) => {
                self.declare_class(def)?;
                Ok(Flow::Normal(ZiskValue::Null))
            }
            Statement::Import { path, alias, error_info } => {
                self.import(path, alias.as_deref(), *error_info)?;
                Ok(Flow::Normal(ZiskValue::Null))
            }
            Statement::IfElse { cond, if_stmt, else_stmt } => {
                if self.evaluate_expression(cond)?.truthiness() {
                    self.execute(if_stmt)
                } else {
                    match else_stmt {
                        Some(else_stmt) => self.execute(else_stmt),
                        None => Ok(Flow::Normal(ZiskValue::Null)),
                    }
                }
            }
            Statement::While(cond, body) => self.execute_loop(None, Some(cond), None, body, true),
            Statement::DoWhile(body, cond) => self.execute_loop(None, Some(cond), None, body, false),
            Statement::For { init, cond, update, body } => {
                // The header's declarations live in a scope of their own, around every iteration.
                self.environment.push_scope();
                let result = self.execute_loop(init.as_deref(), cond.as_ref(), update.as_ref(), body, true);
                self.environment.pop_scope();
                result
            }
            Statement::Try { body, catch, finally } => self.execute_try(body, catch.as_ref(), finally.as_deref()),
            Statement::Break(info) | Statement::Continue(info) => {
                if self.loop_depth == 0 {
                    let keyword = if matches!(statement, Statement::Break(_)) { "break" } else { "continua" };
                    return Err(RuntimeError::general(format!("'{}' fuera de un bucle", keyword), *info));
                }
                Ok(if matches!(statement, Statement::Break(_)) { Flow::Break } else { Flow::Continue })
            }
            Statement::Return(value, info) => {
                if self.function_depth == 0 {
                    return Err(RuntimeError::general("'retorna' fuera de una función", *info));
                }
                let value = match value {
                    Some(e) => self.evaluate_expression(e)?,
                    None => ZiskValue::Null,
                };
                Ok(Flow::Return(value))
            }
            Statement::Expression(e) => self.evaluate_expression(e).map(Flow::Normal),
        }
    }

    // Scope cleanup happens whatever the body's outcome.
    fn execute_scoped(&mut self, statements: &[Statement]) -> InterpretResult<Flow> {
        self.environment.push_scope();
        let result = self.execute_statements(statements);
        self.environment.pop_scope();
        result
    }

    fn execute_statements(&mut self, statements: &[Statement]) -> InterpretResult<Flow> {
        let mut last = ZiskValue::Null;
        for statement in statements {
            match self.execute(statement)? {
                Flow::Normal(value) => last = value,
                transfer => return Ok(transfer),
            }
        }
        Ok(Flow::Normal(last))
    }

    fn declare_variable(
        &mut self,
        name: &str,
        declared_type: &Option<String>,
        value: ZiskValue,
        is_const: bool,
        info: ErrorInfo,
    ) -> InterpretResult<()> {
        if let Some(expected) = declared_type {
            let mut types = self.type_system.borrow_mut();
            if !types.is_known_type(expected) {
                warn!(variable = name, declared_type = %expected, "unknown type in annotation");
            }
            types.validate_assignment(&format!("la variable '{}'", name), &value, Some(expected), info)?;
            types.add_variable_annotation(name, expected.as_str());
        }
        let binding = if is_const {
            Binding::constant(value, declared_type.clone())
        } else {
            Binding::var(value, declared_type.clone())
        };
        if !self.environment.declare(name.to_owned(), binding) {
            return Err(RuntimeError::general(format!("No se puede redeclarar la constante '{}'", name), info));
        }
        Ok(())
    }

    // `check_first` is false only for `hacer_mientras`.
    fn execute_loop(
        &mut self,
        init: Option<&Statement>,
        cond: Option<&Expression>,
        update: Option<&Expression>,
        body: &Statement,
        check_first: bool,
    ) -> InterpretResult<Flow> {
        if let Some(init) = init {
            self.execute(init)?;
        }
        let mut first = true;
        loop {
            if check_first || !first {
                if let Some(cond) = cond {
                    if !self.evaluate_expression(cond)?.truthiness() {
                        break;
                    }
                }
            }
            first = false;
            self.loop_depth += 1;
            let flow = self.execute(body);
            self.loop_depth -= 1;
            match flow? {
                Flow::Break => break,
                Flow::Return(value) => return Ok(Flow::Return(value)),
                Flow::Normal(_) | Flow::Continue => {}
            }
            if let Some(update) = update {
                self.evaluate_expression(update)?;
            }
        }
        Ok(Flow::Normal(ZiskValue::Null))
    }

    /// A control transfer out of the body skips `catch` but not `finally`. When `finally` itself
    /// fails or transfers control, that outcome replaces whatever was propagating.
    fn execute_try(
        &mut self,
        body: &[Statement],
        catch: Option<&CatchClause>,
        finally: Option<&[Statement]>,
    ) -> InterpretResult<Flow> {
        let outcome = match (self.execute_scoped(body), catch) {
            (Err(err), Some(clause)) => {
                debug!(error = %err, "caught error");
                self.execute_catch(clause, err)
            }
            (outcome, _) => outcome,
        };
        match finally {
            None => outcome,
            Some(finally) => match self.execute_scoped(finally)? {
                Flow::Normal(_) => outcome,
                transfer => Ok(transfer),
            },
        }
    }

    fn execute_catch(&mut self, clause: &CatchClause, err: RuntimeError) -> InterpretResult<Flow> {
        self.environment.push_scope();
        self.environment.declare(clause.name.to_owned(), Binding::var(ZiskValue::Error(Rc::new(err)), None));
        let result = self.execute_statements(&clause.body);
        self.environment.pop_scope();
        result
    }

    pub(crate) fn write_line(&mut self, line: &str, info: &ErrorInfo) -> InterpretResult<()> {
        let mut output = self.output.borrow_mut();
        writeln!(output, "{}", line)
            .and_then(|_| output.flush())
            .map_err(|e| RuntimeError::general(format!("Error de escritura: {}", e), *info))
    }

    /// `None` at end of input.
    pub(crate) fn read_line(&mut self, prompt: Option<&str>, info: &ErrorInfo) -> InterpretResult<Option<String>> {
        let io_error = |e: io::Error| RuntimeError::general(format!("Error de lectura: {}", e), *info);
        if let Some(prompt) = prompt {
            let mut output = self.output.borrow_mut();
            write!(output, "{}", prompt).and_then(|_| output.flush()).map_err(io_error)?;
        }
        let mut line = String::new();
        if self.input.borrow_mut().read_line(&mut line).map_err(io_error)? == 0 {
            return Ok(None);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(Some(line))
    }
}
