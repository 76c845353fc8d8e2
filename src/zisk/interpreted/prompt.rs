use std::fs;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{debug, warn};

use crate::zisk::common::error::ZiskError;
use crate::zisk::common::lexer::{tokenize, TokenType};
use crate::zisk::common::utils::mk_string;
use crate::zisk::interpreted::ast::Statement;
use crate::zisk::interpreted::interpreter::value::ZiskValue;
use crate::zisk::interpreted::interpreter::Interpreter;
use crate::zisk::interpreted::parser::parse;

const PROMPT: &str = "zisk> ";
const CONTINUATION_PROMPT: &str = "  ... ";

const HELP: &str = "\
Comandos disponibles:
  :ayuda           muestra esta ayuda
  :salir           termina la sesión
  :cargar <ruta>   ejecuta un archivo en la sesión actual
  :vars            variables globales
  :funcs           funciones definidas
  :clases          clases definidas
  :modulos         módulos importados
  :tokens <código> muestra los tokens del código
  :ast <código>    muestra el árbol sintáctico del código
Una línea vacía termina una entrada de varias líneas.";

#[derive(Debug, PartialEq, Clone)]
pub enum Command {
    Help,
    Quit,
    Load(String),
    Vars,
    Functions,
    Classes,
    Modules,
    Tokens(String),
    Ast(String),
    Unknown(String),
}

impl Command {
    /// `None` when the line is code rather than a `:` command.
    pub fn parse(line: &str) -> Option<Command> {
        let line = line.trim().strip_prefix(':')?;
        let (name, argument) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let argument = argument.trim().to_owned();
        let command = match name {
            "ayuda" => Command::Help,
            "salir" => Command::Quit,
            "cargar" => Command::Load(argument),
            "vars" => Command::Vars,
            "funcs" => Command::Functions,
            "clases" => Command::Classes,
            "modulos" => Command::Modules,
            "tokens" => Command::Tokens(argument),
            "ast" => Command::Ast(argument),
            other => Command::Unknown(other.to_owned()),
        };
        Some(command)
    }
}

/// Whether `source` can be run as is, or the shell should keep reading lines: brackets are still
/// open, or the last token is an opening bracket or a comma.
pub fn is_complete(source: &str) -> bool {
    let tokens = match tokenize(source) {
        Ok(tokens) => tokens,
        // Lexing errors are reported on evaluation.
        Err(_) => return true,
    };
    let mut depth: i64 = 0;
    for token in &tokens {
        match token.get_type() {
            TokenType::OpenParen | TokenType::OpenBrace | TokenType::OpenBracket => depth += 1,
            TokenType::CloseParen | TokenType::CloseBrace | TokenType::CloseBracket => depth -= 1,
            _ => (),
        }
    }
    let dangling = matches!(
        tokens.last().map(|t| t.get_type()),
        Some(TokenType::OpenParen | TokenType::OpenBrace | TokenType::OpenBracket | TokenType::Comma)
    );
    depth <= 0 && !dangling
}

fn describe_error(error: &dyn ZiskError) -> String {
    format!("{}: {}", error.get_kind().name(), error)
}

/// The interpreter behind the shell, with the line editing left out.
pub struct Session {
    interpreter: Interpreter,
    optimize: bool,
}

impl Session {
    pub fn new(interpreter: Interpreter, optimize: bool) -> Self { Session { interpreter, optimize } }

    pub fn interpreter(&self) -> &Interpreter { &self.interpreter }

    /// Runs `source` and renders the outcome; `None` when there is nothing to show.
    pub fn eval(&mut self, source: &str) -> Option<String> {
        match self.interpreter.evaluate(source, self.optimize) {
            Ok((ZiskValue::Null, _)) => None,
            Ok((value, _)) => Some(value.repr()),
            Err(e) => Some(describe_error(e.as_ref())),
        }
    }

    /// The text to show for `command`; `None` for `:salir`.
    pub fn run_command(&mut self, command: Command) -> Option<String> {
        let output = match command {
            Command::Quit => return None,
            Command::Help => HELP.to_owned(),
            Command::Load(path) if path.is_empty() => "Uso: :cargar <ruta>".to_owned(),
            Command::Load(path) => match fs::read_to_string(&path) {
                Ok(source) => self.eval(&source).unwrap_or_default(),
                Err(e) => format!("No se pudo leer '{}': {}", path, e),
            },
            Command::Vars => listing(self.interpreter.globals().iter().map(|(name, binding)| {
                let kind = if binding.is_const { "const" } else { "var" };
                let declared = binding.declared_type.as_ref().map(|t| format!(": {}", t)).unwrap_or_default();
                format!("{} {}{} = {}", kind, name, declared, binding.value.repr())
            })),
            Command::Functions => listing(self.interpreter.functions().values().map(|def| {
                let returns = def.return_type.as_ref().map(|t| format!(": {}", t)).unwrap_or_default();
                format!("{}({}){}", def.name, def.param_names().join(", "), returns)
            })),
            Command::Classes => listing(self.interpreter.classes().values().map(|class| match class.superclass_name() {
                Some(superclass) => format!("{} extiende {}", class.name, superclass),
                None => class.name.clone(),
            })),
            Command::Modules => listing(self.interpreter.modules().values().map(|module| {
                format!("{} ({})", module.name, module.path.display())
            })),
            Command::Tokens(code) => match tokenize(&code) {
                Ok(tokens) => listing(tokens.iter().map(|t| format!("{}:{} {}", t.line, t.column, t.get_type()))),
                Err(e) => describe_error(e.as_ref()),
            },
            Command::Ast(code) => match tokenize(&code).and_then(|tokens| parse(&tokens)) {
                Ok(program) => listing(program.statements.iter().map(|s| match s {
                    Statement::Expression(e) => e.pretty_print(),
                    other => format!("{:#?}", other),
                })),
                Err(e) => describe_error(e.as_ref()),
            },
            Command::Unknown(name) => format!("Comando desconocido ':{}'. Escribe :ayuda para ver los comandos.", name),
        };
        Some(output)
    }
}

fn listing<I: Iterator<Item=String>>(lines: I) -> String {
    let result = mk_string(lines, "\n", |l| l);
    if result.is_empty() { "(vacío)".to_owned() } else { result }
}

fn remember(editor: &mut DefaultEditor, line: &str) {
    if let Err(e) = editor.add_history_entry(line) {
        warn!(error = %e, "failed to record history entry");
    }
}

pub fn run_prompt(interpreter: Interpreter, optimize: bool) -> rustyline::Result<()> {
    let mut editor = DefaultEditor::new()?;
    let mut session = Session::new(interpreter, optimize);
    let mut buffer = String::new();
    println!("Zisk - escribe :ayuda para ver los comandos, :salir o Ctrl-D para terminar");
    loop {
        let prompt = if buffer.is_empty() { PROMPT } else { CONTINUATION_PROMPT };
        let line = match editor.readline(prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                buffer.clear();
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                warn!(error = %e, "failed to read line");
                return Err(e);
            }
        };
        if buffer.is_empty() {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(command) = Command::parse(&line) {
                remember(&mut editor, &line);
                match session.run_command(command) {
                    Some(output) => println!("{}", output),
                    None => break,
                }
                continue;
            }
        }
        let blank = line.trim().is_empty();
        if !blank {
            remember(&mut editor, &line);
            buffer.push_str(&line);
            buffer.push('\n');
        }
        if blank || is_complete(&buffer) {
            debug!(bytes = buffer.len(), "evaluating input");
            if let Some(output) = session.eval(&buffer) {
                println!("{}", output);
            }
            buffer.clear();
        }
    }
    Ok(())
}
