use num_traits::FromPrimitive;
use tracing::trace;

use crate::zisk::common::error::{convert_error, ErrorInfo, ParserError, ZiskResult};
use crate::zisk::common::lexer::{Token, TokenType};
use crate::zisk::interpreted::ast::{AssignOperator, Atom, BinaryOperator, CatchClause, ClassDef, ClassMember, Expression, FunctionDef, Modifiers, Param, Program, Statement, UnaryOperator};
use crate::zisk::interpreted::parser::scope::{DeclarationKind, is_lower_case, is_pascal_case, is_private_name, is_upper_case, ScopeStack};

pub mod scope;

/// How deeply expressions and statements may nest by default.
pub const DEFAULT_MAX_NESTING: usize = 100;

pub fn parse(tokens: &[Token]) -> ZiskResult<Program> {
    parse_with_limit(tokens, DEFAULT_MAX_NESTING)
}

/// Like `parse`, but input nested deeper than `max_nesting` is a ParserError.
pub fn parse_with_limit(tokens: &[Token], max_nesting: usize) -> ZiskResult<Program> {
    convert_error(Parser::parse(tokens, max_nesting))
}

type ParserResult<A> = Result<A, ParserError>;

#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Ord, PartialOrd, FromPrimitive)]
enum Precedence {
    TopLevel,
    Assignment,
    Or,
    And,
    Comparison,
    Term,
    Factor,
    Unary,
    Call,
    Primary,
}

impl Precedence {
    fn next(&self) -> Option<Self> {
        FromPrimitive::from_u8(*self as u8 + 1)
    }
}

impl From<&TokenType> for Precedence {
    fn from(tt: &TokenType) -> Self {
        match tt {
            TokenType::OrOr => Precedence::Or,
            TokenType::AndAnd => Precedence::And,
            TokenType::EqualEqual | TokenType::BangEqual | TokenType::Less | TokenType::LessEqual
            | TokenType::Greater | TokenType::GreaterEqual => Precedence::Comparison,
            TokenType::Plus | TokenType::Minus => Precedence::Term,
            TokenType::Star | TokenType::Slash | TokenType::Percent => Precedence::Factor,
            _ => Precedence::TopLevel,
        }
    }
}

fn binary_operator(tt: &TokenType) -> Option<BinaryOperator> {
    match tt {
        TokenType::Plus => Some(BinaryOperator::Plus),
        TokenType::Minus => Some(BinaryOperator::Minus),
        TokenType::Star => Some(BinaryOperator::Mult),
        TokenType::Slash => Some(BinaryOperator::Div),
        TokenType::Percent => Some(BinaryOperator::Mod),
        TokenType::EqualEqual => Some(BinaryOperator::EqualEqual),
        TokenType::BangEqual => Some(BinaryOperator::BangEqual),
        TokenType::Less => Some(BinaryOperator::Less),
        TokenType::LessEqual => Some(BinaryOperator::LessEqual),
        TokenType::Greater => Some(BinaryOperator::Greater),
        TokenType::GreaterEqual => Some(BinaryOperator::GreaterEqual),
        TokenType::AndAnd => Some(BinaryOperator::And),
        TokenType::OrOr => Some(BinaryOperator::Or),
        _ => None,
    }
}

fn assign_operator(tt: &TokenType) -> Option<AssignOperator> {
    match tt {
        TokenType::Equal => Some(AssignOperator::Assign),
        TokenType::PlusEqual => Some(AssignOperator::Plus),
        TokenType::MinusEqual => Some(AssignOperator::Minus),
        TokenType::StarEqual => Some(AssignOperator::Mult),
        TokenType::SlashEqual => Some(AssignOperator::Div),
        TokenType::PercentEqual => Some(AssignOperator::Mod),
        _ => None,
    }
}

#[derive(Debug)]
struct Parser<'a> {
    tokens: &'a [Token],
    current: usize,
    scopes: ScopeStack,
    loop_depth: usize,
    function_depth: usize,
    class_depth: usize,
    nesting: usize,
    max_nesting: usize,
}

impl<'a> Parser<'a> {
    pub fn parse(tokens: &'a [Token], max_nesting: usize) -> ParserResult<Program> {
        let mut parser = Parser {
            tokens,
            current: 0,
            scopes: ScopeStack::new(),
            loop_depth: 0,
            function_depth: 0,
            class_depth: 0,
            nesting: 0,
            max_nesting,
        };
        parser.program()
    }

    fn program(&mut self) -> ParserResult<Program> {
        let mut statements = Vec::new();
        while !self.is_at_end() {
            statements.push(self.declaration()?);
        }
        trace!(statements = statements.len(), "parsed program");
        Ok(Program::new(statements))
    }

    fn declaration(&mut self) -> ParserResult<Statement> {
        self.nested(Parser::any_declaration)
    }

    fn any_declaration(&mut self) -> ParserResult<Statement> {
        match self.peek_type() {
            Some(TokenType::Function) => {
                self.advance();
                self.function(Modifiers::default()).map(Statement::Function)
            }
            Some(TokenType::Class) => self.class_declaration().map(Statement::Class),
            Some(TokenType::Var) => {
                let var = self.variable_declaration()?;
                self.optional_semicolon();
                Ok(var)
            }
            Some(TokenType::Const) => {
                let constant = self.constant_declaration()?;
                self.optional_semicolon();
                Ok(constant)
            }
            Some(TokenType::Import) => self.import(),
            _ => self.statement(),
        }
    }

    fn declare(&mut self, name: &str, kind: DeclarationKind, info: ErrorInfo) -> ParserResult<()> {
        self.scopes.declare(name, kind).map_err(|existing| ParserError::new(
            format!("'{}' ya fue declarado como {} en este ámbito", name, existing.describe()),
            info,
        ))
    }

    // `var nombre [: tipo] [= valor]`, without its terminator.
    fn variable_declaration(&mut self) -> ParserResult<Statement> {
        let info = self.consume(TokenType::Var, "'var'")?.error_info();
        let (name, name_info) = self.consume_identifier("el nombre de la variable")?;
        if !is_lower_case(&name) {
            return Parser::error(
                format!("El nombre de variable '{}' debe empezar con minúscula o '_' (snake_case o camelCase)", name),
                name_info,
            );
        }
        let declared_type = self.type_annotation()?;
        let value = self.matches_single(TokenType::Equal)
            .map(|_| self.expression())
            .transpose()?;
        self.declare(&name, DeclarationKind::Var, name_info)?;
        Ok(Statement::Variable { name, declared_type, value, error_info: info })
    }

    fn constant_declaration(&mut self) -> ParserResult<Statement> {
        let info = self.consume(TokenType::Const, "'const'")?.error_info();
        let (name, name_info) = self.consume_identifier("el nombre de la constante")?;
        if !is_upper_case(&name) {
            return Parser::error(
                format!("El nombre de constante '{}' debe estar en MAYÚSCULAS", name),
                name_info,
            );
        }
        let declared_type = self.type_annotation()?;
        if self.matches_single(TokenType::Equal).is_none() {
            return Parser::error(format!("La constante '{}' debe inicializarse", name), name_info);
        }
        let value = self.expression()?;
        self.declare(&name, DeclarationKind::Const, name_info)?;
        Ok(Statement::Constant { name, declared_type, value, error_info: info })
    }

    fn type_annotation(&mut self) -> ParserResult<Option<String>> {
        if self.matches_single(TokenType::Colon).is_none() {
            return Ok(None);
        }
        let token = self.advance_or_error("un tipo")?;
        match token.get_type() {
            TokenType::TypeName(name) | TokenType::Identifier(name) => Ok(Some(name.to_owned())),
            TokenType::Function => Ok(Some("funcion".to_owned())),
            TokenType::Class => Ok(Some("clase".to_owned())),
            TokenType::Null => Ok(Some("nulo".to_owned())),
            _ => Parser::error(
                format!("Se esperaba un tipo, se encontró '{}'", token.lexeme),
                token.error_info(),
            ),
        }
    }

    // The `funcion` keyword has already been consumed.
    fn function(&mut self, modifiers: Modifiers) -> ParserResult<FunctionDef> {
        let (name, info) = self.consume_identifier("el nombre de la función")?;
        let valid_name = if modifiers.is_private { is_private_name(&name) } else { is_lower_case(&name) };
        if !valid_name {
            return Parser::error(
                format!("El nombre de función '{}' debe empezar con minúscula o '_' (snake_case o camelCase)", name),
                info,
            );
        }
        self.consume(TokenType::OpenParen, "'(' después del nombre de la función")?;
        self.scopes.enter_scope();
        let mut params = Vec::new();
        if self.matches_single(TokenType::CloseParen).is_none() {
            loop {
                let (param, param_info) = self.consume_identifier("el nombre del parámetro")?;
                if !is_lower_case(&param) {
                    return Parser::error(
                        format!("El nombre de parámetro '{}' debe empezar con minúscula o '_' (snake_case o camelCase)", param),
                        param_info,
                    );
                }
                let declared_type = self.type_annotation()?;
                self.declare(&param, DeclarationKind::Param, param_info)?;
                params.push(Param { name: param, declared_type });
                if self.matches_single(TokenType::Comma).is_none() {
                    break;
                }
            }
            self.consume(TokenType::CloseParen, "')' después de los parámetros")?;
        }
        let return_type = self.type_annotation()?;

        // The body shares the parameters' scope, so `var x` cannot shadow a parameter `x`.
        self.consume(TokenType::OpenBrace, "'{' antes del cuerpo de la función")?;
        let enclosing_loops = std::mem::replace(&mut self.loop_depth, 0);
        self.function_depth += 1;
        let body = self.block_statements();
        self.function_depth -= 1;
        self.loop_depth = enclosing_loops;
        self.scopes.exit_scope();
        Ok(FunctionDef { name, params, return_type, body: body?, error_info: info })
    }

    fn class_declaration(&mut self) -> ParserResult<ClassDef> {
        self.consume(TokenType::Class, "'clase'")?;
        let (name, info) = self.consume_identifier("el nombre de la clase")?;
        if !is_pascal_case(&name) {
            return Parser::error(
                format!("El nombre de clase '{}' debe estar en PascalCase", name),
                info,
            );
        }
        let superclass = self.matches_single(TokenType::Extends)
            .map(|_| self.consume_identifier("el nombre de la superclase").map(|(s, _)| s))
            .transpose()?;
        self.consume(TokenType::OpenBrace, "'{' antes del cuerpo de la clase")?;
        self.class_depth += 1;
        self.scopes.enter_scope();
        let members = self.class_members();
        self.scopes.exit_scope();
        self.class_depth -= 1;
        Ok(ClassDef { name, superclass, members: members?, error_info: info })
    }

    fn class_members(&mut self) -> ParserResult<Vec<ClassMember>> {
        let mut members = Vec::new();
        while self.matches_single(TokenType::CloseBrace).is_none() {
            if self.is_at_end() {
                return Parser::error("Se esperaba '}' al final de la clase", self.last_info());
            }
            let mut modifiers = Modifiers::default();
            loop {
                match self.peek_type() {
                    Some(TokenType::Static) => modifiers.is_static = true,
                    Some(TokenType::Public) => modifiers.is_private = false,
                    Some(TokenType::Private) => modifiers.is_private = true,
                    _ => break,
                }
                self.advance();
            }
            let member = match self.peek_type() {
                Some(TokenType::Var) => self.field(modifiers)?,
                Some(TokenType::Const) => self.class_constant(modifiers)?,
                Some(TokenType::Function) => {
                    self.advance();
                    ClassMember::Method(self.function(modifiers)?, modifiers)
                }
                _ => {
                    let token = self.advance_or_error("un miembro de clase")?;
                    return Parser::error(
                        format!("Se esperaba 'var', 'const' o 'funcion' en la clase, se encontró '{}'", token.lexeme),
                        token.error_info(),
                    );
                }
            };
            self.optional_semicolon();
            members.push(member);
        }
        Ok(members)
    }

    fn field(&mut self, modifiers: Modifiers) -> ParserResult<ClassMember> {
        let info = self.consume(TokenType::Var, "'var'")?.error_info();
        let (name, name_info) = self.consume_identifier("el nombre del campo")?;
        let valid_name = if modifiers.is_private { is_private_name(&name) } else { is_lower_case(&name) };
        if !valid_name {
            return Parser::error(
                format!("El nombre de campo '{}' debe empezar con minúscula o '_' (snake_case o camelCase)", name),
                name_info,
            );
        }
        let declared_type = self.type_annotation()?;
        let value = self.matches_single(TokenType::Equal)
            .map(|_| self.expression())
            .transpose()?;
        Ok(ClassMember::Field { name, declared_type, value, modifiers, error_info: info })
    }

    fn class_constant(&mut self, modifiers: Modifiers) -> ParserResult<ClassMember> {
        let info = self.consume(TokenType::Const, "'const'")?.error_info();
        let (name, name_info) = self.consume_identifier("el nombre de la constante")?;
        if !is_upper_case(&name) {
            return Parser::error(
                format!("El nombre de constante '{}' debe estar en MAYÚSCULAS", name),
                name_info,
            );
        }
        let declared_type = self.type_annotation()?;
        self.consume(TokenType::Equal, "'=' en la declaración de la constante")?;
        let value = self.expression()?;
        Ok(ClassMember::Constant { name, declared_type, value, modifiers, error_info: info })
    }

    fn import(&mut self) -> ParserResult<Statement> {
        let info = self.consume(TokenType::Import, "'importa'")?.error_info();
        let token = self.advance_or_error("la ruta del módulo")?;
        let path = match token.get_type() {
            TokenType::TextLiteral(path) | TokenType::Identifier(path) => path.to_owned(),
            _ => return Parser::error(
                format!("Se esperaba la ruta del módulo, se encontró '{}'", token.lexeme),
                token.error_info(),
            ),
        };
        let alias = self.matches_single(TokenType::As)
            .map(|_| self.consume_identifier("el alias del módulo").map(|(a, _)| a))
            .transpose()?;
        self.optional_semicolon();
        Ok(Statement::Import { path, alias, error_info: info })
    }

    fn statement(&mut self) -> ParserResult<Statement> {
        match self.peek_type() {
            Some(TokenType::OpenBrace) => self.block(),
            Some(TokenType::If) => self.if_statement(),
            Some(TokenType::While) => self.while_statement(),
            Some(TokenType::DoWhile) => self.do_while_statement(),
            Some(TokenType::For) => self.for_statement(),
            Some(TokenType::Try) => self.try_statement(),
            Some(TokenType::Return) => self.return_statement(),
            Some(TokenType::Break) | Some(TokenType::Continue) => self.jump_statement(),
            _ => {
                let expr = self.expression()?;
                self.optional_semicolon();
                Ok(Statement::Expression(expr))
            }
        }
    }

    fn block(&mut self) -> ParserResult<Statement> {
        self.consume(TokenType::OpenBrace, "'{'")?;
        self.scopes.enter_scope();
        let statements = self.block_statements();
        self.scopes.exit_scope();
        Ok(Statement::Block(statements?))
    }

    // The opening brace has already been consumed; scoping is the caller's business.
    fn block_statements(&mut self) -> ParserResult<Vec<Statement>> {
        let mut statements = Vec::new();
        while self.matches_single(TokenType::CloseBrace).is_none() {
            if self.is_at_end() {
                return Parser::error("Se esperaba '}' al final del bloque", self.last_info());
            }
            statements.push(self.declaration()?);
        }
        Ok(statements)
    }

    // Bodies of control statements: a block, or a single statement wrapped in its own block.
    fn body(&mut self) -> ParserResult<Statement> {
        if self.check(&TokenType::OpenBrace) {
            self.block()
        } else {
            self.scopes.enter_scope();
            let statement = self.declaration();
            self.scopes.exit_scope();
            Ok(Statement::Block(vec![statement?]))
        }
    }

    fn loop_body(&mut self) -> ParserResult<Statement> {
        self.loop_depth += 1;
        let body = self.body();
        self.loop_depth -= 1;
        body
    }

    fn if_statement(&mut self) -> ParserResult<Statement> {
        self.consume(TokenType::If, "'si'")?;
        let cond = self.expression()?;
        self.matches_single(TokenType::Then);
        let if_stmt = self.body().map(Box::new)?;
        let else_stmt = match self.matches_single(TokenType::Else) {
            None => None,
            Some(_) if self.check(&TokenType::If) => Some(Box::new(self.if_statement()?)),
            Some(_) => Some(Box::new(self.body()?)),
        };
        Ok(Statement::IfElse { cond, if_stmt, else_stmt })
    }

    fn while_statement(&mut self) -> ParserResult<Statement> {
        self.consume(TokenType::While, "'mientras'")?;
        let cond = self.expression()?;
        let body = self.loop_body()?;
        Ok(Statement::While(cond, Box::new(body)))
    }

    fn do_while_statement(&mut self) -> ParserResult<Statement> {
        self.consume(TokenType::DoWhile, "'hacer_mientras'")?;
        let body = self.loop_body()?;
        self.consume(TokenType::While, "'mientras' después del cuerpo de 'hacer_mientras'")?;
        let cond = self.expression()?;
        self.optional_semicolon();
        Ok(Statement::DoWhile(Box::new(body), cond))
    }

    fn for_statement(&mut self) -> ParserResult<Statement> {
        self.consume(TokenType::For, "'para'")?;
        self.consume(TokenType::OpenParen, "'(' después de 'para'")?;
        self.scopes.enter_scope();
        let result = self.for_clauses();
        self.scopes.exit_scope();
        result
    }

    fn for_clauses(&mut self) -> ParserResult<Statement> {
        let init = if self.matches_single(TokenType::Semicolon).is_some() {
            None
        } else {
            let init = if self.check(&TokenType::Var) {
                self.variable_declaration()?
            } else {
                Statement::Expression(self.expression()?)
            };
            self.consume(TokenType::Semicolon, "';' después de la inicialización de 'para'")?;
            Some(Box::new(init))
        };
        let cond = if self.check(&TokenType::Semicolon) { None } else { Some(self.expression()?) };
        self.consume(TokenType::Semicolon, "';' después de la condición de 'para'")?;
        let update = if self.check(&TokenType::CloseParen) { None } else { Some(self.expression()?) };
        self.consume(TokenType::CloseParen, "')' después de las cláusulas de 'para'")?;
        let body = self.loop_body().map(Box::new)?;
        Ok(Statement::For { init, cond, update, body })
    }

    fn try_statement(&mut self) -> ParserResult<Statement> {
        self.consume(TokenType::Try, "'try'")?;
        let body = match self.block()? {
            Statement::Block(statements) => statements,
            other => vec![other],
        };
        let catch = match self.matches_single(TokenType::Catch) {
            None => None,
            Some(_) => {
                self.consume(TokenType::OpenParen, "'(' después de 'catch'")?;
                let (name, info) = self.consume_identifier("el nombre de la variable de error")?;
                self.consume(TokenType::CloseParen, "')' después de la variable de error")?;
                self.consume(TokenType::OpenBrace, "'{' antes del bloque 'catch'")?;
                self.scopes.enter_scope();
                let statements = self.declare(&name, DeclarationKind::Param, info)
                    .and_then(|_| self.block_statements());
                self.scopes.exit_scope();
                Some(CatchClause { name, body: statements? })
            }
        };
        let finally = match self.matches_single(TokenType::Finally) {
            None => None,
            Some(_) => match self.block()? {
                Statement::Block(statements) => Some(statements),
                other => Some(vec![other]),
            },
        };
        Ok(Statement::Try { body, catch, finally })
    }

    fn return_statement(&mut self) -> ParserResult<Statement> {
        let info = self.consume(TokenType::Return, "'retorna'")?.error_info();
        if self.function_depth == 0 {
            return Parser::error("'retorna' fuera de una función", info);
        }
        let value = if self.is_at_end() || self.check(&TokenType::Semicolon) || self.check(&TokenType::CloseBrace) {
            None
        } else {
            Some(self.expression()?)
        };
        self.optional_semicolon();
        Ok(Statement::Return(value, info))
    }

    fn jump_statement(&mut self) -> ParserResult<Statement> {
        let token = self.advance_or_error("'break' o 'continua'")?;
        let info = token.error_info();
        if self.loop_depth == 0 {
            return Parser::error(format!("'{}' fuera de un bucle", token.lexeme), info);
        }
        self.optional_semicolon();
        Ok(match token.get_type() {
            TokenType::Break => Statement::Break(info),
            _ => Statement::Continue(info),
        })
    }

    fn expression(&mut self) -> ParserResult<Expression> {
        self.nested(Parser::assignment)
    }

    // Assignment is right-associative and binds loosest.
    fn assignment(&mut self) -> ParserResult<Expression> {
        let expr = self.parse_precedence(Precedence::Or)?;
        match self.matches(assign_operator) {
            Some((op, info)) => {
                if !expr.is_assignable() {
                    return Parser::error(
                        format!("Objetivo de asignación no válido: {}", expr.pretty_print()),
                        info,
                    );
                }
                let value = self.expression()?;
                Ok(Expression::Assign(op, Box::new(expr), Box::new(value), info))
            }
            None => Ok(expr),
        }
    }

    fn parse_precedence(&mut self, precedence: Precedence) -> ParserResult<Expression> {
        let mut expr = self.unary()?;
        while let Some(next_type) = self.peek_type() {
            let operator_precedence = Precedence::from(next_type);
            if operator_precedence < precedence {
                break;
            }
            let (op, info) = match self.matches(binary_operator) {
                Some(m) => m,
                None => break,
            };
            let next_precedence = operator_precedence.next().unwrap_or(Precedence::Primary);
            let right = self.parse_precedence(next_precedence)?;
            expr = Expression::Binary(op, Box::new(expr), Box::new(right), info);
        }
        Ok(expr)
    }

    fn unary(&mut self) -> ParserResult<Expression> {
        match self.matches(|e| match e {
            TokenType::Bang => Some(UnaryOperator::Bang),
            TokenType::Minus => Some(UnaryOperator::Minus),
            _ => None,
        }) {
            Some((operator, info)) => {
                let right = self.nested(Parser::unary)?;
                Ok(Expression::Unary(operator, Box::new(right), info))
            }
            None => self.postfix(),
        }
    }

    fn postfix(&mut self) -> ParserResult<Expression> {
        let mut expr = self.primary()?;
        loop {
            if let Some(info) = self.matches_single(TokenType::OpenParen) {
                let args = self.arguments()?;
                expr = Expression::Call(Box::new(expr), args, info);
            } else if let Some(info) = self.matches_single(TokenType::OpenBracket) {
                let index = self.expression()?;
                self.consume(TokenType::CloseBracket, "']' después del índice")?;
                expr = Expression::Index(Box::new(expr), Box::new(index), info);
            } else if let Some(info) = self.matches_single(TokenType::Dot) {
                let (name, _) = self.consume_identifier("el nombre del miembro después de '.'")?;
                expr = Expression::Property(Box::new(expr), name, info);
            } else {
                return Ok(expr);
            }
        }
    }

    // The opening parenthesis has already been consumed.
    fn arguments(&mut self) -> ParserResult<Vec<Expression>> {
        let mut args = Vec::new();
        if self.matches_single(TokenType::CloseParen).is_some() {
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            if self.matches_single(TokenType::Comma).is_none() {
                break;
            }
        }
        self.consume(TokenType::CloseParen, "')' después de los argumentos")?;
        Ok(args)
    }

    fn primary(&mut self) -> ParserResult<Expression> {
        let token = self.advance_or_error("una expresión")?;
        let info = token.error_info();
        let atom = |atom| Ok(Expression::Atomic(atom, info));
        match token.get_type() {
            TokenType::Identifier(name) => atom(Atom::Identifier(name.to_owned())),
            TokenType::IntegerLiteral(i) => atom(Atom::Integer(*i)),
            TokenType::DecimalLiteral(d) => atom(Atom::Decimal(*d)),
            TokenType::TextLiteral(s) => atom(Atom::Text(s.to_owned())),
            TokenType::True => atom(Atom::True),
            TokenType::False => atom(Atom::False),
            TokenType::Null => atom(Atom::Null),
            TokenType::This =>
                if self.class_depth == 0 {
                    Parser::error("'este' solo puede usarse dentro de una clase", info)
                } else {
                    atom(Atom::This)
                },
            TokenType::OpenParen => {
                let expr = self.expression()?;
                self.consume(TokenType::CloseParen, "')' después de la expresión")?;
                Ok(expr)
            }
            TokenType::OpenBracket => {
                let mut elements = Vec::new();
                if self.matches_single(TokenType::CloseBracket).is_none() {
                    loop {
                        elements.push(self.expression()?);
                        if self.matches_single(TokenType::Comma).is_none() {
                            break;
                        }
                    }
                    self.consume(TokenType::CloseBracket, "']' al final de la lista")?;
                }
                Ok(Expression::List(elements, info))
            }
            TokenType::OpenBrace => self.object_literal(info),
            TokenType::New => {
                let (class, _) = self.consume_identifier("el nombre de la clase después de 'nuevo'")?;
                self.consume(TokenType::OpenParen, "'(' después del nombre de la clase")?;
                let args = self.arguments()?;
                Ok(Expression::New(class, args, info))
            }
            TokenType::Print | TokenType::Input => {
                self.consume(TokenType::OpenParen, &format!("'(' después de '{}'", token.lexeme))?;
                let args = self.arguments()?;
                Ok(Expression::NativeCall(token.lexeme.to_owned(), args, info))
            }
            tt if tt.is_reserved() => Parser::error(
                format!("La palabra reservada '{}' no está soportada", token.lexeme),
                info,
            ),
            _ => Parser::error(format!("Token inesperado: '{}'", token.lexeme), info),
        }
    }

    fn object_literal(&mut self, info: ErrorInfo) -> ParserResult<Expression> {
        let mut entries = Vec::new();
        if self.matches_single(TokenType::CloseBrace).is_some() {
            return Ok(Expression::Object(entries, info));
        }
        loop {
            let token = self.advance_or_error("una clave del objeto")?;
            let key = match token.get_type() {
                TokenType::Identifier(key) | TokenType::TextLiteral(key) | TokenType::TypeName(key) =>
                    key.to_owned(),
                _ => return Parser::error(
                    format!("Clave de objeto no válida: '{}'", token.lexeme),
                    token.error_info(),
                ),
            };
            self.consume(TokenType::Colon, "':' después de la clave del objeto")?;
            entries.push((key, self.expression()?));
            if self.matches_single(TokenType::Comma).is_none() {
                break;
            }
        }
        self.consume(TokenType::CloseBrace, "'}' al final del objeto")?;
        Ok(Expression::Object(entries, info))
    }

    // Counts nested statements and expressions against `max_nesting`.
    fn nested<A>(&mut self, parse: impl FnOnce(&mut Self) -> ParserResult<A>) -> ParserResult<A> {
        if self.nesting >= self.max_nesting {
            let info = self.peek().map(|t| t.error_info()).unwrap_or_else(|| self.last_info());
            return Parser::error(format!("Anidamiento demasiado profundo (máximo {})", self.max_nesting), info);
        }
        self.nesting += 1;
        let result = parse(self);
        self.nesting -= 1;
        result
    }

    fn error<A, S: Into<String>>(message: S, info: ErrorInfo) -> ParserResult<A> {
        Err(ParserError::new(message, info))
    }

    fn optional_semicolon(&mut self) {
        self.matches_single(TokenType::Semicolon);
    }

    fn check(&self, expected: &TokenType) -> bool {
        self.peek_type() == Some(expected)
    }

    fn matches_single(&mut self, expected: TokenType) -> Option<ErrorInfo> {
        if self.check(&expected) {
            Some(self.advance().error_info())
        } else {
            None
        }
    }

    fn matches<F, A>(&mut self, func: F) -> Option<(A, ErrorInfo)>
        where F: Fn(&TokenType) -> Option<A>
    {
        let token = self.peek()?;
        let result = func(token.get_type()).map(|e| (e, token.error_info()));
        if result.is_some() {
            self.advance();
        }
        result
    }

    fn consume(&mut self, expected: TokenType, what: &str) -> ParserResult<&'a Token> {
        match self.peek() {
            None => Parser::error(
                format!("Se esperaba {}, pero la entrada terminó", what),
                self.last_info(),
            ),
            Some(token) if token.get_type() != &expected => Parser::error(
                format!("Se esperaba {}, se encontró '{}'", what, token.lexeme),
                token.error_info(),
            ),
            Some(_) => Ok(self.advance()),
        }
    }

    fn consume_identifier(&mut self, what: &str) -> ParserResult<(String, ErrorInfo)> {
        let token = self.advance_or_error(what)?;
        match token.get_type() {
            TokenType::Identifier(name) => Ok((name.to_owned(), token.error_info())),
            _ => Parser::error(
                format!("Se esperaba {}, se encontró '{}'", what, token.lexeme),
                token.error_info(),
            ),
        }
    }

    fn advance_or_error(&mut self, what: &str) -> ParserResult<&'a Token> {
        if self.is_at_end() {
            Parser::error(format!("Se esperaba {}, pero la entrada terminó", what), self.last_info())
        } else {
            Ok(self.advance())
        }
    }

    fn advance(&mut self) -> &'a Token {
        let tokens = self.tokens;
        self.current += 1;
        &tokens[self.current - 1]
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.tokens.len()
    }

    fn peek(&self) -> Option<&'a Token> {
        let tokens = self.tokens;
        tokens.get(self.current)
    }

    fn peek_type(&self) -> Option<&'a TokenType> {
        self.peek().map(|t| t.get_type())
    }

    fn last_info(&self) -> ErrorInfo {
        self.tokens.last().map(|t| t.error_info()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use crate::zisk::common::error::ErrorKind;
    use crate::zisk::common::lexer::tokenize;
    use crate::zisk::interpreted::tests::{unsafe_parse, unsafe_parse_expression};

    use super::*;

    fn parse_error(program: Vec<&str>) -> Box<dyn crate::zisk::common::error::ZiskError> {
        parse(&tokenize(program.join("\n").as_ref()).unwrap()).unwrap_err()
    }

    #[test]
    fn precedence_climbing() {
        assert_eq!(unsafe_parse_expression("1 + 2 * 3 - 4"), "((1 + (2 * 3)) - 4)");
        assert_eq!(unsafe_parse_expression("a || b && c == d"), "(a || (b && (c == d)))");
        assert_eq!(unsafe_parse_expression("1 < 2 == verdadero"), "((1 < 2) == verdadero)");
        assert_eq!(unsafe_parse_expression("-a.b[0](1) % 2"), "((-a.b[0](1)) % 2)");
        assert_eq!(unsafe_parse_expression("!(1 + 2) * 3"), "((!(1 + 2)) * 3)");
    }

    #[test]
    fn nesting_is_limited() {
        let deep = format!("{}1{}", "(".repeat(200_000), ")".repeat(200_000));
        let err = parse(&tokenize(&deep).unwrap()).unwrap_err();
        assert_eq!(err.get_kind(), ErrorKind::Parse);
        assert!(err.get_message().starts_with("Anidamiento demasiado profundo"), "{}", err);
        assert_eq!(err.get_info(), ErrorInfo::new(1, DEFAULT_MAX_NESTING));

        let negations = format!("{}x", "-".repeat(10_000));
        assert_eq!(parse(&tokenize(&negations).unwrap()).unwrap_err().get_kind(), ErrorKind::Parse);
        let blocks = format!("{}{}", "{".repeat(10_000), "}".repeat(10_000));
        assert_eq!(parse(&tokenize(&blocks).unwrap()).unwrap_err().get_kind(), ErrorKind::Parse);

        let shallow = format!("{}1{}", "(".repeat(20), ")".repeat(20));
        assert!(parse_with_limit(&tokenize(&shallow).unwrap(), 22).is_ok());
        assert!(parse_with_limit(&tokenize(&shallow).unwrap(), 21).is_err());
    }

    #[test]
    fn assignment_is_right_associative() {
        assert_eq!(unsafe_parse_expression("a = b += 1 + 2"), "(a = (b += (1 + 2)))");
        assert_eq!(unsafe_parse_expression("obj.x[1] = 3"), "(obj.x[1] = 3)");
    }

    #[test]
    fn invalid_assignment_target() {
        let err = parse_error(vec!["1 + 2 = 3"]);
        assert_eq!(err.get_kind(), ErrorKind::Parse);
        assert_eq!(err.get_info().column, 7);
    }

    #[test]
    fn literals() {
        assert_eq!(
            unsafe_parse_expression("[1, 2.5, \"a\", nulo, {x: 1, \"y\": [ ]}]"),
            "[1, 2.5, \"a\", nulo, {x: 1, y: []}]",
        );
        assert_eq!(unsafe_parse_expression("nuevo Punto(1, 2).x"), "nuevo Punto(1, 2).x");
        assert_eq!(unsafe_parse_expression("mostrar(ingresar(\"?\"))"), "mostrar(ingresar(\"?\"))");
    }

    #[test]
    fn optional_semicolons_and_then() {
        let program = unsafe_parse(vec![
            "var x = 1",
            "si x > 0 entonces mostrar(x) sino { x = 2; }",
            "mientras x < 3 x += 1",
        ]);
        assert_eq!(program.statements.len(), 3);
        match &program.statements[1] {
            Statement::IfElse { if_stmt, else_stmt: Some(_), .. } =>
                assert!(matches!(**if_stmt, Statement::Block(ref v) if v.len() == 1)),
            other => panic!("Expected if, got {:?}", other),
        }
    }

    #[test]
    fn else_if_chains() {
        let program = unsafe_parse(vec!["si a { } sino si b { } sino { }"]);
        match &program.statements[0] {
            Statement::IfElse { else_stmt: Some(e), .. } =>
                assert!(matches!(**e, Statement::IfElse { else_stmt: Some(_), .. })),
            other => panic!("Expected if, got {:?}", other),
        }
    }

    #[test]
    fn redeclaration_in_same_scope() {
        let err = parse_error(vec!["var x = 1;", "var x = 2;"]);
        assert_eq!(err.get_kind(), ErrorKind::Parse);
        assert_eq!(err.get_info().line, 2);
    }

    #[test]
    fn shadowing_in_nested_scope() {
        unsafe_parse(vec!["var x = 1;", "{ var x = 2; }"]);
        unsafe_parse(vec!["para (var i = 0; i < 2; i += 1) { }", "para (var i = 0; i < 2; i += 1) { }"]);
    }

    #[test]
    fn parameter_cannot_be_redeclared_in_body() {
        assert_eq!(parse_error(vec!["funcion f(x) { var x = 1; }"]).get_kind(), ErrorKind::Parse);
        assert_eq!(parse_error(vec!["funcion f(x, x) { }"]).get_kind(), ErrorKind::Parse);
        unsafe_parse(vec!["funcion f(x) { { var x = 1; } }"]);
    }

    #[test]
    fn naming_conventions() {
        assert_eq!(parse_error(vec!["var Malo = 1"]).get_kind(), ErrorKind::Parse);
        assert_eq!(parse_error(vec!["const malo = 1"]).get_kind(), ErrorKind::Parse);
        assert_eq!(parse_error(vec!["clase persona { }"]).get_kind(), ErrorKind::Parse);
        assert_eq!(parse_error(vec!["funcion Malo() { }"]).get_kind(), ErrorKind::Parse);
        assert_eq!(parse_error(vec!["funcion f(Malo) { }"]).get_kind(), ErrorKind::Parse);
        unsafe_parse(vec!["clase Persona { privado var _edad = 0; const MAX = 3 }"]);
        unsafe_parse(vec!["var nombreCompleto = 1", "var nombre_completo = 2", "funcion darNombre(miNombre) { }"]);
        assert_eq!(
            parse_error(vec!["var Malo = 1"]).get_message(),
            "El nombre de variable 'Malo' debe empezar con minúscula o '_' (snake_case o camelCase)",
        );
    }

    #[test]
    fn constants_need_a_value() {
        let err = parse_error(vec!["const PI;"]);
        assert_eq!(err.get_kind(), ErrorKind::Parse);
    }

    #[test]
    fn jumps_outside_their_context() {
        assert_eq!(parse_error(vec!["break"]).get_kind(), ErrorKind::Parse);
        assert_eq!(parse_error(vec!["retorna 1"]).get_kind(), ErrorKind::Parse);
        assert_eq!(parse_error(vec!["mientras verdadero { funcion f() { continua } }"]).get_kind(), ErrorKind::Parse);
        assert_eq!(parse_error(vec!["mostrar(este)"]).get_kind(), ErrorKind::Parse);
        unsafe_parse(vec!["funcion f() { mientras verdadero { si x { break } sino { retorna 1 } } }"]);
    }

    #[test]
    fn reserved_words() {
        assert_eq!(parse_error(vec!["await x"]).get_kind(), ErrorKind::Parse);
    }

    #[test]
    fn class_with_members() {
        let program = unsafe_parse(vec![
            "clase Perro extiende Animal {",
            "  estatico var total: entero = 0",
            "  const PATAS = 4",
            "  var nombre: texto",
            "  funcion constructor(nombre: texto) { este.nombre = nombre }",
            "  estatico funcion crear(): Perro { retorna nuevo Perro(\"x\") }",
            "  privado funcion _secreto() { }",
            "}",
        ]);
        match &program.statements[0] {
            Statement::Class(ClassDef { name, superclass, members, .. }) => {
                assert_eq!(name, "Perro");
                assert_eq!(superclass.as_deref(), Some("Animal"));
                assert_eq!(members.len(), 6);
                assert!(matches!(
                    &members[0],
                    ClassMember::Field { modifiers: Modifiers { is_static: true, .. }, .. }
                ));
                match &members[4] {
                    ClassMember::Method(def, modifiers) => {
                        assert!(modifiers.is_static);
                        assert_eq!(def.return_type.as_deref(), Some("Perro"));
                    }
                    other => panic!("Expected method, got {:?}", other),
                }
            }
            other => panic!("Expected class, got {:?}", other),
        }
    }

    #[test]
    fn try_catch_finally() {
        let program = unsafe_parse(vec!["try { x() } catch (e) { mostrar(e) } finally { y() }"]);
        match &program.statements[0] {
            Statement::Try { body, catch: Some(CatchClause { name, body: catch_body }), finally: Some(f) } => {
                assert_eq!(body.len(), 1);
                assert_eq!(name, "e");
                assert_eq!(catch_body.len(), 1);
                assert_eq!(f.len(), 1);
            }
            other => panic!("Expected try, got {:?}", other),
        }
        assert_eq!(parse_error(vec!["try { } catch (e) { var e = 1 }"]).get_kind(), ErrorKind::Parse);
    }

    #[test]
    fn imports() {
        let program = unsafe_parse(vec!["importa \"lib/mate\" como m;", "importa utilidades"]);
        assert_eq!(
            program.statements.iter().map(|s| match s {
                Statement::Import { path, alias, .. } => (path.clone(), alias.clone()),
                other => panic!("Expected import, got {:?}", other),
            }).collect::<Vec<_>>(),
            vec![("lib/mate".to_owned(), Some("m".to_owned())), ("utilidades".to_owned(), None)],
        );
    }

    #[test]
    fn do_while_and_for() {
        let program = unsafe_parse(vec![
            "hacer_mientras { x += 1 } mientras x < 3;",
            "para (;;) { break }",
        ]);
        assert!(matches!(program.statements[0], Statement::DoWhile(..)));
        assert!(matches!(
            program.statements[1],
            Statement::For { init: None, cond: None, update: None, .. }
        ));
    }

    #[test]
    fn unexpected_end_of_input() {
        let err = parse_error(vec!["funcion f() {", "  var x = (1 +"]);
        assert_eq!(err.get_kind(), ErrorKind::Parse);
        assert_eq!(err.get_info().line, 2);
    }
}
