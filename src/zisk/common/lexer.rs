use std::fmt;
use std::fmt::{Display, Formatter};

use tracing::trace;

use crate::zisk::common;
use crate::zisk::common::error::{ErrorInfo, ErrorKind, ZiskError, ZiskResult};

pub fn tokenize(source: &str) -> ZiskResult<Vec<Token>> {
    common::error::convert_error(Lexer::new(source).get_lexems())
}

// Lexing stops at the first failure (bad character, unterminated string or block comment, or an
// integer literal that does not fit), so at most one error is reported.
type LexResult<A> = Result<A, LexError>;

#[derive(Debug, PartialEq, Clone)]
pub enum TokenType {
    // Delimiters.
    OpenParen,
    CloseParen,
    OpenBrace,
    CloseBrace,
    OpenBracket,
    CloseBracket,
    Comma,
    Dot,
    Semicolon,
    Colon,
    // Operators.
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Equal,
    EqualEqual,
    BangEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    AndAnd,
    OrOr,
    PlusEqual,
    MinusEqual,
    StarEqual,
    SlashEqual,
    PercentEqual,
    // Keywords.
    DoWhile,
    True,
    Continue,
    Extends,
    Then,
    Static,
    Function,
    Import,
    Input,
    While,
    Print,
    Private,
    Public,
    Return,
    Finally,
    Await,
    Class,
    Const,
    From,
    False,
    New,
    Else,
    Async,
    Break,
    Catch,
    As,
    This,
    For,
    Null,
    Var,
    If,
    In,
    Try,

    TypeName(String),
    Identifier(String),
    IntegerLiteral(i64),
    DecimalLiteral(f64),
    TextLiteral(String),
}

impl TokenType {
    pub fn identifier<S: Into<String>>(str: S) -> Self { TokenType::Identifier(str.into()) }
    pub fn text_literal<S: Into<String>>(str: S) -> Self { TokenType::TextLiteral(str.into()) }
    pub fn type_name<S: Into<String>>(str: S) -> Self { TokenType::TypeName(str.into()) }

    pub fn is_reserved(&self) -> bool {
        matches!(self, TokenType::Await | TokenType::Async | TokenType::From | TokenType::In)
    }
}

impl Display for TokenType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:?}", self))
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Token {
    pub line: usize,
    pub column: usize,
    pub r#type: TokenType,
    pub lexeme: String,
}

impl Token {
    pub fn new<S: Into<String>>(line: usize, column: usize, r#type: TokenType, lexeme: S) -> Self {
        Token { line, column, r#type, lexeme: lexeme.into() }
    }
    pub fn get_type(&self) -> &TokenType { &self.r#type }

    pub fn error_info(&self) -> ErrorInfo {
        ErrorInfo::new(self.line, self.column)
    }
}

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
#[error("Error en línea {}, columna {}: {}", .error_info.line, .error_info.column, .message)]
pub struct LexError {
    pub message: String,
    pub error_info: ErrorInfo,
}

impl ZiskError for LexError {
    fn get_info(&self) -> ErrorInfo { self.error_info }

    fn get_message(&self) -> String { self.message.to_owned() }

    fn get_kind(&self) -> ErrorKind { ErrorKind::Lex }
}

struct Lexer {
    source: Vec<char>,
    current: usize,
    start: usize,
    line: usize,
    line_start: usize,
    // Position of the first character of the token being scanned; tokens may span lines.
    token_line: usize,
    token_column: usize,
    lexems: Vec<Token>,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            source: source.chars().collect(),
            current: 0,
            start: 0,
            line: 1,
            line_start: 0,
            token_line: 1,
            token_column: 1,
            lexems: Vec::new(),
        }
    }

    pub fn get_lexems(mut self) -> LexResult<Vec<Token>> {
        while !self.is_at_end() {
            self.start = self.current;
            self.token_line = self.line;
            self.token_column = self.start - self.line_start + 1;
            self.scan_token()?;
        }
        trace!(tokens = self.lexems.len(), "tokenized source");
        Ok(self.lexems)
    }

    fn is_at_end(&self) -> bool { self.current >= self.source.len() }

    fn add_token_type(&mut self, tt: TokenType) {
        let lexeme = self.current_lexeme();
        self.lexems.push(Token::new(self.token_line, self.token_column, tt, lexeme));
    }

    fn matches(&mut self, expected: char) -> bool {
        let result = self.peek_test(expected);
        if result {
            self.current += 1;
        }
        result
    }

    fn add_with_equal(&mut self, with: TokenType, without: TokenType) {
        let m = self.matches('=');
        self.add_token_type(if m { with } else { without })
    }

    fn scan_token(&mut self) -> LexResult<()> {
        let c = self.advance();
        match c {
            '(' => Ok(self.add_token_type(TokenType::OpenParen)),
            ')' => Ok(self.add_token_type(TokenType::CloseParen)),
            '{' => Ok(self.add_token_type(TokenType::OpenBrace)),
            '}' => Ok(self.add_token_type(TokenType::CloseBrace)),
            '[' => Ok(self.add_token_type(TokenType::OpenBracket)),
            ']' => Ok(self.add_token_type(TokenType::CloseBracket)),
            ',' => Ok(self.add_token_type(TokenType::Comma)),
            '.' => Ok(self.add_token_type(TokenType::Dot)),
            ';' => Ok(self.add_token_type(TokenType::Semicolon)),
            ':' => Ok(self.add_token_type(TokenType::Colon)),

            '+' => Ok(self.add_with_equal(TokenType::PlusEqual, TokenType::Plus)),
            '-' => Ok(self.add_with_equal(TokenType::MinusEqual, TokenType::Minus)),
            '*' => Ok(self.add_with_equal(TokenType::StarEqual, TokenType::Star)),
            '%' => Ok(self.add_with_equal(TokenType::PercentEqual, TokenType::Percent)),
            '!' => Ok(self.add_with_equal(TokenType::BangEqual, TokenType::Bang)),
            '=' => Ok(self.add_with_equal(TokenType::EqualEqual, TokenType::Equal)),
            '<' => Ok(self.add_with_equal(TokenType::LessEqual, TokenType::Less)),
            '>' => Ok(self.add_with_equal(TokenType::GreaterEqual, TokenType::Greater)),
            '&' =>
                if self.matches('&') {
                    Ok(self.add_token_type(TokenType::AndAnd))
                } else {
                    self.error("Carácter no válido: '&'")
                },
            '|' =>
                if self.matches('|') {
                    Ok(self.add_token_type(TokenType::OrOr))
                } else {
                    self.error("Carácter no válido: '|'")
                },

            '/' =>
                if self.matches('/') {
                    Ok(self.skip_line_comment())
                } else if self.matches('*') {
                    self.skip_block_comment("*/")
                } else {
                    Ok(self.add_with_equal(TokenType::SlashEqual, TokenType::Slash))
                },
            '#' =>
                if self.peek_test('#') && self.peek_n_test(1, '#') {
                    self.current += 2;
                    self.skip_block_comment("###")
                } else {
                    Ok(self.skip_line_comment())
                },

            ' ' | '\r' | '\t' => Ok(()),
            '\n' => Ok(self.new_line()),
            '"' => self.read_text_literal().map(|e| self.add_token_type(e)),
            c =>
                if c.is_ascii_digit() {
                    let num = self.read_number_literal()?;
                    Ok(self.add_token_type(num))
                } else if c.is_ascii_alphabetic() || c == '_' {
                    let ident = self.read_identifier();
                    Ok(self.add_token_type(ident))
                } else {
                    self.error(format!("Carácter no válido: '{}'", c))
                }
        }
    }

    fn error<A, S: Into<String>>(&self, msg: S) -> LexResult<A> {
        Err(LexError {
            message: msg.into(),
            error_info: ErrorInfo::new(self.token_line, self.token_column),
        })
    }

    fn advance(&mut self) -> char {
        let result = self.source[self.current];
        self.current += 1;
        result
    }

    fn new_line(&mut self) {
        self.line += 1;
        self.line_start = self.current;
    }

    fn skip_line_comment(&mut self) {
        while self.peek_test(negated_char_test('\n')) {
            self.advance();
        }
    }

    fn skip_block_comment(&mut self, terminator: &str) -> LexResult<()> {
        let terminator: Vec<char> = terminator.chars().collect();
        while !self.is_at_end() {
            if self.source[self.current..].starts_with(&terminator) {
                self.current += terminator.len();
                return Ok(());
            }
            if self.advance() == '\n' {
                self.new_line();
            }
        }
        self.error("Comentario de bloque sin terminar")
    }

    fn peek_test<F: CharTest>(&self, f: F) -> bool {
        self.peek_n_test(0, f)
    }
    fn peek_n_test<F: CharTest>(&self, n: usize, f: F) -> bool {
        self.source.get(self.current + n).map(|e| f.char_test(*e)).unwrap_or(false)
    }

    fn read_number_literal(&mut self) -> LexResult<TokenType> {
        while self.peek_test(|e: char| e.is_ascii_digit()) {
            self.advance();
        }
        if self.peek_test('.') && self.peek_n_test(1, |e: char| e.is_ascii_digit()) {
            self.advance();
            while self.peek_test(|e: char| e.is_ascii_digit()) {
                self.advance();
            }
            let lexeme = self.current_lexeme();
            return lexeme.parse::<f64>()
                .map(TokenType::DecimalLiteral)
                .or_else(|_| self.error(format!("Número decimal no válido: {}", lexeme)));
        }
        let lexeme = self.current_lexeme();
        lexeme.parse::<i64>()
            .map(TokenType::IntegerLiteral)
            .or_else(|_| self.error(format!("Número entero fuera de rango: {}", lexeme)))
    }

    fn read_text_literal(&mut self) -> LexResult<TokenType> {
        let mut value = String::new();
        while self.peek_test(negated_char_test('"')) {
            let c = self.advance();
            match c {
                '\n' => {
                    self.new_line();
                    value.push(c);
                }
                '\\' if !self.is_at_end() => {
                    let escaped = self.advance();
                    match escaped {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        '"' => value.push('"'),
                        '\\' => value.push('\\'),
                        '\n' => {
                            self.new_line();
                            value.push('\\');
                            value.push('\n');
                        }
                        other => {
                            value.push('\\');
                            value.push(other);
                        }
                    }
                }
                c => value.push(c),
            }
        }
        if self.is_at_end() {
            self.error("Cadena de texto sin terminar")
        } else {
            self.advance(); // Move past closing "
            Ok(TokenType::TextLiteral(value))
        }
    }

    fn read_identifier(&mut self) -> TokenType {
        while self.peek_test(|e: char| e.is_ascii_alphanumeric() || e == '_') {
            self.advance();
        }
        let word = self.current_lexeme();
        Lexer::get_keyword(&word).unwrap_or(TokenType::Identifier(word))
    }

    fn current_lexeme(&self) -> String {
        self.source[self.start..self.current].iter().collect()
    }

    // Keywords are only recognized as whole words: `variable` is an identifier, never `var` + `iable`.
    fn get_keyword(word: &str) -> Option<TokenType> {
        match word {
            "hacer_mientras" => Some(TokenType::DoWhile),
            "verdadero" => Some(TokenType::True),
            "continua" => Some(TokenType::Continue),
            "extiende" => Some(TokenType::Extends),
            "entonces" => Some(TokenType::Then),
            "estatico" => Some(TokenType::Static),
            "funcion" => Some(TokenType::Function),
            "importa" => Some(TokenType::Import),
            "ingresar" => Some(TokenType::Input),
            "mientras" => Some(TokenType::While),
            "mostrar" => Some(TokenType::Print),
            "privado" => Some(TokenType::Private),
            "publico" => Some(TokenType::Public),
            "retorna" => Some(TokenType::Return),
            "finally" => Some(TokenType::Finally),
            "await" => Some(TokenType::Await),
            "clase" => Some(TokenType::Class),
            "const" => Some(TokenType::Const),
            "desde" => Some(TokenType::From),
            "falso" => Some(TokenType::False),
            "nuevo" => Some(TokenType::New),
            "sino" => Some(TokenType::Else),
            "async" => Some(TokenType::Async),
            "break" => Some(TokenType::Break),
            "catch" => Some(TokenType::Catch),
            "como" => Some(TokenType::As),
            "este" => Some(TokenType::This),
            "para" => Some(TokenType::For),
            "nulo" => Some(TokenType::Null),
            "var" => Some(TokenType::Var),
            "si" => Some(TokenType::If),
            "en" => Some(TokenType::In),
            "try" => Some(TokenType::Try),
            "entero" | "decimal" | "texto" | "booleano" | "lista" | "objeto" =>
                Some(TokenType::type_name(word)),
            _ => None,
        }
    }
}

trait CharTest {
    fn char_test(&self, c: char) -> bool;
}

fn negated_char_test(c: char) -> impl CharTest {
    move |c2| { c2 != c }
}

impl CharTest for char {
    fn char_test(&self, c: char) -> bool { self == &c }
}

impl<F> CharTest for F where F: Fn(char) -> bool {
    fn char_test(&self, c: char) -> bool { self(c) }
}

#[cfg(test)]
mod tests {
    use crate::zisk::common::tests::{unsafe_tokenize, unsafe_tokenize_types};

    use super::*;

    #[test]
    fn test_identifier() {
        assert_eq!(
            unsafe_tokenize(vec!["x_y"]),
            vec!(Token::new(1, 1, TokenType::identifier("x_y"), "x_y")),
        )
    }

    #[test]
    fn test_basic_example() {
        assert_eq!(
            unsafe_tokenize_types(vec!["var x: texto = \"lenguaje\";"]),
            vec!(
                (1, 1, TokenType::Var),
                (1, 5, TokenType::identifier("x")),
                (1, 6, TokenType::Colon),
                (1, 8, TokenType::type_name("texto")),
                (1, 14, TokenType::Equal),
                (1, 16, TokenType::text_literal("lenguaje")),
                (1, 26, TokenType::Semicolon),
            ),
        )
    }

    #[test]
    fn test_positions_across_lines() {
        assert_eq!(
            unsafe_tokenize_types(vec!["si x", "  retorna 42.5"]),
            vec!(
                (1, 1, TokenType::If),
                (1, 4, TokenType::identifier("x")),
                (2, 3, TokenType::Return),
                (2, 11, TokenType::DecimalLiteral(42.5)),
            ),
        )
    }

    #[test]
    fn test_maximal_munch_operators() {
        assert_eq!(
            unsafe_tokenize_types(vec!["a += b == c && !d || e %= 2 != 3 <= 4 >= 5"])
                .into_iter().map(|(_, _, t)| t).collect::<Vec<_>>(),
            vec!(
                TokenType::identifier("a"),
                TokenType::PlusEqual,
                TokenType::identifier("b"),
                TokenType::EqualEqual,
                TokenType::identifier("c"),
                TokenType::AndAnd,
                TokenType::Bang,
                TokenType::identifier("d"),
                TokenType::OrOr,
                TokenType::identifier("e"),
                TokenType::PercentEqual,
                TokenType::IntegerLiteral(2),
                TokenType::BangEqual,
                TokenType::IntegerLiteral(3),
                TokenType::LessEqual,
                TokenType::IntegerLiteral(4),
                TokenType::GreaterEqual,
                TokenType::IntegerLiteral(5),
            ),
        )
    }

    #[test]
    fn test_keyword_prefixes_stay_identifiers() {
        assert_eq!(
            unsafe_tokenize_types(vec!["variable sino_tal para_todo hacer_mientras"])
                .into_iter().map(|(_, _, t)| t).collect::<Vec<_>>(),
            vec!(
                TokenType::identifier("variable"),
                TokenType::identifier("sino_tal"),
                TokenType::identifier("para_todo"),
                TokenType::DoWhile,
            ),
        )
    }

    #[test]
    fn test_comments() {
        assert_eq!(
            unsafe_tokenize_types(vec![
                "42 / 7; // comentario",
                "# otro comentario",
                "/* bloque",
                "   sigue */ x ### otro",
                "bloque ### y",
            ]).into_iter().map(|(l, _, t)| (l, t)).collect::<Vec<_>>(),
            vec!(
                (1, TokenType::IntegerLiteral(42)),
                (1, TokenType::Slash),
                (1, TokenType::IntegerLiteral(7)),
                (1, TokenType::Semicolon),
                (4, TokenType::identifier("x")),
                (5, TokenType::identifier("y")),
            ),
        )
    }

    #[test]
    fn test_text_escapes() {
        assert_eq!(
            unsafe_tokenize_types(vec!["\"a\\nb \\\"c\\\"\""])
                .into_iter().map(|(_, _, t)| t).collect::<Vec<_>>(),
            vec!(TokenType::text_literal("a\nb \"c\"")),
        )
    }

    #[test]
    fn test_member_access_on_integer() {
        assert_eq!(
            unsafe_tokenize_types(vec!["5.x 1.25"])
                .into_iter().map(|(_, _, t)| t).collect::<Vec<_>>(),
            vec!(
                TokenType::IntegerLiteral(5),
                TokenType::Dot,
                TokenType::identifier("x"),
                TokenType::DecimalLiteral(1.25),
            ),
        )
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("var x = \"abc").unwrap_err();
        assert_eq!(err.get_kind(), ErrorKind::Lex);
        assert_eq!(err.get_info(), ErrorInfo::new(1, 9));
    }

    #[test]
    fn test_unterminated_block_comment() {
        let err = tokenize("x\n/* sin fin").unwrap_err();
        assert_eq!(err.get_kind(), ErrorKind::Lex);
        assert_eq!(err.get_info().line, 2);
    }

    #[test]
    fn test_invalid_character() {
        let err = tokenize("x = 3 @ 4").unwrap_err();
        assert_eq!(err.get_kind(), ErrorKind::Lex);
        assert_eq!(err.to_string(), "Error en línea 1, columna 7: Carácter no válido: '@'");
    }

    #[test]
    fn test_integer_overflow() {
        assert_eq!(
            tokenize("99999999999999999999").unwrap_err().get_kind(),
            ErrorKind::Lex,
        );
    }

    #[test]
    fn test_empty_source() {
        assert_eq!(unsafe_tokenize(vec!["  // nada", ""]), vec!());
    }
}
