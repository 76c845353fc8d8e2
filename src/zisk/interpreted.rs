pub mod ast;
pub mod interpreter;
pub mod optimizer;
pub mod parser;
pub mod prompt;
pub mod runfile;
pub mod transpiler;
pub mod types;
