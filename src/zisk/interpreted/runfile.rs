use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::zisk::common::error::ZiskError;
use crate::zisk::interpreted::interpreter::value::ZiskValue;
use crate::zisk::interpreted::interpreter::Interpreter;

pub const GENERATED_HEADER: &str = "# Auto-generado por Zisk Compiler\n\n";
const SOURCE_EXTENSION: &str = "zk";
const TRANSPILED_EXTENSION: &str = "py";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub optimize: bool,
    /// Write the transpiled program next to the source.
    pub emit: bool,
}

impl Default for RunOptions {
    fn default() -> Self { RunOptions { optimize: true, emit: true } }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("No se pudo leer '{}': {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("{}: {error}", .error.get_kind().name())]
    Zisk { error: Box<dyn ZiskError> },
    #[error("No se pudo escribir '{}': {source}", .path.display())]
    Emit { path: PathBuf, source: io::Error },
}

#[derive(Debug)]
pub struct Loaded {
    pub value: ZiskValue,
    pub emitted: Option<PathBuf>,
}

/// Evaluates the file at `path` in `interpreter` and prints its value unless it is `nulo`.
pub fn load(interpreter: &mut Interpreter, path: &Path, options: RunOptions) -> Result<Loaded, LoadError> {
    let source = fs::read_to_string(path).map_err(|source| LoadError::Read { path: path.to_owned(), source })?;
    debug!(path = %path.display(), bytes = source.len(), "loaded source");
    let (value, transpiled) = interpreter.evaluate(&source, options.optimize)
        .map_err(|error| LoadError::Zisk { error })?;
    if value != ZiskValue::Null {
        println!("{}", value.repr());
    }
    let is_source = path.extension().map(|e| e == SOURCE_EXTENSION).unwrap_or(false);
    let emitted = if options.emit && is_source {
        let target = path.with_extension(TRANSPILED_EXTENSION);
        fs::write(&target, format!("{}{}\n", GENERATED_HEADER, transpiled))
            .map_err(|source| LoadError::Emit { path: target.clone(), source })?;
        info!(path = %target.display(), "wrote transpiled program");
        Some(target)
    } else {
        None
    };
    Ok(Loaded { value, emitted })
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::io::Cursor;
    use std::rc::Rc;

    use tempfile::TempDir;

    use crate::zisk::common::error::ErrorKind;

    use super::*;

    fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn quiet_interpreter() -> Interpreter {
        Interpreter::new().with_streams(
            Rc::new(RefCell::new(Vec::<u8>::new())),
            Rc::new(RefCell::new(Cursor::new(Vec::<u8>::new()))),
        )
    }

    #[test]
    fn writes_the_transpiled_sibling() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "hola.zk", "var x = 2 * 3\nmostrar(x)\nx");
        let loaded = load(&mut quiet_interpreter(), &path, RunOptions::default()).unwrap();
        assert_eq!(loaded.value, ZiskValue::Integer(6));
        let emitted = loaded.emitted.unwrap();
        assert_eq!(emitted, dir.path().join("hola.py"));
        assert_eq!(fs::read_to_string(emitted).unwrap(), format!("{}x = 6\n\nprint(x)\n\nx\n", GENERATED_HEADER));
    }

    #[test]
    fn emission_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "hola.zk", "var x = 1");
        let options = RunOptions { emit: false, ..RunOptions::default() };
        assert!(load(&mut quiet_interpreter(), &path, options).unwrap().emitted.is_none());
        let other = write(&dir, "hola.txt", "var x = 1");
        assert!(load(&mut quiet_interpreter(), &other, RunOptions::default()).unwrap().emitted.is_none());
        assert!(!dir.path().join("hola.py").exists());
    }

    #[test]
    fn reports_failures() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nada.zk");
        assert!(matches!(load(&mut quiet_interpreter(), &missing, RunOptions::default()), Err(LoadError::Read { .. })));
        let path = write(&dir, "malo.zk", "mostrar(1 / 0)");
        match load(&mut quiet_interpreter(), &path, RunOptions::default()) {
            Err(LoadError::Zisk { error }) => assert_eq!(error.get_kind(), ErrorKind::Runtime),
            other => panic!("Unexpected {:?}", other),
        }
        assert!(!dir.path().join("malo.py").exists());
    }
}
