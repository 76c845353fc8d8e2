use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use tracing::debug;

use crate::zisk::common::error::ErrorInfo;
use crate::zisk::common::utils::rcrc;
use crate::zisk::interpreted::interpreter::environment::Binding;
use crate::zisk::interpreted::interpreter::Interpreter;
use crate::zisk::interpreted::interpreter::result::{InterpretResult, RuntimeError};
use crate::zisk::interpreted::interpreter::value::{Module, ZiskValue};

pub const EXTENSION: &str = ".zk";

fn is_bare_name(path: &str) -> bool {
    !path.ends_with(EXTENSION) && !path.contains('/') && !path.contains('\\')
}

/// The name a module is bound under when imported without an alias.
pub fn module_name(path: &str) -> String {
    let file = path.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(path);
    file.strip_suffix(EXTENSION).unwrap_or(file).to_owned()
}

impl Interpreter {
    fn resolve_module(&self, path: &str) -> PathBuf {
        if is_bare_name(path) {
            self.config.module_root.join(format!("{}{}", path, EXTENSION))
        } else {
            self.config.module_root.join(path)
        }
    }

    /// Runs the module in its own interpreter and binds it in the current scope. A name already
    /// bound to a module is left alone; importing the same file under another name runs it again.
    pub(super) fn import(&mut self, path: &str, alias: Option<&str>, info: ErrorInfo) -> InterpretResult<()> {
        let name = alias.map(|a| a.to_owned()).unwrap_or_else(|| module_name(path));
        if self.modules.contains_key(&name) {
            debug!(module = %name, "module already imported");
            return Ok(());
        }
        if self.import_depth >= self.config.max_import_depth {
            return Err(RuntimeError::general(
                format!("Se excedió la profundidad máxima de importación ({})", self.config.max_import_depth),
                info,
            ));
        }
        let file = self.resolve_module(path);
        let source = fs::read_to_string(&file).map_err(|e| RuntimeError::general(
            format!("No se pudo encontrar el módulo: '{}' ({})", file.display(), e),
            info,
        ))?;
        debug!(module = %name, path = %file.display(), "importing module");
        let module = Rc::new(Module { name: name.to_owned(), path: file, interpreter: rcrc(self.for_module()) });
        module.interpreter.borrow_mut().home = Rc::downgrade(&module);
        let evaluated = module.interpreter.borrow_mut().evaluate(&source, true);
        evaluated.map_err(|e| RuntimeError::general(
            format!("Error al importar módulo '{}': {}", path, e),
            info,
        ))?;
        self.modules.insert(name.to_owned(), module.clone());
        if !self.environment.declare(name.to_owned(), Binding::var(ZiskValue::Module(module), None)) {
            return Err(RuntimeError::general(format!("No se puede redeclarar la constante '{}'", name), info));
        }
        Ok(())
    }

    /// Functions taken out of a module keep running inside it; so do the methods of its classes,
    /// which remember their module themselves.
    pub(super) fn module_member(&self, module: &Rc<Module>, name: &str, info: ErrorInfo) -> InterpretResult<ZiskValue> {
        let interpreter = module.interpreter.try_borrow().map_err(|_| RuntimeError::general(
            format!("El módulo '{}' ya está en ejecución", module.name),
            info,
        ))?;
        let member = interpreter.resolve_name(name);
        match member {
            Some(ZiskValue::Function { def, home: None }) => Ok(ZiskValue::Function { def, home: Some(module.clone()) }),
            Some(value) => Ok(value),
            None => Err(RuntimeError::attribute(
                format!("El módulo '{}' no tiene el miembro '{}'", module.name, name),
                info,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::Write;

    use tempfile::TempDir;

    use crate::zisk::common::error::ErrorKind;
    use crate::zisk::interpreted::interpreter::InterpreterConfig;
    use crate::zisk::interpreted::tests::run_program_with;
    use crate::zisk::interpreted::types::UNKNOWN_TYPE;

    use super::*;

    fn module_dir(files: Vec<(&str, &str)>) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, contents) in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            File::create(path).unwrap().write_all(contents.as_bytes()).unwrap();
        }
        dir
    }

    fn config(dir: &TempDir) -> InterpreterConfig {
        InterpreterConfig { module_root: dir.path().to_owned(), ..InterpreterConfig::default() }
    }

    const MATH: &str = "mostrar(\"cargando\")\nvar base = 10\nfuncion sumar(a, b) { retorna a + b + base }\n";

    #[test]
    fn names_derived_from_paths() {
        assert_eq!(module_name("mate"), "mate");
        assert_eq!(module_name("lib/mate.zk"), "mate");
        assert_eq!(module_name("lib\\util"), "util");
        assert!(is_bare_name("mate"));
        assert!(!is_bare_name("lib/mate"));
    }

    #[test]
    fn module_members_resolve_in_the_module() {
        let dir = module_dir(vec![("mate.zk", MATH)]);
        let (result, output) = run_program_with(config(&dir), vec!["importa mate", "mate.sumar(1, 2) + mate.base"]);
        assert_eq!(result.unwrap(), ZiskValue::Integer(23));
        assert_eq!(output, "cargando\n");
    }

    #[test]
    fn importing_under_two_aliases_runs_the_module_twice() {
        let dir = module_dir(vec![("mate.zk", MATH)]);
        let (result, output) = run_program_with(
            config(&dir),
            vec!["importa mate como a", "importa mate como b", "importa \"mate.zk\" como a", "a.sumar(0, 0) + b.base"],
        );
        assert_eq!(result.unwrap(), ZiskValue::Integer(20));
        assert_eq!(output, "cargando\ncargando\n");
    }

    #[test]
    fn modules_are_isolated_but_share_types() {
        let dir = module_dir(vec![("sub/formas.zk", "clase Cuadrado { var lado = 2 }\nfuncion nuevo_cuadrado() { retorna nuevo Cuadrado() }\n")]);
        let (result, _) = run_program_with(
            config(&dir),
            vec!["importa \"sub/formas.zk\" como f", "var c: Cuadrado = f.nuevo_cuadrado()", "c.lado"],
        );
        assert_eq!(result.unwrap(), ZiskValue::Integer(2));
        let (result, _) = run_program_with(config(&dir), vec!["importa \"sub/formas.zk\"", "nuevo_cuadrado()"]);
        assert_eq!(result.unwrap_err().get_kind(), ErrorKind::Runtime);
    }

    #[test]
    fn class_members_run_in_their_module() {
        let dir = module_dir(vec![("cajas.zk", "var base = 10\n\
            clase Caja {\n\
              var extra = 0\n\
              funcion constructor(extra) { este.extra = extra + base }\n\
              funcion valor() { retorna base + este.extra }\n\
              estatico funcion doble() { retorna base * 2 }\n\
            }\n\
            funcion f() { retorna base }\n")]);
        let (result, output) = run_program_with(config(&dir), vec![
            "importa cajas",
            "var base = 1000",
            "mostrar(cajas.f())",
            "var c = cajas.Caja(1)",
            "mostrar(c.valor(), cajas.Caja.doble())",
            "var v = c.valor",
            "v()",
        ]);
        assert_eq!(output, "10\n21 20\n");
        assert_eq!(result.unwrap(), ZiskValue::Integer(21));
    }

    #[test]
    fn missing_or_broken_modules() {
        let dir = module_dir(vec![("roto.zk", "var x = ")]);
        let (result, _) = run_program_with(config(&dir), vec!["importa nada"]);
        assert_eq!(result.unwrap_err().get_kind(), ErrorKind::Runtime);
        let (result, _) = run_program_with(config(&dir), vec!["importa roto"]);
        assert_eq!(result.unwrap_err().get_kind(), ErrorKind::Runtime);
        let (result, _) = run_program_with(config(&dir), vec!["importa \"roto.zk\" como r", "r"]);
        assert!(result.is_err());
    }

    #[test]
    fn unknown_module_member() {
        let dir = module_dir(vec![("mate.zk", MATH)]);
        let (result, _) = run_program_with(config(&dir), vec!["importa mate", "mate.restar"]);
        assert_eq!(result.unwrap_err().get_kind(), ErrorKind::Attribute);
        let (result, _) = run_program_with(config(&dir), vec!["importa mate", "tipo_de(mate)"]);
        assert_eq!(result.unwrap(), ZiskValue::text(UNKNOWN_TYPE));
    }

    #[test]
    fn self_import_is_bounded() {
        let dir = module_dir(vec![("ciclo.zk", "importa \"ciclo.zk\" como otro\n")]);
        let (result, _) = run_program_with(config(&dir), vec!["importa ciclo"]);
        assert_eq!(result.unwrap_err().get_kind(), ErrorKind::Runtime);
    }
}
