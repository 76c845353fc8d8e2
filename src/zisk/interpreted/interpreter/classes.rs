use std::cell::RefCell;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use tracing::debug;

use crate::zisk::common::error::ErrorInfo;
use crate::zisk::common::utils::{rcrc, RcRc};
use crate::zisk::interpreted::ast::{ClassDef, ClassMember, Expression};
use crate::zisk::interpreted::interpreter::Interpreter;
use crate::zisk::interpreted::interpreter::result::{InterpretResult, RuntimeError};
use crate::zisk::interpreted::interpreter::value::{ClassDescriptor, FieldDescriptor, Instance, MethodDescriptor, StaticMember, ZiskValue};
use crate::zisk::interpreted::types::{MethodSignature, TypeError};

pub const CONSTRUCTOR: &str = "constructor";

impl Interpreter {
    /// Static members and constants are evaluated now, in declaration order; instance field
    /// defaults are evaluated once and copied into every new instance.
    pub(super) fn declare_class(&mut self, def: &ClassDef) -> InterpretResult<()> {
        let superclass = match &def.superclass {
            None => None,
            Some(name) => Some(self.classes.get(name).cloned().ok_or_else(|| RuntimeError::general(
                format!("La superclase '{}' no está definida", name),
                def.error_info,
            ))?),
        };
        self.type_system.borrow_mut().add_class(def.name.as_str(), def.superclass.clone());

        let mut fields = Vec::new();
        let mut statics = IndexMap::new();
        let mut methods = IndexMap::new();
        for member in &def.members {
            match member {
                ClassMember::Field { name, declared_type, value, modifiers, error_info } => {
                    let default = self.member_value(&def.name, name, declared_type, value.as_ref(), *error_info)?;
                    if modifiers.is_static {
                        statics.insert(name.to_owned(), StaticMember {
                            value: default,
                            declared_type: declared_type.clone(),
                            is_const: false,
                        });
                    } else {
                        fields.push(FieldDescriptor { name: name.to_owned(), declared_type: declared_type.clone(), default });
                    }
                }
                // Class constants always live at class level.
                ClassMember::Constant { name, declared_type, value, error_info, .. } => {
                    let value = self.member_value(&def.name, name, declared_type, Some(value), *error_info)?;
                    statics.insert(name.to_owned(), StaticMember { value, declared_type: declared_type.clone(), is_const: true });
                }
                ClassMember::Method(method, modifiers) => {
                    self.type_system.borrow_mut().add_method_signature(&def.name, &method.name, MethodSignature {
                        return_type: method.return_type.clone(),
                        params: method.params.clone(),
                    });
                    methods.insert(method.name.to_owned(), Rc::new(MethodDescriptor {
                        def: Rc::new(method.clone()),
                        owner: def.name.to_owned(),
                        modifiers: *modifiers,
                        home: self.home.clone(),
                    }));
                }
            }
        }
        debug!(
            class = %def.name,
            superclass = ?def.superclass,
            fields = fields.len(),
            methods = methods.len(),
            "declared class",
        );
        self.classes.insert(def.name.to_owned(), Rc::new(ClassDescriptor {
            name: def.name.to_owned(),
            superclass,
            fields,
            statics: RefCell::new(statics),
            methods,
        }));
        Ok(())
    }

    fn member_value(
        &mut self,
        class: &str,
        name: &str,
        declared_type: &Option<String>,
        value: Option<&Expression>,
        info: ErrorInfo,
    ) -> InterpretResult<ZiskValue> {
        let value = match value {
            Some(e) => self.evaluate_expression(e)?,
            None => ZiskValue::Null,
        };
        self.type_system.borrow().validate_assignment(
            &format!("el campo '{}.{}'", class, name),
            &value,
            declared_type.as_deref(),
            info,
        )?;
        Ok(value)
    }

    pub(super) fn instantiate(&mut self, class: &str, args: &[Expression], info: ErrorInfo) -> InterpretResult<ZiskValue> {
        let class = self.classes.get(class).cloned()
            .ok_or_else(|| RuntimeError::general(format!("Clase no definida: '{}'", class), info))?;
        let args = self.evaluate_arguments(args)?;
        self.construct(&class, args, info)
    }

    /// Field defaults are applied from the root ancestor down, then `constructor`, if any class in
    /// the chain defines one, runs with `args`.
    pub(super) fn construct(
        &mut self, class: &Rc<ClassDescriptor>, args: Vec<ZiskValue>, info: ErrorInfo,
    ) -> InterpretResult<ZiskValue> {
        let instance = rcrc(Instance::new(class.clone()));
        for ancestor in class.ancestry() {
            let mut target = instance.borrow_mut();
            for field in &ancestor.fields {
                target.fields.insert(field.name.to_owned(), field.default.clone());
            }
        }
        match class.find_method(CONSTRUCTOR) {
            Some(constructor) => {
                self.call_method(Some(instance.clone()), &constructor, args, info)?;
            }
            None if !args.is_empty() => return Err(TypeError::new(
                format!("La clase '{}' no define un constructor, pero recibió {} argumento(s)", class.name, args.len()),
                info,
            ).into()),
            None => {}
        }
        Ok(ZiskValue::Instance(instance))
    }

    /// Static methods never get a receiver; instance methods require one. Methods of classes
    /// declared in another module run in that module's interpreter.
    pub(super) fn call_method(
        &mut self,
        receiver: Option<RcRc<Instance>>,
        method: &MethodDescriptor,
        args: Vec<ZiskValue>,
        info: ErrorInfo,
    ) -> InterpretResult<ZiskValue> {
        let display_name = format!("{}.{}", method.owner, method.def.name);
        let receiver = if method.is_static() {
            None
        } else {
            Some(receiver.ok_or_else(|| RuntimeError::general(
                format!("El método de instancia '{}' requiere una instancia", display_name),
                info,
            ))?)
        };
        let class_name = receiver.as_ref()
            .map(|r| r.borrow().class.name.to_owned())
            .unwrap_or_else(|| method.owner.to_owned());
        {
            let types = self.type_system.borrow();
            let params = types.get_method_signature(&class_name, &method.def.name)
                .map(|signature| &signature.params)
                .unwrap_or(&method.def.params);
            types.validate_function_call(&display_name, &args, params, info)?;
        }
        match method.home.upgrade().filter(|_| !Weak::ptr_eq(&method.home, &self.home)) {
            Some(module) => {
                let mut interpreter = module.interpreter.try_borrow_mut().map_err(|_| RuntimeError::general(
                    format!("El módulo '{}' ya está en ejecución", module.name),
                    info,
                ))?;
                interpreter.invoke(&method.def, &display_name, args, receiver, info)
            }
            None => self.invoke(&method.def, &display_name, args, receiver, info),
        }
    }

    /// Fields first, then methods and statics along the superclass chain.
    pub(super) fn instance_member(
        &self, instance: &RcRc<Instance>, name: &str, info: ErrorInfo,
    ) -> InterpretResult<ZiskValue> {
        let borrowed = instance.borrow();
        if let Some(value) = borrowed.fields.get(name) {
            return Ok(value.clone());
        }
        if let Some(method) = borrowed.class.find_method(name) {
            let receiver = if method.is_static() { None } else { Some(instance.clone()) };
            return Ok(ZiskValue::Method { receiver, method });
        }
        if let Some(member) = borrowed.class.find_static(name) {
            return Ok(member.value);
        }
        Err(RuntimeError::attribute(
            format!("La instancia de '{}' no tiene el atributo '{}'", borrowed.class.name, name),
            info,
        ))
    }

    pub(super) fn class_member(
        &self, class: &Rc<ClassDescriptor>, name: &str, info: ErrorInfo,
    ) -> InterpretResult<ZiskValue> {
        if let Some(member) = class.find_static(name) {
            return Ok(member.value);
        }
        match class.find_method(name) {
            Some(method) => Ok(ZiskValue::Method { receiver: None, method }),
            None => Err(RuntimeError::attribute(
                format!("La clase '{}' no tiene el miembro '{}'", class.name, name),
                info,
            )),
        }
    }

    pub(super) fn set_field(
        &self, instance: &RcRc<Instance>, name: &str, value: ZiskValue, info: ErrorInfo,
    ) -> InterpretResult<()> {
        let class = instance.borrow().class.clone();
        let declared_type = class.find_field(name).and_then(|f| f.declared_type.clone());
        self.type_system.borrow().validate_assignment(
            &format!("el campo '{}.{}'", class.name, name),
            &value,
            declared_type.as_deref(),
            info,
        )?;
        instance.borrow_mut().fields.insert(name.to_owned(), value);
        Ok(())
    }

    /// Only static `var` members can be reassigned, through the class that declares them or any
    /// subclass.
    pub(super) fn set_static(
        &self, class: &Rc<ClassDescriptor>, name: &str, value: ZiskValue, info: ErrorInfo,
    ) -> InterpretResult<()> {
        let owner = class.static_owner(name).ok_or_else(|| RuntimeError::attribute(
            format!("La clase '{}' no tiene el miembro estático '{}'", class.name, name),
            info,
        ))?;
        let mut statics = owner.statics.borrow_mut();
        let member = match statics.get_mut(name) {
            Some(member) => member,
            None => return Err(RuntimeError::attribute(
                format!("La clase '{}' no tiene el miembro estático '{}'", class.name, name),
                info,
            )),
        };
        if member.is_const {
            return Err(RuntimeError::general(
                format!("No se puede reasignar la constante de clase '{}.{}'", owner.name, name),
                info,
            ));
        }
        self.type_system.borrow().validate_assignment(
            &format!("el miembro estático '{}.{}'", owner.name, name),
            &value,
            member.declared_type.as_deref(),
            info,
        )?;
        member.value = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::zisk::common::error::ErrorKind;
    use crate::zisk::interpreted::tests::{run_program, run_program_output};

    use super::*;

    const ANIMALS: [&str; 12] = [
        "clase Animal {",
        "  var nombre: texto = \"?\"",
        "  var patas: entero = 4",
        "  funcion constructor(nombre: texto) { este.nombre = nombre }",
        "  funcion hablar() { retorna este.nombre + \" hace ruido\" }",
        "  funcion describir() { retorna este.hablar() + \" con \" + convertir_a_texto(este.patas) + \" patas\" }",
        "}",
        "clase Perro extiende Animal {",
        "  funcion hablar() { retorna este.nombre + \" ladra\" }",
        "}",
        "clase Piedra { }",
        "",
    ];

    fn with_animals(lines: Vec<&str>) -> Vec<&str> {
        ANIMALS.iter().copied().chain(lines).collect()
    }

    #[test]
    fn inheritance_and_dispatch() {
        let output = run_program_output(with_animals(vec![
            "var a = nuevo Animal(\"gato\")",
            "var p = nuevo Perro(\"rex\")",
            "mostrar(a.hablar())",
            "mostrar(p.hablar())",
            "mostrar(p.describir())",
        ]));
        assert_eq!(output, "gato hace ruido\nrex ladra\nrex ladra con 4 patas\n");
    }

    #[test]
    fn subclass_instances_pass_declared_types() {
        let (result, _) = run_program(with_animals(vec!["var a: Animal = nuevo Perro(\"rex\")", "a.nombre"]));
        assert_eq!(result.unwrap(), ZiskValue::text("rex"));
        let (result, _) = run_program(with_animals(vec!["var a: Animal = nuevo Piedra()"]));
        assert_eq!(result.unwrap_err().get_kind(), ErrorKind::Type);
        let (result, _) = run_program(with_animals(vec!["var p: Perro = nuevo Animal(\"x\")"]));
        assert_eq!(result.unwrap_err().get_kind(), ErrorKind::Type);
    }

    #[test]
    fn constructor_arguments_are_checked() {
        let (result, _) = run_program(with_animals(vec!["nuevo Perro(1)"]));
        assert_eq!(result.unwrap_err().get_kind(), ErrorKind::Type);
        let (result, _) = run_program(with_animals(vec!["nuevo Perro()"]));
        assert_eq!(result.unwrap_err().get_kind(), ErrorKind::Type);
        let (result, _) = run_program(with_animals(vec!["nuevo Piedra(1)"]));
        assert_eq!(result.unwrap_err().get_kind(), ErrorKind::Type);
    }

    #[test]
    fn field_types_are_enforced() {
        let (result, _) = run_program(with_animals(vec!["var a = nuevo Animal(\"x\")", "a.patas = \"muchas\""]));
        assert_eq!(result.unwrap_err().get_kind(), ErrorKind::Type);
        let (result, _) = run_program(vec!["clase Malo { var n: entero = \"x\" }"]);
        assert_eq!(result.unwrap_err().get_kind(), ErrorKind::Type);
    }

    #[test]
    fn instances_have_their_own_fields() {
        let output = run_program_output(with_animals(vec![
            "var a = nuevo Animal(\"uno\")",
            "var b = nuevo Animal(\"dos\")",
            "a.patas = 3",
            "mostrar(a.patas, b.patas, a == b, a == a)",
        ]));
        assert_eq!(output, "3 4 falso verdadero\n");
    }

    #[test]
    fn static_members() {
        let output = run_program_output(vec![
            "clase Contador {",
            "  estatico var total: entero = 0",
            "  const LIMITE = 10",
            "  estatico funcion incrementar() { Contador.total += 1; retorna Contador.total }",
            "}",
            "Contador.incrementar()",
            "Contador.incrementar()",
            "mostrar(Contador.total, Contador.LIMITE)",
            "try { Contador.LIMITE = 1 } catch (e) { mostrar(e.tipo) }",
            "try { Contador.total = \"x\" } catch (e) { mostrar(e.tipo) }",
            "try { Contador.otro = 1 } catch (e) { mostrar(e.tipo) }",
        ]);
        assert_eq!(output, "2 10\nErrorEjecucion\nErrorTipo\nErrorAtributo\n");
    }

    #[test]
    fn statics_are_inherited() {
        let output = run_program_output(vec![
            "clase Base { estatico var cuenta = 1 }",
            "clase Hija extiende Base { }",
            "Hija.cuenta = 5",
            "mostrar(Base.cuenta, nuevo Hija().cuenta)",
        ]);
        assert_eq!(output, "5 5\n");
    }

    #[test]
    fn instance_methods_need_an_instance() {
        let (result, _) = run_program(with_animals(vec!["Animal.hablar()"]));
        assert_eq!(result.unwrap_err().get_kind(), ErrorKind::Runtime);
    }

    #[test]
    fn methods_are_bound_values() {
        let (result, _) = run_program(with_animals(vec!["var p = nuevo Perro(\"rex\")", "var f = p.hablar", "f()"]));
        assert_eq!(result.unwrap(), ZiskValue::text("rex ladra"));
    }

    #[test]
    fn unknown_members() {
        let (result, _) = run_program(with_animals(vec!["nuevo Piedra().peso"]));
        assert_eq!(result.unwrap_err().get_kind(), ErrorKind::Attribute);
        let (result, _) = run_program(with_animals(vec!["Piedra.peso"]));
        assert_eq!(result.unwrap_err().get_kind(), ErrorKind::Attribute);
    }

    #[test]
    fn missing_superclass() {
        let (result, _) = run_program(vec!["clase Hija extiende Nadie { }"]);
        assert_eq!(result.unwrap_err().get_kind(), ErrorKind::Runtime);
        let (result, _) = run_program(vec!["nuevo Nadie()"]);
        assert_eq!(result.unwrap_err().get_kind(), ErrorKind::Runtime);
    }

    #[test]
    fn type_names_of_instances() {
        let (result, _) = run_program(with_animals(vec!["tipo_de(nuevo Perro(\"x\"))"]));
        assert_eq!(result.unwrap(), ZiskValue::text("Perro"));
    }
}
