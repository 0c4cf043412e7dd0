use std::collections::BTreeMap;

use crate::constant::{self, compute_constant_initializer};
use crate::ctype::{CType, QualifiedType};
use crate::error::{CompileError, CompileWarning, ErrorCollector};
use crate::machine::Machine;
use crate::type_builder::TypeBuilder;
use crate::type_registry::{Object, Symbol, TypeRegistry};
use lang_c::ast::{
    Declaration, DeclarationSpecifier, ExternalDeclaration, FunctionDefinition, FunctionSpecifier,
    InitDeclarator, StorageClassSpecifier,
};
use lang_c::span::Node;

/**
 * File-scope declarations of one translation unit, checked and laid out for a target.
 */
pub struct TranslationUnit {
    registry: TypeRegistry,
}

impl TranslationUnit {
    /**
     * Translate every external declaration.
     *
     * A failing declaration does not stop the rest, so all errors end up in `ec`.
     */
    pub fn translate(
        tu: &lang_c::ast::TranslationUnit,
        machine: &Machine,
        ec: &mut ErrorCollector,
    ) -> Result<Self, ()> {
        let mut r = Self {
            registry: TypeRegistry::new(machine),
        };
        let mut has_error = false;
        for ed in tu.0.iter() {
            let result = match &ed.node {
                ExternalDeclaration::StaticAssert(sa) => {
                    constant::check_static_assert(sa, &mut r.registry, ec)
                }
                ExternalDeclaration::Declaration(n) => r.add_declaration(n, ec),
                ExternalDeclaration::FunctionDefinition(n) => r.add_function_definition(n, ec),
            };
            if result.is_err() {
                has_error = true;
            }
        }
        if has_error {
            Err(())
        } else {
            Ok(r)
        }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn lookup_typedef(&self, name: &str) -> Option<&QualifiedType> {
        self.registry.lookup_alias(name)
    }

    pub fn lookup_object(&self, name: &str) -> Option<&Object> {
        self.registry.lookup_object(name)
    }

    /**
     * Every typedef name with its type, sorted by name.
     *
     * Two units with equal bindings agree on all the types they name.
     */
    pub fn bindings(&self) -> BTreeMap<String, String> {
        self.registry
            .symbols()
            .filter_map(|(name, sym)| match sym {
                Symbol::Type(t) => Some((name.clone(), format!("{}", t))),
                Symbol::Object(_) => None,
            })
            .collect()
    }

    fn add_declaration(&mut self, n: &Node<Declaration>, ec: &mut ErrorCollector) -> Result<(), ()> {
        let decl = &n.node;
        let mut storage_class = None;
        let mut type_builder = TypeBuilder::new();
        for declspec in decl.specifiers.iter() {
            match &declspec.node {
                DeclarationSpecifier::StorageClass(stclass) => {
                    if storage_class.is_some() {
                        return ec.record_error(CompileError::MultipleStorageClasses, stclass.span);
                    }
                    if let StorageClassSpecifier::Auto
                    | StorageClassSpecifier::Register
                    | StorageClassSpecifier::ThreadLocal = stclass.node
                    {
                        return ec.record_error(CompileError::WrongStorageClass, stclass.span);
                    }
                    storage_class = Some(stclass.node.clone());
                }
                DeclarationSpecifier::TypeSpecifier(typespec) => {
                    type_builder.add_type_specifier_node(typespec, &mut self.registry, ec)?
                }
                DeclarationSpecifier::TypeQualifier(typequal) => {
                    type_builder.add_type_qualifier_node(typequal, ec)?
                }
                DeclarationSpecifier::Function(fnspec) => match fnspec.node {
                    FunctionSpecifier::Inline => (),
                    FunctionSpecifier::Noreturn => ec.record_warning(
                        CompileWarning::Unimplemented("_Noreturn".to_string()),
                        fnspec.span,
                    )?,
                },
                DeclarationSpecifier::Alignment(_) => ec.record_warning(
                    CompileWarning::Unimplemented("alignment specifier".to_string()),
                    declspec.span,
                )?,
                DeclarationSpecifier::Extension(_) => ec.record_warning(
                    CompileWarning::Unimplemented("extension".to_string()),
                    declspec.span,
                )?,
            }
        }
        if decl.declarators.is_empty() {
            // `struct S { ... };` declares the tag and nothing else
            let t = type_builder.stage2(n.span, ec)?.finalize();
            if !t.t.is_struct_or_union() {
                ec.record_warning(CompileWarning::EmptyDeclaration, n.span)?;
            }
            return Ok(());
        }
        let mut has_error = false;
        for init_declarator in decl.declarators.iter() {
            if self
                .process_init_declarator_node(init_declarator, storage_class.as_ref(), &type_builder, ec)
                .is_err()
            {
                has_error = true;
            }
        }
        if has_error {
            Err(())
        } else {
            Ok(())
        }
    }

    fn process_init_declarator_node(
        &mut self,
        init_declarator: &Node<InitDeclarator>,
        storage_class: Option<&StorageClassSpecifier>,
        type_builder: &TypeBuilder,
        ec: &mut ErrorCollector,
    ) -> Result<(), ()> {
        let span = init_declarator.span;
        let init_declarator = &init_declarator.node;
        let stage2 = type_builder.stage2(span, ec)?;
        let (id, t) =
            stage2.process_declarator_node(&init_declarator.declarator, &mut self.registry, ec)?;
        let id = match id {
            Some(id) => id,
            None => return ec.record_warning(CompileWarning::EmptyDeclaration, span),
        };
        if !t.t.is_function() && t.t.is_complete(&self.registry) {
            t.t.sizeof(&self.registry, span, ec)?;
        }
        let initializer = match &init_declarator.initializer {
            Some(initializer) => {
                if let CType::Function { .. } = t.t {
                    return ec.record_error(CompileError::BadDeclarator(id), initializer.span);
                }
                Some(compute_constant_initializer(
                    initializer,
                    &mut self.registry,
                    ec,
                )?)
            }
            None => None,
        };
        self.registry
            .declare(&id, t, storage_class, initializer, span, ec)
    }

    fn add_function_definition(
        &mut self,
        n: &Node<FunctionDefinition>,
        ec: &mut ErrorCollector,
    ) -> Result<(), ()> {
        ec.record_warning(
            CompileWarning::Unimplemented("function definitions".to_string()),
            n.span,
        )
    }
}

#[cfg(test)]
mod test {
    use crate::ctype::{self, CType, QualifiedType, Qualifiers};
    use crate::error::{CompileError, CompileWarning};
    use crate::machine::Machine;
    use crate::type_registry::GlobalStorageClass;
    use crate::value::{AddressBase, Value};

    use super::*;

    use lang_c::driver::{parse_preprocessed, Config, Flavor};

    fn translate_on(target: &str, code: &str) -> (Result<TranslationUnit, ()>, ErrorCollector) {
        let mut cfg = Config::default();
        cfg.flavor = Flavor::GnuC11;
        let p = parse_preprocessed(&cfg, code.to_string()).unwrap();
        let machine = Machine::preset(target).unwrap();
        let mut ec = ErrorCollector::new();
        (TranslationUnit::translate(&p.unit, &machine, &mut ec), ec)
    }

    fn translate(code: &str) -> (Result<TranslationUnit, ()>, ErrorCollector) {
        translate_on("ccpu", code)
    }

    fn initializer_of(tu: &TranslationUnit, name: &str) -> Value {
        tu.lookup_object(name)
            .unwrap()
            .initializer
            .as_ref()
            .unwrap()
            .val
            .clone()
    }

    #[test]
    fn test_global_var_1() {
        let (tu_result, ec) = translate("int x;");
        assert!(tu_result.is_ok());
        assert_eq!(ec.get_error_count(), 0);
        let tu = tu_result.unwrap();
        let decl = tu.lookup_object("x").unwrap();
        assert_eq!(decl.t.t, ctype::INT_TYPE);
        assert_eq!(decl.t.qualifiers, Qualifiers::empty());
        assert_eq!(decl.storage_class, GlobalStorageClass::Default);
    }

    #[test]
    fn test_global_var_2() {
        let (tu_result, ec) = translate("static const char x;");
        assert!(tu_result.is_ok());
        assert_eq!(ec.get_error_count(), 0);
        let tu = tu_result.unwrap();
        let decl = tu.lookup_object("x").unwrap();
        assert_eq!(decl.t.t, ctype::CHAR_TYPE);
        assert_eq!(decl.t.qualifiers, Qualifiers::CONST);
        assert_eq!(decl.storage_class, GlobalStorageClass::Static);
    }

    #[test]
    fn test_global_var_3() {
        let (tu_result, ec) = translate("signed int x, * const volatile y;");
        assert!(tu_result.is_ok());
        assert_eq!(ec.get_error_count(), 0);
        let tu = tu_result.unwrap();
        let decl = tu.lookup_object("y").unwrap();
        assert_eq!(decl.t.qualifiers, Qualifiers::CONST | Qualifiers::VOLATILE);
        assert_eq!(
            decl.t.t,
            CType::Pointer(Box::new(QualifiedType {
                t: ctype::INT_TYPE,
                qualifiers: Qualifiers::empty()
            }))
        );
    }

    #[test]
    fn test_global_var_err() {
        let (tu_result, ec) = translate("static extern int x;");
        assert!(tu_result.is_err());
        assert_eq!(ec.get_error_count(), 1);

        let (tu_result, ec) = translate("static int x; int x;");
        assert!(tu_result.is_err());
        assert_eq!(ec.get_error_count(), 1);

        let (tu_result, ec) = translate("long short int x;");
        assert!(tu_result.is_err());
        assert_eq!(ec.get_error_count(), 1);
    }

    #[test]
    fn test_errors_do_not_stop_translation() {
        let (tu_result, ec) = translate("long short int x; int y = 1 / 0; int z; long z;");
        assert!(tu_result.is_err());
        assert_eq!(ec.get_error_count(), 3);
    }

    #[test]
    fn test_global_var_init() {
        let (tu_result, ec) = translate(
            "const long a = 42; unsigned char b = 0x01020304LLU; const long c = (char)0x55667788;
             const unsigned long d = -1; const int e = 5 + 0x10001; const unsigned int f = 10 - 11;",
        );
        assert!(tu_result.is_ok());
        assert_eq!(ec.get_error_count(), 0);
        let tu = tu_result.unwrap();
        assert_eq!(initializer_of(&tu, "a"), Value::Int(42));
        assert_eq!(initializer_of(&tu, "b"), Value::Int(4));
        assert_eq!(initializer_of(&tu, "c"), Value::Int(0x88));
        assert_eq!(initializer_of(&tu, "d"), Value::Int(0xffffffff));
        assert_eq!(initializer_of(&tu, "e"), Value::Int(6));
        assert_eq!(initializer_of(&tu, "f"), Value::Int(0xffff));
    }

    #[test]
    fn test_address_initializer() {
        let (tu_result, ec) = translate("int x; int *p = &x; int *q = (void*)0; int *r = 0;");
        assert!(tu_result.is_ok());
        assert_eq!(ec.get_error_count(), 0);
        let tu = tu_result.unwrap();
        let x = tu.lookup_object("x").unwrap().id;
        match initializer_of(&tu, "p") {
            Value::Address(a) => assert_eq!(a.base, AddressBase::Object(x)),
            v => panic!("unexpected {:?}", v),
        }
        match initializer_of(&tu, "q") {
            Value::Address(a) => assert!(a.is_null()),
            v => panic!("unexpected {:?}", v),
        }
        match initializer_of(&tu, "r") {
            Value::Address(a) => assert!(a.is_null()),
            v => panic!("unexpected {:?}", v),
        }
    }

    #[test]
    fn test_bad_pointer_initializer() {
        let (tu_result, _) = translate("int *p = 5;");
        assert!(tu_result.is_err());
        let (tu_result, _) = translate("int x; long *p = &x;");
        assert!(tu_result.is_err());
    }

    #[test]
    fn test_typedef_redefinition() {
        let (tu_result, ec) = translate("typedef unsigned int u; typedef unsigned int u;");
        assert!(tu_result.is_ok());
        assert_eq!(ec.get_error_count(), 0);

        let (tu_result, ec) = translate("typedef unsigned int u; typedef int u;");
        assert!(tu_result.is_err());
        assert_eq!(
            ec.get_first_error().unwrap().0,
            CompileError::TypeRedefinition("u".to_string())
        );

        let (tu_result, ec) = translate("int u; typedef int u;");
        assert!(tu_result.is_err());
        assert_eq!(
            ec.get_first_error().unwrap().0,
            CompileError::ConflictingStorageClass("u".to_string())
        );
    }

    #[test]
    fn test_static_assert() {
        let (tu_result, _) = translate("_Static_assert(sizeof(int) == 2, \"int\");");
        assert!(tu_result.is_ok());
        let (tu_result, ec) = translate_on("x86_64", "_Static_assert(sizeof(int) == 2, \"int\");");
        assert!(tu_result.is_err());
        assert_eq!(
            ec.get_first_error().unwrap().0,
            CompileError::StaticAssertionFailed("int".to_string())
        );
    }

    #[test]
    fn test_struct_declaration() {
        let (tu_result, ec) = translate(
            "struct S { char a; long b; }; _Static_assert(sizeof(struct S) == 8, \"size\");",
        );
        assert!(tu_result.is_ok());
        assert_eq!(ec.get_warning_count(), 0);
    }

    #[test]
    fn test_empty_declaration() {
        let (tu_result, ec) = translate("int;");
        assert!(tu_result.is_ok());
        assert_eq!(ec.get_warning_count(), 1);
        assert_eq!(
            ec.get_first_warning().unwrap().0,
            CompileWarning::EmptyDeclaration
        );
    }

    #[test]
    fn test_function_declaration() {
        let (tu_result, ec) = translate("int f(int); void g(void) {}");
        assert!(tu_result.is_ok());
        let tu = tu_result.unwrap();
        assert!(tu.lookup_object("f").unwrap().t.t.is_function());
        assert_eq!(ec.get_warning_count(), 1);
    }

    #[test]
    fn test_bindings() {
        let (tu_result, _) =
            translate("typedef long b; typedef const char *a; int x; typedef struct { int m; } s;");
        let tu = tu_result.unwrap();
        let bindings: Vec<(String, String)> = tu.bindings().into_iter().collect();
        assert_eq!(
            bindings,
            vec![
                ("a".to_string(), "const char *".to_string()),
                ("b".to_string(), "long".to_string()),
                ("s".to_string(), "struct <anonymous>".to_string()),
            ]
        );
        assert!(tu.lookup_typedef("x").is_none());
    }
}
