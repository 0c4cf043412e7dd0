use lang_c::ast::{Expression, ExternalDeclaration, Initializer};
use lang_c::driver::{parse_preprocessed, Config, Flavor};
use lang_c::span::Node;

use crate::error::ErrorCollector;
use crate::machine::Machine;
use crate::session::Session;
use crate::translation_unit::TranslationUnit;

pub fn session(target: &str) -> Session {
    Session::new(Machine::preset(target).unwrap())
}

pub fn translate_on(target: &str, code: &str) -> (Result<TranslationUnit, ()>, ErrorCollector) {
    let mut ec = ErrorCollector::new();
    let r = session(target).compile_source(code, &mut ec);
    (r, ec)
}

pub fn translate(code: &str) -> (Result<TranslationUnit, ()>, ErrorCollector) {
    translate_on("x86_64", code)
}

pub fn compile_on(target: &str, code: &str) -> (TranslationUnit, ErrorCollector) {
    let (r, ec) = translate_on(target, code);
    ec.print_issues();
    assert_eq!(ec.get_error_count(), 0);
    (r.unwrap(), ec)
}

pub fn compile(code: &str) -> (TranslationUnit, ErrorCollector) {
    compile_on("x86_64", code)
}

pub fn assert_compile_error(target: &str, code: &str) {
    let (r, ec) = translate_on(target, code);
    assert!(r.is_err());
    assert!(ec.get_error_count() > 0);
}

/**
 * Parse `expr` as the initializer of a file-scope object and return it.
 */
pub fn parse_expression(expr: &str) -> Node<Expression> {
    let mut cfg = Config::default();
    cfg.flavor = Flavor::GnuC11;
    let code = format!("int __e = ({});", expr);
    let mut p = parse_preprocessed(&cfg, code).unwrap();
    let ed = p.unit.0.remove(0).node;
    let mut decl = match ed {
        ExternalDeclaration::Declaration(decl) => decl.node,
        _ => panic!("not a declaration"),
    };
    let init = decl.declarators.remove(0).node.initializer.unwrap().node;
    match init {
        Initializer::Expression(e) => *e,
        Initializer::List(_) => panic!("not an expression"),
    }
}
