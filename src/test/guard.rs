use crate::header::{guard_symbol, HeaderOptions, DEFAULT_NAMESPACE, STDDEF_NAME};
use crate::machine::Machine;
use crate::session::Session;
use crate::ErrorCollector;

use super::util::*;

#[test]
fn test_double_include() {
    let mut s = session("x86_64");
    s.add_file("a.h", "#include <stddef.h>\ntypedef size_t a_size;\n");
    s.add_file(
        "main.c",
        "#include <stddef.h>\n#include \"a.h\"\n#include \"stddef.h\"\nsize_t n;\n",
    );
    let pp = s.preprocess("main.c").unwrap();
    assert_eq!(pp.stats.times_entered(STDDEF_NAME), 1);
    assert_eq!(pp.stats.times_suppressed(STDDEF_NAME), 2);
    assert_eq!(pp.text.matches("typedef unsigned long size_t;").count(), 1);

    let mut ec = ErrorCollector::new();
    let twice = s.compile("main.c", &mut ec).unwrap();
    assert_eq!(ec.get_error_count(), 0);
    assert_eq!(ec.get_warning_count(), 0);

    let (once, _) = compile("#include <stddef.h>\ntypedef size_t a_size;\nsize_t n;\n");
    assert_eq!(twice.bindings(), once.bindings());
}

#[test]
fn test_guard_collision() {
    let guard = guard_symbol(DEFAULT_NAMESPACE, STDDEF_NAME);
    let code = format!("#define {}\n#include <stddef.h>\nsize_t n;\n", guard);
    let (r, _) = translate(&code);
    assert!(r.is_err());

    let options = HeaderOptions {
        namespace: "my_kernel".to_string(),
        ..HeaderOptions::default()
    };
    let mut s = Session::with_options(Machine::preset("x86_64").unwrap(), options);
    let mut ec = ErrorCollector::new();
    assert!(s.compile_source(&code, &mut ec).is_ok());
}

#[test]
fn test_user_header_shadows_builtin() {
    let mut s = session("ccpu");
    s.add_file("stddef.h", "#pragma once\ntypedef long size_t;\n");
    let mut ec = ErrorCollector::new();
    let tu = s
        .compile_source("#include <stddef.h>\n#include <stddef.h>\n", &mut ec)
        .unwrap();
    assert_eq!(tu.bindings()["size_t"], "long");
    assert!(tu.lookup_typedef("ptrdiff_t").is_none());
}

#[test]
fn test_macro_redefinition_is_diagnosed() {
    let (r, _) = translate("#define NULL 0\n#include <stddef.h>\n");
    assert!(r.is_err());
    compile("#define NULL ((void*)0)\n#include <stddef.h>\n");
}

#[test]
fn test_deterministic() {
    for target in ["ccpu", "win64"] {
        let code = "#include <stddef.h>\nstruct s { char c; size_t n; };\ntypedef struct s s_t;\n";
        let (a, _) = compile_on(target, code);
        let (b, _) = compile_on(target, code);
        assert_eq!(a.bindings(), b.bindings());
        assert_eq!(session(target).header(), session(target).header());
    }
}
