use crate::build::{check, check_fails, check_with};

mod build;

#[macro_use]
extern crate lazy_static;

const TARGETS: [&str; 5] = ["ccpu", "i386", "x86_64", "win64", "x32"];

#[test]
fn test_primitive_types() {
    for target in TARGETS {
        check(
            target,
            "
              #include <stddef.h>

              _Static_assert(sizeof(size_t) == sizeof(void *), \"size_t\");
              _Static_assert(sizeof(ptrdiff_t) == sizeof(void *), \"ptrdiff_t\");
              _Static_assert((size_t)-1 == __SIZE_MAX__, \"size max\");
              _Static_assert((ptrdiff_t)-1 < 0, \"signed\");
              _Static_assert(_Generic(sizeof(int), size_t: 1, default: 0), \"sizeof\");
              _Static_assert(_Generic(L'x', wchar_t: 1, default: 0), \"wide\");
              _Static_assert(sizeof(wchar_t) == __SIZEOF_WCHAR_T__, \"wchar size\");
            ",
        );
    }
}

#[test]
fn test_offsetof() {
    for target in TARGETS {
        check(
            target,
            "
              #include <stddef.h>

              struct point { char tag; int x; int y; };
              struct line { struct point a, b; char name[3]; };

              _Static_assert(offsetof(struct point, tag) == 0, \"first\");
              _Static_assert(offsetof(struct point, y) == offsetof(struct point, x) + sizeof(int), \"y\");
              _Static_assert(offsetof(struct line, b) == sizeof(struct point), \"b\");
              _Static_assert(offsetof(struct line, b.y) == sizeof(struct point) + offsetof(struct point, y), \"b.y\");
              _Static_assert(offsetof(struct line, name) == 2 * sizeof(struct point), \"name\");
              _Static_assert(_Generic(offsetof(struct line, name), size_t: 1, default: 0), \"type\");
              _Static_assert(__builtin_offsetof(struct line, name[2]) == offsetof(struct line, name) + 2, \"index\");
            ",
        );
    }
}

#[test]
fn test_null() {
    check(
        "i386",
        "
          #include <stddef.h>

          int x;
          int *p = NULL;
          void (*f)(void) = NULL;
          _Static_assert(NULL == 0, \"zero\");
          _Static_assert(&x != NULL, \"object\");
          _Static_assert(sizeof(NULL) == 4, \"size\");
        ",
    );
    check_fails("i386", "int *p = 4;\n");
}

#[test]
fn test_user_header_includes_stddef() {
    check(
        "ccpu",
        "
          #include <stddef.h>
          #include \"defs.h\"
          #include <defs.h>

          count_t n = sizeof(ptrdiff_t);
          _Static_assert(_Generic(n, size_t: 1, default: 0), \"count_t\");
        ",
    );
}

#[test]
fn test_include_stats() {
    let output = check_with(
        "x86_64",
        &["--stats"],
        "#include <stddef.h>\n#include \"defs.h\"\n#include <stddef.h>\n",
    );
    assert!(output.success, "{}", output.stdout);
    assert!(output.stdout.contains("stddef.h: entered 1, suppressed 2\n"));
}

#[test]
fn test_defines() {
    let output = check_with(
        "x86_64",
        &["-D", "SIZE=16", "-D", "CHECKED"],
        "
          #include <stddef.h>
          #ifndef CHECKED
          #error CHECKED is not defined
          #endif
          char buf[SIZE];
          _Static_assert(sizeof(buf) == 16, \"size\");
        ",
    );
    assert!(output.success, "{}", output.stdout);
}

#[test]
fn test_static_assertion_reported() {
    let stdout = check_fails(
        "x86_64",
        "#include <stddef.h>\n\n_Static_assert(sizeof(size_t) == 4, \"narrow\");\n",
    );
    assert!(stdout.contains(":3:"), "{}", stdout);
    assert!(stdout.contains("error: static assertion failed"), "{}", stdout);
}

#[test]
fn test_preprocess_error_reported() {
    let stdout = check_fails("x86_64", "int x;\n#include <nonexistent.h>\n");
    assert!(stdout.contains(":2: error: file not found"), "{}", stdout);
}

#[test]
fn test_guard_namespace() {
    let code = "
      #define _STDDEF_CC_STDDEF_H_
      #include <stddef.h>
      size_t n;
    ";
    check_fails("x86_64", code);
    let output = check_with("x86_64", &["--namespace", "kernel"], code);
    assert!(output.success, "{}", output.stdout);
}

#[test]
fn test_builtin_offsetof_style() {
    let output = check_with(
        "ccpu",
        &["--builtin-offsetof", "-v"],
        "
          #include <stddef.h>
          struct s { char c; long l; };
          size_t o = offsetof(struct s, l);
        ",
    );
    assert!(output.success, "{}", output.stdout);
    assert!(output.stdout.contains("__builtin_offsetof(struct s, l)"));
    assert!(output.stdout.contains("typedef unsigned int size_t"));
}
