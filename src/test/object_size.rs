use crate::error::CompileError;

use super::util::*;

fn assert_first_error(target: &str, code: &str, expected: CompileError) {
    let (r, ec) = translate_on(target, code);
    assert!(r.is_err());
    assert_eq!(ec.get_first_error().unwrap().0, expected);
}

fn assert_too_large(target: &str, code: &str) {
    let (r, ec) = translate_on(target, code);
    assert!(r.is_err());
    assert!(
        matches!(ec.get_first_error(), Some((CompileError::ObjectTooLarge(_), _))),
        "{}",
        code
    );
}

#[test]
fn test_large_array() {
    compile(
        "long big[1000000000];
         char bytes[5000000000];
         _Static_assert(sizeof(big) == 8000000000, \"long\");
         _Static_assert(sizeof(bytes) == 5000000000, \"char\");
         _Static_assert(sizeof(long[1000000000][2]) == 16000000000, \"nested\");",
    );
}

#[test]
fn test_large_struct() {
    compile(
        "#include <stddef.h>
         struct s { char a[3000000000]; char b[3000000000]; long c; };
         _Static_assert(offsetof(struct s, b) == 3000000000, \"b\");
         _Static_assert(offsetof(struct s, c) == 6000000000, \"c\");
         _Static_assert(sizeof(struct s) == 6000000008, \"size\");
         struct s object;",
    );
}

#[test]
fn test_array_too_large() {
    assert_too_large("x86_64", "long a[0x7fffffffffffffff / 2];");
    assert_too_large("x86_64", "char a[0x8000000000000000];");
    assert_too_large("x86_64", "int n = sizeof(char[0x100000000][0x100000000]);");
}

#[test]
fn test_struct_too_large() {
    let code = "struct h { char a[0x7fffffffffffffff]; char b; };
                int n = sizeof(struct h);";
    assert_too_large("x86_64", code);
    let code = "struct h { char a[0x7fffffffffffffff]; long b; };
                struct h object;";
    assert_too_large("x86_64", code);
}

#[test]
fn test_i386_limit() {
    compile_on(
        "i386",
        "char a[0x7fffffff];
         _Static_assert(sizeof(a) == 0x7fffffff, \"max\");",
    );
    assert_too_large("i386", "char b[0x80000000];");
    assert_too_large("i386", "int b[0x20000000];");
}

#[test]
fn test_ccpu_limit() {
    compile_on(
        "ccpu",
        "char ok[0x7fff];
         _Static_assert(sizeof(ok) == 0x7fff, \"max\");",
    );
    assert_first_error(
        "ccpu",
        "char big[70000];",
        CompileError::ObjectTooLarge("char [70000]".to_string()),
    );
    assert_too_large(
        "ccpu",
        "struct s { char a[0x4000]; char b[0x4000]; };\nstruct s object;",
    );
}

#[test]
fn test_bad_array_size() {
    assert_first_error("x86_64", "char a[0];", CompileError::BadArraySize);
    assert_first_error("x86_64", "char a[-1];", CompileError::BadArraySize);
}
