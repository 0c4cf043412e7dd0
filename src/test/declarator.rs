use crate::error::CompileError;

use super::util::*;

fn assert_first_error(code: &str, expected: &CompileError) {
    let (r, ec) = translate(code);
    assert!(r.is_err());
    assert_eq!(&ec.get_first_error().unwrap().0, expected, "{}", code);
}

#[test]
fn test_good_declarators() {
    compile(
        "int (*fp[3])(int, char *);
         int f(int a[10], void g(void));
         typedef char row[16];
         row *rows;
         struct s { int n; char data[]; };
         _Static_assert(sizeof(fp) == 24, \"fp\");
         _Static_assert(sizeof(row[2]) == 32, \"rows\");
         _Static_assert(sizeof(struct s) == 4, \"flexible\");",
    );
}

#[test]
fn test_array_of_functions() {
    assert_first_error(
        "int f[2](void);",
        &CompileError::BadDeclarator("array of functions".to_string()),
    );
}

#[test]
fn test_function_returning_array() {
    let expected =
        CompileError::BadDeclarator("function returning a function or an array".to_string());
    assert_first_error("int g(void)[2];", &expected);
    assert_first_error("int h(void)(void);", &expected);
}

#[test]
fn test_bad_parameters() {
    assert_first_error("int f(void, int);", &CompileError::VoidParameter);
    assert_first_error("int f(const void);", &CompileError::VoidParameter);
    assert_first_error("int f(static int x);", &CompileError::WrongStorageClass);
}

#[test]
fn test_bad_members() {
    let duplicate = CompileError::DuplicateMember("a".to_string());
    assert_first_error("struct s { int a; char a; };", &duplicate);
    assert_first_error("struct s { int a; union { char a; long b; }; };", &duplicate);
    assert_first_error(
        "struct s { int a : 3; };",
        &CompileError::Unimplemented("bit fields".to_string()),
    );
    assert_first_error(
        "struct s { int a; struct t b; };",
        &CompileError::IncompleteType("struct t".to_string()),
    );
    assert_compile_error("x86_64", "struct s { char data[]; };");
}
