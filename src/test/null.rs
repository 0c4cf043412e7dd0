use crate::error::CompileError;
use crate::value::{AddressBase, Value};

use super::util::*;

fn is_null(v: &Value) -> bool {
    matches!(v, Value::Address(a) if a.base == AddressBase::Null && a.offset == 0)
}

#[test]
fn test_null_converts_to_any_pointer() {
    let (tu, ec) = compile(
        "#include <stddef.h>
         struct s;
         int *a = NULL;
         char *b = NULL;
         struct s *c = NULL;
         void (*d)(void) = NULL;
         const void *e = NULL;",
    );
    assert_eq!(ec.get_warning_count(), 0);
    for name in ["a", "b", "c", "d", "e"] {
        let obj = tu.lookup_object(name).unwrap();
        assert!(is_null(&obj.initializer.as_ref().unwrap().val), "{}", name);
    }
}

#[test]
fn test_null_comparisons() {
    for target in ["ccpu", "i386", "x86_64"] {
        compile_on(
            target,
            "#include <stddef.h>
             int x;
             struct { int a, b; } y;
             _Static_assert(NULL == 0, \"null is zero\");
             _Static_assert((int *)NULL == NULL, \"typed null\");
             _Static_assert(&x != NULL, \"object\");
             _Static_assert(&y.b != NULL, \"member\");
             _Static_assert(!NULL, \"not\");
             _Static_assert(sizeof(NULL) == sizeof(void *), \"pointer sized\");",
        );
    }
}

#[test]
fn test_objects_have_distinct_addresses() {
    compile(
        "#include <stddef.h>
         int x, y;
         _Static_assert(&x != &y, \"distinct\");
         _Static_assert(&x == &x, \"same\");
         int *p = &x;",
    );
}

#[test]
fn test_non_null_integer_needs_cast() {
    assert_compile_error("x86_64", "int *p = 1;");
    assert_compile_error("x86_64", "int x; long *p = &x;");
    compile("int *p = (int *)16;");
}

#[test]
fn test_null_object_is_not_constant() {
    let (r, ec) = translate("#include <stddef.h>\nint *p = NULL;\nint q = p == NULL;\n");
    assert!(r.is_err());
    assert_eq!(ec.get_first_error().unwrap().0, CompileError::VariablesForbidden);
}
