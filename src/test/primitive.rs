use crate::machine::{Machine, PRESET_NAMES};

use super::util::*;

#[test]
fn test_size_t_matches_pointer_width() {
    for target in PRESET_NAMES {
        let (tu, _) = compile_on(
            target,
            "#include <stddef.h>
             _Static_assert(sizeof(size_t) == sizeof(void *), \"size_t\");
             _Static_assert(sizeof(ptrdiff_t) == sizeof(size_t), \"ptrdiff_t\");
             _Static_assert(sizeof(size_t) == __SIZEOF_POINTER__, \"predefined\");
             _Static_assert((size_t)-1 > 0, \"size_t is unsigned\");
             _Static_assert((ptrdiff_t)-1 < 0, \"ptrdiff_t is signed\");",
        );
        let machine = Machine::preset(target).unwrap();
        let p = machine.primitives();
        assert_eq!(tu.bindings()["size_t"], format!("{}", p.size));
        assert_eq!(tu.bindings()["ptrdiff_t"], format!("{}", p.ptrdiff));
        assert_eq!(tu.bindings()["wchar_t"], format!("{}", p.wchar));
    }
}

#[test]
fn test_ptrdiff_range() {
    for target in PRESET_NAMES {
        compile_on(
            target,
            "#include <stddef.h>
             _Static_assert(__PTRDIFF_MAX__ == __SIZE_MAX__ >> 1, \"max\");
             _Static_assert((ptrdiff_t)(__SIZE_MAX__ / 2 - 1) == __SIZE_MAX__ / 2 - 1, \"+(N-1)\");
             _Static_assert(-(ptrdiff_t)(__SIZE_MAX__ / 2 - 1) < 0, \"-(N-1)\");
             _Static_assert((size_t)(ptrdiff_t)-1 == __SIZE_MAX__, \"same width\");",
        );
    }
}

#[test]
fn test_pointer_difference_type() {
    compile_on(
        "ccpu",
        "#include <stddef.h>
         char buf[100];
         _Static_assert(sizeof(&buf[90] - &buf[10]) == sizeof(ptrdiff_t), \"type\");
         _Static_assert(_Generic(&buf[90] - &buf[10], ptrdiff_t: 1, default: 0), \"generic\");
         _Static_assert(_Generic(sizeof(buf), size_t: 1, default: 0), \"sizeof\");",
    );
}

#[test]
fn test_pointer_width_not_register_width() {
    let (tu, _) = compile_on("x32", "#include <stddef.h>\n");
    assert_eq!(tu.bindings()["size_t"], "unsigned int");
    let (tu, _) = compile_on("win64", "#include <stddef.h>\n");
    assert_eq!(tu.bindings()["size_t"], "unsigned long long");
    assert_eq!(tu.bindings()["ptrdiff_t"], "long long");
}

#[test]
fn test_wchar_literal_type() {
    compile_on(
        "win64",
        "#include <stddef.h>
         _Static_assert(_Generic(L'a', wchar_t: 1, default: 0), \"wide char\");
         _Static_assert(L'a' == 97, \"value\");",
    );
}
