use crate::build::{header, run, Scratch};

mod build;

#[macro_use]
extern crate lazy_static;

#[test]
fn test_header_default_target() {
    let text = header(&[]);
    assert!(text.starts_with("/* <stddef.h> for target x86_64 */\n"));
    assert!(text.contains("#ifndef _STDDEF_CC_STDDEF_H_\n"));
    assert!(text.contains("#define NULL ((void*)0)\n"));
    assert!(text.contains("typedef unsigned long size_t;\n"));
    assert!(text.contains("typedef long ptrdiff_t;\n"));
}

#[test]
fn test_header_options() {
    let text = header(&["--target", "ccpu"]);
    assert!(text.contains("typedef unsigned int size_t;\n"));
    let text = header(&["--target", "win64"]);
    assert!(text.contains("typedef unsigned long long size_t;\n"));
    assert!(text.contains("typedef unsigned short wchar_t;\n"));

    let output = run(&["header", "--builtin-offsetof", "--namespace", "libk"]);
    assert!(output.success);
    assert!(output.stdout.contains("#define _LIBK_STDDEF_H_\n"));
    assert!(output
        .stdout
        .contains("#define offsetof(type, member) __builtin_offsetof(type, member)\n"));
}

#[test]
fn test_header_is_deterministic() {
    assert_eq!(header(&["--target", "i386"]), header(&["--target", "i386"]));
}

#[test]
fn test_predefines() {
    let output = run(&["--target", "ccpu", "predefines"]);
    assert!(output.success);
    assert!(output.stdout.contains("#define __SIZE_TYPE__ unsigned int\n"));
    assert!(output.stdout.contains("#define __SIZEOF_POINTER__ 2\n"));
    assert!(output.stdout.contains("#define __SIZE_MAX__ 0xffffU\n"));
}

#[test]
fn test_targets() {
    let output = run(&["targets"]);
    assert!(output.success);
    for target in ["ccpu", "i386", "x86_64", "win64", "x32"] {
        assert!(output.stdout.contains(&format!("{}: pointer", target)));
    }
    assert!(output
        .stdout
        .contains("win64: pointer 8 bytes, size_t = unsigned long long"));
}

#[test]
fn test_unknown_target() {
    let output = run(&["--target", "pdp11", "header"]);
    assert!(!output.success);
    assert!(output.stdout.starts_with("error: "));
}

#[test]
fn test_machine_file() {
    let scratch = Scratch::new();
    let file = scratch.write(
        "wide.json",
        r#"{ "base": "i386", "name": "wide", "wchar_type": "unsigned int" }"#,
    );
    let text = header(&["--machine", file.as_str()]);
    assert!(text.starts_with("/* <stddef.h> for target wide */\n"));
    assert!(text.contains("typedef unsigned int wchar_t;\n"));
    assert!(text.contains("typedef unsigned int size_t;\n"));

    scratch.write("wide.json", r#"{ "base": "i386", "ptr_size": 3 }"#);
    let output = run(&["--machine", file.as_str(), "predefines"]);
    assert!(!output.success);
}

#[test]
fn test_machine_file_too_wide() {
    let scratch = Scratch::new();
    let file = scratch.write("wide.json", r#"{ "base": "x86_64", "llong_size": 16 }"#);
    let output = run(&["--machine", file.as_str(), "predefines"]);
    assert!(!output.success);
    assert!(output.stdout.starts_with("error: "), "{}", output.stdout);
    assert!(output.stdout.contains("at most 8 bytes"), "{}", output.stdout);
}
