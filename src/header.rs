use crate::machine::Machine;
use crate::utils;

pub const STDDEF_NAME: &str = "stddef.h";
pub const NULL_EXPANSION: &str = "((void*)0)";
pub const DEFAULT_NAMESPACE: &str = "STDDEF_CC";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetofStyle {
    /// `((size_t)&(((type*)0)->member))`
    NullPointer,
    /// `__builtin_offsetof(type, member)`
    Builtin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderOptions {
    pub namespace: String,
    pub offsetof_style: OffsetofStyle,
}

impl Default for HeaderOptions {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            offsetof_style: OffsetofStyle::NullPointer,
        }
    }
}

impl OffsetofStyle {
    pub fn expansion(&self) -> &'static str {
        match self {
            OffsetofStyle::NullPointer => "((size_t)&(((type*)0)->member))",
            OffsetofStyle::Builtin => "__builtin_offsetof(type, member)",
        }
    }
}

/**
 * Inclusion guard symbol for a header: `_<NAMESPACE>_<NAME>_H_`.
 *
 * An empty namespace gives the bare `_<NAME>_H_`.
 */
pub fn guard_symbol(namespace: &str, header: &str) -> String {
    let stem = header.strip_suffix(".h").unwrap_or(header);
    let namespace = utils::to_identifier(namespace);
    if namespace.is_empty() {
        format!("_{}_H_", utils::to_identifier(stem))
    } else {
        format!("_{}_{}_H_", namespace, utils::to_identifier(stem))
    }
}

/**
 * Render the `<stddef.h>` text for a target.
 *
 * The output is a pure function of the machine and the options.
 */
pub fn render_stddef(machine: &Machine, options: &HeaderOptions) -> String {
    let guard = guard_symbol(&options.namespace, STDDEF_NAME);
    let mut text = String::new();
    text.push_str(&format!("/* <{}> for target {} */\n", STDDEF_NAME, machine.name()));
    text.push_str(&format!("#ifndef {}\n", guard));
    text.push_str(&format!("#define {}\n\n", guard));
    text.push_str(&format!("#define NULL {}\n", NULL_EXPANSION));
    text.push_str(&format!(
        "#define offsetof(type, member) {}\n\n",
        options.offsetof_style.expansion()
    ));
    for (name, kind) in machine.primitives().typedefs() {
        text.push_str(&format!("typedef {} {};\n", kind, name));
    }
    text.push_str(&format!("\n#endif /* {} */\n", guard));
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_symbol() {
        assert_eq!(guard_symbol(DEFAULT_NAMESPACE, "stddef.h"), "_STDDEF_CC_STDDEF_H_");
        assert_eq!(guard_symbol("my-kernel", "stddef.h"), "_MY_KERNEL_STDDEF_H_");
        assert_eq!(guard_symbol("", "stddef.h"), "_STDDEF_H_");
    }

    #[test]
    fn test_render_x86_64() {
        let m = Machine::preset("x86_64").unwrap();
        let text = render_stddef(&m, &HeaderOptions::default());
        assert!(text.contains("#ifndef _STDDEF_CC_STDDEF_H_\n#define _STDDEF_CC_STDDEF_H_\n"));
        assert!(text.contains("#define NULL ((void*)0)\n"));
        assert!(text
            .contains("#define offsetof(type, member) ((size_t)&(((type*)0)->member))\n"));
        assert!(text.contains("typedef long ptrdiff_t;\n"));
        assert!(text.contains("typedef unsigned long size_t;\n"));
        assert!(text.contains("typedef int wchar_t;\n"));
        assert!(text.ends_with("#endif /* _STDDEF_CC_STDDEF_H_ */\n"));
    }

    #[test]
    fn test_render_ccpu_builtin() {
        let m = Machine::preset("ccpu").unwrap();
        let options = HeaderOptions {
            offsetof_style: OffsetofStyle::Builtin,
            ..HeaderOptions::default()
        };
        let text = render_stddef(&m, &options);
        assert!(text.contains("#define offsetof(type, member) __builtin_offsetof(type, member)\n"));
        assert!(text.contains("typedef int ptrdiff_t;\n"));
        assert!(text.contains("typedef unsigned int size_t;\n"));
    }

    #[test]
    fn test_render_deterministic() {
        let m = Machine::preset("win64").unwrap();
        let options = HeaderOptions::default();
        assert_eq!(render_stddef(&m, &options), render_stddef(&m.clone(), &options));
    }
}
