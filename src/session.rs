use std::path::Path;

use lang_c::driver::{parse_preprocessed, Config, Flavor};
use lang_c::span::Span;

use crate::error::{CompileError, ErrorCollector};
use crate::header::{render_stddef, HeaderOptions, STDDEF_NAME};
use crate::machine::Machine;
use crate::preprocess::{IncludeSet, PreprocessError, Preprocessed, Preprocessor};
use crate::translation_unit::TranslationUnit;

/// Name under which `compile_source` registers its text.
pub const SOURCE_NAME: &str = "<source>";

/**
 * Everything translation units of one target share: the machine, the
 * rendered `<stddef.h>`, user files and command line macros.
 */
pub struct Session {
    machine: Machine,
    options: HeaderOptions,
    includes: IncludeSet,
    defines: Vec<String>,
}

impl Session {
    pub fn new(machine: Machine) -> Self {
        Self::with_options(machine, HeaderOptions::default())
    }

    pub fn with_options(machine: Machine, options: HeaderOptions) -> Self {
        let mut includes = IncludeSet::new();
        includes.add_builtin(STDDEF_NAME, &render_stddef(&machine, &options));
        Self {
            machine,
            options,
            includes,
            defines: Vec::new(),
        }
    }

    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    /**
     * The `<stddef.h>` text every unit of this session includes.
     */
    pub fn header(&self) -> String {
        render_stddef(&self.machine, &self.options)
    }

    /**
     * Register an in-memory file. It shadows files on disk and built-in headers of the same name.
     */
    pub fn add_file(&mut self, name: &str, text: &str) {
        self.includes.add_file(name, text);
    }

    pub fn add_search_dir(&mut self, dir: &Path) {
        self.includes.add_search_dir(dir);
    }

    /**
     * Add a `-D` style definition, applied before every unit.
     */
    pub fn define(&mut self, definition: &str) {
        self.defines.push(definition.to_string());
    }

    pub fn preprocess(&self, name: &str) -> Result<Preprocessed, PreprocessError> {
        let mut pp = Preprocessor::new(&self.includes, &self.machine)?;
        for d in self.defines.iter() {
            pp.define(d)?;
        }
        pp.run(name)
    }

    /**
     * Parse preprocessed text and translate it.
     *
     * Spans in `ec` are offsets into `text`.
     */
    pub fn translate(&self, text: &str, ec: &mut ErrorCollector) -> Result<TranslationUnit, ()> {
        let mut cfg = Config::default();
        cfg.flavor = Flavor::GnuC11;
        match parse_preprocessed(&cfg, text.to_string()) {
            Ok(p) => TranslationUnit::translate(&p.unit, &self.machine, ec),
            Err(e) => {
                let span = Span {
                    start: e.offset,
                    end: e.offset,
                };
                ec.record_error(CompileError::Syntax(format!("{}", e)), span)?;
                unreachable!()
            }
        }
    }

    pub fn compile(&self, name: &str, ec: &mut ErrorCollector) -> Result<TranslationUnit, ()> {
        let pp = match self.preprocess(name) {
            Ok(pp) => pp,
            Err(e) => {
                ec.record_error(CompileError::Preprocess(e), Span::none())?;
                unreachable!()
            }
        };
        self.translate(&pp.text, ec)
    }

    /**
     * Compile a single unit given as text.
     */
    pub fn compile_source(
        &mut self,
        text: &str,
        ec: &mut ErrorCollector,
    ) -> Result<TranslationUnit, ()> {
        self.add_file(SOURCE_NAME, text);
        self.compile(SOURCE_NAME, ec)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::header::OffsetofStyle;

    #[test]
    fn test_compile_with_header() {
        let mut session = Session::new(Machine::preset("x86_64").unwrap());
        let mut ec = ErrorCollector::new();
        let tu = session
            .compile_source("#include <stddef.h>\nsize_t n = sizeof(ptrdiff_t);\n", &mut ec)
            .unwrap();
        assert_eq!(ec.get_error_count(), 0);
        assert_eq!(tu.bindings()["size_t"], "unsigned long");
        assert_eq!(tu.bindings()["wchar_t"], "int");
    }

    #[test]
    fn test_preprocess_error() {
        let mut session = Session::new(Machine::default());
        let mut ec = ErrorCollector::new();
        assert!(session.compile_source("#include <missing.h>\n", &mut ec).is_err());
        match ec.get_first_error() {
            Some((CompileError::Preprocess(e), _)) => assert_eq!(e.line, 1),
            e => panic!("unexpected {:?}", e),
        }
    }

    #[test]
    fn test_syntax_error() {
        let mut session = Session::new(Machine::default());
        let mut ec = ErrorCollector::new();
        assert!(session.compile_source("int x = ;\n", &mut ec).is_err());
        assert!(matches!(
            ec.get_first_error(),
            Some((CompileError::Syntax(_), _))
        ));
    }

    #[test]
    fn test_defines() {
        let mut session = Session::new(Machine::preset("ccpu").unwrap());
        session.define("N=3");
        let mut ec = ErrorCollector::new();
        let tu = session.compile_source("int a[N];\n", &mut ec).unwrap();
        assert_eq!(format!("{}", tu.lookup_object("a").unwrap().t), "int [3]");
    }

    #[test]
    fn test_header_follows_options() {
        let options = HeaderOptions {
            offsetof_style: OffsetofStyle::Builtin,
            ..HeaderOptions::default()
        };
        let mut session = Session::with_options(Machine::preset("ccpu").unwrap(), options);
        assert!(session.header().contains("__builtin_offsetof(type, member)"));
        session.add_file("t.c", "#include <stddef.h>\noffsetof(struct s, m)\n");
        let pp = session.preprocess("t.c").unwrap();
        assert!(pp.text.contains("__builtin_offsetof(struct s, m)"));
    }
}
