use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt::Formatter;
use std::path::{Path, PathBuf};

use crate::ctype::IntKind;
use crate::machine::{DataModel, Machine};
use crate::utils;
use crate::value::TypedValue;

/// Unguarded recursive inclusion stops here.
pub const MAX_INCLUDE_DEPTH: usize = 200;

const PUNCTUATORS: [&str; 23] = [
    "...", "<<=", ">>=", "->", "++", "--", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "*=",
    "/=", "%=", "+=", "-=", "&=", "^=", "|=", "##",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreprocessErrorKind {
    FileNotFound(String),
    Io(String, String),
    IncludeDepth,
    BadInclude,
    UnknownDirective(String),
    BadDirective(String),
    UnbalancedConditional(String),
    UnterminatedConditional,
    UnterminatedComment,
    UnterminatedLiteral,
    MacroRedefinition(String),
    MacroArgumentCount(String),
    UnterminatedArguments(String),
    BadPaste(String),
    BadExpression(String),
    DivisionByZero,
    UserError(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocessError {
    pub file: String,
    pub line: usize,
    pub kind: PreprocessErrorKind,
}

/**
 * How often each file was entered and how often an `#include` of it was
 * skipped because of its guard macro or `#pragma once`.
 */
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncludeStats {
    entered: BTreeMap<String, usize>,
    suppressed: BTreeMap<String, usize>,
}

#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub text: String,
    pub stats: IncludeStats,
    pub warnings: Vec<String>,
}

/**
 * Files visible to `#include`.
 *
 * In-memory files come first, then search directories on disk, then built-in
 * headers. A user file named like a built-in header shadows it.
 */
#[derive(Debug, Clone, Default)]
pub struct IncludeSet {
    files: BTreeMap<String, String>,
    builtins: BTreeMap<String, String>,
    search_dirs: Vec<PathBuf>,
}

struct SourceFile {
    id: String,
    dir: Option<PathBuf>,
    text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Ident,
    Number,
    Str,
    Char,
    Punct,
    Newline,
    Placemarker,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    kind: TokenKind,
    text: String,
    space_before: bool,
    /// Macros whose expansion produced this token, they are not expanded again.
    hideset: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Macro {
    params: Option<Vec<String>>,
    variadic: bool,
    body: Vec<Token>,
}

struct LogicalLine {
    line: usize,
    text: String,
}

struct Conditional {
    line: usize,
    parent_active: bool,
    active: bool,
    taken: bool,
    seen_else: bool,
}

pub struct Preprocessor<'a> {
    includes: &'a IncludeSet,
    model: DataModel,
    macros: HashMap<String, Macro>,
    once: HashSet<String>,
    guards: HashMap<String, String>,
    stats: IncludeStats,
    warnings: Vec<String>,
    output: String,
    file: String,
    line: usize,
    depth: usize,
}

#[derive(Debug, Clone, Copy)]
struct PpValue {
    value: i128,
    unsigned: bool,
}

struct ExprParser<'t> {
    toks: &'t [Token],
    pos: usize,
    model: &'t DataModel,
}

fn define(defs: &mut Vec<(String, String)>, name: &str, value: impl ToString) {
    defs.push((name.to_string(), value.to_string()));
}

fn literal_suffix(kind: IntKind, model: &DataModel) -> &'static str {
    match kind {
        IntKind::Long => "L",
        IntKind::ULong => "UL",
        IntKind::LLong => "LL",
        IntKind::ULLong => "ULL",
        IntKind::UInt => "U",
        _ if kind.is_signed(model) || kind.size(model) < model.int_size => "",
        _ => "U",
    }
}

fn max_literal(kind: IntKind, model: &DataModel) -> String {
    format!("0x{:x}{}", kind.max_value(model), literal_suffix(kind, model))
}

fn min_literal(kind: IntKind, model: &DataModel) -> String {
    if kind.is_signed(model) {
        format!("(-{} - 1)", max_literal(kind, model))
    } else {
        "0".to_string()
    }
}

/**
 * Macros every translation unit starts with, GCC-compatible names.
 *
 * All values follow from the machine description.
 */
pub fn predefines(machine: &Machine) -> Vec<(String, String)> {
    let model = machine.model();
    let p = machine.primitives();
    let bits = |size: u8| size as u32 * 8;
    let mut defs = Vec::new();

    define(&mut defs, "__STDC__", 1);
    define(&mut defs, "__STDC_VERSION__", "201112L");
    define(&mut defs, "__STDC_HOSTED__", 0);
    if !model.char_signed {
        define(&mut defs, "__CHAR_UNSIGNED__", 1);
    }
    define(&mut defs, "__CHAR_BIT__", 8);
    define(&mut defs, "__USER_LABEL_PREFIX__", "");

    define(&mut defs, "__SIZE_TYPE__", p.size);
    define(&mut defs, "__PTRDIFF_TYPE__", p.ptrdiff);
    define(&mut defs, "__WCHAR_TYPE__", p.wchar);
    define(&mut defs, "__INTPTR_TYPE__", p.ptrdiff);
    define(&mut defs, "__UINTPTR_TYPE__", p.size);
    define(&mut defs, "__INTMAX_TYPE__", IntKind::LLong);
    define(&mut defs, "__UINTMAX_TYPE__", IntKind::ULLong);

    define(&mut defs, "__SCHAR_MAX__", max_literal(IntKind::SChar, model));
    define(&mut defs, "__SHRT_MAX__", max_literal(IntKind::Short, model));
    define(&mut defs, "__INT_MAX__", max_literal(IntKind::Int, model));
    define(&mut defs, "__LONG_MAX__", max_literal(IntKind::Long, model));
    define(&mut defs, "__LONG_LONG_MAX__", max_literal(IntKind::LLong, model));
    define(&mut defs, "__WCHAR_MAX__", max_literal(p.wchar, model));
    define(&mut defs, "__WCHAR_MIN__", min_literal(p.wchar, model));
    define(&mut defs, "__SIZE_MAX__", max_literal(p.size, model));
    define(&mut defs, "__PTRDIFF_MAX__", max_literal(p.ptrdiff, model));
    define(&mut defs, "__INTPTR_MAX__", max_literal(p.ptrdiff, model));
    define(&mut defs, "__UINTPTR_MAX__", max_literal(p.size, model));
    define(&mut defs, "__INTMAX_MAX__", max_literal(IntKind::LLong, model));
    define(&mut defs, "__UINTMAX_MAX__", max_literal(IntKind::ULLong, model));

    define(&mut defs, "__SCHAR_WIDTH__", 8);
    define(&mut defs, "__SHRT_WIDTH__", bits(model.short_size));
    define(&mut defs, "__INT_WIDTH__", bits(model.int_size));
    define(&mut defs, "__LONG_WIDTH__", bits(model.long_size));
    define(&mut defs, "__LONG_LONG_WIDTH__", bits(model.llong_size));
    define(&mut defs, "__PTRDIFF_WIDTH__", bits(p.ptrdiff.size(model)));
    define(&mut defs, "__SIZE_WIDTH__", bits(p.size.size(model)));
    define(&mut defs, "__WCHAR_WIDTH__", bits(p.wchar.size(model)));
    define(&mut defs, "__INTPTR_WIDTH__", bits(model.ptr_size));
    define(&mut defs, "__INTMAX_WIDTH__", bits(model.llong_size));

    define(&mut defs, "__SIZEOF_SHORT__", model.short_size);
    define(&mut defs, "__SIZEOF_INT__", model.int_size);
    define(&mut defs, "__SIZEOF_LONG__", model.long_size);
    define(&mut defs, "__SIZEOF_LONG_LONG__", model.llong_size);
    define(&mut defs, "__SIZEOF_POINTER__", model.ptr_size);
    define(&mut defs, "__SIZEOF_SIZE_T__", p.size.size(model));
    define(&mut defs, "__SIZEOF_PTRDIFF_T__", p.ptrdiff.size(model));
    define(&mut defs, "__SIZEOF_WCHAR_T__", p.wchar.size(model));
    define(&mut defs, "__BIGGEST_ALIGNMENT__", model.max_align);

    define(&mut defs, "__ORDER_LITTLE_ENDIAN__", 1234);
    define(&mut defs, "__ORDER_BIG_ENDIAN__", 4321);
    define(&mut defs, "__ORDER_PDP_ENDIAN__", 3412);
    let order = if model.big_endian {
        "__ORDER_BIG_ENDIAN__"
    } else {
        "__ORDER_LITTLE_ENDIAN__"
    };
    define(&mut defs, "__BYTE_ORDER__", order);

    if model.long_size == 8 && model.ptr_size == 8 {
        define(&mut defs, "_LP64", 1);
        define(&mut defs, "__LP64__", 1);
    }
    if model.int_size == 4 && model.long_size == 4 && model.ptr_size == 4 {
        define(&mut defs, "_ILP32", 1);
        define(&mut defs, "__ILP32__", 1);
    }
    defs
}

impl PreprocessError {
    pub fn new(file: &str, line: usize, kind: PreprocessErrorKind) -> Self {
        Self {
            file: file.to_string(),
            line,
            kind,
        }
    }
}

impl IncludeStats {
    pub fn times_entered(&self, file: &str) -> usize {
        self.entered.get(file).copied().unwrap_or(0)
    }

    pub fn times_suppressed(&self, file: &str) -> usize {
        self.suppressed.get(file).copied().unwrap_or(0)
    }

    pub fn files(&self) -> impl Iterator<Item = &String> {
        self.entered.keys()
    }
}

impl IncludeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, name: &str, text: &str) {
        self.files.insert(name.to_string(), text.to_string());
    }

    pub fn add_builtin(&mut self, name: &str, text: &str) {
        self.builtins.insert(name.to_string(), text.to_string());
    }

    pub fn add_search_dir(&mut self, dir: &Path) {
        self.search_dirs.push(dir.to_path_buf());
    }

    fn open(&self, name: &str) -> Result<SourceFile, PreprocessErrorKind> {
        if let Some(text) = self.files.get(name) {
            return Ok(SourceFile::memory(name, text));
        }
        let path = Path::new(name);
        if path.is_file() {
            SourceFile::read(path)
        } else {
            Err(PreprocessErrorKind::FileNotFound(name.to_string()))
        }
    }

    fn resolve(
        &self,
        name: &str,
        angled: bool,
        from: &SourceFile,
    ) -> Result<Option<SourceFile>, PreprocessErrorKind> {
        if !angled {
            match &from.dir {
                Some(dir) => {
                    let path = dir.join(name);
                    if path.is_file() {
                        return SourceFile::read(&path).map(Some);
                    }
                }
                None => {
                    if let Some(parent) = Path::new(&from.id).parent() {
                        let candidate = parent.join(name).to_string_lossy().to_string();
                        if let Some(text) = self.files.get(&candidate) {
                            return Ok(Some(SourceFile::memory(&candidate, text)));
                        }
                    }
                }
            }
        }
        if let Some(text) = self.files.get(name) {
            return Ok(Some(SourceFile::memory(name, text)));
        }
        for dir in self.search_dirs.iter() {
            let path = dir.join(name);
            if path.is_file() {
                return SourceFile::read(&path).map(Some);
            }
        }
        Ok(self
            .builtins
            .get(name)
            .map(|text| SourceFile::memory(name, text)))
    }
}

impl SourceFile {
    fn memory(name: &str, text: &str) -> Self {
        Self {
            id: name.to_string(),
            dir: None,
            text: text.to_string(),
        }
    }

    fn read(path: &Path) -> Result<Self, PreprocessErrorKind> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| PreprocessErrorKind::Io(path.display().to_string(), e.to_string()))?;
        Ok(Self {
            id: path.display().to_string(),
            dir: path.parent().map(Path::to_path_buf),
            text,
        })
    }
}

impl Token {
    fn new(kind: TokenKind, text: &str) -> Self {
        Self {
            kind,
            text: text.to_string(),
            space_before: false,
            hideset: BTreeSet::new(),
        }
    }

    fn newline() -> Self {
        Self::new(TokenKind::Newline, "\n")
    }

    fn is_punct(&self, p: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == p
    }
}

impl<'a> Preprocessor<'a> {
    /**
     * A preprocessor for one translation unit, with the target's predefined macros.
     */
    pub fn new(includes: &'a IncludeSet, machine: &Machine) -> Result<Self, PreprocessError> {
        let mut pp = Self {
            includes,
            model: *machine.model(),
            macros: HashMap::new(),
            once: HashSet::new(),
            guards: HashMap::new(),
            stats: IncludeStats::default(),
            warnings: Vec::new(),
            output: String::new(),
            file: "<built-in>".to_string(),
            line: 0,
            depth: 0,
        };
        for (name, value) in predefines(machine) {
            pp.define_macro(&name, &value)?;
        }
        pp.file = "<command line>".to_string();
        Ok(pp)
    }

    /**
     * Define a macro the way `-D` does: `NAME`, `NAME=VALUE` or `NAME(args)=VALUE`.
     */
    pub fn define(&mut self, definition: &str) -> Result<(), PreprocessError> {
        match definition.split_once('=') {
            Some((name, value)) => self.define_macro(name, value),
            None => self.define_macro(definition, "1"),
        }
    }

    pub fn define_macro(&mut self, name: &str, value: &str) -> Result<(), PreprocessError> {
        let toks = tokenize(&format!("{} {}", name, value)).map_err(|k| self.error(k))?;
        let (name, m) = parse_define(toks).map_err(|k| self.error(k))?;
        self.add_macro(name, m).map_err(|k| self.error(k))
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    pub fn run(mut self, name: &str) -> Result<Preprocessed, PreprocessError> {
        let file = self
            .includes
            .open(name)
            .map_err(|kind| PreprocessError::new(name, 0, kind))?;
        self.process_file(file)?;
        Ok(Preprocessed {
            text: self.output,
            stats: self.stats,
            warnings: self.warnings,
        })
    }

    fn error(&self, kind: PreprocessErrorKind) -> PreprocessError {
        PreprocessError::new(&self.file, self.line, kind)
    }

    fn add_macro(&mut self, name: String, m: Macro) -> Result<(), PreprocessErrorKind> {
        if let Some(old) = self.macros.get(&name) {
            if *old != m {
                return Err(PreprocessErrorKind::MacroRedefinition(name));
            }
        }
        self.macros.insert(name, m);
        Ok(())
    }

    fn process_file(&mut self, file: SourceFile) -> Result<(), PreprocessError> {
        let lines = split_logical_lines(&file.text)
            .map_err(|(line, kind)| PreprocessError::new(&file.id, line, kind))?;
        if let Some(guard) = detect_guard(&lines) {
            self.guards.insert(file.id.clone(), guard);
        }
        *self.stats.entered.entry(file.id.clone()).or_insert(0) += 1;
        self.file = file.id.clone();
        self.line = 1;
        self.output.push_str(&format!("# 1 \"{}\"\n", file.id));

        let mut conds: Vec<Conditional> = Vec::new();
        let mut text: Vec<Token> = Vec::new();
        let mut next_line = 1;
        for l in lines.iter() {
            self.line = l.line;
            // keep output lines in step with source lines
            while next_line < l.line {
                text.push(Token::newline());
                next_line += 1;
            }
            next_line = l.line + 1;
            let active = conds.last().map_or(true, |c| c.active);
            match split_directive(&l.text) {
                Some((name, rest)) => {
                    self.flush(&mut text)?;
                    if self.conditional_directive(name, rest, &mut conds)? || !active {
                        self.output.push('\n');
                    } else if name == "include" {
                        self.include(rest, &file)?;
                        self.output
                            .push_str(&format!("# {} \"{}\"\n", l.line + 1, file.id));
                    } else {
                        self.handle_directive(name, rest)?;
                        self.output.push('\n');
                    }
                }
                None => {
                    if active {
                        let toks = tokenize(&l.text).map_err(|k| self.error(k))?;
                        text.extend(toks);
                    }
                    text.push(Token::newline());
                }
            }
        }
        self.flush(&mut text)?;
        match conds.last() {
            Some(c) => Err(PreprocessError::new(
                &file.id,
                c.line,
                PreprocessErrorKind::UnterminatedConditional,
            )),
            None => Ok(()),
        }
    }

    fn flush(&mut self, text: &mut Vec<Token>) -> Result<(), PreprocessError> {
        if text.is_empty() {
            return Ok(());
        }
        let tokens = std::mem::take(text);
        let expanded = self.expand(tokens).map_err(|k| self.error(k))?;
        self.write_tokens(&expanded);
        Ok(())
    }

    fn write_tokens(&mut self, tokens: &[Token]) {
        let mut prev: Option<&Token> = None;
        for t in tokens {
            match t.kind {
                TokenKind::Newline => {
                    self.output.push('\n');
                    prev = None;
                }
                TokenKind::Placemarker => (),
                _ => {
                    if let Some(p) = prev {
                        if t.space_before || needs_separator(p, t) {
                            self.output.push(' ');
                        }
                    }
                    self.output.push_str(&t.text);
                    prev = Some(t);
                }
            }
        }
    }

    /**
     * Handle `#if`, `#ifdef`, `#ifndef`, `#elif`, `#else` and `#endif`.
     * Returns false for any other directive.
     */
    fn conditional_directive(
        &mut self,
        name: &str,
        rest: &str,
        conds: &mut Vec<Conditional>,
    ) -> Result<bool, PreprocessError> {
        let parent_active = conds.last().map_or(true, |c| c.active);
        match name {
            "if" | "ifdef" | "ifndef" => {
                let cond = if !parent_active {
                    false
                } else if name == "if" {
                    self.eval_condition(rest)?
                } else {
                    let defined = self.macros.contains_key(&self.macro_name(rest)?);
                    defined == (name == "ifdef")
                };
                conds.push(Conditional {
                    line: self.line,
                    parent_active,
                    active: cond,
                    taken: cond,
                    seen_else: false,
                });
            }
            "elif" => {
                let c = match conds.last_mut() {
                    Some(c) => c,
                    None => {
                        let kind = PreprocessErrorKind::UnbalancedConditional("#elif".to_string());
                        return Err(self.error(kind));
                    }
                };
                if c.seen_else {
                    let kind = PreprocessErrorKind::BadDirective("#elif after #else".to_string());
                    return Err(self.error(kind));
                }
                if c.parent_active && !c.taken {
                    let v = self.eval_condition(rest)?;
                    c.active = v;
                    c.taken = v;
                } else {
                    c.active = false;
                }
            }
            "else" => {
                let c = match conds.last_mut() {
                    Some(c) => c,
                    None => {
                        let kind = PreprocessErrorKind::UnbalancedConditional("#else".to_string());
                        return Err(self.error(kind));
                    }
                };
                if c.seen_else {
                    let kind = PreprocessErrorKind::BadDirective("#else after #else".to_string());
                    return Err(self.error(kind));
                }
                c.seen_else = true;
                c.active = c.parent_active && !c.taken;
                c.taken = true;
            }
            "endif" => {
                if conds.pop().is_none() {
                    let kind = PreprocessErrorKind::UnbalancedConditional("#endif".to_string());
                    return Err(self.error(kind));
                }
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn handle_directive(&mut self, name: &str, rest: &str) -> Result<(), PreprocessError> {
        match name {
            "define" => {
                let toks = tokenize(rest).map_err(|k| self.error(k))?;
                let (name, m) = parse_define(toks).map_err(|k| self.error(k))?;
                self.add_macro(name, m).map_err(|k| self.error(k))
            }
            "undef" => {
                let name = self.macro_name(rest)?;
                self.macros.remove(&name);
                Ok(())
            }
            "error" => Err(self.error(PreprocessErrorKind::UserError(rest.trim().to_string()))),
            "warning" => {
                self.warnings.push(format!(
                    "{}:{}: warning: {}",
                    self.file,
                    self.line,
                    rest.trim()
                ));
                Ok(())
            }
            "pragma" => {
                if rest.trim() == "once" {
                    self.once.insert(self.file.clone());
                }
                Ok(())
            }
            // null directive, #line and GNU line markers
            "" | "line" => Ok(()),
            _ if name.chars().all(|c| c.is_ascii_digit()) => Ok(()),
            _ => Err(self.error(PreprocessErrorKind::UnknownDirective(name.to_string()))),
        }
    }

    fn macro_name(&self, rest: &str) -> Result<String, PreprocessError> {
        let toks = tokenize(rest).map_err(|k| self.error(k))?;
        match toks.first() {
            Some(t) if t.kind == TokenKind::Ident => Ok(t.text.clone()),
            _ => Err(self.error(PreprocessErrorKind::BadDirective(
                "macro names must be identifiers".to_string(),
            ))),
        }
    }

    fn include(&mut self, rest: &str, from: &SourceFile) -> Result<(), PreprocessError> {
        let (name, angled) = self.include_target(rest)?;
        if self.depth >= MAX_INCLUDE_DEPTH {
            return Err(self.error(PreprocessErrorKind::IncludeDepth));
        }
        let file = match self.includes.resolve(&name, angled, from) {
            Ok(Some(file)) => file,
            Ok(None) => return Err(self.error(PreprocessErrorKind::FileNotFound(name))),
            Err(kind) => return Err(self.error(kind)),
        };
        let guarded = self.once.contains(&file.id)
            || self
                .guards
                .get(&file.id)
                .map_or(false, |g| self.macros.contains_key(g));
        if guarded {
            *self.stats.suppressed.entry(file.id).or_insert(0) += 1;
            return Ok(());
        }
        let (saved_file, saved_line) = (self.file.clone(), self.line);
        self.depth += 1;
        let r = self.process_file(file);
        self.depth -= 1;
        self.file = saved_file;
        self.line = saved_line;
        r
    }

    fn include_target(&self, rest: &str) -> Result<(String, bool), PreprocessError> {
        if let Some(target) = parse_header_name(rest) {
            return Ok(target);
        }
        // #include MACRO
        let toks = tokenize(rest).map_err(|k| self.error(k))?;
        let toks = self.expand(toks).map_err(|k| self.error(k))?;
        let text = spell(&toks);
        parse_header_name(&text).ok_or_else(|| self.error(PreprocessErrorKind::BadInclude))
    }

    fn eval_condition(&self, rest: &str) -> Result<bool, PreprocessError> {
        let toks = tokenize(rest).map_err(|k| self.error(k))?;
        let toks = self.resolve_defined(toks).map_err(|k| self.error(k))?;
        let toks = self.expand(toks).map_err(|k| self.error(k))?;
        // identifiers left after expansion are 0
        let toks: Vec<Token> = toks
            .into_iter()
            .filter(|t| t.kind != TokenKind::Newline && t.kind != TokenKind::Placemarker)
            .map(|t| {
                if t.kind == TokenKind::Ident {
                    Token::new(TokenKind::Number, "0")
                } else {
                    t
                }
            })
            .collect();
        if toks.is_empty() {
            let kind = PreprocessErrorKind::BadExpression("#if with no expression".to_string());
            return Err(self.error(kind));
        }
        let mut parser = ExprParser {
            toks: &toks,
            pos: 0,
            model: &self.model,
        };
        let v = parser.parse_conditional(false).map_err(|k| self.error(k))?;
        if let Some(t) = toks.get(parser.pos) {
            let kind = PreprocessErrorKind::BadExpression(format!("unexpected `{}'", t.text));
            return Err(self.error(kind));
        }
        Ok(v.value != 0)
    }

    fn resolve_defined(&self, toks: Vec<Token>) -> Result<Vec<Token>, PreprocessErrorKind> {
        let mut out = Vec::with_capacity(toks.len());
        let mut i = 0;
        while i < toks.len() {
            let t = &toks[i];
            if t.kind != TokenKind::Ident || t.text != "defined" {
                out.push(t.clone());
                i += 1;
                continue;
            }
            let mut j = i + 1;
            let paren = toks.get(j).map_or(false, |t| t.is_punct("("));
            if paren {
                j += 1;
            }
            let name = match toks.get(j) {
                Some(n) if n.kind == TokenKind::Ident => &n.text,
                _ => {
                    return Err(PreprocessErrorKind::BadExpression(
                        "operator \"defined\" requires an identifier".to_string(),
                    ))
                }
            };
            j += 1;
            if paren {
                if !toks.get(j).map_or(false, |t| t.is_punct(")")) {
                    return Err(PreprocessErrorKind::BadExpression(
                        "missing `)' after \"defined\"".to_string(),
                    ));
                }
                j += 1;
            }
            let value = if self.macros.contains_key(name) { "1" } else { "0" };
            let mut r = Token::new(TokenKind::Number, value);
            r.space_before = t.space_before;
            out.push(r);
            i = j;
        }
        Ok(out)
    }

    fn builtin_macro(&self, tok: &Token) -> Option<Token> {
        let mut r = match tok.text.as_str() {
            "__LINE__" => Token::new(TokenKind::Number, &self.line.to_string()),
            "__FILE__" => Token::new(TokenKind::Str, &format!("\"{}\"", self.file)),
            _ => return None,
        };
        r.space_before = tok.space_before;
        Some(r)
    }

    /**
     * Expand macros until no expandable identifier is left.
     *
     * Every token produced by a macro carries the macro's name in its hideset,
     * so a macro never expands inside its own expansion.
     */
    fn expand(&self, tokens: Vec<Token>) -> Result<Vec<Token>, PreprocessErrorKind> {
        let mut input: VecDeque<Token> = tokens.into();
        let mut output = Vec::with_capacity(input.len());
        // newlines swallowed by macro arguments, given back at the end of the line
        let mut pending_newlines = 0;
        while let Some(tok) = input.pop_front() {
            if tok.kind == TokenKind::Newline {
                output.push(tok);
                for _ in 0..pending_newlines {
                    output.push(Token::newline());
                }
                pending_newlines = 0;
                continue;
            }
            if tok.kind != TokenKind::Ident || tok.hideset.contains(&tok.text) {
                output.push(tok);
                continue;
            }
            if let Some(t) = self.builtin_macro(&tok) {
                output.push(t);
                continue;
            }
            let m = match self.macros.get(&tok.text) {
                Some(m) => m,
                None => {
                    output.push(tok);
                    continue;
                }
            };
            let mut hideset = tok.hideset.clone();
            let (body, newlines) = match &m.params {
                None => (m.body.clone(), 0),
                Some(params) => {
                    let mut skipped = 0;
                    while input
                        .get(skipped)
                        .map_or(false, |t| t.kind == TokenKind::Newline)
                    {
                        skipped += 1;
                    }
                    // a function-like macro name without arguments is an ordinary identifier
                    if !input.get(skipped).map_or(false, |t| t.is_punct("(")) {
                        output.push(tok);
                        continue;
                    }
                    input.drain(..=skipped);
                    let (args, rparen, more) = collect_arguments(&mut input, &tok.text)?;
                    hideset = hideset.intersection(&rparen.hideset).cloned().collect();
                    let args = arrange_arguments(&tok.text, params.len(), m.variadic, args)?;
                    (self.substitute(m, params, &args)?, skipped + more)
                }
            };
            hideset.insert(tok.text.clone());
            let mut body: Vec<Token> = body
                .into_iter()
                .map(|mut t| {
                    t.hideset.extend(hideset.iter().cloned());
                    t
                })
                .collect();
            if let Some(first) = body.first_mut() {
                first.space_before = tok.space_before;
            }
            pending_newlines += newlines;
            for t in body.into_iter().rev() {
                input.push_front(t);
            }
        }
        for _ in 0..pending_newlines {
            output.push(Token::newline());
        }
        Ok(output)
    }

    /**
     * Replace parameters in a function-like macro body with the arguments.
     */
    fn substitute(
        &self,
        m: &Macro,
        params: &[String],
        args: &[Vec<Token>],
    ) -> Result<Vec<Token>, PreprocessErrorKind> {
        let param_index = |t: &Token| -> Option<usize> {
            if t.kind != TokenKind::Ident {
                None
            } else if let Some(i) = params.iter().position(|p| *p == t.text) {
                Some(i)
            } else if m.variadic && t.text == "__VA_ARGS__" {
                Some(params.len())
            } else {
                None
            }
        };
        let body = &m.body;
        let mut out: Vec<Token> = Vec::new();
        let mut i = 0;
        while i < body.len() {
            let t = &body[i];
            let next = body.get(i + 1);

            if t.is_punct("#") {
                if let Some(p) = next.and_then(|n| param_index(n)) {
                    let mut s = stringify(&args[p]);
                    s.space_before = t.space_before;
                    out.push(s);
                    i += 2;
                    continue;
                }
            }

            // GNU extension: `, ## __VA_ARGS__` drops the comma when there are no variadic arguments
            if t.is_punct(",")
                && m.variadic
                && next.map_or(false, |n| n.is_punct("##"))
                && body.get(i + 2).and_then(|n| param_index(n)) == Some(params.len())
            {
                let va = &args[params.len()];
                if !va.is_empty() {
                    out.push(t.clone());
                    out.extend(va.iter().cloned());
                }
                i += 3;
                continue;
            }

            if t.is_punct("##") {
                if let Some(n) = next {
                    let rhs = match param_index(n) {
                        Some(p) => args[p].clone(),
                        None => vec![n.clone()],
                    };
                    i += 2;
                    match (out.pop(), rhs.split_first()) {
                        (Some(lhs), Some((first, rest))) => {
                            out.push(paste(&lhs, first)?);
                            out.extend(rest.iter().cloned());
                        }
                        (Some(lhs), None) => out.push(lhs),
                        (None, _) => out.extend(rhs),
                    }
                    continue;
                }
            }

            if let Some(p) = param_index(t) {
                let pasted = next.map_or(false, |n| n.is_punct("##"));
                let mut arg = if pasted {
                    args[p].clone()
                } else {
                    self.expand(args[p].clone())?
                };
                if arg.is_empty() && pasted {
                    arg.push(Token::new(TokenKind::Placemarker, ""));
                }
                if let Some(first) = arg.first_mut() {
                    first.space_before = t.space_before;
                }
                out.extend(arg);
                i += 1;
                continue;
            }

            out.push(t.clone());
            i += 1;
        }
        out.retain(|t| t.kind != TokenKind::Placemarker);
        Ok(out)
    }
}

fn collect_arguments(
    input: &mut VecDeque<Token>,
    name: &str,
) -> Result<(Vec<Vec<Token>>, Token, usize), PreprocessErrorKind> {
    let mut args = Vec::new();
    let mut current = Vec::new();
    let mut depth = 0;
    let mut newlines = 0;
    let mut space = false;
    loop {
        let mut t = match input.pop_front() {
            Some(t) => t,
            None => return Err(PreprocessErrorKind::UnterminatedArguments(name.to_string())),
        };
        if t.kind == TokenKind::Newline {
            newlines += 1;
            space = true;
            continue;
        }
        t.space_before |= space;
        space = false;
        if t.is_punct("(") {
            depth += 1;
        } else if t.is_punct(")") {
            if depth == 0 {
                args.push(current);
                return Ok((args, t, newlines));
            }
            depth -= 1;
        } else if t.is_punct(",") && depth == 0 {
            args.push(std::mem::take(&mut current));
            continue;
        }
        current.push(t);
    }
}

fn arrange_arguments(
    name: &str,
    n_params: usize,
    variadic: bool,
    mut args: Vec<Vec<Token>>,
) -> Result<Vec<Vec<Token>>, PreprocessErrorKind> {
    let count_error = || PreprocessErrorKind::MacroArgumentCount(name.to_string());
    if !variadic {
        if n_params == 0 && args.len() == 1 && args[0].is_empty() {
            return Ok(Vec::new());
        }
        return if args.len() == n_params {
            Ok(args)
        } else {
            Err(count_error())
        };
    }
    if args.len() < n_params {
        return Err(count_error());
    }
    let rest = args.split_off(n_params);
    let mut va = Vec::new();
    for (i, a) in rest.into_iter().enumerate() {
        if i > 0 {
            va.push(Token::new(TokenKind::Punct, ","));
        }
        va.extend(a);
    }
    args.push(va);
    Ok(args)
}

fn stringify(tokens: &[Token]) -> Token {
    let mut s = String::from("\"");
    for (i, t) in tokens.iter().enumerate() {
        if i > 0 && t.space_before {
            s.push(' ');
        }
        if t.kind == TokenKind::Str || t.kind == TokenKind::Char {
            for c in t.text.chars() {
                if c == '"' || c == '\\' {
                    s.push('\\');
                }
                s.push(c);
            }
        } else {
            s.push_str(&t.text);
        }
    }
    s.push('"');
    Token::new(TokenKind::Str, &s)
}

fn paste(lhs: &Token, rhs: &Token) -> Result<Token, PreprocessErrorKind> {
    if lhs.kind == TokenKind::Placemarker {
        return Ok(rhs.clone());
    }
    if rhs.kind == TokenKind::Placemarker {
        return Ok(lhs.clone());
    }
    let text = format!("{}{}", lhs.text, rhs.text);
    let mut toks = tokenize(&text)?;
    if toks.len() != 1 {
        return Err(PreprocessErrorKind::BadPaste(text));
    }
    let mut t = toks.remove(0);
    t.space_before = lhs.space_before;
    t.hideset = lhs.hideset.clone();
    Ok(t)
}

fn spell(tokens: &[Token]) -> String {
    let mut s = String::new();
    for (i, t) in tokens.iter().enumerate() {
        if i > 0 && t.space_before {
            s.push(' ');
        }
        s.push_str(&t.text);
    }
    s
}

fn needs_separator(prev: &Token, next: &Token) -> bool {
    use TokenKind::*;
    match (prev.kind, next.kind) {
        (Ident | Number, Ident | Number | Str | Char) => true,
        (Number, Punct) => next.text.starts_with('.'),
        (Punct, Punct) => {
            let joined = format!("{}{}", prev.text, next.text);
            PUNCTUATORS
                .iter()
                .any(|p| p.len() > prev.text.len() && joined.starts_with(p))
                || prev.text == "/" && next.text.starts_with(['/', '*'])
        }
        _ => false,
    }
}

fn parse_header_name(text: &str) -> Option<(String, bool)> {
    let text = text.trim();
    if let Some(s) = text.strip_prefix('"') {
        let end = s.find('"')?;
        Some((s[..end].to_string(), false))
    } else if let Some(s) = text.strip_prefix('<') {
        let end = s.find('>')?;
        Some((s[..end].trim().to_string(), true))
    } else {
        None
    }
}

fn parse_define(toks: Vec<Token>) -> Result<(String, Macro), PreprocessErrorKind> {
    let bad = |msg: &str| PreprocessErrorKind::BadDirective(msg.to_string());
    let mut it = toks.into_iter().peekable();
    let name = match it.next() {
        Some(t) if t.kind == TokenKind::Ident => t.text,
        _ => return Err(bad("macro names must be identifiers")),
    };
    if name == "defined" {
        return Err(bad("\"defined\" cannot be used as a macro name"));
    }
    let mut params = None;
    let mut variadic = false;
    if it.peek().map_or(false, |t| t.is_punct("(") && !t.space_before) {
        it.next();
        let mut list: Vec<String> = Vec::new();
        loop {
            match it.next() {
                Some(t) if t.is_punct(")") && list.is_empty() => break,
                Some(t) if t.is_punct("...") => {
                    variadic = true;
                    match it.next() {
                        Some(t) if t.is_punct(")") => break,
                        _ => return Err(bad("missing `)' in macro parameter list")),
                    }
                }
                Some(t) if t.kind == TokenKind::Ident => {
                    if list.contains(&t.text) {
                        return Err(PreprocessErrorKind::BadDirective(format!(
                            "duplicate macro parameter `{}'",
                            t.text
                        )));
                    }
                    list.push(t.text);
                    match it.next() {
                        Some(t) if t.is_punct(")") => break,
                        Some(t) if t.is_punct(",") => (),
                        _ => return Err(bad("expected `,' or `)' in macro parameter list")),
                    }
                }
                _ => return Err(bad("bad macro parameter list")),
            }
        }
        params = Some(list);
    }
    let mut body: Vec<Token> = it.collect();
    if let Some(first) = body.first_mut() {
        first.space_before = false;
    }
    if body.first().map_or(false, |t| t.is_punct("##"))
        || body.last().map_or(false, |t| t.is_punct("##"))
    {
        return Err(bad("`##' cannot appear at either end of a macro expansion"));
    }
    if let Some(list) = &params {
        for (i, t) in body.iter().enumerate() {
            if t.is_punct("#") {
                let ok = body.get(i + 1).map_or(false, |n| {
                    n.kind == TokenKind::Ident
                        && (list.contains(&n.text) || variadic && n.text == "__VA_ARGS__")
                });
                if !ok {
                    return Err(bad("`#' is not followed by a macro parameter"));
                }
            }
        }
    }
    Ok((
        name,
        Macro {
            params,
            variadic,
            body,
        },
    ))
}

/**
 * Split a directive line into the directive name and the rest.
 */
fn split_directive(line: &str) -> Option<(&str, &str)> {
    let rest = line.trim_start().strip_prefix('#')?.trim_start();
    let end = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    Some((&rest[..end], &rest[end..]))
}

/**
 * Recognize the `#ifndef X` / `#define X` ... `#endif` pattern covering the whole file.
 */
fn detect_guard(lines: &[LogicalLine]) -> Option<String> {
    let significant: Vec<&str> = lines
        .iter()
        .map(|l| l.text.trim())
        .filter(|t| !t.is_empty())
        .collect();
    let (name, rest) = split_directive(significant.first()?)?;
    if name != "ifndef" {
        return None;
    }
    let guard = rest.split_whitespace().next()?;
    let (name, rest) = split_directive(significant.get(1)?)?;
    if name != "define" || rest.split_whitespace().next() != Some(guard) {
        return None;
    }
    let last = significant.len() - 1;
    let mut depth = 0;
    for (i, line) in significant.iter().enumerate() {
        match split_directive(line) {
            Some(("if" | "ifdef" | "ifndef", _)) => depth += 1,
            Some(("else" | "elif", _)) if depth == 1 => return None,
            Some(("endif", _)) => {
                depth -= 1;
                if depth == 0 && i != last {
                    return None;
                }
            }
            _ => (),
        }
    }
    if depth == 0 {
        Some(guard.to_string())
    } else {
        None
    }
}

/**
 * Join continued lines and replace comments with a space.
 *
 * Every logical line remembers the physical line it starts on.
 */
fn split_logical_lines(src: &str) -> Result<Vec<LogicalLine>, (usize, PreprocessErrorKind)> {
    let chars: Vec<char> = src.chars().collect();
    let mut lines = Vec::new();
    let mut cur = String::new();
    let mut line = 1;
    let mut start_line = 1;
    let mut i = 0;
    let splice_at = |i: usize| -> usize {
        match (chars.get(i), chars.get(i + 1), chars.get(i + 2)) {
            (Some('\\'), Some('\n'), _) => 2,
            (Some('\\'), Some('\r'), Some('\n')) => 3,
            _ => 0,
        }
    };
    while i < chars.len() {
        let splice = splice_at(i);
        if splice > 0 {
            i += splice;
            line += 1;
            continue;
        }
        let c = chars[i];
        match c {
            '\n' => {
                lines.push(LogicalLine {
                    line: start_line,
                    text: std::mem::take(&mut cur),
                });
                i += 1;
                line += 1;
                start_line = line;
            }
            '\r' => i += 1,
            '/' if chars.get(i + 1) == Some(&'*') => {
                let comment_line = line;
                i += 2;
                loop {
                    match chars.get(i) {
                        None => {
                            return Err((comment_line, PreprocessErrorKind::UnterminatedComment))
                        }
                        Some('*') if chars.get(i + 1) == Some(&'/') => {
                            i += 2;
                            break;
                        }
                        Some('\n') => line += 1,
                        _ => (),
                    }
                    i += 1;
                }
                cur.push(' ');
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    let splice = splice_at(i);
                    if splice > 0 {
                        i += splice;
                        line += 1;
                    } else {
                        i += 1;
                    }
                }
                cur.push(' ');
            }
            '"' | '\'' => {
                cur.push(c);
                i += 1;
                while i < chars.len() && chars[i] != '\n' {
                    let splice = splice_at(i);
                    if splice > 0 {
                        i += splice;
                        line += 1;
                        continue;
                    }
                    let d = chars[i];
                    cur.push(d);
                    i += 1;
                    if d == '\\' {
                        if let Some(&e) = chars.get(i) {
                            if e != '\n' {
                                cur.push(e);
                                i += 1;
                            }
                        }
                    } else if d == c {
                        break;
                    }
                }
            }
            _ => {
                cur.push(c);
                i += 1;
            }
        }
    }
    if !cur.is_empty() {
        lines.push(LogicalLine {
            line: start_line,
            text: cur,
        });
    }
    Ok(lines)
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn skip_quoted(chars: &[char], i: &mut usize) -> Result<(), PreprocessErrorKind> {
    let quote = chars[*i];
    *i += 1;
    loop {
        match chars.get(*i) {
            None => return Err(PreprocessErrorKind::UnterminatedLiteral),
            Some('\\') => *i += 2,
            Some(&c) if c == quote => {
                *i += 1;
                return Ok(());
            }
            _ => *i += 1,
        }
    }
}

/**
 * Split a logical line into preprocessing tokens.
 */
fn tokenize(text: &str) -> Result<Vec<Token>, PreprocessErrorKind> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut space = false;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            space = true;
            i += 1;
            continue;
        }
        let start = i;
        let kind = if is_ident_start(c) {
            let mut j = i;
            while j < chars.len() && is_ident_continue(chars[j]) {
                j += 1;
            }
            let word: String = chars[i..j].iter().collect();
            let quote = chars.get(j).copied();
            if matches!(quote, Some('"' | '\'')) && matches!(word.as_str(), "L" | "u" | "U" | "u8")
            {
                i = j;
                skip_quoted(&chars, &mut i)?;
                if quote == Some('"') {
                    TokenKind::Str
                } else {
                    TokenKind::Char
                }
            } else {
                i = j;
                TokenKind::Ident
            }
        } else if c.is_ascii_digit()
            || c == '.' && chars.get(i + 1).map_or(false, |d| d.is_ascii_digit())
        {
            i += 1;
            while i < chars.len() {
                let d = chars[i];
                if matches!(d, 'e' | 'E' | 'p' | 'P')
                    && matches!(chars.get(i + 1), Some('+' | '-'))
                {
                    i += 2;
                } else if is_ident_continue(d) || d == '.' {
                    i += 1;
                } else {
                    break;
                }
            }
            TokenKind::Number
        } else if c == '"' {
            skip_quoted(&chars, &mut i)?;
            TokenKind::Str
        } else if c == '\'' {
            skip_quoted(&chars, &mut i)?;
            TokenKind::Char
        } else {
            let rest: String = chars[i..chars.len().min(i + 3)].iter().collect();
            let len = PUNCTUATORS
                .iter()
                .find(|p| rest.starts_with(*p))
                .map_or(1, |p| p.len());
            i += len;
            TokenKind::Punct
        };
        let mut t = Token::new(kind, &chars[start..i].iter().collect::<String>());
        t.space_before = space;
        space = false;
        tokens.push(t);
    }
    Ok(tokens)
}

impl PpValue {
    fn new(value: i128, unsigned: bool) -> Self {
        Self {
            value: utils::wrap_to_width(value, 8, !unsigned),
            unsigned,
        }
    }

    fn as_unsigned(&self) -> i128 {
        utils::wrap_to_width(self.value, 8, false)
    }
}

fn parse_pp_number(text: &str) -> Result<PpValue, PreprocessErrorKind> {
    let bad = || PreprocessErrorKind::BadExpression(format!("invalid integer constant `{}'", text));
    let digits = text.trim_end_matches(['u', 'U', 'l', 'L']);
    let unsigned = text[digits.len()..].contains(['u', 'U']);
    let (radix, digits) = if let Some(d) = digits.strip_prefix("0x").or(digits.strip_prefix("0X")) {
        (16, d)
    } else if let Some(d) = digits.strip_prefix("0b").or(digits.strip_prefix("0B")) {
        (2, d)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (8, &digits[1..])
    } else {
        (10, digits)
    };
    let value = u128::from_str_radix(digits, radix).map_err(|_| bad())?;
    if value > u64::MAX as u128 {
        return Err(bad());
    }
    // too large for intmax_t: the constant is unsigned
    let unsigned = unsigned || value > i64::MAX as u128;
    Ok(PpValue::new(value as i128, unsigned))
}

fn binary_precedence(op: &str) -> Option<u8> {
    Some(match op {
        "||" => 1,
        "&&" => 2,
        "|" => 3,
        "^" => 4,
        "&" => 5,
        "==" | "!=" => 6,
        "<" | ">" | "<=" | ">=" => 7,
        "<<" | ">>" => 8,
        "+" | "-" => 9,
        "*" | "/" | "%" => 10,
        _ => return None,
    })
}

fn apply_binary(op: &str, l: PpValue, r: PpValue, skip: bool) -> Result<PpValue, PreprocessErrorKind> {
    let unsigned = l.unsigned || r.unsigned;
    let (a, b) = if unsigned {
        (l.as_unsigned(), r.as_unsigned())
    } else {
        (l.value, r.value)
    };
    let flag = |x: bool| PpValue::new(x as i128, false);
    Ok(match op {
        "*" => PpValue::new(a.wrapping_mul(b), unsigned),
        "/" | "%" if b == 0 => {
            if skip {
                PpValue::new(0, unsigned)
            } else {
                return Err(PreprocessErrorKind::DivisionByZero);
            }
        }
        "/" => PpValue::new(a / b, unsigned),
        "%" => PpValue::new(a % b, unsigned),
        "+" => PpValue::new(a + b, unsigned),
        "-" => PpValue::new(a - b, unsigned),
        "<<" => PpValue::new(l.value << r.value.clamp(0, 127) as u32, l.unsigned),
        ">>" => PpValue::new(l.value >> r.value.clamp(0, 127) as u32, l.unsigned),
        "<" => flag(a < b),
        ">" => flag(a > b),
        "<=" => flag(a <= b),
        ">=" => flag(a >= b),
        "==" => flag(a == b),
        "!=" => flag(a != b),
        "&" => PpValue::new(a & b, unsigned),
        "^" => PpValue::new(a ^ b, unsigned),
        "|" => PpValue::new(a | b, unsigned),
        "&&" => flag(a != 0 && b != 0),
        "||" => flag(a != 0 || b != 0),
        _ => return Err(PreprocessErrorKind::BadExpression(format!("unexpected `{}'", op))),
    })
}

impl<'t> ExprParser<'t> {
    fn peek_punct(&self) -> Option<&'t str> {
        match self.toks.get(self.pos) {
            Some(t) if t.kind == TokenKind::Punct => Some(t.text.as_str()),
            _ => None,
        }
    }

    fn expect(&mut self, p: &str) -> Result<(), PreprocessErrorKind> {
        if self.peek_punct() == Some(p) {
            self.pos += 1;
            Ok(())
        } else {
            Err(PreprocessErrorKind::BadExpression(format!("expected `{}'", p)))
        }
    }

    /**
     * With `skip` set the operand is not evaluated: division by zero is fine there.
     */
    fn parse_conditional(&mut self, skip: bool) -> Result<PpValue, PreprocessErrorKind> {
        let cond = self.parse_binary(1, skip)?;
        if self.peek_punct() != Some("?") {
            return Ok(cond);
        }
        self.pos += 1;
        let take = cond.value != 0;
        let a = self.parse_conditional(skip || !take)?;
        self.expect(":")?;
        let b = self.parse_conditional(skip || take)?;
        let unsigned = a.unsigned || b.unsigned;
        let v = if take { a } else { b };
        Ok(PpValue::new(v.value, unsigned))
    }

    fn parse_binary(&mut self, min_prec: u8, skip: bool) -> Result<PpValue, PreprocessErrorKind> {
        let mut lhs = self.parse_unary(skip)?;
        while let Some(op) = self.peek_punct() {
            let prec = match binary_precedence(op) {
                Some(p) if p >= min_prec => p,
                _ => break,
            };
            self.pos += 1;
            let rhs_skip = skip
                || op == "&&" && lhs.value == 0
                || op == "||" && lhs.value != 0;
            let rhs = self.parse_binary(prec + 1, rhs_skip)?;
            lhs = apply_binary(op, lhs, rhs, rhs_skip)?;
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self, skip: bool) -> Result<PpValue, PreprocessErrorKind> {
        let t = match self.toks.get(self.pos) {
            Some(t) => t,
            None => {
                return Err(PreprocessErrorKind::BadExpression(
                    "unexpected end of expression".to_string(),
                ))
            }
        };
        self.pos += 1;
        match t.kind {
            TokenKind::Number => parse_pp_number(&t.text),
            TokenKind::Char => TypedValue::new_from_char_literal(&t.text, self.model)
                .map(|v| PpValue::new(v.unwrap_integer(), false))
                .map_err(PreprocessErrorKind::BadExpression),
            TokenKind::Punct => match t.text.as_str() {
                "(" => {
                    let v = self.parse_conditional(skip)?;
                    self.expect(")")?;
                    Ok(v)
                }
                "+" => self.parse_unary(skip),
                "-" => {
                    let v = self.parse_unary(skip)?;
                    Ok(PpValue::new(-v.value, v.unsigned))
                }
                "~" => {
                    let v = self.parse_unary(skip)?;
                    Ok(PpValue::new(!v.value, v.unsigned))
                }
                "!" => {
                    let v = self.parse_unary(skip)?;
                    Ok(PpValue::new((v.value == 0) as i128, false))
                }
                _ => Err(PreprocessErrorKind::BadExpression(format!(
                    "unexpected `{}'",
                    t.text
                ))),
            },
            _ => Err(PreprocessErrorKind::BadExpression(format!(
                "unexpected `{}'",
                t.text
            ))),
        }
    }
}

impl std::fmt::Display for PreprocessErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            PreprocessErrorKind::FileNotFound(s) => write!(f, "file not found: `{}'", s),
            PreprocessErrorKind::Io(path, e) => write!(f, "cannot read `{}': {}", path, e),
            PreprocessErrorKind::IncludeDepth => write!(
                f,
                "#include nested too deeply (limit is {})",
                MAX_INCLUDE_DEPTH
            ),
            PreprocessErrorKind::BadInclude => {
                f.write_str("#include expects \"FILENAME\" or <FILENAME>")
            }
            PreprocessErrorKind::UnknownDirective(s) => {
                write!(f, "invalid preprocessing directive #{}", s)
            }
            PreprocessErrorKind::BadDirective(s) => f.write_str(s),
            PreprocessErrorKind::UnbalancedConditional(s) => write!(f, "{} without #if", s),
            PreprocessErrorKind::UnterminatedConditional => {
                f.write_str("unterminated conditional directive")
            }
            PreprocessErrorKind::UnterminatedComment => f.write_str("unterminated comment"),
            PreprocessErrorKind::UnterminatedLiteral => {
                f.write_str("missing terminating quote character")
            }
            PreprocessErrorKind::MacroRedefinition(s) => write!(f, "`{}' redefined", s),
            PreprocessErrorKind::MacroArgumentCount(s) => {
                write!(f, "wrong number of arguments for macro `{}'", s)
            }
            PreprocessErrorKind::UnterminatedArguments(s) => {
                write!(f, "unterminated argument list invoking macro `{}'", s)
            }
            PreprocessErrorKind::BadPaste(s) => {
                write!(f, "pasting does not give a valid preprocessing token: `{}'", s)
            }
            PreprocessErrorKind::BadExpression(s) => write!(f, "bad #if expression: {}", s),
            PreprocessErrorKind::DivisionByZero => f.write_str("division by zero in #if"),
            PreprocessErrorKind::UserError(s) => write!(f, "#error {}", s),
        }
    }
}

impl std::fmt::Display for PreprocessError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{}:{}: {}", self.file, self.line, self.kind)
    }
}

impl std::fmt::Display for IncludeStats {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        for (file, entered) in self.entered.iter() {
            writeln!(
                f,
                "{}: entered {}, suppressed {}",
                file,
                entered,
                self.times_suppressed(file)
            )?;
        }
        Ok(())
    }
}
