use lang_c::span::Span;
use std::fmt::Formatter;

use crate::ctype::QualifiedType;
use crate::preprocess::PreprocessError;

#[derive(Debug, PartialEq)]
pub enum CompileError {
    Unimplemented(String),
    UnknownIdentifier(String),
    StaticAssertionFailed(String),
    Preprocess(PreprocessError),
    Syntax(String),
    // Errors concerning types in declarations
    MultipleStorageClasses,
    WrongStorageClass,
    MultipleTypes,
    MultipleSignSpecifiers,
    LongShortTogether,
    TypeTooLong,
    WrongModifiers(String),
    UnknownType(String),
    IncompatibleTypes(QualifiedType, QualifiedType),
    VoidParameter,
    NotAType(String),
    NotAVar(String),
    BadArraySize,
    ObjectTooLarge(String),
    BadDeclarator(String),
    // Struct and union errors
    TagKindMismatch(String),
    DuplicateMember(String),
    NoSuchMember(String, String),
    IncompleteType(String),
    NotAStructOrUnion(String),
    // Global definition errors
    TypeRedefinition(String),
    ConflictingTypes(String),
    ConflictingStorageClass(String),
    TypedefInitialized,
    VarRedefinition(String),
    // Constant expression errors
    VariablesForbidden,
    CallsForbidden,
    NonConstInConstExpr,
    BadCast(String, String),
    AssignmentToConst,
    DivisionByZero,
    CharParseError(String),
    IntegerConstantTooLarge,
    // General expression errors
    ArithmeticTypeRequired,
    IntegerTypeRequired,
    ScalarTypeRequired,
    PointerTypeRequired,
    LValueRequired,
    BadTypesForOperator(String),
    CannotCompare(QualifiedType, QualifiedType),
}

#[derive(Debug, PartialEq)]
pub enum CompileWarning {
    Unimplemented(String),
    ImplicitInt,
    EmptyDeclaration,
    InvalidSizeof,
    ShiftByNegative,
    ExternVarInitialized(String),
    PointerToInteger,
    DistinctPointerComparison(QualifiedType, QualifiedType),
}

pub struct ErrorCollector {
    errors: Vec<(CompileError, Span)>,
    warnings: Vec<(CompileWarning, Span)>,
}

impl ErrorCollector {
    pub fn new() -> Self {
        ErrorCollector {
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn record_error(&mut self, error: CompileError, span: Span) -> Result<(), ()> {
        self.errors.push((error, span));
        Err(())
    }

    pub fn record_warning(&mut self, warning: CompileWarning, span: Span) -> Result<(), ()> {
        self.warnings.push((warning, span));
        Ok(())
    }

    pub fn get_error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn get_warning_count(&self) -> usize {
        self.warnings.len()
    }

    pub fn get_first_error(&self) -> Option<&(CompileError, Span)> {
        self.errors.first()
    }

    pub fn get_first_warning(&self) -> Option<&(CompileWarning, Span)> {
        self.warnings.first()
    }

    pub fn print_issues(&self) {
        for (warn, span) in &self.warnings {
            println!("{:?}: warning: {}", span, warn);
        }
        for (err, span) in &self.errors {
            println!("{:?}: error: {}", span, err);
        }
    }

    /**
     * Format issues as `file:line:column: kind: message`.
     *
     * Spans are byte offsets into `source`, which is the preprocessed text
     * the spans were produced from.
     */
    pub fn format_issues(&self, file: &str, source: &str) -> Vec<String> {
        let mut result = Vec::new();
        for (warn, span) in &self.warnings {
            result.push(format!(
                "{}: warning: {}",
                locate(file, source, span),
                warn
            ));
        }
        for (err, span) in &self.errors {
            result.push(format!("{}: error: {}", locate(file, source, span), err));
        }
        result
    }
}

/**
 * Map a byte offset in preprocessed text to `file:line:column`.
 *
 * `# N "name"` line markers switch the reported file and line.
 */
fn locate(file: &str, source: &str, span: &Span) -> String {
    // Span::none() is usize::MAX, so it never points inside the source
    if span.start > source.len() || !source.is_char_boundary(span.start) {
        return file.to_string();
    }
    let before = &source[..span.start];
    let column = before.len() - before.rfind('\n').map(|x| x + 1).unwrap_or(0) + 1;
    let mut name = file;
    let mut line = 1;
    for l in before.split('\n') {
        match parse_line_marker(l) {
            Some((n, f)) => {
                name = f;
                line = n;
            }
            None => line += 1,
        }
    }
    // the line holding the offset was counted as a completed one
    format!("{}:{}:{}", name, line - 1, column)
}

fn parse_line_marker(line: &str) -> Option<(usize, &str)> {
    let rest = line.strip_prefix("# ")?;
    let (n, rest) = rest.split_once(' ')?;
    let n = n.parse().ok()?;
    let name = rest.strip_prefix('"')?.split('"').next()?;
    Some((n, name))
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            CompileError::Unimplemented(s) => write!(f, "unimplemented: {}", &s),
            CompileError::UnknownIdentifier(s) => write!(f, "unknown identifier: {}", &s),
            CompileError::StaticAssertionFailed(s) => {
                write!(f, "static assertion failed, message: {}", s)
            }
            CompileError::Preprocess(e) => write!(f, "{}", e),
            CompileError::Syntax(s) => write!(f, "{}", s),
            CompileError::WrongStorageClass => f.write_str("wrong storage class"),
            CompileError::MultipleStorageClasses => {
                write!(f, "multiple storage classes in declaration specifiers")
            }
            CompileError::UnknownType(s) => write!(f, "unknown type `{}'", &s),
            CompileError::MultipleTypes => {
                write!(f, "two or more data types in declaration specifiers")
            }
            CompileError::MultipleSignSpecifiers => {
                write!(f, "only one signed/unsigned is allowed")
            }
            CompileError::LongShortTogether => write!(f, "long and short cannot be together"),
            CompileError::TypeTooLong => write!(f, "too long"),
            CompileError::WrongModifiers(t) => write!(f, "wrong modifiers for {}", t),
            CompileError::VoidParameter => {
                f.write_str("'void' must be the first and only parameter if specified")
            }
            CompileError::NotAType(s) => write!(f, "`{}' is not a type, but a variable", s),
            CompileError::NotAVar(s) => write!(f, "`{}' is not a variable, but a type alias", s),
            CompileError::BadArraySize => f.write_str("array size must be a positive integer"),
            CompileError::ObjectTooLarge(t) => write!(f, "size of `{}' is too large", t),
            CompileError::BadDeclarator(s) => write!(f, "bad declarator: {}", s),
            CompileError::TagKindMismatch(s) => {
                write!(f, "`{}' defined as wrong kind of tag", s)
            }
            CompileError::DuplicateMember(s) => write!(f, "duplicate member `{}'", s),
            CompileError::NoSuchMember(t, m) => write!(f, "`{}' has no member named `{}'", t, m),
            CompileError::IncompleteType(t) => write!(f, "incomplete type `{}'", t),
            CompileError::NotAStructOrUnion(t) => {
                write!(f, "`{}' is not a structure or union", t)
            }
            CompileError::TypeRedefinition(t) => write!(f, "type `{}' is redefined", t),
            CompileError::ConflictingTypes(s) => write!(f, "conflicting types for {}", s),
            CompileError::ConflictingStorageClass(s) => {
                write!(f, "conflicting storage classes for {}", s)
            }
            CompileError::TypedefInitialized => f.write_str("typedef is initialized"),
            CompileError::VarRedefinition(s) => write!(f, "redefinition of `{}'", s),
            CompileError::VariablesForbidden => f.write_str("variables are forbidden here"),
            CompileError::CallsForbidden => f.write_str("function calls are forbidden here"),
            CompileError::NonConstInConstExpr => {
                f.write_str("non-const value in a constant expression")
            }
            CompileError::BadCast(t1, t2) => write!(f, "bad cast from `{}' to `{}'", t1, t2),
            CompileError::AssignmentToConst => f.write_str("assignment to a constant expression"),
            CompileError::DivisionByZero => f.write_str("division by zero"),
            CompileError::CharParseError(s) => {
                write!(f, "error while parsing character literal: {}", s)
            }
            CompileError::IntegerConstantTooLarge => f.write_str("integer constant is too large"),
            CompileError::ArithmeticTypeRequired => {
                f.write_str("an arithmetic type is required here")
            }
            CompileError::IntegerTypeRequired => f.write_str("an integer type is required here"),
            CompileError::ScalarTypeRequired => f.write_str("a scalar type is required here"),
            CompileError::PointerTypeRequired => f.write_str("a pointer type is required here"),
            CompileError::LValueRequired => f.write_str("an lvalue is required here"),
            CompileError::BadTypesForOperator(op) => write!(f, "bad types for operator `{}`", op),
            CompileError::CannotCompare(t1, t2) => {
                write!(f, "cannot compare `{}` and `{}`", t1, t2)
            }
            CompileError::IncompatibleTypes(t1, t2) => {
                write!(f, "incompatible types `{}' and `{}'", t1, t2)
            }
        }
    }
}

impl std::fmt::Display for CompileWarning {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            CompileWarning::Unimplemented(s) => write!(f, "unimplemented: {}", &s),
            CompileWarning::ImplicitInt => f.write_str("implicit int"),
            CompileWarning::EmptyDeclaration => {
                f.write_str("empty declaration doesn't declare anything")
            }
            CompileWarning::InvalidSizeof => {
                f.write_str("invalid application of sizeof to a void or function type")
            }
            CompileWarning::ShiftByNegative => f.write_str("shift by a negative value"),
            CompileWarning::ExternVarInitialized(s) => {
                write!(f, "extern variable `{}' has an initializer", s)
            }
            CompileWarning::PointerToInteger => {
                f.write_str("integer is made from a pointer without a cast")
            }
            CompileWarning::DistinctPointerComparison(t1, t2) => {
                write!(f, "comparison of distinct pointer types `{}' and `{}'", t1, t2)
            }
        }
    }
}
