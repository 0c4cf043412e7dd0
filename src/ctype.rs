use bitflags::bitflags;
use lang_c::span::Span;
use replace_with::replace_with_or_abort;
use serde::{Deserialize, Serialize};
use std::fmt::Formatter;

use crate::{
    error::{CompileError, CompileWarning, ErrorCollector},
    machine::DataModel,
    type_registry::TypeRegistry,
};

/**
 * Integer types of C, without `_Bool`.
 *
 * Sizes and the signedness of plain `char` come from the target's data model.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntKind {
    #[serde(rename = "char")]
    Char,
    #[serde(rename = "signed char")]
    SChar,
    #[serde(rename = "unsigned char")]
    UChar,
    #[serde(rename = "short")]
    Short,
    #[serde(rename = "unsigned short")]
    UShort,
    #[serde(rename = "int")]
    Int,
    #[serde(rename = "unsigned int")]
    UInt,
    #[serde(rename = "long")]
    Long,
    #[serde(rename = "unsigned long")]
    ULong,
    #[serde(rename = "long long")]
    LLong,
    #[serde(rename = "unsigned long long")]
    ULLong,
}

#[rustfmt::skip]
#[derive(Debug, Clone, PartialEq)]
pub enum CType {
    Void,
    Bool,
    Int(IntKind),
    Pointer(Box<QualifiedType>),
    Array(Box<QualifiedType>, Option<u64>),
    Struct(TypeIdentifier),
    Union(TypeIdentifier),
    Function { result: Box<QualifiedType>, args: FunctionArgs, vararg: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FunctionArgs {
    Empty,
    Void,
    List(Vec<QualifiedType>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct QualifiedType {
    pub t: CType,
    pub qualifiers: Qualifiers,
}

bitflags! {
    pub struct Qualifiers: u32 {
        const CONST = 1 << 0;
        const VOLATILE = 1 << 1;
        const RESTRICT = 1 << 2;
        const ATOMIC = 1 << 3;
    }
}

#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum TypeIdentifier {
    Anon(usize),
    Named(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructUnionKind {
    Struct,
    Union,
}

pub const CHAR_TYPE: CType = CType::Int(IntKind::Char);
pub const SCHAR_TYPE: CType = CType::Int(IntKind::SChar);
pub const UCHAR_TYPE: CType = CType::Int(IntKind::UChar);
pub const SHORT_TYPE: CType = CType::Int(IntKind::Short);
pub const USHORT_TYPE: CType = CType::Int(IntKind::UShort);
pub const INT_TYPE: CType = CType::Int(IntKind::Int);
pub const UINT_TYPE: CType = CType::Int(IntKind::UInt);
pub const LONG_TYPE: CType = CType::Int(IntKind::Long);
pub const ULONG_TYPE: CType = CType::Int(IntKind::ULong);
pub const LLONG_TYPE: CType = CType::Int(IntKind::LLong);
pub const ULLONG_TYPE: CType = CType::Int(IntKind::ULLong);

impl IntKind {
    pub const ALL: [IntKind; 11] = [
        IntKind::Char,
        IntKind::SChar,
        IntKind::UChar,
        IntKind::Short,
        IntKind::UShort,
        IntKind::Int,
        IntKind::UInt,
        IntKind::Long,
        IntKind::ULong,
        IntKind::LLong,
        IntKind::ULLong,
    ];

    pub const fn size(self, model: &DataModel) -> u8 {
        match self {
            IntKind::Char | IntKind::SChar | IntKind::UChar => 1,
            IntKind::Short | IntKind::UShort => model.short_size,
            IntKind::Int | IntKind::UInt => model.int_size,
            IntKind::Long | IntKind::ULong => model.long_size,
            IntKind::LLong | IntKind::ULLong => model.llong_size,
        }
    }

    pub const fn is_signed(self, model: &DataModel) -> bool {
        match self {
            IntKind::Char => model.char_signed,
            IntKind::SChar | IntKind::Short | IntKind::Int | IntKind::Long | IntKind::LLong => {
                true
            }
            _ => false,
        }
    }

    /**
     * Integer conversion rank (C11 6.3.1.1), `_Bool` excluded.
     */
    pub fn rank(self) -> u8 {
        match self {
            IntKind::Char | IntKind::SChar | IntKind::UChar => 1,
            IntKind::Short | IntKind::UShort => 2,
            IntKind::Int | IntKind::UInt => 3,
            IntKind::Long | IntKind::ULong => 4,
            IntKind::LLong | IntKind::ULLong => 5,
        }
    }

    pub fn to_unsigned(self) -> IntKind {
        match self {
            IntKind::Char | IntKind::SChar | IntKind::UChar => IntKind::UChar,
            IntKind::Short | IntKind::UShort => IntKind::UShort,
            IntKind::Int | IntKind::UInt => IntKind::UInt,
            IntKind::Long | IntKind::ULong => IntKind::ULong,
            IntKind::LLong | IntKind::ULLong => IntKind::ULLong,
        }
    }

    pub fn to_signed(self) -> IntKind {
        match self {
            IntKind::Char | IntKind::SChar | IntKind::UChar => IntKind::SChar,
            IntKind::Short | IntKind::UShort => IntKind::Short,
            IntKind::Int | IntKind::UInt => IntKind::Int,
            IntKind::Long | IntKind::ULong => IntKind::Long,
            IntKind::LLong | IntKind::ULLong => IntKind::LLong,
        }
    }

    pub fn min_value(self, model: &DataModel) -> i128 {
        if self.is_signed(model) {
            -(1i128 << (self.size(model) as u32 * 8 - 1))
        } else {
            0
        }
    }

    pub fn max_value(self, model: &DataModel) -> i128 {
        let bits = self.size(model) as u32 * 8;
        if self.is_signed(model) {
            (1i128 << (bits - 1)) - 1
        } else {
            (1i128 << bits) - 1
        }
    }
}

impl QualifiedType {
    pub fn new(t: CType) -> Self {
        Self {
            t,
            qualifiers: Qualifiers::empty(),
        }
    }

    /**
     * Checks if two types are equal and can be used interchangebly in definition.
     *
     * Example:
     * ```c
     * extern int x[];
     * int x[25];
     * ```
     */
    pub fn is_compatible_to(&self, other: &Self, check_qualifiers: bool) -> bool {
        if check_qualifiers && self.qualifiers != other.qualifiers {
            return false;
        }
        match &self.t {
            CType::Pointer(t1) => {
                if let CType::Pointer(t2) = &other.t {
                    t1.is_compatible_to(t2, true)
                } else {
                    false
                }
            }
            CType::Array(t1, n1) => {
                if let CType::Array(t2, n2) = &other.t {
                    if !t1.is_compatible_to(t2, true) {
                        false
                    } else {
                        n1 == n2 || n1.is_none() || n2.is_none()
                    }
                } else {
                    false
                }
            }
            CType::Function {
                result: r1,
                args: a1,
                vararg: va1,
            } => {
                if let CType::Function {
                    result: r2,
                    args: a2,
                    vararg: va2,
                } = &other.t
                {
                    va1 == va2 && r1.is_compatible_to(r2, true) && a1.is_compatible_to(a2)
                } else {
                    false
                }
            }
            _ => self.t == other.t,
        }
    }

    pub fn wrap_pointer(&mut self, qualifiers: Qualifiers) {
        replace_with_or_abort(self, |self_| QualifiedType {
            t: CType::Pointer(Box::new(self_)),
            qualifiers,
        });
    }

    /**
     * Original types becomes the return type of the function.
     */
    pub fn wrap_function(&mut self, args: FunctionArgs, vararg: bool) {
        replace_with_or_abort(self, |self_| QualifiedType {
            t: CType::Function {
                result: Box::new(self_),
                args,
                vararg,
            },
            qualifiers: Qualifiers::empty(),
        });
    }

    pub fn wrap_array(&mut self, size: Option<u64>) {
        replace_with_or_abort(self, |self_| QualifiedType {
            t: CType::Array(Box::new(self_), size),
            qualifiers: Qualifiers::empty(),
        });
    }

    /**
     * Offset and type of a struct or union member.
     *
     * The member type carries the qualifiers of the aggregate.
     */
    pub fn get_field(
        &self,
        name: &str,
        reg: &TypeRegistry,
        span: Span,
        ec: &mut ErrorCollector,
    ) -> Result<(u64, QualifiedType), ()> {
        let id = match &self.t {
            CType::Struct(id) | CType::Union(id) => id,
            _ => {
                ec.record_error(CompileError::NotAStructOrUnion(format!("{}", self)), span)?;
                unreachable!()
            }
        };
        let su = match reg.get_struct_union(id) {
            Some(su) if su.is_complete() => su,
            _ => {
                ec.record_error(CompileError::IncompleteType(format!("{}", self.t)), span)?;
                unreachable!()
            }
        };
        match su.get_field(name, reg, span, ec)? {
            Some((offset, mut t)) => {
                t.qualifiers |= self.qualifiers;
                Ok((offset, t))
            }
            None => {
                ec.record_error(
                    CompileError::NoSuchMember(format!("{}", self.t), name.to_string()),
                    span,
                )?;
                unreachable!()
            }
        }
    }

    pub fn dereference(self) -> Result<Self, Self> {
        match self.t.dereference() {
            Ok(t) => Ok(t),
            Err(t) => Err(Self { t, ..self }),
        }
    }

    /**
     * Arrays decay to pointers to their first element, functions to function pointers.
     */
    pub fn decay(self) -> Self {
        match self.t {
            CType::Array(inner, _) => QualifiedType::new(CType::Pointer(inner)),
            t @ CType::Function { .. } => {
                QualifiedType::new(CType::Pointer(Box::new(QualifiedType::new(t))))
            }
            t => QualifiedType {
                t,
                qualifiers: self.qualifiers,
            },
        }
    }
}

impl FunctionArgs {
    pub fn is_compatible_to(&self, other: &Self) -> bool {
        use FunctionArgs::*;
        match (self, other) {
            (Empty, _) => true,
            (_, Empty) => true,
            (Void, Void) => true,
            (List(v1), List(v2)) => {
                v1.len() == v2.len()
                    && v1
                        .iter()
                        .zip(v2)
                        .all(|(t1, t2)| t1.is_compatible_to(t2, false))
            }
            _ => false,
        }
    }
}

impl CType {
    pub fn is_explicit_castable_to(&self, other: &Self) -> bool {
        if let CType::Void = other {
            return true;
        }
        (self.is_arithmetic() || self.is_pointer()) && (other.is_arithmetic() || other.is_pointer())
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(self, CType::Int(_) | CType::Bool)
    }

    pub fn is_integer(&self) -> bool {
        self.is_arithmetic()
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, CType::Int(_) | CType::Bool | CType::Pointer(_))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, CType::Pointer(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, CType::Array(_, _))
    }

    pub fn is_function(&self) -> bool {
        matches!(self, CType::Function { .. })
    }

    pub fn is_void(&self) -> bool {
        matches!(self, CType::Void)
    }

    pub fn is_void_pointer(&self) -> bool {
        match self {
            CType::Pointer(inner) => inner.t.is_void(),
            _ => false,
        }
    }

    pub fn is_struct_or_union(&self) -> bool {
        matches!(self, CType::Struct(_) | CType::Union(_))
    }

    pub fn get_anon_struct_or_union_id(&self) -> Option<&TypeIdentifier> {
        match self {
            CType::Struct(id @ TypeIdentifier::Anon(_))
            | CType::Union(id @ TypeIdentifier::Anon(_)) => Some(id),
            _ => None,
        }
    }

    /**
     * Do the integer type promotion.
     */
    pub fn promote(self, model: &DataModel) -> Self {
        match self {
            CType::Bool => INT_TYPE,
            CType::Int(kind) if kind.rank() < IntKind::Int.rank() => {
                let size = kind.size(model);
                if size < model.int_size || (size == model.int_size && kind.is_signed(model)) {
                    INT_TYPE
                } else {
                    UINT_TYPE
                }
            }
            x => x,
        }
    }

    /**
     * Find a common type for two integer types. Use to perform usual arithmetic conversion.
     *
     * Both types must be already promoted.
     */
    pub fn least_common_int_type(&self, other: &Self, model: &DataModel) -> Self {
        let (lhs, rhs) = match (self, other) {
            (CType::Int(l), CType::Int(r)) => (*l, *r),
            _ => return INT_TYPE,
        };
        let lhs_sign = lhs.is_signed(model);
        let rhs_sign = rhs.is_signed(model);
        if lhs == rhs {
            CType::Int(lhs)
        } else if lhs_sign == rhs_sign {
            // Otherwise, if both operands have signed integer types or both have unsigned integer types,
            // the operand with the type of lesser integer conversion rank is converted to the type
            // of the operand with greater rank.
            if lhs.rank() >= rhs.rank() {
                CType::Int(lhs)
            } else {
                CType::Int(rhs)
            }
        } else {
            let (signed, unsigned) = if lhs_sign { (lhs, rhs) } else { (rhs, lhs) };
            if unsigned.rank() >= signed.rank() {
                CType::Int(unsigned)
            } else if signed.size(model) > unsigned.size(model) {
                CType::Int(signed)
            } else {
                CType::Int(signed.to_unsigned())
            }
        }
    }

    /**
     * Size in bytes. Objects larger than the target's `PTRDIFF_MAX` are diagnosed.
     */
    pub fn sizeof(&self, reg: &TypeRegistry, span: Span, ec: &mut ErrorCollector) -> Result<u64, ()> {
        let model = reg.model();
        match self {
            CType::Void | CType::Function { .. } => {
                ec.record_warning(CompileWarning::InvalidSizeof, span)?;
                Ok(1)
            }
            CType::Bool => Ok(model.bool_size as u64),
            CType::Int(kind) => Ok(kind.size(model) as u64),
            CType::Pointer(_) => Ok(model.ptr_size as u64),
            CType::Array(t, Some(n)) => {
                let size = t.t.sizeof(reg, span, ec)?.checked_mul(*n);
                reg.check_object_size(size, self, span, ec)
            }
            CType::Array(_, None) => {
                ec.record_error(CompileError::IncompleteType(format!("{}", self)), span)?;
                unreachable!()
            }
            CType::Struct(id) | CType::Union(id) => match reg.get_struct_union(id) {
                Some(su) if su.is_complete() => su.sizeof(reg, span, ec),
                _ => {
                    ec.record_error(CompileError::IncompleteType(format!("{}", self)), span)?;
                    unreachable!()
                }
            },
        }
    }

    /**
     * Natural alignment of a type, capped by the target's maximum alignment.
     */
    pub fn alignof(&self, reg: &TypeRegistry, span: Span, ec: &mut ErrorCollector) -> Result<u32, ()> {
        let model = reg.model();
        let max_align = model.max_align as u32;
        match self {
            CType::Void | CType::Function { .. } => Ok(1),
            CType::Bool => Ok(std::cmp::min(model.bool_size as u32, max_align)),
            CType::Int(kind) => Ok(std::cmp::min(kind.size(model) as u32, max_align)),
            CType::Pointer(_) => Ok(std::cmp::min(model.ptr_size as u32, max_align)),
            CType::Array(t, _) => t.t.alignof(reg, span, ec),
            CType::Struct(id) | CType::Union(id) => match reg.get_struct_union(id) {
                Some(su) if su.is_complete() => su.alignof(reg, span, ec),
                _ => {
                    ec.record_error(CompileError::IncompleteType(format!("{}", self)), span)?;
                    unreachable!()
                }
            },
        }
    }

    pub fn is_complete(&self, reg: &TypeRegistry) -> bool {
        match self {
            CType::Void => false,
            CType::Array(t, n) => n.is_some() && t.t.is_complete(reg),
            CType::Struct(id) | CType::Union(id) => reg
                .get_struct_union(id)
                .map(|su| su.is_complete())
                .unwrap_or(false),
            _ => true,
        }
    }

    pub fn dereference(self) -> Result<QualifiedType, Self> {
        match self {
            CType::Pointer(t) => Ok(*t),
            CType::Array(t, _) => Ok(*t),
            _ => Err(self),
        }
    }
}

impl std::fmt::Display for IntKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        f.write_str(match self {
            IntKind::Char => "char",
            IntKind::SChar => "signed char",
            IntKind::UChar => "unsigned char",
            IntKind::Short => "short",
            IntKind::UShort => "unsigned short",
            IntKind::Int => "int",
            IntKind::UInt => "unsigned int",
            IntKind::Long => "long",
            IntKind::ULong => "unsigned long",
            IntKind::LLong => "long long",
            IntKind::ULLong => "unsigned long long",
        })
    }
}

impl std::fmt::Display for StructUnionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            StructUnionKind::Struct => f.write_str("struct"),
            StructUnionKind::Union => f.write_str("union"),
        }
    }
}

impl std::fmt::Display for TypeIdentifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            TypeIdentifier::Anon(_) => f.write_str("<anonymous>"),
            TypeIdentifier::Named(name) => f.write_str(name),
        }
    }
}

impl std::fmt::Display for CType {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        use CType::*;
        match self {
            Void => f.write_str("void"),
            Bool => f.write_str("_Bool"),
            Int(kind) => write!(f, "{}", kind),
            Pointer(inner) => write!(f, "{} *", inner),
            Array(inner, None) => write!(f, "{} []", inner),
            Array(inner, Some(n)) => write!(f, "{} [{}]", inner, n),
            Struct(id) => write!(f, "struct {}", id),
            Union(id) => write!(f, "union {}", id),
            Function {
                result,
                args,
                vararg,
            } => write!(
                f,
                "(fn ({}{}) -> {})",
                args,
                if *vararg { ", ..." } else { "" },
                result
            ),
        }
    }
}

impl std::fmt::Display for FunctionArgs {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            FunctionArgs::Empty => Ok(()),
            FunctionArgs::Void => f.write_str("void"),
            FunctionArgs::List(l) => {
                let args: Vec<String> = l.iter().map(|t| format!("{}", t)).collect();
                f.write_str(&args.join(", "))
            }
        }
    }
}

impl std::fmt::Display for QualifiedType {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        if !self.qualifiers.is_empty() {
            write!(f, "{}{}", self.qualifiers, self.t)
        } else {
            write!(f, "{}", self.t)
        }
    }
}

impl std::fmt::Display for Qualifiers {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        if self.contains(Qualifiers::CONST) {
            f.write_str("const ")?;
        }
        if self.contains(Qualifiers::VOLATILE) {
            f.write_str("volatile ")?;
        }
        if self.contains(Qualifiers::ATOMIC) {
            f.write_str("_Atomic ")?;
        }
        if self.contains(Qualifiers::RESTRICT) {
            f.write_str("restrict ")?;
        }
        Ok(())
    }
}
