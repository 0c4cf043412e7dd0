use lang_c::ast::IntegerSuffix;
use lang_c::span::Span;

use crate::{
    ctype::{self, CType, IntKind, QualifiedType},
    error::{CompileError, CompileWarning, ErrorCollector},
    machine::DataModel,
    utils,
};

/**
 * Identity of a file-scope object. Addresses of distinct objects never compare equal.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressBase {
    Null,
    Object(ObjectId),
}

/**
 * An address constant: a base plus a byte offset.
 *
 * Null-based addresses are what `((T*)0)->member` produces, their offset is
 * the integer the address converts to.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Address {
    pub base: AddressBase,
    pub offset: i128,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Void,
    Int(i128),
    Address(Address),
}

/**
 * Represents a constant value with given type.
 *
 * Invariants: integer and `_Bool` types hold `Value::Int` that fits into the type,
 * pointer types hold `Value::Address`.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValue {
    pub t: QualifiedType,
    pub val: Value,
}

impl Address {
    pub fn null() -> Self {
        Self {
            base: AddressBase::Null,
            offset: 0,
        }
    }

    pub fn of_object(id: ObjectId) -> Self {
        Self {
            base: AddressBase::Object(id),
            offset: 0,
        }
    }

    pub fn is_null(&self) -> bool {
        self.base == AddressBase::Null && self.offset == 0
    }

    pub fn add_offset(self, delta: i128) -> Self {
        Self {
            offset: self.offset.wrapping_add(delta),
            ..self
        }
    }
}

impl TypedValue {
    pub fn new_integer(value: i128, t: CType, model: &DataModel) -> Self {
        Self {
            t: QualifiedType::new(t),
            val: Value::Int(value),
        }
        .clamp_to_type(model)
    }

    pub fn new_address(address: Address, t: QualifiedType) -> Self {
        Self {
            t,
            val: Value::Address(address),
        }
    }

    pub fn new_void() -> Self {
        Self {
            t: QualifiedType::new(CType::Void),
            val: Value::Void,
        }
    }

    /**
     * Construct an integer constant according to 6.4.4.1
     */
    pub fn new_from_int_literal(
        n: u128,
        suffix: &IntegerSuffix,
        is_decimal: bool,
        model: &DataModel,
    ) -> Self {
        use lang_c::ast::IntegerSize;
        use IntKind::*;
        let candidates: &[IntKind] = match (suffix.unsigned, &suffix.size, is_decimal) {
            (false, IntegerSize::Int, true) => &[Int, Long, LLong],
            (false, IntegerSize::Int, false) => &[Int, UInt, Long, ULong, LLong, ULLong],
            (true, IntegerSize::Int, _) => &[UInt, ULong, ULLong],
            (false, IntegerSize::Long, true) => &[Long, LLong],
            (false, IntegerSize::Long, false) => &[Long, ULong, LLong, ULLong],
            (true, IntegerSize::Long, _) => &[ULong, ULLong],
            (false, IntegerSize::LongLong, true) => &[LLong],
            (false, IntegerSize::LongLong, false) => &[LLong, ULLong],
            (true, IntegerSize::LongLong, _) => &[ULLong],
        };
        // too large for every candidate: take the widest unsigned type and wrap
        let kind = candidates
            .iter()
            .copied()
            .find(|kind| n <= kind.max_value(model) as u128)
            .unwrap_or(ULLong);
        Self::new_integer(n as i128, CType::Int(kind), model)
    }

    /**
     * Parse a character constant as lang_c gives it: an optional prefix and the quoted text.
     *
     * Plain constants have type `int`, `L` ones have type `wchar_t`.
     */
    pub fn new_from_char_literal(s: &str, model: &DataModel) -> Result<Self, String> {
        let (prefix, quoted) = match s.find('\'') {
            Some(pos) => s.split_at(pos),
            None => return Err(format!("no quote in `{}'", s)),
        };
        let body = quoted
            .strip_prefix('\'')
            .and_then(|s| s.strip_suffix('\''))
            .ok_or_else(|| format!("unterminated constant `{}'", s))?;
        let mut it = body.chars().peekable();
        let code = parse_single_char(&mut it)?;
        if it.peek().is_some() {
            return Err("multi-character constant".to_string());
        }
        match prefix {
            "" => {
                // the char value is converted to int, so '\xff' is negative if char is signed
                let c = utils::wrap_to_width(code as i128, 1, model.char_signed);
                Ok(Self::new_integer(c, ctype::INT_TYPE, model))
            }
            "L" => Ok(Self::new_integer(
                code as i128,
                CType::Int(model.wchar_type),
                model,
            )),
            "u" => Ok(Self::new_integer(code as i128, ctype::USHORT_TYPE, model)),
            "U" => {
                let t = if model.int_size >= 4 {
                    ctype::UINT_TYPE
                } else {
                    ctype::ULONG_TYPE
                };
                Ok(Self::new_integer(code as i128, t, model))
            }
            _ => Err(format!("unknown prefix `{}'", prefix)),
        }
    }

    /**
     * Do the integer type promotion.
     */
    pub fn promote(self, model: &DataModel) -> Self {
        if !self.t.t.is_integer() {
            return self;
        }
        let t = self.t.t.clone().promote(model);
        Self {
            t: QualifiedType::new(t),
            ..self
        }
        .clamp_to_type(model)
    }

    /**
     * Perform usual arithmetic conversions according to 6.3.1.8
     */
    pub fn usual_arithmetic_convert(lhs: Self, rhs: Self, model: &DataModel) -> (Self, Self) {
        let lhs = lhs.promote(model);
        let rhs = rhs.promote(model);
        if lhs.t.t == rhs.t.t {
            // If both operands have the same type, then no further conversion is needed.
            return (lhs, rhs);
        }
        let common_type = lhs.t.t.least_common_int_type(&rhs.t.t, model);
        (
            Self {
                t: QualifiedType::new(common_type.clone()),
                ..lhs
            }
            .clamp_to_type(model),
            Self {
                t: QualifiedType::new(common_type),
                ..rhs
            }
            .clamp_to_type(model),
        )
    }

    /**
     * Drop extra bits which don't fit into the target type (ensure the TypedValue invariant).
     */
    pub fn clamp_to_type(self, model: &DataModel) -> Self {
        match (&self.t.t, &self.val) {
            (CType::Bool, Value::Int(x)) => Self {
                val: Value::Int(if *x == 0 { 0 } else { 1 }),
                ..self
            },
            (CType::Int(kind), Value::Int(x)) => Self {
                val: Value::Int(utils::wrap_to_width(
                    *x,
                    kind.size(model),
                    kind.is_signed(model),
                )),
                ..self
            },
            (CType::Pointer(_), Value::Address(a)) => {
                let offset = match a.base {
                    AddressBase::Null => utils::wrap_to_width(a.offset, model.ptr_size, false),
                    AddressBase::Object(_) => a.offset,
                };
                Self {
                    val: Value::Address(Address { offset, ..*a }),
                    ..self
                }
            }
            _ => self,
        }
    }

    pub fn unwrap_integer(&self) -> i128 {
        if let Value::Int(x) = self.val {
            x
        } else {
            panic!("not an integer")
        }
    }

    pub fn unwrap_address(&self) -> Address {
        if let Value::Address(a) = self.val {
            a
        } else {
            panic!("not an address")
        }
    }

    pub fn is_zero(&self) -> bool {
        match &self.val {
            Value::Int(x) => *x == 0,
            Value::Address(a) => a.is_null(),
            Value::Void => false,
        }
    }

    /**
     * An integer constant with value 0, or such a constant cast to `void *`.
     */
    pub fn is_null_pointer_constant(&self) -> bool {
        (self.t.t.is_integer() || self.t.t.is_void_pointer()) && self.is_zero()
    }

    pub fn negate(self, model: &DataModel) -> Self {
        let x = self.unwrap_integer();
        Self {
            val: Value::Int(-x),
            ..self
        }
        .clamp_to_type(model)
    }

    pub fn complement(self, model: &DataModel) -> Self {
        let x = self.unwrap_integer();
        Self {
            val: Value::Int(!x),
            ..self
        }
        .clamp_to_type(model)
    }

    pub fn boolean_not(self, model: &DataModel) -> Self {
        let r = if self.is_zero() { 1 } else { 0 };
        Self::new_integer(r, ctype::INT_TYPE, model)
    }

    /**
     * Explicit conversion, as done by a cast expression.
     */
    pub fn cast(
        self,
        new_type: &QualifiedType,
        model: &DataModel,
        span: Span,
        ec: &mut ErrorCollector,
    ) -> Result<Self, ()> {
        if !self.t.t.is_explicit_castable_to(&new_type.t) {
            ec.record_error(
                CompileError::BadCast(format!("{}", self.t), format!("{}", new_type)),
                span,
            )?;
            unreachable!()
        }
        let val = match (&new_type.t, self.val) {
            (CType::Void, _) => Value::Void,
            (CType::Bool, val) => Value::Int(if Self::value_is_zero(&val) { 0 } else { 1 }),
            (CType::Int(_), Value::Int(x)) => Value::Int(x),
            (CType::Int(_), Value::Address(a)) => match a.base {
                AddressBase::Null => Value::Int(a.offset),
                AddressBase::Object(_) => {
                    ec.record_error(CompileError::NonConstInConstExpr, span)?;
                    unreachable!()
                }
            },
            (CType::Pointer(_), Value::Int(x)) => Value::Address(Address {
                base: AddressBase::Null,
                offset: x,
            }),
            (CType::Pointer(_), Value::Address(a)) => Value::Address(a),
            _ => {
                ec.record_error(
                    CompileError::BadCast(format!("{}", self.t), format!("{}", new_type)),
                    span,
                )?;
                unreachable!()
            }
        };
        Ok(Self {
            t: QualifiedType::new(new_type.t.clone()),
            val,
        }
        .clamp_to_type(model))
    }

    /**
     * Conversion as if by assignment (6.5.16.1): initializers of objects.
     */
    pub fn implicit_cast(
        self,
        target: &QualifiedType,
        model: &DataModel,
        span: Span,
        ec: &mut ErrorCollector,
    ) -> Result<Self, ()> {
        let src = &self.t.t;
        let dst = &target.t;
        if dst.is_arithmetic() && src.is_arithmetic() {
            self.cast(target, model, span, ec)
        } else if let CType::Bool = dst {
            if src.is_pointer() {
                self.cast(target, model, span, ec)
            } else {
                ec.record_error(CompileError::IncompatibleTypes(target.clone(), self.t), span)?;
                unreachable!()
            }
        } else if dst.is_pointer() && self.is_null_pointer_constant() {
            Ok(Self::new_address(Address::null(), QualifiedType::new(dst.clone())))
        } else if let (CType::Pointer(to), CType::Pointer(from)) = (dst, src) {
            if to.t.is_void() || from.t.is_void() || to.is_compatible_to(from, false) {
                self.cast(target, model, span, ec)
            } else {
                ec.record_error(CompileError::IncompatibleTypes(target.clone(), self.t), span)?;
                unreachable!()
            }
        } else if dst.is_integer() && src.is_pointer() {
            ec.record_warning(CompileWarning::PointerToInteger, span)?;
            self.cast(target, model, span, ec)
        } else {
            ec.record_error(CompileError::IncompatibleTypes(target.clone(), self.t), span)?;
            unreachable!()
        }
    }

    fn value_is_zero(val: &Value) -> bool {
        match val {
            Value::Int(x) => *x == 0,
            Value::Address(a) => a.is_null(),
            Value::Void => false,
        }
    }
}

fn parse_single_char(it: &mut std::iter::Peekable<std::str::Chars>) -> Result<u32, String> {
    let c = it.next().ok_or_else(|| "empty character constant".to_string())?;
    if c != '\\' {
        return Ok(c as u32);
    }
    let c = it.next().ok_or_else(|| "unexpected end of constant".to_string())?;
    let code = match c {
        '\'' | '"' | '\\' | '?' => c as u32,
        'a' => 7,
        'b' => 8,
        'f' => 0xc,
        'n' => 0xa,
        'r' => 0xd,
        't' => 9,
        'v' => 0xb,
        'x' => parse_code(it, 16, usize::MAX)?,
        'u' => parse_code(it, 16, 4)?,
        'U' => parse_code(it, 16, 8)?,
        '0'..='7' => {
            let first = c.to_digit(8).unwrap_or(0);
            let mut value = first;
            for _ in 0..2 {
                match it.peek().and_then(|c| c.to_digit(8)) {
                    Some(d) => {
                        value = value * 8 + d;
                        it.next();
                    }
                    None => break,
                }
            }
            value
        }
        _ => return Err(format!("bad escape sequence `\\{}'", c)),
    };
    Ok(code)
}

fn parse_code(
    it: &mut std::iter::Peekable<std::str::Chars>,
    base: u32,
    max_digits: usize,
) -> Result<u32, String> {
    let mut value: u32 = 0;
    let mut count = 0;
    while count < max_digits {
        match it.peek().and_then(|c| c.to_digit(base)) {
            Some(d) => {
                value = value
                    .checked_mul(base)
                    .and_then(|v| v.checked_add(d))
                    .ok_or_else(|| "escape sequence out of range".to_string())?;
                it.next();
                count += 1;
            }
            None => break,
        }
    }
    if count == 0 {
        Err("missing digits in escape sequence".to_string())
    } else {
        Ok(value)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Void => write!(f, "(void)"),
            Value::Int(x) => write!(f, "{}", x),
            Value::Address(a) => match a.base {
                AddressBase::Null => write!(f, "(null + {})", a.offset),
                AddressBase::Object(ObjectId(id)) => write!(f, "(&object{} + {})", id, a.offset),
            },
        }
    }
}

impl std::fmt::Display for TypedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}){}", self.t, self.val)
    }
}
