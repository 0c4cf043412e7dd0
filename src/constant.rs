use lang_c::ast::{
    BinaryOperator, BinaryOperatorExpression, CastExpression, ConditionalExpression, Constant,
    Expression, GenericAssociation, GenericSelection, Initializer, MemberExpression,
    MemberOperator, StaticAssert, UnaryOperator, UnaryOperatorExpression,
};
use lang_c::span::{Node, Span};

use crate::{
    ctype::{self, CType, QualifiedType, Qualifiers},
    error::{CompileError, CompileWarning, ErrorCollector},
    offsetof,
    type_builder,
    type_registry::TypeRegistry,
    value::{Address, AddressBase, TypedValue, Value},
};

/**
 * An object designated by an lvalue expression.
 * The address is known for everything a constant expression may designate.
 */
#[derive(Debug, Clone)]
struct TypedLValue {
    t: QualifiedType,
    address: Address,
}

pub fn compute_constant_initializer(
    initializer: &Node<Initializer>,
    reg: &mut TypeRegistry,
    ec: &mut ErrorCollector,
) -> Result<TypedValue, ()> {
    match &initializer.node {
        Initializer::Expression(expr) => compute_constant_expr(expr, reg, ec),
        Initializer::List(_) => {
            ec.record_error(
                CompileError::Unimplemented("initializer lists".to_string()),
                initializer.span,
            )?;
            unreachable!()
        }
    }
}

/**
 * Evaluate a constant expression: an integer constant expression,
 * an address constant or a null pointer constant.
 */
pub fn compute_constant_expr(
    expr: &Node<Expression>,
    reg: &mut TypeRegistry,
    ec: &mut ErrorCollector,
) -> Result<TypedValue, ()> {
    eval(expr, false, reg, ec)
}

pub fn compute_integer_constant(
    expr: &Node<Expression>,
    reg: &mut TypeRegistry,
    ec: &mut ErrorCollector,
) -> Result<i128, ()> {
    let val = compute_constant_expr(expr, reg, ec)?;
    if !val.t.t.is_integer() {
        ec.record_error(CompileError::IntegerTypeRequired, expr.span)?;
        unreachable!()
    }
    Ok(val.unwrap_integer())
}

pub fn check_static_assert(
    sa: &Node<StaticAssert>,
    reg: &mut TypeRegistry,
    ec: &mut ErrorCollector,
) -> Result<(), ()> {
    let expr_span = sa.node.expression.span;
    let val = compute_constant_expr(&sa.node.expression, reg, ec)?;
    if !val.t.t.is_integer() {
        ec.record_error(CompileError::IntegerTypeRequired, expr_span)?;
        unreachable!()
    }
    if val.is_zero() {
        let message: String = sa
            .node
            .message
            .node
            .iter()
            .map(|s| s.trim_start_matches(|c| c != '"').trim_matches('"'))
            .collect();
        ec.record_error(CompileError::StaticAssertionFailed(message), sa.span)?;
    }
    Ok(())
}

/**
 * Compute the value of an expression.
 *
 * In an unevaluated operand (the operand of `sizeof` or the branch not taken)
 * only the type matters, so reading objects is allowed and yields a placeholder.
 */
fn eval(
    expr: &Node<Expression>,
    unevaluated: bool,
    reg: &mut TypeRegistry,
    ec: &mut ErrorCollector,
) -> Result<TypedValue, ()> {
    let model = *reg.model();
    match &expr.node {
        Expression::Identifier(_) | Expression::Member(_) => {
            let lv = eval_lvalue(expr, unevaluated, reg, ec)?;
            lvalue_to_rvalue(lv, &expr.node, unevaluated, expr.span, ec)
        }
        Expression::Constant(c) => process_constant_node(c, reg, ec),
        Expression::StringLiteral(s) => {
            ec.record_error(
                CompileError::Unimplemented("string literals in constant expressions".to_string()),
                s.span,
            )?;
            unreachable!()
        }
        Expression::GenericSelection(g) => process_generic_selection_node(g, unevaluated, reg, ec),
        Expression::Call(node) => {
            ec.record_error(CompileError::CallsForbidden, node.span)?;
            unreachable!()
        }
        Expression::CompoundLiteral(node) => {
            ec.record_error(CompileError::NonConstInConstExpr, node.span)?;
            unreachable!()
        }
        Expression::SizeOfTy(node) => {
            let t = type_builder::build_type_from_ast_type_name(&node.node.0, reg, ec)?;
            let size = t.t.sizeof(reg, node.span, ec)?;
            Ok(size_value(size, reg))
        }
        Expression::SizeOfVal(node) => {
            let t = expression_type(&node.node.0, reg, ec)?;
            let size = t.t.sizeof(reg, node.span, ec)?;
            Ok(size_value(size, reg))
        }
        Expression::AlignOf(node) => {
            let t = type_builder::build_type_from_ast_type_name(&node.node.0, reg, ec)?;
            let align = t.t.alignof(reg, node.span, ec)?;
            Ok(size_value(align as u64, reg))
        }
        Expression::OffsetOf(node) => {
            let offset = offsetof::compute_offsetof(node, reg, ec)?;
            let size_t = CType::Int(reg.primitives().size);
            Ok(TypedValue::new_integer(offset, size_t, &model))
        }
        Expression::UnaryOperator(node) => match node.node.operator.node {
            UnaryOperator::Indirection => {
                let lv = eval_lvalue(expr, unevaluated, reg, ec)?;
                lvalue_to_rvalue(lv, &expr.node, unevaluated, expr.span, ec)
            }
            UnaryOperator::Address => {
                let lv = eval_lvalue(&node.node.operand, unevaluated, reg, ec)?;
                let mut t = lv.t;
                t.wrap_pointer(Qualifiers::empty());
                Ok(TypedValue::new_address(lv.address, t))
            }
            _ => process_unary_operator_expression_node(node, unevaluated, reg, ec),
        },
        Expression::Cast(c) => process_cast_expression_node(c, unevaluated, reg, ec),
        Expression::BinaryOperator(node) => match node.node.operator.node {
            BinaryOperator::Index => {
                let lv = eval_lvalue(expr, unevaluated, reg, ec)?;
                lvalue_to_rvalue(lv, &expr.node, unevaluated, expr.span, ec)
            }
            BinaryOperator::LogicalAnd | BinaryOperator::LogicalOr => {
                process_logical_expression_node(node, unevaluated, reg, ec)
            }
            _ => process_binary_operator_expression_node(node, unevaluated, reg, ec),
        },
        Expression::Conditional(c) => process_condition_expression_node(c, unevaluated, reg, ec),
        Expression::Comma(v) => {
            let mut last = None;
            for e in v.iter() {
                last = Some(eval(e, unevaluated, reg, ec)?);
            }
            match last {
                Some(val) => Ok(val.clamp_to_type(&model)),
                None => {
                    ec.record_error(CompileError::Syntax("empty expression".to_string()), expr.span)?;
                    unreachable!()
                }
            }
        }
        Expression::VaArg(node) => {
            ec.record_error(CompileError::NonConstInConstExpr, node.span)?;
            unreachable!()
        }
        Expression::Statement(node) => {
            ec.record_error(
                CompileError::Unimplemented("statement expressions".to_string()),
                node.span,
            )?;
            unreachable!()
        }
    }
}

fn size_value(size: u64, reg: &TypeRegistry) -> TypedValue {
    TypedValue::new_integer(size as i128, CType::Int(reg.primitives().size), reg.model())
}

fn is_lvalue_expression(expr: &Expression) -> bool {
    match expr {
        Expression::Identifier(_) | Expression::Member(_) => true,
        Expression::UnaryOperator(node) => node.node.operator.node == UnaryOperator::Indirection,
        Expression::BinaryOperator(node) => node.node.operator.node == BinaryOperator::Index,
        _ => false,
    }
}

/**
 * Type of the expression without evaluating it, as `sizeof` needs.
 * Arrays do not decay here.
 */
fn expression_type(
    expr: &Node<Expression>,
    reg: &mut TypeRegistry,
    ec: &mut ErrorCollector,
) -> Result<QualifiedType, ()> {
    if is_lvalue_expression(&expr.node) {
        Ok(eval_lvalue(expr, true, reg, ec)?.t)
    } else {
        Ok(eval(expr, true, reg, ec)?.t)
    }
}

fn eval_lvalue(
    expr: &Node<Expression>,
    unevaluated: bool,
    reg: &mut TypeRegistry,
    ec: &mut ErrorCollector,
) -> Result<TypedLValue, ()> {
    match &expr.node {
        Expression::Identifier(id) => {
            let obj = reg.get_object(&id.node.name, id.span, ec)?;
            Ok(TypedLValue {
                t: obj.t.clone(),
                address: Address::of_object(obj.id),
            })
        }
        Expression::Member(m) => process_member_expression_node(m, unevaluated, reg, ec),
        Expression::UnaryOperator(node) if node.node.operator.node == UnaryOperator::Indirection => {
            let ptr = eval(&node.node.operand, unevaluated, reg, ec)?;
            dereference(ptr, node.node.operand.span, ec)
        }
        Expression::BinaryOperator(node) if node.node.operator.node == BinaryOperator::Index => {
            // a[i] is *(a + i)
            let lhs = eval(&node.node.lhs, unevaluated, reg, ec)?;
            let rhs = eval(&node.node.rhs, unevaluated, reg, ec)?;
            let ptr = if lhs.t.t.is_pointer() && rhs.t.t.is_integer() {
                pointer_add(lhs, rhs.unwrap_integer(), reg, expr.span, ec)?
            } else if lhs.t.t.is_integer() && rhs.t.t.is_pointer() {
                pointer_add(rhs, lhs.unwrap_integer(), reg, expr.span, ec)?
            } else {
                ec.record_error(
                    CompileError::BadTypesForOperator("[]".to_string()),
                    expr.span,
                )?;
                unreachable!()
            };
            dereference(ptr, expr.span, ec)
        }
        Expression::StringLiteral(s) => {
            ec.record_error(
                CompileError::Unimplemented("string literals in constant expressions".to_string()),
                s.span,
            )?;
            unreachable!()
        }
        _ => {
            ec.record_error(CompileError::LValueRequired, expr.span)?;
            unreachable!()
        }
    }
}

fn process_member_expression_node(
    node: &Node<MemberExpression>,
    unevaluated: bool,
    reg: &mut TypeRegistry,
    ec: &mut ErrorCollector,
) -> Result<TypedLValue, ()> {
    let name = &node.node.identifier.node.name;
    let span = node.node.identifier.span;
    let aggregate = match node.node.operator.node {
        MemberOperator::Direct => eval_lvalue(&node.node.expression, unevaluated, reg, ec)?,
        MemberOperator::Indirect => {
            let ptr = eval(&node.node.expression, unevaluated, reg, ec)?;
            dereference(ptr, node.node.expression.span, ec)?
        }
    };
    let (offset, t) = aggregate.t.get_field(name, reg, span, ec)?;
    Ok(TypedLValue {
        t,
        address: aggregate.address.add_offset(offset as i128),
    })
}

fn dereference(ptr: TypedValue, span: Span, ec: &mut ErrorCollector) -> Result<TypedLValue, ()> {
    let address = match ptr.val {
        Value::Address(a) => a,
        _ => {
            ec.record_error(CompileError::PointerTypeRequired, span)?;
            unreachable!()
        }
    };
    match ptr.t.dereference() {
        Ok(t) => Ok(TypedLValue { t, address }),
        Err(_) => {
            ec.record_error(CompileError::PointerTypeRequired, span)?;
            unreachable!()
        }
    }
}

/**
 * Use an lvalue in a value context.
 *
 * Arrays and functions become addresses, anything else needs the stored
 * value, which is not known at compile time.
 */
fn lvalue_to_rvalue(
    lv: TypedLValue,
    expr: &Expression,
    unevaluated: bool,
    span: Span,
    ec: &mut ErrorCollector,
) -> Result<TypedValue, ()> {
    if lv.t.t.is_array() || lv.t.t.is_function() {
        return Ok(TypedValue::new_address(lv.address, lv.t.decay()));
    }
    if unevaluated {
        return Ok(placeholder(lv));
    }
    let error = if let Expression::Identifier(_) = expr {
        CompileError::VariablesForbidden
    } else {
        CompileError::NonConstInConstExpr
    };
    ec.record_error(error, span)?;
    unreachable!()
}

/// The stored value is never observed in an unevaluated operand.
fn placeholder(lv: TypedLValue) -> TypedValue {
    let t = QualifiedType::new(lv.t.t);
    let val = match &t.t {
        CType::Bool | CType::Int(_) => Value::Int(1),
        CType::Pointer(_) => Value::Address(lv.address),
        _ => Value::Void,
    };
    TypedValue { t, val }
}

fn process_constant_node(
    c: &Node<Constant>,
    reg: &TypeRegistry,
    ec: &mut ErrorCollector,
) -> Result<TypedValue, ()> {
    let model = reg.model();
    match &c.node {
        Constant::Integer(i) => {
            use lang_c::ast::IntegerBase;
            if i.suffix.imaginary {
                ec.record_error(
                    CompileError::Unimplemented("imaginary constants".to_string()),
                    c.span,
                )?;
                unreachable!()
            }
            let radix = match i.base {
                IntegerBase::Decimal => 10,
                IntegerBase::Octal => 8,
                IntegerBase::Hexadecimal => 16,
                IntegerBase::Binary => 2,
            };
            let num = match u128::from_str_radix(&i.number, radix) {
                Ok(num) if num <= u64::MAX as u128 => num,
                _ => {
                    ec.record_error(CompileError::IntegerConstantTooLarge, c.span)?;
                    unreachable!()
                }
            };
            Ok(TypedValue::new_from_int_literal(
                num,
                &i.suffix,
                radix == 10,
                model,
            ))
        }
        Constant::Float(_) => {
            ec.record_error(
                CompileError::Unimplemented("floating point constants".to_string()),
                c.span,
            )?;
            unreachable!()
        }
        Constant::Character(s) => match TypedValue::new_from_char_literal(s, model) {
            Ok(x) => Ok(x),
            Err(e) => {
                ec.record_error(CompileError::CharParseError(e), c.span)?;
                unreachable!()
            }
        },
    }
}

fn process_generic_selection_node(
    node: &Node<GenericSelection>,
    unevaluated: bool,
    reg: &mut TypeRegistry,
    ec: &mut ErrorCollector,
) -> Result<TypedValue, ()> {
    // the controlling expression undergoes lvalue conversion but is not evaluated
    let controlling = expression_type(&node.node.expression, reg, ec)?.decay();
    let controlling = QualifiedType::new(controlling.t);
    let mut default = None;
    for association in node.node.associations.iter() {
        match &association.node {
            GenericAssociation::Type(at) => {
                let t = type_builder::build_type_from_ast_type_name(&at.node.type_name, reg, ec)?;
                if controlling.is_compatible_to(&t, true) {
                    return eval(&at.node.expression, unevaluated, reg, ec);
                }
            }
            GenericAssociation::Default(e) => default = Some(e),
        }
    }
    match default {
        Some(e) => eval(e, unevaluated, reg, ec),
        None => {
            ec.record_error(
                CompileError::Unimplemented(format!(
                    "no _Generic association matches `{}'",
                    controlling
                )),
                node.span,
            )?;
            unreachable!()
        }
    }
}

fn process_condition_expression_node(
    node: &Node<ConditionalExpression>,
    unevaluated: bool,
    reg: &mut TypeRegistry,
    ec: &mut ErrorCollector,
) -> Result<TypedValue, ()> {
    let model = *reg.model();
    let cond_span = node.node.condition.span;
    let else_span = node.node.else_expression.span;
    let cond_val = eval(&node.node.condition, unevaluated, reg, ec)?;
    if !cond_val.t.t.is_scalar() {
        ec.record_error(CompileError::ScalarTypeRequired, cond_span)?;
        unreachable!()
    }
    let take_then = !cond_val.is_zero();
    let then_val = eval(&node.node.then_expression, unevaluated || !take_then, reg, ec)?;
    let else_val = eval(&node.node.else_expression, unevaluated || take_then, reg, ec)?;
    let choose = |then_val: TypedValue, else_val: TypedValue| {
        if take_then {
            then_val
        } else {
            else_val
        }
    };
    if then_val.t.t.is_arithmetic() && else_val.t.t.is_arithmetic() {
        let (then_val, else_val) = TypedValue::usual_arithmetic_convert(then_val, else_val, &model);
        Ok(choose(then_val, else_val))
    } else if then_val.t.t.is_void() && else_val.t.t.is_void() {
        Ok(TypedValue::new_void())
    } else if then_val.t.t.is_pointer() && else_val.is_null_pointer_constant() {
        let t = then_val.t.clone();
        let else_val = TypedValue::new_address(Address::null(), t.clone());
        Ok(choose(then_val, else_val))
    } else if else_val.t.t.is_pointer() && then_val.is_null_pointer_constant() {
        let t = else_val.t.clone();
        let then_val = TypedValue::new_address(Address::null(), t);
        Ok(choose(then_val, else_val))
    } else if then_val.t.t.is_void_pointer() && else_val.t.t.is_pointer() {
        let t = then_val.t.clone();
        Ok(choose(then_val, TypedValue { t, ..else_val }))
    } else if else_val.t.t.is_void_pointer() && then_val.t.t.is_pointer() {
        let t = else_val.t.clone();
        Ok(choose(TypedValue { t, ..then_val }, else_val))
    } else if then_val.t.is_compatible_to(&else_val.t, false) {
        Ok(choose(then_val, else_val))
    } else {
        ec.record_error(
            CompileError::IncompatibleTypes(then_val.t, else_val.t),
            else_span,
        )?;
        unreachable!()
    }
}

/**
 * `&&` and `||` evaluate the right operand only when the left one
 * doesn't decide the result.
 */
fn process_logical_expression_node(
    node: &Node<BinaryOperatorExpression>,
    unevaluated: bool,
    reg: &mut TypeRegistry,
    ec: &mut ErrorCollector,
) -> Result<TypedValue, ()> {
    let model = *reg.model();
    let is_and = node.node.operator.node == BinaryOperator::LogicalAnd;
    let lhs = eval(&node.node.lhs, unevaluated, reg, ec)?;
    if !lhs.t.t.is_scalar() {
        ec.record_error(CompileError::ScalarTypeRequired, node.node.lhs.span)?;
        unreachable!()
    }
    let lhs_true = !lhs.is_zero();
    let decided = if is_and { !lhs_true } else { lhs_true };
    let rhs = eval(&node.node.rhs, unevaluated || decided, reg, ec)?;
    if !rhs.t.t.is_scalar() {
        ec.record_error(CompileError::ScalarTypeRequired, node.node.rhs.span)?;
        unreachable!()
    }
    let r = if decided { lhs_true } else { !rhs.is_zero() };
    Ok(TypedValue::new_integer(r as i128, ctype::INT_TYPE, &model))
}

fn process_binary_operator_expression_node(
    node: &Node<BinaryOperatorExpression>,
    unevaluated: bool,
    reg: &mut TypeRegistry,
    ec: &mut ErrorCollector,
) -> Result<TypedValue, ()> {
    let model = *reg.model();
    let lhs_span = node.node.lhs.span;
    let rhs_span = node.node.rhs.span;
    let op = node.node.operator.node.clone();
    let op_span = node.node.operator.span;
    match op {
        BinaryOperator::Assign
        | BinaryOperator::AssignMultiply
        | BinaryOperator::AssignDivide
        | BinaryOperator::AssignModulo
        | BinaryOperator::AssignPlus
        | BinaryOperator::AssignMinus
        | BinaryOperator::AssignShiftLeft
        | BinaryOperator::AssignShiftRight
        | BinaryOperator::AssignBitwiseAnd
        | BinaryOperator::AssignBitwiseXor
        | BinaryOperator::AssignBitwiseOr => {
            ec.record_error(CompileError::AssignmentToConst, op_span)?;
            unreachable!()
        }
        _ => (),
    }
    let lhs = eval(&node.node.lhs, unevaluated, reg, ec)?;
    let rhs = eval(&node.node.rhs, unevaluated, reg, ec)?;
    match op {
        BinaryOperator::Plus => {
            if lhs.t.t.is_arithmetic() && rhs.t.t.is_arithmetic() {
                integer_op(|l, r, _| Ok(l.wrapping_add(r)), lhs, rhs, lhs_span, rhs_span, &model, ec)
            } else if lhs.t.t.is_pointer() && rhs.t.t.is_integer() {
                pointer_add(lhs, rhs.unwrap_integer(), reg, node.span, ec)
            } else if lhs.t.t.is_integer() && rhs.t.t.is_pointer() {
                pointer_add(rhs, lhs.unwrap_integer(), reg, node.span, ec)
            } else {
                ec.record_error(CompileError::BadTypesForOperator("+".to_string()), node.span)?;
                unreachable!()
            }
        }
        BinaryOperator::Minus => {
            if lhs.t.t.is_arithmetic() && rhs.t.t.is_arithmetic() {
                integer_op(|l, r, _| Ok(l.wrapping_sub(r)), lhs, rhs, lhs_span, rhs_span, &model, ec)
            } else if lhs.t.t.is_pointer() && rhs.t.t.is_integer() {
                let n = rhs.unwrap_integer();
                pointer_add(lhs, n.wrapping_neg(), reg, node.span, ec)
            } else if lhs.t.t.is_pointer() && rhs.t.t.is_pointer() {
                pointer_difference(lhs, rhs, unevaluated, reg, node.span, ec)
            } else {
                ec.record_error(CompileError::BadTypesForOperator("-".to_string()), node.span)?;
                unreachable!()
            }
        }
        BinaryOperator::Multiply => integer_op(
            |l, r, _| Ok(l.wrapping_mul(r)),
            lhs,
            rhs,
            lhs_span,
            rhs_span,
            &model,
            ec,
        ),
        BinaryOperator::Divide => integer_op(
            |l, r, ec| {
                if r != 0 {
                    Ok(l.wrapping_div(r))
                } else if unevaluated {
                    Ok(0)
                } else {
                    ec.record_error(CompileError::DivisionByZero, rhs_span)?;
                    unreachable!()
                }
            },
            lhs,
            rhs,
            lhs_span,
            rhs_span,
            &model,
            ec,
        ),
        BinaryOperator::Modulo => integer_op(
            |l, r, ec| {
                if r != 0 {
                    Ok(l.wrapping_rem(r))
                } else if unevaluated {
                    Ok(0)
                } else {
                    ec.record_error(CompileError::DivisionByZero, rhs_span)?;
                    unreachable!()
                }
            },
            lhs,
            rhs,
            lhs_span,
            rhs_span,
            &model,
            ec,
        ),
        BinaryOperator::ShiftLeft | BinaryOperator::ShiftRight => {
            if lhs.t.t.is_integer() && rhs.t.t.is_integer() {
                let lhs = lhs.promote(&model);
                let rhs = rhs.promote(&model);
                let lhs_val = lhs.unwrap_integer();
                let rhs_val = rhs.unwrap_integer();
                if rhs_val < 0 {
                    ec.record_warning(CompileWarning::ShiftByNegative, rhs_span)?;
                }
                let amount = rhs_val.clamp(0, 127) as u32;
                let r = if op == BinaryOperator::ShiftLeft {
                    lhs_val << amount
                } else {
                    lhs_val >> amount
                };
                Ok(TypedValue::new_integer(r, lhs.t.t, &model))
            } else {
                let span = if !lhs.t.t.is_integer() {
                    lhs_span
                } else {
                    rhs_span
                };
                ec.record_error(CompileError::IntegerTypeRequired, span)?;
                unreachable!()
            }
        }
        BinaryOperator::Less => {
            let r = compare(lhs, rhs, false, node.span, &model, ec)?;
            Ok(TypedValue::new_integer((r < 0) as i128, ctype::INT_TYPE, &model))
        }
        BinaryOperator::Greater => {
            let r = compare(lhs, rhs, false, node.span, &model, ec)?;
            Ok(TypedValue::new_integer((r > 0) as i128, ctype::INT_TYPE, &model))
        }
        BinaryOperator::LessOrEqual => {
            let r = compare(lhs, rhs, false, node.span, &model, ec)?;
            Ok(TypedValue::new_integer((r <= 0) as i128, ctype::INT_TYPE, &model))
        }
        BinaryOperator::GreaterOrEqual => {
            let r = compare(lhs, rhs, false, node.span, &model, ec)?;
            Ok(TypedValue::new_integer((r >= 0) as i128, ctype::INT_TYPE, &model))
        }
        BinaryOperator::Equals => {
            let r = compare(lhs, rhs, true, node.span, &model, ec)?;
            Ok(TypedValue::new_integer((r == 0) as i128, ctype::INT_TYPE, &model))
        }
        BinaryOperator::NotEquals => {
            let r = compare(lhs, rhs, true, node.span, &model, ec)?;
            Ok(TypedValue::new_integer((r != 0) as i128, ctype::INT_TYPE, &model))
        }
        BinaryOperator::BitwiseAnd => {
            integer_op(|l, r, _| Ok(l & r), lhs, rhs, lhs_span, rhs_span, &model, ec)
        }
        BinaryOperator::BitwiseXor => {
            integer_op(|l, r, _| Ok(l ^ r), lhs, rhs, lhs_span, rhs_span, &model, ec)
        }
        BinaryOperator::BitwiseOr => {
            integer_op(|l, r, _| Ok(l | r), lhs, rhs, lhs_span, rhs_span, &model, ec)
        }
        _ => unreachable!(),
    }
}

/**
 * Advance a pointer by `n` elements.
 */
fn pointer_add(
    ptr: TypedValue,
    n: i128,
    reg: &TypeRegistry,
    span: Span,
    ec: &mut ErrorCollector,
) -> Result<TypedValue, ()> {
    let element_size = match &ptr.t.t {
        CType::Pointer(inner) => inner.t.sizeof(reg, span, ec)? as i128,
        _ => {
            ec.record_error(CompileError::PointerTypeRequired, span)?;
            unreachable!()
        }
    };
    let address = ptr.unwrap_address().add_offset(n.wrapping_mul(element_size));
    Ok(TypedValue::new_address(address, ptr.t).clamp_to_type(reg.model()))
}

/**
 * Subtract two pointers into the same object, the result has type `ptrdiff_t`.
 */
fn pointer_difference(
    lhs: TypedValue,
    rhs: TypedValue,
    unevaluated: bool,
    reg: &TypeRegistry,
    span: Span,
    ec: &mut ErrorCollector,
) -> Result<TypedValue, ()> {
    let ptrdiff = CType::Int(reg.primitives().ptrdiff);
    let (l_inner, r_inner) = match (&lhs.t.t, &rhs.t.t) {
        (CType::Pointer(l), CType::Pointer(r)) => (l, r),
        _ => unreachable!(),
    };
    if !l_inner.is_compatible_to(r_inner, false) {
        ec.record_error(CompileError::IncompatibleTypes(lhs.t.clone(), rhs.t.clone()), span)?;
        unreachable!()
    }
    let element_size = l_inner.t.sizeof(reg, span, ec)? as i128;
    let l = lhs.unwrap_address();
    let r = rhs.unwrap_address();
    if l.base != r.base {
        if unevaluated {
            return Ok(TypedValue::new_integer(0, ptrdiff, reg.model()));
        }
        ec.record_error(CompileError::NonConstInConstExpr, span)?;
        unreachable!()
    }
    let diff = (l.offset - r.offset) / element_size.max(1);
    Ok(TypedValue::new_integer(diff, ptrdiff, reg.model()))
}

/**
 * Common method for relation operators.
 *
 * Returns -1, 0, 1. Addresses of different objects are unequal, but
 * ordering them is not a constant.
 */
fn compare(
    lhs: TypedValue,
    rhs: TypedValue,
    equality: bool,
    span: Span,
    model: &crate::machine::DataModel,
    ec: &mut ErrorCollector,
) -> Result<isize, ()> {
    if lhs.t.t.is_arithmetic() && rhs.t.t.is_arithmetic() {
        let (lhs, rhs) = TypedValue::usual_arithmetic_convert(lhs, rhs, model);
        let lhs = lhs.unwrap_integer();
        let rhs = rhs.unwrap_integer();
        return Ok(ordering_to_isize(lhs.cmp(&rhs)));
    }
    let (lhs, rhs) = if equality && lhs.t.t.is_pointer() && rhs.is_null_pointer_constant() {
        let t = lhs.t.clone();
        (lhs, TypedValue::new_address(Address::null(), t))
    } else if equality && rhs.t.t.is_pointer() && lhs.is_null_pointer_constant() {
        let t = rhs.t.clone();
        (TypedValue::new_address(Address::null(), t), rhs)
    } else {
        (lhs, rhs)
    };
    match (&lhs.t.t, &rhs.t.t) {
        (CType::Pointer(l), CType::Pointer(r)) => {
            let void_involved = equality && (l.t.is_void() || r.t.is_void());
            if !void_involved && !l.is_compatible_to(r, false) {
                ec.record_warning(
                    CompileWarning::DistinctPointerComparison(lhs.t.clone(), rhs.t.clone()),
                    span,
                )?;
            }
            let l = lhs.unwrap_address();
            let r = rhs.unwrap_address();
            if l.base == r.base {
                Ok(ordering_to_isize(l.offset.cmp(&r.offset)))
            } else if equality {
                Ok(1)
            } else if l.base == AddressBase::Null || r.base == AddressBase::Null {
                // objects live above the null address
                Ok(if l.base == AddressBase::Null { -1 } else { 1 })
            } else {
                ec.record_error(CompileError::NonConstInConstExpr, span)?;
                unreachable!()
            }
        }
        _ => {
            ec.record_error(CompileError::CannotCompare(lhs.t, rhs.t), span)?;
            unreachable!()
        }
    }
}

fn ordering_to_isize(o: std::cmp::Ordering) -> isize {
    match o {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
    }
}

/**
 * Common method for integer arithmetic operations.
 */
fn integer_op<F>(
    f: F,
    lhs: TypedValue,
    rhs: TypedValue,
    lhs_span: Span,
    rhs_span: Span,
    model: &crate::machine::DataModel,
    ec: &mut ErrorCollector,
) -> Result<TypedValue, ()>
where
    F: FnOnce(i128, i128, &mut ErrorCollector) -> Result<i128, ()>,
{
    if lhs.t.t.is_integer() && rhs.t.t.is_integer() {
        let (lhs, rhs) = TypedValue::usual_arithmetic_convert(lhs, rhs, model);
        let lhs_val = lhs.unwrap_integer();
        let rhs_val = rhs.unwrap_integer();
        let r = f(lhs_val, rhs_val, ec)?;
        Ok(TypedValue::new_integer(r, lhs.t.t, model))
    } else {
        let span = if !lhs.t.t.is_integer() {
            lhs_span
        } else {
            rhs_span
        };
        ec.record_error(CompileError::IntegerTypeRequired, span)?;
        unreachable!()
    }
}

fn process_unary_operator_expression_node(
    node: &Node<UnaryOperatorExpression>,
    unevaluated: bool,
    reg: &mut TypeRegistry,
    ec: &mut ErrorCollector,
) -> Result<TypedValue, ()> {
    let model = *reg.model();
    let op = &node.node.operator.node;
    let span = node.node.operator.span;
    match op {
        UnaryOperator::PostIncrement
        | UnaryOperator::PostDecrement
        | UnaryOperator::PreIncrement
        | UnaryOperator::PreDecrement => {
            ec.record_error(CompileError::AssignmentToConst, span)?;
            unreachable!()
        }
        _ => (),
    }
    let val = eval(&node.node.operand, unevaluated, reg, ec)?;
    match op {
        UnaryOperator::Plus => {
            if !val.t.t.is_arithmetic() {
                ec.record_error(CompileError::ArithmeticTypeRequired, span)?;
                unreachable!()
            }
            Ok(val.promote(&model))
        }
        UnaryOperator::Minus => {
            if !val.t.t.is_arithmetic() {
                ec.record_error(CompileError::ArithmeticTypeRequired, span)?;
                unreachable!();
            }
            Ok(val.promote(&model).negate(&model))
        }
        UnaryOperator::Complement => {
            if !val.t.t.is_integer() {
                ec.record_error(CompileError::IntegerTypeRequired, span)?;
                unreachable!();
            }
            Ok(val.promote(&model).complement(&model))
        }
        UnaryOperator::Negate => {
            if !val.t.t.is_scalar() {
                ec.record_error(CompileError::ScalarTypeRequired, span)?;
                unreachable!();
            }
            Ok(val.boolean_not(&model))
        }
        // handled by the caller
        _ => unreachable!(),
    }
}

fn process_cast_expression_node(
    c: &Node<CastExpression>,
    unevaluated: bool,
    reg: &mut TypeRegistry,
    ec: &mut ErrorCollector,
) -> Result<TypedValue, ()> {
    let model = *reg.model();
    let new_type = type_builder::build_type_from_ast_type_name(&c.node.type_name, reg, ec)?;
    let value = eval(&c.node.expression, unevaluated, reg, ec)?;
    value.cast(&new_type, &model, c.span, ec)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::machine::Machine;
    use crate::test::util::parse_expression;

    fn eval_on(target: &str, expr: &str) -> (Result<TypedValue, ()>, ErrorCollector) {
        let machine = Machine::preset(target).unwrap();
        let mut reg = TypeRegistry::new(&machine);
        let mut ec = ErrorCollector::new();
        let node = parse_expression(expr);
        let r = compute_constant_expr(&node, &mut reg, &mut ec);
        (r, ec)
    }

    fn eval_int(expr: &str) -> i128 {
        let (r, ec) = eval_on("x86_64", expr);
        assert_eq!(ec.get_error_count(), 0);
        r.unwrap().unwrap_integer()
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval_int("1 + 2 * 3"), 7);
        assert_eq!(eval_int("(1 + 2) * 3"), 9);
        assert_eq!(eval_int("7 / 2"), 3);
        assert_eq!(eval_int("-7 % 3"), -1);
        assert_eq!(eval_int("1 << 4"), 16);
        assert_eq!(eval_int("~0"), -1);
        assert_eq!(eval_int("!5"), 0);
        assert_eq!(eval_int("3 > 2 ? 10 : 20"), 10);
        assert_eq!(eval_int("(1, 2)"), 2);
    }

    #[test]
    fn test_unsigned_wrap() {
        assert_eq!(eval_int("0u - 1"), u32::MAX as i128);
        assert_eq!(eval_int("-1 < 0u"), 0);
        assert_eq!(eval_int("(unsigned char)257"), 1);
    }

    #[test]
    fn test_greater_or_equal() {
        assert_eq!(eval_int("2 >= 1"), 1);
        assert_eq!(eval_int("1 >= 1"), 1);
        assert_eq!(eval_int("0 >= 1"), 0);
    }

    #[test]
    fn test_short_circuit() {
        assert_eq!(eval_int("0 && 1 / 0"), 0);
        assert_eq!(eval_int("1 || 1 / 0"), 1);
        assert_eq!(eval_int("1 ? 2 : 1 / 0"), 2);
    }

    #[test]
    fn test_division_by_zero() {
        let (r, ec) = eval_on("x86_64", "1 / 0");
        assert!(r.is_err());
        assert_eq!(ec.get_first_error().unwrap().0, CompileError::DivisionByZero);
    }

    #[test]
    fn test_sizeof_type() {
        let (r, _) = eval_on("x86_64", "sizeof(long)");
        let r = r.unwrap();
        assert_eq!(r.unwrap_integer(), 8);
        assert_eq!(r.t.t, CType::Int(ctype::IntKind::ULong));

        let (r, _) = eval_on("ccpu", "sizeof(long)");
        let r = r.unwrap();
        assert_eq!(r.unwrap_integer(), 4);
        assert_eq!(r.t.t, CType::Int(ctype::IntKind::UInt));
    }

    #[test]
    fn test_null_pointer() {
        assert_eq!(eval_int("(void*)0 == 0"), 1);
        assert_eq!(eval_int("(int*)0 == (void*)0"), 1);
        assert_eq!(eval_int("!(char*)0"), 1);
        assert_eq!(eval_int("(char*)0 + 4 == (char*)4"), 1);
    }

    #[test]
    fn test_null_member_address() {
        assert_eq!(
            eval_int("(unsigned long)&((struct { char a; int b; }*)0)->b"),
            4
        );
    }

    #[test]
    fn test_pointer_difference() {
        let (r, _) = eval_on("x86_64", "(int*)16 - (int*)4");
        let r = r.unwrap();
        assert_eq!(r.unwrap_integer(), 3);
        assert_eq!(r.t.t, CType::Int(ctype::IntKind::Long));
    }

    #[test]
    fn test_variables_forbidden() {
        let machine = Machine::preset("x86_64").unwrap();
        let mut reg = TypeRegistry::new(&machine);
        let mut ec = ErrorCollector::new();
        reg.declare(
            "x",
            QualifiedType::new(ctype::INT_TYPE),
            None,
            None,
            Span::none(),
            &mut ec,
        )
        .unwrap();
        let r = compute_constant_expr(&parse_expression("x + 1"), &mut reg, &mut ec);
        assert!(r.is_err());
        assert_eq!(ec.get_first_error().unwrap().0, CompileError::VariablesForbidden);

        let mut ec = ErrorCollector::new();
        let r = compute_constant_expr(&parse_expression("sizeof(x + 1)"), &mut reg, &mut ec);
        assert_eq!(r.unwrap().unwrap_integer(), 4);
        let r = compute_constant_expr(&parse_expression("&x != 0"), &mut reg, &mut ec);
        assert_eq!(r.unwrap().unwrap_integer(), 1);
    }

    #[test]
    fn test_generic() {
        assert_eq!(eval_int("_Generic(sizeof(int), unsigned long: 1, default: 0)"), 1);
        assert_eq!(eval_int("_Generic('a', char: 1, int: 2)"), 2);
    }
}
