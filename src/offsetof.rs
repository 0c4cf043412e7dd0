use lang_c::ast::{OffsetMember, OffsetOfExpression};
use lang_c::span::Node;

use crate::constant::compute_integer_constant;
use crate::ctype::CType;
use crate::error::CompileError;
use crate::type_registry::TypeRegistry;
use crate::{type_builder, ErrorCollector};

/**
 * Byte offset designated by `__builtin_offsetof(type, designator)`.
 *
 * The designator is a member name followed by any number of `.member`
 * and `[index]` steps. Indices may be negative, so the result is signed.
 */
pub fn compute_offsetof(
    node: &Node<OffsetOfExpression>,
    reg: &mut TypeRegistry,
    ec: &mut ErrorCollector,
) -> Result<i128, ()> {
    let t = type_builder::build_type_from_ast_type_name(&node.node.type_name, reg, ec)?;

    let designator = &node.node.designator.node;
    let (offset, mut t) = t.get_field(&designator.base.node.name, reg, designator.base.span, ec)?;
    let mut offset = offset as i128;
    for d in designator.members.iter() {
        match &d.node {
            OffsetMember::Member(id) => {
                let (new_offset, new_t) = t.get_field(&id.node.name, reg, id.span, ec)?;
                offset += new_offset as i128;
                t = new_t;
            }
            OffsetMember::Index(e) => {
                let el_type = match t.t {
                    CType::Array(el_type, _) => *el_type,
                    _ => {
                        ec.record_error(
                            CompileError::BadTypesForOperator("[]".to_string()),
                            d.span,
                        )?;
                        unreachable!()
                    }
                };
                let el_size = el_type.t.sizeof(reg, e.span, ec)? as i128;
                let index = compute_integer_constant(e, reg, ec)?;
                offset = offset.wrapping_add(index.wrapping_mul(el_size));
                t = el_type;
            }
            OffsetMember::IndirectMember(_) => {
                ec.record_error(CompileError::NonConstInConstExpr, d.span)?;
                unreachable!()
            }
        }
    }
    Ok(offset)
}
