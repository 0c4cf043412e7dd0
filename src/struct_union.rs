use std::collections::HashSet;

use lang_c::span::Span;

use crate::ctype::{CType, QualifiedType, StructUnionKind};
use crate::error::ErrorCollector;
use crate::type_registry::TypeRegistry;
use crate::utils;

#[derive(Debug, Clone)]
pub struct StructUnion {
    kind: StructUnionKind,
    members: Option<Vec<(Option<String>, QualifiedType)>>,
}

impl StructUnion {
    pub fn new(kind: StructUnionKind, members: Option<Vec<(Option<String>, QualifiedType)>>) -> Self {
        Self { kind, members }
    }

    pub fn new_struct(members: Option<Vec<(Option<String>, QualifiedType)>>) -> Self {
        Self::new(StructUnionKind::Struct, members)
    }

    /**
     * The largest member alignment, 1 for an empty struct.
     */
    pub fn alignof(&self, reg: &TypeRegistry, span: Span, ec: &mut ErrorCollector) -> Result<u32, ()> {
        let mut align = 1;
        for (_, t) in self.get_members() {
            align = num::integer::lcm(align, t.t.alignof(reg, span, ec)?);
        }
        Ok(align)
    }

    /**
     * Size including the tail padding up to the alignment.
     */
    pub fn sizeof(&self, reg: &TypeRegistry, span: Span, ec: &mut ErrorCollector) -> Result<u64, ()> {
        let size = match self.kind {
            StructUnionKind::Struct => self.sizeof_struct(reg, span, ec)?,
            StructUnionKind::Union => self.sizeof_union(reg, span, ec)?,
        };
        let align = self.alignof(reg, span, ec)? as u64;
        reg.check_object_size(Some(utils::align(size, align)), &self.kind, span, ec)
    }

    /**
     * Find a field by its name.
     *
     * Returns field offset and its type.
     * Returns `Ok(None)` if not found.
     * Returns `Err(())` on error (e.g. incomplete types).
     */
    pub fn get_field(
        &self,
        name: &str,
        reg: &TypeRegistry,
        span: Span,
        ec: &mut ErrorCollector,
    ) -> Result<Option<(u64, QualifiedType)>, ()> {
        match self.kind {
            StructUnionKind::Struct => self.get_field_struct(name, reg, span, ec),
            StructUnionKind::Union => self.get_field_union(name, reg, span, ec),
        }
    }

    pub fn get_kind(&self) -> StructUnionKind {
        self.kind
    }

    pub fn is_complete(&self) -> bool {
        self.members.is_some()
    }

    pub fn get_members(&self) -> &[(Option<String>, QualifiedType)] {
        self.members.as_deref().unwrap_or(&[])
    }

    /**
     * Make a set of member names.
     * Names from nested anonymous structs/unions are included recursively.
     */
    pub fn collect_member_names(&self, reg: &TypeRegistry) -> HashSet<String> {
        let mut result = HashSet::new();
        for (name, t) in self.get_members() {
            if let Some(name) = name.as_ref() {
                result.insert(name.to_string());
            } else if let Some(id) = t.t.get_anon_struct_or_union_id() {
                if let Some(nested) = reg.get_struct_union(id) {
                    result.extend(nested.collect_member_names(reg).into_iter());
                }
            }
        }
        result
    }

    // offsets never exceed the object size limit
    fn sizeof_struct(&self, reg: &TypeRegistry, span: Span, ec: &mut ErrorCollector) -> Result<u64, ()> {
        let mut size: u64 = 0;
        for (_, t) in self.get_members() {
            let align = t.t.alignof(reg, span, ec)? as u64;
            size = utils::align(size, align);
            let end = size.checked_add(member_size(&t.t, reg, span, ec)?);
            size = reg.check_object_size(end, &self.kind, span, ec)?;
        }
        Ok(size)
    }

    fn sizeof_union(&self, reg: &TypeRegistry, span: Span, ec: &mut ErrorCollector) -> Result<u64, ()> {
        let mut size = 0;
        for (_, t) in self.get_members() {
            size = std::cmp::max(size, member_size(&t.t, reg, span, ec)?);
        }
        Ok(size)
    }

    fn get_field_struct(
        &self,
        name: &str,
        reg: &TypeRegistry,
        span: Span,
        ec: &mut ErrorCollector,
    ) -> Result<Option<(u64, QualifiedType)>, ()> {
        let mut offset: u64 = 0;
        for (member_name, t) in self.get_members() {
            let align = t.t.alignof(reg, span, ec)? as u64;
            offset = utils::align(offset, align);
            if let Some(member_name) = member_name.as_ref() {
                if member_name == name {
                    return Ok(Some((offset, t.clone())));
                }
            } else if let Some(id) = t.t.get_anon_struct_or_union_id() {
                if let Some(nested) = reg.get_struct_union(id) {
                    if let Some((nested_offset, t)) = nested.get_field(name, reg, span, ec)? {
                        return Ok(Some((offset + nested_offset, t)));
                    }
                }
            }
            let end = offset.checked_add(member_size(&t.t, reg, span, ec)?);
            offset = reg.check_object_size(end, &self.kind, span, ec)?;
        }
        Ok(None)
    }

    fn get_field_union(
        &self,
        name: &str,
        reg: &TypeRegistry,
        span: Span,
        ec: &mut ErrorCollector,
    ) -> Result<Option<(u64, QualifiedType)>, ()> {
        for (member_name, t) in self.get_members() {
            if let Some(member_name) = member_name.as_ref() {
                if member_name == name {
                    return Ok(Some((0, t.clone())));
                }
            } else if let Some(id) = t.t.get_anon_struct_or_union_id() {
                if let Some(nested) = reg.get_struct_union(id) {
                    if let Some(r) = nested.get_field(name, reg, span, ec)? {
                        return Ok(Some(r));
                    }
                }
            }
        }
        Ok(None)
    }
}

/// A flexible array member takes no space.
fn member_size(t: &CType, reg: &TypeRegistry, span: Span, ec: &mut ErrorCollector) -> Result<u64, ()> {
    match t {
        CType::Array(_, None) => Ok(0),
        _ => t.sizeof(reg, span, ec),
    }
}

#[cfg(test)]
mod test {
    use crate::ctype::{self, CType, Qualifiers, TypeIdentifier};
    use crate::machine::{Machine, CCPU};

    use super::*;

    fn int_long() -> Vec<(Option<String>, QualifiedType)> {
        vec![
            (Some("x".to_string()), QualifiedType::new(ctype::INT_TYPE)),
            (Some("y".to_string()), QualifiedType::new(ctype::LONG_TYPE)),
        ]
    }

    fn ccpu() -> TypeRegistry {
        TypeRegistry::new(&Machine::new("ccpu", CCPU).unwrap())
    }

    fn x86_64() -> TypeRegistry {
        TypeRegistry::new(&Machine::preset("x86_64").unwrap())
    }

    #[test]
    fn test_align() {
        let mut su = StructUnion::new_struct(Some(int_long()));
        let ec = &mut ErrorCollector::new();
        let reg = ccpu();
        assert_eq!(su.alignof(&reg, Span::none(), ec), Ok(4)); // struct { int x; long y; };
        su.kind = StructUnionKind::Union;
        assert_eq!(su.alignof(&reg, Span::none(), ec), Ok(4)); // union { int x; long y; };
        let reg = x86_64();
        assert_eq!(su.alignof(&reg, Span::none(), ec), Ok(8));
    }

    #[test]
    fn test_sizeof() {
        let mut su = StructUnion::new_struct(Some(int_long()));
        let ec = &mut ErrorCollector::new();
        let reg = ccpu();
        assert_eq!(su.sizeof(&reg, Span::none(), ec), Ok(8)); // struct { int x; long y; };
        su.kind = StructUnionKind::Union;
        assert_eq!(su.sizeof(&reg, Span::none(), ec), Ok(4)); // union { int x; long y; };
        let reg = x86_64();
        su.kind = StructUnionKind::Struct;
        assert_eq!(su.sizeof(&reg, Span::none(), ec), Ok(16));
    }

    #[test]
    fn test_tail_padding() {
        // struct { long a; char b; };
        let su = StructUnion::new_struct(Some(vec![
            (Some("a".to_string()), QualifiedType::new(ctype::LONG_TYPE)),
            (Some("b".to_string()), QualifiedType::new(ctype::CHAR_TYPE)),
        ]));
        let ec = &mut ErrorCollector::new();
        assert_eq!(su.sizeof(&x86_64(), Span::none(), ec), Ok(16));
        assert_eq!(su.sizeof(&ccpu(), Span::none(), ec), Ok(8));
    }

    #[test]
    fn test_flexible_array() {
        // struct { int n; char data[]; };
        let mut data = QualifiedType::new(ctype::CHAR_TYPE);
        data.wrap_array(None);
        let su = StructUnion::new_struct(Some(vec![
            (Some("n".to_string()), QualifiedType::new(ctype::INT_TYPE)),
            (Some("data".to_string()), data.clone()),
        ]));
        let ec = &mut ErrorCollector::new();
        let reg = x86_64();
        assert_eq!(su.sizeof(&reg, Span::none(), ec), Ok(4));
        assert_eq!(
            su.get_field("data", &reg, Span::none(), ec),
            Ok(Some((4, data)))
        );
    }

    #[test]
    fn test_field_1() {
        let mut su = StructUnion::new_struct(Some(int_long()));
        let ec = &mut ErrorCollector::new();
        let reg = ccpu();
        // struct { int x; long y; };
        assert_eq!(
            su.get_field("x", &reg, Span::none(), ec).unwrap(),
            Some((0, QualifiedType::new(ctype::INT_TYPE)))
        );
        assert_eq!(
            su.get_field("y", &reg, Span::none(), ec).unwrap(),
            Some((4, QualifiedType::new(ctype::LONG_TYPE)))
        );
        assert_eq!(su.get_field("z", &reg, Span::none(), ec), Ok(None));

        // union { int x; long y; };
        su.kind = StructUnionKind::Union;
        assert_eq!(
            su.get_field("y", &reg, Span::none(), ec).unwrap(),
            Some((0, QualifiedType::new(ctype::LONG_TYPE)))
        );
        assert_eq!(su.get_field("z", &reg, Span::none(), ec), Ok(None));
    }

    #[test]
    fn test_incomplete_member() {
        let su = StructUnion::new_struct(Some(vec![(
            Some("s".to_string()),
            QualifiedType {
                t: CType::Struct(TypeIdentifier::Named("Missing".to_string())),
                qualifiers: Qualifiers::empty(),
            },
        )]));
        let ec = &mut ErrorCollector::new();
        assert_eq!(su.sizeof(&x86_64(), Span::none(), ec), Err(()));
        assert_eq!(ec.get_error_count(), 1);
    }
}
