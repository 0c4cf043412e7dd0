use lang_c::{ast::StorageClassSpecifier, span::Span};
use std::collections::HashMap;

use crate::{
    ctype::{CType, QualifiedType, StructUnionKind, TypeIdentifier},
    error::{CompileError, CompileWarning, ErrorCollector},
    machine::{DataModel, Machine},
    primitive::PrimitiveTypes,
    struct_union::StructUnion,
    value::{ObjectId, TypedValue},
};

/**
 * Keep track of file-scope symbols and tagged types of a translation unit.
 */
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    model: DataModel,
    primitives: PrimitiveTypes,
    defs: HashMap<String, (Symbol, Span)>,
    tagged_types: HashMap<TypeIdentifier, (StructUnion, Span)>,
    last_anon_id: usize,
    last_object_id: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Symbol {
    Type(QualifiedType),
    Object(Object),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub t: QualifiedType,
    pub id: ObjectId,
    pub storage_class: GlobalStorageClass,
    pub initializer: Option<TypedValue>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum GlobalStorageClass {
    Default,
    Static,
    Extern,
}

impl TypeRegistry {
    pub fn new(machine: &Machine) -> Self {
        Self {
            model: *machine.model(),
            primitives: *machine.primitives(),
            defs: HashMap::new(),
            tagged_types: HashMap::new(),
            last_anon_id: 0,
            last_object_id: 0,
        }
    }

    pub fn model(&self) -> &DataModel {
        &self.model
    }

    pub fn primitives(&self) -> &PrimitiveTypes {
        &self.primitives
    }

    /**
     * Largest object the target allows: `PTRDIFF_MAX` bytes, so that the difference
     * of two pointers into one object is representable.
     */
    pub fn max_object_size(&self) -> u64 {
        self.primitives.ptrdiff_max(&self.model) as u64
    }

    /**
     * Pass a computed size through. `None` stands for an overflow.
     */
    pub fn check_object_size(
        &self,
        size: Option<u64>,
        what: &dyn std::fmt::Display,
        span: Span,
        ec: &mut ErrorCollector,
    ) -> Result<u64, ()> {
        match size {
            Some(size) if size <= self.max_object_size() => Ok(size),
            _ => {
                ec.record_error(CompileError::ObjectTooLarge(what.to_string()), span)?;
                unreachable!()
            }
        }
    }

    /**
     * Declare a global var or a type alias.
     *
     * The initializer, if given, is cast to the target type.
     */
    pub fn declare(
        &mut self,
        name: &str,
        t: QualifiedType,
        storage_class: Option<&StorageClassSpecifier>,
        initializer: Option<TypedValue>,
        span: Span,
        ec: &mut ErrorCollector,
    ) -> Result<(), ()> {
        if let Some(StorageClassSpecifier::Typedef) = storage_class {
            if initializer.is_some() {
                return ec.record_error(CompileError::TypedefInitialized, span);
            }
            if let Some((old_val, _)) = self.defs.get(name) {
                match old_val {
                    Symbol::Object(_) => {
                        return ec.record_error(
                            CompileError::ConflictingStorageClass(name.to_string()),
                            span,
                        );
                    }
                    Symbol::Type(old_t) => {
                        // C11 allows repeating a typedef with the same type
                        if &t != old_t {
                            return ec
                                .record_error(CompileError::TypeRedefinition(name.to_string()), span);
                        }
                    }
                }
            }
            self.defs.insert(name.to_string(), (Symbol::Type(t), span));
            return Ok(());
        }

        let mut storage_class = match GlobalStorageClass::from_ast_storage_class(storage_class) {
            Ok(class) => class,
            Err(_) => return ec.record_error(CompileError::WrongStorageClass, span),
        };
        let initializer = if let Some(tv) = initializer {
            Some(tv.implicit_cast(&t, &self.model, span, ec)?)
        } else {
            None
        };
        if let Some((old_val, _)) = self.defs.remove(name) {
            // check that both definitions are variables
            let old = match old_val {
                Symbol::Object(old) => old,
                Symbol::Type(old_t) => {
                    self.defs
                        .insert(name.to_string(), (Symbol::Type(old_t), span));
                    return ec.record_error(
                        CompileError::ConflictingStorageClass(name.to_string()),
                        span,
                    );
                }
            };

            // check storage classes compatibility
            let mut combined_storage_class =
                if let Some(class) = match_storage_classes(old.storage_class, storage_class) {
                    class
                } else {
                    self.defs
                        .insert(name.to_string(), (Symbol::Object(old), span));
                    return ec.record_error(
                        CompileError::ConflictingStorageClass(name.to_string()),
                        span,
                    );
                };

            // check types
            if !t.is_compatible_to(&old.t, true) {
                self.defs
                    .insert(name.to_string(), (Symbol::Object(old), span));
                return ec.record_error(CompileError::ConflictingTypes(name.to_string()), span);
            }

            // check initializers
            if old.initializer.is_some() && initializer.is_some() {
                self.defs
                    .insert(name.to_string(), (Symbol::Object(old), span));
                return ec.record_error(CompileError::VarRedefinition(name.to_string()), span);
            }
            if initializer.is_some() && combined_storage_class == GlobalStorageClass::Extern {
                ec.record_warning(CompileWarning::ExternVarInitialized(name.to_string()), span)?;
                combined_storage_class = GlobalStorageClass::Default;
            }
            // the complete array type wins over `extern int x[];`
            let t = match &t.t {
                CType::Array(_, None) => old.t,
                _ => t,
            };
            let combined_initializer = initializer.or(old.initializer);
            self.defs.insert(
                name.to_string(),
                (
                    Symbol::Object(Object {
                        t,
                        id: old.id,
                        storage_class: combined_storage_class,
                        initializer: combined_initializer,
                    }),
                    span,
                ),
            );
        } else {
            if initializer.is_some() && storage_class == GlobalStorageClass::Extern {
                ec.record_warning(CompileWarning::ExternVarInitialized(name.to_string()), span)?;
                storage_class = GlobalStorageClass::Default;
            }
            let id = self.alloc_object_id();
            self.defs.insert(
                name.to_string(),
                (
                    Symbol::Object(Object {
                        t,
                        id,
                        storage_class,
                        initializer,
                    }),
                    span,
                ),
            );
        }
        Ok(())
    }

    /**
     * Declare or define a struct or a union.
     *
     * A named tag may be declared many times and defined once.
     * Pass `members: None` for a forward declaration or a reference.
     */
    pub fn declare_struct_union(
        &mut self,
        kind: StructUnionKind,
        name: Option<String>,
        members: Option<Vec<(Option<String>, QualifiedType)>>,
        span: Span,
        ec: &mut ErrorCollector,
    ) -> Result<TypeIdentifier, ()> {
        let su = StructUnion::new(kind, members);
        let id = match name {
            None => {
                self.last_anon_id += 1;
                TypeIdentifier::Anon(self.last_anon_id)
            }
            Some(name) => TypeIdentifier::Named(name),
        };
        if let Some((prev, _)) = self.tagged_types.get(&id) {
            if prev.get_kind() != kind {
                ec.record_error(CompileError::TagKindMismatch(format!("{}", id)), span)?;
                unreachable!()
            }
            if !su.is_complete() {
                return Ok(id);
            }
            if prev.is_complete() {
                ec.record_error(CompileError::TypeRedefinition(format!("{}", id)), span)?;
                unreachable!()
            }
        }
        self.tagged_types.insert(id.clone(), (su, span));
        Ok(id)
    }

    /**
     * Kind of a tag declared under `name`, if any.
     */
    pub fn get_tag_kind(&self, name: &str) -> Option<StructUnionKind> {
        self.tagged_types
            .get(&TypeIdentifier::Named(name.to_string()))
            .map(|(su, _)| su.get_kind())
    }

    pub fn get_struct_union(&self, id: &TypeIdentifier) -> Option<&StructUnion> {
        self.tagged_types.get(id).map(|(su, _)| su)
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.defs.get(name).map(|(val, _)| val)
    }

    pub fn lookup_alias(&self, name: &str) -> Option<&QualifiedType> {
        match self.get(name) {
            Some(Symbol::Type(t)) => Some(t),
            _ => None,
        }
    }

    pub fn lookup_object(&self, name: &str) -> Option<&Object> {
        match self.get(name) {
            Some(Symbol::Object(obj)) => Some(obj),
            _ => None,
        }
    }

    pub fn get_type_alias(
        &self,
        name: &str,
        span: Span,
        ec: &mut ErrorCollector,
    ) -> Result<&QualifiedType, ()> {
        match self.get(name) {
            Some(Symbol::Type(t)) => Ok(t),
            Some(Symbol::Object(_)) => {
                ec.record_error(CompileError::NotAType(name.to_string()), span)?;
                unreachable!();
            }
            None => {
                ec.record_error(CompileError::UnknownType(name.to_string()), span)?;
                unreachable!();
            }
        }
    }

    pub fn get_object(
        &self,
        name: &str,
        span: Span,
        ec: &mut ErrorCollector,
    ) -> Result<&Object, ()> {
        match self.get(name) {
            Some(Symbol::Object(obj)) => Ok(obj),
            Some(Symbol::Type(_)) => {
                ec.record_error(CompileError::NotAVar(name.to_string()), span)?;
                unreachable!();
            }
            None => {
                ec.record_error(CompileError::UnknownIdentifier(name.to_string()), span)?;
                unreachable!();
            }
        }
    }

    pub fn symbols(&self) -> impl Iterator<Item = (&String, &Symbol)> {
        self.defs.iter().map(|(name, (val, _))| (name, val))
    }

    fn alloc_object_id(&mut self) -> ObjectId {
        let id = self.last_object_id;
        self.last_object_id += 1;
        ObjectId(id)
    }
}

impl GlobalStorageClass {
    pub fn from_ast_storage_class(class: Option<&StorageClassSpecifier>) -> Result<Self, ()> {
        match class {
            None => Ok(GlobalStorageClass::Default),
            Some(StorageClassSpecifier::Extern) => Ok(GlobalStorageClass::Extern),
            Some(StorageClassSpecifier::Static) => Ok(GlobalStorageClass::Static),
            Some(_) => Err(()),
        }
    }
}

fn match_storage_classes(
    old: GlobalStorageClass,
    new: GlobalStorageClass,
) -> Option<GlobalStorageClass> {
    use GlobalStorageClass::*;
    // same classes match
    // static may not follow non-static
    // extern may follow static
    match (old, new) {
        (Static, Static) => Some(Static),
        (Extern, Extern) => Some(Extern),
        (_, Static) => None,
        (Static, Extern) => Some(Static),
        (Static, Default) => None,
        (Default, _) => Some(Default),
        (_, Default) => Some(Default),
    }
}
