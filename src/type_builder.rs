use crate::constant;
use crate::ctype::{CType, FunctionArgs, IntKind, QualifiedType, Qualifiers, StructUnionKind};
use crate::error::{CompileError, CompileWarning, ErrorCollector};
use crate::type_registry::TypeRegistry;
use lang_c::ast::{
    ArraySize, Declarator, DeclaratorKind, DerivedDeclarator, FunctionDeclarator,
    SpecifierQualifier, StructDeclaration, StructType, TypeName, TypeSpecifier,
};
use lang_c::span::{Node, Span};
use std::collections::HashSet;
use std::fmt::Formatter;

/**
 * Starts building a type from one or more lang_c::ast::DeclarationSpecifier.
 */
#[derive(Clone)]
pub struct TypeBuilder {
    base_type: Option<BaseType>,
    modifier: TypeModifier,
    sign: SignModifier,
    qualifiers: Qualifiers,
}

/**
 * Continues building a type.
 */
pub struct TypeBuilderStage2 {
    base_type: QualifiedType,
}

#[derive(Clone)]
enum BaseType {
    Void,
    Int,
    Char,
    Bool,
    Alias(String, QualifiedType),
    StructUnion(CType),
}

#[derive(Clone, Copy)]
enum TypeModifier {
    None,
    Short,
    Long,
    LongLong,
}

#[derive(Clone, Copy)]
enum SignModifier {
    Default,
    Signed,
    Unsigned,
}

impl TypeBuilder {
    pub fn new() -> Self {
        Self {
            base_type: None,
            modifier: TypeModifier::None,
            sign: SignModifier::Default,
            qualifiers: Qualifiers::empty(),
        }
    }

    /**
     * Builder for a type name or a struct field: specifiers and qualifiers only.
     */
    pub fn new_from_specifiers_qualifiers(
        specifiers: &[Node<SpecifierQualifier>],
        reg: &mut TypeRegistry,
        ec: &mut ErrorCollector,
    ) -> Result<Self, ()> {
        let mut builder = Self::new();
        for spec in specifiers {
            match &spec.node {
                SpecifierQualifier::TypeSpecifier(ts) => {
                    builder.add_type_specifier_node(ts, reg, ec)?
                }
                SpecifierQualifier::TypeQualifier(tq) => builder.add_type_qualifier_node(tq, ec)?,
                _ => ec.record_warning(
                    CompileWarning::Unimplemented("extension".to_string()),
                    spec.span,
                )?,
            }
        }
        Ok(builder)
    }

    pub fn add_type_qualifier_node(
        &mut self,
        qual: &Node<lang_c::ast::TypeQualifier>,
        ec: &mut ErrorCollector,
    ) -> Result<(), ()> {
        self.qualifiers |= convert_qualifier_node(qual, ec)?;
        Ok(())
    }

    pub fn add_type_specifier_node(
        &mut self,
        spec: &Node<TypeSpecifier>,
        reg: &mut TypeRegistry,
        ec: &mut ErrorCollector,
    ) -> Result<(), ()> {
        let span = spec.span;
        match &spec.node {
            TypeSpecifier::Void => self.set_base_type(BaseType::Void, span, ec)?,
            TypeSpecifier::Char => self.set_base_type(BaseType::Char, span, ec)?,
            TypeSpecifier::Int => self.set_base_type(BaseType::Int, span, ec)?,
            TypeSpecifier::Bool => self.set_base_type(BaseType::Bool, span, ec)?,
            TypeSpecifier::Signed => self.set_signed(true, span, ec)?,
            TypeSpecifier::Unsigned => self.set_signed(false, span, ec)?,
            TypeSpecifier::Long => self.set_long(span, ec)?,
            TypeSpecifier::Short => self.set_short(span, ec)?,
            TypeSpecifier::TypedefName(n) => self.set_alias(&n.node.name, n.span, reg, ec)?,
            TypeSpecifier::Struct(st) => {
                let t = process_struct_type(st, reg, ec)?;
                self.set_base_type(BaseType::StructUnion(t), span, ec)?
            }
            TypeSpecifier::Float | TypeSpecifier::Double => {
                return ec.record_error(
                    CompileError::Unimplemented("floating point types".to_string()),
                    span,
                )
            }
            TypeSpecifier::Enum(_) => {
                return ec.record_error(CompileError::Unimplemented("enum".to_string()), span)
            }
            _ => {
                return ec.record_error(
                    CompileError::Unimplemented("type specifier".to_string()),
                    span,
                )
            }
        }
        Ok(())
    }

    pub fn stage2(&self, span: Span, ec: &mut ErrorCollector) -> Result<TypeBuilderStage2, ()> {
        if self.base_type.is_none() {
            if let (TypeModifier::None, SignModifier::Default) = (self.modifier, self.sign) {
                ec.record_warning(CompileWarning::ImplicitInt, span)?;
            }
        }

        let extra_qualifiers = match &self.base_type {
            Some(BaseType::Alias(_, t)) => t.qualifiers,
            _ => Qualifiers::empty(),
        };
        let t = match &self.base_type {
            None | Some(BaseType::Int) => {
                let kind = match self.modifier {
                    TypeModifier::None => IntKind::Int,
                    TypeModifier::Short => IntKind::Short,
                    TypeModifier::Long => IntKind::Long,
                    TypeModifier::LongLong => IntKind::LLong,
                };
                match self.sign {
                    SignModifier::Unsigned => CType::Int(kind.to_unsigned()),
                    _ => CType::Int(kind),
                }
            }
            Some(BaseType::Char) => match self.sign {
                SignModifier::Default => CType::Int(IntKind::Char),
                SignModifier::Signed => CType::Int(IntKind::SChar),
                SignModifier::Unsigned => CType::Int(IntKind::UChar),
            },
            Some(BaseType::Void) => CType::Void,
            Some(BaseType::Bool) => CType::Bool,
            Some(BaseType::Alias(_, t)) => t.t.clone(),
            Some(BaseType::StructUnion(t)) => t.clone(),
        };

        Ok(TypeBuilderStage2 {
            base_type: QualifiedType {
                t,
                qualifiers: self.qualifiers | extra_qualifiers,
            },
        })
    }

    fn set_base_type(
        &mut self,
        t: BaseType,
        span: Span,
        ec: &mut ErrorCollector,
    ) -> Result<(), ()> {
        if self.base_type.is_none() {
            self.base_type = Some(t);
            self.check_consistency(span, ec)
        } else {
            ec.record_error(CompileError::MultipleTypes, span)
        }
    }

    fn set_signed(&mut self, signed: bool, span: Span, ec: &mut ErrorCollector) -> Result<(), ()> {
        if let SignModifier::Default = self.sign {
            self.sign = match signed {
                true => SignModifier::Signed,
                false => SignModifier::Unsigned,
            };
            self.check_consistency(span, ec)
        } else {
            ec.record_error(CompileError::MultipleSignSpecifiers, span)
        }
    }

    fn set_short(&mut self, span: Span, ec: &mut ErrorCollector) -> Result<(), ()> {
        if let TypeModifier::None = self.modifier {
            self.modifier = TypeModifier::Short;
            self.check_consistency(span, ec)
        } else {
            ec.record_error(CompileError::LongShortTogether, span)
        }
    }

    fn set_long(&mut self, span: Span, ec: &mut ErrorCollector) -> Result<(), ()> {
        match self.modifier {
            TypeModifier::None => self.modifier = TypeModifier::Long,
            TypeModifier::Long => self.modifier = TypeModifier::LongLong,
            TypeModifier::Short => return ec.record_error(CompileError::LongShortTogether, span),
            TypeModifier::LongLong => return ec.record_error(CompileError::TypeTooLong, span),
        }
        self.check_consistency(span, ec)
    }

    fn set_alias(
        &mut self,
        name: &str,
        span: Span,
        reg: &TypeRegistry,
        ec: &mut ErrorCollector,
    ) -> Result<(), ()> {
        let t = reg.get_type_alias(name, span, ec)?.clone();
        self.set_base_type(BaseType::Alias(name.to_string(), t), span, ec)
    }

    fn check_consistency(&self, span: Span, ec: &mut ErrorCollector) -> Result<(), ()> {
        let base_type = match &self.base_type {
            None | Some(BaseType::Int) => return Ok(()),
            Some(base_type) => base_type,
        };
        let modifier_ok = matches!(self.modifier, TypeModifier::None);
        let sign_ok = match base_type {
            BaseType::Char => true,
            _ => matches!(self.sign, SignModifier::Default),
        };
        if modifier_ok && sign_ok {
            Ok(())
        } else {
            let what = match base_type {
                BaseType::Alias(name, _) => format!("typedef {}", name),
                _ => format!("{}", base_type),
            };
            ec.record_error(CompileError::WrongModifiers(what), span)
        }
    }
}

impl TypeBuilderStage2 {
    /**
     * Apply a declarator to the base type.
     *
     * Returns the declared identifier (`None` for abstract declarators) and the full type.
     */
    pub fn process_declarator_node(
        self,
        declarator: &Node<Declarator>,
        reg: &mut TypeRegistry,
        ec: &mut ErrorCollector,
    ) -> Result<(Option<String>, QualifiedType), ()> {
        let mut t = self.base_type;
        let name = process_declarator(&mut t, declarator, reg, ec)?;
        Ok((name, t))
    }

    pub fn finalize(self) -> QualifiedType {
        self.base_type
    }
}

fn process_declarator(
    t: &mut QualifiedType,
    declarator: &Node<Declarator>,
    reg: &mut TypeRegistry,
    ec: &mut ErrorCollector,
) -> Result<Option<String>, ()> {
    let decl = &declarator.node;
    if !decl.extensions.is_empty() {
        ec.record_warning(
            CompileWarning::Unimplemented("declarator attributes".to_string()),
            declarator.span,
        )?;
    }
    // pointers bind to the base type first, suffixes apply right to left
    for dd in &decl.derived {
        if let DerivedDeclarator::Pointer(pqs) = &dd.node {
            let mut qualifiers = Qualifiers::empty();
            for pq in pqs {
                match &pq.node {
                    lang_c::ast::PointerQualifier::TypeQualifier(tq) => {
                        qualifiers |= convert_qualifier_node(tq, ec)?;
                    }
                    _ => ec.record_warning(
                        CompileWarning::Unimplemented("pointer extension".to_string()),
                        pq.span,
                    )?,
                }
            }
            t.wrap_pointer(qualifiers);
        }
    }
    for dd in decl.derived.iter().rev() {
        match &dd.node {
            DerivedDeclarator::Pointer(_) => (),
            DerivedDeclarator::Array(ad) => {
                if t.t.is_function() {
                    ec.record_error(
                        CompileError::BadDeclarator("array of functions".to_string()),
                        dd.span,
                    )?;
                    unreachable!()
                }
                let size = match &ad.node.size {
                    ArraySize::Unknown => None,
                    ArraySize::VariableExpression(e) | ArraySize::StaticExpression(e) => {
                        let n = constant::compute_integer_constant(e, reg, ec)?;
                        if n <= 0 {
                            ec.record_error(CompileError::BadArraySize, e.span)?;
                            unreachable!()
                        }
                        let what = format!("{} [{}]", t, n);
                        Some(reg.check_object_size(u64::try_from(n).ok(), &what, e.span, ec)?)
                    }
                    ArraySize::VariableUnknown => {
                        ec.record_error(
                            CompileError::Unimplemented("variable length arrays".to_string()),
                            ad.span,
                        )?;
                        unreachable!()
                    }
                };
                t.wrap_array(size);
                if t.t.is_complete(reg) {
                    t.t.sizeof(reg, dd.span, ec)?;
                }
            }
            DerivedDeclarator::Function(fd) => {
                if t.t.is_function() || t.t.is_array() {
                    ec.record_error(
                        CompileError::BadDeclarator(
                            "function returning a function or an array".to_string(),
                        ),
                        dd.span,
                    )?;
                    unreachable!()
                }
                let (args, vararg) = process_function_declarator(fd, reg, ec)?;
                t.wrap_function(args, vararg);
            }
            DerivedDeclarator::KRFunction(ids) => {
                if !ids.is_empty() {
                    ec.record_error(
                        CompileError::Unimplemented("K&R function declarations".to_string()),
                        dd.span,
                    )?;
                    unreachable!()
                }
                t.wrap_function(FunctionArgs::Empty, false);
            }
            _ => {
                ec.record_error(
                    CompileError::Unimplemented("declarator".to_string()),
                    dd.span,
                )?;
                unreachable!()
            }
        }
    }
    match &decl.kind.node {
        DeclaratorKind::Abstract => Ok(None),
        DeclaratorKind::Identifier(id) => Ok(Some(id.node.name.clone())),
        DeclaratorKind::Declarator(inner) => process_declarator(t, inner, reg, ec),
    }
}

fn process_function_declarator(
    fd: &Node<FunctionDeclarator>,
    reg: &mut TypeRegistry,
    ec: &mut ErrorCollector,
) -> Result<(FunctionArgs, bool), ()> {
    let vararg = matches!(fd.node.ellipsis, lang_c::ast::Ellipsis::Some);
    let mut args = Vec::new();
    for param in &fd.node.parameters {
        let mut builder = TypeBuilder::new();
        for spec in &param.node.specifiers {
            match &spec.node {
                lang_c::ast::DeclarationSpecifier::TypeSpecifier(ts) => {
                    builder.add_type_specifier_node(ts, reg, ec)?
                }
                lang_c::ast::DeclarationSpecifier::TypeQualifier(tq) => {
                    builder.add_type_qualifier_node(tq, ec)?
                }
                lang_c::ast::DeclarationSpecifier::StorageClass(sc) => {
                    if !matches!(sc.node, lang_c::ast::StorageClassSpecifier::Register) {
                        ec.record_error(CompileError::WrongStorageClass, sc.span)?;
                        unreachable!()
                    }
                }
                _ => ec.record_warning(
                    CompileWarning::Unimplemented("parameter specifier".to_string()),
                    spec.span,
                )?,
            }
        }
        let stage2 = builder.stage2(param.span, ec)?;
        let t = match &param.node.declarator {
            Some(decl) => stage2.process_declarator_node(decl, reg, ec)?.1,
            None => stage2.finalize(),
        };
        if t.t.is_void() {
            if fd.node.parameters.len() != 1 || vararg || t.qualifiers != Qualifiers::empty() {
                ec.record_error(CompileError::VoidParameter, param.span)?;
                unreachable!()
            }
            return Ok((FunctionArgs::Void, false));
        }
        // parameters of array and function types are adjusted to pointers
        args.push(t.decay());
    }
    if args.is_empty() {
        Ok((FunctionArgs::Empty, vararg))
    } else {
        Ok((FunctionArgs::List(args), vararg))
    }
}

/**
 * Declare or reference a struct or union, defining its members if the body is present.
 */
fn process_struct_type(
    st: &Node<StructType>,
    reg: &mut TypeRegistry,
    ec: &mut ErrorCollector,
) -> Result<CType, ()> {
    let kind = match st.node.kind.node {
        lang_c::ast::StructKind::Struct => StructUnionKind::Struct,
        lang_c::ast::StructKind::Union => StructUnionKind::Union,
    };
    let name = st.node.identifier.as_ref().map(|id| id.node.name.clone());
    let members = match &st.node.declarations {
        Some(declarations) => Some(process_struct_declarations(kind, declarations, reg, ec)?),
        None => None,
    };
    let id = reg.declare_struct_union(kind, name, members, st.span, ec)?;
    Ok(match kind {
        StructUnionKind::Struct => CType::Struct(id),
        StructUnionKind::Union => CType::Union(id),
    })
}

fn process_struct_declarations(
    kind: StructUnionKind,
    declarations: &[Node<StructDeclaration>],
    reg: &mut TypeRegistry,
    ec: &mut ErrorCollector,
) -> Result<Vec<(Option<String>, QualifiedType)>, ()> {
    let mut members: Vec<(Option<String>, QualifiedType)> = Vec::new();
    let mut names = HashSet::new();
    let mut declarations_span = Vec::new();
    for decl in declarations {
        match &decl.node {
            StructDeclaration::Field(field) => {
                let builder =
                    TypeBuilder::new_from_specifiers_qualifiers(&field.node.specifiers, reg, ec)?;
                if field.node.declarators.is_empty() {
                    let t = builder.stage2(field.span, ec)?.finalize();
                    if let Some(id) = t.t.get_anon_struct_or_union_id() {
                        if let Some(nested) = reg.get_struct_union(id) {
                            for name in nested.collect_member_names(reg) {
                                if !names.insert(name.clone()) {
                                    ec.record_error(CompileError::DuplicateMember(name), field.span)?;
                                    unreachable!()
                                }
                            }
                        }
                        members.push((None, t));
                        declarations_span.push(field.span);
                    } else {
                        ec.record_warning(CompileWarning::EmptyDeclaration, field.span)?;
                    }
                    continue;
                }
                for sd in &field.node.declarators {
                    if let Some(bw) = &sd.node.bit_width {
                        ec.record_error(
                            CompileError::Unimplemented("bit fields".to_string()),
                            bw.span,
                        )?;
                        unreachable!()
                    }
                    let stage2 = builder.stage2(sd.span, ec)?;
                    let (name, t) = match &sd.node.declarator {
                        Some(d) => stage2.process_declarator_node(d, reg, ec)?,
                        None => (None, stage2.finalize()),
                    };
                    if let Some(name) = &name {
                        if !names.insert(name.clone()) {
                            ec.record_error(CompileError::DuplicateMember(name.clone()), sd.span)?;
                            unreachable!()
                        }
                    }
                    members.push((name, t));
                    declarations_span.push(sd.span);
                }
            }
            StructDeclaration::StaticAssert(sa) => constant::check_static_assert(sa, reg, ec)?,
        }
    }
    // every member but a trailing flexible array must be complete
    let last = members.len().saturating_sub(1);
    for (i, ((_, t), span)) in members.iter().zip(declarations_span).enumerate() {
        let flexible = i == last && kind == StructUnionKind::Struct && i > 0;
        let complete = match &t.t {
            CType::Array(inner, None) if flexible => inner.t.is_complete(reg),
            CType::Function { .. } => false,
            other => other.is_complete(reg),
        };
        if !complete {
            ec.record_error(CompileError::IncompleteType(format!("{}", t)), span)?;
            unreachable!()
        }
    }
    Ok(members)
}

/**
 * Build a type from a type name, as in casts, `sizeof` and `offsetof`.
 */
pub fn build_type_from_ast_type_name(
    tn: &Node<TypeName>,
    reg: &mut TypeRegistry,
    ec: &mut ErrorCollector,
) -> Result<QualifiedType, ()> {
    let builder = TypeBuilder::new_from_specifiers_qualifiers(&tn.node.specifiers, reg, ec)?;
    let stage2 = builder.stage2(tn.span, ec)?;
    match &tn.node.declarator {
        Some(decl) => Ok(stage2.process_declarator_node(decl, reg, ec)?.1),
        None => Ok(stage2.finalize()),
    }
}

fn convert_qualifier_node(
    q: &Node<lang_c::ast::TypeQualifier>,
    ec: &mut ErrorCollector,
) -> Result<Qualifiers, ()> {
    use lang_c::ast::TypeQualifier;
    let qual = match q.node {
        TypeQualifier::Const => Qualifiers::CONST,
        TypeQualifier::Restrict => Qualifiers::RESTRICT,
        TypeQualifier::Volatile => Qualifiers::VOLATILE,
        TypeQualifier::Atomic => Qualifiers::ATOMIC,
        _ => {
            ec.record_warning(
                CompileWarning::Unimplemented("unknown qualifier".to_string()),
                q.span,
            )?;
            Qualifiers::empty()
        }
    };
    Ok(qual)
}

impl std::fmt::Display for BaseType {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            BaseType::Void => f.write_str("void"),
            BaseType::Char => f.write_str("char"),
            BaseType::Int => f.write_str("int"),
            BaseType::Bool => f.write_str("_Bool"),
            BaseType::Alias(name, t) => write!(f, "{} (aka {})", name, t),
            BaseType::StructUnion(t) => write!(f, "{}", t),
        }
    }
}
