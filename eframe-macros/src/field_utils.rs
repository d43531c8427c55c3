//! 字段解析：领域注解、类型形态识别与保留字段注入
//!
use crate::derive_utils::add_serde_flag;
use proc_macro2::TokenStream as TokenStream2;
use quote::{ToTokens, format_ident, quote};
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{
    Attribute, Field, FieldsNamed, GenericArgument, Ident, LitBool, LitInt, LitStr, Meta,
    PathArguments, Result, Token, Type,
};

/// 宏注入的字段名，用户声明的同名字段不参与注解解析
pub(crate) const RESERVED_FIELDS: [&str; 2] = ["uuid", "domain_settings"];

const DOMAIN_ATTRS: [&str; 8] = [
    "column",
    "nullable",
    "text",
    "transient",
    "one_to_many",
    "many_to_many",
    "many_to_one",
    "extensible_field_holder",
];

pub(crate) enum Position {
    First,
    Last,
}

/// 确保结构体包含指定字段；已存在时沿用用户的定义，只调整位置
pub(crate) fn ensure_field(fields: &mut FieldsNamed, field: Field, position: Position) {
    let mut existing = None;
    let mut rest: Punctuated<Field, Token![,]> = Punctuated::new();
    for f in std::mem::take(&mut fields.named) {
        if existing.is_none() && f.ident == field.ident {
            existing = Some(f);
        } else {
            rest.push(f);
        }
    }
    let field = existing.unwrap_or(field);

    fields.named = match position {
        Position::First => {
            let mut named = Punctuated::new();
            named.push(field);
            named.extend(rest);
            named
        }
        Position::Last => {
            rest.push(field);
            rest
        }
    };
}

pub(crate) fn is_reserved(field: &Field) -> bool {
    field
        .ident
        .as_ref()
        .map(|i| RESERVED_FIELDS.iter().any(|r| i == r))
        .unwrap_or(false)
}

/// 字段的类型形态
pub(crate) enum Shape {
    /// `String` / `Option<String>`
    Text { optional: bool },
    /// 其余 `Option<_>`
    Optional,
    /// `Ref<T>`
    Reference(Type),
    /// `Option<Vec<T>>` 且声明了集合关系
    List(Type),
    /// `#[extensible_field_holder]`
    Holder,
    Plain,
}

pub(crate) enum Association {
    None,
    OneToMany(LitStr),
    ManyToMany(LitStr),
    ManyToOne {
        target: Option<Type>,
        setter: Option<Ident>,
    },
}

#[derive(Default)]
pub(crate) struct ColumnSpec {
    name: Option<LitStr>,
    length: Option<u32>,
    nullable: Option<bool>,
}

pub(crate) struct FieldSpec {
    pub(crate) ident: Ident,
    pub(crate) ty: Type,
    pub(crate) shape: Shape,
    pub(crate) association: Association,
    column: Option<ColumnSpec>,
    nullable: bool,
    text: bool,
    pub(crate) transient: bool,
}

impl FieldSpec {
    /// 解析字段上的领域注解并将其移除，同时补上需要的 serde 属性
    pub(crate) fn take(field: &mut Field) -> Result<Self> {
        let ident = field
            .ident
            .clone()
            .ok_or_else(|| syn::Error::new(field.span(), "expected a named field"))?;

        let mut spec = FieldSpec {
            ident,
            ty: field.ty.clone(),
            shape: shape_of(&field.ty),
            association: Association::None,
            column: None,
            nullable: false,
            text: false,
            transient: false,
        };
        let mut holder = false;

        let (ours, kept): (Vec<Attribute>, Vec<Attribute>) = std::mem::take(&mut field.attrs)
            .into_iter()
            .partition(|a| DOMAIN_ATTRS.iter().any(|n| a.path().is_ident(n)));
        field.attrs = kept;

        for attr in &ours {
            let path = attr.path();
            if path.is_ident("nullable") {
                expect_flag(attr)?;
                spec.nullable = true;
            } else if path.is_ident("text") {
                expect_flag(attr)?;
                spec.text = true;
            } else if path.is_ident("transient") {
                expect_flag(attr)?;
                spec.transient = true;
            } else if path.is_ident("extensible_field_holder") {
                expect_flag(attr)?;
                holder = true;
            } else if path.is_ident("column") {
                spec.column = Some(parse_column(attr)?);
            } else if path.is_ident("one_to_many") {
                spec.set_association(attr, Association::OneToMany(parse_mapped_by(attr)?))?;
            } else if path.is_ident("many_to_many") {
                spec.set_association(attr, Association::ManyToMany(parse_mapped_by(attr)?))?;
            } else if path.is_ident("many_to_one") {
                spec.set_association(attr, parse_many_to_one(attr)?)?;
            }
        }

        match (&spec.association, &spec.shape) {
            (Association::OneToMany(_) | Association::ManyToMany(_), Shape::List(_)) => {}
            (Association::OneToMany(_) | Association::ManyToMany(_), _) => {
                return Err(syn::Error::new(
                    field.ty.span(),
                    "collection relations must be declared as Option<Vec<T>>",
                ));
            }
            (Association::ManyToOne { .. }, Shape::Reference(_)) => {}
            (Association::ManyToOne { .. }, _) => {
                return Err(syn::Error::new(
                    field.ty.span(),
                    "#[many_to_one] must be declared as Ref<T>",
                ));
            }
            _ => {}
        }
        // 未声明关系的 Option<Vec<_>> 只是普通可空值
        if matches!(spec.association, Association::None) && matches!(spec.shape, Shape::List(_)) {
            spec.shape = Shape::Optional;
        }
        if holder {
            spec.shape = Shape::Holder;
        }

        match spec.shape {
            Shape::List(_) => add_serde_flag(&mut field.attrs, "skip"),
            _ if spec.transient => add_serde_flag(&mut field.attrs, "skip"),
            Shape::Reference(_) | Shape::Holder => add_serde_flag(&mut field.attrs, "default"),
            _ => {}
        }
        Ok(spec)
    }

    fn set_association(&mut self, attr: &Attribute, association: Association) -> Result<()> {
        if !matches!(self.association, Association::None) {
            return Err(syn::Error::new(
                attr.span(),
                "a field can declare only one relation",
            ));
        }
        self.association = association;
        Ok(())
    }

    pub(crate) fn name(&self) -> String {
        self.ident.to_string()
    }

    fn is_nullable(&self) -> bool {
        self.nullable
            || match self.shape {
                Shape::Text { optional } => optional,
                Shape::Optional | Shape::List(_) | Shape::Holder => true,
                // 外键引用默认必填，可选引用需标注 #[nullable]
                Shape::Reference(_) | Shape::Plain => false,
            }
    }

    /// 元素类型：引用的目标或集合的元素
    pub(crate) fn element(&self) -> Option<&Type> {
        match &self.shape {
            Shape::Reference(ty) | Shape::List(ty) => Some(ty),
            _ => None,
        }
    }

    /// `FieldDescriptor` 构建表达式
    pub(crate) fn descriptor(&self) -> TokenStream2 {
        let name = self.name();
        let type_name = self.ty.to_token_stream().to_string().replace(' ', "");
        let kind = match self.shape {
            Shape::Text { .. } => quote!(Text),
            Shape::Reference(_) => quote!(Reference),
            Shape::List(_) => quote!(Collection),
            Shape::Optional | Shape::Holder | Shape::Plain => quote!(Value),
        };
        let nullable = self.is_nullable();
        let text = self.text;
        let transient = self.transient;

        let column = self.column.as_ref().map(|c| {
            let name = match &c.name {
                Some(lit) => quote!(::std::option::Option::Some(#lit)),
                None => quote!(::std::option::Option::None),
            };
            let length = c.length.unwrap_or(0);
            let nullable = match c.nullable {
                Some(b) => quote!(::std::option::Option::Some(#b)),
                None => quote!(::std::option::Option::None),
            };
            quote! {
                .column(::eframe_domain::schema::ColumnAnnotation {
                    name: #name,
                    length: #length,
                    nullable: #nullable,
                })
            }
        });

        let element = self.element().map(|ty| {
            quote!(.element(<#ty as ::eframe_domain::entity::DomainEntity>::schema))
        });

        let relation = match &self.association {
            Association::None => None,
            Association::OneToMany(mapped_by) => Some(quote! {
                ::eframe_domain::schema::RelationAnnotation::OneToMany { mapped_by: #mapped_by }
            }),
            Association::ManyToMany(mapped_by) => Some(quote! {
                ::eframe_domain::schema::RelationAnnotation::ManyToMany { mapped_by: #mapped_by }
            }),
            Association::ManyToOne { target, .. } => {
                let target = match target {
                    Some(ty) => quote! {
                        ::std::option::Option::Some(<#ty as ::eframe_domain::entity::DomainEntity>::schema)
                    },
                    None => quote!(::std::option::Option::None),
                };
                Some(quote! {
                    ::eframe_domain::schema::RelationAnnotation::ManyToOne { target: #target }
                })
            }
        }
        .map(|r| quote!(.relation(#r)));

        quote! {
            ::eframe_domain::schema::FieldDescriptor::builder()
                .name(#name)
                .type_name(#type_name)
                .kind(::eframe_domain::schema::FieldKind::#kind)
                .nullable(#nullable)
                .text(#text)
                .transient(#transient)
                #column
                #element
                #relation
                .build()
        }
    }
}

fn expect_flag(attr: &Attribute) -> Result<()> {
    match &attr.meta {
        Meta::Path(_) => Ok(()),
        other => Err(syn::Error::new(
            other.span(),
            "this attribute takes no arguments",
        )),
    }
}

fn parse_column(attr: &Attribute) -> Result<ColumnSpec> {
    let mut spec = ColumnSpec::default();
    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("name") {
            spec.name = Some(meta.value()?.parse::<LitStr>()?);
        } else if meta.path.is_ident("length") {
            spec.length = Some(meta.value()?.parse::<LitInt>()?.base10_parse::<u32>()?);
        } else if meta.path.is_ident("nullable") {
            spec.nullable = Some(meta.value()?.parse::<LitBool>()?.value());
        } else {
            return Err(meta.error("unknown key in #[column]; expected 'name', 'length' or 'nullable'"));
        }
        Ok(())
    })?;
    Ok(spec)
}

fn parse_mapped_by(attr: &Attribute) -> Result<LitStr> {
    let mut mapped_by = None;
    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("mapped_by") {
            mapped_by = Some(meta.value()?.parse::<LitStr>()?);
            Ok(())
        } else {
            Err(meta.error("unknown key; expected 'mapped_by'"))
        }
    })?;
    mapped_by.ok_or_else(|| syn::Error::new(attr.span(), "missing 'mapped_by'"))
}

fn parse_many_to_one(attr: &Attribute) -> Result<Association> {
    let mut target = None;
    let mut setter = None;
    if let Meta::List(_) = attr.meta {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("target") {
                target = Some(meta.value()?.parse::<Type>()?);
            } else if meta.path.is_ident("setter") {
                setter = Some(meta.value()?.parse::<Ident>()?);
            } else {
                return Err(meta.error("unknown key in #[many_to_one]; expected 'target' or 'setter'"));
            }
            Ok(())
        })?;
    }
    Ok(Association::ManyToOne { target, setter })
}

fn shape_of(ty: &Type) -> Shape {
    if is_named(ty, "String") {
        return Shape::Text { optional: false };
    }
    if let Some(inner) = generic_arg(ty, "Option") {
        if is_named(inner, "String") {
            return Shape::Text { optional: true };
        }
        if let Some(element) = generic_arg(inner, "Vec") {
            return Shape::List(element.clone());
        }
        return Shape::Optional;
    }
    if let Some(target) = generic_arg(ty, "Ref") {
        return Shape::Reference(target.clone());
    }
    Shape::Plain
}

fn is_named(ty: &Type, name: &str) -> bool {
    match ty {
        Type::Path(tp) if tp.qself.is_none() => tp
            .path
            .segments
            .last()
            .map(|s| s.ident == name && s.arguments.is_none())
            .unwrap_or(false),
        _ => false,
    }
}

fn generic_arg<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    let Type::Path(tp) = ty else {
        return None;
    };
    if tp.qself.is_some() {
        return None;
    }
    let segment = tp.path.segments.last()?;
    if segment.ident != wrapper {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    args.args.iter().find_map(|arg| match arg {
        GenericArgument::Type(t) => Some(t),
        _ => None,
    })
}

/// 生成访问器所用的方法名，如 `load_lines`
pub(crate) fn loader_ident(field: &Ident) -> Ident {
    format_ident!("load_{}", field)
}
