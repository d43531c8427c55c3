use crate::derive_utils::apply_derives;
use crate::field_utils::{
    Association, FieldSpec, Position, Shape, ensure_field, is_reserved, loader_ident,
};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{
    Ident, Item, ItemStruct, LitStr, Result, Token, parse::Parse, parse::ParseStream,
    parse_macro_input,
};

/// #[domain_entity] 宏实现
/// - 注入字段：`uuid: Option<Uuid>`（置于最前）与 `domain_settings: DomainSettings`（置于最后）
/// - 合并派生：Debug（可通过 debug=false 关闭）、Default、Serialize、Deserialize
/// - 生成 `::eframe_domain::entity::DomainEntity` 实现（结构描述与访问器表）
/// - 未声明 `hooks` 时生成空的 `EntityHooks` 实现
/// - 为每个关系字段生成 `load_<field>(&mut self, engine)` 懒加载访问器
pub(crate) fn expand(attr: TokenStream, item: TokenStream) -> TokenStream {
    let cfg = parse_macro_input!(attr as DomainEntityAttrConfig);
    let input = parse_macro_input!(item as Item);

    let st = match input {
        Item::Struct(s) => s,
        other => {
            return syn::Error::new(other.span(), "#[domain_entity] only on struct")
                .to_compile_error()
                .into();
        }
    };

    match expand_struct(cfg, st) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand_struct(cfg: DomainEntityAttrConfig, mut st: ItemStruct) -> Result<TokenStream2> {
    if !st.generics.params.is_empty() {
        return Err(syn::Error::new(
            st.generics.span(),
            "#[domain_entity] does not support generic structs",
        ));
    }

    let vis = st.vis.clone();
    let syn::Fields::Named(fields_named) = &mut st.fields else {
        return Err(syn::Error::new(
            st.span(),
            "only supports named-field struct",
        ));
    };

    let mut specs = Vec::with_capacity(fields_named.named.len());
    for field in fields_named.named.iter_mut() {
        if !is_reserved(field) {
            specs.push(FieldSpec::take(field)?);
        }
    }

    ensure_field(
        fields_named,
        syn::parse_quote! {
            #[serde(default)]
            #vis uuid: ::std::option::Option<::eframe_domain::uuid::Uuid>
        },
        Position::First,
    );
    ensure_field(
        fields_named,
        syn::parse_quote! {
            #[serde(skip)]
            #vis domain_settings: ::eframe_domain::settings::DomainSettings
        },
        Position::Last,
    );

    let mut required: Vec<syn::Path> = vec![
        syn::parse_quote!(Default),
        syn::parse_quote!(serde::Serialize),
        syn::parse_quote!(serde::Deserialize),
    ];
    if cfg.derive_debug.unwrap_or(true) {
        required.insert(0, syn::parse_quote!(Debug));
    }
    apply_derives(&mut st.attrs, required);

    let ident = &st.ident;
    let name = ident.to_string();

    // -------- 结构描述 --------
    let uuid_descriptor = quote! {
        ::eframe_domain::schema::FieldDescriptor::builder()
            .name("uuid")
            .type_name("Option<Uuid>")
            .nullable(true)
            .build()
    };
    let descriptors = specs.iter().map(FieldSpec::descriptor);
    let table = cfg.table.as_ref().map(|t| quote!(.table(#t)));
    let (order_fn, order_call) = natural_order(ident, cfg.order.as_ref())?;

    // -------- 访问器表 --------
    let mut column_arms = Vec::new();
    let mut list_arms = Vec::new();
    let mut reference_arms = Vec::new();
    let mut set_reference_arms = Vec::new();
    let mut loaders = Vec::new();
    let mut holder: Option<&Ident> = None;

    for spec in specs.iter().filter(|s| !s.transient) {
        let field = &spec.ident;
        let field_name = spec.name();
        let ty = &spec.ty;

        let column = match &spec.shape {
            Shape::Text { optional: false } => {
                quote!(::eframe_domain::column::ColumnValue::text(&self.#field))
            }
            Shape::Text { optional: true } => {
                quote!(::eframe_domain::column::ColumnValue::optional_text(&self.#field))
            }
            Shape::Optional | Shape::List(_) => {
                quote!(::eframe_domain::column::ColumnValue::optional(&self.#field))
            }
            Shape::Reference(_) => quote! {
                ::eframe_domain::column::ColumnValue::reference(
                    self.#field.uuid(),
                    self.#field.is_populated(),
                )
            },
            Shape::Holder | Shape::Plain => quote!(::eframe_domain::column::ColumnValue::Present),
        };
        column_arms.push(quote!(#field_name => ::std::option::Option::Some(#column),));

        match &spec.shape {
            Shape::List(element) => {
                list_arms.push(quote! {
                    #field_name => ::std::option::Option::Some(
                        &mut self.#field as &mut dyn ::eframe_domain::relation::RecordList
                    ),
                });
                let lazy = match spec.association {
                    Association::ManyToMany(_) => quote!(lazy_ref_list_load),
                    _ => quote!(lazy_child_load),
                };
                let loader = loader_ident(field);
                loaders.push(quote! {
                    /// 懒加载并返回集合；已加载时不再访问存储
                    #vis async fn #loader(
                        &mut self,
                        engine: &::eframe_domain::DomainEngine,
                    ) -> ::eframe_domain::DomainResult<&[#element]> {
                        engine.#lazy(self, #field_name).await?;
                        ::std::result::Result::Ok(self.#field.as_deref().unwrap_or(&[]))
                    }
                });
            }
            Shape::Reference(element) => {
                reference_arms.push(quote! {
                    #field_name => ::std::option::Option::Some(
                        &mut self.#field as &mut dyn ::eframe_domain::relation::ReferenceSlot
                    ),
                });
                let assign = match &spec.association {
                    Association::ManyToOne {
                        setter: Some(setter),
                        ..
                    } => quote!(self.#setter(value);),
                    _ => quote!(self.#field = value;),
                };
                set_reference_arms.push(quote! {
                    #field_name => {
                        let value: #ty = ::eframe_domain::relation::Ref::from_erased(value)?;
                        #assign
                        ::std::result::Result::Ok(())
                    }
                });
                let loader = loader_ident(field);
                loaders.push(quote! {
                    /// 懒加载并返回引用的记录；每个实例最多读取一次
                    #vis async fn #loader(
                        &mut self,
                        engine: &::eframe_domain::DomainEngine,
                    ) -> ::eframe_domain::DomainResult<::std::option::Option<&#element>> {
                        engine.lazy_reference_load(self, #field_name).await?;
                        ::std::result::Result::Ok(self.#field.get())
                    }
                });
            }
            Shape::Holder => {
                if let Some(first) = holder {
                    return Err(syn::Error::new(
                        field.span(),
                        format!("duplicate #[extensible_field_holder]; already declared on '{first}'"),
                    ));
                }
                holder = Some(field);
            }
            _ => {}
        }
    }

    // 非静态声明的集合交给自定义字段容器
    let list_fallback = match holder {
        Some(h) => quote! {
            ::std::option::Option::Some(
                self.#h.child_list_mut(relation) as &mut dyn ::eframe_domain::relation::RecordList
            )
        },
        None => quote!(::std::option::Option::None),
    };
    let holder_fns = holder.map(|h| {
        quote! {
            fn field_holder(&self) -> ::std::option::Option<&::eframe_domain::custom::FieldHolderMap> {
                ::std::option::Option::Some(&self.#h)
            }

            fn field_holder_mut(
                &mut self,
            ) -> ::std::option::Option<&mut ::eframe_domain::custom::FieldHolderMap> {
                ::std::option::Option::Some(&mut self.#h)
            }
        }
    });

    let hooks_impl = (!cfg.hooks).then(|| {
        quote! {
            impl ::eframe_domain::entity::EntityHooks for #ident {}
        }
    });

    let loaders_impl = (!loaders.is_empty()).then(|| {
        quote! {
            impl #ident {
                #(#loaders)*
            }
        }
    });

    let expanded = quote! {
        #st

        impl ::eframe_domain::entity::DomainEntity for #ident {
            fn schema() -> &'static ::eframe_domain::schema::EntitySchema {
                #order_fn
                static SCHEMA: ::std::sync::OnceLock<::eframe_domain::schema::EntitySchema> =
                    ::std::sync::OnceLock::new();
                SCHEMA.get_or_init(|| {
                    ::eframe_domain::schema::EntitySchema::builder()
                        .name(#name)
                        .type_id(::std::any::TypeId::of::<#ident>())
                        #table
                        .fields(::std::vec![#uuid_descriptor, #(#descriptors),*])
                        #order_call
                        .build()
                })
            }

            fn entity_schema(&self) -> &'static ::eframe_domain::schema::EntitySchema {
                <Self as ::eframe_domain::entity::DomainEntity>::schema()
            }

            fn uuid(&self) -> ::std::option::Option<::eframe_domain::uuid::Uuid> {
                self.uuid
            }

            fn set_uuid(&mut self, uuid: ::std::option::Option<::eframe_domain::uuid::Uuid>) {
                self.uuid = uuid;
            }

            fn domain_settings(&self) -> &::eframe_domain::settings::DomainSettings {
                &self.domain_settings
            }

            fn domain_settings_mut(&mut self) -> &mut ::eframe_domain::settings::DomainSettings {
                &mut self.domain_settings
            }

            fn column_value(
                &self,
                property: &str,
            ) -> ::std::option::Option<::eframe_domain::column::ColumnValue<'_>> {
                match property {
                    "uuid" => ::std::option::Option::Some(
                        ::eframe_domain::column::ColumnValue::optional(&self.uuid),
                    ),
                    #(#column_arms)*
                    _ => ::std::option::Option::None,
                }
            }

            fn relation_list_mut(
                &mut self,
                relation: &::eframe_domain::schema::Relation,
            ) -> ::std::option::Option<&mut dyn ::eframe_domain::relation::RecordList> {
                match relation.field() {
                    #(#list_arms)*
                    _ => #list_fallback,
                }
            }

            fn reference_mut(
                &mut self,
                field: &str,
            ) -> ::std::option::Option<&mut dyn ::eframe_domain::relation::ReferenceSlot> {
                match field {
                    #(#reference_arms)*
                    _ => ::std::option::Option::None,
                }
            }

            fn set_reference(
                &mut self,
                field: &str,
                value: ::eframe_domain::relation::ErasedRef,
            ) -> ::eframe_domain::DomainResult<()> {
                match field {
                    #(#set_reference_arms)*
                    _ => {
                        ::std::mem::drop(value);
                        ::std::result::Result::Err(::eframe_domain::DomainError::UnknownProperty {
                            entity: #name,
                            property: field.to_string(),
                        })
                    }
                }
            }

            #holder_fns
        }

        #hooks_impl

        #loaders_impl
    };

    Ok(expanded)
}

/// 自然排序：`ordered` 使用类型自身的 `Ord`，`order_by = "field"` 比较指定字段
fn natural_order(
    ident: &Ident,
    order: Option<&NaturalOrder>,
) -> Result<(TokenStream2, TokenStream2)> {
    let compare = match order {
        None => return Ok((TokenStream2::new(), TokenStream2::new())),
        Some(NaturalOrder::Ord) => quote!(::std::cmp::Ord::cmp(a, b)),
        Some(NaturalOrder::Field(lit)) => {
            let field: Ident = lit.parse()?;
            quote!(::std::cmp::Ord::cmp(&a.#field, &b.#field))
        }
    };
    let order_fn = quote! {
        fn __natural_order(
            a: &dyn ::eframe_domain::entity::DomainEntity,
            b: &dyn ::eframe_domain::entity::DomainEntity,
        ) -> ::std::cmp::Ordering {
            let a = <dyn ::eframe_domain::entity::DomainEntity as ::eframe_domain::entity::AsAny>::as_any(a)
                .downcast_ref::<#ident>();
            let b = <dyn ::eframe_domain::entity::DomainEntity as ::eframe_domain::entity::AsAny>::as_any(b)
                .downcast_ref::<#ident>();
            match (a, b) {
                (::std::option::Option::Some(a), ::std::option::Option::Some(b)) => #compare,
                _ => ::std::cmp::Ordering::Equal,
            }
        }
    };
    let order_call = quote!(.natural_order(__natural_order as ::eframe_domain::schema::CompareFn));
    Ok((order_fn, order_call))
}

// -------- parsing --------

enum NaturalOrder {
    Ord,
    Field(LitStr),
}

struct DomainEntityAttrConfig {
    table: Option<LitStr>,
    order: Option<NaturalOrder>,
    hooks: bool,
    derive_debug: Option<bool>,
}

impl Parse for DomainEntityAttrConfig {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut cfg = DomainEntityAttrConfig {
            table: None,
            order: None,
            hooks: false,
            derive_debug: None,
        };
        if input.is_empty() {
            return Ok(cfg);
        }

        let elems: Punctuated<DomainEntityAttrElem, Token![,]> =
            Punctuated::<DomainEntityAttrElem, Token![,]>::parse_terminated(input)?;

        for elem in elems.into_iter() {
            match elem {
                DomainEntityAttrElem::Table(lit) => {
                    if cfg.table.is_some() {
                        return Err(syn::Error::new(
                            lit.span(),
                            "duplicate key 'table' in attribute",
                        ));
                    }
                    cfg.table = Some(lit);
                }
                DomainEntityAttrElem::Order(order, span) => {
                    if cfg.order.is_some() {
                        return Err(syn::Error::new(
                            span,
                            "'ordered' and 'order_by' are mutually exclusive",
                        ));
                    }
                    cfg.order = Some(order);
                }
                DomainEntityAttrElem::Hooks => cfg.hooks = true,
                DomainEntityAttrElem::Debug(b) => {
                    if cfg.derive_debug.is_some() {
                        return Err(syn::Error::new(
                            proc_macro2::Span::call_site(),
                            "duplicate key 'debug' in attribute",
                        ));
                    }
                    cfg.derive_debug = Some(b);
                }
            }
        }
        Ok(cfg)
    }
}

enum DomainEntityAttrElem {
    Table(LitStr),
    Order(NaturalOrder, proc_macro2::Span),
    Hooks,
    Debug(bool),
}

impl Parse for DomainEntityAttrElem {
    fn parse(input: ParseStream) -> Result<Self> {
        let key: syn::Ident = input.parse()?;
        if key == "table" {
            let _eq: Token![=] = input.parse()?;
            Ok(DomainEntityAttrElem::Table(input.parse()?))
        } else if key == "ordered" {
            Ok(DomainEntityAttrElem::Order(NaturalOrder::Ord, key.span()))
        } else if key == "order_by" {
            let _eq: Token![=] = input.parse()?;
            let lit: LitStr = input.parse()?;
            Ok(DomainEntityAttrElem::Order(NaturalOrder::Field(lit), key.span()))
        } else if key == "hooks" {
            Ok(DomainEntityAttrElem::Hooks)
        } else if key == "debug" {
            let _eq: Token![=] = input.parse()?;
            let expr: syn::Expr = input.parse()?;
            match expr {
                syn::Expr::Lit(syn::ExprLit {
                    lit: syn::Lit::Bool(b),
                    ..
                }) => Ok(DomainEntityAttrElem::Debug(b.value())),
                other => Err(syn::Error::new(
                    other.span(),
                    "expected boolean literal for 'debug'",
                )),
            }
        } else {
            Err(syn::Error::new(
                key.span(),
                "unknown key in attribute; expected 'table', 'ordered', 'order_by', 'hooks' or 'debug'",
            ))
        }
    }
}
