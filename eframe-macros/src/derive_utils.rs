use quote::ToTokens;
use syn::punctuated::Punctuated;
use syn::{Attribute, Path, Token};

/// 把宏要求的派生合并进已有的 `#[derive(...)]`
/// - 所有 derive 属性被合并为一条并置于最前；
/// - 按末段名去重（`Serialize` 与 `serde::Serialize` 视为同一个），required 优先。
pub(crate) fn apply_derives(attrs: &mut Vec<Attribute>, required: Vec<Path>) {
    let mut existing: Vec<Path> = Vec::new();
    attrs.retain(|attr| {
        if !attr.path().is_ident("derive") {
            return true;
        }
        if let Ok(list) = attr.parse_args_with(Punctuated::<Path, Token![,]>::parse_terminated) {
            existing.extend(list);
        }
        false
    });

    let mut merged: Vec<Path> = Vec::with_capacity(required.len() + existing.len());
    for path in required.into_iter().chain(existing) {
        let key = derive_key(&path);
        if !merged.iter().any(|p| derive_key(p) == key) {
            merged.push(path);
        }
    }
    attrs.insert(0, syn::parse_quote!(#[derive(#(#merged),*)]));
}

/// 派生去重用的 key
pub(crate) fn derive_key(path: &Path) -> String {
    match path.segments.last() {
        Some(last) => match last.ident.to_string().as_str() {
            name @ ("Serialize" | "Deserialize") => format!("serde::{name}"),
            name => name.to_string(),
        },
        None => path.to_token_stream().to_string(),
    }
}

/// 在字段上追加一条 `#[serde(...)]`，若已存在同样的键则跳过
pub(crate) fn add_serde_flag(attrs: &mut Vec<Attribute>, flag: &str) {
    let present = attrs.iter().filter(|a| a.path().is_ident("serde")).any(|a| {
        let mut found = false;
        let _ = a.parse_nested_meta(|meta| {
            if meta.path.is_ident(flag) {
                found = true;
            }
            Ok(())
        });
        found
    });
    if !present {
        let ident = syn::Ident::new(flag, proc_macro2::Span::call_site());
        attrs.push(syn::parse_quote!(#[serde(#ident)]));
    }
}
