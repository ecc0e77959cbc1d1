//! Proc macros for `doc-migrate`.
//!
//! Provides two macros:
//!
//! - **`#[schema]`**: attribute macro that implements `Schema` for a record,
//!   checking the version literal at compile time.
//!
//! - **`#[derive(Document)]`**: derives the tag dispatch and the conversions
//!   for an enum over all shapes of a document.

use proc_macro::TokenStream;
use quote::quote;
use syn::{
    parse_macro_input, punctuated::Punctuated, token::Comma, Data, DeriveInput, Fields, Meta,
};

/// Attribute macro that implements `doc_migrate::Schema` for a struct or enum.
///
/// # Attributes
///
/// - `version = "M.P"`: **Required.** The schema version, in canonical
///   `"<minor>.<patch>"` form. A malformed literal is a compile error.
///
/// # Example
///
/// ```ignore
/// use doc_migrate::schema;
/// use serde::{Deserialize, Serialize};
///
/// #[schema(version = "0.2")]
/// #[derive(Debug, Serialize, Deserialize)]
/// struct UserV2 {
///     home: String,
///     age: i64,
/// }
/// ```
#[proc_macro_attribute]
pub fn schema(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);
    let args = parse_macro_input!(attr with Punctuated::<Meta, Comma>::parse_terminated);

    let mut version: Option<syn::LitStr> = None;

    for meta in &args {
        let Meta::NameValue(nv) = meta else {
            return syn::Error::new_spanned(meta, "expected `version = \"<minor>.<patch>\"`")
                .to_compile_error()
                .into();
        };
        let key = nv
            .path
            .get_ident()
            .map(|i| i.to_string())
            .unwrap_or_default();
        match key.as_str() {
            "version" => {
                if let syn::Expr::Lit(syn::ExprLit {
                    lit: syn::Lit::Str(lit),
                    ..
                }) = &nv.value
                {
                    version = Some(lit.clone());
                } else {
                    return syn::Error::new_spanned(&nv.value, "`version` must be a string literal")
                        .to_compile_error()
                        .into();
                }
            }
            _ => {
                return syn::Error::new_spanned(&nv.path, format!("unknown attribute `{key}`"))
                    .to_compile_error()
                    .into();
            }
        }
    }

    let Some(version) = version else {
        return syn::Error::new(
            proc_macro2::Span::call_site(),
            "missing required attribute `version`",
        )
        .to_compile_error()
        .into();
    };

    let Some((minor, patch)) = parse_version(&version.value()) else {
        return syn::Error::new_spanned(
            &version,
            format!(
                "invalid version {:?}: expected \"<minor>.<patch>\"",
                version.value()
            ),
        )
        .to_compile_error()
        .into();
    };

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let expanded = quote! {
        #input

        impl #impl_generics ::doc_migrate::Schema for #name #ty_generics #where_clause {
            const VERSION: ::doc_migrate::Version = ::doc_migrate::Version::new(#minor, #patch);
        }
    };

    expanded.into()
}

fn parse_version(text: &str) -> Option<(u32, u32)> {
    let (minor, patch) = text.split_once('.')?;
    Some((parse_part(minor)?, parse_part(patch)?))
}

fn parse_part(part: &str) -> Option<u32> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

/// Derive `doc_migrate::Document` for an enum over schema records.
///
/// Every variant must hold exactly one unnamed field whose type implements
/// `Schema`. Besides the `Document` impl, the derive generates
/// `From<Record> for Enum` and `TryFrom<Enum> for Record` (with the enum
/// itself as the error, so a failed narrowing keeps the document).
///
/// # Example
///
/// ```ignore
/// use doc_migrate::Document;
///
/// #[derive(Document)]
/// enum User {
///     V1(UserV1),
///     V2(UserV2),
/// }
/// ```
#[proc_macro_derive(Document)]
pub fn derive_document(item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);
    let name = &input.ident;

    if !input.generics.params.is_empty() {
        return syn::Error::new_spanned(&input.generics, "`Document` enums cannot be generic")
            .to_compile_error()
            .into();
    }

    let Data::Enum(data) = &input.data else {
        return syn::Error::new_spanned(&input.ident, "`Document` can only be derived for enums")
            .to_compile_error()
            .into();
    };

    let mut variants = Vec::new();
    for variant in &data.variants {
        match &variant.fields {
            Fields::Unnamed(fields) if fields.unnamed.len() == 1 => {
                variants.push((&variant.ident, &fields.unnamed[0].ty));
            }
            _ => {
                return syn::Error::new_spanned(
                    variant,
                    "each `Document` variant must wrap exactly one schema record",
                )
                .to_compile_error()
                .into();
            }
        }
    }

    if variants.is_empty() {
        return syn::Error::new_spanned(name, "`Document` enum needs at least one variant")
            .to_compile_error()
            .into();
    }

    let version_arms = variants.iter().map(|(ident, ty)| {
        quote! { #name::#ident(_) => <#ty as ::doc_migrate::Schema>::VERSION, }
    });

    let conversions = variants.iter().map(|(ident, ty)| {
        quote! {
            impl ::core::convert::From<#ty> for #name {
                fn from(value: #ty) -> Self {
                    #name::#ident(value)
                }
            }

            impl ::core::convert::TryFrom<#name> for #ty {
                type Error = #name;

                #[allow(unreachable_patterns)]
                fn try_from(doc: #name) -> ::core::result::Result<Self, #name> {
                    match doc {
                        #name::#ident(value) => ::core::result::Result::Ok(value),
                        other => ::core::result::Result::Err(other),
                    }
                }
            }
        }
    });

    let expanded = quote! {
        impl ::doc_migrate::Document for #name {
            fn version(&self) -> ::doc_migrate::Version {
                match self {
                    #(#version_arms)*
                }
            }
        }

        #(#conversions)*
    };

    expanded.into()
}
