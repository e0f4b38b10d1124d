//! Procedural macros for **assist_core**
#![forbid(unsafe_code)]

use proc_macro::TokenStream;
use proc_macro_crate::{FoundCrate, crate_name};
use proc_macro_error::{abort, proc_macro_error};
use quote::quote;
use syn::{
    Attribute, Data, DeriveInput, Expr, ExprLit, Field, Fields, FieldsNamed, FieldsUnnamed, Lit,
    LitStr, Meta, Type, TypePath, parse_macro_input,
};

// ============================================================================
// TOOL SCHEMA DERIVE MACRO
// ============================================================================

#[proc_macro_error]
#[proc_macro_derive(ToolSchema, attributes(serde))]
pub fn derive_tool_schema(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match &input.data {
        Data::Struct(data_struct) => match &data_struct.fields {
            Fields::Named(fields) => generate_struct_schema(&input, fields),
            Fields::Unnamed(fields) => generate_tuple_struct_schema(&input, fields),
            Fields::Unit => generate_unit_struct_schema(&input),
        },
        Data::Enum(_) => {
            abort!(input.ident, "Enum schemas are not yet supported");
        }
        Data::Union(_) => {
            abort!(input.ident, "Union schemas are not supported");
        }
    }
}

fn generate_struct_schema(input: &DeriveInput, fields: &FieldsNamed) -> TokenStream {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let crate_path = get_crate_path();
    let rename_all = container_rename_rule(&input.attrs);

    let mut inserts = Vec::new();
    let mut required_fields = Vec::new();

    for field in &fields.named {
        let attrs = FieldAttrs::parse(field);
        if attrs.skip {
            continue;
        }

        let Some(ident) = field.ident.as_ref() else {
            abort!(field, "named struct field without an identifier");
        };
        let wire_name = attrs
            .rename
            .unwrap_or_else(|| rename_all.apply(&ident.to_string()));
        let field_type = &field.ty;

        if !is_option_type(field_type) {
            required_fields.push(wire_name.clone());
        }

        let doc = docs(&field.attrs);
        let describe = if doc.is_empty() {
            quote! {}
        } else {
            quote! {
                if let Some(obj) = field_schema.as_object_mut() {
                    obj.insert(
                        "description".to_string(),
                        ::serde_json::Value::String(#doc.to_string()),
                    );
                }
            }
        };

        inserts.push(quote! {
            {
                #[allow(unused_mut)]
                let mut field_schema = <#field_type as #crate_path::ToolSchema>::schema();
                #describe
                properties.insert(#wire_name.to_string(), field_schema);
            }
        });
    }

    let required_array = if required_fields.is_empty() {
        quote! { ::std::vec::Vec::<&str>::new() }
    } else {
        quote! { vec![#(#required_fields),*] }
    };

    TokenStream::from(quote! {
        impl #impl_generics #crate_path::ToolSchema for #name #ty_generics #where_clause {
            fn schema() -> ::serde_json::Value {
                static SCHEMA: #crate_path::once_cell::sync::Lazy<::serde_json::Value> = #crate_path::once_cell::sync::Lazy::new(|| {
                    let mut properties = ::serde_json::Map::new();
                    #(#inserts)*

                    ::serde_json::json!({
                        "type": "object",
                        "properties": properties,
                        "required": #required_array
                    })
                });
                SCHEMA.clone()
            }
        }
    })
}

fn generate_tuple_struct_schema(input: &DeriveInput, fields: &FieldsUnnamed) -> TokenStream {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let crate_path = get_crate_path();

    // serde treats a single-field tuple struct as its inner value.
    if fields.unnamed.len() == 1 {
        let inner = &fields.unnamed[0].ty;
        return TokenStream::from(quote! {
            impl #impl_generics #crate_path::ToolSchema for #name #ty_generics #where_clause {
                fn schema() -> ::serde_json::Value {
                    <#inner as #crate_path::ToolSchema>::schema()
                }
            }
        });
    }

    let field_schemas: Vec<_> = fields
        .unnamed
        .iter()
        .map(|field| {
            let field_type = &field.ty;
            quote! { <#field_type as #crate_path::ToolSchema>::schema() }
        })
        .collect();

    let field_count = fields.unnamed.len();

    TokenStream::from(quote! {
        impl #impl_generics #crate_path::ToolSchema for #name #ty_generics #where_clause {
            fn schema() -> ::serde_json::Value {
                static SCHEMA: #crate_path::once_cell::sync::Lazy<::serde_json::Value> = #crate_path::once_cell::sync::Lazy::new(|| {
                    ::serde_json::json!({
                        "type": "array",
                        "prefixItems": [#(#field_schemas),*],
                        "minItems": #field_count,
                        "maxItems": #field_count
                    })
                });
                SCHEMA.clone()
            }
        }
    })
}

fn generate_unit_struct_schema(input: &DeriveInput) -> TokenStream {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let crate_path = get_crate_path();

    TokenStream::from(quote! {
        impl #impl_generics #crate_path::ToolSchema for #name #ty_generics #where_clause {
            fn schema() -> ::serde_json::Value {
                ::serde_json::json!({
                    "type": "object",
                    "properties": {},
                    "required": ::std::vec::Vec::<&str>::new()
                })
            }
        }
    })
}

fn get_crate_path() -> proc_macro2::TokenStream {
    match crate_name("assist_core") {
        Ok(FoundCrate::Itself) => quote!(crate),
        Ok(FoundCrate::Name(name)) => {
            let ident = proc_macro2::Ident::new(&name, proc_macro2::Span::call_site());
            quote!(#ident)
        }
        Err(_) => quote!(::assist_core),
    }
}

// ============================================================================
// SERDE ATTRIBUTES
// ============================================================================

/// Subset of `#[serde(rename_all = "...")]` rules the schema follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RenameRule {
    None,
    CamelCase,
    SnakeCase,
}

impl RenameRule {
    fn from_literal(lit: &LitStr) -> Self {
        match lit.value().as_str() {
            "camelCase" => Self::CamelCase,
            "snake_case" => Self::SnakeCase,
            other => abort!(lit, "unsupported rename_all rule `{}`", other),
        }
    }

    fn apply(self, field: &str) -> String {
        match self {
            Self::None | Self::SnakeCase => field.to_owned(),
            Self::CamelCase => to_camel_case(field),
        }
    }
}

fn to_camel_case(snake: &str) -> String {
    let mut out = String::with_capacity(snake.len());
    let mut upper_next = false;
    for ch in snake.trim_start_matches("r#").chars() {
        if ch == '_' {
            upper_next = !out.is_empty();
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

fn container_rename_rule(attrs: &[Attribute]) -> RenameRule {
    let mut rule = RenameRule::None;
    for attr in attrs.iter().filter(|a| a.path().is_ident("serde")) {
        let parsed = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename_all") {
                let lit: LitStr = meta.value()?.parse()?;
                rule = RenameRule::from_literal(&lit);
            } else {
                skip_meta_value(&meta)?;
            }
            Ok(())
        });
        if let Err(err) = parsed {
            abort!(attr, "failed to parse serde attribute: {}", err);
        }
    }
    rule
}

#[derive(Default)]
struct FieldAttrs {
    rename: Option<String>,
    skip: bool,
}

impl FieldAttrs {
    fn parse(field: &Field) -> Self {
        let mut out = Self::default();
        for attr in field.attrs.iter().filter(|a| a.path().is_ident("serde")) {
            let parsed = attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") {
                    let lit: LitStr = meta.value()?.parse()?;
                    out.rename = Some(lit.value());
                } else if meta.path.is_ident("skip") || meta.path.is_ident("skip_deserializing") {
                    out.skip = true;
                } else {
                    skip_meta_value(&meta)?;
                }
                Ok(())
            });
            if let Err(err) = parsed {
                abort!(attr, "failed to parse serde attribute: {}", err);
            }
        }
        out
    }
}

/// Consumes the value of a serde option the schema does not care about,
/// e.g. `default`, `default = "path"` or `rename(serialize = "..")`.
fn skip_meta_value(meta: &syn::meta::ParseNestedMeta<'_>) -> syn::Result<()> {
    if meta.input.peek(syn::Token![=]) {
        let _: Expr = meta.value()?.parse()?;
    } else if meta.input.peek(syn::token::Paren) {
        let _content;
        syn::parenthesized!(_content in meta.input);
    }
    Ok(())
}

/// Gather `///` doc-comments into a single string, trimming the leading space after `///`.
fn docs(attrs: &[Attribute]) -> String {
    attrs
        .iter()
        .filter_map(|a| match &a.meta {
            Meta::NameValue(nv) if a.path().is_ident("doc") => {
                if let Expr::Lit(ExprLit {
                    lit: Lit::Str(s), ..
                }) = &nv.value
                {
                    Some(s.value().trim().to_owned())
                } else {
                    None
                }
            }
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_owned()
}

fn is_option_type(ty: &Type) -> bool {
    let Type::Path(TypePath { qself: None, path }) = ty else {
        return false;
    };

    let Some(last) = path.segments.last() else {
        return false;
    };
    if last.ident != "Option" {
        return false;
    }

    match path
        .segments
        .iter()
        .map(|s| &s.ident)
        .collect::<Vec<_>>()
        .as_slice()
    {
        [ident] if *ident == "Option" => true,
        [first, second, ident]
            if (*first == "std" || *first == "core")
                && *second == "option"
                && *ident == "Option" =>
        {
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::{Type, parse_quote};

    #[test]
    fn test_is_option_type_detection() {
        let simple_option: Type = parse_quote!(Option<i32>);
        assert!(is_option_type(&simple_option));

        let std_option: Type = parse_quote!(std::option::Option<String>);
        assert!(is_option_type(&std_option));

        let vec_type: Type = parse_quote!(Vec<i32>);
        assert!(!is_option_type(&vec_type));

        let fake_option: Type = parse_quote!(my_mod::Option<i32>);
        assert!(!is_option_type(&fake_option));
    }

    #[test]
    fn test_camel_case_conversion() {
        assert_eq!(to_camel_case("user_id"), "userId");
        assert_eq!(to_camel_case("date_created"), "dateCreated");
        assert_eq!(to_camel_case("count"), "count");
        assert_eq!(to_camel_case("_private_field"), "privateField");
    }

    #[test]
    fn test_container_rename_rule() {
        let input: DeriveInput = parse_quote! {
            #[derive(Deserialize)]
            #[serde(deny_unknown_fields, rename_all = "camelCase")]
            struct Input {
                user_id: Option<String>,
            }
        };
        assert_eq!(container_rename_rule(&input.attrs), RenameRule::CamelCase);

        let plain: DeriveInput = parse_quote! {
            struct Plain { a: i32 }
        };
        assert_eq!(container_rename_rule(&plain.attrs), RenameRule::None);
    }

    #[test]
    fn test_field_attrs() {
        let input: DeriveInput = parse_quote! {
            struct Record {
                #[serde(rename = "ID")]
                id: String,
                #[serde(default, skip)]
                cache: Vec<u8>,
                #[serde(default = "zero")]
                count: i64,
            }
        };
        let Data::Struct(data) = &input.data else {
            panic!("Expected struct");
        };
        let attrs: Vec<_> = data.fields.iter().map(FieldAttrs::parse).collect();

        assert_eq!(attrs[0].rename.as_deref(), Some("ID"));
        assert!(!attrs[0].skip);
        assert!(attrs[1].skip);
        assert!(attrs[2].rename.is_none());
        assert!(!attrs[2].skip);
    }

    #[test]
    fn test_docs_joined() {
        let field: Field = parse_quote! {
            /// Owner of the records.
            /// Empty means none.
            user_id: String
        };
        assert_eq!(docs(&field.attrs), "Owner of the records. Empty means none.");
    }
}
