use proc_macro2::TokenStream;
use quote::quote;
use syn::ext::IdentExt;
use syn::DeriveInput;

use crate::{parse_field_attrs, ContainerAttrs, FieldAttrs};

/// Generates the `schema()` method implementation.
pub fn generate_schema(
    input: &DeriveInput,
    container: &ContainerAttrs,
) -> syn::Result<TokenStream> {
    let fields = match &input.data {
        syn::Data::Struct(syn::DataStruct {
            fields: syn::Fields::Named(fields),
            ..
        }) => fields,
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "Model can only be derived for structs with named fields",
            ));
        }
    };

    let model_name = container
        .name
        .clone()
        .unwrap_or_else(|| snake_case(&input.ident.unraw().to_string()));

    let mut properties = Vec::with_capacity(fields.named.len());
    for field in &fields.named {
        let attrs = parse_field_attrs(&field.attrs)?;
        if attrs.skip {
            continue;
        }
        let Some(ident) = &field.ident else {
            continue;
        };
        let key = attrs
            .rename
            .clone()
            .unwrap_or_else(|| ident.unraw().to_string());

        properties.push(match relationship_meta(&attrs) {
            Some(meta) => quote! { .relationship(#key, #meta) },
            None => quote! { .attribute(#key) },
        });
    }

    Ok(quote! {
        fn schema() -> ::tessera_core::TypeSchema {
            ::tessera_core::TypeSchema::new(#model_name)
                #(#properties)*
        }
    })
}

fn relationship_meta(attrs: &FieldAttrs) -> Option<TokenStream> {
    let constructor = match (&attrs.belongs_to, &attrs.has_many) {
        (Some(target), _) => quote! { ::tessera_core::RelationshipMeta::belongs_to(#target) },
        (None, Some(target)) => quote! { ::tessera_core::RelationshipMeta::has_many(#target) },
        (None, None) => return None,
    };
    let inverse = attrs.inverse.as_ref().map(|key| quote! { .inverse(#key) });
    let polymorphic = attrs.polymorphic.then(|| quote! { .polymorphic() });

    Some(quote! { #constructor #inverse #polymorphic })
}

/// `BlogPost` -> `blog_post`, `HTTPRequest` -> `http_request`.
fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1);
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(|n| n.is_lowercase()),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snake_case_names() {
        assert_eq!(snake_case("Post"), "post");
        assert_eq!(snake_case("BlogPost"), "blog_post");
        assert_eq!(snake_case("HTTPRequest"), "http_request");
        assert_eq!(snake_case("Photo2Album"), "photo2_album");
        assert_eq!(snake_case("already_snake"), "already_snake");
    }

    #[test]
    fn rejects_tuple_structs() {
        let input: DeriveInput = syn::parse_quote! { struct Pair(u32, u32); };
        assert!(generate_schema(&input, &ContainerAttrs::default()).is_err());
    }

    #[test]
    fn generates_builder_chain() {
        let input: DeriveInput = syn::parse_quote! {
            struct Post {
                title: String,
                #[model(belongs_to = "user")]
                author: String,
            }
        };

        let tokens = generate_schema(&input, &ContainerAttrs::default())
            .unwrap()
            .to_string()
            .replace(' ', "");
        assert!(tokens.contains(r#"TypeSchema::new("post")"#));
        assert!(tokens.contains(r#".attribute("title")"#));
        assert!(tokens.contains(
            r#".relationship("author",::tessera_core::RelationshipMeta::belongs_to("user"))"#
        ));
    }
}
