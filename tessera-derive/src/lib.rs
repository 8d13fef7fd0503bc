use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, DeriveInput};

mod schema;

/// Derive macro for the Model trait.
///
/// Generates `schema()`, describing the struct's attributes and
/// relationships. Every named field is an attribute unless annotated.
///
/// # Example
///
/// ```ignore
/// use tessera_core::Model;
///
/// #[derive(Model)]
/// struct BlogPost {
///     title: String,
///     #[model(belongs_to = "user", inverse = "posts")]
///     author: Option<String>,
///     #[model(has_many = "tag")]
///     tags: Vec<String>,
/// }
///
/// assert_eq!(BlogPost::schema().name(), "blog_post");
/// ```
///
/// # Attributes
///
/// On the struct:
/// - `#[model(name = "post")]` - Model name (defaults to the snake_case struct name)
///
/// On fields:
/// - `#[model(belongs_to = "type")]` / `#[model(has_many = "type")]` - Declare a relationship
/// - `#[model(inverse = "key")]` - Name the inverse relationship on the target
/// - `#[model(polymorphic)]` - Members may be of any model
/// - `#[model(rename = "key")]` - Use a custom property name
/// - `#[model(skip)]` - Leave the field out of the schema
#[proc_macro_derive(Model, attributes(model))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match derive_model_impl(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn derive_model_impl(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let container = parse_container_attrs(&input.attrs)?;
    let schema_impl = schema::generate_schema(input, &container)?;

    Ok(quote! {
        impl #impl_generics ::tessera_core::Model for #name #ty_generics #where_clause {
            #schema_impl
        }
    })
}

#[derive(Default)]
pub(crate) struct ContainerAttrs {
    pub name: Option<String>,
}

pub(crate) fn parse_container_attrs(attrs: &[syn::Attribute]) -> syn::Result<ContainerAttrs> {
    let mut result = ContainerAttrs::default();

    for attr in attrs {
        if !attr.path().is_ident("model") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let value: syn::LitStr = meta.value()?.parse()?;
                result.name = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("unsupported model attribute, expected `name`"))
            }
        })?;
    }

    Ok(result)
}

#[derive(Default)]
pub(crate) struct FieldAttrs {
    pub skip: bool,
    pub rename: Option<String>,
    pub belongs_to: Option<String>,
    pub has_many: Option<String>,
    pub inverse: Option<String>,
    pub polymorphic: bool,
}

pub(crate) fn parse_field_attrs(attrs: &[syn::Attribute]) -> syn::Result<FieldAttrs> {
    let mut result = FieldAttrs::default();

    for attr in attrs {
        if !attr.path().is_ident("model") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                result.skip = true;
            } else if meta.path.is_ident("polymorphic") {
                result.polymorphic = true;
            } else if meta.path.is_ident("rename") {
                let value: syn::LitStr = meta.value()?.parse()?;
                result.rename = Some(value.value());
            } else if meta.path.is_ident("belongs_to") {
                let value: syn::LitStr = meta.value()?.parse()?;
                result.belongs_to = Some(value.value());
            } else if meta.path.is_ident("has_many") {
                let value: syn::LitStr = meta.value()?.parse()?;
                result.has_many = Some(value.value());
            } else if meta.path.is_ident("inverse") {
                let value: syn::LitStr = meta.value()?.parse()?;
                result.inverse = Some(value.value());
            } else {
                return Err(meta.error("unsupported model attribute"));
            }
            Ok(())
        })?;

        if result.belongs_to.is_some() && result.has_many.is_some() {
            return Err(syn::Error::new_spanned(
                attr,
                "a field cannot be both `belongs_to` and `has_many`",
            ));
        }
        if result.belongs_to.is_none()
            && result.has_many.is_none()
            && (result.inverse.is_some() || result.polymorphic)
        {
            return Err(syn::Error::new_spanned(
                attr,
                "`inverse` and `polymorphic` require `belongs_to` or `has_many`",
            ));
        }
    }

    Ok(result)
}
