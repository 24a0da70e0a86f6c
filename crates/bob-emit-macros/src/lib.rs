use proc_macro::TokenStream;

use quote::quote;
use syn::spanned::Spanned;
use syn::{Attribute, Data, DeriveInput, Fields, GenericArgument, Meta, PathArguments, Type};

/// Derives the property walk used by the template engines.
///
/// Property records are tagged trees with a finite set of leaf shapes. The
/// derive maps each named field onto the matching visitor call:
///
/// - `String` fields are visited directly
/// - `Option<String>` fields are visited when present
/// - `Vec<String>` fields are visited as a slice (so the engine can strip
///   elements that expand to empty strings)
/// - fields marked `#[template(nested)]` recurse into their own walk
///
/// Every other field shape is skipped. The reported property name is the
/// field identifier as written.
#[proc_macro_derive(TemplateProps, attributes(template))]
pub fn derive_template_props(item: TokenStream) -> TokenStream {
    match template_props_impl(item) {
        Ok(ts) => ts,
        Err(e) => e.to_compile_error().into(),
    }
}

enum FieldShape {
    PlainString,
    OptionalString,
    StringSlice,
    Nested,
    Skipped,
}

fn is_template_nested(attrs: &[Attribute]) -> syn::Result<bool> {
    for attr in attrs {
        if !attr.path().is_ident("template") {
            continue;
        }
        let Meta::List(list) = &attr.meta else {
            return Err(syn::Error::new(
                attr.span(),
                "expected #[template(nested)]",
            ));
        };
        let ident: syn::Ident = syn::parse2(list.tokens.clone())
            .map_err(|_| syn::Error::new(attr.span(), "expected #[template(nested)]"))?;
        if ident != "nested" {
            return Err(syn::Error::new(
                attr.span(),
                format!("unknown template attribute '{ident}'"),
            ));
        }
        return Ok(true);
    }
    Ok(false)
}

fn single_generic_is_string(args: &PathArguments) -> bool {
    let PathArguments::AngleBracketed(ab) = args else {
        return false;
    };
    if ab.args.len() != 1 {
        return false;
    }
    match ab.args.first() {
        Some(GenericArgument::Type(inner)) => type_is_plain_string(inner),
        _ => false,
    }
}

fn type_is_plain_string(ty: &Type) -> bool {
    let Type::Path(tp) = ty else {
        return false;
    };
    let Some(seg) = tp.path.segments.last() else {
        return false;
    };
    seg.ident == "String" && matches!(seg.arguments, PathArguments::None)
}

fn classify(ty: &Type, attrs: &[Attribute]) -> syn::Result<FieldShape> {
    if is_template_nested(attrs)? {
        return Ok(FieldShape::Nested);
    }
    if type_is_plain_string(ty) {
        return Ok(FieldShape::PlainString);
    }
    let Type::Path(tp) = ty else {
        return Ok(FieldShape::Skipped);
    };
    let Some(seg) = tp.path.segments.last() else {
        return Ok(FieldShape::Skipped);
    };
    if seg.ident == "Option" && single_generic_is_string(&seg.arguments) {
        return Ok(FieldShape::OptionalString);
    }
    if seg.ident == "Vec" && single_generic_is_string(&seg.arguments) {
        return Ok(FieldShape::StringSlice);
    }
    Ok(FieldShape::Skipped)
}

fn template_props_impl(item: TokenStream) -> syn::Result<TokenStream> {
    let input: DeriveInput = syn::parse(item)?;
    let ident = input.ident.clone();

    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new(
            input.span(),
            "TemplateProps can only be derived for structs",
        ));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new(
            input.span(),
            "TemplateProps requires named fields",
        ));
    };

    let mut visits = Vec::new();
    for field in &fields.named {
        let field_ident = field.ident.clone().expect("named field");
        let prop_name = field_ident.to_string();
        match classify(&field.ty, &field.attrs)? {
            FieldShape::PlainString => visits.push(quote! {
                visitor.visit_string(#prop_name, &mut self.#field_ident)?;
            }),
            FieldShape::OptionalString => visits.push(quote! {
                if let Some(value) = self.#field_ident.as_mut() {
                    visitor.visit_string(#prop_name, value)?;
                }
            }),
            FieldShape::StringSlice => visits.push(quote! {
                visitor.visit_slice(#prop_name, &mut self.#field_ident)?;
            }),
            FieldShape::Nested => visits.push(quote! {
                crate::template::TemplateProps::walk_template_strings(
                    &mut self.#field_ident,
                    visitor,
                )?;
            }),
            FieldShape::Skipped => {}
        }
    }

    let expanded = quote! {
        impl crate::template::TemplateProps for #ident {
            fn walk_template_strings(
                &mut self,
                visitor: &mut dyn crate::template::TemplateVisitor,
            ) -> crate::error::Result<()> {
                #(#visits)*
                Ok(())
            }
        }
    };
    Ok(expanded.into())
}
