#![recursion_limit = "256"]

type TokenStream1 = proc_macro::TokenStream;
type TokenStream2 = proc_macro2::TokenStream;

use quote::quote;
use syn::{Fields, Type};

/// Derives `rsmp::datatype::Equivalence` for a struct. Every field type has to implement
/// `Equivalence` itself, or be an array or tuple of such types.
///
/// Use `#[rsmp(crate = "::path::to::rsmp")]` if the crate is not available as `::rsmp`.
#[proc_macro_derive(Equivalence, attributes(rsmp))]
pub fn create_user_layout(input: TokenStream1) -> TokenStream1 {
    let ast: syn::DeriveInput = syn::parse(input).expect("Couldn't parse struct");
    let result = match ast.data {
        syn::Data::Enum(_) => panic!("#[derive(Equivalence)] is not compatible with enums"),
        syn::Data::Union(_) => panic!("#[derive(Equivalence)] is not compatible with unions"),
        syn::Data::Struct(ref s) => crate_path(&ast)
            .and_then(|krate| equivalence_for_struct(&ast, &s.fields, &krate)),
    };
    result.unwrap_or_else(syn::Error::into_compile_error).into()
}

fn crate_path(ast: &syn::DeriveInput) -> syn::Result<syn::Path> {
    let mut krate: syn::Path = syn::parse_quote!(::rsmp);
    for attr in ast.attrs.iter().filter(|attr| attr.path().is_ident("rsmp")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("crate") {
                let path: syn::LitStr = meta.value()?.parse()?;
                krate = path.parse()?;
                Ok(())
            } else {
                Err(meta.error("unsupported rsmp attribute"))
            }
        })?;
    }
    Ok(krate)
}

fn offset_of(
    type_ident: &dyn quote::ToTokens,
    field_name: &dyn quote::ToTokens,
    krate: &syn::Path,
) -> TokenStream2 {
    quote!(#krate::export::memoffset::offset_of!(#type_ident, #field_name))
}

fn equivalence_for_tuple_field(type_tuple: &syn::TypeTuple, krate: &syn::Path) -> TokenStream2 {
    let fields = type_tuple.elems.iter().enumerate().map(|(i, elem)| {
        let field = syn::Index::from(i);
        let layout = equivalence_for_type(elem, krate);
        quote! {
            (
                #krate::export::memoffset::offset_of_tuple!(#type_tuple, #field) as #krate::Address,
                #layout,
            )
        }
    });

    quote! {
        #krate::datatype::Layout::resized(
            ::std::mem::size_of::<#type_tuple>(),
            &#krate::datatype::Layout::struct_of(::std::vec![#(#fields),*])?,
        )?
    }
}

fn equivalence_for_array_field(type_array: &syn::TypeArray, krate: &syn::Path) -> TokenStream2 {
    let ty = equivalence_for_type(&type_array.elem, krate);
    let len = &type_array.len;
    quote! { #krate::datatype::Layout::contiguous((#len) as #krate::Count, &#ty)? }
}

fn equivalence_for_type(ty: &syn::Type, krate: &syn::Path) -> TokenStream2 {
    match ty {
        Type::Path(ref type_path) => quote!(
                <#type_path as #krate::datatype::Equivalence>::equivalent_layout()),
        Type::Tuple(ref type_tuple) => equivalence_for_tuple_field(type_tuple, krate),
        Type::Array(ref type_array) => equivalence_for_array_field(type_array, krate),
        _ => panic!("Unsupported type!"),
    }
}

fn equivalence_for_struct(
    ast: &syn::DeriveInput,
    fields: &Fields,
    krate: &syn::Path,
) -> syn::Result<TokenStream2> {
    let ident = &ast.ident;
    if !ast.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &ast.generics,
            "#[derive(Equivalence)] is not compatible with generic structs",
        ));
    }

    let field_offsets: Vec<_> = match fields {
        Fields::Named(ref fields) => fields
            .named
            .iter()
            .map(|field| offset_of(&ident, field.ident.as_ref().unwrap(), krate))
            .collect(),
        Fields::Unnamed(ref fields) => fields
            .unnamed
            .iter()
            .enumerate()
            .map(|(i, _)| offset_of(&ident, &syn::Index::from(i), krate))
            .collect(),
        Fields::Unit => vec![],
    };

    let entries = field_offsets
        .iter()
        .zip(fields.iter())
        .map(|(offset, field)| {
            let layout = equivalence_for_type(&field.ty, krate);
            quote!((#offset as #krate::Address, #layout))
        });

    Ok(quote! {
        unsafe impl #krate::datatype::Equivalence for #ident {
            fn equivalent_layout() -> #krate::datatype::Layout {
                static LAYOUT: #krate::export::Lazy<#krate::datatype::Layout> =
                    #krate::export::Lazy::new(|| {
                        let build = || -> #krate::Result<#krate::datatype::Layout> {
                            let fields: ::std::vec::Vec<(#krate::Address, #krate::datatype::Layout)> =
                                ::std::vec![#(#entries),*];
                            let layout = #krate::datatype::Layout::resized(
                                ::std::mem::size_of::<#ident>(),
                                &#krate::datatype::Layout::struct_of(fields)?,
                            )?;
                            layout.commit()?;
                            ::std::result::Result::Ok(layout)
                        };
                        build().expect("Derived layout of a struct is invalid")
                    });
                LAYOUT.clone()
            }
        }
    })
}
