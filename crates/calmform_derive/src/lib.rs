use proc_macro::TokenStream;
use proc_macro2::{Ident, Span, TokenStream as TokenStream2};
use proc_macro_crate::{FoundCrate, crate_name};
use quote::{format_ident, quote};
use syn::{Data, DeriveInput, Field, Fields, parse_macro_input};

/// Implements `FormData` and `FormModel` for a struct with named fields.
///
/// Fields marked `#[form(nested)]` must themselves derive `FormModel`; their
/// accessor on the generated `<Name>Fields` type returns the nested fields
/// instead of a single path.
#[proc_macro_derive(FormModel, attributes(form))]
pub fn derive_form_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    if !input.generics.params.is_empty() {
        return syn::Error::new_spanned(
            input.ident,
            "FormModel derive currently supports only non-generic structs",
        )
        .to_compile_error()
        .into();
    }

    let model_ident = input.ident;
    let fields_struct_ident = format_ident!("{model_ident}Fields");

    let named_fields = match input.data {
        Data::Struct(data) => match data.fields {
            Fields::Named(fields) => fields.named,
            _ => {
                return syn::Error::new_spanned(
                    &model_ident,
                    "FormModel derive requires a struct with named fields",
                )
                .to_compile_error()
                .into();
            }
        },
        _ => {
            return syn::Error::new_spanned(
                &model_ident,
                "FormModel derive is only supported on structs",
            )
            .to_compile_error()
            .into();
        }
    };

    let calmform = calmform_path();
    let mut fields_methods = Vec::new();
    let mut to_entries = Vec::new();
    let mut from_entries = Vec::new();

    for field in named_fields {
        let nested = match is_nested(&field) {
            Ok(nested) => nested,
            Err(error) => return error.to_compile_error().into(),
        };
        let Some(field_ident) = field.ident else {
            continue;
        };
        let field_ty = field.ty;
        let field_name = field_ident.to_string();

        if nested {
            fields_methods.push(quote! {
                pub fn #field_ident(&self) -> <#field_ty as #calmform::FormModel>::Fields {
                    <#field_ty as #calmform::FormModel>::fields_at(self.prefix.child(#field_name))
                }
            });
        } else {
            fields_methods.push(quote! {
                pub fn #field_ident(&self) -> #calmform::FieldPath {
                    self.prefix.child(#field_name)
                }
            });
        }

        to_entries.push(quote! {
            state.insert(
                #field_name,
                <#field_ty as #calmform::FormData>::to_field_value(&self.#field_ident),
            );
        });

        from_entries.push(quote! {
            #field_ident: <#field_ty as #calmform::FormData>::from_field_value(
                state.get(#field_name).unwrap_or(&#calmform::FieldValue::Null),
            )?,
        });
    }

    quote! {
        #[derive(Clone, Debug, Default)]
        pub struct #fields_struct_ident {
            prefix: #calmform::FieldPath,
        }

        impl #fields_struct_ident {
            #(#fields_methods)*
        }

        impl #calmform::FormData for #model_ident {
            fn to_field_value(&self) -> #calmform::FieldValue {
                let mut state = #calmform::FormState::new();
                #(#to_entries)*
                #calmform::FieldValue::Object(state)
            }

            fn from_field_value(value: &#calmform::FieldValue) -> ::std::option::Option<Self> {
                let state = value.as_object()?;
                ::std::option::Option::Some(Self {
                    #(#from_entries)*
                })
            }
        }

        impl #calmform::FormModel for #model_ident {
            type Fields = #fields_struct_ident;

            fn fields_at(prefix: #calmform::FieldPath) -> Self::Fields {
                #fields_struct_ident { prefix }
            }
        }
    }
    .into()
}

fn is_nested(field: &Field) -> syn::Result<bool> {
    let mut nested = false;
    for attr in &field.attrs {
        if !attr.path().is_ident("form") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("nested") {
                nested = true;
                Ok(())
            } else {
                Err(meta.error("unsupported form attribute, expected `nested`"))
            }
        })?;
    }
    Ok(nested)
}

fn calmform_path() -> TokenStream2 {
    match crate_name("calmform") {
        Ok(FoundCrate::Name(name)) => {
            let ident = Ident::new(&name, Span::call_site());
            quote!(::#ident)
        }
        Ok(FoundCrate::Itself) => quote!(crate),
        Err(_) => quote!(::calmform),
    }
}
