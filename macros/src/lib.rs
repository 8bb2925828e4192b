extern crate proc_macro;

use proc_macro::TokenStream;
use proc_macro2::{Ident, Span};
use quote::quote;

#[derive(Default)]
struct Configuration {
    crate_name: Option<Ident>,
    seed: Option<u64>,
}

impl Configuration {
    fn set_crate_name(&mut self, lit: syn::Lit) -> Result<(), syn::Error> {
        let span = lit.span();
        if self.crate_name.is_some() {
            return Err(syn::Error::new(span, "crate name already set"));
        }
        if let syn::Lit::Str(s) = lit {
            if let Ok(path) = s.parse::<syn::Path>() {
                if let Some(ident) = path.get_ident() {
                    self.crate_name = Some(ident.clone());
                    return Ok(());
                }
            }
            return Err(syn::Error::new(span, format!("invalid crate name: {}", s.value())));
        }
        Err(syn::Error::new(span, "invalid crate name"))
    }

    fn set_seed(&mut self, lit: syn::Lit) -> Result<(), syn::Error> {
        let span = lit.span();
        if self.seed.is_some() {
            return Err(syn::Error::new(span, "seed already set"));
        }
        if let syn::Lit::Int(lit) = lit {
            self.seed = Some(lit.base10_parse::<u64>()?);
            return Ok(());
        }
        Err(syn::Error::new(span, "seed should be unsigned integer"))
    }
}

fn parse_config(args: syn::AttributeArgs) -> Result<Configuration, syn::Error> {
    let mut config = Configuration::default();
    for arg in args.into_iter() {
        match arg {
            syn::NestedMeta::Meta(syn::Meta::NameValue(name_value)) => {
                let name = name_value
                    .path
                    .get_ident()
                    .ok_or_else(|| syn::Error::new_spanned(&name_value, "invalid attribute name"))?
                    .to_string();
                match name.as_str() {
                    "seed" => config.set_seed(name_value.lit)?,
                    "crate" => config.set_crate_name(name_value.lit)?,
                    _ => return Err(syn::Error::new_spanned(&name_value, "unknown attribute name")),
                }
            },
            _ => return Err(syn::Error::new_spanned(arg, "unknown attribute")),
        }
    }
    Ok(config)
}

fn generate(is_test: bool, attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = syn::parse_macro_input!(attr as syn::AttributeArgs);
    let config = match parse_config(args) {
        Ok(config) => config,
        Err(err) => return TokenStream::from(err.into_compile_error()),
    };
    let input = syn::parse_macro_input!(item as syn::ItemFn);

    let ret = &input.sig.output;
    let name = &input.sig.ident;
    let body = &input.block;
    let attrs = &input.attrs;
    let vis = &input.vis;

    let macro_name = if is_test { "#[cospawn::test]" } else { "#[cospawn::main]" };

    if input.sig.asyncness.is_none() {
        let err = syn::Error::new_spanned(input, format!("only async function can be tagged with {}", macro_name));
        return TokenStream::from(err.into_compile_error());
    }

    if !input.sig.inputs.is_empty() {
        let err = syn::Error::new_spanned(&input.sig.inputs, format!("{} function takes no arguments", macro_name));
        return TokenStream::from(err.into_compile_error());
    }

    if !is_test && name != "main" {
        let err = syn::Error::new_spanned(name, "only the main function can be tagged with #[cospawn::main]");
        return TokenStream::from(err.into_compile_error());
    }

    let header = if is_test {
        quote! {
            #[::core::prelude::v1::test]
        }
    } else {
        quote! {}
    };

    let crate_name = config.crate_name.unwrap_or_else(|| Ident::new("cospawn", Span::call_site()));
    let seed = match config.seed {
        None => quote! {},
        Some(seed) => quote! { .seed(#seed) },
    };
    let result = quote! {
        #header
        #(#attrs)*
        #vis fn #name() #ret {
            async fn entry() #ret #body

            let runtime = #crate_name::runtime::Builder::default() #seed .build();
            match runtime.block_on(entry()) {
                ::core::result::Result::Ok(value) => value,
                ::core::result::Result::Err(#crate_name::JoinError::Failed(#crate_name::TaskError::Panicked(err))) => {
                    ::std::panic::resume_unwind(err.into_panic())
                },
                ::core::result::Result::Err(err) => ::core::panic!("{}", err),
            }
        }
    };

    result.into()
}

/// Executes marked async main function in configured runtime.
///
/// ## Options
/// * `seed`: unsigned integer to seed random source of runtime
///
/// ## Examples
/// ```rust,ignore
/// #[cospawn::main]
/// async fn main() {
///     cospawn::task::yield_now().await;
/// }
/// ```
///
/// ```rust,ignore
/// #[cospawn::main(seed = 7)]
/// async fn main() {
///     cospawn::task::yield_now().await;
/// }
/// ```
#[cfg(not(test))]
#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    generate(false, attr, item)
}

/// Executes marked async test function in configured runtime.
///
/// See [macro@main] for configurable options.
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    generate(true, attr, item)
}
