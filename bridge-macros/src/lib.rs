//! Small proc-macros shared by the i3x-bridge crate.
//!
//! These exist to remove copy/paste boilerplate at a couple of call sites;
//! this is not a general-purpose macro library.

extern crate proc_macro;

use proc_macro::TokenStream;
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::{parse_macro_input, Expr, Ident, LitStr, Token};

/// `register_builtin_codecs!(registry, [raw, utf8, json, base64, uint8, int8,
/// uint16, int16, uint32, int32, float32, float64, protobuf, msgpack]);`
///
/// Expands to one `registry.register("name", decode_name)` call per entry,
/// so adding a built-in codec is a one-line change in `codec.rs` instead of
/// touching both the decode fn and a separate registration list.
struct RegisterCodecs {
    registry: Expr,
    names: Vec<Ident>,
}

impl Parse for RegisterCodecs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let registry: Expr = input.parse()?;
        input.parse::<Token![,]>()?;
        let content;
        syn::bracketed!(content in input);
        let names = content
            .parse_terminated(Ident::parse, Token![,])?
            .into_iter()
            .collect();
        Ok(RegisterCodecs { registry, names })
    }
}

#[proc_macro]
pub fn register_builtin_codecs(input: TokenStream) -> TokenStream {
    let RegisterCodecs { registry, names } = parse_macro_input!(input as RegisterCodecs);

    let calls = names.iter().map(|name| {
        let decode_fn = Ident::new(&format!("decode_{name}"), name.span());
        let name_str = LitStr::new(&name.to_string(), name.span());
        quote! {
            #registry.register(#name_str, #decode_fn);
        }
    });

    let expanded = quote! {
        #( #calls )*
    };
    expanded.into()
}
