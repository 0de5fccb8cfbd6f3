//! `#[tap_test]` for the blynk-board-esp32 device test binary.
//!
//! Marked functions are registered through `inventory` under their module
//! path (`store::store_survives_torn_write`), so `device-tests` can list them
//! in TAP output and a `TAP_FILTER` can select a whole module.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::parse::Parser;
use syn::punctuated::Punctuated;
use syn::{Expr, ExprLit, ItemFn, Lit, Meta, ReturnType, Token};

/// Register a function with the TAP runner.
///
/// The body signals failure by panicking, or by returning `Err` when the
/// function returns a `Result`.
///
/// Options, comma separated:
///
/// - `should_panic` / `should_panic = "message"`: passes only if the body
///   panics (with a message containing `message`)
/// - `device_only`: the body is compiled with the `esp32` feature only;
///   other builds report the test as skipped
///
/// ```ignore
/// use blynk_board_esp32_macros::tap_test;
///
/// #[tap_test]
/// fn running_is_solid() {
///     assert_eq!(StatusSpec::lookup(RunMode::Running, None).blink, Blink::Solid);
/// }
///
/// #[tap_test(should_panic = "no palette color")]
/// fn out_of_palette_panics() {
///     SsidColor::from_index(9).expect("no palette color");
/// }
///
/// #[tap_test(device_only)]
/// fn nvs_accepts_largest_frame() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
///     let mut storage = NvsStorage::take()?;
///     storage.write("tap_max_frame", &[0u8; MAX_FRAME_LEN])?;
///     Ok(())
/// }
/// ```
#[proc_macro_attribute]
pub fn tap_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let function = match syn::parse::<ItemFn>(item) {
        Ok(function) => function,
        Err(e) => return e.to_compile_error().into(),
    };
    let options = match Options::parse(attr.into()) {
        Ok(options) => options,
        Err(e) => return e.to_compile_error().into(),
    };
    if !function.sig.inputs.is_empty() {
        return syn::Error::new_spanned(&function.sig.inputs, "tap_test functions take no arguments")
            .to_compile_error()
            .into();
    }
    expand(&function, &options).into()
}

#[derive(Default)]
struct Options {
    /// `Some(None)` for a bare `should_panic`.
    should_panic: Option<Option<String>>,
    device_only: bool,
}

impl Options {
    fn parse(attr: TokenStream2) -> syn::Result<Self> {
        let mut options = Self::default();
        let metas = Punctuated::<Meta, Token![,]>::parse_terminated.parse2(attr)?;

        for meta in metas {
            match &meta {
                Meta::Path(path) if path.is_ident("should_panic") => {
                    options.should_panic = Some(None);
                }
                Meta::Path(path) if path.is_ident("device_only") => {
                    options.device_only = true;
                }
                Meta::NameValue(nv) if nv.path.is_ident("should_panic") => match &nv.value {
                    Expr::Lit(ExprLit {
                        lit: Lit::Str(message),
                        ..
                    }) => options.should_panic = Some(Some(message.value())),
                    other => {
                        return Err(syn::Error::new_spanned(
                            other,
                            "should_panic expects a string literal",
                        ))
                    }
                },
                _ => {
                    return Err(syn::Error::new_spanned(
                        &meta,
                        "unknown tap_test option; expected `should_panic`, \
                         `should_panic = \"message\"` or `device_only`",
                    ))
                }
            }
        }
        Ok(options)
    }
}

fn expand(function: &ItemFn, options: &Options) -> TokenStream2 {
    let ident = &function.sig.ident;
    let name = ident.to_string();
    let returns_result = matches!(function.sig.output, ReturnType::Type(..));

    let run = match &options.should_panic {
        None if returns_result => quote! { runner.run(name, #ident) },
        None => quote! { runner.run_assert(name, #ident) },
        Some(None) => quote! { runner.run_should_panic(name, #ident, None) },
        Some(Some(message)) => quote! { runner.run_should_panic(name, #ident, Some(#message)) },
    };

    let (gate, register) = if options.device_only {
        (
            quote! { #[cfg(feature = "esp32")] },
            quote! {
                #[cfg(feature = "esp32")]
                #run;
                #[cfg(not(feature = "esp32"))]
                runner.skip(name, "needs the board");
            },
        )
    } else {
        (quote! {}, quote! { #run; })
    };

    quote! {
        #gate
        #function

        ::inventory::submit! {
            ::blynk_board_esp32::testing::TapTestEntry::new(
                ::core::module_path!(),
                #name,
                |runner: &mut ::blynk_board_esp32::testing::TestRunner, name: &str| {
                    #register
                }
            )
        }
    }
}
