//! Attribute macros that run an `async fn` on a freshly built jobtree executor.
//!
//! ```ignore
//! #[jobtree::main(worker_threads = 4)]
//! async fn main() {
//!     let answer = jobtree::spawn(async { Ok(42) }).await;
//!     println!("{answer:?}");
//! }
//! ```

mod args;

use args::ExecutorArgs;
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{ItemFn, parse_macro_input};

/// Runs an `async fn main` as the root job of a new executor.
#[proc_macro_attribute]
pub fn main(args: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(args as ExecutorArgs);
    let input = parse_macro_input!(item as ItemFn);

    expand(args, input, false).into()
}

/// Like [`main`], but marks the function as a `#[test]`.
#[proc_macro_attribute]
pub fn test(args: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(args as ExecutorArgs);
    let input = parse_macro_input!(item as ItemFn);

    expand(args, input, true).into()
}

fn expand(args: ExecutorArgs, input: ItemFn, is_test: bool) -> TokenStream2 {
    if input.sig.asyncness.is_none() {
        return syn::Error::new_spanned(input.sig.fn_token, "the `async` keyword is missing")
            .to_compile_error();
    }

    let ItemFn {
        attrs,
        vis,
        mut sig,
        block,
    } = input;
    sig.asyncness = None;

    let worker_threads = args.worker_threads.map(|n| quote! { .worker_threads(#n) });
    let max_worker_threads = args
        .max_worker_threads
        .map(|n| quote! { .max_worker_threads(#n) });
    let test_attr = is_test.then(|| quote! { #[::core::prelude::v1::test] });

    quote! {
        #test_attr
        #(#attrs)*
        #vis #sig {
            let executor = ::jobtree::Executor::builder()
                #worker_threads
                #max_worker_threads
                .build()
                .expect("failed to build the jobtree executor");

            executor.block_on(async move #block)
        }
    }
}
