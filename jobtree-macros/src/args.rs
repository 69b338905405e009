use syn::parse::{Parse, ParseStream};
use syn::{Error, Ident, LitInt, Result, Token};

/// Arguments accepted by `#[jobtree::main]` and `#[jobtree::test]`.
pub struct ExecutorArgs {
    pub worker_threads: Option<usize>,
    pub max_worker_threads: Option<usize>,
}

impl Parse for ExecutorArgs {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut args = Self {
            worker_threads: None,
            max_worker_threads: None,
        };

        while !input.is_empty() {
            let ident: Ident = input.parse()?;
            input.parse::<Token![=]>()?;

            let value: LitInt = input.parse()?;
            let parsed = value.base10_parse::<usize>()?;

            if parsed == 0 {
                return Err(Error::new_spanned(
                    value,
                    format!("{ident} must be greater than 0"),
                ));
            }

            if ident == "worker_threads" {
                args.worker_threads = Some(parsed);
            } else if ident == "max_worker_threads" {
                args.max_worker_threads = Some(parsed);
            } else {
                return Err(Error::new_spanned(
                    ident,
                    "expected `worker_threads` or `max_worker_threads`",
                ));
            }

            if input.is_empty() {
                break;
            }
            input.parse::<Token![,]>()?;
        }

        if let (Some(core), Some(max)) = (args.worker_threads, args.max_worker_threads)
            && max < core
        {
            return Err(input.error("max_worker_threads must not be below worker_threads"));
        }

        Ok(args)
    }
}
