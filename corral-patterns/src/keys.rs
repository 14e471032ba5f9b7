//! Cache key derivation for wrapped functions.

use std::fmt::Debug;

/// Builds a cache key from a function name and its rendered arguments.
pub trait KeyBuilder: Send + Sync {
    fn key(&self, function: &str, args: &[String]) -> String;
}

/// `prefix-function:arg1:arg2...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixKeyBuilder {
    prefix: String,
}

impl PrefixKeyBuilder {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl KeyBuilder for PrefixKeyBuilder {
    fn key(&self, function: &str, args: &[String]) -> String {
        let mut key = format!("{}-{}", self.prefix, function);
        for arg in args {
            key.push(':');
            key.push_str(arg);
        }
        key
    }
}

impl<F> KeyBuilder for F
where
    F: Fn(&str, &[String]) -> String + Send + Sync,
{
    fn key(&self, function: &str, args: &[String]) -> String {
        self(function, args)
    }
}

/// Arguments that participate in a derived cache key.
///
/// Implemented for `()` and tuples of up to eight `Debug` values. Each
/// element renders with `{:?}`; list only the arguments that identify the
/// result (leave out receivers and handles).
pub trait KeyArgs {
    fn key_parts(&self) -> Vec<String>;
}

impl KeyArgs for () {
    fn key_parts(&self) -> Vec<String> {
        Vec::new()
    }
}

macro_rules! impl_key_args {
    ($($name:ident),+) => {
        impl<$($name: Debug),+> KeyArgs for ($($name,)+) {
            #[allow(non_snake_case)]
            fn key_parts(&self) -> Vec<String> {
                let ($($name,)+) = self;
                vec![$(format!("{:?}", $name)),+]
            }
        }
    };
}

impl_key_args!(A);
impl_key_args!(A, B);
impl_key_args!(A, B, C);
impl_key_args!(A, B, C, D);
impl_key_args!(A, B, C, D, E);
impl_key_args!(A, B, C, D, E, F);
impl_key_args!(A, B, C, D, E, F, G);
impl_key_args!(A, B, C, D, E, F, G, H);
