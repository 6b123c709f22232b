//! Modular standard library of extensions
//!
//! Extensions are grouped by concern so hosts can opt into a subset.

/// Define an extension type with automatic argument-count checking.
///
/// The variadic form takes a minimum argument count.
macro_rules! extension {
    ($ty:ident, $name:expr, $arity:expr, $description:expr, |$args:ident| $body:expr) => {
        pub struct $ty;

        impl $crate::Extension for $ty {
            fn call(&self, $args: Vec<$crate::ExtValue>) -> $crate::ExtResult {
                if $args.len() != $arity {
                    return Err($crate::ExtError::ArgumentCount {
                        expected: $arity,
                        got: $args.len(),
                    });
                }
                $body
            }

            fn name(&self) -> &str {
                $name
            }

            fn arity(&self) -> usize {
                $arity
            }

            fn description(&self) -> Option<&str> {
                Some($description)
            }
        }
    };

    ($ty:ident, $name:expr, $arity:expr, variadic, $description:expr, |$args:ident| $body:expr) => {
        pub struct $ty;

        impl $crate::Extension for $ty {
            fn call(&self, $args: Vec<$crate::ExtValue>) -> $crate::ExtResult {
                if $args.len() < $arity {
                    return Err($crate::ExtError::ArgumentCount {
                        expected: $arity,
                        got: $args.len(),
                    });
                }
                $body
            }

            fn name(&self) -> &str {
                $name
            }

            fn arity(&self) -> usize {
                $arity
            }

            fn is_variadic(&self) -> bool {
                true
            }

            fn description(&self) -> Option<&str> {
                Some($description)
            }
        }
    };
}

pub mod io;
pub mod math;
pub mod string;

use crate::ExtRegistry;

/// Register every standard library extension
pub fn register_all(registry: &mut ExtRegistry) {
    math::register_math_extensions(registry);
    io::register_io_extensions(registry);
    string::register_string_extensions(registry);
}

/// Names of the available modules
pub fn available_modules() -> Vec<&'static str> {
    vec!["math", "io", "string"]
}

/// Register extensions from specific modules; unknown names are skipped
pub fn register_modules(registry: &mut ExtRegistry, modules: &[&str]) {
    for module in modules {
        match *module {
            "math" => math::register_math_extensions(registry),
            "io" => io::register_io_extensions(registry),
            "string" => string::register_string_extensions(registry),
            _ => {}
        }
    }
}
