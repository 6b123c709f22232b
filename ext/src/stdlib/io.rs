//! I/O extensions

use std::io::{self, Write};

use crate::{ExtError, ExtRegistry, ExtValue};

/// Space-separated rendering of all arguments
fn render(args: &[ExtValue]) -> String {
    args.iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

extension!(Print, "print", 1, variadic, "Print values to stdout without newline", |args| {
    print!("{}", render(&args));
    io::stdout()
        .flush()
        .map_err(|e| ExtError::RuntimeError(format!("IO error: {}", e)))?;
    Ok(ExtValue::True)
});

extension!(PrintLn, "println", 0, variadic, "Print values to stdout with newline", |args| {
    println!("{}", render(&args));
    Ok(ExtValue::True)
});

/// Register all I/O extensions with the registry
pub fn register_io_extensions(registry: &mut ExtRegistry) {
    registry.register(Print);
    registry.register(PrintLn);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_joins_with_spaces() {
        let out = render(&[
            ExtValue::String("x".into()),
            ExtValue::Int(1),
            ExtValue::List(vec![ExtValue::True]),
        ]);
        assert_eq!(out, "x 1 (t)");
    }

    #[test]
    fn test_print_requires_an_argument() {
        let mut registry = ExtRegistry::new();
        register_io_extensions(&mut registry);
        assert!(matches!(
            registry.call("print", vec![]),
            Err(ExtError::ArgumentCount { expected: 1, got: 0 })
        ));
        assert_eq!(registry.call("println", vec![]).unwrap(), ExtValue::True);
    }
}
