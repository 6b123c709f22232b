//! Math extensions

use crate::bridge::expect_number;
use crate::{ExtError, ExtRegistry, ExtValue};

/// Keep integers integral where the operation allows it
fn integral_or_float(x: f64, ints: bool) -> ExtValue {
    if ints && x.is_finite() && x.fract() == 0.0 && x.abs() < i64::MAX as f64 {
        ExtValue::Int(x as i64)
    } else {
        ExtValue::Float(x)
    }
}

extension!(Sqrt, "sqrt", 1, "Square root of a number", |args| {
    let n = expect_number(&args, 0)?;
    if n < 0.0 {
        Err(ExtError::RuntimeError(
            "cannot take square root of negative number".to_string(),
        ))
    } else {
        Ok(ExtValue::Float(n.sqrt()))
    }
});

extension!(Abs, "abs", 1, "Absolute value of a number", |args| {
    match &args[0] {
        ExtValue::Int(i) => Ok(ExtValue::Int(i.wrapping_abs())),
        _ => Ok(ExtValue::Float(expect_number(&args, 0)?.abs())),
    }
});

extension!(Floor, "floor", 1, "Floor of a number", |args| {
    Ok(integral_or_float(expect_number(&args, 0)?.floor(), true))
});

extension!(Ceil, "ceil", 1, "Ceiling of a number", |args| {
    Ok(integral_or_float(expect_number(&args, 0)?.ceil(), true))
});

extension!(Pow, "pow", 2, "Raise a number to a power", |args| {
    let base = expect_number(&args, 0)?;
    let exp = expect_number(&args, 1)?;
    let ints = matches!((&args[0], &args[1]), (ExtValue::Int(_), ExtValue::Int(e)) if *e >= 0);
    Ok(integral_or_float(base.powf(exp), ints))
});

/// Register all math extensions with the registry
pub fn register_math_extensions(registry: &mut ExtRegistry) {
    registry.register(Sqrt);
    registry.register(Abs);
    registry.register(Floor);
    registry.register(Ceil);
    registry.register(Pow);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ExtRegistry {
        let mut registry = ExtRegistry::new();
        register_math_extensions(&mut registry);
        registry
    }

    #[test]
    fn test_math_extensions() {
        let registry = registry();
        assert_eq!(
            registry.call("sqrt", vec![ExtValue::Int(16)]).unwrap(),
            ExtValue::Float(4.0)
        );
        assert_eq!(
            registry.call("abs", vec![ExtValue::Int(-3)]).unwrap(),
            ExtValue::Int(3)
        );
        assert_eq!(
            registry.call("floor", vec![ExtValue::Float(2.7)]).unwrap(),
            ExtValue::Int(2)
        );
        assert_eq!(
            registry
                .call("pow", vec![ExtValue::Int(2), ExtValue::Int(10)])
                .unwrap(),
            ExtValue::Int(1024)
        );
        assert_eq!(
            registry
                .call("pow", vec![ExtValue::Int(2), ExtValue::Int(-1)])
                .unwrap(),
            ExtValue::Float(0.5)
        );
    }

    #[test]
    fn test_math_errors() {
        let registry = registry();
        assert!(matches!(
            registry.call("sqrt", vec![ExtValue::Int(-1)]),
            Err(ExtError::RuntimeError(_))
        ));
        assert!(matches!(
            registry.call("sqrt", vec![ExtValue::String("x".into())]),
            Err(ExtError::ArgumentType { .. })
        ));
        assert!(matches!(
            registry.call("pow", vec![ExtValue::Int(1)]),
            Err(ExtError::ArgumentCount { expected: 2, got: 1 })
        ));
    }
}
