//! Bridge between evaluator values and extension values
//!
//! The evaluator implements [`ToExtValue`] for its own value type; the
//! reverse direction needs the evaluator's symbol table and lives there.

use crate::{ExtError, ExtValue};

/// Convert an evaluator value into an extension value
pub trait ToExtValue {
    fn to_ext(&self) -> Result<ExtValue, ExtError>;
}

/// Convert a slice of evaluator values into extension arguments
pub fn to_ext_args<T: ToExtValue>(values: &[T]) -> Result<Vec<ExtValue>, ExtError> {
    values.iter().map(|v| v.to_ext()).collect()
}

/// Require a string argument at `index`
pub fn expect_string(args: &[ExtValue], index: usize) -> Result<&str, ExtError> {
    match args.get(index) {
        Some(ExtValue::String(s)) => Ok(s),
        Some(other) => Err(ExtError::ArgumentType {
            expected: "string".to_string(),
            got: other.type_name().to_string(),
        }),
        None => Err(ExtError::ArgumentCount {
            expected: index + 1,
            got: args.len(),
        }),
    }
}

/// Require a numeric argument at `index`
pub fn expect_number(args: &[ExtValue], index: usize) -> Result<f64, ExtError> {
    match args.get(index) {
        Some(v) => v.as_number().ok_or_else(|| ExtError::ArgumentType {
            expected: "number".to_string(),
            got: v.type_name().to_string(),
        }),
        None => Err(ExtError::ArgumentCount {
            expected: index + 1,
            got: args.len(),
        }),
    }
}
