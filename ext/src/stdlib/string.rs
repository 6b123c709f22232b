//! String extensions

use regex::Regex;

use crate::bridge::expect_string;
use crate::{ExtError, ExtRegistry, ExtValue};

fn compile(pattern: &str) -> Result<Regex, ExtError> {
    Regex::new(pattern).map_err(|e| ExtError::RuntimeError(format!("bad pattern: {}", e)))
}

extension!(StrLength, "str-len", 1, "Length of a string in bytes", |args| {
    Ok(ExtValue::Int(expect_string(&args, 0)?.len() as i64))
});

extension!(StrUpper, "str-upper", 1, "Convert string to uppercase", |args| {
    Ok(ExtValue::String(expect_string(&args, 0)?.to_uppercase()))
});

extension!(StrLower, "str-lower", 1, "Convert string to lowercase", |args| {
    Ok(ExtValue::String(expect_string(&args, 0)?.to_lowercase()))
});

extension!(StrConcat, "str-concat", 1, variadic, "Concatenate strings", |args| {
    let mut out = String::new();
    for i in 0..args.len() {
        out.push_str(expect_string(&args, i)?);
    }
    Ok(ExtValue::String(out))
});

extension!(StrSplit, "str-split", 2, "Split string by delimiter", |args| {
    let s = expect_string(&args, 0)?;
    let delimiter = expect_string(&args, 1)?;
    let parts = s
        .split(delimiter)
        .map(|part| ExtValue::String(part.to_string()))
        .collect();
    Ok(ExtValue::List(parts))
});

extension!(StrMatch, "str-match", 2, "Test a string against a regular expression", |args| {
    let s = expect_string(&args, 0)?;
    let re = compile(expect_string(&args, 1)?)?;
    Ok(ExtValue::from_bool(re.is_match(s)))
});

extension!(
    StrReplace,
    "str-replace",
    3,
    "Replace every match of a regular expression",
    |args| {
        let s = expect_string(&args, 0)?;
        let re = compile(expect_string(&args, 1)?)?;
        let replacement = expect_string(&args, 2)?;
        Ok(ExtValue::String(re.replace_all(s, replacement).into_owned()))
    }
);

/// Register all string extensions with the registry
pub fn register_string_extensions(registry: &mut ExtRegistry) {
    registry.register(StrLength);
    registry.register(StrUpper);
    registry.register(StrLower);
    registry.register(StrConcat);
    registry.register(StrSplit);
    registry.register(StrMatch);
    registry.register(StrReplace);
}
