//! Sandbox error types
//!
//! Re-exports rlm-error and converts between it and Rhai's error values.
//! Errors raised into a script are thrown as `#{kind, message}` maps so
//! that `catch (err)` can branch on `err.kind`.

use rhai::{Dynamic, EvalAltResult, Map, ParseError, ParseErrorType, Position};
use std::time::Duration;

pub use rlm_error::{Error, ErrorKind, ErrorStatus, Result};

/// Context key holding the source line a fault was raised on
pub const LINE_KEY: &str = "line";

/// Field of a thrown error map naming its [`ErrorKind`]
pub const KIND_FIELD: &str = "kind";

/// Field of a thrown error map holding its message
pub const MESSAGE_FIELD: &str = "message";

/// Create a RuntimeFault
pub fn runtime_fault(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::RuntimeFault, message)
}

/// The value a script sees in `catch (err)` for `err`
pub fn to_thrown(err: &Error) -> Dynamic {
    let mut map = Map::new();
    map.insert(KIND_FIELD.into(), Dynamic::from(err.kind().as_str().to_string()));
    map.insert(MESSAGE_FIELD.into(), Dynamic::from(err.message().to_string()));
    Dynamic::from_map(map)
}

/// Raise `err` inside a running script
pub fn into_rhai(err: Error) -> Box<EvalAltResult> {
    EvalAltResult::ErrorRuntime(to_thrown(&err), Position::NONE).into()
}

/// Convert the error that stopped a script.
///
/// Errors raised through [`into_rhai`] keep their kind. Termination from
/// the progress callback is the fragment timeout.
pub fn from_rhai(err: Box<EvalAltResult>, timeout: Duration) -> Error {
    let outer_line = err.position().line();
    let mut inner = innermost(err);
    let line = inner.position().line().or(outer_line);

    let error = match *inner {
        EvalAltResult::ErrorRuntime(ref value, _) => from_thrown(value),
        EvalAltResult::ErrorTerminated(..) => Error::execution_timeout(timeout),
        EvalAltResult::ErrorModuleNotFound(ref path, _) => {
            Error::capability_denied(format!("import \"{}\"", path))
        }
        EvalAltResult::ErrorParsing(ref kind, _) => Error::parse_failed(kind.to_string()),
        EvalAltResult::ErrorTooManyOperations(_) => runtime_fault("operation limit exceeded"),
        _ => {
            inner.clear_position();
            runtime_fault(inner.to_string())
        }
    };
    match line {
        Some(line) => error.with_context(LINE_KEY, line.to_string()),
        None => error,
    }
}

/// Convert a compile error. Denied symbols surface as reserved words.
pub fn from_parse(err: &ParseError, denied: &[&str]) -> Error {
    let error = match err.err_type() {
        ParseErrorType::Reserved(name) if denied.contains(&name.as_str()) => {
            Error::capability_denied(name.clone())
        }
        other => Error::parse_failed(other.to_string()),
    };
    let error = error.with_operation("sandbox::compile");
    match err.position().line() {
        Some(line) => error.with_context(LINE_KEY, line.to_string()),
        None => error,
    }
}

fn innermost(err: Box<EvalAltResult>) -> Box<EvalAltResult> {
    match *err {
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _)
        | EvalAltResult::ErrorInModule(_, inner, _) => innermost(inner),
        other => Box::new(other),
    }
}

fn from_thrown(value: &Dynamic) -> Error {
    if let Some(map) = value.clone().try_cast::<Map>() {
        let field = |name: &str| map.get(name).and_then(|v| v.clone().into_string().ok());
        if let Some(kind) = field(KIND_FIELD).as_deref().and_then(ErrorKind::from_name) {
            return Error::new(kind, field(MESSAGE_FIELD).unwrap_or_default());
        }
    }
    match value.clone().into_string() {
        Ok(text) => runtime_fault(text),
        Err(_) => runtime_fault(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_survives_throw() {
        let err = Error::recursion_depth_exceeded(2, 1);
        let back = from_rhai(into_rhai(err), Duration::from_secs(1));
        assert_eq!(back.kind(), ErrorKind::RecursionDepthExceeded);
        assert_eq!(
            back.message(),
            "recursive call at depth 2 exceeds max recursion depth 1"
        );
    }

    #[test]
    fn test_plain_throw_is_runtime_fault() {
        let thrown = EvalAltResult::ErrorRuntime(Dynamic::from("boom".to_string()), Position::new(3, 1));
        let err = from_rhai(thrown.into(), Duration::from_secs(1));
        assert_eq!(err.kind(), ErrorKind::RuntimeFault);
        assert_eq!(err.message(), "boom");
        assert_eq!(err.context_value(LINE_KEY), Some("3"));
    }

    #[test]
    fn test_terminated_is_timeout() {
        let err = EvalAltResult::ErrorTerminated(Dynamic::UNIT, Position::new(1, 1));
        let err = from_rhai(err.into(), Duration::from_millis(250));
        assert_eq!(err.kind(), ErrorKind::ExecutionTimeout);
    }

    #[test]
    fn test_thrown_map_fields() {
        let thrown = to_thrown(&Error::capability_denied("open"));
        let map = thrown.try_cast::<Map>().unwrap();
        assert_eq!(map[KIND_FIELD].clone().into_string().unwrap(), "CapabilityDenied");
    }
}
