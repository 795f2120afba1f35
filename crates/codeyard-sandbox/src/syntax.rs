//! Static syntax pre-check.
//!
//! Parses a script the way a `Function` constructor would, in a throwaway
//! parser runtime that has no host bindings and is never registered with
//! the [`IsolationHost`](crate::host::IsolationHost). Top-level `return` is
//! therefore accepted.
//!
//! QuickJS builds the function from a source string, so text that closes
//! the wrapper early can execute. The parser runtime gets a small heap and
//! an interrupt deadline, and only a `SyntaxError` is reported; anything
//! else means the script parsed and is left for a real run to judge.

use std::sync::LazyLock;
use std::time::{Duration, Instant};

use codeyard_types::ExecutionError;
use regex::Regex;
use rquickjs::{Context, Function, Object, Runtime, Value};
use tracing::{trace, warn};

/// How long parsing may take before it is interrupted.
const PARSE_DEADLINE: Duration = Duration::from_secs(1);

/// Heap available to the parser runtime.
const PARSE_MEMORY_LIMIT: usize = 16 * 1024 * 1024;

/// Lines the `Function` wrapper puts in front of the body.
const WRAPPER_LINES: i64 = 2;

static STACK_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m):(\d+)(?::\d+)?\)?\s*$").expect("valid regex"));

/// Check `script` for syntax errors without running it in an isolated
/// context. Returns `None` when it parses.
pub fn detect_syntax_errors(script: &str) -> Option<ExecutionError> {
    match parse(script) {
        Ok(found) => found,
        Err(err) => {
            warn!(error = %err, "Syntax check unavailable, deferring to execution");
            None
        }
    }
}

fn parse(script: &str) -> rquickjs::Result<Option<ExecutionError>> {
    let runtime = Runtime::new()?;
    runtime.set_memory_limit(PARSE_MEMORY_LIMIT);
    let deadline = Instant::now() + PARSE_DEADLINE;
    runtime.set_interrupt_handler(Some(Box::new(move || Instant::now() >= deadline)));

    let context = Context::full(&runtime)?;
    context.with(|ctx| {
        let constructor: Function = ctx.globals().get("Function")?;
        match constructor.call::<_, Value>((script,)) {
            Ok(_) => Ok(None),
            Err(rquickjs::Error::Exception) => {
                let caught = ctx.catch();
                let found = syntax_error(&caught);
                if found.is_none() {
                    trace!("Script parsed but its wrapper raised a non-syntax error");
                }
                Ok(found)
            }
            Err(err) => Err(err),
        }
    })
}

fn syntax_error(caught: &Value<'_>) -> Option<ExecutionError> {
    let object: &Object = caught.as_object()?;
    let name: String = object.get("name").ok()?;
    if name != "SyntaxError" {
        return None;
    }

    let message: String = object.get("message").unwrap_or_default();
    let line = object
        .get::<_, Option<i32>>("lineNumber")
        .ok()
        .flatten()
        .map(i64::from)
        .or_else(|| {
            let stack: Option<String> = object.get("stack").ok().flatten();
            stack.as_deref().and_then(line_from_stack)
        })
        .map(|line| (line - WRAPPER_LINES).max(1) as u32);

    Some(ExecutionError::syntax(message).with_line(line))
}

fn line_from_stack(stack: &str) -> Option<i64> {
    STACK_LINE_RE
        .captures(stack)
        .and_then(|caps| caps[1].parse().ok())
}
