//! System prompt for a session
//!
//! Built once per session from the context metadata. The context itself is
//! never included, only its type, size and a bounded preview.

use crate::context::ContextMetadata;

/// Appended to the tool result when a response carried no code
pub const NO_CODE_NUDGE: &str =
    "No code block found. Continue with your analysis or provide FINAL(answer).";

/// Answer of a session that ran out of iterations
pub const NO_ANSWER: &str = "No final answer provided within iteration limit";

pub fn system_prompt(meta: &ContextMetadata, max_iterations: usize, remaining_depth: usize) -> String {
    let size_unit = match meta.kind {
        "str" => "characters",
        "list" => "elements",
        _ => "keys",
    };

    let recursion = if remaining_depth == 0 {
        "recursive_lm is not available at this depth: calling it raises RecursionDepthExceeded. \
         Work through the context with code alone."
            .to_string()
    } else {
        format!(
            "recursive_lm(query) or recursive_lm(query, context_subset) starts a fresh model \
             session on context_subset (or the whole context when omitted) and returns its \
             answer as a string. Use it to delegate chunks you cannot inspect directly. \
             Remaining recursion depth: {}.",
            remaining_depth
        )
    };

    format!(
        r#"You are a Recursive Language Model with access to a sandboxed Rhai REPL.

The user's context is stored in the variable `context`. It is NOT in this conversation: read it with code.

Context info:
- Type: {kind}
- Size: {size} {size_unit}
- Preview: {preview}

How to work:
1. Write Rhai in a ```rhai fenced block. Only the first block of a response is executed.
2. Top-level `let` variables and `fn` definitions persist between blocks. Functions cannot see outer variables, so pass them as arguments. print() output, the value of the last expression and `result` are reported back to you.
3. Helpers: lines(text), chunk(text_or_array, size), regex_match, regex_find_all, regex_captures, regex_count, regex_filter(text_or_array, pattern), regex_replace, regex_split, json_encode, json_decode. Files, network, processes, imports and eval are not available.
4. {recursion}
5. Errors can be caught with try {{ ... }} catch (err) {{ ... }}. err.kind names the error, e.g. "RecursionDepthExceeded".

When you know the answer, write it on its own line, outside any code block:
FINAL(your answer here)
or, to return the contents of a variable:
FINAL_VAR(variable_name)

You have {max_iterations} iterations. Be efficient and give FINAL() as soon as you have the answer."#,
        kind = meta.kind,
        size = meta.size,
        size_unit = size_unit,
        preview = meta.preview,
        recursion = recursion,
        max_iterations = max_iterations,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    #[test]
    fn test_prompt_describes_context_not_contents() {
        let context = Context::from("x".repeat(1000));
        let prompt = system_prompt(&context.metadata(20), 7, 1);
        assert!(prompt.contains("Type: str"));
        assert!(prompt.contains("Size: 1000 characters"));
        assert!(prompt.contains(&format!("Preview: {}...", "x".repeat(20))));
        assert!(!prompt.contains(&"x".repeat(21)));
        assert!(prompt.contains("You have 7 iterations"));
        assert!(prompt.contains("Remaining recursion depth: 1"));
        assert!(prompt.contains("FINAL_VAR(variable_name)"));
    }

    #[test]
    fn test_prompt_lists_sandbox_surface() {
        let prompt = system_prompt(&Context::from("x").metadata(20), 3, 1);
        assert!(prompt.contains("```rhai fenced block"));
        assert!(prompt.contains("regex_filter(text_or_array, pattern)"));
        assert!(prompt.contains("json_decode"));
        assert!(prompt.contains("catch (err)"));
        assert!(!prompt.contains("collections"));
    }

    #[test]
    fn test_prompt_at_max_depth() {
        let context = Context::from(serde_json::json!({"a": 1}));
        let prompt = system_prompt(&context.metadata(200), 10, 0);
        assert!(prompt.contains("Type: dict"));
        assert!(prompt.contains("Size: 1 keys"));
        assert!(prompt.contains("recursive_lm is not available"));
    }
}
