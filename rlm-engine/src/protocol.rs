//! # Response Protocol
//!
//! The wire contract between the model and the engine, as described in the
//! system prompt:
//!
//! - a fenced block (`` ``` ``, optionally tagged `rhai` or `repl`) holds
//!   the code to execute
//! - `FINAL(answer)` at the start of a line ends the session with a literal
//!   answer
//! - `FINAL_VAR(name)` ends it with the value of a sandbox variable
//!
//! Markers inside fenced blocks, or in the middle of a prose line, never
//! count. A line that opens and closes a fence is an inline span, not a
//! block.

const FENCE: &str = "```";
const FINAL_VAR_MARKER: &str = "FINAL_VAR(";
const FINAL_MARKER: &str = "FINAL(";

/// Info strings that mark a fenced block as executable
const CODE_TAGS: &[&str] = &["", "rhai", "repl"];

/// The termination signal found in a model response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// `FINAL(answer)`
    Answer(String),
    /// `FINAL_VAR(name)`
    Variable(String),
    NotTerminated,
}

impl Detection {
    pub fn is_terminated(&self) -> bool {
        !matches!(self, Detection::NotTerminated)
    }
}

/// Find the first qualifying termination marker in `text`
pub fn detect(text: &str) -> Detection {
    let mut in_fence = false;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let start = offset;
        offset += line.len();

        let trimmed = line.trim();
        if in_fence {
            if trimmed == FENCE {
                in_fence = false;
            }
            continue;
        }
        if let Some(info) = trimmed.strip_prefix(FENCE) {
            in_fence = !info.contains(FENCE);
            continue;
        }

        let indent = line.len() - line.trim_start().len();
        if let Some(detection) = marker_at(&text[start + indent..]) {
            return detection;
        }
    }

    Detection::NotTerminated
}

fn marker_at(rest: &str) -> Option<Detection> {
    if let Some(args) = rest.strip_prefix(FINAL_VAR_MARKER) {
        let name = strip_quotes(closing(args)?.trim());
        return is_identifier(name).then(|| Detection::Variable(name.to_string()));
    }
    let args = rest.strip_prefix(FINAL_MARKER)?;
    Some(Detection::Answer(strip_quotes(closing(args)?.trim()).to_string()))
}

/// Marker arguments: up to the balancing parenthesis, or else up to the
/// last `)` on the marker's own line
fn closing(args: &str) -> Option<&str> {
    balanced(args).or_else(|| {
        let line = &args[..args.find('\n').unwrap_or(args.len())];
        line.rfind(')').map(|end| &args[..end])
    })
}

/// Text up to the parenthesis closing an already opened one
fn balanced(args: &str) -> Option<&str> {
    let mut depth = 1usize;
    for (i, c) in args.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&args[..i]);
                }
            }
            _ => {}
        }
    }
    None
}

fn strip_quotes(text: &str) -> &str {
    for quote in ['"', '\''] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            return &text[1..text.len() - 1];
        }
    }
    text
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// Executable fenced blocks in order of appearance. An unclosed fence runs
/// to the end of the text. Common indentation is removed.
pub fn code_blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    // (is_code, lines) of the open fence
    let mut open: Option<(bool, Vec<&str>)> = None;

    for line in text.lines() {
        match open.as_mut() {
            Some((is_code, lines)) => {
                if line.trim() == FENCE {
                    if *is_code {
                        push_block(&mut blocks, lines);
                    }
                    open = None;
                } else {
                    lines.push(line);
                }
            }
            None => {
                let trimmed = line.trim();
                if let Some(info) = trimmed.strip_prefix(FENCE) {
                    if info.contains(FENCE) {
                        continue;
                    }
                    let tag = info.trim().to_ascii_lowercase();
                    open = Some((CODE_TAGS.contains(&tag.as_str()), Vec::new()));
                }
            }
        }
    }

    if let Some((true, lines)) = &open {
        push_block(&mut blocks, lines);
    }
    blocks
}

fn push_block(blocks: &mut Vec<String>, lines: &[&str]) {
    if lines.iter().all(|l| l.trim().is_empty()) {
        return;
    }
    let indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    let code: Vec<&str> = lines
        .iter()
        .map(|l| if l.len() >= indent { &l[indent..] } else { l.trim_start() })
        .collect();
    blocks.push(code.join("\n"));
}
