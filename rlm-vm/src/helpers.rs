//! Native functions for working through a context: regex search, JSON and
//! chunking. Registered on every sandbox engine.

use crate::convert;
use crate::error::{into_rhai, runtime_fault, Error};
use regex::Regex;
use rhai::{Array, Dynamic, Engine, EvalAltResult, INT};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type Fallible<T> = std::result::Result<T, Box<EvalAltResult>>;

/// Compiled patterns kept per engine
const REGEX_CACHE_SIZE: usize = 64;

#[derive(Default)]
struct RegexCache {
    patterns: Mutex<HashMap<String, Regex>>,
}

impl RegexCache {
    fn get(&self, pattern: &str) -> Fallible<Regex> {
        let mut patterns = self.patterns.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(re) = patterns.get(pattern) {
            return Ok(re.clone());
        }
        let re = Regex::new(pattern)
            .map_err(|e| into_rhai(runtime_fault(format!("invalid regex: {}", e))))?;
        if patterns.len() >= REGEX_CACHE_SIZE {
            patterns.clear();
        }
        patterns.insert(pattern.to_string(), re.clone());
        Ok(re)
    }
}

fn strings<'a>(items: impl Iterator<Item = &'a str>) -> Array {
    items.map(|s| Dynamic::from(s.to_string())).collect()
}

fn chunk_size(size: INT) -> Fallible<usize> {
    if size <= 0 {
        return Err(into_rhai(runtime_fault(format!("chunk size must be positive, got {}", size))));
    }
    Ok(size as usize)
}

pub(crate) fn register(engine: &mut Engine) {
    let cache = Arc::new(RegexCache::default());

    let re = Arc::clone(&cache);
    engine.register_fn("regex_match", move |text: &str, pattern: &str| -> Fallible<bool> {
        Ok(re.get(pattern)?.is_match(text))
    });

    let re = Arc::clone(&cache);
    engine.register_fn("regex_find_all", move |text: &str, pattern: &str| -> Fallible<Array> {
        Ok(strings(re.get(pattern)?.find_iter(text).map(|m| m.as_str())))
    });

    let re = Arc::clone(&cache);
    engine.register_fn("regex_captures", move |text: &str, pattern: &str| -> Fallible<Array> {
        let re = re.get(pattern)?;
        Ok(re
            .captures_iter(text)
            .map(|caps| {
                let groups: Array = caps
                    .iter()
                    .map(|g| g.map_or(Dynamic::UNIT, |m| Dynamic::from(m.as_str().to_string())))
                    .collect();
                Dynamic::from_array(groups)
            })
            .collect())
    });

    let re = Arc::clone(&cache);
    engine.register_fn("regex_count", move |text: &str, pattern: &str| -> Fallible<INT> {
        Ok(re.get(pattern)?.find_iter(text).count() as INT)
    });

    let re = Arc::clone(&cache);
    engine.register_fn(
        "regex_replace",
        move |text: &str, pattern: &str, replacement: &str| -> Fallible<String> {
            Ok(re.get(pattern)?.replace_all(text, replacement).into_owned())
        },
    );

    let re = Arc::clone(&cache);
    engine.register_fn("regex_split", move |text: &str, pattern: &str| -> Fallible<Array> {
        Ok(strings(re.get(pattern)?.split(text)))
    });

    // Lines of a text, or string elements of an array, that match
    let re = Arc::clone(&cache);
    engine.register_fn("regex_filter", move |text: &str, pattern: &str| -> Fallible<Array> {
        let re = re.get(pattern)?;
        Ok(strings(text.lines().filter(|line| re.is_match(line))))
    });
    let re = Arc::clone(&cache);
    engine.register_fn("regex_filter", move |items: Array, pattern: &str| -> Fallible<Array> {
        let re = re.get(pattern)?;
        Ok(items
            .into_iter()
            .filter(|item| {
                item.read_lock::<rhai::ImmutableString>()
                    .is_some_and(|s| re.is_match(s.as_str()))
            })
            .collect())
    });

    engine.register_fn("lines", |text: &str| -> Array { strings(text.lines()) });

    engine.register_fn("chunk", |text: &str, size: INT| -> Fallible<Array> {
        let size = chunk_size(size)?;
        let chars: Vec<char> = text.chars().collect();
        Ok(chars
            .chunks(size)
            .map(|c| Dynamic::from(c.iter().collect::<String>()))
            .collect())
    });
    engine.register_fn("chunk", |items: Array, size: INT| -> Fallible<Array> {
        let size = chunk_size(size)?;
        Ok(items
            .chunks(size)
            .map(|c| Dynamic::from_array(c.to_vec()))
            .collect())
    });

    engine.register_fn("json_encode", |value: Dynamic| -> Fallible<String> {
        let json = convert::to_json(&value).map_err(into_rhai)?;
        Ok(json.to_string())
    });
    engine.register_fn("json_decode", |text: &str| -> Fallible<Dynamic> {
        let json: serde_json::Value = serde_json::from_str(text).map_err(|e| {
            into_rhai(Error::parse_failed(format!("invalid JSON: {}", e)))
        })?;
        Ok(convert::to_dynamic(&json))
    });
}
