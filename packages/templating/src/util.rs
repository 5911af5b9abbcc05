//! Utilities
//!
//! Naming conventions, module-relative paths and id allocation.

use std::cell::Cell;

use once_cell::sync::Lazy;
use regex::Regex;

static CAPITAL_MATCHER: Lazy<Regex> = Lazy::new(|| Regex::new(r"([A-Z])").unwrap());

/// Convert a class-style name into its DOM form: `MyPanel` -> `my-panel`
pub fn hyphenate(name: &str) -> String {
    let mut chars = name.chars();
    let first = match chars.next() {
        Some(c) => c.to_lowercase().collect::<String>(),
        None => return String::new(),
    };
    let rest: String = chars.collect();
    let lowered_head = format!("{}{}", first, rest);

    CAPITAL_MATCHER
        .replace_all(&lowered_head, |caps: &regex::Captures| {
            format!("-{}", caps[1].to_lowercase())
        })
        .into_owned()
}

/// Lower the first letter: `DateFormat` -> `dateFormat`
pub fn camel_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Resolve `name` against the directory of `file` when it is relative (`./`, `../`)
pub fn relative_to_file(name: &str, file: &str) -> String {
    let mut name_parts: Vec<String> = name.trim().split('/').map(str::to_string).collect();

    let is_relative = name_parts
        .first()
        .map(|part| part.starts_with('.'))
        .unwrap_or(false);

    if is_relative && !file.is_empty() {
        let file_parts: Vec<&str> = file.split('/').collect();
        let base: Vec<String> = file_parts[..file_parts.len() - 1]
            .iter()
            .map(|s| s.to_string())
            .collect();
        name_parts.splice(0..0, base);
    }

    trim_dots(&mut name_parts);
    name_parts.join("/")
}

fn trim_dots(parts: &mut Vec<String>) {
    let mut i: isize = 0;

    while (i as usize) < parts.len() {
        let idx = i as usize;
        if parts[idx] == "." {
            parts.remove(idx);
            i -= 1;
        } else if parts[idx] == ".." {
            let keep = idx == 0
                || (idx == 1 && parts.get(2).map(String::as_str) == Some(".."))
                || parts[idx - 1] == "..";
            if !keep {
                parts.drain(idx - 1..=idx);
                i -= 2;
            }
        }
        i += 1;
    }
}

/// Monotonic id source owned by a single compiler or container tree
#[derive(Debug, Default)]
pub struct IdAllocator {
    last: Cell<u32>,
}

impl IdAllocator {
    pub fn new() -> Self {
        IdAllocator { last: Cell::new(0) }
    }

    pub fn next(&self) -> u32 {
        let next = self.last.get() + 1;
        self.last.set(next);
        next
    }
}
