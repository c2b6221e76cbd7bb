use crate::constants::BASE_KEYWORD;
use regex::Regex;
use std::sync::OnceLock;

/// A recipe split into raw lines, with its first base declaration located.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    pub lines: Vec<String>,
    /// Index into `lines` of the first `FROM` line
    pub base_line: Option<usize>,
    /// Image reference declared on that line, options and stage alias removed
    pub base_ref: String,
}

fn from_line_regex() -> &'static Regex {
    static FROM_LINE: OnceLock<Regex> = OnceLock::new();
    // keyword, option flags, reference, remainder (e.g. "AS builder")
    FROM_LINE.get_or_init(|| {
        Regex::new(&format!(r"(?i)^(\s*{}\s+)((?:--\S+\s+)*)(\S+)(.*)$", BASE_KEYWORD))
            .expect("FROM pattern is valid")
    })
}

/// Parse recipe content without losing any bytes: lines are split on `\n`
/// so that `lines.join("\n")` reproduces the input exactly.
pub fn parse_recipe(content: &str) -> Recipe {
    let lines: Vec<String> = content.split('\n').map(str::to_string).collect();

    let mut base_line = None;
    let mut base_ref = String::new();
    for (idx, line) in lines.iter().enumerate() {
        if let Some(caps) = from_line_regex().captures(line.trim_end_matches('\r')) {
            base_line = Some(idx);
            base_ref = caps[3].to_string();
            break;
        }
    }

    Recipe {
        lines,
        base_line,
        base_ref,
    }
}

impl Recipe {
    pub fn render(&self) -> String {
        self.lines.join("\n")
    }
}

/// Replace the reference on a `FROM` line, keeping keyword, flags and alias.
pub fn rewrite_base_line(line: &str, new_ref: &str) -> Option<String> {
    let (body, cr) = match line.strip_suffix('\r') {
        Some(body) => (body, "\r"),
        None => (line, ""),
    };
    let caps = from_line_regex().captures(body)?;
    Some(format!("{}{}{}{}{}", &caps[1], &caps[2], new_ref, &caps[4], cr))
}

/// Split `image:tag`. Anything other than exactly one `:` is rejected,
/// which includes registries carrying a port.
pub fn split_reference(reference: &str) -> Option<(&str, &str)> {
    let mut parts = reference.split(':');
    let image = parts.next()?;
    let tag = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some((image, tag))
}
