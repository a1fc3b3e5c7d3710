//! Hot-line selection from annotator output.
//!
//! The annotator prints one row per source location: a cost column (digits
//! with `,` separators), optional percentage and further event columns, then a
//! `file:function` location. After the summary it may print auto-annotated
//! source sections, whose rows carry a line of code instead of a location and
//! belong to the file named in the section header. Only rows attributed to the
//! project's own source tree survive, ordered by descending cost.

use serde::Serialize;

use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnotatedLine {
    pub cost: u64,
    /// Source file the cost is attributed to.
    pub file: String,
    pub location: String,
    /// The row exactly as the annotator printed it.
    pub text: String,
}

impl AnnotatedLine {
    pub fn file(&self) -> &str {
        &self.file
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnnotatedReport {
    pub inputs: Vec<PathBuf>,
    #[serde(rename = "sourceDir")]
    pub source_dir: PathBuf,
    pub limit: usize,
    pub lines: Vec<AnnotatedLine>,
}

impl AnnotatedReport {
    pub fn empty(source_dir: PathBuf, limit: usize) -> Self {
        Self {
            inputs: Vec::new(),
            source_dir,
            limit,
            lines: Vec::new(),
        }
    }

    pub fn pretty(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(&line.text);
            out.push('\n');
        }
        out.trim_end().to_string()
    }
}

/// Which file paths count as the project's own sources.
#[derive(Debug, Clone)]
pub struct SourceScope {
    relative: PathBuf,
    absolute: PathBuf,
}

impl SourceScope {
    pub fn new(working_dir: &Path, source_dir: &Path) -> Self {
        let relative = strip_cur_dir(source_dir);
        Self {
            absolute: working_dir.join(&relative),
            relative,
        }
    }

    pub fn contains(&self, file: &str) -> bool {
        let path = Path::new(file);
        if path.components().any(|c| c == Component::ParentDir) {
            return false;
        }
        if path.is_absolute() {
            return path != self.absolute && path.starts_with(&self.absolute);
        }
        let path = strip_cur_dir(path);
        !self.relative.is_absolute() && path != self.relative && path.starts_with(&self.relative)
    }
}

fn strip_cur_dir(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| *c != Component::CurDir)
        .collect()
}

/// Parses one annotator row. Headers, separators and rows without a location
/// yield `None`.
pub fn parse_line(line: &str) -> Option<AnnotatedLine> {
    let mut rest = line.trim_start();
    rest = rest.trim_start_matches(['<', '>']).trim_start();

    let (first, tail) = next_token(rest)?;
    let cost = parse_cost(first)?;
    rest = tail;

    loop {
        let (token, tail) = next_token(rest)?;
        if is_column(token) {
            rest = tail;
            continue;
        }
        break;
    }

    let location = rest.trim();
    if location.is_empty() {
        return None;
    }
    let file = match location.split_once(':') {
        Some((file, _)) => file,
        None => location,
    };
    Some(AnnotatedLine {
        cost,
        file: file.to_string(),
        location: location.to_string(),
        text: line.trim_end().to_string(),
    })
}

enum Header {
    /// Start of an annotated-source section for the named file.
    Source(String),
    /// Any other section, e.g. a `file:function` summary.
    Summary,
}

/// Recognizes `-- <title>` section headers. The `-- line N ----` context
/// markers inside a source section are not headers.
fn parse_header(line: &str) -> Option<Header> {
    let title = line.trim().strip_prefix("-- ")?;
    if title.starts_with("line ") {
        return None;
    }
    match title.split_once(':') {
        Some((kind, file)) if kind.to_ascii_lowercase().contains("annotated source") => {
            Some(Header::Source(file.trim().to_string()))
        }
        _ => Some(Header::Summary),
    }
}

/// Keeps rows inside `scope`, orders them by descending cost (stable for
/// ties) and truncates to `limit`.
pub fn select_hot_lines(output: &str, scope: &SourceScope, limit: usize) -> Vec<AnnotatedLine> {
    let mut source_file: Option<String> = None;
    let mut lines = Vec::new();
    for row in output.lines() {
        if let Some(header) = parse_header(row) {
            source_file = match header {
                Header::Source(file) => Some(file),
                Header::Summary => None,
            };
            continue;
        }
        let Some(mut line) = parse_line(row) else {
            continue;
        };
        if let Some(file) = &source_file {
            line.file = file.clone();
        }
        if scope.contains(&line.file) {
            lines.push(line);
        }
    }
    lines.sort_by(|a, b| b.cost.cmp(&a.cost));
    lines.truncate(limit);
    lines
}

fn next_token(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    if s.is_empty() {
        return None;
    }
    match s.find(char::is_whitespace) {
        Some(end) => Some((&s[..end], &s[end..])),
        None => Some((s, "")),
    }
}

fn parse_cost(token: &str) -> Option<u64> {
    if !token.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    if !token.chars().all(|c| c.is_ascii_digit() || c == ',') {
        return None;
    }
    token.replace(',', "").parse().ok()
}

fn is_column(token: &str) -> bool {
    token == "." || token.contains('%') || parse_cost(token).is_some()
}
