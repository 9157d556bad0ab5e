// Legacy blame-path order documents.
//
// The clash grouper's original path configuration is an INI file whose entries,
// read top to bottom, give blame precedence:
//
//   [Structural]
//   S-Model.nwc
//   columns = S-Columns.nwc
//
// An entry contributes its value when it has one, otherwise its key.

use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathOrderError {
    /// An entry appears before any `[SECTION]` header.
    NoSection { line: usize },
    /// A line could not be understood (e.g. unterminated header).
    Parse { line: usize, content: String },
    DuplicateSection { section: String },
    DuplicateOption { section: String, option: String },
}

impl fmt::Display for PathOrderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSection { line } => {
                write!(f, "line {line}: entry outside of a section; start the file with a [SECTION] header")
            }
            Self::Parse { line, content } => write!(f, "line {line}: cannot parse '{content}'"),
            Self::DuplicateSection { section } => {
                write!(f, "section '[{section}]' appears more than once")
            }
            Self::DuplicateOption { section, option } => write!(
                f,
                "option '{option}' appears more than once in section '[{section}]'"
            ),
        }
    }
}

impl std::error::Error for PathOrderError {}

/// Parse a path order document into blame paths, in file order.
pub fn parse_path_order(input: &str) -> Result<Vec<String>, PathOrderError> {
    let mut paths = Vec::new();
    let mut sections: HashSet<String> = HashSet::new();
    let mut current: Option<String> = None;
    let mut seen: HashSet<String> = HashSet::new();

    for (i, raw) in input.lines().enumerate() {
        let line_no = i + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if line.starts_with('[') {
            let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) else {
                return Err(PathOrderError::Parse { line: line_no, content: line.to_string() });
            };
            let name = name.trim().to_string();
            if !sections.insert(name.clone()) {
                return Err(PathOrderError::DuplicateSection { section: name });
            }
            current = Some(name);
            seen.clear();
            continue;
        }

        let Some(ref section) = current else {
            return Err(PathOrderError::NoSection { line: line_no });
        };

        let (key, value) = match line.find(['=', ':']) {
            Some(pos) => (line[..pos].trim(), line[pos + 1..].trim()),
            None => (line, ""),
        };
        if key.is_empty() {
            return Err(PathOrderError::Parse { line: line_no, content: line.to_string() });
        }
        if !seen.insert(key.to_string()) {
            return Err(PathOrderError::DuplicateOption {
                section: section.clone(),
                option: key.to_string(),
            });
        }

        paths.push(if value.is_empty() { key } else { value }.to_string());
    }

    Ok(paths)
}
