//! `show interface` name extraction.
//!
//! Each interface starts a line in the first column; counter continuation
//! lines are indented.

use super::remove_control_chars;

pub fn parse_interface_names(text: &str) -> Vec<String> {
    first_column_names(text, "Name")
}

/// Unique first-column tokens of lines that are not indented, in order of
/// appearance. `header` is the label of an unindented header row.
pub(crate) fn first_column_names(text: &str, header: &str) -> Vec<String> {
    let text = remove_control_chars(text);
    let mut names: Vec<String> = Vec::new();
    for line in text.lines() {
        if line.is_empty() || line.starts_with(char::is_whitespace) {
            continue;
        }
        let Some(name) = line.split_whitespace().next() else {
            continue;
        };
        if name != header && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}
