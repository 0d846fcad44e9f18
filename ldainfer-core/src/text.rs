use std::fs;
use std::path::Path;

use crate::error::{InferError, Result};
use crate::types::DocTopics;

pub fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| InferError::io(path, e))
}

/// Strips trailing spaces and `\r`, then splits on `sep` keeping empty fields.
pub fn split_fields(line: &str, sep: char) -> Vec<&str> {
    let line = line.trim_end_matches([' ', '\r']);
    if line.is_empty() {
        return Vec::new();
    }
    line.split(sep).collect()
}

/// Tokens of one space-separated document line.
pub fn line_tokens(line: &str) -> Vec<String> {
    split_fields(line, ' ')
        .into_iter()
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// One document per line; blank lines become empty documents so output stays line-aligned.
pub fn parse_documents(s: &str) -> Vec<Vec<String>> {
    s.lines().map(line_tokens).collect()
}

// One line per document: "topic:count topic:count ..."
pub fn write_doc_topics(docs: &[DocTopics]) -> String {
    let mut out = String::new();
    for doc in docs {
        let mut first = true;
        for &(topic, count) in doc {
            if first {
                out.push_str(&format!("{topic}:{count}"));
                first = false;
            } else {
                out.push_str(&format!(" {topic}:{count}"));
            }
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_fields_trims_trailing_space_and_cr() {
        assert_eq!(split_fields("0\tapple\t5 \r", '\t'), vec!["0", "apple", "5"]);
        assert_eq!(split_fields("a  b", ' '), vec!["a", "", "b"]);
        assert!(split_fields(" \r", ' ').is_empty());
    }

    #[test]
    fn line_tokens_drops_empty_fields() {
        assert_eq!(line_tokens("a  b c\r"), vec!["a", "b", "c"]);
    }

    #[test]
    fn parse_documents_keeps_blank_lines() {
        let docs = parse_documents("a b\n\nc\n");
        assert_eq!(docs.len(), 3);
        assert!(docs[1].is_empty());
        assert_eq!(docs[2], vec!["c"]);
    }

    #[test]
    fn doc_topics_are_written_one_line_each() {
        let out = write_doc_topics(&[vec![(0, 2), (3, 1)], vec![], vec![(7, 4)]]);
        assert_eq!(out, "0:2 3:1\n\n7:4\n");
    }
}
