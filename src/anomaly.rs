//! Warning/error extraction over a window of tab-delimited istiod log lines.
//!
//! Lines look like `timestamp \t level \t scope \t ... \t message`. A flagged line is summarized
//! together with the most frequent words of the lines leading up to it.

use std::collections::HashMap;

use crate::types::{AnomalyRecord, WordCount};

/// Words too common in istiod push logs to say anything.
pub const STOPWORDS: &[&str] = &["for", "new", "PUSH", "request", "CDS", "RDS", "LDS"];
pub const CONTEXT_LINES: usize = 10;
pub const TOP_WORDS: usize = 5;

const FLAGGED_LEVELS: &[&str] = &["warn", "error"];
const MIN_FIELDS: usize = 4;

/// Last tab-delimited field of a line.
pub fn trace_field(line: &str) -> &str {
    line.rsplit('\t').next().unwrap_or(line)
}

/// Top `n` non-stoplisted words of the trace fields, ties kept in first-seen order.
pub fn most_frequent_words<S: AsRef<str>>(window: &[S], n: usize) -> Vec<WordCount> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut counts: Vec<(&str, usize)> = Vec::new();

    for line in window {
        for word in trace_field(line.as_ref()).split_whitespace() {
            if STOPWORDS.contains(&word) {
                continue;
            }
            match index.get(word) {
                Some(&i) => counts[i].1 += 1,
                None => {
                    index.insert(word, counts.len());
                    counts.push((word, 1));
                }
            }
        }
    }

    // stable sort keeps insertion order among equal counts
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
        .into_iter()
        .take(n)
        .map(|(word, count)| WordCount { word: word.to_string(), count })
        .collect()
}

pub fn analyze_lines<S: AsRef<str>>(lines: &[S]) -> Vec<AnomalyRecord> {
    let mut records = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        let fields: Vec<&str> = line.as_ref().split('\t').collect();
        if fields.len() < MIN_FIELDS {
            continue;
        }
        let level = fields[1].to_lowercase();
        if !FLAGGED_LEVELS.contains(&level.as_str()) {
            continue;
        }

        let start = i.saturating_sub(CONTEXT_LINES);
        records.push(AnomalyRecord {
            trace: fields[fields.len() - 1].to_string(),
            most_frequent_words: most_frequent_words(&lines[start..i], TOP_WORDS),
            timestamp: fields[0].to_string(),
            level,
        });
    }

    records
}
