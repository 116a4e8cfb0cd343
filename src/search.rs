//! Boolean term-group search over a file's name, tags, and content
//!
//! A query is a sequence of term groups tagged AND, OR, or NOT. Filename
//! and tag matches rank above content matches; the exact weight numbers
//! are ranking detail, not a public contract.

use serde::{Deserialize, Serialize};

use crate::descriptor::Descriptor;

/// Weight of a filename/tag match (ranks above content lines)
const WEIGHT_TITLE: u32 = 2;
/// Weight of a single content line hit
const WEIGHT_LINE: u32 = 1;

/// How a term group combines its words
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TermOperator {
    /// Every word must match
    And,
    /// Any one word suffices
    Or,
    /// Any word disqualifies the whole file
    Not,
}

/// One group of words in a query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchTerm {
    pub words: Vec<String>,
    pub operator: TermOperator,
}

impl SearchTerm {
    pub fn new(operator: TermOperator, words: &[&str]) -> Self {
        Self {
            words: words.iter().map(|w| w.to_string()).collect(),
            operator,
        }
    }
}

/// Half-open character range within a line or filename
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// One search hit: the filename (line == -1) or a content line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineMatch {
    /// Zero-based line number; -1 denotes a filename match
    pub line: i64,

    /// Matched line text (the filename for line == -1)
    pub text: String,

    /// Matched character ranges, sorted by start
    pub ranges: Vec<Span>,

    /// Summed match weight
    pub weight: u32,
}

/// Evaluate `terms` against one file.
///
/// Returns line-level matches led by a filename match when one exists, or
/// an empty vector when the query does not apply.
pub fn search_file(descriptor: &Descriptor, content: &str, terms: &[SearchTerm]) -> Vec<LineMatch> {
    let name = descriptor.name();
    let name_lower = name.to_lowercase();
    let content_lower = content.to_lowercase();
    let tags: &[String] = descriptor
        .as_markdown()
        .map(|md| md.tags.as_slice())
        .unwrap_or(&[]);

    // 1. Any NOT word present anywhere disqualifies the file
    for term in terms.iter().filter(|t| t.operator == TermOperator::Not) {
        for word in &term.words {
            let word_lower = word.to_lowercase();
            if name_lower.contains(&word_lower) || content_lower.contains(&word_lower) {
                return Vec::new();
            }
        }
    }

    let positive: Vec<&SearchTerm> = terms
        .iter()
        .filter(|t| t.operator != TermOperator::Not)
        .collect();

    // 2. An all-exclusion query requests "everything not excluded"
    if positive.is_empty() {
        return vec![title_match(name)];
    }

    // 3. Filename/tag pass: every group satisfied => weight-2 title match
    let title_result = positive
        .iter()
        .all(|term| group_matches_title(term, &name_lower, tags))
        .then(|| title_match(name));

    // 4. Content pass: every group must be satisfiable over the content
    let mut line_hits: Vec<LineMatch> = Vec::new();
    let mut all_groups_satisfied = true;
    for term in &positive {
        let mut word_hits: Vec<LineMatch> = Vec::new();
        let mut matched_words = 0;
        for word in &term.words {
            let hits = scan_lines(content, word);
            if !hits.is_empty() {
                matched_words += 1;
                word_hits.extend(hits);
            }
        }
        let satisfied = match term.operator {
            TermOperator::And => matched_words == term.words.len(),
            _ => matched_words > 0,
        };
        if satisfied {
            line_hits.extend(word_hits);
        } else {
            all_groups_satisfied = false;
        }
    }

    if !all_groups_satisfied {
        return title_result.into_iter().collect();
    }

    // 5. Merge same-line hits, order by line, title result first
    let mut results: Vec<LineMatch> = title_result.into_iter().collect();
    results.extend(merge_line_hits(line_hits));
    results
}

fn title_match(name: &str) -> LineMatch {
    LineMatch {
        line: -1,
        text: name.to_string(),
        ranges: vec![Span {
            start: 0,
            end: name.chars().count(),
        }],
        weight: WEIGHT_TITLE,
    }
}

/// AND requires every word; OR any word. A leading `#` is a tag alias.
fn group_matches_title(term: &SearchTerm, name_lower: &str, tags: &[String]) -> bool {
    let word_matches = |word: &String| -> bool {
        let word_lower = word.to_lowercase();
        match word_lower.strip_prefix('#') {
            Some(tag) => tags.iter().any(|t| t == tag) || name_lower.contains(&word_lower),
            None => name_lower.contains(&word_lower),
        }
    };
    match term.operator {
        TermOperator::And => term.words.iter().all(word_matches),
        _ => term.words.iter().any(word_matches),
    }
}

/// Find `word` in every line of `content`.
///
/// Case-insensitive, but an exact-case occurrence on a line is preferred
/// and recorded at its own position.
fn scan_lines(content: &str, word: &str) -> Vec<LineMatch> {
    if word.is_empty() {
        return Vec::new();
    }
    let word_lower = word.to_lowercase();
    let mut hits = Vec::new();

    for (line_no, line) in content.lines().enumerate() {
        // Column is derived from the same string the index came from, so
        // case folding that changes byte lengths cannot split a char
        let start = match line.find(word) {
            Some(byte_start) => line[..byte_start].chars().count(),
            None => {
                let line_lower = line.to_lowercase();
                match line_lower.find(&word_lower) {
                    Some(byte_start) => line_lower[..byte_start].chars().count(),
                    None => continue,
                }
            }
        };
        let end = start + word.chars().count();
        hits.push(LineMatch {
            line: line_no as i64,
            text: line.to_string(),
            ranges: vec![Span { start, end }],
            weight: WEIGHT_LINE,
        });
    }
    hits
}

/// Merge hits landing on the same line into one result with summed weight
/// and start-sorted ranges, the whole list ordered by line number.
fn merge_line_hits(hits: Vec<LineMatch>) -> Vec<LineMatch> {
    let mut merged: Vec<LineMatch> = Vec::new();
    for hit in hits {
        match merged.iter_mut().find(|m| m.line == hit.line) {
            Some(existing) => {
                existing.weight += hit.weight;
                for range in hit.ranges {
                    if !existing.ranges.contains(&range) {
                        existing.ranges.push(range);
                    }
                }
            }
            None => merged.push(hit),
        }
    }
    for result in &mut merged {
        result.ranges.sort_by_key(|r| r.start);
    }
    merged.sort_by_key(|r| r.line);
    merged
}
