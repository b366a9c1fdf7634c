// SPDX-License-Identifier: MIT OR Apache-2.0

//! Output and color utilities for consistent terminal formatting
//!
//! Provides shared color functions respecting NO_COLOR environment variable.

use colored::Colorize;
use std::fmt::Write;

use crate::engine::{IndexReport, SearchResponse};

/// Check if colors should be used (respects NO_COLOR env var)
pub fn use_colors() -> bool {
    std::env::var("NO_COLOR").is_err()
}

/// Colorize document id (cyan bold)
pub fn colorize_id(text: &str, use_color: bool) -> String {
    if use_color {
        text.cyan().bold().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize score (yellow)
pub fn colorize_score(score: f32, use_color: bool) -> String {
    let text = format!("{:.3}", score);
    if use_color {
        text.yellow().to_string()
    } else {
        text
    }
}

/// Colorize matched keyword (green)
pub fn colorize_keyword(text: &str, use_color: bool) -> String {
    if use_color {
        text.green().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize secondary text (dimmed)
pub fn colorize_dim(text: &str, use_color: bool) -> String {
    if use_color {
        text.dimmed().to_string()
    } else {
        text.to_string()
    }
}

/// Human-readable rendering of a search response.
pub fn format_response(response: &SearchResponse, use_color: bool) -> String {
    let mut out = String::new();

    if response.results.is_empty() {
        if use_color {
            let _ = writeln!(
                out,
                "{} No results found for: {}",
                "✗".red(),
                response.query.yellow()
            );
        } else {
            let _ = writeln!(out, "No results found for: {}", response.query);
        }
        return out;
    }

    if use_color {
        let _ = writeln!(
            out,
            "\n{} Found {} results for: {}\n",
            "✓".green(),
            response.results.len().to_string().cyan(),
            response.query.yellow()
        );
    } else {
        let _ = writeln!(
            out,
            "\nFound {} results for: {}\n",
            response.results.len(),
            response.query
        );
    }

    for (rank, result) in response.results.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. {}  score {}  similarity {}",
            rank + 1,
            colorize_id(&result.doc_id, use_color),
            colorize_score(result.score, use_color),
            colorize_score(result.raw_score, use_color),
        );
        let _ = writeln!(
            out,
            "   {}",
            colorize_dim(
                &format!(
                    "{} ({} chars)",
                    result.metadata.source_path, result.metadata.length
                ),
                use_color
            )
        );

        let explanation = &result.explanation;
        if !explanation.overlap_keywords.is_empty() {
            let keywords: Vec<String> = explanation
                .overlap_keywords
                .iter()
                .map(|k| colorize_keyword(k, use_color))
                .collect();
            let _ = writeln!(
                out,
                "   matched: {} ({:.0}% of query terms)",
                keywords.join(", "),
                explanation.overlap_ratio * 100.0
            );
        }
        let _ = writeln!(out, "   {}", result.preview);
        let _ = writeln!(out);
    }

    out
}

/// One-line summary of an indexing run.
pub fn format_report(report: &IndexReport, use_color: bool) -> String {
    let summary = format!(
        "Indexed {} documents ({} cached, {} embedded)",
        report.total, report.cache_hits, report.embedded
    );
    if use_color {
        format!("{} {}", "✓".green(), summary)
    } else {
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Explanation, ResultMetadata, SearchResult};

    fn response() -> SearchResponse {
        SearchResponse {
            query: "machine learning".to_string(),
            results: vec![SearchResult {
                doc_id: "d1".to_string(),
                score: 0.91,
                raw_score: 0.89,
                preview: "machine learning basics".to_string(),
                explanation: Explanation {
                    overlap_keywords: vec!["machine".to_string(), "learning".to_string()],
                    overlap_count: 2,
                    overlap_ratio: 1.0,
                    length_norm: 0.99,
                },
                metadata: ResultMetadata {
                    length: 23,
                    source_path: "docs/d1.txt".to_string(),
                },
            }],
        }
    }

    #[test]
    fn test_format_response_plain() {
        let text = format_response(&response(), false);
        assert!(text.contains("Found 1 results for: machine learning"));
        assert!(text.contains("1. d1  score 0.910  similarity 0.890"));
        assert!(text.contains("docs/d1.txt (23 chars)"));
        assert!(text.contains("matched: machine, learning (100% of query terms)"));
        assert!(text.contains("machine learning basics"));
    }

    #[test]
    fn test_format_empty_response() {
        let empty = SearchResponse {
            query: "nothing".to_string(),
            results: Vec::new(),
        };
        assert_eq!(format_response(&empty, false), "No results found for: nothing\n");
    }

    #[test]
    fn test_format_report_plain() {
        let report = IndexReport {
            total: 3,
            cache_hits: 2,
            embedded: 1,
        };
        assert_eq!(
            format_report(&report, false),
            "Indexed 3 documents (2 cached, 1 embedded)"
        );
    }
}
