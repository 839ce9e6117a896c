// SPDX-License-Identifier: MIT OR Apache-2.0

//! Few-shot prompt block rendering for retrieved exemplars.

use crate::index::Candidate;

/// Default number of exemplars rendered into a prompt
pub const DEFAULT_MAX_EXAMPLES: usize = 3;

/// Renders exemplars as numbered query/output pairs
#[derive(Debug, Clone)]
pub struct ExemplarFormatter {
    max_examples: usize,
    query_label: String,
    output_label: String,
}

impl Default for ExemplarFormatter {
    fn default() -> Self {
        Self {
            max_examples: DEFAULT_MAX_EXAMPLES,
            query_label: "Query".to_string(),
            output_label: "Output".to_string(),
        }
    }
}

impl ExemplarFormatter {
    pub fn new(max_examples: usize) -> Self {
        Self {
            max_examples,
            ..Default::default()
        }
    }

    /// Override the "Query"/"Output" labels
    pub fn with_labels(mut self, query_label: impl Into<String>, output_label: impl Into<String>) -> Self {
        self.query_label = query_label.into();
        self.output_label = output_label.into();
        self
    }

    /// Blocks are separated by a blank line; the text ends with one newline.
    pub fn format(&self, exemplars: &[Candidate]) -> String {
        let mut lines = Vec::new();
        for (i, exemplar) in exemplars.iter().take(self.max_examples).enumerate() {
            let output = serde_json::to_string_pretty(&exemplar.output)
                .unwrap_or_else(|_| exemplar.output.to_string());
            lines.push(format!("Example {}:", i + 1));
            lines.push(format!("{}: {}", self.query_label, exemplar.query_text));
            lines.push(format!("{}:", self.output_label));
            lines.push(output);
            lines.push(String::new());
        }
        lines.join("\n")
    }
}

/// Renders the first `max_examples` exemplars with the default labels.
pub fn format_for_prompt(exemplars: &[Candidate], max_examples: usize) -> String {
    ExemplarFormatter::new(max_examples).format(exemplars)
}
