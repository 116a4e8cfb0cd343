//! Aggregate statistics over the loaded mirror

use serde::{Deserialize, Serialize};

use crate::descriptor::Descriptor;

/// Moments of a count distribution
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CountSummary {
    pub min: usize,
    pub max: usize,
    pub mean: f64,
    pub std_dev: f64,
}

impl CountSummary {
    fn from_values(values: &[usize]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let min = *values.iter().min().expect("non-empty");
        let max = *values.iter().max().expect("non-empty");
        let mean = values.iter().sum::<usize>() as f64 / values.len() as f64;
        let variance = values
            .iter()
            .map(|&v| {
                let d = v as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / values.len() as f64;
        Self {
            min,
            max,
            mean,
            std_dev: variance.sqrt(),
        }
    }
}

/// Workspace-wide aggregates, recomputed on demand
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceStats {
    pub markdown_files: usize,
    pub code_files: usize,
    pub attachments: usize,
    pub directories: usize,
    pub words: CountSummary,
    pub chars: CountSummary,
}

/// Collect statistics over every loaded root
pub fn collect(roots: &[Descriptor]) -> WorkspaceStats {
    let mut stats = WorkspaceStats::default();
    let mut word_counts = Vec::new();
    let mut char_counts = Vec::new();

    for root in roots {
        root.walk(&mut |node| match node {
            Descriptor::Directory(_) => stats.directories += 1,
            Descriptor::Markdown(md) => {
                stats.markdown_files += 1;
                word_counts.push(md.word_count);
                char_counts.push(md.char_count);
            }
            Descriptor::Code(_) => stats.code_files += 1,
            Descriptor::Other(_) => stats.attachments += 1,
        });
    }

    stats.words = CountSummary::from_values(&word_counts);
    stats.chars = CountSummary::from_values(&char_counts);
    stats
}
