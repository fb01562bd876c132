// SPDX-License-Identifier: MIT OR Apache-2.0
//! Single-scan statistics rollup.

use crate::AuditEntry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregated processing statistics for a date range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStats {
    /// Completed plus failed jobs.
    pub total_jobs: u64,
    /// Jobs that reached the `completed` stage.
    pub completed_jobs: u64,
    /// Jobs that recorded an `error` stage.
    pub failed_jobs: u64,
    /// Jobs that recorded a `cancelled` status.
    pub cancelled_jobs: u64,
    /// LLM calls made.
    pub llm_calls: u64,
    /// Human review events.
    pub human_reviews: u64,
    /// Completed jobs whose final status was `auto_posted`.
    pub auto_posted: u64,
    /// Entries seen per stage.
    pub stage_counts: BTreeMap<String, u64>,
    /// Failure count per rule.
    pub rule_failures: BTreeMap<String, u64>,
    /// Mean processing time, when any was recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_processing_time_ms: Option<f64>,
    /// Longest processing time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_processing_time_ms: Option<u64>,
    /// Shortest processing time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_processing_time_ms: Option<u64>,

    #[serde(skip)]
    durations: Vec<u64>,
}

impl ProcessingStats {
    /// Fold one entry into the rollup.
    pub fn absorb(&mut self, entry: &AuditEntry) {
        match entry.entry_type.as_deref() {
            Some("llm_call") => self.llm_calls += 1,
            Some("human_review") => self.human_reviews += 1,
            Some("rule_failure") => {
                let rule = entry.metadata["rule_name"]
                    .as_str()
                    .unwrap_or("unknown")
                    .to_string();
                *self.rule_failures.entry(rule).or_insert(0) += 1;
            }
            _ => {}
        }

        if let Some(stage) = entry.stage.as_deref() {
            *self.stage_counts.entry(stage.to_string()).or_insert(0) += 1;
            match stage {
                "completed" => {
                    self.completed_jobs += 1;
                    if entry.metadata["final_status"] == "auto_posted" {
                        self.auto_posted += 1;
                    }
                }
                "error" => self.failed_jobs += 1,
                "cancelled" => self.cancelled_jobs += 1,
                _ => {}
            }
        }

        if let Some(ms) = entry.duration_ms {
            self.durations.push(ms);
        }
    }

    /// Derive the aggregate figures after the scan.
    pub fn finish(&mut self) {
        self.total_jobs = self.completed_jobs + self.failed_jobs;
        if !self.durations.is_empty() {
            let sum: u64 = self.durations.iter().sum();
            self.avg_processing_time_ms = Some(sum as f64 / self.durations.len() as f64);
            self.max_processing_time_ms = self.durations.iter().max().copied();
            self.min_processing_time_ms = self.durations.iter().min().copied();
        }
    }
}
