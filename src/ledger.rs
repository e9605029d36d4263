//! Checkpoint ledger and budget accounting
//!
//! Every executed stage appends exactly one [`Checkpoint`] recording token
//! consumption, variance against the expected budget, and quality. The
//! ledger is the only shared mutable resource in a run: appends are
//! serialized behind a lock and entries are never modified afterwards.
//!
//! Variance policy: `(actual - expected) / expected`; below the investigate
//! threshold execution continues, between investigate and halt the entry is
//! flagged, above halt no further stages are launched.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

/// What the budget policy decided after a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckpointStatus {
    Continue,
    Investigate,
    Halt,
}

/// Variance thresholds for the continue/investigate/halt policy
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct VarianceThresholds {
    /// |variance| above this flags the entry
    pub investigate: f64,
    /// Overrun variance above this halts the run
    pub halt: f64,
}

impl Default for VarianceThresholds {
    fn default() -> Self {
        Self {
            investigate: 0.10,
            halt: 0.20,
        }
    }
}

impl VarianceThresholds {
    /// Classify a variance value
    ///
    /// Only overruns can halt; running far under budget is flagged for
    /// investigation, not stopped.
    pub fn classify(&self, variance: f64) -> CheckpointStatus {
        if variance > self.halt {
            CheckpointStatus::Halt
        } else if variance.abs() >= self.investigate {
            CheckpointStatus::Investigate
        } else {
            CheckpointStatus::Continue
        }
    }
}

/// One ledger entry for one executed stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(rename = "stage-id")]
    pub stage_id: String,
    /// Originating parallel branch; 0 outside parallel nodes
    #[serde(rename = "branch-index")]
    pub branch_index: usize,
    #[serde(rename = "tokens-before")]
    pub tokens_before: u64,
    #[serde(rename = "tokens-after")]
    pub tokens_after: u64,
    #[serde(rename = "expected-tokens")]
    pub expected_tokens: u64,
    pub quality: f64,
    pub variance: f64,
    pub status: CheckpointStatus,
    #[serde(rename = "recorded-at")]
    pub recorded_at: DateTime<Utc>,
}

/// Relative deviation of actual consumption from expected
pub fn variance(actual: u64, expected: u64) -> f64 {
    if expected == 0 {
        return 0.0;
    }
    (actual as f64 - expected as f64) / expected as f64
}

struct LedgerInner {
    run_id: Uuid,
    checkpoints: Mutex<Vec<Checkpoint>>,
    total_tokens: AtomicU64,
    halted: AtomicBool,
    thresholds: VarianceThresholds,
}

/// Append-only per-run checkpoint ledger, cloneable across branches
#[derive(Clone)]
pub struct BudgetLedger {
    inner: Arc<LedgerInner>,
}

impl BudgetLedger {
    pub fn new(run_id: Uuid, thresholds: VarianceThresholds) -> Self {
        debug!(%run_id, "BudgetLedger::new: called");
        Self {
            inner: Arc::new(LedgerInner {
                run_id,
                checkpoints: Mutex::new(Vec::new()),
                total_tokens: AtomicU64::new(0),
                halted: AtomicBool::new(false),
                thresholds,
            }),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.inner.run_id
    }

    /// Append a checkpoint for an executed stage
    ///
    /// Computes running token totals, variance, and status; a halt status
    /// raises the shared halt flag so no further stages launch.
    pub fn record_stage(
        &self,
        stage_id: &str,
        branch_index: usize,
        tokens_used: u64,
        expected_tokens: u64,
        quality: f64,
    ) -> CheckpointStatus {
        let tokens_before = self.inner.total_tokens.fetch_add(tokens_used, Ordering::SeqCst);
        let tokens_after = tokens_before + tokens_used;

        let variance = variance(tokens_used, expected_tokens);
        let status = self.inner.thresholds.classify(variance);
        if status == CheckpointStatus::Halt {
            warn!(%stage_id, variance, "BudgetLedger::record_stage: halt threshold breached");
            self.inner.halted.store(true, Ordering::SeqCst);
        }

        let checkpoint = Checkpoint {
            stage_id: stage_id.to_string(),
            branch_index,
            tokens_before,
            tokens_after,
            expected_tokens,
            quality,
            variance,
            status,
            recorded_at: Utc::now(),
        };
        debug!(%stage_id, branch_index, tokens_used, variance, ?status, "BudgetLedger::record_stage: appended");

        if let Ok(mut checkpoints) = self.inner.checkpoints.lock() {
            checkpoints.push(checkpoint);
        }
        status
    }

    /// True once any stage breached the halt threshold
    pub fn halted(&self) -> bool {
        self.inner.halted.load(Ordering::SeqCst)
    }

    /// Total tokens consumed so far across all branches
    pub fn total_tokens(&self) -> u64 {
        self.inner.total_tokens.load(Ordering::SeqCst)
    }

    /// Snapshot of all checkpoints in append order
    pub fn checkpoints(&self) -> Vec<Checkpoint> {
        self.inner
            .checkpoints
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.checkpoints.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Export the run as a structured document
    ///
    /// This is the one persisted artifact the engine produces: all
    /// checkpoints in append order plus the final aggregate quality and
    /// status.
    pub fn export_json(&self, final_quality: f64, final_status: &str) -> serde_json::Value {
        let checkpoints = self.checkpoints();
        debug!(run_id = %self.inner.run_id, count = checkpoints.len(), "BudgetLedger::export_json: called");
        serde_json::json!({
            "run-id": self.inner.run_id,
            "checkpoints": checkpoints,
            "total-tokens": self.total_tokens(),
            "final-quality": final_quality,
            "final-status": final_status,
        })
    }
}
