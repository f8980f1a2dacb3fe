//! Workflow receipts.
//!
//! A [`WorkflowReceipt`] is the ordered trace of confirmed steps for one run.
//! It records the last step that reached finality so a failed run can be
//! resumed, and carries a SHA-256 digest over the deterministic part of the
//! trace so two runs with identical inputs can be compared.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::mint::FinalizedArtifact;
use crate::types::{hex_encode, NetworkId, TxHash, WorkflowStep};

/// One confirmed step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Which step completed.
    pub step: WorkflowStep,

    /// What the step acted on (a logical program name, a token id).
    pub label: String,

    /// Confirming transaction, if the step wrote to the ledger.
    pub tx_hash: Option<TxHash>,

    /// Block of the confirming transaction.
    pub block_number: Option<u64>,

    /// When the step was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl Checkpoint {
    /// A step that wrote to the ledger.
    pub fn confirmed(step: WorkflowStep, label: impl Into<String>, tx_hash: TxHash, block_number: u64) -> Self {
        Self {
            step,
            label: label.into(),
            tx_hash: Some(tx_hash),
            block_number: Some(block_number),
            recorded_at: Utc::now(),
        }
    }

    /// A step that only read state.
    pub fn local(step: WorkflowStep, label: impl Into<String>) -> Self {
        Self {
            step,
            label: label.into(),
            tx_hash: None,
            block_number: None,
            recorded_at: Utc::now(),
        }
    }

    fn fingerprint(&self) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(self.step.to_string().as_bytes());
        hasher.update(self.label.as_bytes());
        if let Some(tx) = &self.tx_hash {
            hasher.update(tx.as_str().as_bytes());
        }
        if let Some(block) = self.block_number {
            hasher.update(block.to_be_bytes());
        }
        hasher.finalize().to_vec()
    }
}

/// Trace of one workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowReceipt {
    pub run_id: Uuid,
    pub network: NetworkId,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub checkpoints: Vec<Checkpoint>,
    pub artifact: Option<FinalizedArtifact>,

    /// Digest of the checkpoint trace and artifact, hex encoded.
    pub digest: String,
}

impl WorkflowReceipt {
    /// Start a receipt for a new run.
    pub fn new(network: NetworkId) -> Self {
        let mut receipt = Self {
            run_id: Uuid::new_v4(),
            network,
            started_at: Utc::now(),
            finished_at: None,
            checkpoints: Vec::new(),
            artifact: None,
            digest: String::new(),
        };
        receipt.digest = receipt.compute_digest();
        receipt
    }

    /// Append a confirmed step.
    pub fn record(&mut self, checkpoint: Checkpoint) {
        tracing::debug!(
            run_id = %self.run_id,
            step = %checkpoint.step,
            label = %checkpoint.label,
            "Checkpoint recorded"
        );
        self.checkpoints.push(checkpoint);
        self.digest = self.compute_digest();
    }

    /// The most recent step that reached finality.
    pub fn last_checkpoint(&self) -> Option<&Checkpoint> {
        self.checkpoints.last()
    }

    /// Steps recorded so far, in order.
    pub fn steps(&self) -> Vec<WorkflowStep> {
        self.checkpoints.iter().map(|c| c.step).collect()
    }

    /// Close the receipt with the finalized artifact.
    pub fn finish(&mut self, artifact: FinalizedArtifact) {
        self.artifact = Some(artifact);
        self.finished_at = Some(Utc::now());
        self.digest = self.compute_digest();
    }

    /// Digest over step fingerprints and the artifact reference.
    /// Timestamps and the run id are excluded.
    pub fn compute_digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.network.0.to_be_bytes());
        for checkpoint in &self.checkpoints {
            hasher.update(checkpoint.fingerprint());
        }
        if let Some(artifact) = &self.artifact {
            hasher.update(artifact.token_id.to_be_bytes());
            hasher.update(artifact.token_uri.as_bytes());
        }
        hex_encode(&hasher.finalize())
    }

    /// Verify the stored digest matches the trace.
    pub fn verify_digest(&self) -> bool {
        self.digest == self.compute_digest()
    }
}
