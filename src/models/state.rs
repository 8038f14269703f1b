//! Per-product state machine.
//!
//! Every identifier starts `Discovered` and ends either `Persisted` or
//! `Failed`. The failing stage is derived from the state the item was in, so
//! a failure can never be attributed to a stage that already completed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Pipeline stage an item can fail in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Detail,
    Extraction,
    Persist,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Detail => "detail",
            Stage::Extraction => "extraction",
            Stage::Persist => "persist",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "detail" => Some(Stage::Detail),
            "extraction" => Some(Stage::Extraction),
            "persist" => Some(Stage::Persist),
            _ => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a per-item failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NotFound,
    Extraction,
    Rejected,
    RetriesExhausted,
    Timeout,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::NotFound => "not_found",
            FailureKind::Extraction => "extraction",
            FailureKind::Rejected => "rejected",
            FailureKind::RetriesExhausted => "retries_exhausted",
            FailureKind::Timeout => "timeout",
        }
    }
}

/// Why an item ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub message: String,
    /// Calls made for the failing stage before giving up
    pub attempts: u32,
}

impl FailureReason {
    pub fn new(kind: FailureKind, message: impl Into<String>, attempts: u32) -> Self {
        Self {
            kind,
            message: message.into(),
            attempts,
        }
    }

    /// Classify the last client error of a stage.
    pub fn from_client(error: &ClientError, attempts: u32) -> Self {
        let kind = match error {
            ClientError::NotFound(_) => FailureKind::NotFound,
            ClientError::Extraction(_) => FailureKind::Extraction,
            ClientError::Rejected(_) | ClientError::Unauthorized(_) => FailureKind::Rejected,
            ClientError::Timeout(_) => FailureKind::Timeout,
            ClientError::Transient(_) | ClientError::RateLimited { .. } => {
                FailureKind::RetriesExhausted
            }
        };
        Self::new(kind, error.to_string(), attempts)
    }

    /// Permanent failures are checkpointed and never retried; the others
    /// stay eligible for the next run.
    pub fn is_permanent(&self) -> bool {
        !matches!(
            self.kind,
            FailureKind::RetriesExhausted | FailureKind::Timeout
        )
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} after {} attempt(s): {}",
            self.kind.as_str(),
            self.attempts,
            self.message
        )
    }
}

/// Lifecycle of one product identifier within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ItemState {
    Discovered,
    DetailFetched,
    Extracted,
    Persisted { rows: usize },
    Failed { stage: Stage, reason: FailureReason },
}

impl ItemState {
    pub fn name(&self) -> &'static str {
        match self {
            ItemState::Discovered => "discovered",
            ItemState::DetailFetched => "detail_fetched",
            ItemState::Extracted => "extracted",
            ItemState::Persisted { .. } => "persisted",
            ItemState::Failed { .. } => "failed",
        }
    }

    /// Stage that runs next from this state, if any.
    pub fn pending_stage(&self) -> Option<Stage> {
        match self {
            ItemState::Discovered => Some(Stage::Detail),
            ItemState::DetailFetched => Some(Stage::Extraction),
            ItemState::Extracted => Some(Stage::Persist),
            ItemState::Persisted { .. } | ItemState::Failed { .. } => None,
        }
    }

    /// Move forward one stage.
    ///
    /// Returns the names of both states when `next` is not the successor of
    /// `self`.
    pub fn advance(self, next: ItemState) -> Result<ItemState, (&'static str, &'static str)> {
        let legal = matches!(
            (&self, &next),
            (ItemState::Discovered, ItemState::DetailFetched)
                | (ItemState::DetailFetched, ItemState::Extracted)
                | (ItemState::Extracted, ItemState::Persisted { .. })
        );
        if legal {
            Ok(next)
        } else {
            Err((self.name(), next.name()))
        }
    }

    /// Fail in whatever stage is pending.
    pub fn fail(self, reason: FailureReason) -> Result<ItemState, (&'static str, &'static str)> {
        match self.pending_stage() {
            Some(stage) => Ok(ItemState::Failed { stage, reason }),
            None => Err((self.name(), "failed")),
        }
    }
}

/// What the checkpoint remembers about an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Persisted,
    Failed,
    /// Transient failures exhausted the retry budget; eligible next run.
    Deferred,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Persisted => "persisted",
            Outcome::Failed => "failed",
            Outcome::Deferred => "deferred",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "persisted" => Some(Outcome::Persisted),
            "failed" => Some(Outcome::Failed),
            "deferred" => Some(Outcome::Deferred),
            _ => None,
        }
    }

    /// Whether the identifier is skipped by later runs.
    pub fn is_done(&self) -> bool {
        !matches!(self, Outcome::Deferred)
    }
}
