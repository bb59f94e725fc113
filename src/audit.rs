//! Economic audit trail. Every remote model call is reported here; writes go
//! through a bounded queue drained by a single worker so the pipeline never
//! waits on (or fails because of) the audit store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::StoreError;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Intelligence,
    Image,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EconomicEvent {
    /// Carousel the call belongs to.
    pub flow_id: Uuid,
    pub phase: String,
    pub model: String,
    pub kind: EventKind,
    pub user_id: String,
    pub user_email: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

/// A persisted [`EconomicEvent`] with its price.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EconomicRecord {
    pub id: Uuid,
    #[serde(flatten)]
    pub event: EconomicEvent,
    pub cost_eur: f64,
    pub cumulative_cost_eur: f64,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record_economic_event(&self, event: EconomicEvent) -> Result<EconomicRecord, StoreError>;
}

/// Handle to the audit queue. Cloning is cheap; the worker stops once every
/// handle is dropped and the queue is drained.
#[derive(Clone)]
pub struct AuditLog {
    tx: mpsc::Sender<EconomicEvent>,
}

impl AuditLog {
    pub fn spawn(sink: Arc<dyn AuditSink>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<EconomicEvent>(capacity.max(1));
        let worker = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let phase = event.phase.clone();
                let flow = event.flow_id;
                match sink.record_economic_event(event).await {
                    Ok(record) => debug!(
                        "💶 Audit {} for {} recorded (cost {:.4} EUR, cumulative {:.4} EUR)",
                        phase, flow, record.cost_eur, record.cumulative_cost_eur
                    ),
                    Err(e) => warn!("⚠️ Audit write failed for {} ({}): {}", flow, phase, e),
                }
            }
            debug!("Audit worker stopped");
        });
        (Self { tx }, worker)
    }

    /// Queues an event without waiting. A full or closed queue drops the event.
    pub fn emit(&self, event: EconomicEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!("⚠️ Audit queue full, dropping {} event for {}", event.phase, event.flow_id)
            }
            Err(TrySendError::Closed(event)) => {
                warn!("⚠️ Audit worker gone, dropping {} event for {}", event.phase, event.flow_id)
            }
        }
    }
}
