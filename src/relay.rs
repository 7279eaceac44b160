//! Reconciliation loop
//!
//! One cycle scans from `cursor + 1`, pays every event whose source tx is not
//! yet in the processed set, then persists. The cursor only moves past a
//! block once every event up to it was paid or skipped; the first failed
//! payout stops the batch and holds the cursor where it was. Dedup marks of
//! payouts that succeeded earlier in the same batch are kept, so the rescan
//! that follows does not pay them again.
//!
//! A payout that was broadcast but never got a receipt is still retried, and
//! the retry may pay twice. Each such payout bumps
//! `presale_relayer_payouts_unconfirmed_total`; alert on any increase and
//! reconcile the destination chain by hand.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::api::SharedStatus;
use crate::metrics;
use crate::state::{RelayState, StateStore};
use crate::watchers::EventSource;
use crate::writers::{Disperser, RetryPolicy};

/// Result of a single poll cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The scan failed; state was left untouched and not persisted
    ScanFailed,
    /// Every event was paid or already processed
    Completed { paid: usize, skipped: usize },
    /// A payout failed; the cursor was held
    PayoutFailed { paid: usize, skipped: usize },
}

impl CycleOutcome {
    pub fn is_failure(&self) -> bool {
        !matches!(self, CycleOutcome::Completed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            CycleOutcome::ScanFailed => "scan_failed",
            CycleOutcome::Completed { .. } => "completed",
            CycleOutcome::PayoutFailed { .. } => "payout_failed",
        }
    }
}

/// Drives scans and payouts against a durable cursor
pub struct Relayer<S, D> {
    source: S,
    disperser: D,
    store: StateStore,
    state: RelayState,
    policy: RetryPolicy,
    status: SharedStatus,
    consecutive_failures: u32,
}

impl<S: EventSource, D: Disperser> Relayer<S, D> {
    pub fn new(
        source: S,
        disperser: D,
        store: StateStore,
        state: RelayState,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            source,
            disperser,
            store,
            state,
            policy,
            status: SharedStatus::default(),
            consecutive_failures: 0,
        }
    }

    /// Publish progress into `status` (read by the HTTP endpoint)
    pub fn with_status(mut self, status: SharedStatus) -> Self {
        self.status = status;
        self
    }

    pub fn state(&self) -> &RelayState {
        &self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Rewind the cursor to `start_block` while keeping the processed set.
    ///
    /// Only meant to be called once, before the first cycle.
    pub fn force_rescan(&mut self, start_block: u64) {
        warn!(
            from = self.state.cursor,
            to = start_block,
            processed = self.state.processed.len(),
            "Forced rescan: rewinding cursor, processed set kept"
        );
        self.state.rewind_to(start_block);
    }

    /// Delay before the next cycle
    pub fn next_delay(&self) -> Duration {
        self.policy.delay_after(self.consecutive_failures)
    }

    /// Run one scan-and-pay cycle.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let cursor = self.state.cursor;
        let from_block = cursor.saturating_add(1);
        debug!(from_block, "Starting cycle");

        let events = match self.source.fetch_events(from_block).await {
            Ok(events) => events,
            Err(e) => {
                error!(from_block, error = %e, "Event scan failed, state left unchanged");
                metrics::record_scan_error();
                return self.finish(CycleOutcome::ScanFailed).await;
            }
        };
        metrics::record_scan(events.len());
        if !events.is_empty() {
            info!(from_block, count = events.len(), "Fetched presale transfers");
        }

        let mut advance_to = cursor;
        let mut paid = 0;
        let mut skipped = 0;
        let mut failed = false;

        for event in &events {
            if event.block_height > advance_to {
                advance_to = event.block_height;
            }

            if self.state.is_processed(&event.tx_id) {
                debug!(tx_id = %event.tx_id, "Already processed, skipping");
                metrics::record_payout("skipped");
                skipped += 1;
                continue;
            }

            match self
                .disperser
                .send(event.destination, event.amount, &event.tx_id)
                .await
            {
                Ok(dest_tx) => {
                    info!(
                        tx_id = %event.tx_id,
                        dest_tx = %dest_tx,
                        destination = %event.destination,
                        amount = %event.amount,
                        block = event.block_height,
                        "Relayed presale purchase"
                    );
                    self.state.mark_processed(event.tx_id.clone());
                    metrics::record_payout("paid");
                    paid += 1;
                }
                Err(failure) => {
                    error!(
                        tx_id = %event.tx_id,
                        destination = %event.destination,
                        amount = %event.amount,
                        block = event.block_height,
                        kind = failure.kind(),
                        error = %failure,
                        "Payout failed, holding cursor for retry"
                    );
                    if failure.may_have_landed() {
                        warn!(
                            tx_id = %event.tx_id,
                            "Payout may have landed without a receipt; check the destination chain before the retry"
                        );
                        metrics::record_unconfirmed_payout();
                    }
                    metrics::record_payout(failure.kind());
                    advance_to = cursor;
                    failed = true;
                    break;
                }
            }
        }

        if advance_to > self.state.cursor {
            self.state.cursor = advance_to;
        }

        if let Err(e) = self.store.save(&self.state) {
            error!(
                path = %self.store.path().display(),
                error = %e,
                "Failed to persist relay state, will retry next cycle"
            );
            metrics::record_persist_failure();
        }

        let outcome = if failed {
            CycleOutcome::PayoutFailed { paid, skipped }
        } else {
            CycleOutcome::Completed { paid, skipped }
        };
        self.finish(outcome).await
    }

    /// Update failure streak, metrics and shared status.
    async fn finish(&mut self, outcome: CycleOutcome) -> CycleOutcome {
        if outcome.is_failure() {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        } else {
            self.consecutive_failures = 0;
        }

        metrics::record_cycle(outcome.label());
        metrics::set_progress(
            self.state.cursor,
            self.state.processed.len(),
            self.consecutive_failures,
        );

        let paid = match outcome {
            CycleOutcome::Completed { paid, .. } | CycleOutcome::PayoutFailed { paid, .. } => paid,
            CycleOutcome::ScanFailed => 0,
        };

        let mut status = self.status.write().await;
        status.cursor = self.state.cursor;
        status.processed = self.state.processed.len();
        status.consecutive_failures = self.consecutive_failures;
        status.paid_total += paid as u64;
        status.last_outcome = Some(outcome.label().to_string());
        status.last_cycle_at = Some(Utc::now());

        outcome
    }

    /// Alternate cycles and sleeps until `shutdown` fires.
    ///
    /// Shutdown is only observed between cycles, so a payout is never
    /// abandoned between submission and receipt.
    pub async fn run(&mut self, mut shutdown: mpsc::Receiver<()>) {
        info!(
            cursor = self.state.cursor,
            processed = self.state.processed.len(),
            poll_interval_secs = self.policy.poll_interval.as_secs(),
            "Relay loop starting"
        );

        loop {
            let outcome = self.run_cycle().await;
            let delay = self.next_delay();
            debug!(
                outcome = outcome.label(),
                cursor = self.state.cursor,
                delay_secs = delay.as_secs(),
                "Cycle finished"
            );

            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!(cursor = self.state.cursor, "Relay loop stopped");
    }
}
