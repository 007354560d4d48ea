// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Expiry Sweeper
//!
//! Background task that expires Pending shares whose deadline has passed.
//! Local expiry timers do not survive a restart; this sweep is what makes
//! the deadline hold regardless.
//!
//! Every `interval` (default 30 s) the sweeper:
//! 1. Moves overdue Pending shares to Expired (the expiry listener then
//!    deletes their ciphertext and schedules a key GC).
//! 2. Purges expired OTP records from memory.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::TransferService;

/// Default interval between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

pub struct ExpirySweeper {
    service: Arc<TransferService>,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(service: Arc<TransferService>) -> Self {
        Self {
            service,
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(sweeper.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Expiry sweeper starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Expiry sweeper shutting down");
                return;
            }

            self.sweep_step();

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Expiry sweeper shutting down");
                    return;
                }
            }
        }
    }

    fn sweep_step(&self) {
        match self.service.sweep(Utc::now()) {
            Ok(report) if report.expired > 0 || report.otps_purged > 0 => {
                info!(
                    expired = report.expired,
                    otps_purged = report.otps_purged,
                    "Expiry sweeper: swept"
                );
            }
            Ok(_) => debug!("Expiry sweeper: nothing to do"),
            Err(e) => warn!(error = %e, "Expiry sweeper: sweep failed"),
        }
    }
}
