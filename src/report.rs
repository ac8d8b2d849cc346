/*
 *  report.rs
 *
 *  Vitrine - pictures while you're looking
 *  (c) 2024-26 the Vitrine authors
 *
 *  Fault reporting seam between the scheduling engine and the external
 *  crash/error reporting subsystem
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use crate::config::Mode;
use crate::scheduler::Snapshot;
use log::error;
use std::sync::Mutex;

/// Context attached to an unexpected engine error. The tick that produced it
/// is skipped; the session keeps running.
pub struct Fault<'a> {
    pub phase: &'static str,
    pub mode: Mode,
    pub snapshot: Option<&'a Snapshot>,
    pub error: String,
}

/// Where faults go. Injected into the scheduler so there is no process-wide
/// singleton; one sink per session.
pub trait FaultSink: Send + Sync {
    fn report(&self, fault: &Fault<'_>);
}

/// Default sink: a structured log line the external log collector picks up.
pub struct LogSink;

impl FaultSink for LogSink {
    fn report(&self, fault: &Fault<'_>) {
        match fault.snapshot {
            Some(snapshot) => error!(
                "fault in {} (mode {}): {} [{:?}]",
                fault.phase, fault.mode, fault.error, snapshot
            ),
            None => error!("fault in {} (mode {}): {}", fault.phase, fault.mode, fault.error),
        }
    }
}

/// Collects faults in memory; used by tests.
#[derive(Default)]
pub struct CollectingSink {
    faults: Mutex<Vec<String>>,
}

impl CollectingSink {
    pub fn drain(&self) -> Vec<String> {
        let mut faults = self
            .faults
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::take(&mut *faults)
    }
}

impl FaultSink for CollectingSink {
    fn report(&self, fault: &Fault<'_>) {
        self.faults
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(format!("{}: {}", fault.phase, fault.error));
    }
}
