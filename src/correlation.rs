//! Correlation state machine (spec §4.3): NORMAL → WARNING → CRITICAL →
//! EMERGENCY with cycle-based hysteresis, a sustained-CRITICAL countdown
//! to EMERGENCY, and a latched EMERGENCY state with the auto-recovery
//! variant the spec selects as default (spec §9 open question).
//!
//! Grounded in shape on the teacher's `Controller::handle_packet`: a
//! small piece of mutable state advanced exactly once per cycle from one
//! input value, with every side effect (here: the latch, the countdowns)
//! owned by the same struct instead of scattered globals — the same
//! "own your own state, mutate it once per call" discipline the teacher
//! applies to its actuator state.

use log::info;
use serde::{Deserialize, Serialize};

use crate::model::AnomalyResult;

/// Wall-clock hold window before a sustained two-category CRITICAL
/// escalates to EMERGENCY.
const CRITICAL_HOLD_MS: u64 = 10_000;
/// Wall-clock hold window of nominal input before de-escalating one level.
const DEESCALATION_HOLD_MS: u64 = 5_000;
/// Wall-clock hold window of nominal input before an auto-recovery clears
/// the EMERGENCY latch.
const RECOVERY_HOLD_MS: u64 = 5_000;

/// The four correlation states (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum CorrelationStateKind {
    Normal = 0,
    Warning = 1,
    Critical = 2,
    Emergency = 3,
}

impl CorrelationStateKind {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Correlation machine state, owned exclusively by the scheduler and
/// mutated only by the medium loop and the fast-loop emergency path
/// (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrelationState {
    pub current_state: CorrelationStateKind,
    pub critical_countdown: u32,
    pub critical_countdown_limit: u32,
    pub deescalation_counter: u32,
    pub deescalation_limit: u32,
    pub emergency_recovery_counter: u32,
    pub emergency_recovery_limit: u32,
    pub emergency_latched: bool,
}

impl CorrelationState {
    /// Creates a fresh machine at NORMAL, unlatched, with counter limits
    /// synced to `medium_period_ms`.
    pub fn new(medium_period_ms: u64) -> Self {
        let mut s = Self {
            current_state: CorrelationStateKind::Normal,
            critical_countdown: 0,
            critical_countdown_limit: 1,
            deescalation_counter: 0,
            deescalation_limit: 1,
            emergency_recovery_counter: 0,
            emergency_recovery_limit: 1,
            emergency_latched: false,
        };
        s.sync_limits(medium_period_ms);
        s
    }

    /// Recomputes the three counter limits from the current medium-loop
    /// period so wall-clock hold windows stay stable when the scheduler
    /// accelerates into alert mode (spec §4.1, §9).
    pub fn sync_limits(&mut self, medium_period_ms: u64) {
        self.critical_countdown_limit = ceil_limit(CRITICAL_HOLD_MS, medium_period_ms);
        self.deescalation_limit = ceil_limit(DEESCALATION_HOLD_MS, medium_period_ms);
        self.emergency_recovery_limit = ceil_limit(RECOVERY_HOLD_MS, medium_period_ms);
    }

    /// Explicit reset (operator command or scenario restart): clears the
    /// latch and every counter, returns to NORMAL. Limits are untouched —
    /// call [`Self::sync_limits`] again if the period also changed.
    pub fn reset(&mut self) {
        self.current_state = CorrelationStateKind::Normal;
        self.critical_countdown = 0;
        self.deescalation_counter = 0;
        self.emergency_recovery_counter = 0;
        self.emergency_latched = false;
    }

    /// Advances the machine by exactly one cycle given the latest
    /// evaluation result (spec §4.3 transitions 1-5). Returns the new
    /// state; the caller (scheduler) is responsible for logging on change.
    pub fn update(&mut self, result: &AnomalyResult) -> CorrelationStateKind {
        let prev = self.current_state;

        if self.emergency_latched {
            self.current_state = CorrelationStateKind::Emergency;
            let nominal =
                result.active_count == 0 && !result.is_short_circuit && !result.is_emergency_direct;
            if nominal {
                self.emergency_recovery_counter += 1;
                if self.emergency_recovery_counter >= self.emergency_recovery_limit {
                    self.emergency_latched = false;
                    self.critical_countdown = 0;
                    self.deescalation_counter = 0;
                    self.emergency_recovery_counter = 0;
                    self.current_state = CorrelationStateKind::Normal;
                }
            } else {
                self.emergency_recovery_counter = 0;
            }
            log_on_change(prev, self.current_state);
            return self.current_state;
        }

        if result.is_short_circuit || result.is_emergency_direct || result.active_count >= 3 {
            self.current_state = CorrelationStateKind::Emergency;
            self.emergency_latched = true;
            log_on_change(prev, self.current_state);
            return self.current_state;
        }

        if result.active_count >= 2 {
            if prev != CorrelationStateKind::Critical {
                self.current_state = CorrelationStateKind::Critical;
                self.critical_countdown = 0;
            }
            self.critical_countdown += 1;
            self.deescalation_counter = 0;

            if self.critical_countdown >= self.critical_countdown_limit {
                self.current_state = CorrelationStateKind::Emergency;
                self.emergency_latched = true;
            }
            log_on_change(prev, self.current_state);
            return self.current_state;
        }

        if result.active_count == 1 {
            self.current_state = CorrelationStateKind::Warning;
            self.critical_countdown = 0;
            self.deescalation_counter = 0;
            log_on_change(prev, self.current_state);
            return self.current_state;
        }

        // active_count == 0
        if self.current_state != CorrelationStateKind::Normal {
            self.deescalation_counter += 1;
            if self.deescalation_counter >= self.deescalation_limit {
                self.current_state = CorrelationStateKind::Normal;
                self.deescalation_counter = 0;
            }
        }
        self.critical_countdown = 0;
        log_on_change(prev, self.current_state);
        self.current_state
    }
}

fn log_on_change(prev: CorrelationStateKind, next: CorrelationStateKind) {
    if prev != next {
        info!("correlation state transition: {:?} -> {:?}", prev, next);
    }
}

fn ceil_limit(window_ms: u64, period_ms: u64) -> u32 {
    let period = period_ms.max(1);
    let limit = window_ms.div_ceil(period);
    limit.clamp(1, 65535) as u32
}
