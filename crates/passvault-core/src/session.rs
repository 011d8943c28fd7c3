//! Session lifecycle: unlock, inactivity auto-lock and clipboard auto-clear.
//!
//! State machine:
//!
//! ```text
//! LockedInitial -> Authenticating -> Unlocked -> Locked -> Authenticating -> ...
//!                                            \-> Terminated
//! ```
//!
//! Timers are deadlines checked against the injected [`Clock`] on every call
//! to [`SessionController::poll`], which every vault operation runs first via
//! [`SessionController::ensure_unlocked`]. A lock therefore always completes
//! (clipboard wiped) before an operation can decrypt anything.
//!
//! [`Clock`]: crate::clock::Clock

use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audit::{AuditEvent, AuditTrail, LockReason};
use crate::clipboard::ClipboardBackend;
use crate::clock::SharedClock;
use crate::error::{VaultError, VaultResult};
use crate::master::MasterPasswordGuard;
use crate::models::VaultConfig;

/// Where the session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Never unlocked in this process
    LockedInitial,
    /// A password attempt is being evaluated
    Authenticating,
    Unlocked,
    /// Locked after having been unlocked; re-authentication required
    Locked,
    /// Ended for good
    Terminated,
}

/// Something a timer did on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Locked(LockReason),
    ClipboardCleared,
}

/// Owns the unlocked/locked state, the activity clock and the clipboard
pub struct SessionController {
    state: SessionState,
    last_activity: Option<Instant>,
    inactivity_timeout: Duration,
    clipboard_delay: Duration,
    clock: SharedClock,
    clipboard: Box<dyn ClipboardBackend>,
    clipboard_deadline: Option<Instant>,
    audit: AuditTrail,
}

impl SessionController {
    pub fn new(
        config: &VaultConfig,
        clock: SharedClock,
        clipboard: Box<dyn ClipboardBackend>,
    ) -> Self {
        Self {
            state: SessionState::LockedInitial,
            last_activity: None,
            inactivity_timeout: config.auto_lock_timeout(),
            clipboard_delay: config.clipboard_clear_delay(),
            clock,
            clipboard,
            clipboard_deadline: None,
            audit: AuditTrail::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_unlocked(&self) -> bool {
        self.state == SessionState::Unlocked
    }

    pub fn audit_trail(&self) -> &AuditTrail {
        &self.audit
    }

    /// Authenticate with the master password and enter `Unlocked`.
    ///
    /// On failure the session returns to the locked state it came from.
    /// Re-authenticating an unlocked session locks it first, wiping any
    /// pending clipboard copy.
    pub fn unlock(&mut self, guard: &mut MasterPasswordGuard, password: &str) -> VaultResult<()> {
        self.poll();
        match self.state {
            SessionState::Terminated => return Err(VaultError::SessionLocked),
            SessionState::Unlocked => {
                self.lock(LockReason::Manual);
            }
            _ => {}
        }
        let previous = match self.state {
            SessionState::Authenticating => SessionState::Locked,
            other => other,
        };

        self.state = SessionState::Authenticating;
        match guard.authenticate(password) {
            Ok(()) => {
                self.state = SessionState::Unlocked;
                self.last_activity = Some(self.clock.now());
                self.audit.record(AuditEvent::VaultUnlocked);
                info!("Session unlocked");
                Ok(())
            }
            Err(e) => {
                self.state = previous;
                self.last_activity = None;
                self.audit.record(AuditEvent::UnlockFailed {
                    attempt_count: guard.failed_attempts(),
                });
                Err(e.into())
            }
        }
    }

    /// Lock now. The clipboard is wiped immediately if a copy is pending.
    pub fn lock(&mut self, reason: LockReason) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if self.state == SessionState::Terminated {
            return events;
        }

        if self.clipboard_deadline.is_some() {
            self.clear_clipboard();
            events.push(SessionEvent::ClipboardCleared);
        }

        let was_unlocked = self.is_unlocked();
        self.last_activity = None;
        self.state = if reason == LockReason::Terminated {
            SessionState::Terminated
        } else if was_unlocked {
            SessionState::Locked
        } else {
            self.state
        };

        if was_unlocked || reason == LockReason::Terminated {
            self.audit.record(AuditEvent::VaultLocked { reason });
            info!(?reason, "Session locked");
            events.push(SessionEvent::Locked(reason));
        }
        events
    }

    /// End the session for good; nothing can be unlocked afterwards
    pub fn terminate(&mut self) -> Vec<SessionEvent> {
        self.lock(LockReason::Terminated)
    }

    /// Record user activity, pushing the inactivity deadline back
    pub fn touch(&mut self) {
        if self.is_unlocked() {
            self.last_activity = Some(self.clock.now());
        }
    }

    /// Fire any timers whose deadline has passed
    pub fn poll(&mut self) -> Vec<SessionEvent> {
        let now = self.clock.now();
        let mut events = Vec::new();

        if let (SessionState::Unlocked, Some(last)) = (self.state, self.last_activity) {
            if now.saturating_duration_since(last) >= self.inactivity_timeout {
                debug!("Inactivity timeout reached");
                events.extend(self.lock(LockReason::Timeout));
            }
        }

        if matches!(self.clipboard_deadline, Some(deadline) if now >= deadline) {
            self.clear_clipboard();
            events.push(SessionEvent::ClipboardCleared);
        }

        events
    }

    /// Poll timers, then fail with `SessionLocked` unless unlocked
    pub fn ensure_unlocked(&mut self) -> VaultResult<()> {
        self.poll();
        if self.is_unlocked() {
            Ok(())
        } else {
            Err(VaultError::SessionLocked)
        }
    }

    /// Put `secret` on the clipboard and schedule its removal.
    ///
    /// A newer copy replaces the pending clear of an older one.
    pub fn copy_secret_to_clipboard(&mut self, secret: &SecretString) -> VaultResult<()> {
        self.ensure_unlocked()?;

        self.clipboard.set_text(secret.expose_secret())?;
        self.clipboard_deadline = Some(self.clock.now() + self.clipboard_delay);
        self.audit.record(AuditEvent::SecretCopied);
        self.touch();
        Ok(())
    }

    /// Time left before the inactivity lock, if unlocked
    pub fn time_until_lock(&self) -> Option<Duration> {
        let last = self.last_activity.filter(|_| self.is_unlocked())?;
        let elapsed = self.clock.now().saturating_duration_since(last);
        Some(self.inactivity_timeout.saturating_sub(elapsed))
    }

    /// Time left before the clipboard is wiped, if a copy is pending
    pub fn clipboard_pending(&self) -> Option<Duration> {
        let deadline = self.clipboard_deadline?;
        Some(deadline.saturating_duration_since(self.clock.now()))
    }

    pub(crate) fn record(&mut self, event: AuditEvent) {
        self.audit.record(event);
    }

    fn clear_clipboard(&mut self) {
        self.clipboard_deadline = None;
        if let Err(e) = self.clipboard.clear() {
            warn!("Failed to clear clipboard: {}", e);
        }
        self.audit.record(AuditEvent::ClipboardCleared);
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if self.clipboard_deadline.is_some() {
            self.clear_clipboard();
        }
    }
}

/// Session shared between the foreground and the watchdog task
pub type SharedSession = Arc<Mutex<SessionController>>;

/// Spawn a task that polls the session every `period` and forwards timer
/// events. The task ends when the session terminates or the receiver is
/// dropped.
pub fn spawn_watchdog(
    session: SharedSession,
    period: Duration,
) -> (JoinHandle<()>, mpsc::UnboundedReceiver<SessionEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;

            let (events, state) = {
                let mut session = session.lock().await;
                (session.poll(), session.state())
            };

            for event in events {
                if tx.send(event).is_err() {
                    return;
                }
            }

            if state == SessionState::Terminated || tx.is_closed() {
                debug!("Session watchdog stopping");
                return;
            }
        }
    });

    (handle, rx)
}
