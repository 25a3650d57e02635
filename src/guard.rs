//! Tie a capture's active window to a lexical scope.

use std::ops::{Deref, DerefMut};

use tracing::error;

use crate::capture::CaptureController;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Activate,
    Deactivate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GuardState {
    Idle,
    RestoreOnDrop(Action),
}

/// Performs the inverse of its constructing action when dropped.
///
/// Built by [`scoped_activate`] or [`scoped_deactivate`]. The guard derefs to
/// its controller, so a suspension can be nested inside an active guard:
///
/// ```
/// use io_capture::{scoped_activate, scoped_deactivate, CaptureController, CaptureKind};
///
/// let mut controller = CaptureController::new(CaptureKind::Streams)?;
/// {
///     let mut capturing = scoped_activate(&mut controller)?;
///     {
///         let _console = scoped_deactivate(&mut capturing)?;
///         // output here reaches the real console
///     }
///     // captured again
/// }
/// assert!(!controller.is_active());
/// # Ok::<(), io_capture::CaptureError>(())
/// ```
///
/// If the restoring action fails on drop the guard panics rather than losing
/// the error; outside of unwinding, call [`finish`](Self::finish) to get it
/// as a `Result` instead.
///
/// A guard only undoes what still needs undoing: when an inner guard's
/// transition fails and leaves the controller inactive, an enclosing
/// `scoped_activate` guard has nothing left to deactivate.
#[derive(Debug)]
#[must_use = "dropping the guard immediately undoes what it just did"]
pub struct CaptureGuard<'a> {
    controller: &'a mut CaptureController,
    state: GuardState,
}

/// Activate `controller` now and deactivate it when the guard drops.
pub fn scoped_activate(controller: &mut CaptureController) -> Result<CaptureGuard<'_>> {
    controller.activate()?;
    Ok(CaptureGuard {
        controller,
        state: GuardState::RestoreOnDrop(Action::Deactivate),
    })
}

/// Deactivate `controller` now and reactivate it when the guard drops.
pub fn scoped_deactivate(controller: &mut CaptureController) -> Result<CaptureGuard<'_>> {
    controller.deactivate()?;
    Ok(CaptureGuard {
        controller,
        state: GuardState::RestoreOnDrop(Action::Activate),
    })
}

impl CaptureGuard<'_> {
    /// Run the pending action now, leaving nothing to do on drop.
    pub fn finish(mut self) -> Result<()> {
        self.run_pending()
    }

    /// Whether dropping the guard will still act on the controller.
    pub fn is_armed(&self) -> bool {
        self.state != GuardState::Idle
    }

    /// A failed transition always leaves the controller inactive, so an outer
    /// guard may find its work already done; it then does nothing.
    fn run_pending(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, GuardState::Idle) {
            GuardState::RestoreOnDrop(Action::Activate) if !self.controller.is_active() => {
                self.controller.activate()
            }
            GuardState::RestoreOnDrop(Action::Deactivate) if self.controller.is_active() => {
                self.controller.deactivate()
            }
            _ => Ok(()),
        }
    }
}

impl Deref for CaptureGuard<'_> {
    type Target = CaptureController;

    fn deref(&self) -> &CaptureController {
        &*self.controller
    }
}

impl DerefMut for CaptureGuard<'_> {
    fn deref_mut(&mut self) -> &mut CaptureController {
        &mut *self.controller
    }
}

impl Drop for CaptureGuard<'_> {
    fn drop(&mut self) {
        if let Err(error) = self.run_pending() {
            error!(%error, "capture guard failed to restore its controller");
            if !std::thread::panicking() {
                panic!("capture guard failed to restore its controller: {error}");
            }
        }
    }
}
