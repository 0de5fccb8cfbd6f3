//! Inputs delivered to the main loop.

use crate::provisioning::{CredentialSubmission, SubmissionOutcome};
use std::sync::mpsc;

/// One input for [`Supervisor::handle`](crate::Supervisor::handle).
///
/// Sources running outside the main loop (blink timer, portal thread, serial
/// reader) only ever post events; the supervisor is the single writer of the
/// run mode and the record.
#[derive(Debug)]
pub enum Event {
    /// A byte from the serial console.
    SerialByte(u8),
    /// The button level changed.
    Button { pressed: bool },
    /// Blink timer fired for the given schedule generation.
    BlinkTick(u64),
    /// A companion device reached the config portal.
    ApClientConnected,
    /// Credentials submitted through the config portal.
    ApCredentials {
        submission: CredentialSubmission,
        /// Where to send the outcome, if the submitter is waiting for one.
        reply: Option<mpsc::Sender<SubmissionOutcome>>,
    },
    /// Project code took over (or released) the LED.
    ProjectOverride(bool),
}
