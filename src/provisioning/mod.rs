//! Provisioning sessions: serial console and access point.
//!
//! Both sessions are opened when the board enters config mode and closed when
//! it leaves. They only stage and validate credentials; persisting them and
//! changing the run mode is left to the [`Supervisor`](crate::Supervisor).

pub mod ap;
pub mod identity;
pub mod portal;
pub mod serial;

pub use ap::{AccessPoint, ApError, ApSession, CredentialSubmission, SubmissionOutcome};
pub use identity::{generate_identity, DeviceIdentity, SsidColor};
pub use portal::{BoardInfo, ConfigPortal, PortalAccessPoint};
pub use serial::{
    Console, SerialReply, SerialSession, SerialState, SessionRequest, StdoutConsole,
};
