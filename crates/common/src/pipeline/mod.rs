//! The two directions of the document data flow
//!
//! - [`Registrar`]: hash → sign → seal → store → ledger → registry
//! - [`VerificationPipeline`]: fetch → open → hash check → signature check →
//!   registry consistency → [`Verdict`]
//!
//! [`WorkerPool`] bounds how many of either run at once.

mod pool;
mod register;
mod verify;

pub use pool::{PoolError, WorkerPool};
pub use register::{Registrar, RegistrarError, Registration, RegistrationOptions, Signer};
pub use verify::{
    FailureReason, Provenance, SignatureCheck, Stage, VerificationFailure, VerificationPipeline,
    VerificationRequest, Verdict,
};
