//! Post-restore verification
//!
//! Reads a restored node only through `RestoredNode`: its replica-set
//! config, minValid, last stable recovery timestamp and snapshot reads.

mod errors;
mod fingerprint;
mod node;
mod verifier;

pub use errors::{VerifyError, VerifyErrorCode, VerifyResult};
pub use fingerprint::{DataFingerprint, NamespaceDigest};
pub use node::RestoredNode;
pub use verifier::{CheckOutcome, Expectations, RestoreVerifier, VerifyReport};
