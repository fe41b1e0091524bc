/**
 * Error categories shared by every component.
 *  Each module keeps its own error enum and
 *  maps it onto a category for reporting.
 */
pub mod error;
/**
 * Cryptographic types and operations.
 *  - SHA3-256 document fingerprints
 *  - Pluggable post-quantum signature schemes
 *  - Hybrid envelope encryption
 */
pub mod crypto;
/**
 * Content-addressed storage backends.
 *  An IPFS HTTP client, a local directory
 *  store and an in-memory store for tests.
 */
pub mod storage;
/**
 * Append-only, hash-chained ledger of
 *  registration and verification claims.
 */
pub mod ledger;
/**
 * Persistent fingerprint → locator map.
 */
pub mod registry;
/**
 * Registration and verification pipelines
 *  and the worker pool that bounds them.
 */
pub mod pipeline;
/**
 * In-memory fixtures for exercising the
 *  pipelines end to end.
 */
pub mod testkit;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;

pub mod prelude {
    pub use crate::build_info;
    pub use crate::crypto::{
        default_scheme, hash, require_scheme, Fingerprint, PrivateKey, PublicKey, Signature,
        SignatureScheme, SignerId,
    };
    pub use crate::error::{Categorize, ErrorKind};
    pub use crate::ledger::{Ledger, LedgerReference};
    pub use crate::pipeline::{
        Registrar, SignatureCheck, Verdict, VerificationPipeline, VerificationRequest, WorkerPool,
    };
    pub use crate::registry::{DocumentRegistry, RegistryEntry};
    pub use crate::storage::{ContentStore, Locator};
    pub use crate::version::BuildInfo;
}
