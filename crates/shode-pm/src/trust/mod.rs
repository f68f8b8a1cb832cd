//! Signer trust and artifact verification
//!
//! [`TrustStore`] keeps the durable set of trusted signers. The verification
//! helpers check detached signatures over package archives against it.

pub mod signature;
pub mod store;
pub mod verify;

pub use signature::{
    checksum, decode_public_key, encode_public_key, sign_detached, verify_signature,
    SignatureAlgorithm, SignatureError,
};
pub use store::{TrustError, TrustStore, TrustedSigner};
pub use verify::{verify_artifact, ArtifactClaim, ArtifactVerifier, VerifiedArtifact, VerifyError};
