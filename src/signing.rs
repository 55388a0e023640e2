//! Ed25519 key handling and descriptor signing.
//!
//! Keys live in two raw binary files: a 32-byte private seed and a 32-byte
//! public key. The loader enforces the exact length. A stored public key
//! that does not match the one derived from the seed is reported as a
//! warning; the stored key stays authoritative for verification, so such a
//! package will fail to verify later rather than silently pass.

use std::path::Path;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

use crate::consts::{KEY_SIZE, SIGNATURE_SIZE};
use crate::error::Error;
use crate::value::Diagnostics;

/// The key pair used to sign package descriptors.
#[derive(Debug, Clone)]
pub struct SigningKeys {
    signing: SigningKey,
    verifying: VerifyingKey,
}

impl SigningKeys {
    /// Loads a raw seed and public key from two binary files.
    pub fn load(
        private_path: &Path,
        public_path: &Path,
        diag: &mut Diagnostics,
    ) -> Result<Self, Error> {
        let seed = read_key_file(private_path)?;
        let public = read_key_file(public_path)?;

        let signing = SigningKey::from_bytes(&seed);
        let verifying = VerifyingKey::from_bytes(&public)
            .map_err(|_| Error::InvalidKey(public_path.display().to_string()))?;

        if signing.verifying_key() != verifying {
            diag.warn(format!(
                "public key {} does not match the private key; the stored public key is used",
                public_path.display()
            ));
        }

        Ok(SigningKeys { signing, verifying })
    }

    /// Creates a key pair from a raw seed, deriving the public key.
    pub fn from_seed(seed: [u8; KEY_SIZE]) -> Self {
        let signing = SigningKey::from_bytes(&seed);
        let verifying = signing.verifying_key();

        SigningKeys { signing, verifying }
    }

    /// The public key packages signed with this pair verify against.
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying
    }

    /// Produces the detached signature over a descriptor payload.
    pub fn sign(&self, descriptor: &[u8]) -> [u8; SIGNATURE_SIZE] {
        self.signing.sign(descriptor).to_bytes()
    }
}

/// Loads a raw 32-byte Ed25519 public key from a binary file.
pub fn load_verifying_key(path: &Path) -> Result<VerifyingKey, Error> {
    let bytes = read_key_file(path)?;

    VerifyingKey::from_bytes(&bytes).map_err(|_| Error::InvalidKey(path.display().to_string()))
}

/// Checks a detached signature over a descriptor payload.
pub(crate) fn verify_signature(
    key: &VerifyingKey,
    descriptor: &[u8],
    signature: &[u8],
) -> Result<(), Error> {
    let signature = Signature::from_slice(signature).map_err(|_| Error::InvalidSignature)?;

    key.verify(descriptor, &signature)
        .map_err(|_| Error::InvalidSignature)
}

fn read_key_file(path: &Path) -> Result<[u8; KEY_SIZE], Error> {
    let bytes = std::fs::read(path)?;
    if bytes.len() != KEY_SIZE {
        return Err(Error::InvalidKeyLength {
            path: path.display().to_string(),
            expected: KEY_SIZE,
            actual: bytes.len(),
        });
    }

    Ok(bytes.try_into().unwrap())
}
