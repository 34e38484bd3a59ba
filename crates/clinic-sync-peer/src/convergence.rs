//! Convergence verification.
//!
//! After syncing, two devices can check they hold the same live documents
//! by comparing deterministic state digests.

use std::fmt;

use clinic_sync_store::Store;

use crate::error::Result;

/// Blake3 digest of a store's live documents.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateDigest(pub [u8; 32]);

impl StateDigest {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for StateDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateDigest({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for StateDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Compute a deterministic digest of every live document.
///
/// Algorithm:
/// 1. Walk tracked collections in name order
/// 2. Walk each collection's live documents in key order
/// 3. Hash: H = Blake3(domain || name || len || doc_json ...)
///
/// Versions and tombstones are not part of the digest; two devices that
/// reached the same documents by different histories still match.
pub async fn compute_state_digest<S: Store + ?Sized>(store: &S) -> Result<StateDigest> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"clinic-sync-state-v1:");

    let names: Vec<String> = store.schema().names().map(str::to_owned).collect();
    for name in names {
        let documents = store.list(&name).await?;
        hasher.update(name.as_bytes());
        hasher.update(&(documents.len() as u64).to_be_bytes());
        for document in documents {
            let json = document.to_json();
            hasher.update(&(json.len() as u64).to_be_bytes());
            hasher.update(json.as_bytes());
        }
    }

    Ok(StateDigest(*hasher.finalize().as_bytes()))
}

/// Result of convergence verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergenceResult {
    /// Both stores hold identical live documents.
    Converged,
    /// The stores differ (may need more sync rounds).
    NotConverged { reason: String },
}

impl ConvergenceResult {
    /// Check if the stores have converged.
    pub fn is_converged(&self) -> bool {
        matches!(self, ConvergenceResult::Converged)
    }
}

/// Compare two stores, naming the first differing collection.
pub async fn verify_convergence<A, B>(local: &A, remote: &B) -> Result<ConvergenceResult>
where
    A: Store + ?Sized,
    B: Store + ?Sized,
{
    let local_digest = compute_state_digest(local).await?;
    let remote_digest = compute_state_digest(remote).await?;
    if local_digest == remote_digest {
        return Ok(ConvergenceResult::Converged);
    }

    let mut names: Vec<String> = local.schema().names().map(str::to_owned).collect();
    names.extend(remote.schema().names().map(str::to_owned));
    names.sort();
    names.dedup();

    for name in names {
        let ours = local.list(&name).await?;
        let theirs = remote.list(&name).await?;
        if ours != theirs {
            return Ok(ConvergenceResult::NotConverged {
                reason: format!(
                    "{} differs: local has {} documents, remote has {}",
                    name,
                    ours.len(),
                    theirs.len()
                ),
            });
        }
    }

    Ok(ConvergenceResult::NotConverged {
        reason: "state digest mismatch".into(),
    })
}
