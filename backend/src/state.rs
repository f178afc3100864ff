use crate::db::{self, Db};
use crate::errors::ApiError;
use ark_bn254::{Bn254, Fr};
use ark_groth16::{ProvingKey, VerifyingKey};
use rand::rngs::OsRng;
use shielded_pool::groth16::{
    deserialize_pk, deserialize_vk, serialize_pk, serialize_vk, setup_hash2_keys, Groth16Verifier, ZkError,
};
use shielded_pool::{
    Address, Envelope, InMemoryLedger, Pool, PoolConfig, PoolError, PoolEvent, ProofVerifier, VerifierFamily,
    VerifierSet,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// The hosted pool and the token ledger it settles against.
pub struct Node {
    pub pool: Pool,
    pub ledger: InMemoryLedger,
    persisted_events: usize,
}

impl Node {
    fn new(pool: Pool) -> Self {
        Self {
            pool,
            ledger: InMemoryLedger::new(),
            persisted_events: 0,
        }
    }

    /// Events and envelopes not yet persisted. Nothing is consumed.
    fn unpersisted(&self) -> (Vec<(u64, PoolEvent)>, Vec<Envelope>) {
        let events = self.pool.events()[self.persisted_events..]
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, e)| ((self.persisted_events + i) as u64, e))
            .collect();
        (events, self.pool.outbox().to_vec())
    }

    fn mark_persisted(&mut self, events: usize) {
        self.persisted_events += events;
        self.pool.drain_outbox();
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub data_dir: PathBuf,
    pub address: Address,
    /// Serialises every call into the pool; this is the platform's sequencer.
    node: Arc<Mutex<Node>>,
}

impl AppState {
    pub async fn bootstrap(db: Db, data_dir: PathBuf, config: PoolConfig) -> Result<Self, ApiError> {
        let verifiers = load_verifiers(&data_dir).await?;
        let pool = Pool::deploy(config, verifiers).map_err(|e| {
            tracing::error!(error = %e, "pool deployment failed");
            ApiError::Internal
        })?;
        let address = pool.address();

        // Pool state lives in memory; rows from a previous process no longer match it.
        db::reset_pool(&db, &address).await?;

        Ok(Self {
            db,
            data_dir,
            address,
            node: Arc::new(Mutex::new(Node::new(pool))),
        })
    }

    /// Read-only access to the node.
    pub async fn read<T>(&self, f: impl FnOnce(&Node) -> T) -> T {
        let node = self.node.lock().await;
        f(&*node)
    }

    /// Run one state-changing call, then persist whatever it emitted.
    pub async fn sequenced<T>(&self, f: impl FnOnce(&mut Node) -> Result<T, PoolError>) -> Result<T, ApiError> {
        let mut node = self.node.lock().await;
        let result = f(&mut *node);

        // Inserts are idempotent, so whatever fails here is retried by the next call.
        let (events, envelopes) = node.unpersisted();
        let persisted = async {
            db::append_events(&self.db, &self.address, &events).await?;
            db::enqueue_envelopes(&self.db, &self.address, &envelopes).await
        }
        .await;
        if let Err(e) = persisted {
            tracing::error!(events = events.len(), envelopes = envelopes.len(), "persisting pool output failed");
            return Err(e);
        }
        node.mark_persisted(events.len());

        Ok(result?)
    }

    pub fn vk_path(&self, family: VerifierFamily) -> PathBuf {
        vk_path(&self.data_dir, family)
    }
}

fn vk_path(data_dir: &Path, family: VerifierFamily) -> PathBuf {
    data_dir.join("keys").join(format!("{}_vk.bin", family.as_str()))
}

/// Stands in for a family whose verifying key has not been installed. Rejects everything.
struct Unconfigured;

impl ProofVerifier for Unconfigured {
    fn id(&self) -> Address {
        Address::ZERO
    }

    fn verify(&self, _proof: &[u8], _public_inputs: &[Fr]) -> Result<bool, ZkError> {
        Ok(false)
    }
}

/// Build the verifier set from `keys/<family>_vk.bin`.
///
/// The Hash2 keys are produced here on first run (prototype trusted setup); the other
/// families come from their own ceremonies and are only loaded.
async fn load_verifiers(data_dir: &Path) -> Result<VerifierSet, ApiError> {
    let data_dir = data_dir.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let keys_dir = data_dir.join("keys");
        std::fs::create_dir_all(&keys_dir).map_err(|_| ApiError::Internal)?;

        let (_pk, hash2_vk) = ensure_hash2_keys(&keys_dir)?;
        let hash2: Arc<dyn ProofVerifier> =
            Arc::new(Groth16Verifier::new(&hash2_vk).map_err(|_| ApiError::Internal)?);

        let load = |family: VerifierFamily| -> Result<Arc<dyn ProofVerifier>, ApiError> {
            let path = vk_path(&data_dir, family);
            if !path.exists() {
                tracing::warn!(%family, path = %path.display(), "no verifying key installed, family rejects all proofs");
                return Ok(Arc::new(Unconfigured));
            }
            let bytes = std::fs::read(&path).map_err(|_| ApiError::Internal)?;
            let verifier = Groth16Verifier::from_vk_bytes(&bytes).map_err(|e| {
                tracing::error!(%family, error = %e, "invalid verifying key");
                ApiError::Internal
            })?;
            Ok(Arc::new(verifier))
        };

        Ok::<VerifierSet, ApiError>(VerifierSet {
            split_join: load(VerifierFamily::SplitJoin)?,
            hash2,
            note: load(VerifierFamily::Note)?,
            input: load(VerifierFamily::Input)?,
        })
    })
    .await
    .map_err(|_| ApiError::Internal)?
}

/// Load the Hash2 Groth16 keys, running the setup when absent.
fn ensure_hash2_keys(keys_dir: &Path) -> Result<(ProvingKey<Bn254>, VerifyingKey<Bn254>), ApiError> {
    let pk_path = keys_dir.join("hash2_pk.bin");
    let vk_path = keys_dir.join("hash2_vk.bin");

    if pk_path.exists() && vk_path.exists() {
        let pk_bytes = std::fs::read(&pk_path).map_err(|_| ApiError::Internal)?;
        let vk_bytes = std::fs::read(&vk_path).map_err(|_| ApiError::Internal)?;

        let pk = deserialize_pk(&pk_bytes).map_err(|_| ApiError::Internal)?;
        let vk = deserialize_vk(&vk_bytes).map_err(|_| ApiError::Internal)?;

        return Ok((pk, vk));
    }

    // Trusted setup randomness (prototype).
    //
    // IMPORTANT: In production, use an MPC ceremony.
    let mut rng = OsRng;
    let (pk, vk) = setup_hash2_keys(&mut rng).map_err(|_| ApiError::Internal)?;

    std::fs::write(&pk_path, serialize_pk(&pk).map_err(|_| ApiError::Internal)?).map_err(|_| ApiError::Internal)?;
    std::fs::write(&vk_path, serialize_vk(&vk).map_err(|_| ApiError::Internal)?).map_err(|_| ApiError::Internal)?;
    tracing::info!(path = %keys_dir.display(), "generated hash2 groth16 keys");

    Ok((pk, vk))
}
