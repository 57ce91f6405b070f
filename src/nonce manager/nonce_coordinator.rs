//! Signing coordinator: one key, one nonce counter, one cycle at a time
//!
//! The nonce mutex is held across the whole build-sign-submit cycle so the
//! builder may perform I/O (gas estimation, price lookup) without another
//! cycle observing the same nonce. The counter only advances once the
//! submission succeeds. Cycles run on a detached task and finish even when
//! the caller is dropped.
use alloy::consensus::TxLegacy;
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{oneshot, watch, Mutex};
use tracing::{debug, error, info, instrument, warn};

use super::nonce_errors::{SigningError, SigningResult};
use super::nonce_refresh::NonceSource;
use super::nonce_signer::{dummy_signer, load_keystore, sign_legacy, KeyCredentials, SignedTransaction};
use crate::metrics::{metrics, Timer};

/// Key readiness, published once by the loader
#[derive(Clone)]
pub enum KeyState {
    Pending,
    Ready(Arc<PrivateKeySigner>),
    Failed(String),
}

impl std::fmt::Debug for KeyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyState::Pending => write!(f, "Pending"),
            KeyState::Ready(signer) => write!(f, "Ready({})", signer.address()),
            KeyState::Failed(e) => write!(f, "Failed({})", e),
        }
    }
}

#[derive(Debug)]
struct NonceState {
    next: u64,
    needs_resync: bool,
}

pub struct SigningCoordinator {
    key: watch::Receiver<KeyState>,
    nonce: Mutex<NonceState>,
    chain_id: u64,
    source: Option<Arc<dyn NonceSource>>,
}

impl std::fmt::Debug for SigningCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningCoordinator")
            .field("key", &*self.key.borrow())
            .field("chain_id", &self.chain_id)
            .field("has_nonce_source", &self.source.is_some())
            .finish()
    }
}

impl SigningCoordinator {
    /// Create a coordinator whose key arrives later through `credentials`.
    ///
    /// Returns immediately; decryption starts once the credentials are sent.
    /// Every signing call waits until the key is ready.
    pub fn new(
        credentials: oneshot::Receiver<KeyCredentials>,
        chain_id: u64,
        source: Option<Arc<dyn NonceSource>>,
    ) -> Arc<Self> {
        let (tx, rx) = watch::channel(KeyState::Pending);

        tokio::spawn(async move {
            let state = match credentials.await {
                Ok(credentials) => {
                    debug!(path = %credentials.path().display(), "Key credentials received");
                    match load_keystore(credentials).await {
                        Ok(signer) => {
                            info!(address = %signer.address(), "Signing key loaded");
                            KeyState::Ready(Arc::new(signer))
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to load signing key");
                            KeyState::Failed(e.to_string())
                        }
                    }
                }
                Err(_) => {
                    error!("Key credential channel closed before credentials arrived");
                    KeyState::Failed("credentials were never provided".to_string())
                }
            };
            let _ = tx.send(state);
        });

        Self::build(rx, chain_id, source)
    }

    /// Load the key and wait until the coordinator is ready
    pub async fn from_credentials(
        credentials: KeyCredentials,
        chain_id: u64,
        source: Option<Arc<dyn NonceSource>>,
    ) -> SigningResult<Arc<Self>> {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(credentials);
        let coordinator = Self::new(rx, chain_id, source);
        coordinator.signer().await?;
        Ok(coordinator)
    }

    /// Coordinator for an already-decrypted key
    pub fn with_signer(
        signer: PrivateKeySigner,
        chain_id: u64,
        source: Option<Arc<dyn NonceSource>>,
    ) -> Arc<Self> {
        let (_tx, rx) = watch::channel(KeyState::Ready(Arc::new(signer)));
        Self::build(rx, chain_id, source)
    }

    /// Coordinator holding the fixed dummy key, with no nonce source.
    /// Test support only.
    pub fn dummy(chain_id: u64) -> SigningResult<Arc<Self>> {
        Ok(Self::with_signer(dummy_signer()?, chain_id, None))
    }

    fn build(
        key: watch::Receiver<KeyState>,
        chain_id: u64,
        source: Option<Arc<dyn NonceSource>>,
    ) -> Arc<Self> {
        let needs_resync = source.is_some();
        Arc::new(Self {
            key,
            nonce: Mutex::new(NonceState {
                next: 0,
                needs_resync,
            }),
            chain_id,
            source,
        })
    }

    async fn signer(&self) -> SigningResult<Arc<PrivateKeySigner>> {
        let mut key = self.key.clone();
        let state = key
            .wait_for(|state| !matches!(state, KeyState::Pending))
            .await
            .map_err(|_| SigningError::KeyUnavailable("key loader stopped".to_string()))?;

        match &*state {
            KeyState::Ready(signer) => Ok(signer.clone()),
            KeyState::Failed(e) => Err(SigningError::KeyUnavailable(e.clone())),
            KeyState::Pending => Err(SigningError::KeyUnavailable("key not loaded".to_string())),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.key.borrow(), KeyState::Ready(_))
    }

    /// Signing address. Waits for the key like every signing call.
    pub async fn address(&self) -> SigningResult<Address> {
        Ok(self.signer().await?.address())
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Next nonce to be assigned. Waits for any in-flight cycle.
    pub async fn next_nonce(&self) -> u64 {
        self.nonce.lock().await.next
    }

    /// Adopt `max(local, chain)` as the next nonce
    pub async fn resync(&self) -> SigningResult<u64> {
        let mut state = self.nonce.lock().await;
        self.resync_locked(&mut state).await
    }

    async fn resync_locked(&self, state: &mut NonceState) -> SigningResult<u64> {
        let Some(source) = &self.source else {
            state.needs_resync = false;
            return Ok(state.next);
        };

        let address = self.address().await?;
        let chain = source.transaction_count(address).await?;
        let adopted = state.next.max(chain);
        if adopted != state.next {
            info!(local = state.next, chain, "Nonce counter behind chain, adopting chain count");
        }

        state.next = adopted;
        state.needs_resync = false;
        metrics().nonce_resyncs.inc();
        Ok(adopted)
    }

    /// Run one nonce-consuming cycle.
    ///
    /// `build` receives the reserved nonce and returns the unsigned
    /// transaction; the coordinator pins its nonce and chain id, signs it and
    /// hands the result to `submit`. The nonce advances only when `submit`
    /// succeeds. A drift rejection schedules a resync before the next cycle.
    pub async fn sign_with_nonce<B, BF, S, SF, T>(self: &Arc<Self>, build: B, submit: S) -> SigningResult<T>
    where
        B: FnOnce(u64) -> BF + Send + 'static,
        BF: Future<Output = SigningResult<TxLegacy>> + Send + 'static,
        S: FnOnce(SignedTransaction) -> SF + Send + 'static,
        SF: Future<Output = SigningResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move { coordinator.run_cycle(build, submit).await })
            .await
            .map_err(|e| SigningError::Aborted(e.to_string()))?
    }

    #[instrument(skip_all, fields(chain_id = self.chain_id))]
    async fn run_cycle<B, BF, S, SF, T>(&self, build: B, submit: S) -> SigningResult<T>
    where
        B: FnOnce(u64) -> BF,
        BF: Future<Output = SigningResult<TxLegacy>>,
        S: FnOnce(SignedTransaction) -> SF,
        SF: Future<Output = SigningResult<T>>,
    {
        let signer = self.signer().await?;
        let mut state = self.nonce.lock().await;
        let timer = Timer::new();

        if state.needs_resync {
            self.resync_locked(&mut state).await?;
        }

        let nonce = state.next;
        let result = async {
            let mut tx = build(nonce).await?;
            tx.nonce = nonce;
            tx.chain_id = Some(self.chain_id);
            let signed = sign_legacy(&signer, tx)?;
            submit(signed).await
        }
        .await;

        timer.observe_duration(&metrics().signing_cycle_latency);

        match &result {
            Ok(_) => {
                state.next = nonce + 1;
                metrics().signing_success.inc();
                debug!(nonce, "Signing cycle complete, nonce advanced");
            }
            Err(e) => {
                metrics().signing_failures.inc();
                if e.is_nonce_drift() {
                    state.needs_resync = true;
                    warn!(nonce, error = %e, "Nonce rejected by node, resync scheduled");
                } else {
                    warn!(nonce, error = %e, "Signing cycle failed, nonce not advanced");
                }
            }
        }

        result
    }
}
