use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use ghostpool_protocol::hash::TREE_DEPTH;
use ghostpool_protocol::{
    builder, Address, CommitmentLedger, NullifierRegistry, ProofVerifier,
    RedemptionCoordinator, SharedLedger, SharedNullifiers, StubVerifier, ZkProof,
    LEDGER_CAPACITY,
};

use crate::config::RelayerConfig;
use crate::error::{RelayerError, Result};
use crate::publisher::RootPublisher;
use crate::store::StateStore;

pub struct RelayerState {
    pub config: RelayerConfig,
    pub ledger: SharedLedger,
    pub nullifiers: SharedNullifiers,
    pub coordinator: RwLock<RedemptionCoordinator>,
    pub publisher: RootPublisher,
    pub store: StateStore,
}

impl RelayerState {
    pub fn new(config: RelayerConfig) -> anyhow::Result<Self> {
        let store = StateStore::new(config.state_path.clone());

        let mut ledger = CommitmentLedger::new(config.owner, config.relayer);
        ledger.authorize_inserter(config.owner, config.relayer)?;
        let mut nullifiers = NullifierRegistry::new(config.owner);
        nullifiers.authorize_spender(config.owner, config.relayer)?;

        if let Some((commitments, spent)) = store.load() {
            info!(
                "Restoring {} commitments and {} spent nullifiers from disk",
                commitments.len(),
                spent.len()
            );
            for commitment in commitments {
                ledger.insert(config.relayer, commitment)?;
            }
            for nullifier in spent {
                nullifiers.mark_spent(config.relayer, nullifier)?;
            }
            // Restore is not fresh activity.
            ledger.drain_events();
        }

        let ledger: SharedLedger = Arc::new(std::sync::RwLock::new(ledger));
        let nullifiers: SharedNullifiers = Arc::new(std::sync::RwLock::new(nullifiers));

        // The proving system is external; verdicts come from a stub until
        // one is wired in.
        let verifier: Arc<dyn ProofVerifier> = if config.accept_dev_proofs {
            warn!("PROOF_MODE=accept: proofs are NOT verified - development only");
            Arc::new(StubVerifier::accept_all())
        } else {
            Arc::new(StubVerifier::reject_all())
        };

        let mut coordinator = RedemptionCoordinator::new(
            config.relayer,
            config.owner,
            config.asset_id,
            ledger.clone(),
            nullifiers.clone(),
            verifier,
        );
        if config.initial_funding > 0 {
            coordinator.fund(config.owner, config.owner, config.initial_funding)?;
            info!("Funded owner with {} at startup", config.initial_funding);
        }

        let publisher = RootPublisher::new(ledger.clone(), config.relayer);
        // Bring the restored state's root on line before serving.
        publisher.publish()?;

        Ok(Self {
            config,
            ledger,
            nullifiers,
            coordinator: RwLock::new(coordinator),
            publisher,
            store,
        })
    }

    fn read_ledger(&self) -> Result<std::sync::RwLockReadGuard<'_, CommitmentLedger>> {
        self.ledger
            .read()
            .map_err(|_| RelayerError::Internal("ledger lock poisoned".into()))
    }

    fn read_nullifiers(&self) -> Result<std::sync::RwLockReadGuard<'_, NullifierRegistry>> {
        self.nullifiers
            .read()
            .map_err(|_| RelayerError::Internal("nullifier registry lock poisoned".into()))
    }

    fn persist(&self) -> Result<()> {
        let commitments = self.read_ledger()?.commitments(0, u64::MAX);
        let nullifiers = self.read_nullifiers()?.snapshot();
        self.store.save(&commitments, &nullifiers)
    }
}

pub async fn run(state: Arc<RelayerState>) -> anyhow::Result<()> {
    // 10 requests per second per IP
    let governor_conf = GovernorConfigBuilder::default()
        .per_second(10)
        .burst_size(20)
        .key_extractor(tower_governor::key_extractor::SmartIpKeyExtractor)
        .finish()
        .unwrap();

    let app = Router::new()
        // Health check (no auth, no state)
        .route("/health", get(health))
        // Service and pool status
        .route("/info", get(get_info))
        // Bridge stand-in: owner-gated balance minting
        .route("/fund", post(fund))
        // Convert balance into a hidden claim
        .route("/ghost", post(ghost))
        // Redemption surface (relayed on behalf of voucher holders)
        .route("/redeem", post(redeem))
        .route("/redeem/partial", post(redeem_partial))
        // Root and history reads
        .route("/root", get(get_root))
        .route("/roots/:index", get(get_historical_root))
        // Ledger replay interface
        .route("/commitments", get(get_commitments))
        .route("/commitment/:index", get(get_commitment))
        // Path material for provers
        .route("/path/:leaf_index", get(get_path))
        // Nullifier reads
        .route("/nullifier/:hash", get(get_nullifier))
        .route("/nullifiers/check", post(check_nullifiers))
        .layer(GovernorLayer {
            config: Arc::new(governor_conf),
        })
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state.clone());

    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        "Relayer listening on {} (rate limited: 10 req/s per IP)",
        addr
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;
    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct InfoResponse {
    asset_id: String,
    owner: String,
    relayer: String,
    root: String,
    commitment_count: u64,
    capacity: u64,
    tree_depth: usize,
    spent_nullifiers: u64,
    total_ghosted: u64,
    total_redeemed: u64,
    outstanding: u64,
}

#[derive(Deserialize)]
struct FundRequest {
    /// Account to credit (hex encoded)
    account: String,
    amount: u64,
}

#[derive(Serialize)]
struct FundResponse {
    success: bool,
    balance: u64,
}

#[derive(Deserialize)]
struct GhostRequest {
    /// Depositor address (hex encoded)
    caller: String,
    amount: u64,
    /// Commitment to append (hex encoded)
    commitment: String,
}

#[derive(Serialize)]
struct GhostResponse {
    success: bool,
    leaf_index: u64,
    root: String,
}

#[derive(Deserialize)]
struct RedeemRequest {
    /// Submitter address; need not be depositor or recipient (hex encoded)
    submitter: String,
    amount: u64,
    recipient: String,
    nullifier: String,
    root: String,
    /// Forwarded to the proof system only
    merkle_path: Vec<String>,
    path_indices: Vec<u8>,
    /// Serialized proof (hex encoded, 256 bytes)
    proof: String,
}

#[derive(Serialize)]
struct RedeemResponse {
    success: bool,
    new_leaf_index: Option<u64>,
}

#[derive(Deserialize)]
struct PartialRedeemRequest {
    submitter: String,
    redeem_amount: u64,
    original_amount: u64,
    recipient: String,
    old_nullifier: String,
    new_commitment: String,
    root: String,
    merkle_path: Vec<String>,
    path_indices: Vec<u8>,
    proof: String,
}

#[derive(Serialize)]
struct RootResponse {
    root: String,
    leaf_count: u64,
}

#[derive(Deserialize)]
struct RangeQuery {
    #[serde(default)]
    start: u64,
    #[serde(default = "default_range_count")]
    count: u64,
}

fn default_range_count() -> u64 {
    100
}

#[derive(Serialize)]
struct CommitmentsResponse {
    start: u64,
    commitments: Vec<String>,
    total: u64,
}

#[derive(Serialize)]
struct CommitmentResponse {
    leaf_index: u64,
    commitment: String,
}

#[derive(Serialize)]
struct PathResponse {
    leaf_index: u64,
    siblings: Vec<String>,
    path_indices: Vec<u8>,
    root: String,
}

#[derive(Serialize)]
struct NullifierResponse {
    nullifier: String,
    spent: bool,
}

#[derive(Deserialize)]
struct BatchCheckRequest {
    nullifiers: Vec<String>,
}

#[derive(Serialize)]
struct BatchCheckResponse {
    spent: Vec<bool>,
}

fn parse_hash32(value: &str, field: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(value)
        .map_err(|_| RelayerError::InvalidRequest(format!("{} must be hex-encoded", field)))?;
    bytes
        .try_into()
        .map_err(|_| RelayerError::InvalidRequest(format!("{} must be 32 bytes", field)))
}

fn parse_address(value: &str, field: &str) -> Result<Address> {
    parse_hash32(value, field).map(Address)
}

fn parse_path(values: &[String]) -> Result<Vec<[u8; 32]>> {
    values
        .iter()
        .map(|s| parse_hash32(s, "merkle_path"))
        .collect()
}

fn parse_proof(value: &str) -> Result<ZkProof> {
    let bytes = hex::decode(value)
        .map_err(|_| RelayerError::InvalidRequest("proof must be hex-encoded".into()))?;
    Ok(ZkProof::from_bytes(&bytes)?)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn get_info(State(state): State<Arc<RelayerState>>) -> Result<Json<InfoResponse>> {
    let (root, commitment_count) = {
        let ledger = state.read_ledger()?;
        (ledger.root(), ledger.commitment_count())
    };
    let spent_nullifiers = state.read_nullifiers()?.spent_count();
    let coordinator = state.coordinator.read().await;

    Ok(Json(InfoResponse {
        asset_id: hex::encode(coordinator.asset_id()),
        owner: state.config.owner.to_hex(),
        relayer: state.config.relayer.to_hex(),
        root: hex::encode(root),
        commitment_count,
        capacity: LEDGER_CAPACITY,
        tree_depth: TREE_DEPTH,
        spent_nullifiers,
        total_ghosted: coordinator.total_ghosted(),
        total_redeemed: coordinator.total_redeemed(),
        outstanding: coordinator.outstanding(),
    }))
}

async fn fund(
    State(state): State<Arc<RelayerState>>,
    Json(req): Json<FundRequest>,
) -> Result<Json<FundResponse>> {
    let account = parse_address(&req.account, "account")?;

    let balance = state
        .coordinator
        .write()
        .await
        .fund(state.config.owner, account, req.amount)?;

    Ok(Json(FundResponse {
        success: true,
        balance,
    }))
}

async fn ghost(
    State(state): State<Arc<RelayerState>>,
    Json(req): Json<GhostRequest>,
) -> Result<Json<GhostResponse>> {
    let caller = parse_address(&req.caller, "caller")?;
    let commitment = parse_hash32(&req.commitment, "commitment")?;

    let leaf_index = state
        .coordinator
        .write()
        .await
        .ghost(caller, req.amount, commitment)?;

    // Publish immediately so the deposit becomes redeemable without
    // waiting for the interval.
    let root = match state.publisher.publish()? {
        Some(root) => root,
        None => state.read_ledger()?.root(),
    };
    state.persist()?;

    Ok(Json(GhostResponse {
        success: true,
        leaf_index,
        root: hex::encode(root),
    }))
}

async fn redeem(
    State(state): State<Arc<RelayerState>>,
    Json(req): Json<RedeemRequest>,
) -> Result<Json<RedeemResponse>> {
    let submitter = parse_address(&req.submitter, "submitter")?;
    let recipient = parse_address(&req.recipient, "recipient")?;
    let nullifier = parse_hash32(&req.nullifier, "nullifier")?;
    let root = parse_hash32(&req.root, "root")?;
    let merkle_path = parse_path(&req.merkle_path)?;
    let proof = parse_proof(&req.proof)?;

    state.coordinator.write().await.redeem(
        submitter,
        req.amount,
        recipient,
        nullifier,
        root,
        &merkle_path,
        &req.path_indices,
        &proof,
    )?;
    state.persist()?;

    Ok(Json(RedeemResponse {
        success: true,
        new_leaf_index: None,
    }))
}

async fn redeem_partial(
    State(state): State<Arc<RelayerState>>,
    Json(req): Json<PartialRedeemRequest>,
) -> Result<Json<RedeemResponse>> {
    let submitter = parse_address(&req.submitter, "submitter")?;
    let recipient = parse_address(&req.recipient, "recipient")?;
    let old_nullifier = parse_hash32(&req.old_nullifier, "old_nullifier")?;
    let new_commitment = parse_hash32(&req.new_commitment, "new_commitment")?;
    let root = parse_hash32(&req.root, "root")?;
    let merkle_path = parse_path(&req.merkle_path)?;
    let proof = parse_proof(&req.proof)?;

    let new_leaf_index = state.coordinator.write().await.redeem_partial(
        submitter,
        req.redeem_amount,
        req.original_amount,
        recipient,
        old_nullifier,
        new_commitment,
        root,
        &merkle_path,
        &req.path_indices,
        &proof,
    )?;

    if new_leaf_index.is_some() {
        // The change commitment needs a root before it can be redeemed.
        state.publisher.publish()?;
    }
    state.persist()?;

    Ok(Json(RedeemResponse {
        success: true,
        new_leaf_index,
    }))
}

async fn get_root(State(state): State<Arc<RelayerState>>) -> Result<Json<RootResponse>> {
    let ledger = state.read_ledger()?;
    Ok(Json(RootResponse {
        root: hex::encode(ledger.root()),
        leaf_count: ledger.next_leaf_index(),
    }))
}

async fn get_historical_root(
    State(state): State<Arc<RelayerState>>,
    Path(index): Path<usize>,
) -> Result<Json<RootResponse>> {
    let ledger = state.read_ledger()?;
    Ok(Json(RootResponse {
        root: hex::encode(ledger.historical_root(index)),
        leaf_count: ledger.next_leaf_index(),
    }))
}

async fn get_commitments(
    State(state): State<Arc<RelayerState>>,
    Query(range): Query<RangeQuery>,
) -> Result<Json<CommitmentsResponse>> {
    let ledger = state.read_ledger()?;
    let commitments = ledger
        .commitments(range.start, range.count)
        .iter()
        .map(hex::encode)
        .collect();

    Ok(Json(CommitmentsResponse {
        start: range.start,
        commitments,
        total: ledger.commitment_count(),
    }))
}

async fn get_commitment(
    State(state): State<Arc<RelayerState>>,
    Path(index): Path<u64>,
) -> Result<Json<CommitmentResponse>> {
    let commitment = state.read_ledger()?.commitment(index)?;
    Ok(Json(CommitmentResponse {
        leaf_index: index,
        commitment: hex::encode(commitment),
    }))
}

async fn get_path(
    State(state): State<Arc<RelayerState>>,
    Path(leaf_index): Path<u64>,
) -> Result<Json<PathResponse>> {
    let (commitments, root) = {
        let ledger = state.read_ledger()?;
        (ledger.commitments(0, u64::MAX), ledger.root())
    };
    let (siblings, path_indices) = builder::merkle_path(&commitments, leaf_index)?;

    Ok(Json(PathResponse {
        leaf_index,
        siblings: siblings.iter().map(hex::encode).collect(),
        path_indices,
        root: hex::encode(root),
    }))
}

async fn get_nullifier(
    State(state): State<Arc<RelayerState>>,
    Path(hash): Path<String>,
) -> Result<Json<NullifierResponse>> {
    let nullifier = parse_hash32(&hash, "nullifier")?;
    let spent = state.read_nullifiers()?.is_spent(&nullifier);
    Ok(Json(NullifierResponse {
        nullifier: hash,
        spent,
    }))
}

async fn check_nullifiers(
    State(state): State<Arc<RelayerState>>,
    Json(req): Json<BatchCheckRequest>,
) -> Result<Json<BatchCheckResponse>> {
    let nullifiers: Vec<[u8; 32]> = req
        .nullifiers
        .iter()
        .map(|s| parse_hash32(s, "nullifiers"))
        .collect::<Result<_>>()?;

    let spent = state.read_nullifiers()?.batch_is_spent(&nullifiers);
    Ok(Json(BatchCheckResponse { spent }))
}
