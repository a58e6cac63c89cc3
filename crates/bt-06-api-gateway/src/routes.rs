//! Router and handlers.

use crate::error::ApiError;
use crate::ports::{ActionInput, ActionReceipt, NetworkInfo, SettlementActions, SettlementView, SwapLeg};
use crate::session::SessionStore;
use crate::types::{
    AcceptRequest, CreateOrderRequest, Health, NodeStatus, OrderView, ProposalView,
    ProposeRequest,
};
use axum::extract::{Path, Request, State};
use axum::http::header;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bt_02_order_store::OrderStore;
use bt_03_negotiation::{CreateOrderParams, NegotiationCounters, NegotiationHandle};
use shared_types::{ErrorKind, OrderId, PeerTag, ProposalId, SwapSecret};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    /// Live session tokens.
    pub sessions: Arc<SessionStore>,
    /// Order/proposal tables (read side).
    pub store: Arc<OrderStore>,
    /// Negotiation engine handle.
    pub negotiation: NegotiationHandle,
    /// Settlement actions port.
    pub settlement: Arc<dyn SettlementActions>,
    /// Network state port.
    pub network: Arc<dyn NetworkInfo>,
    /// Message-hygiene drop counters.
    pub counters: Arc<NegotiationCounters>,
}

/// Build the router. Everything except `/health` requires a bearer
/// session token.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/request-details", post(request_details))
        .route("/orders/:id/proposals", post(propose).get(list_proposals))
        .route("/proposals/:id/accept", post(accept))
        .route("/proposals/:id/reject", post(reject))
        .route("/settlement/pending", get(settlement_pending))
        .route("/settlement/:id", get(settlement_status))
        .route("/settlement/:id/lock/:leg", post(settlement_lock))
        .route("/settlement/:id/claim/:leg", post(settlement_claim))
        .route("/settlement/:id/refund/:leg", post(settlement_refund))
        .route("/network/status", get(network_status))
        .route("/network/peers", get(network_peers))
        .layer(middleware::from_fn_with_state(state.clone(), require_session))
        // Added after the auth layer: health stays open.
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn require_session(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| state.sessions.validate(token).is_some())
        .unwrap_or(false);

    if !authorized {
        return ApiError::auth().into_response();
    }
    next.run(request).await
}

// =============================================================================
// Orders
// =============================================================================

async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<Json<OrderView>, ApiError> {
    let order = state
        .negotiation
        .create_order(CreateOrderParams {
            amount: request.amount,
            quote_asset_tag: request.quote_asset_tag,
            min_price: request.min_price,
            max_price: request.max_price,
            settlement_chain_tag: request.settlement_chain_tag,
            target_taker: request.target_taker.map(PeerTag::new),
        })
        .await?;
    Ok(Json(order.into()))
}

async fn list_orders(State(state): State<AppState>) -> Json<Vec<OrderView>> {
    let mut orders: Vec<OrderView> = state.store.orders().into_iter().map(Into::into).collect();
    orders.sort_by(|a, b| a.order_id.cmp(&b.order_id));
    Json(orders)
}

async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OrderView>, ApiError> {
    state
        .store
        .order(&OrderId::new(id.clone()))
        .map(|order| Json(order.into()))
        .ok_or_else(|| ApiError::new(ErrorKind::NotFound, format!("order not found: {id}")))
}

// =============================================================================
// Negotiation
// =============================================================================

async fn request_details(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Health>, ApiError> {
    state.negotiation.request_details(OrderId::new(id)).await?;
    Ok(Json(Health {
        status: "requested".to_string(),
    }))
}

async fn propose(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ProposeRequest>,
) -> Result<Json<ProposalView>, ApiError> {
    let proposal = state
        .negotiation
        .propose(OrderId::new(id), request.price, request.amount)
        .await?;
    Ok(Json(proposal.into()))
}

async fn list_proposals(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<Vec<ProposalView>> {
    Json(
        state
            .store
            .proposals_for_order(&OrderId::new(id))
            .into_iter()
            .map(Into::into)
            .collect(),
    )
}

async fn accept(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<AcceptRequest>,
) -> Result<Json<ProposalView>, ApiError> {
    let secret = hex::decode(&request.secret)
        .ok()
        .and_then(|bytes| SwapSecret::from_slice(&bytes))
        .ok_or_else(|| {
            ApiError::new(ErrorKind::Crypto, "secret must be 32 bytes of hex")
        })?;
    let proposal = state
        .negotiation
        .accept(ProposalId::new(id), secret)
        .await?;
    Ok(Json(proposal.into()))
}

async fn reject(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProposalView>, ApiError> {
    let proposal = state.negotiation.reject(ProposalId::new(id)).await?;
    Ok(Json(proposal.into()))
}

// =============================================================================
// Settlement
// =============================================================================

fn parse_leg(leg: &str) -> Result<SwapLeg, ApiError> {
    match leg {
        "base" => Ok(SwapLeg::Base),
        "quote" => Ok(SwapLeg::Quote),
        other => Err(ApiError::new(
            ErrorKind::Precondition,
            format!("unknown leg: {other}"),
        )),
    }
}

async fn settlement_lock(
    State(state): State<AppState>,
    Path((id, leg)): Path<(String, String)>,
    Json(input): Json<ActionInput>,
) -> Result<Json<ActionReceipt>, ApiError> {
    let leg = parse_leg(&leg)?;
    let receipt = state
        .settlement
        .lock(ProposalId::new(id), leg, input)
        .await?;
    Ok(Json(receipt))
}

async fn settlement_claim(
    State(state): State<AppState>,
    Path((id, leg)): Path<(String, String)>,
    Json(input): Json<ActionInput>,
) -> Result<Json<ActionReceipt>, ApiError> {
    let leg = parse_leg(&leg)?;
    let receipt = state
        .settlement
        .claim(ProposalId::new(id), leg, input)
        .await?;
    Ok(Json(receipt))
}

async fn settlement_refund(
    State(state): State<AppState>,
    Path((id, leg)): Path<(String, String)>,
    Json(input): Json<ActionInput>,
) -> Result<Json<ActionReceipt>, ApiError> {
    let leg = parse_leg(&leg)?;
    let receipt = state
        .settlement
        .refund(ProposalId::new(id), leg, input)
        .await?;
    Ok(Json(receipt))
}

async fn settlement_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SettlementView>, ApiError> {
    let view = state.settlement.status(ProposalId::new(id)).await?;
    Ok(Json(view))
}

async fn settlement_pending(
    State(state): State<AppState>,
) -> Result<Json<Vec<SettlementView>>, ApiError> {
    Ok(Json(state.settlement.list_pending().await?))
}

// =============================================================================
// Network
// =============================================================================

async fn network_status(State(state): State<AppState>) -> Json<NodeStatus> {
    let (bad_signature, stale, not_for_us) = state.counters.snapshot();
    Json(NodeStatus {
        peer_id: state.network.local_peer().to_string(),
        peer_count: state.network.peer_count(),
        order_count: state.store.order_count(),
        proposal_count: state.store.proposal_count(),
        dropped_bad_signature: bad_signature,
        dropped_stale: stale,
        dropped_not_for_us: not_for_us,
    })
}

async fn network_peers(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(
        state
            .network
            .peers()
            .into_iter()
            .map(|p| p.to_string())
            .collect(),
    )
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "ok".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use bt_03_negotiation::testing::LoopbackRouter;
    use bt_03_negotiation::{EngineParams, NegotiationConfig, NegotiationEngine};
    use shared_crypto::{IdentityKeyPair, PeerKeyCache};
    use shared_types::{ManualClock, SettlementStatus};
    use tokio::sync::{mpsc, watch};
    use tower::ServiceExt;

    struct NoSettlement;

    #[async_trait]
    impl SettlementActions for NoSettlement {
        async fn lock(
            &self,
            _proposal_id: ProposalId,
            _leg: SwapLeg,
            _input: ActionInput,
        ) -> Result<ActionReceipt, ApiError> {
            Err(ApiError::new(ErrorKind::Precondition, "not wired"))
        }
        async fn claim(
            &self,
            _proposal_id: ProposalId,
            _leg: SwapLeg,
            _input: ActionInput,
        ) -> Result<ActionReceipt, ApiError> {
            Err(ApiError::new(ErrorKind::Precondition, "not wired"))
        }
        async fn refund(
            &self,
            _proposal_id: ProposalId,
            _leg: SwapLeg,
            _input: ActionInput,
        ) -> Result<ActionReceipt, ApiError> {
            Err(ApiError::new(ErrorKind::Precondition, "not wired"))
        }
        async fn status(&self, proposal_id: ProposalId) -> Result<SettlementView, ApiError> {
            Ok(SettlementView {
                proposal_id,
                settlement_status: Some(SettlementStatus::Ready),
                hash_lock: None,
                base_lock_tx: None,
                quote_lock_tx: None,
                base_locktime: None,
                quote_locktime: None,
            })
        }
        async fn list_pending(&self) -> Result<Vec<SettlementView>, ApiError> {
            Ok(Vec::new())
        }
    }

    struct StaticNetwork;

    impl NetworkInfo for StaticNetwork {
        fn local_peer(&self) -> PeerTag {
            PeerTag::new("local")
        }
        fn peer_count(&self) -> usize {
            0
        }
        fn peers(&self) -> Vec<PeerTag> {
            Vec::new()
        }
    }

    fn test_state() -> (AppState, String) {
        let loopback = LoopbackRouter::new();
        let peer = PeerTag::new("local");
        let (outbound, network_events) = loopback.attach(peer.clone());
        let store = Arc::new(OrderStore::new());
        let (accepted_tx, _accepted_rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let clock = ManualClock::at(1_700_000_000);

        let (engine, negotiation, counters) = NegotiationEngine::new(EngineParams {
            identity: Arc::new(IdentityKeyPair::generate()),
            local_peer: peer,
            store: store.clone(),
            key_cache: Arc::new(PeerKeyCache::new()),
            outbound,
            clock: Arc::new(clock),
            config: NegotiationConfig::default(),
            accepted_tx,
            network_events,
        });
        tokio::spawn(engine.run(shutdown_rx));
        // Dropping the sender would shut the engine down mid-test.
        std::mem::forget(_shutdown_tx);

        let sessions = Arc::new(SessionStore::new());
        let token = sessions.issue("tester");
        (
            AppState {
                sessions,
                store,
                negotiation,
                settlement: Arc::new(NoSettlement),
                network: Arc::new(StaticNetwork),
                counters,
            },
            token,
        )
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_is_open() {
        let (state, _token) = test_state();
        let response = router(state)
            .oneshot(
                HttpRequest::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let (state, _token) = test_state();
        let response = router(state)
            .oneshot(
                HttpRequest::builder()
                    .uri("/orders")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["kind"], "auth");
    }

    #[tokio::test]
    async fn test_create_and_list_orders() {
        let (state, token) = test_state();
        let app = router(state);

        let create = HttpRequest::builder()
            .method("POST")
            .uri("/orders")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                serde_json::json!({
                    "amount": 100,
                    "quote_asset_tag": "usdq",
                    "min_price": 10,
                    "max_price": 15,
                    "settlement_chain_tag": "acct-main"
                })
                .to_string(),
            ))
            .unwrap();
        let response = app.clone().oneshot(create).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let created = body_json(response).await;
        assert_eq!(created["amount"], 100);
        assert_eq!(created["phase"], "Announced");

        let list = HttpRequest::builder()
            .uri("/orders")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(list).await.unwrap();
        let listed = body_json(response).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_order_is_not_found() {
        let (state, token) = test_state();
        let response = router(state)
            .oneshot(
                HttpRequest::builder()
                    .uri("/orders/ord-999")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_accept_rejects_malformed_secret() {
        let (state, token) = test_state();
        let response = router(state)
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/proposals/p1/accept")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"secret": "zz"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["kind"], "crypto");
    }

    #[tokio::test]
    async fn test_bad_leg_is_precondition() {
        let (state, token) = test_state();
        let response = router(state)
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/settlement/p1/lock/sideways")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"signing_ref": "wif"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
