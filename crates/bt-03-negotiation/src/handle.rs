//! Command surface of the engine.
//!
//! The gateway (and tests) drive the engine through a
//! [`NegotiationHandle`]; each command is answered over a oneshot.

use crate::errors::NegotiationError;
use shared_types::{Order, OrderId, PeerTag, Proposal, ProposalId, SwapSecret};
use tokio::sync::{mpsc, oneshot};

/// User-facing order creation parameters.
#[derive(Clone, Debug)]
pub struct CreateOrderParams {
    /// Amount of the base asset to sell.
    pub amount: u64,
    /// Quote asset tag.
    pub quote_asset_tag: String,
    /// Lowest acceptable price.
    pub min_price: u64,
    /// Highest advertised price.
    pub max_price: u64,
    /// Chain the quote leg settles on.
    pub settlement_chain_tag: String,
    /// When set, details are disclosed only to this taker.
    pub target_taker: Option<PeerTag>,
}

/// Commands consumed by the engine loop.
pub enum NegotiationCommand {
    /// Create and announce an order.
    CreateOrder {
        /// Creation parameters.
        params: CreateOrderParams,
        /// Answered with the created order.
        reply: oneshot::Sender<Result<Order, NegotiationError>>,
    },
    /// Ask a targeted order's maker for the full details.
    RequestDetails {
        /// The order to ask about.
        order_id: OrderId,
        /// Answered once the request is on the wire.
        reply: oneshot::Sender<Result<(), NegotiationError>>,
    },
    /// Propose on an order.
    Propose {
        /// The order to propose on.
        order_id: OrderId,
        /// Offered price.
        price: u64,
        /// Offered amount.
        amount: u64,
        /// Answered with the created proposal.
        reply: oneshot::Sender<Result<Proposal, NegotiationError>>,
    },
    /// Accept a proposal, committing the swap preimage.
    Accept {
        /// The proposal to accept.
        proposal_id: ProposalId,
        /// The maker-supplied preimage for this swap.
        secret: SwapSecret,
        /// Answered with the accepted proposal.
        reply: oneshot::Sender<Result<Proposal, NegotiationError>>,
    },
    /// Reject a pending proposal.
    Reject {
        /// The proposal to reject.
        proposal_id: ProposalId,
        /// Answered with the rejected proposal.
        reply: oneshot::Sender<Result<Proposal, NegotiationError>>,
    },
}

/// Cloneable handle to the engine loop.
#[derive(Clone)]
pub struct NegotiationHandle {
    command_tx: mpsc::Sender<NegotiationCommand>,
}

impl NegotiationHandle {
    pub(crate) fn new(command_tx: mpsc::Sender<NegotiationCommand>) -> Self {
        Self { command_tx }
    }

    async fn send<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, NegotiationError>>) -> NegotiationCommand,
    ) -> Result<T, NegotiationError> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(build(reply))
            .await
            .map_err(|_| NegotiationError::ChannelClosed)?;
        rx.await.map_err(|_| NegotiationError::ChannelClosed)?
    }

    /// Create and announce an order.
    pub async fn create_order(
        &self,
        params: CreateOrderParams,
    ) -> Result<Order, NegotiationError> {
        self.send(|reply| NegotiationCommand::CreateOrder { params, reply })
            .await
    }

    /// Ask a targeted order's maker for the full details.
    pub async fn request_details(&self, order_id: OrderId) -> Result<(), NegotiationError> {
        self.send(|reply| NegotiationCommand::RequestDetails { order_id, reply })
            .await
    }

    /// Propose on an order.
    pub async fn propose(
        &self,
        order_id: OrderId,
        price: u64,
        amount: u64,
    ) -> Result<Proposal, NegotiationError> {
        self.send(|reply| NegotiationCommand::Propose {
            order_id,
            price,
            amount,
            reply,
        })
        .await
    }

    /// Accept a proposal with the swap preimage.
    pub async fn accept(
        &self,
        proposal_id: ProposalId,
        secret: SwapSecret,
    ) -> Result<Proposal, NegotiationError> {
        self.send(|reply| NegotiationCommand::Accept {
            proposal_id,
            secret,
            reply,
        })
        .await
    }

    /// Reject a pending proposal.
    pub async fn reject(&self, proposal_id: ProposalId) -> Result<Proposal, NegotiationError> {
        self.send(|reply| NegotiationCommand::Reject { proposal_id, reply })
            .await
    }
}
