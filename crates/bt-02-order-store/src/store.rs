//! # Tables
//!
//! The store proper. One lock, three tables, CAS-style updates.

use crate::errors::StoreError;
use parking_lot::RwLock;
use shared_types::{
    Hash160, Order, OrderId, OrderPhase, Proposal, ProposalId, ProposalStatus, SettlementStatus,
};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

#[derive(Default)]
struct Tables {
    orders: HashMap<OrderId, Order>,
    proposals: HashMap<ProposalId, Proposal>,
    by_order: HashMap<OrderId, BTreeSet<ProposalId>>,
}

/// In-memory order/proposal store.
#[derive(Default)]
pub struct OrderStore {
    tables: RwLock<Tables>,
}

impl OrderStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Orders
    // =========================================================================

    /// Insert a new order.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DuplicateOrder` if the id is taken.
    pub fn insert_order(&self, order: Order) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        if tables.orders.contains_key(&order.order_id) {
            return Err(StoreError::DuplicateOrder(order.order_id));
        }
        debug!(order_id = %order.order_id, targeted = order.is_targeted(), "order inserted");
        tables.orders.insert(order.order_id.clone(), order);
        Ok(())
    }

    /// Fetch an order by id.
    #[must_use]
    pub fn order(&self, id: &OrderId) -> Option<Order> {
        self.tables.read().orders.get(id).cloned()
    }

    /// All orders, unordered.
    #[must_use]
    pub fn orders(&self) -> Vec<Order> {
        self.tables.read().orders.values().cloned().collect()
    }

    /// Orders still in the available pool (non-terminal phase).
    #[must_use]
    pub fn available_orders(&self) -> Vec<Order> {
        self.tables
            .read()
            .orders
            .values()
            .filter(|o| !o.phase.is_terminal())
            .cloned()
            .collect()
    }

    /// Number of orders held.
    #[must_use]
    pub fn order_count(&self) -> usize {
        self.tables.read().orders.len()
    }

    /// Move an order to `next` phase, validating the transition.
    ///
    /// Idempotent: advancing to the current phase is a no-op.
    ///
    /// # Errors
    ///
    /// `StoreError::OrderNotFound` or `StoreError::InvalidPhaseTransition`.
    pub fn advance_order_phase(&self, id: &OrderId, next: OrderPhase) -> Result<Order, StoreError> {
        let mut tables = self.tables.write();
        let order = tables
            .orders
            .get_mut(id)
            .ok_or_else(|| StoreError::OrderNotFound(id.clone()))?;
        if order.phase == next {
            return Ok(order.clone());
        }
        if !order.phase.can_transition_to(next) {
            return Err(StoreError::InvalidPhaseTransition {
                from: order.phase,
                to: next,
            });
        }
        debug!(order_id = %id, from = ?order.phase, to = ?next, "order phase advanced");
        order.phase = next;
        Ok(order.clone())
    }

    /// Replace the stub fields of a targeted order with the disclosed
    /// details. Only stub records may be filled in.
    ///
    /// # Errors
    ///
    /// `StoreError::OrderNotFound`, or `StoreError::DuplicateOrder` when
    /// the stored record already carries full details.
    pub fn fill_order_details(&self, details: Order) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        let order = tables
            .orders
            .get_mut(&details.order_id)
            .ok_or_else(|| StoreError::OrderNotFound(details.order_id.clone()))?;
        if !order.stub {
            return Err(StoreError::DuplicateOrder(details.order_id));
        }
        let phase = order.phase;
        *order = Order {
            phase,
            stub: false,
            ..details
        };
        Ok(())
    }

    // =========================================================================
    // Proposals
    // =========================================================================

    /// Insert a new proposal, indexing it under its order.
    ///
    /// # Errors
    ///
    /// `StoreError::OrderNotFound` for an unknown order or
    /// `StoreError::DuplicateProposal` for a reused id.
    pub fn insert_proposal(&self, proposal: Proposal) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        if !tables.orders.contains_key(&proposal.order_id) {
            return Err(StoreError::OrderNotFound(proposal.order_id));
        }
        if tables.proposals.contains_key(&proposal.proposal_id) {
            return Err(StoreError::DuplicateProposal(proposal.proposal_id));
        }
        tables
            .by_order
            .entry(proposal.order_id.clone())
            .or_default()
            .insert(proposal.proposal_id.clone());
        debug!(proposal_id = %proposal.proposal_id, "proposal inserted");
        tables
            .proposals
            .insert(proposal.proposal_id.clone(), proposal);
        Ok(())
    }

    /// Fetch a proposal by id.
    #[must_use]
    pub fn proposal(&self, id: &ProposalId) -> Option<Proposal> {
        self.tables.read().proposals.get(id).cloned()
    }

    /// Proposals on an order, in id order.
    #[must_use]
    pub fn proposals_for_order(&self, order_id: &OrderId) -> Vec<Proposal> {
        let tables = self.tables.read();
        tables
            .by_order
            .get(order_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| tables.proposals.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All proposals, unordered.
    #[must_use]
    pub fn proposals(&self) -> Vec<Proposal> {
        self.tables.read().proposals.values().cloned().collect()
    }

    /// Number of proposals held.
    #[must_use]
    pub fn proposal_count(&self) -> usize {
        self.tables.read().proposals.len()
    }

    /// Accept a proposal, recording the agreed hash-lock.
    ///
    /// One critical section checks and commits everything: the proposal
    /// is pending, its order can reach `Accepted`, and no sibling
    /// proposal is accepted. The losing side of a concurrent double
    /// acceptance gets `OrderAlreadyAccepted`.
    ///
    /// # Errors
    ///
    /// `ProposalNotFound`, `OrderNotFound`, `OrderAlreadyAccepted`,
    /// `InvalidStatusTransition`, or `InvalidPhaseTransition`.
    pub fn accept_proposal(
        &self,
        id: &ProposalId,
        hash_lock: Hash160,
    ) -> Result<Proposal, StoreError> {
        let mut tables = self.tables.write();

        let proposal = tables
            .proposals
            .get(id)
            .ok_or_else(|| StoreError::ProposalNotFound(id.clone()))?;
        let order_id = proposal.order_id.clone();
        let status = proposal.status;

        if !status.can_transition_to(ProposalStatus::Accepted) {
            return Err(StoreError::InvalidStatusTransition {
                from: status,
                to: ProposalStatus::Accepted,
            });
        }

        let order = tables
            .orders
            .get(&order_id)
            .ok_or_else(|| StoreError::OrderNotFound(order_id.clone()))?;
        if order.phase == OrderPhase::Accepted {
            return Err(StoreError::OrderAlreadyAccepted(order_id));
        }
        if !order.phase.can_transition_to(OrderPhase::Accepted) {
            return Err(StoreError::InvalidPhaseTransition {
                from: order.phase,
                to: OrderPhase::Accepted,
            });
        }

        let sibling_accepted = tables
            .by_order
            .get(&order_id)
            .into_iter()
            .flatten()
            .filter_map(|pid| tables.proposals.get(pid))
            .any(|p| p.status == ProposalStatus::Accepted);
        if sibling_accepted {
            return Err(StoreError::OrderAlreadyAccepted(order_id));
        }

        // Commit.
        if let Some(order) = tables.orders.get_mut(&order_id) {
            order.phase = OrderPhase::Accepted;
        }
        let proposal = tables
            .proposals
            .get_mut(id)
            .unwrap_or_else(|| unreachable!("checked above"));
        proposal.status = ProposalStatus::Accepted;
        proposal.hash_lock = Some(hash_lock);
        debug!(proposal_id = %id, "proposal accepted");
        Ok(proposal.clone())
    }

    /// Reject a pending proposal.
    ///
    /// # Errors
    ///
    /// `ProposalNotFound` or `InvalidStatusTransition`.
    pub fn reject_proposal(&self, id: &ProposalId) -> Result<Proposal, StoreError> {
        let mut tables = self.tables.write();
        let proposal = tables
            .proposals
            .get_mut(id)
            .ok_or_else(|| StoreError::ProposalNotFound(id.clone()))?;
        if !proposal.status.can_transition_to(ProposalStatus::Rejected) {
            return Err(StoreError::InvalidStatusTransition {
                from: proposal.status,
                to: ProposalStatus::Rejected,
            });
        }
        proposal.status = ProposalStatus::Rejected;
        debug!(proposal_id = %id, "proposal rejected");
        Ok(proposal.clone())
    }

    /// Mirror a settlement status onto a proposal, validating the DAG.
    ///
    /// Idempotent: setting the current status again is a no-op. The first
    /// transition (into `Ready`) requires an accepted proposal.
    ///
    /// # Errors
    ///
    /// `ProposalNotFound` or `InvalidSettlementTransition`.
    pub fn set_settlement_status(
        &self,
        id: &ProposalId,
        target: SettlementStatus,
    ) -> Result<Proposal, StoreError> {
        let mut tables = self.tables.write();
        let proposal = tables
            .proposals
            .get_mut(id)
            .ok_or_else(|| StoreError::ProposalNotFound(id.clone()))?;

        match proposal.settlement_status {
            None => {
                if proposal.status != ProposalStatus::Accepted
                    || target != SettlementStatus::Ready
                {
                    return Err(StoreError::InvalidSettlementTransition {
                        from: None,
                        to: target,
                    });
                }
            }
            Some(current) if current == target => return Ok(proposal.clone()),
            Some(current) => {
                if !current.can_transition_to(target) {
                    return Err(StoreError::InvalidSettlementTransition {
                        from: Some(current),
                        to: target,
                    });
                }
            }
        }
        debug!(proposal_id = %id, status = ?target, "settlement status mirrored");
        proposal.settlement_status = Some(target);
        Ok(proposal.clone())
    }

    /// Record the hash-lock distributed by the coordinator.
    ///
    /// Idempotent for a matching value; a different value is a conflict.
    ///
    /// # Errors
    ///
    /// `ProposalNotFound` or `HashLockConflict`.
    pub fn set_hash_lock(&self, id: &ProposalId, hash_lock: Hash160) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        let proposal = tables
            .proposals
            .get_mut(id)
            .ok_or_else(|| StoreError::ProposalNotFound(id.clone()))?;
        match proposal.hash_lock {
            Some(existing) if existing != hash_lock => {
                Err(StoreError::HashLockConflict(id.clone()))
            }
            _ => {
                proposal.hash_lock = Some(hash_lock);
                Ok(())
            }
        }
    }
}
