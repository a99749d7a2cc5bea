//! The order fulfillment state machine.
//!
//! Transitions are monotonic and actor-scoped: the reconciler settles or fails payments, the vendor moves a paid
//! order to the handover point, the rider carries it to delivery, and the customer can cancel an unpaid order or
//! confirm receipt. Every transition must be the immediate successor of the current state in that actor's slice of
//! the graph.
//!
//! | From \ To          | Next state                        | Actor      |
//! |--------------------|-----------------------------------|------------|
//! | pending_payment    | paid, payment_failed              | reconciler |
//! | pending_payment    | cancelled                         | customer   |
//! | paid               | confirmed                         | vendor     |
//! | confirmed          | preparing                         | vendor     |
//! | preparing          | ready_for_pickup                  | vendor     |
//! | ready_for_pickup   | assigned_to_rider                 | rider      |
//! | assigned_to_rider  | picked_up                         | rider      |
//! | picked_up          | in_transit                        | rider      |
//! | in_transit         | delivered                         | rider      |
//! | delivered          | completed                         | customer   |
//!
//! `payment_failed`, `cancelled` and `completed` are absorbing. Validation here is advisory only; the actual state
//! change is always a conditional database update keyed on the current status, so racing writers cannot both win.

use thiserror::Error;

use crate::db_types::{ActorRole, OrderStatusType};

#[derive(Debug, Clone, Error)]
pub enum TransitionError {
    #[error("A {actor} may not move an order from {from} to {to}")]
    InvalidTransition { from: OrderStatusType, to: OrderStatusType, actor: ActorRole },
}

/// Checks that `requested` is the immediate successor of `current` in the transition graph for `actor`.
pub fn validate_transition(
    current: OrderStatusType,
    requested: OrderStatusType,
    actor: ActorRole,
) -> Result<(), TransitionError> {
    use ActorRole::*;
    use OrderStatusType::*;
    let allowed = matches!(
        (current, requested, actor),
        (PendingPayment, Paid, Reconciler)
            | (PendingPayment, PaymentFailed, Reconciler)
            | (PendingPayment, Cancelled, Customer)
            | (Paid, Confirmed, Vendor)
            | (Confirmed, Preparing, Vendor)
            | (Preparing, ReadyForPickup, Vendor)
            | (ReadyForPickup, AssignedToRider, Rider)
            | (AssignedToRider, PickedUp, Rider)
            | (PickedUp, InTransit, Rider)
            | (InTransit, Delivered, Rider)
            | (Delivered, Completed, Customer)
    );
    if allowed {
        Ok(())
    } else {
        Err(TransitionError::InvalidTransition { from: current, to: requested, actor })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db_types::{ActorRole::*, OrderStatusType::*};

    #[test]
    fn the_happy_path_is_fully_connected() {
        let path = [
            (PendingPayment, Paid, Reconciler),
            (Paid, Confirmed, Vendor),
            (Confirmed, Preparing, Vendor),
            (Preparing, ReadyForPickup, Vendor),
            (ReadyForPickup, AssignedToRider, Rider),
            (AssignedToRider, PickedUp, Rider),
            (PickedUp, InTransit, Rider),
            (InTransit, Delivered, Rider),
            (Delivered, Completed, Customer),
        ];
        for (from, to, actor) in path {
            assert!(validate_transition(from, to, actor).is_ok(), "{from} -> {to} as {actor}");
        }
    }

    #[test]
    fn skipping_a_state_is_rejected() {
        assert!(validate_transition(Paid, Preparing, Vendor).is_err());
        assert!(validate_transition(Paid, ReadyForPickup, Vendor).is_err());
        assert!(validate_transition(ReadyForPickup, Delivered, Rider).is_err());
        assert!(validate_transition(PendingPayment, Confirmed, Vendor).is_err());
    }

    #[test]
    fn actors_cannot_use_each_others_edges() {
        assert!(validate_transition(PendingPayment, Paid, Vendor).is_err());
        assert!(validate_transition(PendingPayment, Paid, Customer).is_err());
        assert!(validate_transition(Paid, Confirmed, Rider).is_err());
        assert!(validate_transition(InTransit, Delivered, Vendor).is_err());
        assert!(validate_transition(PendingPayment, Cancelled, Vendor).is_err());
    }

    #[test]
    fn terminal_states_absorb() {
        for terminal in [PaymentFailed, Cancelled, Completed] {
            for actor in [Customer, Vendor, Rider, Reconciler] {
                assert!(validate_transition(terminal, Paid, actor).is_err());
                assert!(validate_transition(terminal, PendingPayment, actor).is_err());
            }
        }
    }

    #[test]
    fn reversing_is_rejected() {
        assert!(validate_transition(Paid, PendingPayment, Reconciler).is_err());
        assert!(validate_transition(Delivered, InTransit, Rider).is_err());
    }
}
