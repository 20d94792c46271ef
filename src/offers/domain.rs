// Domain types - pure, no side effects. The repository applies these
// transitions inside a transaction.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Negotiation lifecycle of an offer. Declined, Completed and Cancelled are
/// terminal; a Pending offer withdrawn by the buyer is deleted outright and
/// never reaches a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OfferStatus {
    Pending,
    Accepted,
    Declined,
    Completed,
    Cancelled,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Accepted => "Accepted",
            Self::Declined => "Declined",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Declined | Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OfferStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Accepted" => Ok(Self::Accepted),
            "Declined" => Ok(Self::Declined),
            "Completed" => Ok(Self::Completed),
            "Cancelled" => Ok(Self::Cancelled),
            other => Err(format!("Unknown offer status: {}", other)),
        }
    }
}

/// Which side of the negotiation an actor is acting as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    Buyer,
    Seller,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransitionError {
    #[error("Offer is not pending")]
    NotPending,

    #[error("Offer is not accepted")]
    NotAccepted,

    #[error("Completion already recorded for this side")]
    AlreadyCompleted,
}

/// The mutable slice of an offer row the state machine operates on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OfferState {
    pub status: OfferStatus,
    pub buyer_completed: bool,
    pub seller_completed: bool,
}

impl OfferState {
    /// State of a freshly created offer.
    pub fn new() -> Self {
        Self {
            status: OfferStatus::Pending,
            buyer_completed: false,
            seller_completed: false,
        }
    }

    /// Pending → Accepted (seller decision).
    pub fn accept(self) -> Result<Self, TransitionError> {
        match self.status {
            OfferStatus::Pending => Ok(Self {
                status: OfferStatus::Accepted,
                ..self
            }),
            _ => Err(TransitionError::NotPending),
        }
    }

    /// Pending → Declined (seller decision).
    pub fn decline(self) -> Result<Self, TransitionError> {
        match self.status {
            OfferStatus::Pending => Ok(Self {
                status: OfferStatus::Declined,
                ..self
            }),
            _ => Err(TransitionError::NotPending),
        }
    }

    /// Guard for the buyer withdrawing a Pending offer. The withdrawal
    /// itself deletes the row, so there is no successor state.
    pub fn check_withdraw(&self) -> Result<(), TransitionError> {
        match self.status {
            OfferStatus::Pending => Ok(()),
            _ => Err(TransitionError::NotPending),
        }
    }

    /// One party records completion of an Accepted trade. The trade
    /// finalizes only once both sides have independently confirmed; the
    /// returned flag tells the caller whether this call was the finalizing
    /// one (and therefore must withdraw the item and decline the other
    /// pending offers).
    pub fn mark_complete(self, party: Party) -> Result<(Self, bool), TransitionError> {
        if self.status != OfferStatus::Accepted {
            return Err(TransitionError::NotAccepted);
        }

        let already = match party {
            Party::Buyer => self.buyer_completed,
            Party::Seller => self.seller_completed,
        };
        if already {
            return Err(TransitionError::AlreadyCompleted);
        }

        let mut next = self;
        match party {
            Party::Buyer => next.buyer_completed = true,
            Party::Seller => next.seller_completed = true,
        }

        let finalized = next.buyer_completed && next.seller_completed;
        if finalized {
            next.status = OfferStatus::Completed;
        }

        Ok((next, finalized))
    }

    /// Accepted → Cancelled (either party). Completion flags reset so the
    /// record does not claim a half-confirmed trade.
    pub fn cancel_accepted(self) -> Result<Self, TransitionError> {
        match self.status {
            OfferStatus::Accepted => Ok(Self {
                status: OfferStatus::Cancelled,
                buyer_completed: false,
                seller_completed: false,
            }),
            _ => Err(TransitionError::NotAccepted),
        }
    }
}

impl Default for OfferState {
    fn default() -> Self {
        Self::new()
    }
}
