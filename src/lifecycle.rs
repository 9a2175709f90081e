//! The work-order state machine.
//!
//! The transition table below is the single source of truth for which
//! status changes exist and what evidence each one needs. Guards are pure
//! functions of the work order and the set of media types it has, so the
//! same check backs both the engine and "is this allowed right now" queries.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::{MediaType, Status, WorkOrder, WorkOrderId};

/// Precondition attached to a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    None,
    /// Every listed media type must be present at least once.
    RequiresMedia(&'static [MediaType]),
}

impl Guard {
    /// Media types that must be present for this guard to pass.
    pub fn required_media(&self) -> &'static [MediaType] {
        match self {
            Guard::None => &[],
            Guard::RequiresMedia(types) => types,
        }
    }

    /// Evaluate against the evidence on hand. `Err` lists what is missing.
    pub fn evaluate(
        &self,
        _order: &WorkOrder,
        media: &MediaSet,
    ) -> std::result::Result<(), Vec<MediaType>> {
        let missing: Vec<MediaType> = self
            .required_media()
            .iter()
            .copied()
            .filter(|t| !media.contains(*t))
            .collect();
        if missing.is_empty() { Ok(()) } else { Err(missing) }
    }
}

/// One row of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Status,
    pub to: Status,
    pub guard: Guard,
}

const ENTRY_VIDEOS: &[MediaType] = &[MediaType::EntryVideoExternal, MediaType::EntryVideoInternal];
const DELIVERY_VIDEO: &[MediaType] = &[MediaType::DeliveryVideo];

pub const TRANSITIONS: &[Transition] = &[
    Transition {
        from: Status::Created,
        to: Status::InProgress,
        guard: Guard::RequiresMedia(ENTRY_VIDEOS),
    },
    Transition {
        from: Status::Created,
        to: Status::Cancelled,
        guard: Guard::None,
    },
    Transition {
        from: Status::InProgress,
        to: Status::Ready,
        guard: Guard::None,
    },
    Transition {
        from: Status::InProgress,
        to: Status::Cancelled,
        guard: Guard::None,
    },
    Transition {
        from: Status::Ready,
        to: Status::Delivered,
        guard: Guard::RequiresMedia(DELIVERY_VIDEO),
    },
];

/// Look up the table row for `(from, to)`.
pub fn find(from: Status, to: Status) -> Option<&'static Transition> {
    TRANSITIONS.iter().find(|t| t.from == from && t.to == to)
}

/// Structural legality only: is `(from, to)` in the table? Terminal
/// origins are reported as `TerminalState`.
pub fn lookup(from: Status, to: Status) -> Result<&'static Transition> {
    find(from, to).ok_or_else(|| {
        if from.is_terminal() {
            Error::TerminalState { from, to }
        } else {
            Error::InvalidTransition { from, to }
        }
    })
}

/// Full check: table membership, then the guard.
pub fn check(order: &WorkOrder, to: Status, media: &MediaSet) -> Result<&'static Transition> {
    let transition = lookup(order.status, to)?;
    transition
        .guard
        .evaluate(order, media)
        .map_err(|missing| Error::GuardNotSatisfied {
            from: order.status,
            to,
            missing,
        })?;
    Ok(transition)
}

/// An outgoing transition and whether it could be taken right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllowedTransition {
    pub to: Status,
    pub allowed: bool,
    /// Media still required before `allowed` flips to true.
    pub missing_media: Vec<MediaType>,
}

/// Every outgoing transition from the order's current status.
pub fn allowed_targets(order: &WorkOrder, media: &MediaSet) -> Vec<AllowedTransition> {
    TRANSITIONS
        .iter()
        .filter(|t| t.from == order.status)
        .map(|t| {
            let missing = t.guard.evaluate(order, media).err().unwrap_or_default();
            AllowedTransition {
                to: t.to,
                allowed: missing.is_empty(),
                missing_media: missing,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Media evidence
// ---------------------------------------------------------------------------

/// The media types present on a work order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaSet(BTreeSet<MediaType>);

impl MediaSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, media_type: MediaType) {
        self.0.insert(media_type);
    }

    pub fn contains(&self, media_type: MediaType) -> bool {
        self.0.contains(&media_type)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<MediaType> for MediaSet {
    fn from_iter<I: IntoIterator<Item = MediaType>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Answers "does work order W have media of type T".
#[async_trait]
pub trait MediaExistenceChecker: Send + Sync {
    async fn has_type(&self, work_order_id: WorkOrderId, media_type: MediaType) -> Result<bool>;
}

/// Collect the evidence a guard needs, asking only about the types it reads.
pub async fn gather_evidence<C>(
    checker: &C,
    work_order_id: WorkOrderId,
    guard: Guard,
) -> Result<MediaSet>
where
    C: MediaExistenceChecker + ?Sized,
{
    let mut set = MediaSet::new();
    for media_type in guard.required_media() {
        if checker.has_type(work_order_id, *media_type).await? {
            set.insert(*media_type);
        }
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CustomerId, UserId, VehicleId};
    use chrono::Utc;

    fn order(status: Status) -> WorkOrder {
        let now = Utc::now();
        WorkOrder {
            id: WorkOrderId::new(),
            code: "OS-000001".to_string(),
            vehicle_id: VehicleId::new(),
            customer_id: CustomerId::new(),
            status,
            notes: None,
            created_by: UserId::new(),
            cancelled_by: None,
            started_at: None,
            ready_at: None,
            delivered_at: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn all_media() -> MediaSet {
        MediaType::ALL.into_iter().collect()
    }

    #[test]
    fn table_has_exactly_five_legal_pairs() {
        let legal: Vec<_> = Status::ALL
            .into_iter()
            .flat_map(|from| Status::ALL.into_iter().map(move |to| (from, to)))
            .filter(|(from, to)| find(*from, *to).is_some())
            .collect();
        assert_eq!(
            legal,
            vec![
                (Status::Created, Status::InProgress),
                (Status::Created, Status::Cancelled),
                (Status::InProgress, Status::Ready),
                (Status::InProgress, Status::Cancelled),
                (Status::Ready, Status::Delivered),
            ]
        );
    }

    #[test]
    fn every_pair_outside_the_table_is_rejected() {
        for from in Status::ALL {
            for to in Status::ALL {
                if find(from, to).is_some() {
                    continue;
                }
                let err = check(&order(from), to, &all_media()).unwrap_err();
                if from.is_terminal() {
                    assert!(matches!(err, Error::TerminalState { .. }), "{from}->{to}: {err}");
                } else {
                    assert!(matches!(err, Error::InvalidTransition { .. }), "{from}->{to}: {err}");
                }
            }
        }
    }

    #[test]
    fn self_transitions_are_illegal() {
        for status in Status::ALL {
            assert!(find(status, status).is_none());
        }
    }

    #[test]
    fn start_needs_both_entry_videos() {
        let o = order(Status::Created);
        let only_external: MediaSet = [MediaType::EntryVideoExternal].into_iter().collect();

        match check(&o, Status::InProgress, &only_external) {
            Err(Error::GuardNotSatisfied { missing, .. }) => {
                assert_eq!(missing, vec![MediaType::EntryVideoInternal]);
            }
            other => panic!("expected GuardNotSatisfied, got {other:?}"),
        }

        let both: MediaSet = [MediaType::EntryVideoInternal, MediaType::EntryVideoExternal]
            .into_iter()
            .collect();
        assert!(check(&o, Status::InProgress, &both).is_ok());
    }

    #[test]
    fn detail_photos_do_not_satisfy_any_guard() {
        let photos: MediaSet = [MediaType::EntryDetailPhoto].into_iter().collect();
        assert!(check(&order(Status::Created), Status::InProgress, &photos).is_err());
        assert!(check(&order(Status::Ready), Status::Delivered, &photos).is_err());
    }

    #[test]
    fn cancel_and_ready_are_unguarded() {
        let none = MediaSet::new();
        assert!(check(&order(Status::Created), Status::Cancelled, &none).is_ok());
        assert!(check(&order(Status::InProgress), Status::Cancelled, &none).is_ok());
        assert!(check(&order(Status::InProgress), Status::Ready, &none).is_ok());
        assert!(check(&order(Status::Ready), Status::Cancelled, &none).is_err());
    }

    #[test]
    fn allowed_targets_reports_missing_media() {
        let targets = allowed_targets(&order(Status::Created), &MediaSet::new());
        assert_eq!(targets.len(), 2);

        let start = targets.iter().find(|t| t.to == Status::InProgress).unwrap();
        assert!(!start.allowed);
        assert_eq!(start.missing_media.len(), 2);

        let cancel = targets.iter().find(|t| t.to == Status::Cancelled).unwrap();
        assert!(cancel.allowed);

        assert!(allowed_targets(&order(Status::Delivered), &all_media()).is_empty());
    }
}
