//! Single-slot position tracker.
//!
//! Each snapshot is classified against the previously tracked asset:
//! - `NoPositions`: the venue reported nothing
//! - `NoValidPosition`: entries exist but none has usable prices (resolved markets)
//! - `NewPosition`: the first valid entry is a different asset
//! - `SamePosition`: the first valid entry is the tracked asset
//!
//! Only the first valid entry in venue order is ever watched.

use std::fmt;

use tracing::{debug, info};

use crate::position::TrackedPosition;
use stoploss_api::Position;

/// Classification of a snapshot relative to the tracked asset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SnapshotClass<'a> {
    NoPositions,
    NoValidPosition,
    NewPosition(&'a Position),
    SamePosition(&'a Position),
}

/// Classify `snapshot` given the asset tracked before it (if any).
pub fn classify<'a>(snapshot: &'a [Position], tracked_asset: Option<&str>) -> SnapshotClass<'a> {
    if snapshot.is_empty() {
        return SnapshotClass::NoPositions;
    }

    match snapshot.iter().find(|p| p.is_monitorable()) {
        None => SnapshotClass::NoValidPosition,
        Some(p) if tracked_asset == Some(p.asset_id.as_str()) => SnapshotClass::SamePosition(p),
        Some(p) => SnapshotClass::NewPosition(p),
    }
}

/// Why a tracked position stopped being tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Venue no longer reports any position
    PositionClosed,
    /// Venue reports positions but none with usable prices
    MarketResolved,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PositionClosed => f.write_str("Position Closed"),
            Self::MarketResolved => f.write_str("Market Resolved"),
        }
    }
}

/// Lifecycle event produced by observing a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    /// Nothing tracked and nothing to track
    Idle(CloseReason),
    /// The tracked position disappeared; carries its last known state
    Closed {
        position: TrackedPosition,
        reason: CloseReason,
    },
    /// A new asset became the tracked position
    Opened {
        position: TrackedPosition,
        replaced: Option<TrackedPosition>,
    },
    /// The tracked position was refreshed
    Refreshed(TrackedPosition),
}

/// Holds at most one tracked position across polls.
#[derive(Debug, Default)]
pub struct PositionTracker {
    current: Option<TrackedPosition>,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asset id of the tracked position.
    pub fn tracked_asset(&self) -> Option<&str> {
        self.current.as_ref().map(|p| p.asset_id.as_str())
    }

    pub fn is_tracking(&self) -> bool {
        self.current.is_some()
    }

    /// Consume a snapshot and update tracking state.
    pub fn observe(&mut self, snapshot: &[Position]) -> TrackerEvent {
        match classify(snapshot, self.tracked_asset()) {
            SnapshotClass::NoPositions => self.close(CloseReason::PositionClosed),
            SnapshotClass::NoValidPosition => self.close(CloseReason::MarketResolved),
            SnapshotClass::NewPosition(p) => {
                let position = TrackedPosition::from_position(p);
                let replaced = self.current.replace(position.clone());
                info!(
                    asset = %position.asset_id,
                    market = %position.market_title,
                    replaced = ?replaced.as_ref().map(|r| r.asset_id.as_str()),
                    "Tracking new position"
                );
                TrackerEvent::Opened { position, replaced }
            }
            SnapshotClass::SamePosition(p) => match self.current.as_mut() {
                Some(current) => {
                    current.refresh(p);
                    TrackerEvent::Refreshed(current.clone())
                }
                // classify only reports SamePosition when something is tracked
                None => {
                    let position = TrackedPosition::from_position(p);
                    self.current = Some(position.clone());
                    TrackerEvent::Opened {
                        position,
                        replaced: None,
                    }
                }
            },
        }
    }

    /// Stop tracking without a close event (after a successful liquidation).
    pub fn clear(&mut self) -> Option<TrackedPosition> {
        let cleared = self.current.take();
        if let Some(p) = &cleared {
            debug!(asset = %p.asset_id, "Tracking cleared");
        }
        cleared
    }

    fn close(&mut self, reason: CloseReason) -> TrackerEvent {
        match self.current.take() {
            Some(position) => TrackerEvent::Closed { position, reason },
            None => TrackerEvent::Idle(reason),
        }
    }
}
