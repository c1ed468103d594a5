//! Dispenser container domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::level::Level;
use crate::error::DomainError;

/// Number of physical container slots on a dispenser.
pub const CONTAINER_COUNT: u32 = 5;

/// Pills loaded into a freshly seeded container.
pub const DEFAULT_PILLS: u32 = 30;

/// Dose time of a freshly seeded container.
pub const DEFAULT_NEXT_DOSE: &str = "08:00";

/// Marker stored in `lastDispensed` before the first dispense.
pub const NEVER_DISPENSED: &str = "Never";

/// Format of the human-readable `lastDispensed` label.
pub const DISPENSED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One physical pill slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispenserContainer {
    pub id: u32,
    pub name: String,
    pub pills_remaining: u32,
    pub last_dispensed: String,
    pub next_dose: String,
}

impl DispenserContainer {
    /// The container a first-run dashboard seeds for slot `id`.
    pub fn seeded(id: u32) -> Self {
        Self {
            id,
            name: format!("Container {}", id),
            pills_remaining: DEFAULT_PILLS,
            last_dispensed: NEVER_DISPENSED.to_string(),
            next_dose: DEFAULT_NEXT_DOSE.to_string(),
        }
    }

    /// The full default set, ids `1..=CONTAINER_COUNT`.
    pub fn default_set() -> Vec<Self> {
        (1..=CONTAINER_COUNT).map(Self::seeded).collect()
    }

    /// Records a dispense of `pills` at `at`. The count never drops below zero.
    pub fn dispense(&mut self, pills: u32, at: DateTime<Utc>) {
        self.pills_remaining = self.pills_remaining.saturating_sub(pills);
        self.last_dispensed = dispensed_at_label(at);
    }

    pub fn stock_level(&self) -> Level {
        Level::for_pills(self.pills_remaining)
    }
}

/// Container plus the derived stock level, as returned by the API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSummary {
    #[serde(flatten)]
    pub container: DispenserContainer,
    pub stock_level: Level,
}

impl From<DispenserContainer> for ContainerSummary {
    fn from(container: DispenserContainer) -> Self {
        let stock_level = container.stock_level();
        Self {
            container,
            stock_level,
        }
    }
}

/// Checks that `id` names one of the physical slots.
pub fn validate_container_id(id: u32) -> Result<u32, DomainError> {
    if (1..=CONTAINER_COUNT).contains(&id) {
        Ok(id)
    } else {
        Err(DomainError::UnknownContainer(id))
    }
}

/// Applies one manual dispense to the container with `id` inside `containers`.
pub fn dispense_from(
    containers: &mut [DispenserContainer],
    id: u32,
    at: DateTime<Utc>,
) -> Result<DispenserContainer, DomainError> {
    let container = containers
        .iter_mut()
        .find(|c| c.id == id)
        .ok_or(DomainError::UnknownContainer(id))?;
    container.dispense(1, at);
    Ok(container.clone())
}

/// `max(0, previous - pills)` for counts stored as signed numbers.
pub fn decrement_pills(previous: i64, pills: i64) -> i64 {
    previous.saturating_sub(pills).max(0)
}

/// Human-readable timestamp written to `lastDispensed`.
pub fn dispensed_at_label(at: DateTime<Utc>) -> String {
    at.format(DISPENSED_AT_FORMAT).to_string()
}
