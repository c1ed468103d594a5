//! Medication schedule domain model.

use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

use super::container::CONTAINER_COUNT;
use crate::error::DomainError;
use shared::validation::{parse_time_of_day, MAX_WEEKDAY};

/// Every weekday, 0 = Monday .. 6 = Sunday.
pub const ALL_DAYS: [u8; 7] = [0, 1, 2, 3, 4, 5, 6];

pub const DEFAULT_SCHEDULE_TIME: &str = "08:00";
pub const DEFAULT_MEDICATION_NAME: &str = "New Medication";
pub const DEFAULT_PATIENT_NAME: &str = "Patient Name";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PillSize {
    Small,
    #[default]
    Medium,
    Large,
}

/// A recurring dispense rule authored by a user.
///
/// `days` missing from the stored record means an empty set: the realtime
/// database drops empty arrays, and an empty set is a valid schedule that
/// never fires. Stored days are sorted and deduplicated on read.
///
/// `device_id` names the device holding the mirrored copy. Records written
/// before it was stored have none and belong to the default device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub dispenser_id: u32,
    pub time: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub medication_name: String,
    #[serde(default)]
    pub patient_name: String,
    #[serde(default)]
    pub pill_size: PillSize,
    #[serde(default, deserialize_with = "deserialize_days")]
    pub days: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

fn default_enabled() -> bool {
    true
}

fn deserialize_days<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    Vec::<u8>::deserialize(deserializer).map(normalize_days)
}

impl Schedule {
    /// Flips `day` in the weekday set.
    pub fn toggle_day(&mut self, day: u8) -> Result<(), DomainError> {
        toggle_day(&mut self.days, day)
    }

    /// Returns true when the schedule fires on `day`.
    pub fn runs_on(&self, day: u8) -> bool {
        self.enabled && self.days.contains(&day)
    }

    /// Applies a partial update on top of the current fields.
    pub fn apply(&mut self, update: UpdateScheduleRequest) {
        if let Some(dispenser_id) = update.dispenser_id {
            self.dispenser_id = dispenser_id;
        }
        if let Some(time) = update.time {
            self.time = time;
        }
        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
        if let Some(name) = update.medication_name {
            self.medication_name = name;
        }
        if let Some(name) = update.patient_name {
            self.patient_name = name;
        }
        if let Some(size) = update.pill_size {
            self.pill_size = size;
        }
        if let Some(days) = update.days {
            self.days = normalize_days(days);
        }
    }
}

/// Removes `day` from `days` if present, otherwise inserts it in ascending
/// position. Applying it twice with the same day restores `days` exactly.
pub fn toggle_day(days: &mut Vec<u8>, day: u8) -> Result<(), DomainError> {
    if day > MAX_WEEKDAY {
        return Err(DomainError::InvalidDay(day));
    }
    if let Some(index) = days.iter().position(|d| *d == day) {
        days.remove(index);
    } else {
        let index = days.iter().position(|d| *d > day).unwrap_or(days.len());
        days.insert(index, day);
    }
    Ok(())
}

/// Sorts and deduplicates a weekday set.
pub fn normalize_days(mut days: Vec<u8>) -> Vec<u8> {
    days.sort_unstable();
    days.dedup();
    days
}

/// Stored schedule together with its key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleEntry {
    pub id: String,
    #[serde(flatten)]
    pub schedule: Schedule,
}

fn default_time() -> String {
    DEFAULT_SCHEDULE_TIME.to_string()
}

fn default_medication_name() -> String {
    DEFAULT_MEDICATION_NAME.to_string()
}

fn default_patient_name() -> String {
    DEFAULT_PATIENT_NAME.to_string()
}

fn default_days() -> Vec<u8> {
    ALL_DAYS.to_vec()
}

fn validate_time(time: &str) -> Result<(), validator::ValidationError> {
    shared::validation::validate_time_of_day(time)
}

fn validate_days(days: &[u8]) -> Result<(), validator::ValidationError> {
    shared::validation::validate_weekdays(days)
}

/// Request payload for creating a schedule.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateScheduleRequest {
    #[validate(range(min = 1, max = 5, message = "Dispenser must be between 1 and 5"))]
    pub dispenser_id: u32,

    #[serde(default = "default_time")]
    #[validate(custom(function = "validate_time"))]
    pub time: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_medication_name")]
    #[validate(length(max = 100, message = "Medication name must be at most 100 characters"))]
    pub medication_name: String,

    #[serde(default = "default_patient_name")]
    #[validate(length(max = 100, message = "Patient name must be at most 100 characters"))]
    pub patient_name: String,

    #[serde(default)]
    pub pill_size: PillSize,

    #[serde(default = "default_days")]
    #[validate(custom(function = "validate_days"))]
    pub days: Vec<u8>,
}

impl From<CreateScheduleRequest> for Schedule {
    fn from(request: CreateScheduleRequest) -> Self {
        Self {
            dispenser_id: request.dispenser_id,
            time: request.time,
            enabled: request.enabled,
            medication_name: request.medication_name,
            patient_name: request.patient_name,
            pill_size: request.pill_size,
            days: normalize_days(request.days),
            device_id: None,
        }
    }
}

/// Request payload for a partial schedule update.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateScheduleRequest {
    #[validate(range(min = 1, max = 5, message = "Dispenser must be between 1 and 5"))]
    pub dispenser_id: Option<u32>,

    #[validate(custom(function = "validate_time"))]
    pub time: Option<String>,

    pub enabled: Option<bool>,

    #[validate(length(max = 100, message = "Medication name must be at most 100 characters"))]
    pub medication_name: Option<String>,

    #[validate(length(max = 100, message = "Patient name must be at most 100 characters"))]
    pub patient_name: Option<String>,

    pub pill_size: Option<PillSize>,

    #[validate(custom(function = "validate_days"))]
    pub days: Option<Vec<u8>>,
}

/// Device-facing copy of a schedule: 0-based container index and the time
/// split into `hour` and `minute`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSchedule {
    pub dispenser_id: u32,
    pub hour: u8,
    pub minute: u8,
    pub enabled: bool,
    pub medication_name: String,
    pub patient_name: String,
    pub pill_size: PillSize,
    pub days: Vec<u8>,
}

impl TryFrom<&Schedule> for DeviceSchedule {
    type Error = DomainError;

    fn try_from(schedule: &Schedule) -> Result<Self, Self::Error> {
        if schedule.dispenser_id == 0 || schedule.dispenser_id > CONTAINER_COUNT {
            return Err(DomainError::UnknownContainer(schedule.dispenser_id));
        }
        let (hour, minute) = parse_time_of_day(&schedule.time)
            .ok_or_else(|| DomainError::InvalidTime(schedule.time.clone()))?;
        Ok(Self {
            dispenser_id: schedule.dispenser_id - 1,
            hour,
            minute,
            enabled: schedule.enabled,
            medication_name: schedule.medication_name.clone(),
            patient_name: schedule.patient_name.clone(),
            pill_size: schedule.pill_size,
            days: schedule.days.clone(),
        })
    }
}

/// Number of enabled schedules per container, indexed by container id.
pub fn enabled_counts<'a>(schedules: impl IntoIterator<Item = &'a Schedule>) -> Vec<(u32, usize)> {
    let mut counts = vec![0usize; CONTAINER_COUNT as usize];
    for schedule in schedules {
        if schedule.enabled && (1..=CONTAINER_COUNT).contains(&schedule.dispenser_id) {
            counts[(schedule.dispenser_id - 1) as usize] += 1;
        }
    }
    (1..=CONTAINER_COUNT).zip(counts).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schedule() -> Schedule {
        Schedule {
            dispenser_id: 2,
            time: "07:45".into(),
            enabled: true,
            medication_name: "Metformin".into(),
            patient_name: "Ana".into(),
            pill_size: PillSize::Small,
            days: vec![0, 2, 4],
            device_id: None,
        }
    }

    #[test]
    fn test_toggle_day_inserts_sorted() {
        let mut days = vec![0, 2, 4];
        toggle_day(&mut days, 3).unwrap();
        assert_eq!(days, vec![0, 2, 3, 4]);
        toggle_day(&mut days, 6).unwrap();
        assert_eq!(days, vec![0, 2, 3, 4, 6]);
    }

    #[test]
    fn test_toggle_day_removes_present() {
        let mut days = vec![0, 2, 4];
        toggle_day(&mut days, 2).unwrap();
        assert_eq!(days, vec![0, 4]);
    }

    #[test]
    fn test_toggle_day_is_its_own_inverse() {
        let originals: [Vec<u8>; 4] = [vec![], vec![0, 1, 2, 3, 4, 5, 6], vec![1, 5], vec![6]];
        for original in originals {
            for day in 0..=6 {
                let mut days = original.clone();
                toggle_day(&mut days, day).unwrap();
                toggle_day(&mut days, day).unwrap();
                assert_eq!(days, original, "day {day}");
            }
        }
    }

    #[test]
    fn test_toggle_day_never_duplicates() {
        let mut days = vec![];
        for day in [3, 1, 3, 5, 1, 1] {
            toggle_day(&mut days, day).unwrap();
        }
        let mut sorted = days.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(days, sorted);
    }

    #[test]
    fn test_toggle_day_allows_empty_set() {
        let mut s = schedule();
        s.days = vec![4];
        s.toggle_day(4).unwrap();
        assert!(s.days.is_empty());
        assert!(!s.runs_on(4));
    }

    #[test]
    fn test_toggle_day_rejects_out_of_range() {
        let mut days = vec![1];
        assert_eq!(toggle_day(&mut days, 7), Err(DomainError::InvalidDay(7)));
        assert_eq!(days, vec![1]);
    }

    #[test]
    fn test_missing_days_deserialize_as_empty() {
        let s: Schedule =
            serde_json::from_value(json!({"dispenser_id": 1, "time": "08:00"})).unwrap();
        assert!(s.days.is_empty());
        assert!(s.enabled);
        assert_eq!(s.pill_size, PillSize::Medium);
    }

    #[test]
    fn test_stored_days_are_sorted_on_read() {
        let mut s: Schedule = serde_json::from_value(
            json!({"dispenser_id": 1, "time": "08:00", "days": [4, 0, 2, 4]}),
        )
        .unwrap();
        assert_eq!(s.days, vec![0, 2, 4]);

        s.toggle_day(3).unwrap();
        assert_eq!(s.days, vec![0, 2, 3, 4]);
    }

    #[test]
    fn test_device_id_round_trips_only_when_set() {
        let mut s = schedule();
        assert!(serde_json::to_value(&s).unwrap().get("device_id").is_none());

        s.device_id = Some("PD_A".into());
        let value = serde_json::to_value(&s).unwrap();
        assert_eq!(value["device_id"], "PD_A");
        let back: Schedule = serde_json::from_value(value).unwrap();
        assert_eq!(back.device_id.as_deref(), Some("PD_A"));
    }

    #[test]
    fn test_create_request_defaults() {
        let request: CreateScheduleRequest =
            serde_json::from_value(json!({"dispenser_id": 3})).unwrap();
        assert!(request.validate().is_ok());
        let s = Schedule::from(request);
        assert_eq!(s.time, "08:00");
        assert_eq!(s.days, ALL_DAYS.to_vec());
        assert_eq!(s.medication_name, "New Medication");
        assert_eq!(s.patient_name, "Patient Name");
    }

    #[test]
    fn test_create_request_validation() {
        let bad_time: CreateScheduleRequest =
            serde_json::from_value(json!({"dispenser_id": 1, "time": "25:00"})).unwrap();
        assert!(bad_time.validate().is_err());

        let bad_day: CreateScheduleRequest =
            serde_json::from_value(json!({"dispenser_id": 1, "days": [0, 8]})).unwrap();
        assert!(bad_day.validate().is_err());

        let bad_container: CreateScheduleRequest =
            serde_json::from_value(json!({"dispenser_id": 6})).unwrap();
        assert!(bad_container.validate().is_err());
    }

    #[test]
    fn test_create_request_normalizes_days() {
        let request: CreateScheduleRequest =
            serde_json::from_value(json!({"dispenser_id": 1, "days": [4, 1, 4]})).unwrap();
        assert_eq!(Schedule::from(request).days, vec![1, 4]);
    }

    #[test]
    fn test_apply_partial_update() {
        let mut s = schedule();
        s.apply(UpdateScheduleRequest {
            time: Some("21:15".into()),
            enabled: Some(false),
            ..Default::default()
        });
        assert_eq!(s.time, "21:15");
        assert!(!s.enabled);
        assert_eq!(s.medication_name, "Metformin");
        assert_eq!(s.days, vec![0, 2, 4]);
    }

    #[test]
    fn test_device_schedule_shape() {
        let device = DeviceSchedule::try_from(&schedule()).unwrap();
        assert_eq!(device.dispenser_id, 1);
        assert_eq!(device.hour, 7);
        assert_eq!(device.minute, 45);
        let value = serde_json::to_value(&device).unwrap();
        assert!(value.get("time").is_none());
        assert_eq!(value["pill_size"], "small");
    }

    #[test]
    fn test_device_schedule_rejects_bad_time() {
        let mut s = schedule();
        s.time = "7:45".into();
        assert_eq!(
            DeviceSchedule::try_from(&s),
            Err(DomainError::InvalidTime("7:45".into()))
        );
    }

    #[test]
    fn test_enabled_counts() {
        let mut disabled = schedule();
        disabled.enabled = false;
        let mut other = schedule();
        other.dispenser_id = 5;
        let all = [schedule(), schedule(), disabled, other];
        let counts = enabled_counts(all.iter());
        assert_eq!(counts, vec![(1, 0), (2, 2), (3, 0), (4, 0), (5, 1)]);
    }
}
