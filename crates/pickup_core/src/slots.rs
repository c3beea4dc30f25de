//! crates/pickup_core/src/slots.rs
//!
//! Pickup slot generation. Everything here is a pure function of the wall clock
//! and the slot settings, so callers regenerate slots on every request.

use crate::domain::PickupSlot;
use chrono::{NaiveDateTime, Timelike};
use serde::Serialize;
use std::collections::HashMap;

pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Opening hours used to discard generated slots. A slot is kept when its start
/// falls in `[open_minute, close_minute)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessHours {
    pub open_minute: u32,
    pub close_minute: u32,
}

impl BusinessHours {
    pub fn contains(&self, start_minute: u32) -> bool {
        start_minute >= self.open_minute && start_minute < self.close_minute
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotSettings {
    pub prep_buffer_minutes: u32,
    pub slot_minutes: u32,
    pub window_hours: u32,
    pub slot_limit: u32,
    pub business_hours: Option<BusinessHours>,
}

impl Default for SlotSettings {
    fn default() -> Self {
        Self {
            prep_buffer_minutes: 10,
            slot_minutes: 15,
            window_hours: 2,
            slot_limit: 5,
            business_hours: None,
        }
    }
}

/// A generated slot annotated with live usage. `closed` and `full` are independent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotAvailability {
    #[serde(flatten)]
    pub slot: PickupSlot,
    pub used: u32,
    pub closed: bool,
    pub full: bool,
}

impl SlotAvailability {
    pub fn is_orderable(&self) -> bool {
        !self.closed && !self.full
    }
}

pub fn minute_of_day(now: NaiveDateTime) -> u32 {
    now.hour() * 60 + now.minute()
}

pub fn format_hhmm(minute: u32) -> String {
    format!("{:02}:{:02}", minute / 60, minute % 60)
}

/// Parses `HH:MM` into minutes since midnight. `24:00` is accepted as a closing time.
pub fn parse_hhmm(value: &str) -> Option<u32> {
    let (h, m) = value.trim().split_once(':')?;
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if m >= 60 || h > 24 || (h == 24 && m != 0) {
        return None;
    }
    Some(h * 60 + m)
}

pub fn slot_label(start_minute: u32, slot_minutes: u32) -> String {
    format!(
        "{} - {}",
        format_hhmm(start_minute),
        format_hhmm(start_minute + slot_minutes)
    )
}

/// Computes the orderable pickup windows for `now`.
///
/// The first slot starts at the smallest multiple of `slot_minutes` that is not
/// earlier than `now + prep_buffer_minutes`; slots follow every `slot_minutes`
/// while their start is before `first + window_hours * 60`. The last slot is always
/// full width even when the window is not a multiple of the slot size. Slots that
/// would start at or after midnight belong to the next day and are not produced.
pub fn generate_slots(
    now: NaiveDateTime,
    prep_buffer_minutes: u32,
    slot_minutes: u32,
    window_hours: u32,
    slot_limit: u32,
) -> Vec<PickupSlot> {
    if slot_minutes == 0 {
        return Vec::new();
    }
    let earliest = minute_of_day(now) + prep_buffer_minutes;
    let start = earliest.div_ceil(slot_minutes) * slot_minutes;
    let end = start + window_hours * 60;

    (start..end)
        .step_by(slot_minutes as usize)
        .take_while(|t| *t < MINUTES_PER_DAY)
        .map(|t| PickupSlot {
            label: slot_label(t, slot_minutes),
            start_minute: t,
            limit: slot_limit,
        })
        .collect()
}

/// A slot is closed for new orders once its start is earlier than `now + prep buffer`.
pub fn is_closed(start_minute: u32, now: NaiveDateTime, prep_buffer_minutes: u32) -> bool {
    start_minute < minute_of_day(now) + prep_buffer_minutes
}

impl SlotSettings {
    /// Generated slots with the business-hours filter applied.
    pub fn offered_slots(&self, now: NaiveDateTime) -> Vec<PickupSlot> {
        let mut slots = generate_slots(
            now,
            self.prep_buffer_minutes,
            self.slot_minutes,
            self.window_hours,
            self.slot_limit,
        );
        if let Some(hours) = self.business_hours {
            slots.retain(|s| hours.contains(s.start_minute));
        }
        slots
    }

    pub fn find_offered(&self, now: NaiveDateTime, start_minute: u32) -> Option<PickupSlot> {
        self.offered_slots(now)
            .into_iter()
            .find(|s| s.start_minute == start_minute)
    }

    pub fn is_closed(&self, start_minute: u32, now: NaiveDateTime) -> bool {
        is_closed(start_minute, now, self.prep_buffer_minutes)
    }

    /// Annotates the offered slots with `usage`, keyed by slot start minute.
    pub fn availability(
        &self,
        now: NaiveDateTime,
        usage: &HashMap<u32, u32>,
    ) -> Vec<SlotAvailability> {
        self.offered_slots(now)
            .into_iter()
            .map(|slot| {
                let used = usage.get(&slot.start_minute).copied().unwrap_or(0);
                SlotAvailability {
                    used,
                    closed: self.is_closed(slot.start_minute, now),
                    full: used >= slot.limit,
                    slot,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 17)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn first_slot_rounds_up_past_buffer() {
        let slots = generate_slots(at(10, 7), 10, 15, 2, 3);
        assert_eq!(slots[0].start_minute, 10 * 60 + 30);
        assert_eq!(slots[0].label, "10:30 - 10:45");
        assert_eq!(slots[0].limit, 3);
        assert_eq!(slots.len(), 8);
        assert_eq!(slots.last().unwrap().label, "12:15 - 12:30");
    }

    #[test]
    fn exact_boundary_is_kept() {
        // 10:05 + 10 = 10:15, already on a boundary.
        let slots = generate_slots(at(10, 5), 10, 15, 1, 3);
        assert_eq!(slots[0].start_minute, 615);
    }

    #[test]
    fn same_inputs_same_slots() {
        assert_eq!(
            generate_slots(at(9, 41), 10, 15, 2, 5),
            generate_slots(at(9, 41), 10, 15, 2, 5)
        );
    }

    #[test]
    fn uneven_window_keeps_full_width_last_slot() {
        // 1h window with 25 minute slots: starts at 0, 25, 50 from the first slot.
        let slots = generate_slots(at(8, 0), 0, 25, 1, 5);
        let starts: Vec<u32> = slots.iter().map(|s| s.start_minute).collect();
        assert_eq!(starts, vec![500, 525, 550]);
        assert_eq!(slots[2].label, "09:10 - 09:35");
    }

    #[test]
    fn no_slots_past_midnight() {
        let slots = generate_slots(at(23, 20), 10, 15, 2, 5);
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[1].label, "23:45 - 24:00");
        assert!(generate_slots(at(23, 55), 10, 15, 2, 5).is_empty());
    }

    #[test]
    fn zero_slot_size_yields_nothing() {
        assert!(generate_slots(at(10, 0), 10, 0, 2, 5).is_empty());
    }

    #[test]
    fn closed_is_relative_to_buffer() {
        let now = at(10, 7);
        assert!(is_closed(615, now, 10));
        assert!(!is_closed(617, now, 10));
        assert!(!is_closed(630, now, 10));
    }

    #[test]
    fn business_hours_filter_after_generation() {
        let settings = SlotSettings {
            business_hours: Some(BusinessHours {
                open_minute: parse_hhmm("07:00").unwrap(),
                close_minute: parse_hhmm("17:00").unwrap(),
            }),
            ..SlotSettings::default()
        };
        let slots = settings.offered_slots(at(15, 50));
        assert_eq!(slots.first().unwrap().label, "16:00 - 16:15");
        assert_eq!(slots.last().unwrap().label, "16:45 - 17:00");

        let early = settings.offered_slots(at(4, 0));
        assert!(early.is_empty());
    }

    #[test]
    fn availability_flags_full_and_closed_separately() {
        let settings = SlotSettings {
            slot_limit: 2,
            ..SlotSettings::default()
        };
        let usage = HashMap::from([(630, 2), (645, 1)]);
        let listed = settings.availability(at(10, 7), &usage);
        assert!(listed[0].full && !listed[0].closed);
        assert_eq!(listed[1].used, 1);
        assert!(listed[1].is_orderable());

        // The same slot seen a few minutes later is closed but not full.
        assert!(settings.is_closed(645, at(10, 40)));
    }

    #[test]
    fn parse_hhmm_rejects_garbage() {
        assert_eq!(parse_hhmm("7:05"), Some(425));
        assert_eq!(parse_hhmm("24:00"), Some(1440));
        assert_eq!(parse_hhmm("24:30"), None);
        assert_eq!(parse_hhmm("10:60"), None);
        assert_eq!(parse_hhmm("noon"), None);
    }
}
