//! Schedule quality statistics.

use serde::{Deserialize, Serialize};

use crate::matching::CatsRange;
use crate::models::{Availability, FactSnapshot, ScheduleAttempt};

/// Summary of a schedule attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleStats {
    /// Slots holding at least one talk.
    pub occupied: usize,
    /// (session, room) pairs offered by the assessment.
    pub available: usize,
    pub talks: usize,
    pub assessors: usize,
    /// Panel assignments made in an if-needed session.
    pub if_needed_faculty: usize,
    /// Talks placed in an if-needed session.
    pub if_needed_submitters: usize,
    /// Slots per assessor.
    pub panel_load: CatsRange,
}

impl ScheduleStats {
    pub fn calculate(attempt: &ScheduleAttempt, facts: &FactSnapshot) -> Self {
        let available = facts
            .assessment(&attempt.assessment_id)
            .map(|a| {
                a.session_ids
                    .iter()
                    .filter_map(|s| facts.session(s))
                    .map(|s| s.room_ids.len())
                    .sum()
            })
            .unwrap_or(0);

        let mut stats = Self {
            available,
            ..Self::default()
        };
        for slot in attempt.slots.iter().filter(|s| !s.is_empty()) {
            stats.occupied += 1;
            stats.talks += slot.talks.len();
            stats.if_needed_faculty += slot
                .assessors
                .iter()
                .filter(|f| facts.availability.faculty(f, &slot.session_id) == Availability::IfNeeded)
                .count();
            stats.if_needed_submitters += slot
                .talks
                .iter()
                .filter(|t| facts.availability.submitter(t, &slot.session_id) == Availability::IfNeeded)
                .count();
        }

        let loads = attempt.assessor_loads();
        stats.assessors = loads.len();
        for load in loads.values() {
            stats.panel_load.observe(*load as u32);
        }
        stats
    }

    /// Occupied fraction of the available slots (0.0..1.0).
    pub fn utilization(&self) -> f64 {
        if self.available == 0 {
            return 0.0;
        }
        self.occupied as f64 / self.available as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Assessment, PresentationSession, Room, ScheduleSlot};
    use chrono::NaiveDate;

    #[test]
    fn test_utilization_and_if_needed() {
        let day = NaiveDate::from_ymd_opt(2025, 5, 12).unwrap();
        let facts = FactSnapshot::new()
            .with_room(Room::new("R1", 5))
            .with_room(Room::new("R2", 5))
            .with_session(PresentationSession::new("D1", day).with_room("R1").with_room("R2"))
            .with_session(PresentationSession::new("D2", day).with_room("R1"))
            .with_assessment(Assessment::new("AS").with_session("D1").with_session("D2"))
            .with_faculty_availability("F2", "D1", Availability::IfNeeded)
            .with_submitter_availability("K2", "D2", Availability::IfNeeded);

        let mut attempt = ScheduleAttempt::new("A", "a", "AS");
        attempt.slots = vec![
            ScheduleSlot::new("A", "D1", "R1").with_assessor("F1").with_assessor("F2").with_talk("K1"),
            ScheduleSlot::new("A", "D2", "R1").with_assessor("F1").with_talk("K2").with_talk("K3"),
            ScheduleSlot::new("A", "D1", "R2"),
        ];

        let stats = ScheduleStats::calculate(&attempt, &facts);
        assert_eq!(stats.available, 3);
        assert_eq!(stats.occupied, 2);
        assert_eq!(stats.talks, 3);
        assert_eq!(stats.assessors, 2);
        assert_eq!(stats.if_needed_faculty, 1);
        assert_eq!(stats.if_needed_submitters, 1);
        assert_eq!(stats.panel_load, CatsRange { min: Some(1), max: Some(2) });
        assert!((stats.utilization() - 2.0 / 3.0).abs() < 1e-10);
    }
}
