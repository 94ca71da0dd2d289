//! Deterministic sample dataset, used when the workbook is missing or unreadable.

use chrono::NaiveDate;

use crate::core::{Field, Lovs, Schedule, ScheduleRecord};

const USERS: [&str; 6] = ["M. Sorrentino", "A. Bianchi", "L. Verdi", "G. Russo", "F. Esposito", "C. Romano"];
const PMS: [&str; 3] = ["S. Ferrari", "P. Colombo", "R. Ricci"];
const CLIENTS: [&str; 4] = ["Acme", "Initech", "Globex", "Umbrella"];
const PROJECTS: [&str; 8] = [
    "CRM Migration",
    "Data Platform",
    "Mobile App",
    "ERP Rollout",
    "Security Audit",
    "BI Dashboards",
    "Cloud Landing Zone",
    "Support Desk",
];
const STATUSES: [&str; 4] = ["Planned", "In Progress", "On Hold", "Closed"];
const ITEM_TYPES: [&str; 3] = ["Project", "Change Request", "Support"];
const DELIVERY_TYPES: [&str; 3] = ["Fixed Price", "Time & Material", "Internal"];

fn lovs() -> Lovs {
    let mut lovs = Lovs::default();
    let list = |values: &[&str]| values.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    lovs.insert(Field::ItemType.name().to_string(), list(&ITEM_TYPES[..]));
    lovs.insert(Field::DeliveryType.name().to_string(), list(&DELIVERY_TYPES[..]));
    lovs.insert(Field::Status.name().to_string(), list(&STATUSES[..]));
    lovs
}

/// Twenty-four allocation rows spread over `year`
pub fn sample_schedule(year: i32) -> Schedule {
    let records = (0..24usize)
        .map(|i| {
            let start_month = (i % 12) as u32 + 1;
            let length = 2 + (i % 5) as u32;
            let end_month = (start_month + length).min(12);
            let start = NaiveDate::from_ymd_opt(year, start_month, 1 + (i % 27) as u32);
            let end = NaiveDate::from_ymd_opt(year, end_month, 28);

            let mut months = [None; 12];
            for (m, slot) in months.iter_mut().enumerate() {
                let m = m as u32 + 1;
                if m >= start_month && m <= end_month {
                    *slot = Some(((i * 7 + m as usize * 3) % 15 + 2) as i64);
                }
            }
            let planned = months.iter().flatten().sum::<i64>();
            let progress = ((i * 13) % 101) as i64;

            ScheduleRecord {
                project_descr: Some(PROJECTS[i % PROJECTS.len()].to_string()),
                client: Some(CLIENTS[i % CLIENTS.len()].to_string()),
                item_type: Some(ITEM_TYPES[i % ITEM_TYPES.len()].to_string()),
                delivery_type: Some(DELIVERY_TYPES[(i / 2) % DELIVERY_TYPES.len()].to_string()),
                user: Some(USERS[i % USERS.len()].to_string()),
                pm: Some(PMS[i % PMS.len()].to_string()),
                status: Some(STATUSES[(i / 3) % STATUSES.len()].to_string()),
                planned_fte: Some(planned),
                actual_fte: Some(planned * progress / 100),
                progress: Some(progress),
                year: Some(year as i64),
                start_date: start,
                end_date: end,
                months,
            }
        })
        .collect();
    Schedule::new(records, lovs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_respects_its_own_lovs() {
        let s = sample_schedule(2025);
        assert_eq!(s.len(), 24);
        for r in &s.records {
            for field in [Field::ItemType, Field::DeliveryType, Field::Status] {
                assert!(s.lovs.is_allowed(field, r.text(field).unwrap()));
            }
            assert!(r.start_date.unwrap() <= r.end_date.unwrap());
            assert!((0..=100).contains(&r.progress.unwrap()));
        }
        assert_eq!(s.distinct(Field::User).len(), USERS.len());
    }

    #[test]
    fn test_sample_is_deterministic() {
        assert_eq!(sample_schedule(2025), sample_schedule(2025));
    }
}
