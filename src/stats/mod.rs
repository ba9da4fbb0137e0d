//! Dashboard numbers derived from saved meals: daily receipt, stamp
//! calendar, weekly/monthly buckets and the pet mood.

mod dto;

pub use dto::{ChartBucket, DaySummary, PeriodStats, PetMood, StampDay, StampIntensity};

use time::{util::days_in_year_month, Date, Duration, Month, UtcOffset};

use crate::meals::MealRecord;

const WEEKDAY_LABELS: [&str; 7] = ["MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN"];

fn local_date(record: &MealRecord, offset: UtcOffset) -> Date {
    record.eaten_at.to_offset(offset).date()
}

fn bucket<'a, I>(label: String, records: I) -> ChartBucket
where
    I: Iterator<Item = &'a MealRecord>,
{
    records.fold(ChartBucket::empty(label), |mut b, r| {
        b.kcal += r.total_kcal;
        if let Some(m) = r.macros {
            b.carbs += m.carbs;
            b.protein += m.protein;
            b.fat += m.fat;
        }
        b
    })
}

pub fn week_start(day: Date) -> Date {
    day - Duration::days(day.weekday().number_days_from_monday() as i64)
}

pub fn week_end(day: Date) -> Date {
    week_start(day) + Duration::days(6)
}

fn month_bounds(anchor: Date) -> (Date, Date) {
    let days = days_in_year_month(anchor.year(), anchor.month());
    // day 1 and the last day always exist for a valid anchor
    let first = anchor.replace_day(1).unwrap_or(anchor);
    let last = anchor.replace_day(days).unwrap_or(anchor);
    (first, last)
}

/// Range to request for the statistics page: Monday on or before the first
/// of the month through the Sunday on or after its last day.
pub fn fetch_window(anchor: Date) -> (Date, Date) {
    let (first, last) = month_bounds(anchor);
    (week_start(first), week_end(last))
}

pub fn daily_summary(records: &[MealRecord], day: Date, offset: UtcOffset) -> DaySummary {
    let meals: Vec<MealRecord> = records
        .iter()
        .filter(|r| local_date(r, offset) == day)
        .cloned()
        .collect();
    let totals = bucket(day.to_string(), meals.iter());
    DaySummary {
        date: day,
        total_kcal: totals.kcal,
        carbs: totals.carbs,
        protein: totals.protein,
        fat: totals.fat,
        meals,
    }
}

/// One entry per day of the anchor's month.
pub fn stamp_calendar(records: &[MealRecord], anchor: Date, offset: UtcOffset) -> Vec<StampDay> {
    let (first, last) = month_bounds(anchor);
    let mut days = Vec::with_capacity(last.day() as usize);
    let mut day = first;
    while day <= last {
        let todays: Vec<&MealRecord> = records
            .iter()
            .filter(|r| local_date(r, offset) == day)
            .collect();
        let kcal: f64 = todays.iter().map(|r| r.total_kcal).sum();
        days.push(StampDay {
            date: day,
            meal_count: todays.len(),
            total_kcal: kcal,
            intensity: StampIntensity::classify(!todays.is_empty(), kcal),
        });
        day = day + Duration::days(1);
    }
    days
}

/// Seven Monday-first buckets for the week containing `anchor`.
pub fn weekly_chart(records: &[MealRecord], anchor: Date, offset: UtcOffset) -> Vec<ChartBucket> {
    let start = week_start(anchor);
    WEEKDAY_LABELS
        .iter()
        .enumerate()
        .map(|(i, label)| {
            let day = start + Duration::days(i as i64);
            bucket(
                label.to_string(),
                records.iter().filter(|r| local_date(r, offset) == day),
            )
        })
        .collect()
}

/// `W1..Wn`, one bucket per Monday-first week that touches the month.
pub fn monthly_chart(records: &[MealRecord], anchor: Date, offset: UtcOffset) -> Vec<ChartBucket> {
    let (_, last) = month_bounds(anchor);
    let (mut start, _) = fetch_window(anchor);
    let mut out = Vec::new();
    while start <= last {
        let end = start + Duration::days(6);
        out.push(bucket(
            format!("W{}", out.len() + 1),
            records.iter().filter(|r| {
                let d = local_date(r, offset);
                d >= start && d <= end
            }),
        ));
        start = start + Duration::days(7);
    }
    out
}

/// Totals and per-day averages over chart buckets. `days` is 7 for a week or
/// the month length for a month.
pub fn period_stats(buckets: &[ChartBucket], days: u8) -> PeriodStats {
    let days = f64::from(days.max(1));
    let total: f64 = buckets.iter().map(|b| b.kcal).sum();
    let carbs: f64 = buckets.iter().map(|b| b.carbs).sum();
    let protein: f64 = buckets.iter().map(|b| b.protein).sum();
    let fat: f64 = buckets.iter().map(|b| b.fat).sum();

    // later bucket wins ties
    let max = buckets
        .iter()
        .fold(None::<&ChartBucket>, |best, b| match best {
            Some(cur) if cur.kcal > b.kcal => Some(cur),
            _ => Some(b),
        });

    PeriodStats {
        total_kcal: total,
        daily_avg_kcal: (total / days).round(),
        daily_carbs: (carbs / days).round(),
        daily_protein: (protein / days).round(),
        daily_fat: (fat / days).round(),
        max_label: max.map(|b| b.label.clone()).unwrap_or_else(|| "-".into()),
        max_kcal: max.map(|b| b.kcal).unwrap_or(0.0),
    }
}

pub fn days_in_month(year: i32, month: Month) -> u8 {
    days_in_year_month(year, month)
}

pub fn coach_note(daily_avg_kcal: f64) -> &'static str {
    if daily_avg_kcal == 0.0 {
        "No data recorded for this period."
    } else if daily_avg_kcal > 2300.0 {
        "Intake is on the higher side. Focus on nutrient-dense foods."
    } else if daily_avg_kcal < 1200.0 {
        "Intake is quite low. Make sure to fuel your body enough."
    } else {
        "You are maintaining a balanced intake. Keep it up!"
    }
}
