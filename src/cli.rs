use std::fmt::Write;

use lazy_static::lazy_static;
use regex::Regex;
use time::{format_description::well_known::Rfc3339, Date, OffsetDateTime};

use crate::error::{MealError, Result};
use crate::meals::{MealType, PendingMeal};
use crate::stats::{ChartBucket, DaySummary, PeriodStats, PetMood, StampDay};

pub const HELP: &str = "\
plain text        log what you ate
/analyze          analyze the latest message
/hint <type>      meal type hint (breakfast|lunch|dinner|snack|none)
/add <name> [N kcal]   add an item by hand
/accept <n>       add suggestion n
/remove <n>       remove item n
/type <type>      change the meal type
/time <rfc3339>   change when it was eaten
/save  /cancel  /retry  /show
/today  /week  /month
/delete <id>      delete a saved meal
/copy <id> [YYYY-MM-DD]   copy a saved meal to a day
/quit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Say(String),
    Analyze,
    Hint(Option<MealType>),
    Add { name: String, kcal: Option<f64> },
    Accept(usize),
    Remove(usize),
    Type(MealType),
    Time(OffsetDateTime),
    Save,
    Cancel,
    Retry,
    Show,
    Today,
    Week,
    Month,
    Delete(i64),
    Copy { id: i64, date: Option<Date> },
    Help,
    Quit,
}

lazy_static! {
    static ref ADD_RE: Regex =
        Regex::new(r"(?i)^(?P<name>.+?)(?:\s+(?P<kcal>\d+(?:\.\d+)?)\s*kcal)?\s*$").unwrap();
}

/// Positions are shown starting at 1.
fn position(arg: &str) -> Result<usize> {
    match arg.trim().parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n - 1),
        _ => Err(MealError::validation(format!("not a position: {}", arg.trim()))),
    }
}

fn meal_id(arg: &str) -> Result<i64> {
    arg.trim()
        .parse::<i64>()
        .map_err(|_| MealError::validation(format!("not a meal id: {}", arg.trim())))
}

fn ymd(arg: &str) -> Result<Date> {
    let fmt = time::macros::format_description!("[year]-[month]-[day]");
    Date::parse(arg.trim(), fmt)
        .map_err(|_| MealError::validation(format!("not a date (YYYY-MM-DD): {}", arg.trim())))
}

pub fn parse_command(line: &str) -> Result<Command> {
    let line = line.trim();
    if line.is_empty() {
        return Err(MealError::validation("message is empty"));
    }
    if !line.starts_with('/') {
        return Ok(Command::Say(line.to_string()));
    }

    let (head, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();
    let cmd = match head.to_lowercase().as_str() {
        "/analyze" => Command::Analyze,
        "/hint" => match rest {
            "" | "none" => Command::Hint(None),
            t => Command::Hint(Some(t.parse()?)),
        },
        "/add" => {
            let caps = ADD_RE
                .captures(rest)
                .ok_or_else(|| MealError::validation("usage: /add <name> [N kcal]"))?;
            let kcal = caps
                .name("kcal")
                .and_then(|m| m.as_str().parse::<f64>().ok());
            Command::Add {
                name: caps["name"].trim().to_string(),
                kcal,
            }
        }
        "/accept" => Command::Accept(position(rest)?),
        "/remove" => Command::Remove(position(rest)?),
        "/type" => Command::Type(rest.parse()?),
        "/time" => Command::Time(
            OffsetDateTime::parse(rest, &Rfc3339)
                .map_err(|_| MealError::validation("usage: /time 2026-10-19T08:30:00+09:00"))?,
        ),
        "/save" => Command::Save,
        "/cancel" => Command::Cancel,
        "/retry" => Command::Retry,
        "/show" => Command::Show,
        "/today" => Command::Today,
        "/week" => Command::Week,
        "/month" => Command::Month,
        "/delete" => Command::Delete(meal_id(rest)?),
        "/copy" => {
            let mut parts = rest.split_whitespace();
            let id = meal_id(parts.next().unwrap_or(""))?;
            let date = parts.next().map(ymd).transpose()?;
            Command::Copy { id, date }
        }
        "/help" | "/?" => Command::Help,
        "/quit" | "/exit" => Command::Quit,
        other => return Err(MealError::validation(format!("unknown command {other}, try /help"))),
    };
    Ok(cmd)
}

pub fn render_pending(meal: &PendingMeal) -> String {
    let mut out = String::new();
    let at = meal.eaten_at().format(&Rfc3339).unwrap_or_default();
    let _ = writeln!(out, "[{}] {}", meal.meal_type(), at);
    for (i, item) in meal.food_items().iter().enumerate() {
        let _ = writeln!(out, "  {}. {} ({}) {}kcal", i + 1, item.name, item.qty, item.kcal);
    }
    match meal.macros() {
        Some(m) => {
            let _ = writeln!(
                out,
                "  = {}kcal  C:{}g P:{}g F:{}g",
                meal.total_kcal(),
                m.carbs,
                m.protein,
                m.fat
            );
        }
        None => {
            let _ = writeln!(out, "  = {}kcal", meal.total_kcal());
        }
    }
    if !meal.suggestions().is_empty() {
        let _ = writeln!(out, "  maybe also:");
        for (i, s) in meal.suggestions().iter().enumerate() {
            let _ = writeln!(out, "   +{} {} {}kcal", i + 1, s.name, s.kcal);
        }
    }
    out
}

pub fn render_day(summary: &DaySummary, goal_kcal: f64) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "== {} ==", summary.date);
    if summary.meals.is_empty() {
        let _ = writeln!(out, "( No orders yet )");
    }
    for m in &summary.meals {
        let extra = match m.items_json.len() {
            0 | 1 => String::new(),
            n => format!(" (+{})", n - 1),
        };
        let _ = writeln!(out, "#{:<5} {}{} {}kcal", m.id, m.title(), extra, m.total_kcal);
    }
    let _ = writeln!(
        out,
        "TOTAL {}kcal  C:{}g P:{}g F:{}g",
        summary.total_kcal, summary.carbs, summary.protein, summary.fat
    );
    let mood = PetMood::for_intake(summary.total_kcal, goal_kcal);
    let _ = write!(out, "pet: {}", mood.dialogue());
    out
}

pub fn render_chart(buckets: &[ChartBucket], stats: &PeriodStats, note: &str) -> String {
    let mut out = String::new();
    let peak = buckets.iter().map(|b| b.kcal).fold(0.0_f64, f64::max);
    for b in buckets {
        let width = if peak > 0.0 { (b.kcal / peak * 30.0).round() as usize } else { 0 };
        let _ = writeln!(out, "{:>4} {:<30} {}", b.label, "#".repeat(width), b.kcal);
    }
    let _ = writeln!(
        out,
        "total {}kcal, daily avg {}kcal (C:{}g P:{}g F:{}g), peak {} {}kcal",
        stats.total_kcal,
        stats.daily_avg_kcal,
        stats.daily_carbs,
        stats.daily_protein,
        stats.daily_fat,
        stats.max_label,
        stats.max_kcal
    );
    out.push_str(note);
    out
}

pub fn render_calendar(days: &[StampDay]) -> String {
    let mut out = String::from(" M  T  W  T  F  S  S\n");
    let Some(first) = days.first() else {
        return out;
    };
    let pad = first.date.weekday().number_days_from_monday() as usize;
    out.push_str(&"   ".repeat(pad));
    for (i, d) in days.iter().enumerate() {
        let _ = write!(out, "{}{:<2}", d.intensity.glyph(), d.date.day());
        if (pad + i + 1) % 7 == 0 {
            out.push('\n');
        }
    }
    out
}
