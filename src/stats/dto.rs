use serde::Serialize;
use time::Date;

use crate::meals::MealRecord;

#[derive(Debug, Clone, Serialize)]
pub struct DaySummary {
    pub date: Date,
    pub meals: Vec<MealRecord>,
    pub total_kcal: f64,
    pub carbs: f64,
    pub protein: f64,
    pub fat: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StampIntensity {
    None,
    Light,
    Medium,
    Strong,
    Full,
}

impl StampIntensity {
    pub fn classify(has_log: bool, kcal: f64) -> Self {
        if !has_log {
            StampIntensity::None
        } else if kcal >= 2000.0 {
            StampIntensity::Full
        } else if kcal >= 1200.0 {
            StampIntensity::Strong
        } else if kcal >= 600.0 {
            StampIntensity::Medium
        } else {
            StampIntensity::Light
        }
    }

    pub fn glyph(&self) -> char {
        match self {
            StampIntensity::None => '·',
            StampIntensity::Light => '░',
            StampIntensity::Medium => '▒',
            StampIntensity::Strong => '▓',
            StampIntensity::Full => '█',
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StampDay {
    pub date: Date,
    pub meal_count: usize,
    pub total_kcal: f64,
    pub intensity: StampIntensity,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartBucket {
    pub label: String,
    pub kcal: f64,
    pub carbs: f64,
    pub protein: f64,
    pub fat: f64,
}

impl ChartBucket {
    pub fn empty(label: String) -> Self {
        Self {
            label,
            kcal: 0.0,
            carbs: 0.0,
            protein: 0.0,
            fat: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodStats {
    pub total_kcal: f64,
    pub daily_avg_kcal: f64,
    pub daily_carbs: f64,
    pub daily_protein: f64,
    pub daily_fat: f64,
    pub max_label: String,
    pub max_kcal: f64,
}

/// Companion pet reacting to today's intake against the daily goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PetMood {
    Idle,
    Eating,
    Happy,
    Full,
}

impl PetMood {
    pub fn for_intake(total_kcal: f64, goal_kcal: f64) -> Self {
        if total_kcal <= 0.0 {
            PetMood::Idle
        } else if total_kcal < goal_kcal * 0.3 {
            PetMood::Eating
        } else if total_kcal < goal_kcal * 0.8 {
            PetMood::Happy
        } else {
            PetMood::Full
        }
    }

    pub fn dialogue(&self) -> &'static str {
        match self {
            PetMood::Idle => "I'm hungry... feed me!",
            PetMood::Eating => "Yum! I can eat more.",
            PetMood::Happy => "Feeling great! Getting healthier!",
            PetMood::Full => "So full... that's enough now!",
        }
    }
}
