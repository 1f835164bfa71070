//! Daily wellness entries (date, symptoms, mood, sleep, pain).
//!
//! Range checks live here so that every write path (HTTP handler, CLI,
//! journal update) enforces the same bounds.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const MAX_SLEEP_HOURS: f64 = 24.0;
pub const MAX_PAIN_LEVEL: f64 = 10.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HealthLogError {
    #[error("Sleep hours must be between 0 and 24")]
    SleepOutOfRange(f64),

    #[error("Pain level must be between 0 and 10")]
    PainOutOfRange(f64),
}

/// A stored health log row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthLog {
    pub id: i64,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    pub date: NaiveDate,
    #[serde(default)]
    pub symptoms: Option<String>,
    #[serde(default)]
    pub mood: Option<String>,
    pub sleep_hours: f64,
    pub pain_level: f64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl HealthLog {
    pub fn mood_tone(&self) -> MoodTone {
        MoodTone::classify(self.mood.as_deref().unwrap_or(""))
    }

    pub fn pain_band(&self) -> PainBand {
        PainBand::from_level(self.pain_level)
    }

    pub fn sleep_band(&self) -> SleepBand {
        SleepBand::from_hours(self.sleep_hours)
    }
}

/// Client-supplied fields for create and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthLogInput {
    pub date: NaiveDate,
    #[serde(default)]
    pub symptoms: String,
    #[serde(default)]
    pub mood: String,
    pub sleep_hours: f64,
    /// 0 to 10; fractional values allowed.
    pub pain_level: f64,
}

impl HealthLogInput {
    pub fn validate(&self) -> Result<(), HealthLogError> {
        if !self.sleep_hours.is_finite()
            || self.sleep_hours < 0.0
            || self.sleep_hours > MAX_SLEEP_HOURS
        {
            return Err(HealthLogError::SleepOutOfRange(self.sleep_hours));
        }
        if !(0.0..=MAX_PAIN_LEVEL).contains(&self.pain_level) {
            return Err(HealthLogError::PainOutOfRange(self.pain_level));
        }
        Ok(())
    }
}

/// Insert payload: the validated input plus its owner.
#[derive(Debug, Clone, Serialize)]
pub struct NewHealthLog {
    #[serde(flatten)]
    pub input: HealthLogInput,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MoodTone {
    Positive,
    Neutral,
    Negative,
    Unrated,
}

impl MoodTone {
    pub fn classify(mood: &str) -> Self {
        match mood.trim().to_lowercase().as_str() {
            "excellent" | "great" | "good" => MoodTone::Positive,
            "fair" | "okay" | "neutral" => MoodTone::Neutral,
            "poor" | "bad" | "terrible" => MoodTone::Negative,
            _ => MoodTone::Unrated,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MoodTone::Positive => "positive",
            MoodTone::Neutral => "neutral",
            MoodTone::Negative => "negative",
            MoodTone::Unrated => "unrated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PainBand {
    Low,
    Moderate,
    Severe,
}

impl PainBand {
    pub fn from_level(level: f64) -> Self {
        if level <= 3.0 {
            PainBand::Low
        } else if level <= 6.0 {
            PainBand::Moderate
        } else {
            PainBand::Severe
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PainBand::Low => "low",
            PainBand::Moderate => "moderate",
            PainBand::Severe => "severe",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SleepBand {
    Healthy,
    Fair,
    Poor,
}

impl SleepBand {
    pub fn from_hours(hours: f64) -> Self {
        if (7.0..=9.0).contains(&hours) {
            SleepBand::Healthy
        } else if (6.0..=10.0).contains(&hours) {
            SleepBand::Fair
        } else {
            SleepBand::Poor
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SleepBand::Healthy => "healthy",
            SleepBand::Fair => "fair",
            SleepBand::Poor => "poor",
        }
    }
}
