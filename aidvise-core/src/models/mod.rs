pub mod health_log;
pub mod symptom_log;

pub use health_log::{
    HealthLog, HealthLogError, HealthLogInput, MoodTone, NewHealthLog, PainBand, SleepBand,
};
pub use symptom_log::{split_symptoms, NewSymptomLog, NO_RESPONSE};
