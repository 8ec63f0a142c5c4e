use chrono::NaiveDate;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Numeric health metrics tracked per day
///
/// Declaration order is the canonical order used for result maps, anomaly
/// rules and report tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    Bpm,
    Weight,
    Fatigue,
    Stiffness,
    BackPain,
    Sleep,
    JointPain,
    Mobility,
    DailyFunction,
    Swelling,
    Mood,
    Irritability,
    WeatherSensitivity,
    Steps,
    Hydration,
}

/// Value class of a metric, deciding its clamp and display precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricClass {
    /// Resting heart rate in beats per minute
    HeartRate,
    /// Body weight in kilograms
    Weight,
    /// Self-reported 0-10 scale
    Scale,
    /// Daily step count
    Steps,
    /// Glasses of water per day
    Hydration,
}

/// Which direction of change counts as an improvement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Polarity {
    HigherIsBetter,
    LowerIsBetter,
    /// No inherent good direction (bpm, weight)
    Neutral,
}

impl Metric {
    /// Every metric in canonical order
    pub const ALL: [Metric; 15] = [
        Metric::Bpm,
        Metric::Weight,
        Metric::Fatigue,
        Metric::Stiffness,
        Metric::BackPain,
        Metric::Sleep,
        Metric::JointPain,
        Metric::Mobility,
        Metric::DailyFunction,
        Metric::Swelling,
        Metric::Mood,
        Metric::Irritability,
        Metric::WeatherSensitivity,
        Metric::Steps,
        Metric::Hydration,
    ];

    /// camelCase key used by the dashboard and in serialized results
    pub fn key(&self) -> &'static str {
        match self {
            Metric::Bpm => "bpm",
            Metric::Weight => "weight",
            Metric::Fatigue => "fatigue",
            Metric::Stiffness => "stiffness",
            Metric::BackPain => "backPain",
            Metric::Sleep => "sleep",
            Metric::JointPain => "jointPain",
            Metric::Mobility => "mobility",
            Metric::DailyFunction => "dailyFunction",
            Metric::Swelling => "swelling",
            Metric::Mood => "mood",
            Metric::Irritability => "irritability",
            Metric::WeatherSensitivity => "weatherSensitivity",
            Metric::Steps => "steps",
            Metric::Hydration => "hydration",
        }
    }

    /// Human-readable label, also the CSV export column header
    pub fn label(&self) -> &'static str {
        match self {
            Metric::Bpm => "BPM",
            Metric::Weight => "Weight",
            Metric::Fatigue => "Fatigue",
            Metric::Stiffness => "Stiffness",
            Metric::BackPain => "Back Pain",
            Metric::Sleep => "Sleep",
            Metric::JointPain => "Joint Pain",
            Metric::Mobility => "Mobility",
            Metric::DailyFunction => "Daily Function",
            Metric::Swelling => "Swelling",
            Metric::Mood => "Mood",
            Metric::Irritability => "Irritability",
            Metric::WeatherSensitivity => "Weather Sensitivity",
            Metric::Steps => "Steps",
            Metric::Hydration => "Hydration",
        }
    }

    pub fn class(&self) -> MetricClass {
        match self {
            Metric::Bpm => MetricClass::HeartRate,
            Metric::Weight => MetricClass::Weight,
            Metric::Steps => MetricClass::Steps,
            Metric::Hydration => MetricClass::Hydration,
            _ => MetricClass::Scale,
        }
    }

    pub fn polarity(&self) -> Polarity {
        match self {
            Metric::Sleep
            | Metric::Mobility
            | Metric::DailyFunction
            | Metric::Mood
            | Metric::Steps
            | Metric::Hydration => Polarity::HigherIsBetter,
            Metric::Bpm | Metric::Weight => Polarity::Neutral,
            _ => Polarity::LowerIsBetter,
        }
    }

    /// Check whether a raw value is plausible for this metric
    ///
    /// Weight must be strictly positive; every other lower bound is inclusive.
    pub fn is_valid(&self, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }

        match self.class() {
            MetricClass::HeartRate => (30.0..=200.0).contains(&value),
            MetricClass::Weight => value > 0.0 && value <= 300.0,
            MetricClass::Scale => (0.0..=10.0).contains(&value),
            MetricClass::Steps => (0.0..=50_000.0).contains(&value),
            MetricClass::Hydration => (0.0..=20.0).contains(&value),
        }
    }

    /// Domain every forecast value is clamped into
    pub fn forecast_domain(&self) -> (f64, f64) {
        match self.class() {
            MetricClass::HeartRate => (30.0, 200.0),
            MetricClass::Weight => (30.0, 300.0),
            MetricClass::Scale => (0.0, 10.0),
            MetricClass::Steps => (0.0, 50_000.0),
            MetricClass::Hydration => (0.0, 20.0),
        }
    }

    /// Decimal places shown for forecast values
    pub fn display_decimals(&self) -> u32 {
        match self.class() {
            MetricClass::HeartRate | MetricClass::Steps => 0,
            MetricClass::Weight | MetricClass::Scale | MetricClass::Hydration => 1,
        }
    }

    /// Clamp into the forecast domain, then round to display precision
    pub fn clamp_and_round(&self, value: f64) -> f64 {
        let (min, max) = self.forecast_domain();
        let clamped = if value.is_nan() { min } else { value.clamp(min, max) };
        round_to(clamped, self.display_decimals(), RoundingStrategy::MidpointAwayFromZero)
    }

    /// Round a non-negative width up to display precision
    pub fn round_width_up(&self, width: f64) -> f64 {
        round_to(width.max(0.0), self.display_decimals(), RoundingStrategy::AwayFromZero)
    }
}

fn round_to(value: f64, decimals: u32, strategy: RoundingStrategy) -> f64 {
    Decimal::from_f64(value)
        .map(|d| d.round_dp_with_strategy(decimals, strategy))
        .and_then(|d| d.to_f64())
        .unwrap_or(value)
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Metric {
    type Err = String;

    /// Accepts the camelCase key, the label, or snake/kebab variants
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .collect::<String>()
            .to_lowercase();

        Metric::ALL
            .iter()
            .copied()
            .find(|metric| metric.key().to_lowercase() == normalized)
            .or(match normalized.as_str() {
                "heartrate" | "hr" | "restinghr" => Some(Metric::Bpm),
                "water" => Some(Metric::Hydration),
                "weather" => Some(Metric::WeatherSensitivity),
                _ => None,
            })
            .ok_or_else(|| format!("Unknown metric: {}", s))
    }
}

/// Self-reported flare-up flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlareStatus {
    Yes,
    No,
}

impl FlareStatus {
    pub fn is_flare(&self) -> bool {
        matches!(self, FlareStatus::Yes)
    }
}

/// One day of self-reported health data
///
/// Numeric fields are optional; the engine validates them again on
/// extraction, so out-of-range values constructed directly are tolerated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthLogEntry {
    /// Calendar date, the unique key of an entry
    pub date: NaiveDate,

    /// Resting heart rate
    pub bpm: Option<f64>,

    /// Body weight in kilograms
    pub weight: Option<f64>,

    pub fatigue: Option<f64>,
    pub stiffness: Option<f64>,
    pub back_pain: Option<f64>,
    pub sleep: Option<f64>,
    pub joint_pain: Option<f64>,
    pub mobility: Option<f64>,
    pub daily_function: Option<f64>,
    pub swelling: Option<f64>,
    pub mood: Option<f64>,
    pub irritability: Option<f64>,
    pub weather_sensitivity: Option<f64>,
    pub steps: Option<f64>,

    /// Glasses of water
    pub hydration: Option<f64>,

    pub flare: Option<FlareStatus>,

    // Free-form fields carried for the surrounding app, not analysed
    #[serde(default)]
    pub stressors: Vec<String>,
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub pain_location: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl HealthLogEntry {
    /// Create an empty entry for a date
    pub fn new(date: NaiveDate) -> Self {
        HealthLogEntry {
            date,
            bpm: None,
            weight: None,
            fatigue: None,
            stiffness: None,
            back_pain: None,
            sleep: None,
            joint_pain: None,
            mobility: None,
            daily_function: None,
            swelling: None,
            mood: None,
            irritability: None,
            weather_sensitivity: None,
            steps: None,
            hydration: None,
            flare: None,
            stressors: Vec::new(),
            symptoms: Vec::new(),
            pain_location: None,
            notes: None,
        }
    }

    /// Builder-style setter for a metric value
    pub fn with(mut self, metric: Metric, value: f64) -> Self {
        self.set_value(metric, Some(value));
        self
    }

    /// Builder-style setter for the flare flag
    pub fn with_flare(mut self, flare: bool) -> Self {
        self.flare = Some(if flare { FlareStatus::Yes } else { FlareStatus::No });
        self
    }

    pub fn value(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Bpm => self.bpm,
            Metric::Weight => self.weight,
            Metric::Fatigue => self.fatigue,
            Metric::Stiffness => self.stiffness,
            Metric::BackPain => self.back_pain,
            Metric::Sleep => self.sleep,
            Metric::JointPain => self.joint_pain,
            Metric::Mobility => self.mobility,
            Metric::DailyFunction => self.daily_function,
            Metric::Swelling => self.swelling,
            Metric::Mood => self.mood,
            Metric::Irritability => self.irritability,
            Metric::WeatherSensitivity => self.weather_sensitivity,
            Metric::Steps => self.steps,
            Metric::Hydration => self.hydration,
        }
    }

    pub fn set_value(&mut self, metric: Metric, value: Option<f64>) {
        let slot = match metric {
            Metric::Bpm => &mut self.bpm,
            Metric::Weight => &mut self.weight,
            Metric::Fatigue => &mut self.fatigue,
            Metric::Stiffness => &mut self.stiffness,
            Metric::BackPain => &mut self.back_pain,
            Metric::Sleep => &mut self.sleep,
            Metric::JointPain => &mut self.joint_pain,
            Metric::Mobility => &mut self.mobility,
            Metric::DailyFunction => &mut self.daily_function,
            Metric::Swelling => &mut self.swelling,
            Metric::Mood => &mut self.mood,
            Metric::Irritability => &mut self.irritability,
            Metric::WeatherSensitivity => &mut self.weather_sensitivity,
            Metric::Steps => &mut self.steps,
            Metric::Hydration => &mut self.hydration,
        };
        *slot = value;
    }

    /// Metric value if present and inside the metric's valid domain
    pub fn valid_value(&self, metric: Metric) -> Option<f64> {
        self.value(metric).filter(|v| metric.is_valid(*v))
    }

    pub fn is_flare(&self) -> bool {
        self.flare.map(|f| f.is_flare()).unwrap_or(false)
    }
}

/// Direction of a metric relative to its average
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendStatus {
    Improving,
    Stable,
    Worsening,
}

impl fmt::Display for TrendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendStatus::Improving => write!(f, "improving"),
            TrendStatus::Stable => write!(f, "stable"),
            TrendStatus::Worsening => write!(f, "worsening"),
        }
    }
}
