use chrono::{Duration, NaiveDate, NaiveTime, Timelike};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

// "8:30 AM", "08:30pm", "8:30 p. m.", "14:30"
static TIME_OF_DAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(\d{1,2}):(\d{2})\s*(?:(a|p)\.?\s*m\.?)?\s*$")
        .expect("time-of-day pattern is valid")
});

/// Parses a time-of-day string into 24-hour components.
///
/// Accepts the 12-hour forms the apps produce and plain 24-hour `HH:MM`.
pub fn parse_time_of_day(input: &str) -> Option<NaiveTime> {
    let caps = TIME_OF_DAY.captures(input)?;
    let hour: u32 = caps.get(1)?.as_str().parse().ok()?;
    let minute: u32 = caps.get(2)?.as_str().parse().ok()?;

    let hour = match caps.get(3).map(|m| m.as_str().to_ascii_lowercase()) {
        Some(meridiem) => {
            if !(1..=12).contains(&hour) {
                return None;
            }
            match (meridiem.as_str(), hour) {
                ("a", 12) => 0,
                ("a", h) => h,
                (_, 12) => 12,
                (_, h) => h + 12,
            }
        }
        None => hour,
    };

    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Formats a time of day the way the apps display it ("2:05 PM").
pub fn format_time_of_day(time: NaiveTime) -> String {
    let (is_pm, hour) = time.hour12();
    format!(
        "{}:{:02} {}",
        hour,
        time.minute(),
        if is_pm { "PM" } else { "AM" }
    )
}

/// Arrival time of day for a departure plus travel time; wraps past midnight.
pub fn derive_arrival_time(departure: &str, eta_minutes: u32) -> Option<String> {
    let departure = parse_time_of_day(departure)?;
    let (arrival, _) = departure.overflowing_add_signed(Duration::minutes(i64::from(eta_minutes)));
    Some(format_time_of_day(arrival))
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScheduleDetails {
    pub request_date: Option<NaiveDate>,
    pub delivery_date: Option<NaiveDate>,
    pub departure_time: String,
    /// Always derived from `departure_time` + `travel_eta_minutes`
    arrival_time: String,
    travel_eta_minutes: u32,
}

impl ScheduleDetails {
    pub fn new(departure_time: impl Into<String>) -> Self {
        Self {
            departure_time: departure_time.into(),
            ..Default::default()
        }
        .rederive()
    }

    pub fn arrival_time(&self) -> &str {
        &self.arrival_time
    }

    pub fn travel_eta_minutes(&self) -> u32 {
        self.travel_eta_minutes
    }

    pub fn with_departure_time(mut self, departure_time: impl Into<String>) -> Self {
        self.departure_time = departure_time.into();
        self.rederive()
    }

    pub fn with_travel_eta(mut self, eta_minutes: u32) -> Self {
        self.travel_eta_minutes = eta_minutes;
        self.rederive()
    }

    pub fn with_request_date(mut self, date: Option<NaiveDate>) -> Self {
        self.request_date = date;
        self
    }

    pub fn with_delivery_date(mut self, date: Option<NaiveDate>) -> Self {
        self.delivery_date = date;
        self
    }

    fn rederive(mut self) -> Self {
        self.arrival_time =
            derive_arrival_time(&self.departure_time, self.travel_eta_minutes).unwrap_or_default();
        self
    }
}
