// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google Calendar free/busy client and meeting slot recommendation.
//!
//! Recommendations are plain date arithmetic over the user's busy
//! intervals: walk working hours across the window, skip collisions.

use crate::error::AppError;
use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

const CALENDAR_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";

/// Working-hours window used for recommendations (UTC).
const WORK_START_HOUR: u32 = 9;
const WORK_END_HOUR: u32 = 17;

/// Granularity of candidate slot starts.
const SLOT_STEP_MINUTES: i64 = 30;

/// Maximum number of recommended slots returned.
const MAX_RECOMMENDATIONS: usize = 5;

/// A busy interval from the free/busy query.
#[derive(Debug, Clone, Deserialize)]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A recommended open meeting slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecommendedSlot {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Deserialize)]
struct FreeBusyResponse {
    calendars: std::collections::HashMap<String, FreeBusyCalendar>,
}

#[derive(Debug, Deserialize)]
struct FreeBusyCalendar {
    #[serde(default)]
    busy: Vec<BusyInterval>,
}

/// Google Calendar client (free/busy only).
#[derive(Clone)]
pub struct CalendarService {
    http: reqwest::Client,
    base_url: String,
}

impl Default for CalendarService {
    fn default() -> Self {
        Self::new()
    }
}

impl CalendarService {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: CALENDAR_BASE_URL.to_string(),
        }
    }

    /// Query busy intervals for the user's primary calendar.
    pub async fn free_busy(
        &self,
        access_token: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>, AppError> {
        let body = serde_json::json!({
            "timeMin": time_min.to_rfc3339(),
            "timeMax": time_max.to_rfc3339(),
            "items": [{"id": "primary"}],
        });

        let response = self
            .http
            .post(format!("{}/freeBusy", self.base_url))
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::GmailApi(format!("Calendar request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 401 {
                return Err(AppError::GmailApi(
                    AppError::GMAIL_TOKEN_ERROR.to_string(),
                ));
            }
            return Err(AppError::GmailApi(format!(
                "Calendar HTTP {}: {}",
                status, body
            )));
        }

        let parsed: FreeBusyResponse = response
            .json()
            .await
            .map_err(|e| AppError::GmailApi(format!("Calendar JSON parse error: {}", e)))?;

        Ok(parsed
            .calendars
            .into_values()
            .flat_map(|c| c.busy)
            .collect())
    }
}

/// Recommend open meeting slots within working hours.
///
/// Walks `window_days` from `window_start` in `SLOT_STEP_MINUTES` steps,
/// keeping slots that fit entirely inside working hours and overlap no
/// busy interval. Returns at most `MAX_RECOMMENDATIONS` slots.
pub fn recommend_slots(
    busy: &[BusyInterval],
    window_start: DateTime<Utc>,
    window_days: u32,
    duration_minutes: u32,
) -> Vec<RecommendedSlot> {
    let duration = Duration::minutes(duration_minutes as i64);
    let step = Duration::minutes(SLOT_STEP_MINUTES);
    let window_end = window_start + Duration::days(window_days as i64);

    // Align the first candidate to the next step boundary.
    let mut candidate = align_to_step(window_start, SLOT_STEP_MINUTES);
    let mut slots = Vec::new();

    while candidate + duration <= window_end && slots.len() < MAX_RECOMMENDATIONS {
        let end = candidate + duration;

        if within_working_hours(candidate, end)
            && !busy.iter().any(|b| candidate < b.end && b.start < end)
        {
            slots.push(RecommendedSlot {
                start: crate::time_utils::format_utc_rfc3339(candidate),
                end: crate::time_utils::format_utc_rfc3339(end),
            });
        }

        candidate += step;
    }

    slots
}

/// Round `t` up to the next step boundary (minutes within the hour).
fn align_to_step(t: DateTime<Utc>, step_minutes: i64) -> DateTime<Utc> {
    let minute = t.minute() as i64;
    let remainder = minute % step_minutes;
    let bump = if remainder == 0 && t.second() == 0 {
        0
    } else {
        step_minutes - remainder
    };
    let aligned = t + Duration::minutes(bump);
    Utc.with_ymd_and_hms(
        aligned.year(),
        aligned.month(),
        aligned.day(),
        aligned.hour(),
        aligned.minute(),
        0,
    )
    .single()
    .unwrap_or(aligned)
}

/// Whether [start, end) falls entirely inside the working-hours window.
fn within_working_hours(start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    // Slots never span midnight
    if end.date_naive() != start.date_naive() {
        return false;
    }
    start.hour() >= WORK_START_HOUR
        && (end.hour() < WORK_END_HOUR || (end.hour() == WORK_END_HOUR && end.minute() == 0))
}
