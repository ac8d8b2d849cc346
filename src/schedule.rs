/*
 *  schedule.rs
 *
 *  Vitrine - pictures while you're looking
 *  (c) 2024-26 the Vitrine authors
 *
 *  Work-window evaluation - decides whether a wall-clock instant counts
 *  as work hours, including overnight (midnight-wrapping) windows
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use chrono::{Local, NaiveTime};
use log::{info, warn};

/// Fallbacks when a configured "HH:MM" string does not parse.
const FALLBACK_START: (u32, u32) = (8, 0);
const FALLBACK_END: (u32, u32) = (17, 0);

/// A configured daily work window.
///
/// `start > end` spans midnight (e.g. 22:00-06:00). `start == end` is a
/// degenerate single-instant window. When disabled the window never matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkWindow {
    enabled: bool,
    start: NaiveTime,
    end: NaiveTime,
}

impl WorkWindow {
    /// Build from "HH:MM" strings. Malformed strings fall back to 08:00/17:00
    /// with a warning; construction never fails.
    pub fn new(enabled: bool, start: &str, end: &str) -> Self {
        let window = Self {
            enabled,
            start: parse_hhmm(start, FALLBACK_START),
            end: parse_hhmm(end, FALLBACK_END),
        };
        info!(
            "work window {}-{}, enabled: {}",
            window.start.format("%H:%M"),
            window.end.format("%H:%M"),
            enabled
        );
        window
    }

    pub fn from_times(enabled: bool, start: NaiveTime, end: NaiveTime) -> Self {
        Self { enabled, start, end }
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }

    /// Pure window membership test, inclusive at both ends.
    pub fn contains(&self, now: NaiveTime) -> bool {
        if !self.enabled {
            return false;
        }
        if self.start == self.end {
            // degenerate single-instant window
            now == self.start
        } else if self.start < self.end {
            self.start <= now && now <= self.end
        } else {
            // overnight window, e.g. 22:00-06:00
            now >= self.start || now <= self.end
        }
    }

    /// Window membership at the current local wall-clock time.
    pub fn is_work_time(&self) -> bool {
        self.contains(Local::now().time())
    }

    /// Human-readable summary of the current window state.
    pub fn description(&self) -> String {
        if !self.enabled {
            return "time window disabled - motion control active".to_string();
        }
        let span = format!(
            "{}-{}",
            self.start.format("%H:%M"),
            self.end.format("%H:%M")
        );
        if self.is_work_time() {
            format!("WORK HOURS ({span}) - continuous loop")
        } else {
            format!("OFF HOURS - standby (work hours {span})")
        }
    }

    /// The next point at which the window flips, as ("HH:MM", what happens).
    pub fn next_change(&self) -> (String, &'static str) {
        if !self.enabled {
            return ("--:--".to_string(), "time window disabled");
        }
        if self.is_work_time() {
            (self.end.format("%H:%M").to_string(), "off hours begin")
        } else {
            (self.start.format("%H:%M").to_string(), "work hours begin")
        }
    }
}

fn parse_hhmm(s: &str, fallback: (u32, u32)) -> NaiveTime {
    match NaiveTime::parse_from_str(s, "%H:%M") {
        Ok(t) => t,
        Err(e) => {
            let (h, m) = fallback;
            warn!("could not parse time '{s}': {e}; falling back to {h:02}:{m:02}");
            NaiveTime::from_hms_opt(h, m, 0).unwrap_or_default()
        }
    }
}
