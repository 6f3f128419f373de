use serde::{Deserialize, Serialize};

use crate::records::models::Case;

const UNKNOWN: &str = "Unknown";

// Tailwind badge classes
const BLUE: &str = "bg-blue-100 text-blue-800";
const YELLOW: &str = "bg-yellow-100 text-yellow-800";
const ORANGE: &str = "bg-orange-100 text-orange-800";
const PURPLE: &str = "bg-purple-100 text-purple-800";
const GREEN: &str = "bg-green-100 text-green-800";
const RED: &str = "bg-red-100 text-red-800";
const GRAY: &str = "bg-gray-100 text-gray-800";

// Case state codes
pub const CASE_STATE_ACTIVE: i32 = 0;
pub const CASE_STATE_RESOLVED: i32 = 1;

pub const PRIORITY_HIGH: i32 = 1;

/// Case status reason. Missing or unknown codes read "Unknown".
pub fn case_status_label(code: Option<i32>) -> &'static str {
    match code {
        Some(1) => "In Progress",
        Some(2) => "On Hold",
        Some(3) => "Waiting for Details",
        Some(4) => "Researching",
        Some(5) => "Problem Solved",
        Some(1000) => "Information Provided",
        Some(2000) => "Canceled",
        Some(5000) => "Merged",
        _ => UNKNOWN,
    }
}

pub fn case_state_label(code: Option<i32>) -> &'static str {
    match code {
        Some(0) => "Active",
        Some(1) => "Resolved",
        Some(2) => "Canceled",
        _ => UNKNOWN,
    }
}

/// Case priority. Anything unrecognized is treated as normal priority.
pub fn priority_label(code: Option<i32>) -> &'static str {
    match code {
        Some(1) => "High",
        Some(3) => "Low",
        _ => "Normal",
    }
}

pub fn case_status_color(code: Option<i32>) -> &'static str {
    match code {
        Some(1) => BLUE,
        Some(2) => YELLOW,
        Some(3) => ORANGE,
        Some(4) => PURPLE,
        Some(5) | Some(1000) => GREEN,
        Some(2000) => RED,
        _ => GRAY,
    }
}

pub fn priority_color(code: Option<i32>) -> &'static str {
    match code {
        Some(1) => RED,
        Some(3) => GRAY,
        _ => BLUE,
    }
}

pub fn sales_order_state_label(code: Option<i32>) -> &'static str {
    match code {
        Some(0) => "Active",
        Some(1) => "Submitted",
        Some(2) => "Canceled",
        Some(3) => "Fulfilled",
        Some(4) => "Invoiced",
        _ => UNKNOWN,
    }
}

pub fn sales_order_status_label(code: Option<i32>) -> &'static str {
    match code {
        Some(1) => "New",
        Some(2) => "Pending",
        Some(3) => "In Progress",
        Some(4) => "No Money",
        Some(100001) => "Complete",
        Some(100002) => "Partial",
        Some(100003) => "Invoiced",
        _ => UNKNOWN,
    }
}

/// Summary counts shown above the case list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseMetrics {
    pub total: usize,
    pub active: usize,
    pub resolved: usize,
    pub high_priority: usize,
}

impl CaseMetrics {
    pub fn from_cases(cases: &[Case]) -> Self {
        cases.iter().fold(Self::default(), |mut m, case| {
            m.total += 1;
            match case.state_code {
                Some(CASE_STATE_ACTIVE) => m.active += 1,
                Some(CASE_STATE_RESOLVED) => m.resolved += 1,
                _ => {}
            }
            if case.priority_code == Some(PRIORITY_HIGH) {
                m.high_priority += 1;
            }
            m
        })
    }
}
