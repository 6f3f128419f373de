use serde::Serialize;

use crate::auth::providers::InteractionKind;
use crate::auth::{InteractionPrompt, SessionSnapshot};
use crate::records::labels::{
    case_state_label, case_status_color, case_status_label, priority_color, priority_label,
    sales_order_state_label, sales_order_status_label, CaseMetrics,
};
use crate::records::models::{Case, SalesOrder};

/// Case as rendered in the case list and detail page
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseView<'a> {
    #[serde(flatten)]
    pub case: &'a Case,
    pub customer_name: Option<&'a str>,
    pub status_label: &'static str,
    pub state_label: &'static str,
    pub priority_label: &'static str,
    pub status_color: &'static str,
    pub priority_color: &'static str,
}

impl<'a> From<&'a Case> for CaseView<'a> {
    fn from(case: &'a Case) -> Self {
        Self {
            case,
            customer_name: case.customer_name(),
            status_label: case_status_label(case.status_code),
            state_label: case_state_label(case.state_code),
            priority_label: priority_label(case.priority_code),
            status_color: case_status_color(case.status_code),
            priority_color: priority_color(case.priority_code),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesOrderView<'a> {
    #[serde(flatten)]
    pub order: &'a SalesOrder,
    pub customer_name: Option<&'a str>,
    pub status_label: &'static str,
    pub state_label: &'static str,
}

impl<'a> From<&'a SalesOrder> for SalesOrderView<'a> {
    fn from(order: &'a SalesOrder) -> Self {
        Self {
            order,
            customer_name: order.customer_name(),
            status_label: sales_order_status_label(order.status_code),
            state_label: sales_order_state_label(order.state_code),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseListView<'a> {
    pub cases: Vec<CaseView<'a>>,
    pub metrics: CaseMetrics,
}

impl<'a> CaseListView<'a> {
    pub fn new(cases: &'a [Case]) -> Self {
        Self {
            cases: cases.iter().map(CaseView::from).collect(),
            metrics: CaseMetrics::from_cases(cases),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesOrderListView<'a> {
    pub sales_orders: Vec<SalesOrderView<'a>>,
}

impl<'a> SalesOrderListView<'a> {
    pub fn new(orders: &'a [SalesOrder]) -> Self {
        Self {
            sales_orders: orders.iter().map(SalesOrderView::from).collect(),
        }
    }
}

/// Session state plus whatever the user is currently asked to do
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    #[serde(flatten)]
    pub snapshot: SessionSnapshot,
    pub pending_interaction: Option<InteractionPrompt>,
}

/// Returned when an operation is parked on a provider page
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionView {
    pub authorize_url: String,
    pub kind: InteractionKind,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignOutView {
    #[serde(flatten)]
    pub snapshot: SessionSnapshot,
    pub end_session_url: Option<String>,
}
