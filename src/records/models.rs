use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Contact a record belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct ContactRef {
    #[serde(rename(deserialize = "contactid"))]
    pub id: Uuid,
    #[serde(rename(deserialize = "fullname"), default)]
    pub full_name: Option<String>,
}

/// Account a record belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct AccountRef {
    #[serde(rename(deserialize = "accountid"))]
    pub id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
}

/// Support case (`incident` entity)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct Case {
    #[serde(rename(deserialize = "incidentid"))]
    pub id: Uuid,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(rename(deserialize = "statuscode"), default)]
    pub status_code: Option<i32>,
    #[serde(rename(deserialize = "statecode"), default)]
    pub state_code: Option<i32>,
    #[serde(rename(deserialize = "prioritycode"), default)]
    pub priority_code: Option<i32>,
    #[serde(rename(deserialize = "caseorigincode"), default)]
    pub origin_code: Option<i32>,
    #[serde(rename(deserialize = "createdon"), default)]
    pub created_on: Option<DateTime<Utc>>,
    #[serde(rename(deserialize = "modifiedon"), default)]
    pub modified_on: Option<DateTime<Utc>>,
    #[serde(rename(deserialize = "customerid_contact"), default)]
    pub contact: Option<ContactRef>,
    #[serde(rename(deserialize = "customerid_account"), default)]
    pub account: Option<AccountRef>,
}

/// Sales order (`salesorder` entity)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct SalesOrder {
    #[serde(rename(deserialize = "salesorderid"))]
    pub id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename(deserialize = "ordernumber"), default)]
    pub order_number: Option<String>,
    #[serde(rename(deserialize = "statuscode"), default)]
    pub status_code: Option<i32>,
    #[serde(rename(deserialize = "statecode"), default)]
    pub state_code: Option<i32>,
    #[serde(rename(deserialize = "totalamount"), default)]
    pub total_amount: Option<f64>,
    #[serde(rename(deserialize = "createdon"), default)]
    pub created_on: Option<DateTime<Utc>>,
    #[serde(rename(deserialize = "modifiedon"), default)]
    pub modified_on: Option<DateTime<Utc>>,
    #[serde(rename(deserialize = "customerid_contact"), default)]
    pub contact: Option<ContactRef>,
    #[serde(rename(deserialize = "customerid_account"), default)]
    pub account: Option<AccountRef>,
}

/// Display name of whichever customer a record is attached to
fn customer_name<'a>(
    contact: Option<&'a ContactRef>,
    account: Option<&'a AccountRef>,
) -> Option<&'a str> {
    contact
        .and_then(|c| c.full_name.as_deref())
        .or_else(|| account.and_then(|a| a.name.as_deref()))
}

impl Case {
    pub fn customer_name(&self) -> Option<&str> {
        customer_name(self.contact.as_ref(), self.account.as_ref())
    }
}

impl SalesOrder {
    pub fn customer_name(&self) -> Option<&str> {
        customer_name(self.contact.as_ref(), self.account.as_ref())
    }
}

/// Record kinds the portal can list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Cases,
    SalesOrders,
}

impl RecordKind {
    /// OData entity set name
    pub fn entity_set(&self) -> &'static str {
        match self {
            Self::Cases => "incidents",
            Self::SalesOrders => "salesorders",
        }
    }
}

/// A record of any supported kind
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Case(Case),
    SalesOrder(SalesOrder),
}

/// Optional narrowing of a record listing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFilter {
    /// Only records whose customer (contact or account) has this id
    pub customer_id: Option<Uuid>,
}

impl RecordFilter {
    pub fn for_customer(customer_id: Uuid) -> Self {
        Self {
            customer_id: Some(customer_id),
        }
    }
}

/// OData collection envelope
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ODataCollection<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
}

/// OData error envelope, `{"error": {"code": ..., "message": ...}}`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ODataErrorBody {
    pub error: ODataErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ODataErrorDetail {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}
