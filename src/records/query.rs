use uuid::Uuid;

use crate::records::models::{RecordFilter, RecordKind};

const EXPAND_CUSTOMER: &str =
    "customerid_contact($select=fullname,contactid),customerid_account($select=name,accountid)";
const ORDER_NEWEST_FIRST: &str = "createdon%20desc";

fn select(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Cases => {
            "incidentid,title,statuscode,statecode,prioritycode,caseorigincode,createdon,modifiedon"
        }
        RecordKind::SalesOrders => {
            "salesorderid,name,ordernumber,statuscode,statecode,totalamount,createdon,modifiedon"
        }
    }
}

/// URL listing records of one kind, newest first
pub fn collection_url(base_url: &str, kind: RecordKind, filter: &RecordFilter) -> String {
    let mut url = format!(
        "{base_url}/{}?$select={}&$expand={EXPAND_CUSTOMER}&$orderby={ORDER_NEWEST_FIRST}",
        kind.entity_set(),
        select(kind),
    );
    // A Uuid renders as plain hex and dashes, so it needs no escaping
    if let Some(customer_id) = filter.customer_id {
        url.push_str(&format!("&$filter=_customerid_value%20eq%20{customer_id}"));
    }
    url
}

/// URL of a single record by id
pub fn record_url(base_url: &str, kind: RecordKind, id: Uuid) -> String {
    format!(
        "{base_url}/{}({id})?$select={}&$expand={EXPAND_CUSTOMER}",
        kind.entity_set(),
        select(kind),
    )
}
