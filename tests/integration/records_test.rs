//! Record listing against the mock Dynamics organization

use axum::http::StatusCode;
use mockito::Matcher;
use serde_json::json;

use crate::test_harness::{PortalHarness, RESOURCE_TOKEN};

const CASE_ID: &str = "8d0a7e4c-64b8-4f2c-9a6f-3a0b1f1e2d3c";
const CUSTOMER_ID: &str = "5b1f2c3d-0000-4a4a-8b8b-1234567890ab";

fn case_body() -> serde_json::Value {
    json!({
        "incidentid": CASE_ID,
        "title": "Printer on fire",
        "statuscode": 1,
        "statecode": 0,
        "prioritycode": 1,
        "caseorigincode": 2,
        "createdon": "2024-03-01T09:30:00Z",
        "modifiedon": "2024-03-02T10:00:00Z",
        "customerid_contact": {
            "contactid": CUSTOMER_ID,
            "fullname": "Ada Lovelace"
        }
    })
}

#[tokio::test]
async fn test_case_list_with_labels_and_metrics() {
    let mut harness = PortalHarness::new().await;
    harness.sign_in_ready().await;

    let resolved = json!({
        "incidentid": "11111111-2222-3333-4444-555555555555",
        "title": "Password reset",
        "statuscode": 5,
        "statecode": 1,
        "prioritycode": 2,
        "customerid_account": {
            "accountid": "66666666-7777-8888-9999-000000000000",
            "name": "Contoso Ltd"
        }
    });
    let mock = harness
        .dynamics
        .mock("GET", "/api/data/v9.2/incidents")
        .match_query(Matcher::UrlEncoded(
            "$orderby".into(),
            "createdon desc".into(),
        ))
        .match_header("authorization", format!("Bearer {RESOURCE_TOKEN}").as_str())
        .match_header("odata-version", "4.0")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "value": [case_body(), resolved] }).to_string())
        .expect(1)
        .create_async()
        .await;

    let (status, body) = harness.send("GET", "/api/records/cases").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    mock.assert_async().await;

    let cases = body["cases"].as_array().unwrap();
    assert_eq!(cases.len(), 2);
    assert_eq!(cases[0]["id"], CASE_ID);
    assert_eq!(cases[0]["customerName"], "Ada Lovelace");
    assert_eq!(cases[0]["statusLabel"], "In Progress");
    assert_eq!(cases[0]["priorityLabel"], "High");
    assert_eq!(cases[1]["customerName"], "Contoso Ltd");
    assert_eq!(cases[1]["stateLabel"], "Resolved");

    assert_eq!(body["metrics"]["total"], 2);
    assert_eq!(body["metrics"]["active"], 1);
    assert_eq!(body["metrics"]["resolved"], 1);
    assert_eq!(body["metrics"]["highPriority"], 1);
}

#[tokio::test]
async fn test_case_list_filters_by_customer() {
    let mut harness = PortalHarness::new().await;
    harness.sign_in_ready().await;

    let mock = harness
        .dynamics
        .mock("GET", "/api/data/v9.2/incidents")
        .match_query(Matcher::UrlEncoded(
            "$filter".into(),
            format!("_customerid_value eq {CUSTOMER_ID}"),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "value": [case_body()] }).to_string())
        .expect(1)
        .create_async()
        .await;

    let (status, body) = harness
        .send("GET", &format!("/api/records/cases?customerId={CUSTOMER_ID}"))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["cases"].as_array().unwrap().len(), 1);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_case_detail_and_missing_case() {
    let mut harness = PortalHarness::new().await;
    harness.sign_in_ready().await;

    let found = harness
        .dynamics
        .mock("GET", format!("/api/data/v9.2/incidents({CASE_ID})").as_str())
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(case_body().to_string())
        .create_async()
        .await;
    harness.keep(found);

    let missing_id = "00000000-0000-0000-0000-000000000404";
    let missing = harness
        .dynamics
        .mock("GET", format!("/api/data/v9.2/incidents({missing_id})").as_str())
        .match_query(Matcher::Any)
        .with_status(404)
        .with_header("content-type", "application/json")
        .with_body(
            json!({"error": {"code": "0x80040217", "message": "incident Does Not Exist"}})
                .to_string(),
        )
        .create_async()
        .await;
    harness.keep(missing);

    let (status, body) = harness
        .send("GET", &format!("/api/records/cases/{CASE_ID}"))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["title"], "Printer on fire");
    assert!(body["statusColor"].as_str().is_some());

    let (status, body) = harness
        .send("GET", &format!("/api/records/cases/{missing_id}"))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_sales_orders_with_labels() {
    let mut harness = PortalHarness::new().await;
    harness.sign_in_ready().await;

    let mock = harness
        .dynamics
        .mock("GET", "/api/data/v9.2/salesorders")
        .match_query(Matcher::Any)
        .match_header("authorization", format!("Bearer {RESOURCE_TOKEN}").as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "value": [{
                    "salesorderid": "9f9f9f9f-1111-2222-3333-444444444444",
                    "name": "Q1 toner",
                    "ordernumber": "ORD-01001",
                    "statuscode": 1,
                    "statecode": 0,
                    "totalamount": 1250.5,
                    "customerid_account": {
                        "accountid": "66666666-7777-8888-9999-000000000000",
                        "name": "Contoso Ltd"
                    }
                }]
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let (status, body) = harness.send("GET", "/api/records/sales-orders").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    mock.assert_async().await;

    let orders = body["salesOrders"].as_array().unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["orderNumber"], "ORD-01001");
    assert_eq!(orders[0]["totalAmount"], 1250.5);
    assert_eq!(orders[0]["customerName"], "Contoso Ltd");
    assert_eq!(orders[0]["stateLabel"], "Active");
}

#[tokio::test]
async fn test_dynamics_error_maps_to_bad_gateway() {
    let mut harness = PortalHarness::new().await;
    harness.sign_in_ready().await;

    let mock = harness
        .dynamics
        .mock("GET", "/api/data/v9.2/incidents")
        .match_query(Matcher::Any)
        .with_status(500)
        .with_header("content-type", "application/json")
        .with_body(json!({"error": {"code": "0x0", "message": "Generic SQL error"}}).to_string())
        .create_async()
        .await;
    harness.keep(mock);

    let (status, body) = harness.send("GET", "/api/records/cases").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["retryable"], true);
    assert!(body["message"].as_str().unwrap().contains("Generic SQL error"));
}
