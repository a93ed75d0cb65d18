//! Wire behaviour of the HTTP invoice source.

use std::time::Duration;

use billfold_core::{
    FetchOutcome, HttpRemoteSource, Invoice, InvoiceDraft, InvoiceFilter, InvoiceId,
    InvoiceStatus, LineItem, PushOutcome, RemoteConfig, RemoteSource, RemoveOutcome,
    TransportError, VersionToken,
};
use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn source(server: &MockServer) -> HttpRemoteSource {
    let config = RemoteConfig::new(server.uri())
        .unwrap()
        .with_auth_token("secret");
    HttpRemoteSource::new(&config, Duration::from_secs(5)).unwrap()
}

fn invoice() -> Invoice {
    let draft = InvoiceDraft::from_lines(
        "ACME",
        NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 4, 30).unwrap(),
        vec![LineItem::new("Consulting", dec!(2), dec!(50.00))],
    )
    .with_status(InvoiceStatus::Issued);
    Invoice::with_id(InvoiceId::new(), draft, 1_000).unwrap()
}

fn body(invoice: &Invoice) -> serde_json::Value {
    json!({
        "id": invoice.id.to_string(),
        "issue_date": "2024-04-01",
        "due_date": "2024-04-30",
        "amount": "100.00",
        "status": "issued",
        "customer_ref": "ACME",
        "line_items": [
            { "description": "Consulting", "quantity": "2", "unit_price": "50.00" }
        ],
        "updated_at": 1000
    })
}

#[tokio::test]
async fn fetch_reads_version_from_etag() {
    let server = MockServer::start().await;
    let expected = invoice();
    Mock::given(method("GET"))
        .and(path(format!("/invoices/{}", expected.id)))
        .and(header("Authorization", "Bearer secret"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "v7")
                .set_body_json(body(&expected)),
        )
        .mount(&server)
        .await;

    let outcome = source(&server).fetch(expected.id, None).await.unwrap();
    let FetchOutcome::Found(remote) = outcome else {
        panic!("expected a record, got {outcome:?}");
    };
    assert_eq!(remote.version, VersionToken::new("v7"));
    assert_eq!(remote.invoice, expected);
}

#[tokio::test]
async fn conditional_fetch_maps_not_modified_and_missing() {
    let server = MockServer::start().await;
    let known = invoice();
    let missing = InvoiceId::new();
    Mock::given(method("GET"))
        .and(path(format!("/invoices/{}", known.id)))
        .and(header("If-None-Match", "v3"))
        .respond_with(ResponseTemplate::new(304))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/invoices/{missing}")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let remote = source(&server);
    let version = VersionToken::new("v3");
    assert_eq!(
        remote.fetch(known.id, Some(&version)).await.unwrap(),
        FetchOutcome::NotModified
    );
    assert_eq!(
        remote.fetch(missing, None).await.unwrap(),
        FetchOutcome::NotFound
    );
}

#[tokio::test]
async fn invalid_record_is_malformed() {
    let server = MockServer::start().await;
    let expected = invoice();
    let mut broken = body(&expected);
    broken["amount"] = json!("999.00");
    Mock::given(method("GET"))
        .and(path(format!("/invoices/{}", expected.id)))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "v1")
                .set_body_json(broken),
        )
        .mount(&server)
        .await;

    let error = source(&server).fetch(expected.id, None).await.unwrap_err();
    assert!(matches!(error, TransportError::Malformed(_)));
}

#[tokio::test]
async fn overflowing_line_is_malformed() {
    let server = MockServer::start().await;
    let expected = invoice();
    let mut broken = body(&expected);
    broken["line_items"] = json!([
        { "description": "Bulk", "quantity": "79228162514264337593543950335", "unit_price": "2" }
    ]);
    Mock::given(method("GET"))
        .and(path(format!("/invoices/{}", expected.id)))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "v1")
                .set_body_json(broken),
        )
        .mount(&server)
        .await;

    let error = source(&server).fetch(expected.id, None).await.unwrap_err();
    assert!(matches!(error, TransportError::Malformed(_)));
}

#[tokio::test]
async fn fetch_all_sends_filter_as_query() {
    let server = MockServer::start().await;
    let expected = invoice();
    let mut listed = body(&expected);
    listed["version"] = json!("v2");
    Mock::given(method("GET"))
        .and(path("/invoices"))
        .and(query_param("status", "issued"))
        .and(query_param("min_amount", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "invoices": [listed] })))
        .mount(&server)
        .await;

    let filter = InvoiceFilter::default()
        .with_status(InvoiceStatus::Issued)
        .amount_between(Some(dec!(10)), None);
    let records = source(&server).fetch_all(&filter).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].invoice.id, expected.id);
    assert_eq!(records[0].version, VersionToken::new("v2"));
}

#[tokio::test]
async fn push_sends_base_version_and_reads_ack() {
    let server = MockServer::start().await;
    let local = invoice();
    Mock::given(method("PUT"))
        .and(path(format!("/invoices/{}", local.id)))
        .and(header("If-Match", "v1"))
        .and(body_partial_json(json!({ "customer_ref": "ACME", "status": "issued" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "version": "v2" })))
        .mount(&server)
        .await;

    let base = VersionToken::new("v1");
    let outcome = source(&server).push(&local, Some(&base)).await.unwrap();
    assert_eq!(outcome, PushOutcome::Accepted(VersionToken::new("v2")));
}

#[tokio::test]
async fn push_rejection_keeps_server_reason() {
    let server = MockServer::start().await;
    let local = invoice();
    Mock::given(method("PUT"))
        .and(path(format!("/invoices/{}", local.id)))
        .respond_with(
            ResponseTemplate::new(409)
                .set_body_json(json!({ "message": "accounting period closed" })),
        )
        .mount(&server)
        .await;

    let outcome = source(&server).push(&local, None).await.unwrap();
    assert_eq!(
        outcome,
        PushOutcome::Rejected("accounting period closed".into())
    );
}

#[tokio::test]
async fn server_errors_are_transport_failures() {
    let server = MockServer::start().await;
    let local = invoice();
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let error = source(&server).push(&local, None).await.unwrap_err();
    assert_eq!(
        error,
        TransportError::Server {
            status: 503,
            message: "maintenance".into()
        }
    );
}

#[tokio::test]
async fn remove_treats_missing_as_done() {
    let server = MockServer::start().await;
    let gone = InvoiceId::new();
    let present = InvoiceId::new();
    Mock::given(method("DELETE"))
        .and(path(format!("/invoices/{gone}")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("/invoices/{present}")))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let remote = source(&server);
    assert_eq!(remote.remove(gone).await.unwrap(), RemoveOutcome::NotFound);
    assert_eq!(remote.remove(present).await.unwrap(), RemoveOutcome::Accepted);
}

#[tokio::test]
async fn stopped_server_is_unreachable() {
    let server = MockServer::start().await;
    let remote = source(&server);
    drop(server);

    let error = remote.fetch(InvoiceId::new(), None).await.unwrap_err();
    assert!(matches!(error, TransportError::Unreachable(_)));
}
