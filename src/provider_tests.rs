//! Unit tests for `provider.rs`

use std::collections::VecDeque;

use serde_json::json;

use super::*;
use crate::dirty::tests::ManualClock;

/// Replays queued responses and records every call.
#[derive(Default)]
struct FakeTransport {
    responses: Mutex<VecDeque<ApiResponse>>,
    calls: Mutex<Vec<(Method, String, Option<Value>)>>,
}

impl FakeTransport {
    fn respond(self, status: u16, body: Value) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(ApiResponse::new(status, body));
        self
    }

    fn calls(&self) -> Vec<(Method, String, Option<Value>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<ApiResponse, ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push((method, path.to_string(), body.cloned()));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::Connect("no response queued".into()))
    }
}

struct DenyAll;

impl ZoneAuthority for DenyAll {
    fn owns_zone(&self, _zone: &str) -> bool {
        false
    }
}

const T0: i64 = 1_700_000_000;

fn config() -> ProviderConfig {
    let mut config = ProviderConfig::new("http://127.0.0.1:8081/api/v1", "secret");
    config.nameservers = vec!["ns1.example.net.".into(), "ns2.example.net".into()];
    config
}

fn provider(transport: FakeTransport) -> PowerDnsProvider<FakeTransport, ManualClock> {
    PowerDnsProvider::with_clock(config(), transport, ManualClock::at(T0))
}

fn zone_body() -> Value {
    json!({
        "id": "/api/v1/servers/localhost/zones/example.com.",
        "name": "example.com.",
        "kind": "Native",
        "rrsets": [
            {
                "name": "mail.example.com.",
                "type": "MX",
                "ttl": 3600,
                "records": [{ "content": "10 mx1.example.com.", "disabled": false }],
                "comments": []
            },
            {
                "name": "www.example.com.",
                "type": "A",
                "ttl": 300,
                "records": [
                    { "content": "1.1.1.1", "disabled": false },
                    { "content": "2.2.2.2", "disabled": false }
                ],
                "comments": [{ "content": "lb pool", "account": "ops", "modified_at": 1 }]
            }
        ]
    })
}

#[tokio::test]
async fn test_add_record_patches_merged_rrset() {
    let transport = FakeTransport::default()
        .respond(200, zone_body())
        .respond(204, Value::Null);
    let provider = provider(transport);

    let record = Record::new("example.com", "mail", RecordType::Mx, "mx2.example.com.")
        .with_meta("priority", 20);
    provider.add_record(&record).await.unwrap();

    let calls = provider.transport().calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].0, Method::Get);
    assert_eq!(calls[0].1, "zones/example.com.");
    assert_eq!(calls[1].0, Method::Patch);
    assert_eq!(calls[1].1, "zones/example.com.");
    assert_eq!(
        calls[1].2,
        Some(json!({
            "rrsets": [{
                "name": "mail.example.com.",
                "type": "MX",
                "ttl": 3600,
                "changetype": "REPLACE",
                "records": [
                    { "content": "10 mx1.example.com.", "disabled": false },
                    { "content": "20 mx2.example.com.", "disabled": false }
                ]
            }]
        }))
    );
}

#[tokio::test]
async fn test_remove_record_drops_comments_and_keeps_sibling() {
    let transport = FakeTransport::default()
        .respond(200, zone_body())
        .respond(204, Value::Null);
    let provider = provider(transport);

    let record = Record::new("example.com", "www", RecordType::A, "1.1.1.1");
    provider.remove_record(&record).await.unwrap();

    let calls = provider.transport().calls();
    let body = calls[1].2.as_ref().unwrap();
    assert_eq!(body["rrsets"][0]["changetype"], "REPLACE");
    assert_eq!(body["rrsets"][0]["records"], json!([{ "content": "2.2.2.2", "disabled": false }]));
    assert!(body["rrsets"][0].get("comments").is_none());
}

#[tokio::test]
async fn test_soa_mutation_never_reaches_network() {
    let provider = provider(FakeTransport::default());
    let soa = Record::new(
        "example.com",
        "@",
        RecordType::Soa,
        "ns1.example.net. hostmaster.example.com. 2024010101 3600 1800 604800 600",
    );

    assert!(matches!(
        provider.add_record(&soa).await,
        Err(ProviderError::SoaMutation)
    ));
    assert!(matches!(
        provider.remove_record(&soa).await,
        Err(ProviderError::SoaMutation)
    ));
    assert!(provider.transport().calls().is_empty());
}

#[tokio::test]
async fn test_soa_edit_requires_admin() {
    let provider = provider(FakeTransport::default());
    let old = Record::new(
        "example.com",
        "@",
        RecordType::Soa,
        "ns1.example.net. hostmaster.example.com. 2024010101 3600 1800 604800 600",
    );
    let new = old
        .clone()
        .with_parameter("ns1.example.net. hostmaster.example.com. 2024010102 3600 1800 604800 600");

    assert!(matches!(
        provider.update_record(&old, &new).await,
        Err(ProviderError::SoaEditDenied)
    ));
    assert!(provider.transport().calls().is_empty());
}

#[tokio::test]
async fn test_soa_edit_allowed_for_admin() {
    let transport = FakeTransport::default()
        .respond(
            200,
            json!({
                "name": "example.com.",
                "rrsets": [{
                    "name": "example.com.",
                    "type": "SOA",
                    "ttl": 86400,
                    "records": [{ "content": "ns1.example.net. hostmaster.example.com. 2024010101 3600 1800 604800 600" }]
                }]
            }),
        )
        .respond(204, Value::Null);
    let provider = provider(transport).with_authority(Arc::new(AllowAll { admin: true }));
    let old = Record::new(
        "example.com",
        "@",
        RecordType::Soa,
        "ns1.example.net. hostmaster.example.com. 2024010101 3600 1800 604800 600",
    );
    let new = old
        .clone()
        .with_parameter("ns1.example.net. hostmaster.example.com. 2024010102 3600 1800 604800 600");
    provider.update_record(&old, &new).await.unwrap();

    let calls = provider.transport().calls();
    let body = calls[1].2.as_ref().unwrap();
    assert_eq!(body["rrsets"].as_array().unwrap().len(), 1);
    assert_eq!(
        body["rrsets"][0]["records"][0]["content"],
        "ns1.example.net. hostmaster.example.com. 2024010102 3600 1800 604800 600"
    );
}

#[tokio::test]
async fn test_unowned_zone_rejected() {
    let provider = provider(FakeTransport::default()).with_authority(Arc::new(DenyAll));
    let record = Record::new("example.com", "www", RecordType::A, "192.0.2.1");
    assert!(matches!(
        provider.add_record(&record).await,
        Err(ProviderError::NotOwned(zone)) if zone == "example.com"
    ));
    assert!(provider.transport().calls().is_empty());
}

#[tokio::test]
async fn test_invalid_record_rejected_before_fetch() {
    let provider = provider(FakeTransport::default());
    let record = Record::new("example.com", "www", RecordType::A, "not-an-ip");
    assert!(matches!(
        provider.add_record(&record).await,
        Err(ProviderError::InvalidRecord(_))
    ));
    assert!(provider.transport().calls().is_empty());
}

#[tokio::test]
async fn test_client_rejection_surfaces_reason() {
    let transport = FakeTransport::default()
        .respond(200, zone_body())
        .respond(422, json!({ "error": "RRset www.example.com. IN CNAME: Conflicts with pre-existing RRset" }));
    let provider = provider(transport);
    let record = Record::new("example.com", "www", RecordType::Cname, "target.example.net");

    let err = provider.add_record(&record).await.unwrap_err();
    match err {
        ProviderError::Rejected { status, reason } => {
            assert_eq!(status, 422);
            assert!(reason.contains("Conflicts with pre-existing RRset"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_server_fault_reported_distinctly() {
    let transport = FakeTransport::default().respond(500, json!({ "error": "db down" }));
    let provider = provider(transport);
    let record = Record::new("example.com", "www", RecordType::A, "192.0.2.1");
    assert!(matches!(
        provider.add_record(&record).await,
        Err(ProviderError::Server { status: 500 })
    ));
}

#[tokio::test]
async fn test_update_record_moves_between_names() {
    let transport = FakeTransport::default()
        .respond(200, zone_body())
        .respond(204, Value::Null);
    let provider = provider(transport);

    let old = Record::new("example.com", "www", RecordType::A, "2.2.2.2");
    let new = Record::new("example.com", "api", RecordType::A, "2.2.2.2");
    provider.update_record(&old, &new).await.unwrap();

    let calls = provider.transport().calls();
    let rrsets = calls[1].2.as_ref().unwrap()["rrsets"].as_array().unwrap().clone();
    assert_eq!(rrsets.len(), 2);
    assert_eq!(rrsets[0]["name"], "www.example.com.");
    assert_eq!(rrsets[0]["records"], json!([{ "content": "1.1.1.1", "disabled": false }]));
    assert_eq!(rrsets[1]["name"], "api.example.com.");
    assert_eq!(rrsets[1]["ttl"], 300);
}

#[tokio::test]
async fn test_update_record_across_zones_rejected() {
    let provider = provider(FakeTransport::default());
    let old = Record::new("example.com", "www", RecordType::A, "192.0.2.1");
    let new = Record::new("example.org", "www", RecordType::A, "192.0.2.1");
    assert!(matches!(
        provider.update_record(&old, &new).await,
        Err(ProviderError::InvalidRecord(_))
    ));
}

#[tokio::test]
async fn test_record_exists_flushes_when_dirty() {
    let transport = FakeTransport::default()
        .respond(200, zone_body())
        .respond(204, Value::Null)
        .respond(200, json!({ "count": 1, "result": "Flushed cache." }))
        .respond(200, zone_body());
    let provider = provider(transport);

    let record = Record::new("example.com", "www", RecordType::A, "3.3.3.3");
    provider.add_record(&record).await.unwrap();
    assert!(provider.is_dirty("www.example.com.", RecordType::A));

    // the fake server never applied the patch
    let exists = provider
        .record_exists("example.com", "www", RecordType::A, "2.2.2.2")
        .await
        .unwrap();
    assert!(exists);

    let calls = provider.transport().calls();
    assert_eq!(calls.len(), 4);
    assert_eq!(calls[2].0, Method::Put);
    assert_eq!(calls[2].1, "cache/flush?domain=www.example.com.");
}

#[tokio::test]
async fn test_record_exists_skips_flush_when_clean() {
    let transport = FakeTransport::default().respond(200, zone_body());
    let provider = provider(transport);

    assert!(
        !provider
            .record_exists("example.com", "www", RecordType::A, "9.9.9.9")
            .await
            .unwrap()
    );
    assert_eq!(provider.transport().calls().len(), 1);
}

#[tokio::test]
async fn test_dirty_window_expires_with_clock() {
    let clock = ManualClock::at(T0);
    let transport = FakeTransport::default()
        .respond(200, zone_body())
        .respond(204, Value::Null);
    let provider = PowerDnsProvider::with_clock(config(), transport, clock.clone());

    let record = Record::new("example.com", "a", RecordType::A, "192.0.2.1");
    provider.add_record(&record).await.unwrap();

    clock.set(T0 + 10);
    assert!(provider.is_dirty("a.example.com.", RecordType::A));
    assert!(!provider.is_dirty("b.example.com.", RecordType::A));
    clock.set(T0 + 25);
    assert!(!provider.is_dirty("a.example.com.", RecordType::A));
}

#[tokio::test]
async fn test_flush_rejects_malformed_domain() {
    let provider = provider(FakeTransport::default());
    assert!(matches!(
        provider.flush("not a domain").await,
        Err(ProviderError::InvalidDomain(_))
    ));
    assert!(provider.transport().calls().is_empty());
}

#[tokio::test]
async fn test_add_zone_provisions_soa_and_ns() {
    let transport = FakeTransport::default().respond(201, json!({ "name": "example.com." }));
    let provider = provider(transport);
    provider.add_zone("example.com").await.unwrap();

    let calls = provider.transport().calls();
    assert_eq!(calls[0].0, Method::Post);
    assert_eq!(calls[0].1, "zones");
    let body = calls[0].2.as_ref().unwrap();
    assert_eq!(body["name"], "example.com.");
    assert_eq!(body["kind"], "Native");
    assert_eq!(body["nameservers"], json!([]));
    assert_eq!(body["rrsets"][0]["type"], "SOA");
    assert_eq!(body["rrsets"][1]["type"], "NS");
    assert_eq!(
        body["rrsets"][1]["records"],
        json!([
            { "content": "ns1.example.net.", "disabled": false },
            { "content": "ns2.example.net.", "disabled": false }
        ])
    );
    assert!(body["rrsets"][0].get("changetype").is_none());
}

#[tokio::test]
async fn test_add_zone_requires_201() {
    let transport = FakeTransport::default().respond(200, json!({}));
    let provider = provider(transport);
    assert!(matches!(
        provider.add_zone("example.com").await,
        Err(ProviderError::UnexpectedStatus {
            expected: 201,
            actual: 200
        })
    ));
}

#[test]
fn test_initial_soa_content() {
    let mut config = config();
    config.soa_contact = Some("dns.admin@{domain}".into());
    let provider = PowerDnsProvider::with_clock(config, FakeTransport::default(), ManualClock::at(T0));
    let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
    let rrsets = provider.initial_rrsets("example.com", date).unwrap();

    assert_eq!(rrsets[0].name, "example.com.");
    assert_eq!(rrsets[0].ttl, Some(86400));
    assert_eq!(
        rrsets[0].records[0].content,
        "ns1.example.net. dns\\.admin.example.com. 2024050101 3600 1800 604800 600"
    );
}

#[test]
fn test_initial_rrsets_need_nameservers() {
    let config = ProviderConfig::new("http://127.0.0.1:8081/api/v1", "secret");
    let provider = PowerDnsProvider::with_clock(config, FakeTransport::default(), ManualClock::at(T0));
    let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
    assert!(matches!(
        provider.initial_rrsets("example.com", date),
        Err(ProviderError::Config(_))
    ));
}

#[tokio::test]
async fn test_remove_zone_and_exists() {
    let transport = FakeTransport::default()
        .respond(204, Value::Null)
        .respond(404, json!({ "error": "Could not find domain 'example.com.'" }));
    let provider = provider(transport);

    provider.remove_zone("example.com").await.unwrap();
    assert!(!provider.zone_exists("example.com").await.unwrap());

    let calls = provider.transport().calls();
    assert_eq!(calls[0].0, Method::Delete);
    assert_eq!(calls[0].1, "zones/example.com.");
}

#[tokio::test]
async fn test_list_and_export_zones() {
    let transport = FakeTransport::default()
        .respond(
            200,
            json!([
                { "id": "example.com.", "name": "example.com.", "kind": "Native" },
                { "id": "example.org.", "name": "example.org.", "kind": "Master" }
            ]),
        )
        .respond(200, json!({ "zone": "example.com.\t3600\tIN\tSOA\t..." }));
    let provider = provider(transport);

    assert_eq!(provider.list_zones().await.unwrap(), ["example.com", "example.org"]);
    let export = provider.export_zone("example.com").await.unwrap();
    assert!(export.starts_with("example.com."));
    assert_eq!(provider.transport().calls()[1].1, "zones/example.com./export");
}

#[tokio::test]
async fn test_zone_records_are_relative() {
    let transport = FakeTransport::default().respond(200, zone_body());
    let provider = provider(transport);
    let records = provider.zone_records("example.com").await.unwrap();

    assert_eq!(records.len(), 3);
    assert_eq!(records[0].name, "mail");
    assert_eq!(records[0].rtype, RecordType::Mx);
    assert_eq!(records[0].ttl, Some(3600));
    assert_eq!(records[2].parameter, "2.2.2.2");
}

#[tokio::test]
async fn test_verify_key_reports_reason() {
    let transport = FakeTransport::default()
        .respond(401, json!({ "errors": [{ "reason": "Unauthorized" }] }))
        .respond(403, Value::Null);
    let provider = provider(transport);

    let err = provider.verify_key().await.unwrap_err();
    assert!(err.to_string().ends_with("Unauthorized"));
    let err = provider.verify_key().await.unwrap_err();
    assert!(err.to_string().ends_with("Invalid key"));
}

#[tokio::test]
async fn test_connect_failure_propagates() {
    let provider = provider(FakeTransport::default());
    assert!(matches!(
        provider.zone_exists("example.com").await,
        Err(ProviderError::Connect(_))
    ));
}
