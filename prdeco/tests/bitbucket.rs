mod common;

use prdeco::decorator::bitbucket::BitbucketCloudDecorator;
use prdeco::{
    Credentials, DecorationSettings, HostBinding, Orchestrator, Platform, UploadLimit, decorate,
};
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{analysis, issues};

const REPORT: &str = "/rest/insights/1.0/projects/PRJ/repos/web/commits/c0ffee/reports/com.sonarsource.quality-gate";

fn server_binding(server: &MockServer) -> HostBinding {
    HostBinding {
        platform: Platform::Bitbucket,
        url: server.uri(),
        project: Some("PRJ".into()),
        repository: "web".into(),
        credentials: Credentials::Token {
            token: "bbs-token".into(),
        },
        summary_comment: true,
        upload_limit: None,
    }
}

async fn mount_server_identity(server: &MockServer, version: &str) {
    Mock::given(method("GET"))
        .and(path("/rest/api/1.0/projects/PRJ/repos/web"))
        .and(header("authorization", "Bearer bbs-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "slug": "web" })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/api/1.0/application-properties"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "version": version })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn server_report_is_replaced_and_annotations_batched() {
    let server = MockServer::start().await;
    mount_server_identity(&server, "7.21.0").await;

    Mock::given(method("DELETE"))
        .and(path(format!("{REPORT}/annotations")))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(REPORT))
        .and(body_partial_json(json!({
            "title": "SonarQube",
            "result": "FAIL",
            "reporter": "SonarQube",
            "createdDate": 1714557600000i64,
            "link": "https://sonar.example.com/dashboard?id=acme-key&pullRequest=7",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{REPORT}/annotations")))
        .respond_with(ResponseTemplate::new(204))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/build-status/1.0/commits/c0ffee"))
        .and(body_partial_json(json!({ "state": "FAILED", "key": "com.sonarsource.quality-gate" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let mut binding = server_binding(&server);
    binding.upload_limit = Some(UploadLimit::new(2, 5));
    let result = decorate(&binding, &DecorationSettings::default(), &analysis(issues(7)))
        .await
        .unwrap();

    assert!(result.published);
    assert_eq!(
        result.url,
        format!("{}/projects/PRJ/repos/web/pull-requests/7", server.uri())
    );

    let requests = server.received_requests().await.unwrap();
    let sizes: Vec<usize> = requests
        .iter()
        .filter(|r| r.method.as_str() == "POST" && r.url.path() == format!("{REPORT}/annotations"))
        .map(|r| {
            let body: Value = serde_json::from_slice(&r.body).unwrap();
            body["annotations"].as_array().unwrap().len()
        })
        .collect();
    assert_eq!(sizes, vec![2, 2, 1]);

    let report = requests
        .iter()
        .find(|r| r.method.as_str() == "PUT")
        .map(|r| serde_json::from_slice::<Value>(&r.body).unwrap())
        .unwrap();
    let data = report["data"].as_array().unwrap();
    assert_eq!(data.len(), 6);
    assert_eq!(data[0], json!({ "title": "Bugs", "type": "TEXT", "value": "0 Issues" }));
    assert_eq!(data[2]["value"], "7 Issues");
    assert_eq!(data[3], json!({ "title": "Code coverage", "type": "PERCENTAGE", "value": 64.5 }));
    assert_eq!(data[5]["type"], "LINK");
    assert_eq!(data[5]["value"]["linktext"], "Go to analysis");
}

#[tokio::test]
async fn failed_annotation_batch_aborts_the_run() {
    let server = MockServer::start().await;
    mount_server_identity(&server, "8.9.0").await;

    Mock::given(method("DELETE"))
        .and(path(format!("{REPORT}/annotations")))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(REPORT))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{REPORT}/annotations")))
        .respond_with(ResponseTemplate::new(204))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{REPORT}/annotations")))
        .respond_with(ResponseTemplate::new(500).set_body_string("insights unavailable"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/build-status/1.0/commits/c0ffee"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let mut binding = server_binding(&server);
    binding.upload_limit = Some(UploadLimit::new(2, 6));
    let err = decorate(&binding, &DecorationSettings::default(), &analysis(issues(6)))
        .await
        .unwrap_err();

    assert!(matches!(err, prdeco::Error::Decoration { platform: "bitbucket-server", .. }));
    assert_eq!(err.kind(), prdeco::ErrorKind::Transport);
    assert_eq!(err.status().map(|s| s.as_u16()), Some(500));

    let batches = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.method.as_str() == "POST" && r.url.path() == format!("{REPORT}/annotations"))
        .count();
    assert_eq!(batches, 2);
}

#[tokio::test]
async fn server_without_code_insights_publishes_nothing() {
    let server = MockServer::start().await;
    mount_server_identity(&server, "5.14.2").await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let result = decorate(
        &server_binding(&server),
        &DecorationSettings::default(),
        &analysis(issues(2)),
    )
    .await
    .unwrap();

    assert!(!result.published);
}

#[tokio::test]
async fn cloud_report_uses_snake_case_and_annotation_arrays() {
    let server = MockServer::start().await;
    let repo = "/2.0/repositories/acme/web";
    let report = format!("{repo}/commit/c0ffee/reports/com.sonarsource.quality-gate");

    Mock::given(method("GET"))
        .and(path(repo))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "slug": "web" })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(report.as_str()))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(report.as_str()))
        .and(body_partial_json(json!({
            "result": "FAILED",
            "report_type": "BUG",
            "created_on": "2024-05-01T10:00:00Z",
            "remote_link_enabled": true,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{report}/annotations")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{repo}/commit/c0ffee/statuses/build")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let binding = HostBinding {
        platform: Platform::Bitbucket,
        url: format!("{}/2.0", server.uri()),
        project: Some("acme".into()),
        repository: "web".into(),
        credentials: Credentials::Token {
            token: "bbc-token".into(),
        },
        summary_comment: true,
        upload_limit: None,
    };
    let settings = DecorationSettings::default();
    let decorator =
        BitbucketCloudDecorator::new(&binding, settings.report_key.as_str(), "7").unwrap();
    let result = Orchestrator::new(&settings)
        .run(&decorator, &analysis(issues(3)))
        .await
        .unwrap();

    assert_eq!(result.url, format!("{}/acme/web/pull-requests/7", server.uri()));

    let requests = server.received_requests().await.unwrap();
    let annotations = requests
        .iter()
        .find(|r| r.method.as_str() == "POST" && r.url.path().ends_with("/annotations"))
        .map(|r| serde_json::from_slice::<Value>(&r.body).unwrap())
        .unwrap();
    let annotations = annotations.as_array().unwrap();
    assert_eq!(annotations.len(), 3);
    assert_eq!(annotations[0]["annotation_type"], "CODE_SMELL");
    assert_eq!(annotations[0]["severity"], "MEDIUM");
    assert_eq!(annotations[0]["external_id"], "AX-0");
}
