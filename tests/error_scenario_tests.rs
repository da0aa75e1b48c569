use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use youtrack_export::{
    Error, ExportConfig, ExportService, IssueFilter, JsonExportStore, Project, RetryPolicy,
    YouTrackClient, YouTrackConfig,
};

fn demo_project() -> Project {
    serde_json::from_value(json!({
        "id": "0-1",
        "name": "Demo Project",
        "shortName": "DEMO"
    }))
    .unwrap()
}

fn client_for(server: &MockServer) -> YouTrackClient {
    let config = YouTrackConfig::new(server.uri(), "perm:test").unwrap();
    YouTrackClient::new(config).unwrap().with_retry(
        RetryPolicy::new()
            .max_attempts(2)
            .base_delay(Duration::from_millis(1)),
    )
}

fn fast_config() -> ExportConfig {
    ExportConfig::new().poll_delay(Duration::from_millis(10))
}

async fn mount_count(server: &MockServer, count: i64) {
    Mock::given(method("POST"))
        .and(path("/api/issuesGetter/count"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "count": count })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_auth_failure_aborts_run_without_writing_files() {
    // Given: 認証エラーを返すモックサーバー
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/issuesGetter/count"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let client = client_for(&server);
    let mut store = JsonExportStore::new(temp_dir.path());
    let mut service = ExportService::new(fast_config());

    // When: エクスポートを実行
    let result = service
        .run(&client, &mut store, &[demo_project()], &IssueFilter::new())
        .await;

    // Then: 実行全体が中断され、ファイルは一切作られない
    let error = result.unwrap_err();
    assert!(matches!(error, Error::AuthenticationFailed(_)));
    assert_eq!(error.exit_code(), 1);
    assert!(service.current_state().is_error());
    assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_vanished_issue_is_skipped_and_recorded() {
    // Given: 一覧には2件あるが、1件は詳細取得で404になるケース
    let server = MockServer::start().await;
    mount_count(&server, 2).await;

    Mock::given(method("GET"))
        .and(path("/api/issues"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "2-1", "idReadable": "DEMO-1", "summary": "Still here" },
            { "id": "2-2", "idReadable": "DEMO-2", "summary": "Deleted meanwhile" }
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/issues/2-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "2-1", "idReadable": "DEMO-1", "summary": "Still here"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/issues/2-2"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Issue not found"))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let client = client_for(&server);
    let mut store = JsonExportStore::new(temp_dir.path());
    let mut service = ExportService::new(fast_config());

    // When: エクスポートを実行
    let result = service
        .run(&client, &mut store, &[demo_project()], &IssueFilter::new())
        .await
        .unwrap();

    // Then: 消えたIssueはスキップとして記録され、実行は成功扱い
    assert!(result.is_success);
    assert_eq!(result.exported_count, 1);
    assert_eq!(result.skipped_count, 1);
    assert_eq!(result.exit_code(), 0);

    let stats = &result.project_stats["Demo Project"];
    assert_eq!(stats.skipped_issues, vec!["DEMO-2"]);

    let metadata =
        std::fs::read_to_string(temp_dir.path().join("demo-project/metadata.json")).unwrap();
    let metadata: serde_json::Value = serde_json::from_str(&metadata).unwrap();
    assert_eq!(metadata["skipped_issues"][0], "DEMO-2");
    assert_eq!(metadata["total_issues"], 1);
}

#[tokio::test]
async fn test_vanished_attachment_is_skipped_but_issue_is_kept() {
    // Given: 添付ファイルのダウンロードだけ404になるケース
    let server = MockServer::start().await;
    mount_count(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/api/issues"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "2-1", "idReadable": "DEMO-1", "summary": "First" }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/issues/2-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "2-1",
            "idReadable": "DEMO-1",
            "summary": "First",
            "attachments": [
                { "id": "5-1", "name": "gone.png", "url": "/attachments/5-1/gone.png" }
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/attachments/5-1/gone.png"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not found"))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let client = client_for(&server);
    let mut store = JsonExportStore::new(temp_dir.path());
    let mut service = ExportService::new(fast_config());

    // When: エクスポートを実行
    let result = service
        .run(&client, &mut store, &[demo_project()], &IssueFilter::new())
        .await
        .unwrap();

    // Then: Issue本体は書かれ、添付だけスキップされる
    assert!(result.is_success);
    assert_eq!(result.exported_count, 1);
    assert_eq!(result.attachment_count, 0);
    assert!(temp_dir.path().join("demo-project/issues/DEMO-1.json").exists());

    let stats = &result.project_stats["Demo Project"];
    assert_eq!(stats.skipped_attachment_count, 1);
}

#[tokio::test]
async fn test_persistent_server_error_is_recorded_as_network_failure() {
    // Given: Issue詳細が常に500を返すケース（リトライしても回復しない）
    let server = MockServer::start().await;
    mount_count(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/api/issues"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "2-1", "idReadable": "DEMO-1", "summary": "First" }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/issues/2-1"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let client = client_for(&server);
    let mut store = JsonExportStore::new(temp_dir.path());
    let mut service = ExportService::new(fast_config());

    // When: エクスポートを実行
    let result = service
        .run(&client, &mut store, &[demo_project()], &IssueFilter::new())
        .await
        .unwrap();

    // Then: ネットワークエラーとして記録され、終了コードは2
    assert!(!result.is_success);
    assert_eq!(result.exported_count, 0);
    assert_eq!(result.network_failure_count, 1);
    assert_eq!(result.exit_code(), 2);
    assert!(service.current_state().is_error());
}

#[tokio::test]
async fn test_transient_server_error_is_retried() {
    // Given: 1回だけ500を返し、その後は成功するモックサーバー
    let server = MockServer::start().await;
    mount_count(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/api/issues"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "2-1", "idReadable": "DEMO-1", "summary": "First" }
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/issues/2-1"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/issues/2-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "2-1", "idReadable": "DEMO-1", "summary": "First"
        })))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let client = client_for(&server);
    let mut store = JsonExportStore::new(temp_dir.path());
    let mut service = ExportService::new(fast_config());

    // When: エクスポートを実行
    let result = service
        .run(&client, &mut store, &[demo_project()], &IssueFilter::new())
        .await
        .unwrap();

    // Then: リトライで回復して成功する
    assert!(result.is_success);
    assert_eq!(result.exported_count, 1);
}

#[tokio::test]
async fn test_project_failure_does_not_stop_other_projects() {
    // Given: 1つ目のプロジェクトだけ件数取得が失敗し続けるケース
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/issuesGetter/count"))
        .and(wiremock::matchers::body_json(
            json!({ "query": "project: {DEMO}" }),
        ))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/issuesGetter/count"))
        .and(wiremock::matchers::body_json(
            json!({ "query": "project: {SBX}" }),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "count": 1 })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/issues"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "2-5", "idReadable": "SBX-1", "summary": "Sandbox issue" }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/issues/2-5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "2-5", "idReadable": "SBX-1", "summary": "Sandbox issue"
        })))
        .mount(&server)
        .await;

    let sandbox: Project = serde_json::from_value(json!({
        "id": "0-2",
        "name": "Sandbox",
        "shortName": "SBX"
    }))
    .unwrap();

    let temp_dir = TempDir::new().unwrap();
    let client = client_for(&server);
    let mut store = JsonExportStore::new(temp_dir.path());
    let mut service = ExportService::new(fast_config());

    // When: 2プロジェクトを順にエクスポート
    let result = service
        .run(
            &client,
            &mut store,
            &[demo_project(), sandbox],
            &IssueFilter::new(),
        )
        .await
        .unwrap();

    // Then: 失敗したプロジェクトは記録され、残りはエクスポートされる
    assert!(!result.is_success);
    assert_eq!(result.exported_count, 1);
    assert_eq!(result.network_failure_count, 1);
    assert_eq!(result.exit_code(), 2);
    assert!(temp_dir.path().join("sandbox/issues/SBX-1.json").exists());
    assert!(!temp_dir.path().join("demo-project/issues").exists());
}
