use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use base64::Engine;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Map, Value};
use tower::util::ServiceExt;

use ingest_runtime::{
    build_router, DatatypeRegistry, ExecutorConfig, InMemoryOutputRegistry, UploadApiState,
    UploadExecutor,
};

const ONE_TO_SIX_ON_WINDOWS: &str = "1\t2\t3\r\n4\t5\t6\r\n";
const ONE_TO_SIX_WITH_TABS: &str = "1\t2\t3\n4\t5\t6\n";
const ONE_TO_SIX_WITH_SPACES: &str = "1 2 3\n4 5 6\n";

fn test_router() -> Router {
    let executor = UploadExecutor::new(
        Arc::new(InMemoryOutputRegistry::new()),
        Arc::new(DatatypeRegistry::builtin()),
        ExecutorConfig::default(),
    )
    .expect("executor");
    build_router(UploadApiState::new(Arc::new(executor)))
}

async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Vec<u8>) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request");
    let resp = router.clone().oneshot(req).await.expect("response");
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body");
    (status, bytes.to_vec())
}

async fn send_json(
    router: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let (status, bytes) = send(router, method, uri, body).await;
    let json = serde_json::from_slice(&bytes).expect("json body");
    (status, json)
}

async fn new_history(router: &Router) -> String {
    let (status, json) = send_json(router, Method::POST, "/api/histories", None).await;
    assert_eq!(status, StatusCode::OK);
    json["data"]["id"].as_str().expect("history id").to_string()
}

/// Single pasted dataset in slot 0; `extra` entries override or add inputs.
fn upload_payload(history_id: &str, content: &str, extra: Value) -> Value {
    let mut inputs = Map::new();
    inputs.insert("files_0|url_paste".into(), json!(content));
    inputs.insert("files_0|type".into(), json!("upload_dataset"));
    inputs.insert("file_type".into(), json!("auto"));
    inputs.insert("dbkey".into(), json!("?"));
    if let Value::Object(extra) = extra {
        inputs.extend(extra);
    }
    json!({
        "tool_id": "upload1",
        "history_id": history_id,
        "inputs": inputs,
    })
}

async fn wait_for_job(router: &Router, job_id: &str) -> Value {
    for _ in 0..500 {
        let (status, json) =
            send_json(router, Method::GET, &format!("/api/jobs/{}", job_id), None).await;
        assert_eq!(status, StatusCode::OK);
        let state = json["data"]["state"].as_str().expect("job state").to_string();
        if !matches!(state.as_str(), "pending" | "running") {
            return json["data"].clone();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} did not finish", job_id);
}

/// Posts the tool run, waits for its job and returns the finished dataset views.
async fn run_upload(router: &Router, payload: Value) -> Vec<Value> {
    let history_id = payload["history_id"].as_str().expect("history").to_string();
    let (status, json) = send_json(router, Method::POST, "/api/tools", Some(payload)).await;
    assert_eq!(status, StatusCode::OK, "{}", json);
    let job_id = json["data"]["jobs"][0]["id"].as_str().expect("job id").to_string();
    let job = wait_for_job(router, &job_id).await;
    assert_eq!(job["state"], "ok", "{}", job);

    let mut datasets = Vec::new();
    for output in json["data"]["outputs"].as_array().expect("outputs") {
        let dataset_id = output["id"].as_str().expect("dataset id");
        let (status, details) = send_json(
            router,
            Method::GET,
            &format!("/api/histories/{}/contents/{}", history_id, dataset_id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        datasets.push(details["data"].clone());
    }
    datasets
}

async fn dataset_bytes(router: &Router, dataset: &Value, filename: Option<&str>) -> Vec<u8> {
    let mut uri = format!(
        "/api/histories/{}/contents/{}/display",
        dataset["history_id"].as_str().expect("history id"),
        dataset["id"].as_str().expect("dataset id")
    );
    if let Some(filename) = filename {
        uri.push_str(&format!("?filename={}", filename));
    }
    let (status, bytes) = send(router, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    bytes
}

async fn dataset_content(router: &Router, dataset: &Value) -> String {
    String::from_utf8(dataset_bytes(router, dataset, None).await).expect("utf8 content")
}

async fn upload_and_get_content(content: &str, extra: Value) -> String {
    let router = test_router();
    let history_id = new_history(&router).await;
    let datasets = run_upload(&router, upload_payload(&history_id, content, extra)).await;
    assert_eq!(datasets.len(), 1);
    dataset_content(&router, &datasets[0]).await
}

async fn velvet_upload(router: &Router, extra: Value) -> Value {
    let history_id = new_history(router).await;
    let mut overrides = json!({ "file_type": "velvet" });
    if let (Value::Object(target), Value::Object(extra)) = (&mut overrides, extra) {
        target.extend(extra);
    }
    let datasets = run_upload(
        router,
        upload_payload(&history_id, "sequences content", overrides),
    )
    .await;
    assert_eq!(datasets.len(), 1);
    datasets[0].clone()
}

#[tokio::test]
async fn upload1_paste_returns_outputs() {
    let router = test_router();
    let history_id = new_history(&router).await;
    let (status, json) = send_json(
        &router,
        Method::POST,
        "/api/tools",
        Some(upload_payload(&history_id, "Hello World", json!({}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let outputs = json["data"]["outputs"].as_array().expect("outputs");
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0]["name"], "Pasted Entry");
    assert_eq!(outputs[0]["hid"], 1);
}

#[tokio::test]
async fn upload_posix_newline_fixes() {
    let content = upload_and_get_content(ONE_TO_SIX_ON_WINDOWS, json!({})).await;
    assert_eq!(content, ONE_TO_SIX_WITH_TABS);
}

#[tokio::test]
async fn upload_disable_posix_fix() {
    let content = upload_and_get_content(
        ONE_TO_SIX_ON_WINDOWS,
        json!({ "files_0|to_posix_lines": null }),
    )
    .await;
    assert_eq!(content, ONE_TO_SIX_ON_WINDOWS);
}

#[tokio::test]
async fn upload_space_to_tab() {
    let content =
        upload_and_get_content(ONE_TO_SIX_WITH_SPACES, json!({ "files_0|space_to_tab": "Yes" }))
            .await;
    assert_eq!(content, ONE_TO_SIX_WITH_TABS);
}

#[tokio::test]
async fn upload_space_to_tab_off_by_default() {
    let content = upload_and_get_content(ONE_TO_SIX_WITH_SPACES, json!({})).await;
    assert_eq!(content, ONE_TO_SIX_WITH_SPACES);
}

#[tokio::test]
async fn rdata_is_not_decompressed() {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(b"RDX2\nX\n\x00\x00\x00\x02\x00\x03\x03\x00")
        .expect("write rdata");
    let rdata = encoder.finish().expect("gzip rdata");

    let router = test_router();
    let history_id = new_history(&router).await;
    let encoded = base64::engine::general_purpose::STANDARD.encode(&rdata);
    let datasets = run_upload(
        &router,
        upload_payload(&history_id, "", json!({ "files_0|file_data": encoded })),
    )
    .await;
    assert_eq!(datasets[0]["file_ext"], "rdata");
    assert_eq!(datasets[0]["name"], "Uploaded File");
    assert_eq!(dataset_bytes(&router, &datasets[0], None).await, rdata);
}

#[tokio::test]
async fn composite_datatype() {
    let router = test_router();
    let dataset = velvet_upload(
        &router,
        json!({
            "files_1|url_paste": "roadmaps content",
            "files_1|type": "upload_dataset",
            "files_2|url_paste": "log content",
            "files_2|type": "upload_dataset",
        }),
    )
    .await;
    assert_eq!(dataset["file_ext"], "velvet");
    assert_eq!(dataset["parts"], json!(["Log", "Roadmaps", "Sequences"]));
    let roadmaps = dataset_bytes(&router, &dataset, Some("Roadmaps")).await;
    assert_eq!(String::from_utf8_lossy(&roadmaps).trim(), "roadmaps content");
    let primary = dataset_content(&router, &dataset).await;
    assert_eq!(primary, "Sequences\nRoadmaps\nLog\n");
}

#[tokio::test]
async fn composite_datatype_space_to_tab() {
    let router = test_router();
    let dataset = velvet_upload(
        &router,
        json!({
            "files_1|url_paste": "roadmaps content",
            "files_1|type": "upload_dataset",
            "files_1|space_to_tab": "Yes",
            "files_2|url_paste": "log content",
            "files_2|type": "upload_dataset",
        }),
    )
    .await;
    let roadmaps = dataset_bytes(&router, &dataset, Some("Roadmaps")).await;
    assert_eq!(String::from_utf8_lossy(&roadmaps).trim(), "roadmaps\tcontent");
    let log = dataset_bytes(&router, &dataset, Some("Log")).await;
    assert_eq!(String::from_utf8_lossy(&log).trim(), "log content");
}

#[tokio::test]
async fn composite_datatype_posix_lines() {
    let router = test_router();
    let dataset = velvet_upload(
        &router,
        json!({
            "files_1|url_paste": "roadmaps\rcontent",
            "files_1|type": "upload_dataset",
            "files_1|space_to_tab": "Yes",
            "files_2|url_paste": "log\rcontent",
            "files_2|type": "upload_dataset",
        }),
    )
    .await;
    let roadmaps = dataset_bytes(&router, &dataset, Some("Roadmaps")).await;
    assert_eq!(String::from_utf8_lossy(&roadmaps).trim(), "roadmaps\ncontent");
}

#[tokio::test]
async fn composite_part_lookup_misses_are_not_found() {
    let router = test_router();
    let dataset = velvet_upload(
        &router,
        json!({
            "files_1|url_paste": "roadmaps content",
            "files_1|type": "upload_dataset",
        }),
    )
    .await;
    let uri = format!(
        "/api/histories/{}/contents/{}/display?filename=Log",
        dataset["history_id"].as_str().expect("history id"),
        dataset["id"].as_str().expect("dataset id")
    );
    let (status, json) = send_json(&router, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "not_found");
}

#[tokio::test]
async fn upload_dbkey() {
    let router = test_router();
    let history_id = new_history(&router).await;
    let datasets = run_upload(
        &router,
        upload_payload(&history_id, "Test123", json!({ "dbkey": "hg19" })),
    )
    .await;
    assert_eq!(datasets[0]["genome_build"], "hg19");
}

#[tokio::test]
async fn upload_multiple_files_1() {
    let router = test_router();
    let history_id = new_history(&router).await;
    let datasets = run_upload(
        &router,
        upload_payload(
            &history_id,
            "Test123",
            json!({
                "dbkey": "hg19",
                "files_1|url_paste": "SecondOutputContent",
                "files_1|NAME": "SecondOutputName",
                "files_1|file_type": "tabular",
                "files_1|dbkey": "hg18",
                "file_count": "2",
            }),
        ),
    )
    .await;

    assert_eq!(datasets.len(), 2);
    assert_eq!(dataset_content(&router, &datasets[0]).await.trim(), "Test123");
    assert_eq!(datasets[0]["file_ext"], "txt");
    assert_eq!(datasets[0]["genome_build"], "hg19");

    assert_eq!(
        dataset_content(&router, &datasets[1]).await.trim(),
        "SecondOutputContent"
    );
    assert_eq!(datasets[1]["name"], "SecondOutputName");
    assert_eq!(datasets[1]["file_ext"], "tabular");
    assert_eq!(datasets[1]["genome_build"], "hg18");
}

#[tokio::test]
async fn upload_multiple_files_2() {
    let router = test_router();
    let history_id = new_history(&router).await;
    let datasets = run_upload(
        &router,
        upload_payload(
            &history_id,
            "Test123",
            json!({
                "file_type": "tabular",
                "dbkey": "hg19",
                "files_1|url_paste": "SecondOutputContent",
                "files_1|NAME": "SecondOutputName",
                "files_1|file_type": "txt",
                "files_1|dbkey": "hg18",
                "file_count": "2",
            }),
        ),
    )
    .await;

    assert_eq!(datasets.len(), 2);
    assert_eq!(dataset_content(&router, &datasets[0]).await.trim(), "Test123");
    assert_eq!(datasets[0]["file_ext"], "tabular");
    assert_eq!(datasets[0]["genome_build"], "hg19");

    assert_eq!(
        dataset_content(&router, &datasets[1]).await.trim(),
        "SecondOutputContent"
    );
    assert_eq!(datasets[1]["file_ext"], "txt");
    assert_eq!(datasets[1]["genome_build"], "hg18");
}

#[tokio::test]
async fn upload_multiple_files_3() {
    let router = test_router();
    let history_id = new_history(&router).await;
    let datasets = run_upload(
        &router,
        upload_payload(
            &history_id,
            "Test123",
            json!({
                "file_type": "tabular",
                "dbkey": "hg19",
                "files_0|file_type": "txt",
                "files_0|dbkey": "hg18",
                "files_1|url_paste": "SecondOutputContent",
                "files_1|NAME": "SecondOutputName",
                "files_1|file_type": "txt",
                "files_1|dbkey": "hg18",
                "file_count": "2",
            }),
        ),
    )
    .await;

    assert_eq!(datasets.len(), 2);
    assert_eq!(dataset_content(&router, &datasets[0]).await.trim(), "Test123");
    assert_eq!(datasets[0]["file_ext"], "txt");
    assert_eq!(datasets[0]["genome_build"], "hg18");

    assert_eq!(
        dataset_content(&router, &datasets[1]).await.trim(),
        "SecondOutputContent"
    );
    assert_eq!(datasets[1]["file_ext"], "txt");
    assert_eq!(datasets[1]["genome_build"], "hg18");
}

#[tokio::test]
async fn upload_multiple_files_space_to_tab() {
    let router = test_router();
    let history_id = new_history(&router).await;
    let datasets = run_upload(
        &router,
        upload_payload(
            &history_id,
            ONE_TO_SIX_WITH_SPACES,
            json!({
                "file_type": "tabular",
                "dbkey": "hg19",
                "files_0|file_type": "txt",
                "files_0|space_to_tab": "Yes",
                "files_1|url_paste": ONE_TO_SIX_WITH_SPACES,
                "files_1|NAME": "SecondOutputName",
                "files_1|file_type": "txt",
                "files_2|url_paste": ONE_TO_SIX_WITH_SPACES,
                "files_2|NAME": "ThirdOutputName",
                "files_2|file_type": "txt",
                "files_2|space_to_tab": "Yes",
                "file_count": "3",
            }),
        ),
    )
    .await;

    assert_eq!(datasets.len(), 3);
    assert_eq!(dataset_content(&router, &datasets[0]).await, ONE_TO_SIX_WITH_TABS);
    assert_eq!(dataset_content(&router, &datasets[1]).await, ONE_TO_SIX_WITH_SPACES);
    assert_eq!(dataset_content(&router, &datasets[2]).await, ONE_TO_SIX_WITH_TABS);
}

#[tokio::test]
async fn multiple_files_posix_lines() {
    let router = test_router();
    let history_id = new_history(&router).await;
    let datasets = run_upload(
        &router,
        upload_payload(
            &history_id,
            ONE_TO_SIX_ON_WINDOWS,
            json!({
                "file_type": "tabular",
                "dbkey": "hg19",
                "files_0|file_type": "txt",
                "files_0|to_posix_lines": "Yes",
                "files_1|url_paste": ONE_TO_SIX_ON_WINDOWS,
                "files_1|NAME": "SecondOutputName",
                "files_1|file_type": "txt",
                "files_1|to_posix_lines": null,
                "files_2|url_paste": ONE_TO_SIX_ON_WINDOWS,
                "files_2|NAME": "ThirdOutputName",
                "files_2|file_type": "txt",
                "file_count": "3",
            }),
        ),
    )
    .await;

    assert_eq!(datasets.len(), 3);
    assert_eq!(dataset_content(&router, &datasets[0]).await, ONE_TO_SIX_WITH_TABS);
    assert_eq!(dataset_content(&router, &datasets[1]).await, ONE_TO_SIX_ON_WINDOWS);
    assert_eq!(dataset_content(&router, &datasets[2]).await, ONE_TO_SIX_WITH_TABS);
}

#[tokio::test]
async fn history_contents_follow_slot_order() {
    let router = test_router();
    let history_id = new_history(&router).await;
    run_upload(
        &router,
        upload_payload(
            &history_id,
            "first",
            json!({
                "files_1|url_paste": "second",
                "files_1|NAME": "B",
                "files_2|url_paste": "third",
                "files_2|NAME": "C",
                "file_count": "3",
            }),
        ),
    )
    .await;

    let (status, json) = send_json(
        &router,
        Method::GET,
        &format!("/api/histories/{}/contents", history_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let contents = json["data"].as_array().expect("contents");
    let names: Vec<&str> = contents
        .iter()
        .map(|d| d["name"].as_str().expect("name"))
        .collect();
    assert_eq!(names, vec!["Pasted Entry", "B", "C"]);
    let hids: Vec<u64> = contents
        .iter()
        .map(|d| d["hid"].as_u64().expect("hid"))
        .collect();
    assert_eq!(hids, vec![1, 2, 3]);
    assert!(contents.iter().all(|d| d["state"] == "ok"));
}

#[tokio::test]
async fn invalid_slot_spec_rejects_whole_request() {
    let router = test_router();
    let history_id = new_history(&router).await;
    let (status, json) = send_json(
        &router,
        Method::POST,
        "/api/tools",
        Some(upload_payload(
            &history_id,
            "Test123",
            json!({
                "files_1|url_paste": "beyond file_count",
                "file_count": "1",
            }),
        )),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "invalid_argument");

    let (_, json) = send_json(
        &router,
        Method::GET,
        &format!("/api/histories/{}/contents", history_id),
        None,
    )
    .await;
    assert_eq!(json["data"], json!([]));
}

#[tokio::test]
async fn unresolvable_unit_fails_its_job() {
    let router = test_router();
    let history_id = new_history(&router).await;
    let (status, json) = send_json(
        &router,
        Method::POST,
        "/api/tools",
        Some(upload_payload(
            &history_id,
            "Test123",
            json!({
                "files_1|url_paste": "second",
                "files_1|file_type": "not-a-datatype",
                "file_count": "2",
            }),
        )),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let job_id = json["data"]["jobs"][0]["id"].as_str().expect("job id");
    let job = wait_for_job(&router, job_id).await;
    assert_eq!(job["state"], "partial");
    assert_eq!(job["summary"]["ok"], 1);
    assert_eq!(job["summary"]["failed"], 1);

    let second = json["data"]["outputs"][1]["id"].as_str().expect("dataset id");
    let (_, details) = send_json(
        &router,
        Method::GET,
        &format!("/api/histories/{}/contents/{}", history_id, second),
        None,
    )
    .await;
    assert_eq!(details["data"]["state"], "failed");
    assert!(details["data"]["failure"]
        .as_str()
        .expect("failure reason")
        .contains("not-a-datatype"));
}

#[tokio::test]
async fn dropped_history_is_gone() {
    let router = test_router();
    let history_id = new_history(&router).await;
    let uri = format!("/api/histories/{}", history_id);
    let (status, _) = send_json(&router, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send_json(&router, Method::GET, &format!("{}/contents", uri), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn huge_slot_index_is_rejected_without_appending() {
    let router = test_router();
    let history_id = new_history(&router).await;
    let (status, json) = send_json(
        &router,
        Method::POST,
        "/api/tools",
        Some(upload_payload(
            &history_id,
            "Test123",
            json!({ "files_2000000|NAME": "far away" }),
        )),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "invalid_argument");

    let (_, json) = send_json(
        &router,
        Method::GET,
        &format!("/api/histories/{}/contents", history_id),
        None,
    )
    .await;
    assert_eq!(json["data"], json!([]));
}

#[tokio::test]
async fn dropping_a_history_forgets_its_jobs() {
    let router = test_router();
    let history_id = new_history(&router).await;
    let (status, json) = send_json(
        &router,
        Method::POST,
        "/api/tools",
        Some(upload_payload(&history_id, "Hello World", json!({}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let job_id = json["data"]["jobs"][0]["id"].as_str().expect("job id").to_string();
    wait_for_job(&router, &job_id).await;

    let (status, _) = send_json(
        &router,
        Method::DELETE,
        &format!("/api/histories/{}", history_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, json) =
        send_json(&router, Method::GET, &format!("/api/jobs/{}", job_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "not_found");
}
