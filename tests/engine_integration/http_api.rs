use std::time::Duration;

use serde_json::{Value, json};

use super::support::{DAY_MS, now_ms, spawn_server};

async fn post_json(client: &reqwest::Client, url: String, body: Value) -> reqwest::Response {
    client
        .post(url)
        .json(&body)
        .send()
        .await
        .expect("request should send")
}

#[tokio::test]
async fn healthz_endpoint_returns_ok_payload() {
    let server = spawn_server().await;

    let response = reqwest::get(server.url("/healthz"))
        .await
        .expect("healthz endpoint should respond");
    assert!(response.status().is_success());

    let payload: Value = response.json().await.expect("healthz should return json");
    assert_eq!(payload["ok"], true);
    assert_eq!(payload["runtime"], "rust");

    server.stop().await;
}

#[tokio::test]
async fn medication_lifecycle_over_http() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    let response = post_json(
        &client,
        server.url("/users"),
        json!({ "id": "alice", "name": "Alice", "email": "alice@example.test" }),
    )
    .await;
    assert!(response.status().is_success());

    // Weekly without a day of week is a validation failure.
    let response = post_json(
        &client,
        server.url("/medications"),
        json!({
            "userId": "alice",
            "name": "Alendronate",
            "kind": "recurring",
            "frequency": "weekly",
            "startDateMs": now_ms() - DAY_MS,
            "endDateMs": now_ms() + 30 * DAY_MS,
            "reminderTimes": ["08:00"],
        }),
    )
    .await;
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    let response = post_json(
        &client,
        server.url("/medications"),
        json!({
            "userId": "alice",
            "name": "Metformin",
            "description": "with breakfast",
            "kind": "recurring",
            "frequency": "daily",
            "startDateMs": now_ms() - DAY_MS,
            "endDateMs": now_ms() + 30 * DAY_MS,
            "reminderTimes": ["08:00"],
        }),
    )
    .await;
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    let medication: Value = response.json().await.expect("medication json expected");
    let medication_id = medication["id"].as_str().expect("id expected").to_owned();

    let listed: Value = reqwest::get(server.url("/users/alice/medications"))
        .await
        .expect("list should respond")
        .json()
        .await
        .expect("list json expected");
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
    assert_eq!(listed[0]["needsTakingToday"], true);

    // Ownership is checked before any state moves.
    let response = post_json(
        &client,
        server.url(&format!("/medications/{medication_id}/taken")),
        json!({ "userId": "mallory" }),
    )
    .await;
    assert_eq!(response.status(), reqwest::StatusCode::FORBIDDEN);

    let response = post_json(
        &client,
        server.url(&format!("/medications/{medication_id}/taken")),
        json!({ "userId": "alice", "notes": "on time" }),
    )
    .await;
    assert!(response.status().is_success());

    let listed: Value = reqwest::get(server.url("/users/alice/medications"))
        .await
        .expect("list should respond")
        .json()
        .await
        .expect("list json expected");
    assert_eq!(listed[0]["needsTakingToday"], false);

    let logs: Value = reqwest::get(server.url("/users/alice/logs"))
        .await
        .expect("logs should respond")
        .json()
        .await
        .expect("logs json expected");
    assert_eq!(logs.as_array().map(Vec::len), Some(1));
    assert_eq!(logs[0]["medication"]["id"], medication_id.as_str());

    let response = client
        .delete(server.url(&format!(
            "/medications/{medication_id}?userId=alice"
        )))
        .send()
        .await
        .expect("delete should send");
    assert!(response.status().is_success());

    let listed: Value = reqwest::get(server.url("/users/alice/medications"))
        .await
        .expect("list should respond")
        .json()
        .await
        .expect("list json expected");
    assert_eq!(listed.as_array().map(Vec::len), Some(0));

    server.stop().await;
}

#[tokio::test]
async fn report_pipeline_completes_end_to_end_over_http() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    let response = post_json(
        &client,
        server.url("/users"),
        json!({ "id": "alice", "name": "Alice", "email": "alice@example.test" }),
    )
    .await;
    assert!(response.status().is_success());

    let response = post_json(
        &client,
        server.url("/reports"),
        json!({ "userId": "alice", "reportType": "weekly" }),
    )
    .await;
    assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);
    let report: Value = response.json().await.expect("report json expected");
    assert_eq!(report["status"], "pending");

    // The background scheduler worker picks the generation job up.
    let mut report_url = None;
    for _ in 0..50 {
        let reports: Value = reqwest::get(server.url("/users/alice/reports"))
            .await
            .expect("reports should respond")
            .json()
            .await
            .expect("reports json expected");
        if reports[0]["status"] == "completed" {
            report_url = reports[0]["reportUrl"].as_str().map(str::to_owned);
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    let report_url = report_url.expect("report should complete within the polling window");

    let response = reqwest::get(server.url(&report_url))
        .await
        .expect("export should respond");
    assert!(response.status().is_success());
    let csv = response.text().await.expect("export text expected");
    assert!(csv.starts_with("Medicine Name,Description,Taken At,On Time,Notes"));

    // The delivery worker drains the queued message.
    let mut sent = false;
    for _ in 0..50 {
        let deliveries: Value = reqwest::get(server.url("/users/alice/deliveries"))
            .await
            .expect("deliveries should respond")
            .json()
            .await
            .expect("deliveries json expected");
        if deliveries[0]["status"] == "sent" {
            sent = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(sent, "delivery should drain within the polling window");

    server.stop().await;
}

#[tokio::test]
async fn sessions_resolve_users_over_http() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    let response = post_json(
        &client,
        server.url("/users"),
        json!({ "id": "alice", "name": "Alice", "email": "alice@example.test" }),
    )
    .await;
    assert!(response.status().is_success());

    let response = post_json(
        &client,
        server.url("/sessions"),
        json!({ "sessionId": "sess-1", "userId": "alice" }),
    )
    .await;
    assert!(response.status().is_success());

    let user: Value = reqwest::get(server.url("/sessions/sess-1/user"))
        .await
        .expect("session lookup should respond")
        .json()
        .await
        .expect("user json expected");
    assert_eq!(user["email"], "alice@example.test");

    let response = reqwest::get(server.url("/sessions/sess-unknown/user"))
        .await
        .expect("session lookup should respond");
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    server.stop().await;
}
