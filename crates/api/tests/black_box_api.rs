use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::{json, Value};

use deedbank_api::app::{build_app, AppServices};

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, in-memory store, ephemeral port.
        let app = build_app(Arc::new(AppServices::in_memory()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self.client.post(self.url(path)).json(&body).send().await.unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let res = self.client.get(self.url(path)).send().await.unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn delete(&self, path: &str) -> (StatusCode, Value) {
        let res = self.client.delete(self.url(path)).send().await.unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct Family {
    parent_id: String,
    child_id: String,
    deed_type_id: String,
}

async fn family(srv: &TestServer, rate: &str) -> Family {
    let (status, parent) = srv.post("/parents", json!({ "email": "Pat@Example.com" })).await;
    assert_eq!(status, StatusCode::CREATED);
    let parent_id = parent["id"].as_str().unwrap().to_string();

    let (status, child) = srv
        .post(
            &format!("/parents/{parent_id}/children"),
            json!({ "name": "Robin", "dollar_per_point": rate }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, deed_type) = srv
        .post(
            &format!("/parents/{parent_id}/deed-types"),
            json!({ "name": "Dishes", "points": 5 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    Family {
        parent_id,
        child_id: child["id"].as_str().unwrap().to_string(),
        deed_type_id: deed_type["id"].as_str().unwrap().to_string(),
    }
}

async fn record_deed(srv: &TestServer, f: &Family, points: i64, note: Option<&str>) -> (StatusCode, Value) {
    srv.post(
        "/deeds",
        json!({
            "child_id": f.child_id,
            "deed_type_id": f.deed_type_id,
            "points": points,
            "note": note,
            "created_by": f.parent_id,
        }),
    )
    .await
}

async fn redeem(srv: &TestServer, f: &Family, points: i64) -> (StatusCode, Value) {
    srv.post(
        "/redemptions",
        json!({
            "child_id": f.child_id,
            "points": points,
            "description": "movie night",
            "created_by": f.parent_id,
        }),
    )
    .await
}

#[tokio::test]
async fn health_is_ok() {
    let srv = TestServer::spawn().await;
    let (status, body) = srv.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn parent_registration_and_lookup() {
    let srv = TestServer::spawn().await;
    let (status, parent) = srv.post("/parents", json!({ "email": "  Kim@Example.com " })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(parent["email"], "kim@example.com");

    let (status, body) = srv.post("/parents", json!({ "email": "kim@example.com" })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (status, found) = srv.get("/parents?email=KIM@example.com").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found["id"], parent["id"]);

    let (status, _) = srv.get("/parents?email=nobody@example.com").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = srv.get("/parents/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_id");
}

#[tokio::test]
async fn deed_and_redemption_lifecycle() {
    let srv = TestServer::spawn().await;
    let f = family(&srv, "0.25").await;

    let (status, deed) = record_deed(&srv, &f, 0, None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(deed["points"], 5);

    let (status, _) = record_deed(&srv, &f, 10, Some("extra")).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = redeem(&srv, &f, 12).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, balance) = srv.get(&format!("/children/{}/balance", f.child_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(balance["points"], 3);
    assert_eq!(balance["dollars"], "0.75");

    let (status, body) = redeem(&srv, &f, 5).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "insufficient_balance");

    let (status, history) = srv.get(&format!("/children/{}/history", f.child_id)).await;
    assert_eq!(status, StatusCode::OK);
    let points: Vec<i64> = history["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["points"].as_i64().unwrap())
        .collect();
    assert_eq!(points, vec![5, 10, -12]);
    assert_eq!(history["items"][2]["entry_type"], "redemption");

    let (_, deeds) = srv.get(&format!("/children/{}/deeds", f.child_id)).await;
    assert_eq!(deeds["items"][0]["points"], 10);
    let (_, redemptions) = srv.get(&format!("/children/{}/redemptions", f.child_id)).await;
    assert_eq!(redemptions["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn invalid_redemption_points_are_rejected() {
    let srv = TestServer::spawn().await;
    let f = family(&srv, "1.00").await;
    let (status, body) = redeem(&srv, &f, 0).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_points");
}

#[tokio::test]
async fn only_the_childs_parent_may_record() {
    let srv = TestServer::spawn().await;
    let f = family(&srv, "1.00").await;
    let (_, stranger) = srv.post("/parents", json!({ "email": "stranger@example.com" })).await;

    let (status, _) = srv
        .post(
            "/redemptions",
            json!({
                "child_id": f.child_id,
                "points": 1,
                "created_by": stranger["id"],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = srv
        .delete(&format!("/parents/{}/children/{}", stranger["id"].as_str().unwrap(), f.child_id))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn csv_export_is_an_attachment_with_escaped_notes() {
    let srv = TestServer::spawn().await;
    let f = family(&srv, "1.00").await;
    record_deed(&srv, &f, 2, Some(r#"He said, "good job""#)).await;

    let res = srv
        .client
        .get(srv.url(&format!("/children/{}/export/csv", f.child_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers()["content-type"].to_str().unwrap(),
        "text/csv; charset=utf-8"
    );
    assert_eq!(
        res.headers()["content-disposition"].to_str().unwrap(),
        format!("attachment; filename=child-{}-history.csv", f.child_id)
    );

    let body = res.text().await.unwrap();
    let mut lines = body.lines();
    assert_eq!(
        lines.next().unwrap(),
        "entry_type,points,dollar_value,note,occurred_at,recorded_by"
    );
    assert!(lines.next().unwrap().contains(r#""He said, ""good job""""#));
}

#[tokio::test]
async fn deed_type_rules_over_http() {
    let srv = TestServer::spawn().await;
    let f = family(&srv, "1.00").await;

    let (status, body) = srv
        .post(
            &format!("/parents/{}/deed-types", f.parent_id),
            json!({ "name": "dishes", "points": 1 }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (status, _) = srv
        .post(
            &format!("/parents/{}/deed-types", f.parent_id),
            json!({ "name": "Nothing", "points": 0 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Deactivate, then deeds against it are refused.
    let res = srv
        .client
        .patch(srv.url(&format!("/deed-types/{}", f.deed_type_id)))
        .json(&json!({ "name": "Dishes", "points": 5, "active": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let (status, _) = record_deed(&srv, &f, 0, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn deleting_a_deed_restores_the_balance() {
    let srv = TestServer::spawn().await;
    let f = family(&srv, "1.00").await;
    let (_, deed) = record_deed(&srv, &f, 7, None).await;
    let deed_id = deed["id"].as_str().unwrap();

    let (status, _) = srv
        .delete(&format!("/parents/{}/deeds/{}", f.parent_id, deed_id))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, balance) = srv.get(&format!("/children/{}/balance", f.child_id)).await;
    assert_eq!(balance["points"], 0);

    // The type is no longer referenced, so it can go too.
    let (status, _) = srv
        .delete(&format!("/parents/{}/deed-types/{}", f.parent_id, f.deed_type_id))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn unknown_child_balance_is_not_found() {
    let srv = TestServer::spawn().await;
    let (status, body) = srv
        .get("/children/0190a0b2-7c3e-7000-8000-000000000000/balance")
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn oversized_rate_is_rejected_before_anything_is_valued() {
    let srv = TestServer::spawn().await;
    let f = family(&srv, "1000000").await;

    let (status, body) = srv
        .post(
            &format!("/parents/{}/children", f.parent_id),
            json!({ "name": "Jules", "dollar_per_point": "1000000.01" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    // The largest accepted rate still values a balance.
    record_deed(&srv, &f, 3, None).await;
    let (status, balance) = srv.get(&format!("/children/{}/balance", f.child_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(balance["dollars"], "3000000");
}
