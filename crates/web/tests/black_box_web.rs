use std::time::Duration;

use basis_infra::AppConfig;
use reqwest::{StatusCode, header};
use serde_json::{Value, json};

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, bound to an ephemeral port.
        let config = AppConfig {
            worker_pause: Duration::from_millis(5),
            ..AppConfig::default()
        };
        let app = basis_web::app::build_app(&config)
            .await
            .expect("failed to build app");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();

        Self {
            base_url,
            client,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Log in through the form and return the `session_id=...` cookie pair.
    async fn login(&self, login: &str, password: &str) -> String {
        let res = self
            .client
            .post(self.url("/web/login"))
            .form(&[("login", login), ("password", password), ("redirect", "/web")])
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        session_cookie(&res).expect("login did not set a session cookie")
    }

    async fn rpc(&self, cookie: &str, path: &str, params: Value) -> Value {
        let res = self
            .client
            .post(self.url(path))
            .header(header::COOKIE, cookie)
            .json(&json!({"jsonrpc": "2.0", "method": "call", "id": 7, "params": params}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["jsonrpc"], json!("2.0"));
        assert_eq!(body["id"], json!(7));
        body
    }

    async fn call_kw(&self, cookie: &str, model: &str, method: &str, args: Value, kwargs: Value) -> Value {
        let path = format!("/web/dataset/call_kw/{model}/{method}");
        self.rpc(
            cookie,
            &path,
            json!({"model": model, "method": method, "args": args, "kwargs": kwargs}),
        )
        .await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn session_cookie(res: &reqwest::Response) -> Option<String> {
    res.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .find(|pair| pair.starts_with("session_id=") && pair.len() > "session_id=".len())
        .map(str::to_string)
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = srv.client.get(srv.url("/web/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn rpc_requires_a_session() {
    let srv = TestServer::spawn().await;

    let res = srv
        .client
        .post(srv.url("/web/session/get_session_info"))
        .json(&json!({"jsonrpc": "2.0", "id": 1, "params": {}}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], json!("session_expired"));

    let res = srv
        .client
        .post(srv.url("/web/dataset/search_read"))
        .header(header::COOKIE, "session_id=forged")
        .json(&json!({"jsonrpc": "2.0", "id": 1, "params": {"model": "Partner"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = srv.client.get(srv.url("/web")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        res.headers()[header::LOCATION].to_str().unwrap(),
        "/web/login?redirect=/web"
    );
}

#[tokio::test]
async fn bad_credentials_rerender_the_form() {
    let srv = TestServer::spawn().await;

    let page = srv.client.get(srv.url("/web/login")).send().await.unwrap();
    assert_eq!(page.status(), StatusCode::OK);
    assert!(page.text().await.unwrap().contains("name=\"password\""));

    let res = srv
        .client
        .post(srv.url("/web/login"))
        .form(&[("login", "admin"), ("password", "wrong")])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(session_cookie(&res).is_none());
    assert!(res.text().await.unwrap().contains("Wrong login/password"));
}

#[tokio::test]
async fn login_session_info_and_logout() {
    let srv = TestServer::spawn().await;
    let cookie = srv.login("admin", "admin").await;

    let body = srv.rpc(&cookie, "/web/session/get_session_info", json!({})).await;
    let info = &body["result"];
    assert_eq!(info["uid"], json!(2));
    assert_eq!(info["username"], json!("admin"));
    assert_eq!(info["is_admin"], json!(true));
    assert_eq!(info["user_context"]["lang"], json!("en_US"));
    assert_eq!(info["company"]["name"], json!("My Company"));
    let groups = info["groups"].as_array().unwrap();
    assert!(groups.iter().any(|g| g == "base_group_system"));
    assert!(groups.iter().any(|g| g == "base_group_user"));

    let home = srv
        .client
        .get(srv.url("/web"))
        .header(header::COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(home.status(), StatusCode::OK);
    assert!(home.text().await.unwrap().contains("window.session_info"));

    let res = srv
        .client
        .get(srv.url("/web/session/logout"))
        .header(header::COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SEE_OTHER);

    let res = srv
        .client
        .post(srv.url("/web/session/get_session_info"))
        .header(header::COOKIE, &cookie)
        .json(&json!({"jsonrpc": "2.0", "id": 1, "params": {}}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn call_kw_and_search_read_round_trip() {
    let srv = TestServer::spawn().await;
    let cookie = srv.login("admin", "admin").await;

    let acme = srv
        .call_kw(&cookie, "Partner", "create", json!([{"name": "Acme", "is_company": true}]), json!({}))
        .await;
    let acme_id = acme["result"].as_i64().unwrap();
    srv.call_kw(
        &cookie,
        "Partner",
        "create",
        json!([{"name": "Jane", "parent_id": acme_id, "email": "jane@acme.test"}]),
        json!({}),
    )
    .await;

    let page = srv
        .rpc(
            &cookie,
            "/web/dataset/search_read",
            json!({
                "model": "Partner",
                "domain": [["name", "in", ["Acme", "Jane"]]],
                "fields": ["name"],
                "limit": 1,
                "sort": "name desc",
            }),
        )
        .await;
    assert_eq!(page["result"]["length"], json!(2));
    let records = page["result"]["records"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["name"], json!("Jane"));

    let names = srv
        .call_kw(&cookie, "Partner", "name_get", json!([[acme_id + 1]]), json!({}))
        .await;
    assert_eq!(names["result"][0][1], json!("Acme, Jane"));

    let unknown = srv
        .call_kw(&cookie, "Nope", "search_read", json!([]), json!({}))
        .await;
    assert_eq!(unknown["error"]["code"], json!(200));
    assert_eq!(unknown["error"]["data"]["name"], json!("not_found"));

    let bad_domain = srv
        .call_kw(&cookie, "Partner", "search", json!([["name", "=", "x"]]), json!({}))
        .await;
    assert_eq!(bad_domain["error"]["data"]["name"], json!("validation_error"));
}

#[tokio::test]
async fn oversized_domains_fail_as_requests_not_as_the_server() {
    let srv = TestServer::spawn().await;
    let cookie = srv.login("admin", "admin").await;
    srv.call_kw(&cookie, "Partner", "create", json!([{"name": "Acme"}]), json!({}))
        .await;

    let mut nested = Vec::new();
    for i in 0..20_000 {
        nested.push(json!(if i % 2 == 0 { "|" } else { "&" }));
        nested.push(json!(["id", "=", i]));
    }
    nested.push(json!(["id", "=", -1]));
    let res = srv
        .rpc(&cookie, "/web/dataset/search_read", json!({"model": "Partner", "domain": nested}))
        .await;
    assert_eq!(res["error"]["data"]["name"], json!("validation_error"));

    let mut chained = vec![json!("&"); 20_000];
    chained.extend((0..20_001).map(|i| json!(["name", "!=", format!("nobody-{i}")])));
    let res = srv
        .rpc(
            &cookie,
            "/web/dataset/search_read",
            json!({"model": "Partner", "domain": chained, "fields": ["name"]}),
        )
        .await;
    assert!(res["result"]["length"].as_u64().unwrap() > 0);

    let health = srv.client.get(srv.url("/web/health")).send().await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);
}

#[tokio::test]
async fn plain_users_get_access_errors() {
    let srv = TestServer::spawn().await;
    let admin = srv.login("admin", "admin").await;

    let created = srv
        .call_kw(
            &admin,
            "User",
            "create",
            json!([{"login": "demo", "name": "Demo", "password": "demo", "groups": ["base_group_user"]}]),
            json!({}),
        )
        .await;
    assert!(created["result"].is_i64(), "{created}");

    let demo = srv.login("demo", "demo").await;
    let denied = srv
        .call_kw(&demo, "Company", "create", json!([{"name": "Other"}]), json!({}))
        .await;
    assert_eq!(denied["error"]["data"]["name"], json!("access_error"));

    let allowed = srv
        .call_kw(&demo, "Partner", "create", json!([{"name": "Mine"}]), json!({}))
        .await;
    assert!(allowed["result"].is_i64());

    let res = srv
        .client
        .get(srv.url("/web/workers"))
        .header(header::COOKIE, &demo)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = srv
        .client
        .get(srv.url("/web/workers"))
        .header(header::COOKIE, &admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let workers: Value = res.json().await.unwrap();
    assert_eq!(workers["workers"][0]["name"], json!("Main"));
}

#[tokio::test]
async fn deleting_a_user_closes_their_sessions() {
    let srv = TestServer::spawn().await;
    let admin = srv.login("admin", "admin").await;
    let created = srv
        .call_kw(
            &admin,
            "User",
            "create",
            json!([{"login": "temp", "password": "temp", "groups": ["base_group_user"]}]),
            json!({}),
        )
        .await;
    let uid = created["result"].as_i64().unwrap();
    let temp = srv.login("temp", "temp").await;

    srv.call_kw(&admin, "User", "unlink", json!([[uid]]), json!({})).await;

    let res = srv
        .client
        .post(srv.url("/web/session/get_session_info"))
        .header(header::COOKIE, &temp)
        .json(&json!({"jsonrpc": "2.0", "id": 1, "params": {}}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn actions_load_by_xml_id() {
    let srv = TestServer::spawn().await;
    let cookie = srv.login("admin", "admin").await;

    let body = srv
        .rpc(&cookie, "/web/action/load", json!({"action_id": "base.action_partner_form"}))
        .await;
    assert_eq!(body["result"]["res_model"], json!("Partner"));
    assert_eq!(body["result"]["type"], json!("act_window"));

    let missing = srv
        .rpc(&cookie, "/web/action/load", json!({"action_id": "base.nope"}))
        .await;
    assert_eq!(missing["error"]["data"]["name"], json!("not_found"));
}

#[tokio::test]
async fn attachments_are_served_as_content_and_images() {
    let srv = TestServer::spawn().await;
    let cookie = srv.login("admin", "admin").await;

    let partner = srv
        .call_kw(&cookie, "Partner", "create", json!([{"name": "Acme"}]), json!({}))
        .await["result"]
        .as_i64()
        .unwrap();
    let created = srv
        .call_kw(
            &cookie,
            "Attachment",
            "create",
            json!([{
                "name": "hello.txt",
                "res_model": "Partner",
                "res_id": partner,
                "res_field": "image_1920",
                "datas": "aGVsbG8=",
            }]),
            json!({}),
        )
        .await;
    let id = created["result"].as_i64().unwrap();

    let res = srv
        .client
        .get(srv.url(&format!("/web/content/{id}?download=true")))
        .header(header::COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[header::CONTENT_TYPE].to_str().unwrap(), "text/plain");
    assert!(res.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .starts_with("attachment"));
    assert_eq!(res.text().await.unwrap(), "hello");

    let res = srv
        .client
        .get(srv.url(&format!("/web/image/Partner/{partner}/image_1920")))
        .header(header::COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "hello");

    let res = srv
        .client
        .get(srv.url(&format!("/web/image/Partner/{partner}/avatar")))
        .header(header::COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn jobs_run_on_the_main_worker() {
    let srv = TestServer::spawn().await;
    let cookie = srv.login("admin", "admin").await;

    let queued = srv
        .call_kw(
            &cookie,
            "Worker",
            "enqueue",
            json!(["Main", "Partner", "create", [{"name": "From a job"}]]),
            json!({}),
        )
        .await;
    assert!(queued["result"].is_string(), "{queued}");

    for _ in 0..200 {
        let done = srv
            .call_kw(
                &cookie,
                "JobHistory",
                "search_count",
                json!([[["status", "=", "done"]]]),
                json!({}),
            )
            .await;
        if done["result"] == json!(1) {
            let found = srv
                .call_kw(&cookie, "Partner", "search_count", json!([[["name", "=", "From a job"]]]), json!({}))
                .await;
            assert_eq!(found["result"], json!(1));
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job did not finish in time");
}
