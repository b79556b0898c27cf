//! HTTP Module Tests
//!
//! A full server (in-memory collaborators, live resource tree) is bound to an ephemeral
//! port and driven with `reqwest`, the same client the hooks use for outbound calls.
//!
//! ## Test Scopes
//! - **Transport**: CORS echo, pre-flight short-circuit, browser icon requests, bad methods.
//! - **Bodies**: JSON parsing and its errors, raw and multipart file uploads.
//! - **Round trips**: Registration, queries with URL parameters, function invocation.

#[cfg(test)]
mod tests {
    use crate::app::App;
    use crate::config::Config;
    use crate::http::handlers::parse_json_body;
    use crate::storage::types::Document;
    use serde_json::{Value, json};

    async fn spawn_server() -> (String, App) {
        let config =
            Config::parse(r#"{"auth": {"signingKey": "http-test"}, "tree": {"idleTimeoutSecs": 0}}"#)
                .unwrap();
        let app = App::build(&config);
        app.functions.register("ping", |call| async move {
            let mut body = Document::new();
            body.insert("pong".into(), json!(call.res));
            Ok(body)
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = app.router.clone();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (format!("http://{}", addr), app)
    }

    // ============================================================
    // TRANSPORT TESTS
    // ============================================================

    #[tokio::test]
    async fn test_cors_headers_echo_origin() {
        let (base, _app) = spawn_server().await;
        let client = reqwest::Client::new();

        let with_origin = client
            .get(format!("{}/posts", base))
            .header("Origin", "http://example.org")
            .send()
            .await
            .unwrap();
        let without_origin = client.get(format!("{}/posts", base)).send().await.unwrap();

        assert_eq!(
            with_origin.headers()["access-control-allow-origin"],
            "http://example.org"
        );
        assert!(without_origin.headers().get("access-control-allow-origin").is_none());
    }

    #[tokio::test]
    async fn test_preflight_short_circuits() {
        let (base, app) = spawn_server().await;
        let client = reqwest::Client::new();

        let response = client
            .request(reqwest::Method::OPTIONS, format!("{}/posts/1/-like", base))
            .header("Origin", "http://example.org")
            .header("Access-Control-Request-Method", "DELETE")
            .header("Access-Control-Request-Headers", "authorization")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "http://example.org"
        );
        let methods = response.headers()["access-control-allow-methods"]
            .to_str()
            .unwrap()
            .to_string();
        assert!(methods.contains("DELETE"));
        let headers = response.headers()["access-control-allow-headers"]
            .to_str()
            .unwrap()
            .to_ascii_lowercase();
        assert!(headers.contains("authorization"));
        assert!(headers.contains("x-csrf-token"));
        // Only the root node exists: the pre-flight never entered the tree.
        assert_eq!(app.tree.stats().spawned(), 1);
    }

    #[tokio::test]
    async fn test_icon_requests_are_ignored() {
        let (base, app) = spawn_server().await;

        let response = reqwest::get(format!("{}/favicon.ico", base)).await.unwrap();

        assert_eq!(response.status().as_u16(), 204);
        assert_eq!(app.tree.stats().spawned(), 1);
    }

    #[tokio::test]
    async fn test_icon_like_resource_names_reach_the_tree() {
        let (base, _app) = spawn_server().await;
        let client = reqwest::Client::new();

        let created = client
            .post(format!("{}/posts.icons", base))
            .json(&json!({"title": "x"}))
            .send()
            .await
            .unwrap();

        assert_eq!(created.status().as_u16(), 201);
    }

    #[tokio::test]
    async fn test_unsupported_method_is_bad_request() {
        let (base, _app) = spawn_server().await;
        let client = reqwest::Client::new();

        let response = client
            .patch(format!("{}/posts/1", base))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["message"], json!("Method PATCH is not supported."));
    }

    // ============================================================
    // BODY TESTS
    // ============================================================

    #[test]
    fn test_json_body_must_be_an_object() {
        assert!(parse_json_body(br#"{"a": 1}"#).is_ok());
        assert!(parse_json_body(b"[1, 2]").is_err());
        assert!(parse_json_body(b"{oops").is_err());
    }

    #[tokio::test]
    async fn test_invalid_json_body_is_rejected() {
        let (base, _app) = spawn_server().await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{}/posts", base))
            .header("Content-Type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["message"], json!("Request body is not a valid json."));
    }

    #[tokio::test]
    async fn test_raw_file_upload_round_trip() {
        let (base, _app) = spawn_server().await;
        let client = reqwest::Client::new();

        let created: Value = client
            .post(format!("{}/files", base))
            .body("aGVsbG8gd29ybGQ=")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let id = created["_id"].as_str().unwrap();
        let download = reqwest::get(format!("{}/files/{}", base, id)).await.unwrap();

        assert_eq!(download.status().as_u16(), 200);
        assert_eq!(
            download.headers()["content-type"],
            "application/octet-stream"
        );
        assert_eq!(download.bytes().await.unwrap().as_ref(), b"hello world");
    }

    #[tokio::test]
    async fn test_multipart_file_upload_round_trip() {
        let (base, _app) = spawn_server().await;
        let client = reqwest::Client::new();
        let body = concat!(
            "--XYZ\r\n",
            "Content-Disposition: form-data; name=\"file\"; filename=\"notes.txt\"\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "some notes\r\n",
            "--XYZ--\r\n",
        );

        let response = client
            .post(format!("{}/files", base))
            .header("Content-Type", "multipart/form-data; boundary=XYZ")
            .body(body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 201);
        let created: Value = response.json().await.unwrap();
        let id = created["_id"].as_str().unwrap();
        let download = reqwest::get(format!("{}/files/{}", base, id)).await.unwrap();

        assert!(id.ends_with("-notes.txt"));
        assert_eq!(download.headers()["content-type"], "text/plain");
        assert_eq!(download.text().await.unwrap(), "some notes");
    }

    // ============================================================
    // ROUND TRIP TESTS
    // ============================================================

    #[tokio::test]
    async fn test_register_with_trailing_slash() {
        let (base, _app) = spawn_server().await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{}/users/", base))
            .json(&json!({"username": "a", "password": "p"}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 201);
        let body: Value = response.json().await.unwrap();
        assert!(body["_id"].is_string());
        assert!(body["accessToken"].is_string());
        assert!(body.get("password").is_none());
    }

    #[tokio::test]
    async fn test_query_parameters_from_url() {
        let (base, _app) = spawn_server().await;
        let client = reqwest::Client::new();
        for votes in [1, 7, 4] {
            client
                .post(format!("{}/posts", base))
                .json(&json!({"votes": votes}))
                .send()
                .await
                .unwrap();
        }

        let body: Value = client
            .get(format!("{}/posts", base))
            .query(&[("where", r#"{"votes":{"$gt":2}}"#), ("sort", r#""votes""#)])
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        let votes: Vec<Value> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["votes"].clone())
            .collect();
        assert_eq!(votes, vec![json!(4), json!(7)]);
    }

    #[tokio::test]
    async fn test_registered_function_is_reachable() {
        let (base, _app) = spawn_server().await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{}/-ping", base))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["pong"], json!("/"));
    }
}
