use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use gh_fetcher::{FetchError, GithubFetcher, HttpExec, RemoteFetcher, RetryPolicy};
use http::{Request, Response, StatusCode};
use normalizer::{RepoId, ResourceType};
use serde_json::{json, Value};

enum Step {
    Reply {
        status: u16,
        headers: Vec<(&'static str, String)>,
        body: Value,
    },
    Hang,
}

fn ok(body: Value) -> Step {
    Step::Reply {
        status: 200,
        headers: Vec::new(),
        body,
    }
}

fn ok_with_link(body: Value, link: &str) -> Step {
    Step::Reply {
        status: 200,
        headers: vec![("link", link.to_string())],
        body,
    }
}

fn status(code: u16) -> Step {
    Step::Reply {
        status: code,
        headers: Vec::new(),
        body: json!({"message": "error"}),
    }
}

#[derive(Default)]
struct ScriptedExec {
    steps: Mutex<VecDeque<Step>>,
    seen: Mutex<Vec<String>>,
}

impl ScriptedExec {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpExec for ScriptedExec {
    async fn execute(&self, req: Request<Vec<u8>>) -> anyhow::Result<Response<Vec<u8>>> {
        self.seen.lock().unwrap().push(req.uri().to_string());
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Reply {
                status,
                headers,
                body,
            }) => {
                let mut builder = Response::builder().status(StatusCode::from_u16(status)?);
                for (name, value) in headers {
                    builder = builder.header(name, value);
                }
                Ok(builder.body(serde_json::to_vec(&body)?)?)
            }
            Some(Step::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                anyhow::bail!("hung request resumed")
            }
            None => anyhow::bail!("unexpected request {}", req.uri()),
        }
    }
}

fn fetcher(exec: Arc<ScriptedExec>) -> GithubFetcher {
    GithubFetcher::builder(Vec::new())
        .http_exec(exec)
        .api_base("https://api.test")
        .user_agent("aidev-test")
        .retry(RetryPolicy {
            max_attempts: 3,
            base: Duration::from_millis(10),
            max: Duration::from_millis(100),
            jitter_frac: 0.0,
        })
        .page_timeout(Duration::from_secs(1))
        .max_rate_limit_wait(Duration::from_secs(10))
        .build()
        .expect("fetcher")
}

fn repo() -> RepoId {
    "octo/widgets".parse().expect("repo id")
}

fn numbers(records: &[Value]) -> Vec<u64> {
    records
        .iter()
        .map(|r| r["number"].as_u64().expect("number"))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn follows_next_links_in_order() {
    let exec = ScriptedExec::new(vec![
        ok_with_link(
            json!([{"number": 1}, {"number": 2}]),
            r#"<https://api.test/repos/octo/widgets/pulls?state=all&page=2>; rel="next""#,
        ),
        ok_with_link(
            json!([{"number": 3}]),
            r#"<https://api.test/repos/octo/widgets/pulls?state=all&page=1>; rel="prev""#,
        ),
    ]);
    let records = fetcher(exec.clone())
        .fetch_all(&repo(), ResourceType::PullRequests)
        .await
        .expect("records");

    assert_eq!(numbers(&records), vec![1, 2, 3]);
    let seen = exec.seen();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].contains("/repos/octo/widgets/pulls"));
    assert!(seen[0].contains("state=all"));
    assert!(seen[1].ends_with("page=2"));
}

#[tokio::test(start_paused = true)]
async fn counts_pages_when_link_header_is_missing() {
    let exec = ScriptedExec::new(vec![
        ok(json!([{"number": 1}, {"number": 2}])),
        ok(json!([{"number": 3}])),
    ]);
    let fetcher = GithubFetcher::builder(Vec::new())
        .http_exec(exec.clone())
        .api_base("https://api.test/")
        .page_size(2)
        .build()
        .expect("fetcher");

    let records = fetcher
        .fetch_all(&repo(), ResourceType::PullRequests)
        .await
        .expect("records");
    assert_eq!(numbers(&records), vec![1, 2, 3]);
    assert!(exec.seen()[1].contains("page=2"));
}

#[tokio::test(start_paused = true)]
async fn retries_server_errors_then_succeeds() {
    let exec = ScriptedExec::new(vec![status(502), ok(json!([{"number": 7}]))]);
    let records = fetcher(exec.clone())
        .fetch_all(&repo(), ResourceType::PullRequests)
        .await
        .expect("records");
    assert_eq!(numbers(&records), vec![7]);
    assert_eq!(exec.seen().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_report_remote_unavailable() {
    let exec = ScriptedExec::new(vec![status(503), status(503), status(503)]);
    let err = fetcher(exec.clone())
        .fetch_all(&repo(), ResourceType::Commits)
        .await
        .expect_err("should fail");
    match err {
        FetchError::RemoteUnavailable {
            attempts, resource, ..
        } => {
            assert_eq!(attempts, 3);
            assert_eq!(resource, ResourceType::Commits);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(exec.seen().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn failure_on_later_page_returns_no_partial_data() {
    let exec = ScriptedExec::new(vec![
        ok_with_link(
            json!([{"number": 1}]),
            r#"<https://api.test/repos/octo/widgets/pulls?page=2>; rel="next""#,
        ),
        status(500),
        status(500),
        status(500),
    ]);
    let result = fetcher(exec)
        .fetch_all(&repo(), ResourceType::PullRequests)
        .await;
    assert!(matches!(result, Err(FetchError::RemoteUnavailable { .. })));
}

#[tokio::test(start_paused = true)]
async fn not_found_is_rejected_without_retry() {
    let exec = ScriptedExec::new(vec![status(404)]);
    let err = fetcher(exec.clone())
        .fetch_all(&repo(), ResourceType::Repository)
        .await
        .expect_err("should fail");
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    assert_eq!(exec.seen().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unauthorized_surfaces_as_remote_unavailable() {
    let exec = ScriptedExec::new(vec![status(401)]);
    let err = fetcher(exec.clone())
        .fetch_all(&repo(), ResourceType::Commits)
        .await
        .expect_err("should fail");
    assert!(err.is_remote_unavailable());
    assert_eq!(exec.seen().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn page_timeout_is_retried() {
    let exec = ScriptedExec::new(vec![Step::Hang, ok(json!([{"number": 4}]))]);
    let records = fetcher(exec.clone())
        .fetch_all(&repo(), ResourceType::PullRequests)
        .await
        .expect("records");
    assert_eq!(numbers(&records), vec![4]);
    assert_eq!(exec.seen().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn retry_after_beyond_cap_gives_up() {
    let exec = ScriptedExec::new(vec![Step::Reply {
        status: 429,
        headers: vec![("retry-after", "120".to_string())],
        body: json!({"message": "slow down"}),
    }]);
    let err = fetcher(exec.clone())
        .fetch_all(&repo(), ResourceType::PullRequests)
        .await
        .expect_err("should fail");
    assert!(err.is_remote_unavailable());
    assert_eq!(exec.seen().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn repository_resource_is_a_single_record() {
    let exec = ScriptedExec::new(vec![ok(
        json!({"id": 10, "full_name": "octo/widgets", "fork": false}),
    )]);
    let records = fetcher(exec.clone())
        .fetch_all(&repo(), ResourceType::Repository)
        .await
        .expect("records");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["id"], 10);
    assert!(exec.seen()[0].ends_with("/repos/octo/widgets"));
}

#[tokio::test(start_paused = true)]
async fn commits_until_is_sent_as_query() {
    let exec = ScriptedExec::new(vec![ok(json!([]))]);
    let until = Utc.with_ymd_and_hms(2025, 12, 12, 23, 59, 59).unwrap();
    let fetcher = GithubFetcher::builder(Vec::new())
        .http_exec(exec.clone())
        .api_base("https://api.test/")
        .commits_until(Some(until))
        .build()
        .expect("fetcher");

    let records = fetcher
        .fetch_all(&repo(), ResourceType::Commits)
        .await
        .expect("records");
    assert!(records.is_empty());
    assert!(exec.seen()[0].contains("until=2025-12-12T23%3A59%3A59Z"));
}
