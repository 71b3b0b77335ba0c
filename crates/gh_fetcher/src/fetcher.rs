use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use common::config::{AppConfig, GithubToken};
use http::{header, HeaderMap, HeaderValue, Request, StatusCode};
use normalizer::{RepoId, ResourceType};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

use crate::backoff::RetryPolicy;
use crate::error::FetchError;
use crate::metrics;
use crate::model::{
    has_link_header, page_of, parse_next_link, parse_rate_limit, parse_retry_after, with_page,
};
use crate::token::{Credential, TokenPool, TokenSelection};
use crate::transport::{HttpExec, ReqwestExecutor};

const ACCEPT: &str = "application/vnd.github+json";
const API_VERSION: &str = "2022-11-28";

/// "Give me every record of resource R for repository X." Implementations
/// never write to the cache and never return a partial list.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    async fn fetch_all(
        &self,
        repository: &RepoId,
        resource: ResourceType,
    ) -> Result<Vec<Value>, FetchError>;
}

#[async_trait]
impl<T: RemoteFetcher + ?Sized> RemoteFetcher for Arc<T> {
    async fn fetch_all(
        &self,
        repository: &RepoId,
        resource: ResourceType,
    ) -> Result<Vec<Value>, FetchError> {
        (**self).fetch_all(repository, resource).await
    }
}

#[derive(Clone)]
pub struct GithubFetcherBuilder {
    tokens: Vec<GithubToken>,
    http_exec: Option<Arc<dyn HttpExec>>,
    api_base: String,
    user_agent: String,
    page_size: u32,
    retry: RetryPolicy,
    page_timeout: Duration,
    max_inflight: usize,
    max_pages: u32,
    max_rate_limit_wait: Duration,
    commits_until: Option<DateTime<Utc>>,
}

impl GithubFetcherBuilder {
    pub fn new(tokens: Vec<GithubToken>) -> Self {
        Self {
            tokens,
            http_exec: None,
            api_base: "https://api.github.com/".to_string(),
            user_agent: "aidev-genealogy".to_string(),
            page_size: 100,
            retry: RetryPolicy::default(),
            page_timeout: Duration::from_secs(30),
            max_inflight: 8,
            max_pages: 1000,
            max_rate_limit_wait: Duration::from_secs(3600),
            commits_until: None,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let fetcher = &config.fetcher;
        Self::new(config.github.resolved_tokens())
            .api_base(&config.github.api_base)
            .user_agent(&config.github.user_agent)
            .page_size(fetcher.page_size)
            .retry(RetryPolicy {
                max_attempts: fetcher.max_attempts,
                base: Duration::from_millis(fetcher.backoff_base_ms),
                max: Duration::from_millis(fetcher.backoff_max_ms),
                jitter_frac: fetcher.jitter_frac,
            })
            .page_timeout(Duration::from_secs(fetcher.page_timeout_secs))
            .max_inflight(fetcher.max_inflight)
            .max_pages(fetcher.max_pages)
            .max_rate_limit_wait(Duration::from_secs(fetcher.max_rate_limit_wait_secs))
            .commits_until(fetcher.commits_until)
    }

    pub fn http_exec(mut self, exec: Arc<dyn HttpExec>) -> Self {
        self.http_exec = Some(exec);
        self
    }

    pub fn api_base(mut self, base: &str) -> Self {
        self.api_base = base.to_string();
        self
    }

    pub fn user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }

    pub fn page_size(mut self, size: u32) -> Self {
        self.page_size = size.clamp(1, 100);
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn page_timeout(mut self, timeout: Duration) -> Self {
        self.page_timeout = timeout;
        self
    }

    pub fn max_inflight(mut self, max: usize) -> Self {
        self.max_inflight = max.max(1);
        self
    }

    pub fn max_pages(mut self, max: u32) -> Self {
        self.max_pages = max.max(1);
        self
    }

    pub fn max_rate_limit_wait(mut self, wait: Duration) -> Self {
        self.max_rate_limit_wait = wait;
        self
    }

    pub fn commits_until(mut self, until: Option<DateTime<Utc>>) -> Self {
        self.commits_until = until;
        self
    }

    pub fn build(self) -> Result<GithubFetcher, FetchError> {
        let mut base = self.api_base.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let api_base = Url::parse(&base)
            .map_err(|err| FetchError::InvalidRequest(format!("api base {base}: {err}")))?;
        let user_agent = HeaderValue::from_str(&self.user_agent)
            .map_err(|err| FetchError::InvalidRequest(format!("user agent: {err}")))?;
        let exec = match self.http_exec {
            Some(exec) => exec,
            None => Arc::new(
                ReqwestExecutor::new(&self.user_agent, self.page_timeout)
                    .map_err(|err| FetchError::InvalidRequest(err.to_string()))?,
            ),
        };
        Ok(GithubFetcher {
            exec,
            tokens: TokenPool::new(self.tokens),
            inflight: Arc::new(Semaphore::new(self.max_inflight)),
            api_base,
            user_agent,
            page_size: self.page_size,
            retry: self.retry,
            page_timeout: self.page_timeout,
            max_pages: self.max_pages,
            max_rate_limit_wait: self.max_rate_limit_wait,
            commits_until: self.commits_until,
        })
    }
}

/// Paginating GitHub REST client. Clones share the token pool and the
/// in-flight request limit.
#[derive(Clone)]
pub struct GithubFetcher {
    exec: Arc<dyn HttpExec>,
    tokens: TokenPool,
    inflight: Arc<Semaphore>,
    api_base: Url,
    user_agent: HeaderValue,
    page_size: u32,
    retry: RetryPolicy,
    page_timeout: Duration,
    max_pages: u32,
    max_rate_limit_wait: Duration,
    commits_until: Option<DateTime<Utc>>,
}

struct Page {
    headers: HeaderMap,
    body: Value,
}

enum AttemptError {
    Transient {
        reason: &'static str,
        detail: String,
        wait: Option<Duration>,
    },
    Unavailable(String),
    Fatal(FetchError),
}

impl GithubFetcher {
    pub fn builder(tokens: Vec<GithubToken>) -> GithubFetcherBuilder {
        GithubFetcherBuilder::new(tokens)
    }

    pub fn resource_url(&self, repo: &RepoId, resource: ResourceType) -> Result<Url, FetchError> {
        let path = match resource {
            ResourceType::Repository => format!("repos/{}/{}", repo.owner(), repo.name()),
            ResourceType::PullRequests => format!("repos/{}/{}/pulls", repo.owner(), repo.name()),
            ResourceType::Commits => format!("repos/{}/{}/commits", repo.owner(), repo.name()),
        };
        let mut url = self
            .api_base
            .join(&path)
            .map_err(|err| FetchError::InvalidRequest(format!("{path}: {err}")))?;
        let per_page = self.page_size.to_string();
        match resource {
            ResourceType::Repository => {}
            ResourceType::PullRequests => {
                url.query_pairs_mut()
                    .append_pair("state", "all")
                    .append_pair("sort", "created")
                    .append_pair("direction", "asc")
                    .append_pair("per_page", &per_page)
                    .append_pair("page", "1");
            }
            ResourceType::Commits => {
                let mut pairs = url.query_pairs_mut();
                pairs.append_pair("per_page", &per_page).append_pair("page", "1");
                if let Some(until) = self.commits_until {
                    pairs.append_pair("until", &until.to_rfc3339_opts(SecondsFormat::Secs, true));
                }
            }
        }
        Ok(url)
    }

    async fn fetch_pages(
        &self,
        repo: &RepoId,
        resource: ResourceType,
    ) -> Result<(Vec<Value>, u32), FetchError> {
        let mut url = self.resource_url(repo, resource)?;

        if resource == ResourceType::Repository {
            let page = self.fetch_page(repo, resource, &url).await?;
            return Ok((vec![page.body], 1));
        }

        let mut records = Vec::new();
        let mut pages = 0u32;
        loop {
            if pages >= self.max_pages {
                return Err(FetchError::RemoteUnavailable {
                    repository: repo.clone(),
                    resource,
                    attempts: pages,
                    reason: format!("pagination exceeded {} pages", self.max_pages),
                });
            }
            pages += 1;
            let page = self.fetch_page(repo, resource, &url).await?;
            let items: Vec<Value> =
                serde_json::from_value(page.body).map_err(|source| FetchError::Decode {
                    endpoint: url.to_string(),
                    source,
                })?;
            let count = items.len();
            debug!(repo = %repo, resource = %resource, page = page_of(&url), count, "page fetched");
            if count == 0 {
                break;
            }
            records.extend(items);

            let next = match parse_next_link(&page.headers) {
                Some(next) => Some(next),
                None if !has_link_header(&page.headers) && count >= self.page_size as usize => {
                    Some(with_page(&url, page_of(&url) + 1))
                }
                None => None,
            };
            match next {
                Some(next) if next.host_str() != self.api_base.host_str() => {
                    return Err(FetchError::InvalidRequest(format!(
                        "next page {next} leaves {}",
                        self.api_base
                    )));
                }
                Some(next) => url = next,
                None => break,
            }
        }
        Ok((records, pages))
    }

    async fn fetch_page(
        &self,
        repo: &RepoId,
        resource: ResourceType,
        url: &Url,
    ) -> Result<Page, FetchError> {
        let mut failures = 0u32;
        loop {
            let error = match self.attempt(repo, resource, url).await {
                Ok(page) => return Ok(page),
                Err(error) => error,
            };
            let (reason, detail, wait) = match error {
                AttemptError::Fatal(err) => return Err(err),
                AttemptError::Unavailable(reason) => {
                    return Err(FetchError::RemoteUnavailable {
                        repository: repo.clone(),
                        resource,
                        attempts: failures + 1,
                        reason,
                    })
                }
                AttemptError::Transient {
                    reason,
                    detail,
                    wait,
                } => (reason, detail, wait),
            };

            failures += 1;
            if self.retry.exhausted(failures) {
                return Err(FetchError::RemoteUnavailable {
                    repository: repo.clone(),
                    resource,
                    attempts: failures,
                    reason: detail,
                });
            }
            let delay = wait.unwrap_or_else(|| self.retry.delay(failures));
            if delay > self.max_rate_limit_wait {
                return Err(FetchError::RemoteUnavailable {
                    repository: repo.clone(),
                    resource,
                    attempts: failures,
                    reason: format!("{detail}; requested wait of {}s", delay.as_secs()),
                });
            }
            warn!(
                repo = %repo,
                resource = %resource,
                attempt = failures,
                reason,
                error = %detail,
                delay_ms = delay.as_millis() as u64,
                "GitHub page request failed, retrying"
            );
            metrics::RETRIES_TOTAL
                .with_label_values(&[resource.as_str(), reason])
                .inc();
            metrics::SLEEP_SECONDS
                .with_label_values(&[reason])
                .inc_by(delay.as_secs());
            sleep(delay).await;
        }
    }

    async fn credential(
        &self,
        repo: &RepoId,
        resource: ResourceType,
    ) -> Result<Credential, AttemptError> {
        loop {
            match self.tokens.pick().await {
                TokenSelection::Use(credential) => return Ok(credential),
                TokenSelection::Wait(wait) if wait > self.max_rate_limit_wait => {
                    return Err(AttemptError::Unavailable(format!(
                        "rate limit resets in {}s",
                        wait.as_secs()
                    )))
                }
                TokenSelection::Wait(wait) => {
                    info!(
                        repo = %repo,
                        resource = %resource,
                        wait_secs = wait.as_secs(),
                        "rate limit exhausted, waiting for reset"
                    );
                    metrics::SLEEP_SECONDS
                        .with_label_values(&["rate_limit"])
                        .inc_by(wait.as_secs());
                    sleep(wait + Duration::from_secs(1)).await;
                }
            }
        }
    }

    fn request(
        &self,
        url: &Url,
        credential: &Credential,
    ) -> Result<Request<Vec<u8>>, AttemptError> {
        let mut builder = Request::get(url.as_str())
            .header(header::ACCEPT, ACCEPT)
            .header("x-github-api-version", API_VERSION)
            .header(header::USER_AGENT, self.user_agent.clone());
        if let Some(auth) = credential.authorization() {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        builder
            .body(Vec::new())
            .map_err(|err| AttemptError::Fatal(FetchError::InvalidRequest(err.to_string())))
    }

    async fn attempt(
        &self,
        repo: &RepoId,
        resource: ResourceType,
        url: &Url,
    ) -> Result<Page, AttemptError> {
        let credential = self.credential(repo, resource).await?;
        let request = self.request(url, &credential)?;

        let permit = self
            .inflight
            .acquire()
            .await
            .map_err(|_| AttemptError::Fatal(FetchError::InvalidRequest("fetcher closed".into())))?;
        let start = Instant::now();
        let outcome = tokio::time::timeout(self.page_timeout, self.exec.execute(request)).await;
        drop(permit);

        let response = match outcome {
            Err(_) => {
                return Err(AttemptError::Transient {
                    reason: "timeout",
                    detail: format!("no response within {}s", self.page_timeout.as_secs()),
                    wait: None,
                })
            }
            Ok(Err(err)) => {
                return Err(AttemptError::Transient {
                    reason: "transport",
                    detail: err.to_string(),
                    wait: None,
                })
            }
            Ok(Ok(response)) => response,
        };

        let status = response.status();
        metrics::LATENCY
            .with_label_values(&[resource.as_str()])
            .observe(start.elapsed().as_secs_f64());
        metrics::REQUESTS_TOTAL
            .with_label_values(&[resource.as_str(), metrics::status_class(status)])
            .inc();

        let headers = response.headers().clone();
        let rate_info = parse_rate_limit(&headers);
        if let Some(update) = rate_info.clone() {
            metrics::RATE_REMAINING
                .with_label_values(&[&credential.id])
                .set(update.remaining);
            self.tokens.update(&credential.id, update).await;
        }

        if status.is_success() {
            self.tokens.consume(&credential.id, 1).await;
            let body = serde_json::from_slice(response.body()).map_err(|source| {
                AttemptError::Fatal(FetchError::Decode {
                    endpoint: url.to_string(),
                    source,
                })
            })?;
            return Ok(Page { headers, body });
        }

        let request_id = headers
            .get("x-github-request-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-");
        debug!(
            status = %status,
            endpoint = %url,
            github_request_id = request_id,
            "GitHub error response"
        );

        if status == StatusCode::UNAUTHORIZED {
            return Err(AttemptError::Unavailable(format!(
                "credentials {} rejected",
                credential.id
            )));
        }

        if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
            let wait = parse_retry_after(&headers).map(|advice| advice.wait).or_else(|| {
                rate_info
                    .filter(|info| info.remaining == 0)
                    .map(|info| (info.reset - Utc::now()).to_std().unwrap_or_default())
            });
            return Err(AttemptError::Transient {
                reason: "rate_limited",
                detail: format!("status {status}"),
                wait: wait.map(|w| w + Duration::from_secs(1)),
            });
        }

        if status.is_server_error() {
            return Err(AttemptError::Transient {
                reason: "server_error",
                detail: format!("status {status}"),
                wait: parse_retry_after(&headers).map(|advice| advice.wait),
            });
        }

        Err(AttemptError::Fatal(FetchError::Rejected {
            status,
            endpoint: url.to_string(),
        }))
    }
}

#[async_trait]
impl RemoteFetcher for GithubFetcher {
    async fn fetch_all(
        &self,
        repository: &RepoId,
        resource: ResourceType,
    ) -> Result<Vec<Value>, FetchError> {
        match self.fetch_pages(repository, resource).await {
            Ok((records, pages)) => {
                metrics::RECORDS_TOTAL
                    .with_label_values(&[resource.as_str()])
                    .inc_by(records.len() as u64);
                info!(
                    repo = %repository,
                    resource = %resource,
                    pages,
                    records = records.len(),
                    "fetched resource"
                );
                Ok(records)
            }
            Err(err) => {
                let kind = match &err {
                    FetchError::RemoteUnavailable { .. } => "unavailable",
                    FetchError::Rejected { .. } => "rejected",
                    FetchError::Decode { .. } => "decode",
                    FetchError::InvalidRequest(_) => "invalid",
                };
                metrics::FAILURES_TOTAL
                    .with_label_values(&[resource.as_str(), kind])
                    .inc();
                warn!(repo = %repository, resource = %resource, error = %err, "fetch failed");
                Err(err)
            }
        }
    }
}
