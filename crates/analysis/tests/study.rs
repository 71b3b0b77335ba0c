use analysis::{
    analyze, build, ActivityMetric, Corpus, GenealogyError, Period, ProjectData, ProjectFilter,
};
use cache::CacheStore;
use chrono::{TimeZone, Utc};
use normalizer::{Commit, PullRequest, PullRequestState, RepoId, Repository, ResourceType};
use serde_json::json;

fn id(name: &str) -> RepoId {
    name.parse().expect("repo id")
}

fn commit(sha: &str, day: u32) -> Commit {
    Commit {
        sha: sha.to_string(),
        parents: Vec::new(),
        author_name: Some("dev".into()),
        author_login: None,
        authored_at: Some(Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap()),
        message: String::new(),
    }
}

fn project(name: &str, parent: Option<&str>, shas: &[&str]) -> ProjectData {
    ProjectData {
        id: id(name),
        repository: Some(Repository {
            id: id(name),
            github_id: None,
            default_branch: "main".into(),
            parent: parent.map(id),
            created_at: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
        }),
        pull_requests: Vec::new(),
        commits: shas
            .iter()
            .enumerate()
            .map(|(i, sha)| commit(sha, i as u32 + 1))
            .collect(),
        skipped_records: 0,
        sources: Vec::new(),
    }
}

fn merged(repo: &str, number: u64, year: i32, month: u32) -> PullRequest {
    PullRequest {
        repository: id(repo),
        number,
        state: PullRequestState::Merged {
            merge_commit: format!("m{number}"),
            merged_at: Utc.with_ymd_and_hms(year, month, 10, 0, 0, 0).unwrap(),
        },
        author: None,
        labels: Vec::new(),
        created_at: Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).unwrap(),
    }
}

#[test]
fn fork_inherits_shared_history() {
    let corpus: Corpus = vec![
        project("o/r0", None, &["a", "b", "x", "y"]),
        project("o/r1", Some("o/r0"), &["a", "b", "c"]),
    ]
    .into_iter()
    .collect();
    let repos = vec![id("o/r0"), id("o/r1")];
    let report = build(&corpus, &repos).expect("genealogy");

    let edge = report.forest.parent_of(&id("o/r1")).expect("edge");
    assert_eq!(edge.parent, id("o/r0"));
    assert_eq!(edge.divergence_sha, "b");

    let record = analyze(&id("o/r1"), &corpus, &report.forest);
    assert_eq!(record.total, 3);
    assert_eq!(record.inherited, 2);
    assert!((record.ratio - 0.667).abs() < 0.001);

    let root = analyze(&id("o/r0"), &corpus, &report.forest);
    assert_eq!(root.inherited, 0);
    assert_eq!(root.ratio, 0.0);
}

#[test]
fn inheritance_accumulates_across_generations() {
    let corpus: Corpus = vec![
        project("o/base", None, &["a"]),
        project("o/mid", Some("o/base"), &["a", "b"]),
        project("o/leaf", Some("o/mid"), &["a", "b", "c", "d"]),
    ]
    .into_iter()
    .collect();
    let repos: Vec<RepoId> = corpus.repositories().cloned().collect();
    let report = build(&corpus, &repos).expect("genealogy");
    let record = analyze(&id("o/leaf"), &corpus, &report.forest);
    assert_eq!(record.inherited, 2);
    assert_eq!(record.total, 4);
    assert_eq!(record.lineage, vec![id("o/mid"), id("o/base")]);
    assert!(record.inherited <= record.total);
}

#[test]
fn fork_without_shared_commits_is_skipped() {
    let corpus: Corpus = vec![
        project("o/up", None, &["u1", "u2"]),
        project("o/fork", Some("o/up"), &["f1"]),
        project("o/orphan", Some("o/missing"), &["z"]),
    ]
    .into_iter()
    .collect();
    let repos = vec![id("o/up"), id("o/fork"), id("o/orphan")];
    let report = build(&corpus, &repos).expect("genealogy");
    assert!(report.forest.is_empty());
    let skipped: Vec<RepoId> = report.skipped.iter().map(|s| s.repository.clone()).collect();
    assert_eq!(skipped, vec![id("o/fork"), id("o/orphan")]);

    let record = analyze(&id("o/fork"), &corpus, &report.forest);
    assert_eq!((record.total, record.inherited), (1, 0));
}

#[test]
fn mutual_forks_are_a_cycle() {
    let corpus: Corpus = vec![
        project("o/a", Some("o/b"), &["s1"]),
        project("o/b", Some("o/a"), &["s1"]),
    ]
    .into_iter()
    .collect();
    let repos = vec![id("o/a"), id("o/b")];
    let err = build(&corpus, &repos).expect_err("cycle");
    assert!(matches!(err, GenealogyError::CycleDetected { .. }));
}

#[test]
fn empty_history_has_zero_density() {
    let corpus: Corpus = vec![project("o/empty", None, &[])].into_iter().collect();
    let report = build(&corpus, &[id("o/empty")]).expect("genealogy");
    let record = analyze(&id("o/empty"), &corpus, &report.forest);
    assert_eq!(record.total, 0);
    assert_eq!(record.ratio, 0.0);
}

#[test]
fn activity_filter_needs_one_busy_period() {
    let mut busy = project("o/busy", None, &[]);
    busy.pull_requests = (1..=3).map(|n| merged("o/busy", n, 2024, 2)).collect();
    let mut spread = project("o/spread", None, &[]);
    spread.pull_requests = vec![
        merged("o/spread", 1, 2024, 1),
        merged("o/spread", 2, 2024, 4),
        merged("o/spread", 3, 2024, 7),
    ];
    let corpus: Corpus = vec![busy, spread].into_iter().collect();
    let repos = vec![id("o/spread"), id("o/busy"), id("o/unknown")];

    let quarterly = ProjectFilter::new(ActivityMetric::MergedPullRequests, Period::Quarter, 2);
    assert_eq!(quarterly.filter(&corpus, &repos), vec![id("o/busy")]);

    let yearly = ProjectFilter::new(ActivityMetric::MergedPullRequests, Period::Year, 2);
    assert_eq!(yearly.filter(&corpus, &repos), vec![id("o/spread"), id("o/busy")]);

    let decisions = quarterly.decisions(&corpus, &repos);
    assert_eq!(decisions[1].busiest_period.as_deref(), Some("2024-Q1"));
    assert_eq!(decisions[1].busiest_count, 3);
}

#[test]
fn commit_metric_counts_authored_dates() {
    let corpus: Corpus = vec![project("o/r", None, &["a", "b", "c"])].into_iter().collect();
    let monthly = ProjectFilter::new(ActivityMetric::Commits, Period::Month, 2);
    assert_eq!(monthly.filter(&corpus, &[id("o/r")]), vec![id("o/r")]);
    let stricter = ProjectFilter::new(ActivityMetric::Commits, Period::Month, 3);
    assert!(stricter.filter(&corpus, &[id("o/r")]).is_empty());
}

#[tokio::test]
async fn corpus_loads_from_cache_entries() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = CacheStore::open(dir.path()).await.expect("store");
    let repo = id("octo/widgets");

    store
        .get_or_fetch(&repo, ResourceType::Repository, || async {
            Ok(vec![json!({
                "id": 1,
                "full_name": "octo/widgets",
                "fork": true,
                "default_branch": "trunk",
                "created_at": "2023-01-01T00:00:00Z",
                "parent": {"full_name": "upstream/widgets"}
            })])
        })
        .await
        .expect("repo");
    store
        .get_or_fetch(&repo, ResourceType::Commits, || async {
            Ok(vec![
                json!({"sha": "a", "parents": [], "commit": {"author": {"name": "x", "date": "2024-01-01T00:00:00Z"}, "message": "init"}}),
                json!({"sha": "b", "commit": "not an object"}),
            ])
        })
        .await
        .expect("commits");
    store
        .get_or_fetch(&repo, ResourceType::PullRequests, || async {
            Ok(vec![json!({
                "number": 3,
                "state": "closed",
                "created_at": "2024-01-01T00:00:00Z",
                "merged_at": "2024-01-02T00:00:00Z",
                "merge_commit_sha": "a",
                "user": {"login": "dependabot[bot]", "type": "Bot"},
                "labels": []
            })])
        })
        .await
        .expect("pulls");

    let project = ProjectData::from_cache(&store, &repo, true)
        .await
        .expect("project");
    assert_eq!(project.parent(), Some(&id("upstream/widgets")));
    let metadata = project.repository.as_ref().expect("metadata");
    assert_eq!(metadata.default_branch, "trunk");
    assert!(project.canonical().is_none());
    assert_eq!(project.commits.len(), 1);
    assert_eq!(project.skipped_records, 1);
    assert_eq!(project.merged_pull_requests().count(), 1);
    assert_eq!(project.sources.len(), 3);

    let missing = ProjectData::from_cache(&store, &id("octo/absent"), false).await;
    assert!(matches!(
        missing,
        Err(analysis::AnalysisError::Cache(cache::CacheError::IncompleteCache { .. }))
    ));
}

#[test]
fn renamed_parent_resolves_through_its_canonical_name() {
    // o/base was cached under its old name; the fork names the new one.
    let mut base = project("o/base", None, &["a", "b", "x"]);
    if let Some(metadata) = base.repository.as_mut() {
        metadata.id = id("o/base-renamed");
    }
    let fork = project("o/fork", Some("o/base-renamed"), &["a", "b", "c"]);
    let corpus: Corpus = vec![base, fork].into_iter().collect();
    assert!(corpus.contains(&id("o/base-renamed")));
    assert_eq!(corpus.get(&id("o/base-renamed")).map(|p| p.id()), Some(&id("o/base")));

    let report = build(&corpus, &[id("o/fork"), id("o/base-renamed")]).expect("genealogy");
    assert!(report.skipped.is_empty());
    let edge = report.forest.parent_of(&id("o/fork")).expect("edge");
    assert_eq!(edge.parent, id("o/base"));

    let record = analyze(&id("o/fork"), &corpus, &report.forest);
    assert_eq!((record.total, record.inherited), (3, 2));
    assert_eq!(record.lineage, vec![id("o/base")]);
}

#[tokio::test]
async fn project_is_keyed_by_requested_name() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = CacheStore::open(dir.path()).await.expect("store");
    let old = id("octo/oldname");

    store
        .get_or_fetch(&old, ResourceType::Repository, || async {
            Ok(vec![json!({
                "id": 7,
                "full_name": "octo/newname",
                "created_at": "2023-01-01T00:00:00Z"
            })])
        })
        .await
        .expect("repo");
    store
        .get_or_fetch(&old, ResourceType::Commits, || async { Ok(Vec::new()) })
        .await
        .expect("commits");

    let project = ProjectData::from_cache(&store, &old, false)
        .await
        .expect("project");
    assert_eq!(project.id(), &old);
    assert_eq!(project.canonical(), Some(&id("octo/newname")));

    let corpus: Corpus = vec![project].into_iter().collect();
    assert!(corpus.contains(&old));
    assert!(corpus.contains(&id("octo/newname")));
    assert_eq!(corpus.repositories().cloned().collect::<Vec<_>>(), vec![old]);
}

#[tokio::test]
async fn missing_metadata_is_not_invented() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = CacheStore::open(dir.path()).await.expect("store");
    let repo = id("octo/bare");

    store
        .get_or_fetch(&repo, ResourceType::Repository, || async { Ok(Vec::new()) })
        .await
        .expect("repo");
    store
        .get_or_fetch(&repo, ResourceType::Commits, || async {
            Ok(vec![json!({"sha": "a", "commit": {"message": "init"}})])
        })
        .await
        .expect("commits");

    let project = ProjectData::from_cache(&store, &repo, false)
        .await
        .expect("project");
    assert!(project.repository.is_none());
    assert!(project.parent().is_none());
    assert_eq!(project.id(), &repo);
    assert_eq!(project.commits.len(), 1);
}
