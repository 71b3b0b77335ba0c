use std::collections::HashSet;

use normalizer::RepoId;
use serde::Serialize;

use crate::corpus::Corpus;
use crate::genealogy::GenealogyForest;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CloneDensityRecord {
    pub repository: RepoId,
    pub total: usize,
    pub inherited: usize,
    pub ratio: f64,
    /// Ancestors walked, nearest first.
    pub lineage: Vec<RepoId>,
}

/// Share of a repository's commits that also appear in any ancestor. The
/// inherited set grows one ancestor at a time and the walk stops as soon as
/// every commit is accounted for.
pub fn analyze(repository: &RepoId, corpus: &Corpus, forest: &GenealogyForest) -> CloneDensityRecord {
    let own: HashSet<&str> = corpus
        .get(repository)
        .map(|p| p.commit_shas())
        .unwrap_or_default();
    let total = own.len();

    let mut pending: HashSet<&str> = own;
    let mut inherited = 0usize;
    let mut lineage = Vec::new();

    for ancestor in forest.ancestors(repository) {
        if pending.is_empty() {
            break;
        }
        lineage.push(ancestor.clone());
        let Some(project) = corpus.get(ancestor) else {
            continue;
        };
        let ancestor_shas = project.commit_shas();
        pending.retain(|sha| {
            let shared = ancestor_shas.contains(sha);
            if shared {
                inherited += 1;
            }
            !shared
        });
    }

    let ratio = if total == 0 {
        0.0
    } else {
        inherited as f64 / total as f64
    };
    CloneDensityRecord {
        repository: repository.clone(),
        total,
        inherited,
        ratio,
        lineage,
    }
}

pub fn analyze_all(
    repositories: &[RepoId],
    corpus: &Corpus,
    forest: &GenealogyForest,
) -> Vec<CloneDensityRecord> {
    repositories
        .iter()
        .map(|repo| analyze(repo, corpus, forest))
        .collect()
}
