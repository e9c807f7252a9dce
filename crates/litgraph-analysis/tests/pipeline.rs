mod common;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use approx::assert_relative_eq;
use common::*;
use litgraph_analysis::{AnalysisError, AnalysisOrchestrator, AnalysisState, MetricKind};
use litgraph_cache::ManualClock;
use litgraph_core::{
    AnalysisSnapshot, AnalysisStore, CentralityRecord, Concept, ConceptId, EntityType,
    ExclusionReason, RelationKind, Relationship, Settings, SkipReason, VectorSource,
};
use litgraph_vector::ops::l2_norm;

fn with_embedder(
    store: Arc<litgraph_analysis::InMemoryAnalysisStore>,
    embedder: Arc<TopicEmbedder>,
) -> AnalysisOrchestrator {
    AnalysisOrchestrator::builder(Settings::default(), store)
        .embedding_provider(embedder)
        .build()
}

fn topic_members(topic: usize) -> BTreeSet<ConceptId> {
    (0..6).map(|m| concept_id(topic, m)).collect()
}

#[tokio::test]
async fn refresh_partitions_topics_and_finds_every_gap() {
    let (store, project) = seeded_store();
    let embedder = TopicEmbedder::new(Duration::ZERO);
    let orchestrator = with_embedder(store.clone(), embedder.clone());

    let summary = orchestrator.refresh(project).await.unwrap();
    assert_eq!(summary.vector_source, VectorSource::Embedding);
    assert_eq!(summary.concepts_analyzed, 18);
    assert_eq!(summary.cluster_count, 3);
    assert_eq!(summary.gap_count, 3);
    assert!(summary.no_gaps_reason.is_none());
    assert_eq!(embedder.calls(), 1);

    let clusters = orchestrator.get_clusters(project).await.unwrap();
    let partitions: BTreeSet<BTreeSet<ConceptId>> =
        clusters.iter().map(|c| c.concept_ids.clone()).collect();
    let expected: BTreeSet<BTreeSet<ConceptId>> = (0..3).map(topic_members).collect();
    assert_eq!(partitions, expected);
    for cluster in &clusters {
        assert_eq!(cluster.size, cluster.concept_ids.len());
        // Five chain edges over fifteen possible pairs.
        assert_relative_eq!(cluster.density, 5.0 / 15.0, epsilon = 1e-12);
        assert!(!cluster.label.is_empty());
    }

    let gaps = orchestrator.get_gaps(project).await.unwrap();
    assert_eq!(gaps.len(), 3);
    for gap in &gaps {
        assert_relative_eq!(gap.normalized_strength, 0.0);
        assert_relative_eq!(gap.gap_strength, 1.0);
        assert_eq!(gap.opportunity_percent(), 100);
        assert!(gap.semantic_distance > 0.5);
        assert!(gap.bridge_candidates.len() <= 5);
        assert!(gap.hypothesis.is_none());
    }
    for pair in gaps.windows(2) {
        assert!(pair[0].impact_score >= pair[1].impact_score);
    }
}

#[tokio::test]
async fn tfidf_fallback_still_covers_every_concept_once() {
    let (store, project) = seeded_store();
    let orchestrator = orchestrator(store);

    let summary = orchestrator.refresh(project).await.unwrap();
    assert_eq!(summary.vector_source, VectorSource::Tfidf);

    let clusters = orchestrator.get_clusters(project).await.unwrap();
    let mut seen = BTreeSet::new();
    for cluster in &clusters {
        assert!(cluster.size >= 3);
        for id in &cluster.concept_ids {
            assert!(seen.insert(*id), "concept {id} appears in two clusters");
        }
    }
    assert_eq!(seen.len(), 18);
}

#[tokio::test]
async fn centrality_is_cached_after_refresh_and_rebuilt_after_invalidate() {
    let (store, project) = seeded_store();
    let orchestrator = with_embedder(store.clone(), TopicEmbedder::new(Duration::ZERO));
    orchestrator.refresh(project).await.unwrap();

    assert!(orchestrator.centrality_cache().cached(project).is_some());
    let records = orchestrator.get_centrality(project).await.unwrap();
    assert_eq!(records.len(), 18);
    assert!(records.iter().all(|r| r.cluster_id.is_some()));
    let total: f64 = records.iter().map(|r| r.pagerank).sum();
    assert_relative_eq!(total, 1.0, epsilon = 1e-6);

    store
        .upsert_concepts(project, vec![Concept::new("transfer learning", EntityType::Method)])
        .unwrap();
    orchestrator.invalidate(project);
    assert!(orchestrator.centrality_cache().cached(project).is_none());
    assert_eq!(orchestrator.status(project).state, AnalysisState::Stale);

    // Rebuilt from current inputs, not restored from the stored rows.
    let rebuilt = orchestrator.get_centrality(project).await.unwrap();
    assert_eq!(rebuilt.len(), 19);
    assert!(orchestrator.centrality_cache().cached(project).is_some());
}

#[tokio::test]
async fn metrics_are_read_through_until_the_ttl_expires() {
    let (store, project) = seeded_store();
    let clock = Arc::new(ManualClock::default());
    let orchestrator = AnalysisOrchestrator::builder(Settings::default(), store.clone())
        .embedding_provider(TopicEmbedder::new(Duration::ZERO))
        .clock(clock.clone())
        .build();
    orchestrator.refresh(project).await.unwrap();

    // Three disconnected chains of five edges: 3 * (5/15 - (10/30)^2).
    let modularity = orchestrator
        .get_metric(project, MetricKind::Modularity)
        .await
        .unwrap();
    assert_relative_eq!(modularity, 2.0 / 3.0, epsilon = 1e-12);

    store
        .upsert_relationships(
            project,
            vec![Relationship::new(
                concept_id(0, 0),
                concept_id(1, 0),
                RelationKind::Extends,
            )],
        )
        .unwrap();
    let cached = orchestrator
        .get_metric(project, MetricKind::Modularity)
        .await
        .unwrap();
    assert_relative_eq!(cached, modularity);

    clock.advance(chrono::Duration::seconds(301));
    let recomputed = orchestrator
        .get_metric(project, MetricKind::Modularity)
        .await
        .unwrap();
    assert!(recomputed < modularity);
}

#[tokio::test]
async fn concurrent_refreshes_share_one_run() {
    let (store, project) = seeded_store();
    let embedder = TopicEmbedder::new(Duration::from_millis(200));
    let orchestrator = Arc::new(with_embedder(store, embedder.clone()));

    let first = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.refresh(project).await }
    });
    let second = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.refresh(project).await }
    });
    let (first, second) = (first.await.unwrap().unwrap(), second.await.unwrap().unwrap());

    assert_eq!(first.run_id, second.run_id);
    assert_eq!(embedder.calls(), 1);
    assert!(!orchestrator.is_refreshing(project));

    // A later refresh starts a new run.
    let third = orchestrator.refresh(project).await.unwrap();
    assert_ne!(third.run_id, first.run_id);
    assert_eq!(embedder.calls(), 2);
}

#[tokio::test]
async fn try_refresh_reports_busy_while_a_run_is_in_flight() {
    let (store, project) = seeded_store();
    let orchestrator = Arc::new(with_embedder(
        store,
        TopicEmbedder::new(Duration::from_millis(300)),
    ));

    let running = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.refresh(project).await }
    });
    while !orchestrator.is_refreshing(project) {
        tokio::task::yield_now().await;
    }
    assert_eq!(orchestrator.status(project).state, AnalysisState::Running);
    assert_eq!(
        orchestrator.try_refresh(project).await,
        Err(AnalysisError::Busy(project))
    );

    running.await.unwrap().unwrap();
    assert_eq!(orchestrator.status(project).state, AnalysisState::Fresh);
}

#[tokio::test]
async fn cancelled_run_leaves_previous_results_untouched() {
    let (store, project) = seeded_store();
    let orchestrator = Arc::new(with_embedder(
        store,
        TopicEmbedder::new(Duration::from_millis(300)),
    ));

    let running = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.refresh(project).await }
    });
    while !orchestrator.is_refreshing(project) {
        tokio::task::yield_now().await;
    }
    assert!(orchestrator.cancel(project));

    assert_eq!(
        running.await.unwrap(),
        Err(AnalysisError::Cancelled(project))
    );
    assert!(orchestrator.get_clusters(project).await.unwrap().is_empty());
    assert!(orchestrator.get_gaps(project).await.unwrap().is_empty());
    assert_eq!(orchestrator.status(project).state, AnalysisState::Cancelled);
    assert!(!orchestrator.cancel(project));
}

#[tokio::test]
async fn skipped_run_keeps_the_last_good_analysis() {
    let (store, project) = seeded_store();
    let orchestrator = with_embedder(store.clone(), TopicEmbedder::new(Duration::ZERO));
    orchestrator.refresh(project).await.unwrap();
    let before = orchestrator.get_clusters(project).await.unwrap();

    let removed: Vec<ConceptId> = (0..3)
        .flat_map(|t| (0..6).map(move |m| (t, m)))
        .filter(|&(t, m)| !(t == 0 && m < 3))
        .map(|(t, m)| concept_id(t, m))
        .collect();
    assert_eq!(store.remove_concepts(project, &removed).unwrap(), 15);
    orchestrator.invalidate(project);

    assert_eq!(
        orchestrator.refresh(project).await,
        Err(AnalysisError::InsufficientData(
            SkipReason::InsufficientConcepts
        ))
    );
    assert_eq!(orchestrator.get_clusters(project).await.unwrap(), before);

    let status = orchestrator.status(project);
    assert_eq!(
        status.state,
        AnalysisState::Skipped {
            reason: SkipReason::InsufficientConcepts
        }
    );
    assert_eq!(status.last_run.map(|r| r.cluster_count), Some(3));
}

#[tokio::test]
async fn same_inputs_and_seed_give_the_same_partition() {
    let mut partitions = Vec::new();
    for _ in 0..2 {
        let (store, project) = seeded_store();
        let orchestrator = orchestrator(store);
        orchestrator.refresh(project).await.unwrap();
        let clusters = orchestrator.get_clusters(project).await.unwrap();
        partitions.push(
            clusters
                .into_iter()
                .map(|c| (c.cluster_id, c.concept_ids, c.label))
                .collect::<Vec<_>>(),
        );
    }
    assert_eq!(partitions[0], partitions[1]);
}

#[tokio::test]
async fn llm_labels_clusters_and_proposes_hypotheses() {
    let (store, project) = seeded_store();
    let orchestrator = AnalysisOrchestrator::builder(Settings::default(), store)
        .embedding_provider(TopicEmbedder::new(Duration::ZERO))
        .llm(Arc::new(ScriptedLlm))
        .build();

    let summary = orchestrator.refresh(project).await.unwrap();
    assert_eq!(summary.labels_from_llm, 3);

    let clusters = orchestrator.get_clusters(project).await.unwrap();
    assert!(clusters.iter().all(|c| c.label.ends_with(" research")));

    let gaps = orchestrator.get_gaps(project).await.unwrap();
    for gap in &gaps {
        let hypothesis = gap.hypothesis.as_ref().expect("hypothesis attached");
        assert!(hypothesis.text.starts_with("Methods from "));
        assert_relative_eq!(hypothesis.confidence, 1.0);
    }
}

#[tokio::test]
async fn disabled_llm_is_never_consulted() {
    let (store, project) = seeded_store();
    let mut settings = Settings::default();
    settings.llm.enabled = false;
    let orchestrator = AnalysisOrchestrator::builder(settings, store)
        .embedding_provider(TopicEmbedder::new(Duration::ZERO))
        .llm(Arc::new(ScriptedLlm))
        .build();

    let summary = orchestrator.refresh(project).await.unwrap();
    assert_eq!(summary.labels_from_llm, 0);
    let gaps = orchestrator.get_gaps(project).await.unwrap();
    assert!(gaps.iter().all(|g| g.hypothesis.is_none()));
}

#[tokio::test]
async fn deleted_project_is_not_found_and_forgotten() {
    let (store, project) = seeded_store();
    let orchestrator = with_embedder(store.clone(), TopicEmbedder::new(Duration::ZERO));
    orchestrator.refresh(project).await.unwrap();

    assert!(store.delete_project(project));
    orchestrator.project_deleted(project);

    assert_eq!(
        orchestrator.get_clusters(project).await,
        Err(AnalysisError::ProjectNotFound(project))
    );
    assert_eq!(
        orchestrator.refresh(project).await,
        Err(AnalysisError::ProjectNotFound(project))
    );
    assert!(orchestrator.centrality_cache().cached(project).is_none());
    assert_eq!(orchestrator.status(project).state, AnalysisState::NeverRun);
}

fn blank_concepts(n: usize) -> Vec<Concept> {
    (0..n)
        .map(|_| Concept::new("A of the", EntityType::Concept))
        .collect()
}

#[tokio::test]
async fn concepts_without_vocabulary_terms_never_form_a_cluster() {
    let (store, project) = seeded_store();
    let blanks = blank_concepts(4);
    store.upsert_concepts(project, blanks.clone()).unwrap();
    let orchestrator = orchestrator(store);

    let summary = orchestrator.refresh(project).await.unwrap();
    assert_eq!(summary.vector_source, VectorSource::Tfidf);
    assert_eq!(summary.concepts_analyzed, 18);
    assert_eq!(summary.excluded.len(), 4);
    assert!(summary
        .excluded
        .iter()
        .all(|e| e.reason == ExclusionReason::EmptyTfidfVector));

    let clusters = orchestrator.get_clusters(project).await.unwrap();
    for cluster in &clusters {
        assert!(l2_norm(&cluster.centroid) > 0.0);
        assert!(blanks.iter().all(|b| !cluster.concept_ids.contains(&b.id)));
    }
    let clustered: usize = clusters.iter().map(|c| c.size).sum();
    assert_eq!(clustered, 18);
}

#[tokio::test]
async fn blank_concepts_do_not_count_toward_the_minimum() {
    let store = Arc::new(litgraph_analysis::InMemoryAnalysisStore::new());
    let project = store.create_project();
    let (concepts, _) = topical_dataset();
    let mut input: Vec<Concept> = concepts.into_iter().take(9).collect();
    input.extend(blank_concepts(4));
    store.upsert_concepts(project, input).unwrap();
    let orchestrator = orchestrator(store);

    assert_eq!(
        orchestrator.refresh(project).await,
        Err(AnalysisError::InsufficientData(
            SkipReason::InsufficientConcepts
        ))
    );
}

#[tokio::test]
async fn failed_write_publishes_no_centrality() {
    let (store, project) = seeded_store();
    let mut faulty = FaultyStore::new(store.clone());
    faulty.fail_writes = true;
    let orchestrator = AnalysisOrchestrator::builder(Settings::default(), Arc::new(faulty))
        .embedding_provider(TopicEmbedder::new(Duration::ZERO))
        .build();

    let result = orchestrator.refresh(project).await;
    assert!(matches!(result, Err(AnalysisError::Storage(ref msg)) if msg.contains("disk full")));
    assert!(matches!(
        orchestrator.status(project).state,
        AnalysisState::Failed { .. }
    ));
    assert!(orchestrator.get_clusters(project).await.unwrap().is_empty());
    assert!(orchestrator.centrality_cache().cached(project).is_none());

    // Rebuilt against the stored (empty) partition.
    let records = orchestrator.get_centrality(project).await.unwrap();
    assert_eq!(records.len(), 18);
    assert!(records.iter().all(|r| r.cluster_id.is_none()));
}

#[tokio::test]
async fn project_vanishing_during_loads_cancels_the_run() {
    let (store, project) = seeded_store();
    let mut faulty = FaultyStore::new(store);
    faulty.vanish_on_load = true;
    let orchestrator = AnalysisOrchestrator::new(Settings::default(), Arc::new(faulty));

    assert_eq!(
        orchestrator.refresh(project).await,
        Err(AnalysisError::Cancelled(project))
    );
}

#[tokio::test]
async fn deleting_the_project_mid_run_cancels_every_waiter() {
    let (store, project) = seeded_store();
    let embedder = TopicEmbedder::new(Duration::from_millis(300));
    let orchestrator = Arc::new(with_embedder(store.clone(), embedder.clone()));

    let waiters: Vec<_> = (0..2)
        .map(|_| {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.refresh(project).await })
        })
        .collect();
    while !orchestrator.is_refreshing(project) {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(store.delete_project(project));
    orchestrator.project_deleted(project);

    for waiter in waiters {
        assert_eq!(waiter.await.unwrap(), Err(AnalysisError::Cancelled(project)));
    }
    assert_eq!(embedder.calls(), 1);
    assert!(store.snapshot(project).is_err());
    assert!(orchestrator.centrality_cache().cached(project).is_none());
    assert_eq!(orchestrator.status(project).state, AnalysisState::NeverRun);
}

#[tokio::test]
async fn persisted_centrality_is_restored_on_a_cold_cache() {
    let (store, project) = seeded_store();
    let stored = CentralityRecord {
        concept_id: concept_id(0, 0),
        degree: 0.4,
        betweenness: 0.25,
        pagerank: 0.5,
        cluster_id: Some(0),
    };
    store
        .replace_analysis(
            project,
            AnalysisSnapshot {
                centrality: vec![stored.clone()],
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let orchestrator = orchestrator(store);

    let records = orchestrator.get_centrality(project).await.unwrap();
    assert_eq!(*records, vec![stored]);
    assert!(orchestrator.centrality_cache().cached(project).is_some());

    orchestrator.invalidate(project);
    let rebuilt = orchestrator.get_centrality(project).await.unwrap();
    assert_eq!(rebuilt.len(), 18);
}
