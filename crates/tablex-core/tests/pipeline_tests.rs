//! End-to-end pipeline tests.
//!
//! Each test drives the full engine over synthetic parsed layout:
//! scan → classify → extract → link → validate → score → gate → learn.
//! The classifier is either the deterministic heuristic backend or a
//! scripted test double — never a network service.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tablex_core::{
    BoundingBox, CancellationToken, Classifier, ClassifyError, Document, Engine, ExtractError,
    ExtractionConfig, HeuristicClassifier, Page, PatternStore, RegionView, TextBlock, Verdict,
};

fn block(text: &str, l: f32, t: f32, r: f32, b: f32) -> TextBlock {
    TextBlock {
        text: text.to_string(),
        bbox: BoundingBox { l, t, r, b },
    }
}

/// Footer pair that repeats near the bottom of every page.
fn footer_blocks() -> Vec<TextBlock> {
    vec![
        block("Tel: +1 604 681 4196", 50.0, 744.0, 210.0, 756.0),
        block("office", 400.0, 744.0, 450.0, 756.0),
        block("Tel: +1 604 681 4196", 50.0, 760.0, 210.0, 772.0),
        block("office", 400.0, 760.0, 450.0, 772.0),
    ]
}

/// Page 0: heading, 3-column costs table, trailing note.
fn costs_page() -> Page {
    let mut blocks = vec![block(
        "Table 1: Summary of Project Costs by Task",
        50.0,
        160.0,
        400.0,
        172.0,
    )];
    blocks.push(block("Task No.", 50.0, 200.0, 120.0, 212.0));
    blocks.push(block("Description", 200.0, 200.0, 290.0, 212.0));
    blocks.push(block("Totals (CAD$)", 380.0, 200.0, 490.0, 212.0));
    blocks.push(block("100", 50.0, 216.0, 80.0, 228.0));
    blocks.push(block("Design Review", 200.0, 216.0, 320.0, 228.0));
    blocks.push(block("$212,000", 380.0, 216.0, 450.0, 228.0));
    blocks.push(block("200", 50.0, 232.0, 80.0, 244.0));
    blocks.push(block("Risk Review", 200.0, 232.0, 310.0, 244.0));
    blocks.push(block("$235,400", 380.0, 232.0, 450.0, 244.0));
    blocks.push(block(
        "See Table 2 for the delivery schedule",
        50.0,
        266.0,
        330.0,
        278.0,
    ));
    blocks.extend(footer_blocks());
    Page {
        index: 0,
        width: 612.0,
        height: 792.0,
        blocks,
    }
}

/// Page 1: heading, 2-column milestones table with 3 data rows, note.
fn schedule_page() -> Page {
    let mut blocks = vec![block(
        "Table 2: Schedule of Milestones",
        50.0,
        160.0,
        300.0,
        172.0,
    )];
    blocks.push(block("Milestone", 50.0, 200.0, 130.0, 212.0));
    blocks.push(block("Amount", 300.0, 200.0, 360.0, 212.0));
    blocks.push(block("Kickoff", 50.0, 216.0, 110.0, 228.0));
    blocks.push(block("$25,000", 300.0, 216.0, 360.0, 228.0));
    blocks.push(block("Field Review", 50.0, 232.0, 150.0, 244.0));
    blocks.push(block("$40,000", 300.0, 232.0, 365.0, 244.0));
    blocks.push(block("Final Report", 50.0, 248.0, 150.0, 260.0));
    blocks.push(block("$12,500", 300.0, 248.0, 365.0, 260.0));
    blocks.push(block(
        "Refer to Table 1 for the cost breakdown",
        50.0,
        282.0,
        340.0,
        294.0,
    ));
    blocks.extend(footer_blocks());
    Page {
        index: 1,
        width: 612.0,
        height: 792.0,
        blocks,
    }
}

/// Page 2: nothing but the repeated footer.
fn footer_only_page() -> Page {
    Page {
        index: 2,
        width: 612.0,
        height: 792.0,
        blocks: footer_blocks(),
    }
}

fn proposal_document() -> Document {
    Document {
        name: "BHP_Proposal.pdf".to_string(),
        pages: vec![costs_page(), schedule_page(), footer_only_page()],
    }
}

fn engine(config: ExtractionConfig) -> Engine {
    Engine::new(config, Arc::new(HeuristicClassifier)).expect("valid config")
}

// ---------------------------------------------------------------------
// Core properties
// ---------------------------------------------------------------------

#[tokio::test]
async fn extraction_is_idempotent() {
    let engine = engine(ExtractionConfig::default());
    let doc = proposal_document();
    let first = engine.extract(&doc).await.expect("first run");
    let second = engine.extract(&doc).await.expect("second run");
    assert!(first.content_eq(&second));
}

#[tokio::test]
async fn every_row_is_rectangular() {
    let engine = engine(ExtractionConfig::default());
    let result = engine.extract(&proposal_document()).await.expect("extract");
    assert!(!result.tables.is_empty());
    for table in &result.tables {
        let leaves: usize = table.headers.iter().map(|g| g.leaf_count()).sum();
        for row in &table.rows {
            assert_eq!(row.len(), leaves, "ragged row in '{}'", table.title);
        }
    }
}

#[tokio::test]
async fn no_table_below_threshold_in_output() {
    // A textual 2x2 table scores well below the default threshold
    // under the heuristic backend; the 3-column table passes.
    let mut page = costs_page();
    page.blocks.push(block("Name", 50.0, 500.0, 90.0, 512.0));
    page.blocks.push(block("Role", 300.0, 500.0, 340.0, 512.0));
    page.blocks.push(block("Alice", 50.0, 516.0, 95.0, 528.0));
    page.blocks.push(block("Engineer", 300.0, 516.0, 370.0, 528.0));
    page.blocks.push(block("Bob", 50.0, 532.0, 85.0, 544.0));
    page.blocks.push(block("Operations", 300.0, 532.0, 380.0, 544.0));
    let doc = Document {
        name: "mixed.pdf".to_string(),
        pages: vec![page],
    };

    let engine = engine(ExtractionConfig::default());
    let result = engine.extract(&doc).await.expect("extract");
    let threshold = engine.config().confidence_threshold;
    for table in &result.tables {
        assert!(table.confidence >= threshold);
    }
    assert!(!result.rejected.is_empty(), "weak candidate should be logged");
    for candidate in &result.rejected {
        assert!(candidate.confidence < threshold);
    }
}

#[tokio::test]
async fn learning_is_monotonic_and_novelty_reported_once() {
    let store = Arc::new(PatternStore::in_memory(64));
    let engine = Engine::new(ExtractionConfig::default(), Arc::new(HeuristicClassifier))
        .expect("valid config")
        .with_store(Arc::clone(&store));
    let doc = proposal_document();

    let first = engine.extract_and_learn(&doc).await.expect("first run");
    assert_eq!(first.novel_patterns.len(), 2, "two distinct shapes learned");

    let second = engine.extract_and_learn(&doc).await.expect("second run");
    assert!(second.novel_patterns.is_empty(), "nothing novel on rerun");

    for table in &first.tables {
        let pattern = store
            .lookup(&table.structural_fingerprint)
            .expect("fingerprint retained");
        assert_eq!(pattern.occurrence_count, 2);
    }
}

#[tokio::test]
async fn relationships_are_symmetric() {
    let engine = engine(ExtractionConfig::default());
    let result = engine.extract(&proposal_document()).await.expect("extract");
    assert_eq!(result.tables.len(), 2);

    let costs = &result.tables[0];
    let schedule = &result.tables[1];
    assert!(costs
        .relationships
        .related_tables
        .contains(&schedule.title));
    assert!(schedule
        .relationships
        .related_tables
        .contains(&costs.title));
    assert!(costs
        .relationships
        .references
        .contains(&"Table 2".to_string()));
    assert!(schedule
        .relationships
        .references
        .contains(&"Table 1".to_string()));
}

#[tokio::test]
async fn worker_count_does_not_change_output() {
    let doc = proposal_document();
    let mut results = Vec::new();
    for parallel_agents in [1usize, 2, 8] {
        let engine = engine(ExtractionConfig {
            parallel_agents,
            ..ExtractionConfig::default()
        });
        results.push(engine.extract(&doc).await.expect("extract"));
    }
    assert!(results[0].content_eq(&results[1]));
    assert!(results[0].content_eq(&results[2]));
}

// ---------------------------------------------------------------------
// Scenario tests
// ---------------------------------------------------------------------

#[tokio::test]
async fn repeated_footer_never_becomes_a_table() {
    let engine = engine(ExtractionConfig::default());
    let result = engine.extract(&proposal_document()).await.expect("extract");
    for table in &result.tables {
        assert!(!table.title.contains("604 681 4196"));
        for row in &table.rows {
            assert!(!row.iter().any(|cell| cell.contains("604 681 4196")));
        }
    }
    assert_eq!(result.tables.len(), 2);
}

#[tokio::test]
async fn title_linked_exactly_from_preceding_heading() {
    let engine = engine(ExtractionConfig::default());
    let result = engine.extract(&proposal_document()).await.expect("extract");
    assert_eq!(
        result.tables[0].title,
        "Table 1: Summary of Project Costs by Task"
    );
    assert_eq!(result.quality_metrics.title_accuracy, 100.0);
}

#[tokio::test]
async fn multi_level_header_produces_one_group_with_range() {
    let blocks = vec![
        block("Metric", 50.0, 200.0, 110.0, 212.0),
        block("Quarterly Costs", 200.0, 200.0, 480.0, 212.0),
        block("Item", 50.0, 216.0, 90.0, 228.0),
        block("Q1", 200.0, 216.0, 230.0, 228.0),
        block("Q2", 320.0, 216.0, 350.0, 228.0),
        block("Q3", 440.0, 216.0, 470.0, 228.0),
        block("Labor", 50.0, 232.0, 100.0, 244.0),
        block("10", 200.0, 232.0, 220.0, 244.0),
        block("20", 320.0, 232.0, 340.0, 244.0),
        block("30", 440.0, 232.0, 460.0, 244.0),
        block("Parts", 50.0, 248.0, 100.0, 260.0),
        block("5", 200.0, 248.0, 215.0, 260.0),
        block("6", 320.0, 248.0, 335.0, 260.0),
        block("7", 440.0, 248.0, 455.0, 260.0),
    ];
    let doc = Document {
        name: "quarters.pdf".to_string(),
        pages: vec![Page {
            index: 0,
            width: 612.0,
            height: 792.0,
            blocks,
        }],
    };
    let engine = engine(ExtractionConfig {
        confidence_threshold: 85.0,
        ..ExtractionConfig::default()
    });
    let result = engine.extract(&doc).await.expect("extract");
    assert_eq!(result.tables.len(), 1);
    let table = &result.tables[0];

    let group = table
        .headers
        .iter()
        .find(|g| g.label == "Quarterly Costs")
        .expect("span group");
    assert_eq!(group.columns, [2, 4]);
    assert_eq!(group.children, vec!["Q1", "Q2", "Q3"]);

    let leaves: usize = table.headers.iter().map(|g| g.leaf_count()).sum();
    for row in &table.rows {
        assert_eq!(row.len(), leaves);
    }
}

// ---------------------------------------------------------------------
// Modes, degradation, cancellation
// ---------------------------------------------------------------------

#[tokio::test]
async fn learn_mode_emits_identical_table_content() {
    let doc = proposal_document();

    let plain = Engine::new(ExtractionConfig::default(), Arc::new(HeuristicClassifier))
        .expect("valid config")
        .with_store(Arc::new(PatternStore::in_memory(64)));
    let learning = Engine::new(ExtractionConfig::default(), Arc::new(HeuristicClassifier))
        .expect("valid config")
        .with_store(Arc::new(PatternStore::in_memory(64)));

    let read_only = plain.extract(&doc).await.expect("extract");
    let learned = learning.extract_and_learn(&doc).await.expect("learn");
    assert_eq!(read_only.tables, learned.tables);
    assert_eq!(read_only.quality_metrics, learned.quality_metrics);
}

#[tokio::test]
async fn missing_store_degrades_without_failing() {
    let doc = proposal_document();
    let engine = engine(ExtractionConfig::default());
    let result = engine.extract_and_learn(&doc).await.expect("still succeeds");
    assert!(result.novel_patterns.is_empty());
    assert_eq!(result.tables.len(), 2);

    // Structure is untouched by the missing store; only the prior term
    // of the score can differ.
    let with_store = Engine::new(ExtractionConfig::default(), Arc::new(HeuristicClassifier))
        .expect("valid config")
        .with_store(Arc::new(PatternStore::in_memory(64)));
    let primed = with_store.extract(&doc).await.expect("extract");
    assert_eq!(result.tables.len(), primed.tables.len());
    for (a, b) in result.tables.iter().zip(&primed.tables) {
        assert_eq!(a.headers, b.headers);
        assert_eq!(a.rows, b.rows);
        assert_eq!(a.title, b.title);
        assert_eq!(a.notes, b.notes);
    }
}

#[tokio::test]
async fn empty_document_is_the_only_fatal_error() {
    let engine = engine(ExtractionConfig::default());
    let doc = Document {
        name: "unreadable.pdf".to_string(),
        pages: Vec::new(),
    };
    assert!(matches!(
        engine.extract(&doc).await,
        Err(ExtractError::DocumentFailure { .. })
    ));
}

#[tokio::test]
async fn blank_pages_are_a_normal_empty_result() {
    let engine = engine(ExtractionConfig::default());
    let doc = Document {
        name: "blank.pdf".to_string(),
        pages: vec![Page {
            index: 0,
            width: 612.0,
            height: 792.0,
            blocks: Vec::new(),
        }],
    };
    let result = engine.extract(&doc).await.expect("no error");
    assert!(result.tables.is_empty());
    assert_eq!(result.quality_metrics.completeness, 100.0);
}

#[tokio::test]
async fn cancellation_yields_no_result() {
    let engine = engine(ExtractionConfig::default());
    let token = CancellationToken::new();
    token.cancel();
    let outcome = engine
        .extract_with_cancellation(&proposal_document(), &token)
        .await;
    assert!(matches!(outcome, Err(ExtractError::Cancelled)));
}

/// Backend that fails every call: the whole document must still
/// complete, with every region failing closed to non-table.
struct AlwaysFailing;

#[async_trait]
impl Classifier for AlwaysFailing {
    async fn classify(&self, _region: &RegionView) -> Result<Verdict, ClassifyError> {
        Err(ClassifyError::Transport {
            reason: "connection refused".to_string(),
        })
    }
}

#[tokio::test]
async fn classifier_outage_degrades_to_empty_output() {
    let config = ExtractionConfig {
        classify_max_retries: 0,
        classify_timeout_ms: 100,
        ..ExtractionConfig::default()
    };
    let engine = Engine::new(config, Arc::new(AlwaysFailing)).expect("valid config");
    let result = engine.extract(&proposal_document()).await.expect("no abort");
    assert!(result.tables.is_empty());
}

/// Scripted backend with call-order-dependent latency, to shake out
/// completion-order dependence in the fan-in.
struct JitteryClassifier {
    calls: AtomicUsize,
}

#[async_trait]
impl Classifier for JitteryClassifier {
    async fn classify(&self, region: &RegionView) -> Result<Verdict, ClassifyError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis((call as u64 * 7) % 23)).await;
        Ok(Verdict {
            is_table: true,
            title_hint: String::new(),
            classifier_confidence: 96.0 + f64::from(region.page as u32 % 3),
        })
    }
}

#[tokio::test]
async fn verdicts_join_in_region_order_not_completion_order() {
    let doc = proposal_document();
    let mut results = Vec::new();
    for parallel_agents in [1usize, 8] {
        let engine = Engine::new(
            ExtractionConfig {
                parallel_agents,
                ..ExtractionConfig::default()
            },
            Arc::new(JitteryClassifier {
                calls: AtomicUsize::new(0),
            }),
        )
        .expect("valid config");
        results.push(engine.extract(&doc).await.expect("extract"));
    }
    assert!(results[0].content_eq(&results[1]));
}

#[tokio::test]
async fn engine_stats_accumulate() {
    let engine = engine(ExtractionConfig::default());
    let doc = proposal_document();
    engine.extract(&doc).await.expect("first");
    engine.extract(&doc).await.expect("second");
    let stats = engine.stats();
    assert_eq!(stats.documents_processed, 2);
    assert_eq!(stats.tables_extracted, 4);
}
