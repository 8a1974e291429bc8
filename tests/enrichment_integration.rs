//! End-to-end enrichment tests
//!
//! Drives `DirectoryContextService` through scripted directory, disabled-node
//! and remote-config endpoints with a hand-advanced clock: one enrichment per
//! user mode, a full dialog turn (enrich, engine echo, strip, annotate), and
//! the degraded paths when remotes fail.
//!
//! Run with: cargo test --test enrichment_integration

use chrono::{TimeZone, Utc};
use directory_context::config::{DirectoryConfig, Location, RepeatPhrases, ServiceConfig};
use directory_context::fetch::{ScriptedResponse, StaticFetcher};
use directory_context::{strip_context_fields, ContextPatch, DirectoryContextService, ManualClock};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tempfile::TempDir;

const DIRECTORY: &str = "https://dir.test/directory?lat=35.5&lng=139.25";
const MARKER: &str = "https://dir.test/last_updated?lat=35.5&lng=139.25";
const DISABLED: &str = "https://dir.test/disabled?lat=35.5&lng=139.25";
const REMOTE: &str = "https://cfg.test/conversation.json";
const LAST_MODIFIED: &str = "Wed, 01 May 2024 09:00:00 GMT";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn directory_payload(stamp: i64) -> Value {
    json!({
        "last_updated": {"t": stamp},
        "en": {
            "sections": [{"items": [
                {"title": "Zoo Shop", "nodeID": "z1", "titlePron": "zoo shop"},
                {"title": "Apple Store", "nodeID": "a1|a2", "titlePron": "apple store",
                 "short_description": "Electronics"},
                {"title": "Restroom", "nodeID": "r1", "titlePron": "rest room", "user_wheelchair": true},
                {"content": {"sections": [{"items": [
                    {"title": "Stairs", "nodeID": "s1", "titlePron": "stairs", "user_wheelchair": false},
                    {"title": "Restroom", "nodeID": "r2"}
                ]}]}},
                {"title": "Staff Room", "nodeID": "x1", "titlePron": "staff room"}
            ]}],
            "major_categories": {
                "shop": ["Zoo Shop", "Apple Store", "Staff Room"],
                "facility": ["Restroom", "Stairs"]
            },
            "sub_categories": {"electronics": ["Apple Store"]},
            "tags": {"wifi": ["Zoo Shop", "Apple Store"]},
            "building_floors": {
                "Main": {
                    "1F": [
                        {"title": "Apple Store", "node": "a1"},
                        {"title": "Zoo Shop", "node": "z1"},
                        {"title": "Staff Room", "node": "x1"}
                    ],
                    "2F": [{"title": "Stairs", "node": "s1"}]
                }
            },
            "building_group": {
                "East": {"major_categories": {"shop": ["Zoo Shop"]}},
                "West": {
                    "major_categories": {"shop": ["Apple Store"]},
                    "tags": {"wifi": ["Apple Store"]}
                }
            }
        }
    })
}

fn remote_config() -> Value {
    json!({
        "aliases": {"en": [{"name": "WC", "dest_name": "Restroom", "pron": "double-u-see"}]},
        "translations": {"en": [{"name": "Exit", "pron": "eg-zit"}]},
        "tags": {"en": {"wifi": "Free Wi-Fi"}},
        "hidden_names": {"en": ["Staff Room"]},
        "building_group": {"Campus": ["East", "West"], "Everything": ["Campus"], "disable": ["Campus"]},
        "preprocess": [["rest room", "restroom"]]
    })
}

struct TestHarness {
    fetcher: Arc<StaticFetcher>,
    clock: Arc<ManualClock>,
    service: DirectoryContextService,
    _data_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        init_tracing();

        let data_dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(data_dir.path().join("categories")).unwrap();
        std::fs::write(
            data_dir.path().join("categories").join("en.json"),
            r#"{"CAT_shop": "Shops", "CAT_facility": "Facilities"}"#,
        )
        .unwrap();

        let config = ServiceConfig {
            directory: DirectoryConfig {
                endpoint_directory: "https://dir.test/directory?lat={lat}&lng={lng}".into(),
                endpoint_last_updated: "https://dir.test/last_updated?lat={lat}&lng={lng}".into(),
                endpoint_disabled_nodes: "https://dir.test/disabled?lat={lat}&lng={lng}".into(),
                default_location: Location {
                    lat: 35.5,
                    lng: 139.25,
                },
            },
            conversation_config: Some(REMOTE.into()),
            data_dir: Some(data_dir.path().to_path_buf()),
            repeat: RepeatPhrases {
                repeat_matches: vec!["again".into()],
                repeat_starts: vec!["say that".into()],
                ..Default::default()
            },
            ..Default::default()
        };
        config.validate().unwrap();

        let fetcher = Arc::new(StaticFetcher::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
        ));
        let service = DirectoryContextService::with_parts(&config, fetcher.clone(), clock.clone());

        Self {
            fetcher,
            clock,
            service,
            _data_dir: data_dir,
        }
    }

    fn with_default_routes() -> Self {
        let harness = Self::new();
        harness
            .fetcher
            .respond(DIRECTORY, ScriptedResponse::json(directory_payload(1)))
            .respond(MARKER, ScriptedResponse::json(json!({"t": 1})))
            .respond(DISABLED, ScriptedResponse::json(json!(["z1"])))
            .respond(
                REMOTE,
                ScriptedResponse::json_with_validator(remote_config(), LAST_MODIFIED),
            )
            .respond(REMOTE, ScriptedResponse::NotModified);
        harness
    }

    fn advance_secs(&self, secs: i64) {
        self.clock.advance(chrono::Duration::seconds(secs));
    }
}

fn names(map: &directory_context::directory::CategoryMap, key: &str) -> Vec<String> {
    map.get(key)
        .unwrap_or_else(|| panic!("Expected key {:?} in {:?}", key, map))
        .iter()
        .cloned()
        .collect()
}

#[tokio::test]
async fn test_wheelchair_enrichment() {
    let harness = TestHarness::with_default_routes();
    let patch = harness
        .service
        .enrich("en", Some("user_wheelchair"), None)
        .await
        .expect("Expected directory context");

    // Info map: duplicate titles merged, alias cloned from its target
    assert_eq!(patch.info_map["Restroom"].joined_nodes(), "r1|r2");
    assert_eq!(patch.info_map["WC"].joined_nodes(), "r1|r2");
    assert_eq!(patch.alias_map["Restroom"], vec!["WC".to_string()]);

    assert_eq!(patch.hidden_names, vec!["Staff Room", "Stairs"]);
    assert_eq!(patch.disabled_nodes, vec!["Zoo Shop"]);

    // Visible maps keep disabled names, sorted by pron
    assert_eq!(names(&patch.maj_category_map, "Shops"), vec!["Apple Store", "Zoo Shop"]);
    assert_eq!(names(&patch.maj_category_map, "Facilities"), vec!["WC", "Restroom"]);
    assert_eq!(names(&patch.maj_category_map_available, "Shops"), vec!["Apple Store"]);
    assert_eq!(names(&patch.sub_category_map, "electronics"), vec!["Apple Store"]);
    assert_eq!(names(&patch.tags_map, "Free Wi-Fi"), vec!["Apple Store", "Zoo Shop"]);
    assert_eq!(names(&patch.tags_map_available, "Free Wi-Fi"), vec!["Apple Store"]);

    assert_eq!(patch.whole_maj_map, patch.maj_category_map_available);
    assert_eq!(patch.whole_map, patch.sub_category_map_available);
    assert_eq!(patch.whole_tags_map, patch.tags_map_available);

    let floors = patch.building_floor_map.as_ref().unwrap();
    assert_eq!(
        floors["Main"]["1F"].iter().collect::<Vec<_>>(),
        vec!["Apple Store", "Zoo Shop"]
    );
    assert!(!floors["Main"].contains_key("2F"));
    let available = patch.building_floor_map_available.as_ref().unwrap();
    assert_eq!(
        available["Main"]["1F"].iter().collect::<Vec<_>>(),
        vec!["Apple Store"]
    );

    let groups = patch.building_group_map.as_ref().unwrap();
    assert_eq!(
        groups.keys().collect::<Vec<_>>(),
        vec!["East", "West", "Everything"]
    );
    let everything = &groups["Everything"];
    assert_eq!(
        names(&everything.maj_category_map, "Shops"),
        vec!["Zoo Shop", "Apple Store"]
    );
    assert_eq!(
        names(&everything.maj_category_map_available, "Shops"),
        vec!["Apple Store"]
    );
    assert_eq!(
        names(&everything.tags_map_available, "Free Wi-Fi"),
        vec!["Apple Store"]
    );
    assert!(groups["East"].maj_category_map_available.is_empty());
}

#[tokio::test]
async fn test_general_mode_keeps_stairs() {
    let harness = TestHarness::with_default_routes();
    let patch = harness.service.enrich("en", None, None).await.unwrap();

    assert_eq!(patch.hidden_names, vec!["Staff Room"]);
    assert!(patch.maj_category_map["Facilities"].contains("Stairs"));
    let floors = patch.building_floor_map.unwrap();
    assert!(floors["Main"]["2F"].contains("Stairs"));
}

#[tokio::test]
async fn test_prior_alias_map_drives_tag_expansion() {
    let harness = TestHarness::with_default_routes();
    let prior = [("Apple Store".to_string(), vec!["iShop".to_string()])]
        .into_iter()
        .collect();
    let patch = harness
        .service
        .enrich("en", None, Some(&prior))
        .await
        .unwrap();

    assert!(patch.tags_map["Free Wi-Fi"].contains("iShop"));
    assert_eq!(patch.alias_map, prior);
}

#[tokio::test]
async fn test_polling_cadence_and_revalidation() {
    let harness = TestHarness::with_default_routes();
    let fetcher = &harness.fetcher;

    harness.service.enrich("en", None, None).await.unwrap();
    harness.service.enrich("en", None, None).await.unwrap();
    assert_eq!(fetcher.call_count(DIRECTORY), 1);
    assert_eq!(fetcher.call_count(MARKER), 0);
    assert_eq!(fetcher.call_count(REMOTE), 1);
    assert_eq!(fetcher.call_count(DISABLED), 1);

    harness.advance_secs(61);
    harness.service.enrich("en", None, None).await.unwrap();
    assert_eq!(fetcher.call_count(MARKER), 1);
    assert_eq!(fetcher.call_count(DIRECTORY), 1);
    assert_eq!(fetcher.call_count(DISABLED), 1);

    let revalidation = fetcher
        .calls()
        .into_iter()
        .filter(|call| call.url == REMOTE)
        .nth(1)
        .expect("Expected a second remote config request");
    assert_eq!(revalidation.validator.as_deref(), Some(LAST_MODIFIED));

    harness.advance_secs(600);
    let patch = harness.service.enrich("en", None, None).await.unwrap();
    assert_eq!(fetcher.call_count(DISABLED), 2);
    // Not-modified config keeps aliases alive
    assert!(patch.info_map.contains_key("WC"));
}

#[tokio::test]
async fn test_directory_update_replaces_maps() {
    let harness = TestHarness::with_default_routes();
    let mut updated = directory_payload(2);
    updated["en"]["sections"][0]["items"]
        .as_array_mut()
        .unwrap()
        .push(json!({"title": "Bakery", "nodeID": "b1", "titlePron": "bakery"}));

    harness.service.enrich("en", None, None).await.unwrap();
    harness
        .fetcher
        .replace(MARKER, ScriptedResponse::json(json!({"t": 2})))
        .replace(DIRECTORY, ScriptedResponse::json(updated));

    harness.advance_secs(61);
    let patch = harness.service.enrich("en", None, None).await.unwrap();
    assert!(patch.info_map.contains_key("Bakery"));
    assert_eq!(harness.service.directory_epoch().await, 2);
}

#[tokio::test]
async fn test_remote_failures_keep_last_good_state() {
    let harness = TestHarness::with_default_routes();
    let before = harness.service.enrich("en", None, None).await.unwrap();

    harness
        .fetcher
        .replace(MARKER, ScriptedResponse::Unreachable)
        .replace(DISABLED, ScriptedResponse::Status(503))
        .replace(REMOTE, ScriptedResponse::Status(500));

    harness.advance_secs(700);
    let after = harness.service.enrich("en", None, None).await.unwrap();
    assert_eq!(after, before);
}

#[tokio::test]
async fn test_never_loaded_directory_yields_no_context() {
    let harness = TestHarness::new();
    harness
        .fetcher
        .respond(DIRECTORY, ScriptedResponse::Unreachable);

    assert!(harness.service.enrich("en", None, None).await.is_none());
    assert_eq!(harness.service.directory_epoch().await, 0);
}

#[tokio::test]
async fn test_unknown_language_yields_no_context() {
    let harness = TestHarness::with_default_routes();
    assert!(harness.service.enrich("fr", None, None).await.is_none());
}

#[tokio::test]
async fn test_dialog_turn_round_trip() {
    let harness = TestHarness::with_default_routes();
    let patch: ContextPatch = harness
        .service
        .enrich("en", Some("user_wheelchair"), None)
        .await
        .unwrap();

    let mut request_context = Map::new();
    request_context.insert("user_mode".into(), json!("user_wheelchair"));
    patch.merge_into(&mut request_context);
    assert!(request_context.contains_key("building_group_map"));

    // The engine echoes the whole context back
    let mut response_context = request_context.clone();
    response_context.insert("dest".into(), json!("WC"));
    response_context.insert("candidates".into(), json!(["Apple Store", "Zoo Shop"]));
    let mut response = json!({
        "output": {"text": ["The @@WC## is near @@Exit##..."]},
        "context": Value::Object(response_context),
    });

    strip_context_fields(response["context"].as_object_mut().unwrap());
    assert!(response["context"].get("info_map").is_none());

    assert!(harness.service.annotate_response("en", &mut response, &patch).await);
    assert_eq!(response["output"]["text"], json!(["The WC is near Exit"]));
    assert_eq!(
        response["context"]["output_pron"],
        json!("The double-u-see is near eg-zit\n\n")
    );
    assert_eq!(response["context"]["dest_info"]["nodes"], json!("r1|r2"));
    assert_eq!(
        response["context"]["candidates_info"],
        json!([{"name": "Apple Store", "pron": "apple store", "pr_short": "Electronics", "nodes": "a1|a2"}])
    );
    assert_eq!(response["context"]["user_mode"], json!("user_wheelchair"));
}

#[tokio::test]
async fn test_resolve_response_text_uses_cached_translations() {
    let harness = TestHarness::with_default_routes();
    let patch = harness.service.enrich("en", None, None).await.unwrap();

    let resolved = harness
        .service
        .resolve_response_text("en", "Take the Exit by @@Shops##", &patch)
        .await;
    assert_eq!(resolved.display, "Take the Exit by Shops");
    assert_eq!(resolved.pron, "Take the eg-zit by Shops");
    assert!(resolved.converted);

    let plain = harness
        .service
        .resolve_response_text("en", "Take the Exit", &patch)
        .await;
    assert_eq!(plain.pron, "Take the eg-zit");
    assert!(!plain.converted);
}

#[tokio::test]
async fn test_input_filters() {
    let harness = TestHarness::with_default_routes();
    assert_eq!(
        harness.service.preprocess_text("where is the rest room").await,
        "where is the restroom"
    );
    assert!(harness.service.has_repeat_word("AGAIN"));
    assert!(harness.service.has_repeat_word("say that again please"));
    assert!(!harness.service.has_repeat_word("where is the cafe"));
}

#[tokio::test]
async fn test_request_json_without_info_map() {
    let harness = TestHarness::with_default_routes();
    let patch = harness.service.enrich("en", None, None).await.unwrap();
    let body = patch.to_request_json(false);
    assert!(!body.contains_key("info_map"));
    assert!(body.contains_key("whole_map"));
}
