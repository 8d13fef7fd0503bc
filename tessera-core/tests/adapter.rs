//! Save and fetch drivers against a scripted adapter.

use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use tessera_core::{
    Adapter, AdapterError, Attributes, FetchOutcome, FieldErrors, Identity, RecordPayload,
    RelationshipMeta, SaveOutcome, SaveRequest, SaveState, SchemaRegistry, Store, StoreError,
    TypeSchema,
};

#[derive(Default)]
struct Scripted {
    records: HashMap<Identity, RecordPayload>,
    saves: Mutex<VecDeque<Result<Option<Attributes>, AdapterError>>>,
    requests: Mutex<Vec<SaveRequest>>,
}

impl Scripted {
    fn respond(self, response: Result<Option<Attributes>, AdapterError>) -> Self {
        self.saves.lock().unwrap().push_back(response);
        self
    }

    fn with_record(mut self, identity: Identity, payload: RecordPayload) -> Self {
        self.records.insert(identity, payload);
        self
    }

    fn requests(&self) -> Vec<SaveRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Adapter for Scripted {
    async fn find_record(&self, identity: &Identity) -> Result<RecordPayload, AdapterError> {
        self.records
            .get(identity)
            .cloned()
            .ok_or_else(|| AdapterError::Transport(format!("{identity} not found")))
    }

    async fn save_record(&self, request: &SaveRequest) -> Result<Option<Attributes>, AdapterError> {
        self.requests.lock().unwrap().push(request.clone());
        self.saves
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(None))
    }
}

fn store() -> Store {
    Store::new(
        SchemaRegistry::builder()
            .register(
                TypeSchema::new("user")
                    .attribute("name")
                    .relationship("posts", RelationshipMeta::has_many("post").inverse("author")),
            )
            .register(
                TypeSchema::new("post")
                    .attribute("title")
                    .relationship("author", RelationshipMeta::belongs_to("user").inverse("posts")),
            )
            .build()
            .unwrap(),
    )
}

fn post(id: &str) -> Identity {
    Identity::new("post", id)
}

#[tokio::test]
async fn save_commits_and_sends_in_flight_snapshot() {
    let mut store = store();
    store.set(&post("1"), "title", "hello").unwrap();
    let adapter = Scripted::default();

    let outcome = store.save_record(&post("1"), &adapter).await.unwrap();

    assert_eq!(outcome, SaveOutcome::Committed);
    let requests = adapter.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].attributes.get("title"), Some(&json!("hello")));
    assert!(!requests[0].is_new);

    let reference = store.reference(&post("1")).unwrap();
    assert_eq!(reference.canonical().get("title"), Some(&json!("hello")));
    assert_eq!(reference.state(), SaveState::Clean);
}

#[tokio::test]
async fn save_of_created_record_is_flagged_new() {
    let mut store = store();
    store.create_record(&post("draft"), Attributes::new()).unwrap();
    let adapter = Scripted::default();

    store.save_record(&post("draft"), &adapter).await.unwrap();

    assert!(adapter.requests()[0].is_new);
    assert!(!store.reference(&post("draft")).unwrap().is_new());
}

#[tokio::test]
async fn invalid_save_keeps_edits_and_records_errors() {
    let mut store = store();
    store.set(&post("1"), "title", "").unwrap();
    let errors = FieldErrors::new().with("title", ["can't be blank"]);
    let adapter = Scripted::default().respond(Err(AdapterError::Invalid(errors.clone())));

    let outcome = store.save_record(&post("1"), &adapter).await.unwrap();

    assert_eq!(outcome, SaveOutcome::Invalid(errors));
    let reference = store.reference(&post("1")).unwrap();
    assert_eq!(reference.state(), SaveState::Invalid);
    assert_eq!(reference.dirty().get("title"), Some(&json!("")));
    assert!(reference.errors().contains("title"));
}

#[tokio::test]
async fn transport_failure_is_an_outcome_and_retry_succeeds() {
    let mut store = store();
    store.set(&post("1"), "title", "hello").unwrap();
    let adapter = Scripted::default().respond(Err(AdapterError::Transport("offline".to_string())));

    let outcome = store.save_record(&post("1"), &adapter).await.unwrap();
    assert_eq!(outcome, SaveOutcome::Errored("offline".to_string()));
    assert!(store.reference(&post("1")).unwrap().is_error());

    let outcome = store.save_record(&post("1"), &adapter).await.unwrap();
    assert_eq!(outcome, SaveOutcome::Committed);
    let reference = store.reference(&post("1")).unwrap();
    assert!(!reference.is_error());
    assert_eq!(reference.canonical().get("title"), Some(&json!("hello")));
}

#[tokio::test]
async fn echoed_data_is_merged() {
    let mut store = store();
    store.set(&post("1"), "title", "hello").unwrap();
    let echo: Attributes = [("title".to_string(), json!("Hello"))].into_iter().collect();
    let adapter = Scripted::default().respond(Ok(Some(echo)));

    store.save_record(&post("1"), &adapter).await.unwrap();

    assert_eq!(store.attribute(&post("1"), "title"), Some(&json!("Hello")));
}

#[tokio::test]
async fn saving_unknown_record_is_a_contract_violation() {
    let mut store = store();
    let err = store.save_record(&post("1"), &Scripted::default()).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn fetch_pushes_payload() {
    let mut store = store();
    let adapter = Scripted::default().with_record(
        post("1"),
        RecordPayload::new()
            .attribute("title", "fetched")
            .belongs_to("author", Some(Identity::new("user", "u"))),
    );

    let outcome = store.fetch_record(&post("1"), &adapter).await.unwrap();

    assert_eq!(outcome, FetchOutcome::Loaded);
    assert_eq!(store.attribute(&post("1"), "title"), Some(&json!("fetched")));
    assert_eq!(
        store.has_many(&Identity::new("user", "u"), "posts").unwrap(),
        [&post("1")]
    );
}

#[tokio::test]
async fn failed_fetch_marks_record_errored() {
    let mut store = store();

    let outcome = store.fetch_record(&post("404"), &Scripted::default()).await.unwrap();

    assert!(matches!(outcome, FetchOutcome::Errored(_)));
    assert!(store.reference(&post("404")).unwrap().is_error());
}

#[tokio::test]
async fn fetch_many_reports_per_record_outcome() {
    let mut store = store();
    let adapter = Scripted::default()
        .with_record(post("1"), RecordPayload::new().attribute("title", "one"));

    let outcomes = store
        .fetch_records(&[post("1"), post("2")], &adapter)
        .await
        .unwrap();

    assert_eq!(outcomes[0], FetchOutcome::Loaded);
    assert!(matches!(outcomes[1], FetchOutcome::Errored(_)));
    assert_eq!(store.attribute(&post("1"), "title"), Some(&json!("one")));
}
