fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use pacnotify_protocol::events::{DownloadEvent, EngineEvent};
    use pacnotify_protocol::messages::{
        AddDatabaseRequest, AnswerRequest, InitializeEngineRequest, PackageListResponse,
        SyncResponse,
    };
    use pacnotify_protocol::{
        Answer, Message, MessageType, PackageChange, Question, SyncResult, TransactionState,
        WorkerEvent,
    };

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Deserializes a fixture into a Rust type, re-serializes it, and compares
    /// the JSON values. Fields the fixture carries must survive; fields it
    /// omits must stay omitted.
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));
        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  fixture: {fixture}\n  rust:    {reserialized}"
        );
        parsed
    }

    // --- Envelope ---

    #[test]
    fn fixture_request_envelope() {
        let msg = roundtrip_test::<Message>("message_request.json");
        assert_eq!(msg.msg_type, MessageType::AddDatabase);
        let req: AddDatabaseRequest = msg.require_payload().unwrap();
        assert_eq!(req.name, "core");
        assert_eq!(req.servers.len(), 1);
    }

    #[test]
    fn fixture_error_envelope() {
        let msg = roundtrip_test::<Message>("message_error.json");
        let error = msg.error.unwrap();
        assert_eq!(error.code, 500);
        assert_eq!(error.message, "failed to prepare the transaction");
        assert_eq!(error.details, "bash: requires glibc>=2.40");
        assert!(msg.payload.is_none());
    }

    #[test]
    fn fixture_question_envelope() {
        let msg = roundtrip_test::<Message>("message_question.json");
        assert!(msg.msg_type.is_push());
        let question: Question = msg.require_payload().unwrap();
        assert_eq!(question.default_answer(), Answer::Confirm(false));
    }

    #[test]
    fn unknown_message_type_is_tolerated() {
        let msg: Message =
            serde_json::from_str(r#"{"id":"1","type":"reload_mirrors","payload":{}}"#).unwrap();
        assert_eq!(msg.msg_type, MessageType::Unknown);
    }

    // --- Payloads ---

    #[test]
    fn fixture_initialize_engine_request() {
        let req = roundtrip_test::<InitializeEngineRequest>("initialize_engine_request.json");
        assert_eq!(req.options.arch.as_deref(), Some("x86_64"));
        assert!(req.options.ignore_groups.is_empty());
        assert_eq!(req.options.hook_dirs.len(), 2);
    }

    #[test]
    fn fixture_sync_response() {
        let resp = roundtrip_test::<SyncResponse>("sync_response.json");
        assert_eq!(resp.state, TransactionState::SyncDone);
        let results: Vec<SyncResult> = resp.results.iter().map(|r| r.result).collect();
        assert_eq!(
            results,
            [SyncResult::Success, SyncResult::NotNeeded, SyncResult::Failure]
        );
        assert!(resp.results[0].error.is_empty());
    }

    #[test]
    fn fixture_package_list_response() {
        let resp = roundtrip_test::<PackageListResponse>("package_list_response.json");
        assert_eq!(resp.changes.len(), 3);
        assert!(resp.changes[1].is_new_install());
        assert!(resp.changes[2].is_removal());
        assert!(resp.changes[2].repo.is_none());

        let totals = PackageChange::totals(&resp.changes);
        assert_eq!(totals.download, resp.total_download);
        assert_eq!(totals.net, 100 + 2000 - 500);
    }

    #[test]
    fn fixture_answers() {
        let answers = roundtrip_test::<Vec<AnswerRequest>>("answers.json");
        assert_eq!(answers[0].answer, Answer::Confirm(true));
        assert_eq!(answers[1].answer, Answer::Provider(1));
    }

    // --- Push payloads ---

    #[test]
    fn fixture_worker_events() {
        let events = roundtrip_test::<Vec<WorkerEvent>>("worker_events.json");
        assert_eq!(events.len(), 20);
        assert!(matches!(
            &events[7],
            WorkerEvent::Download {
                event: DownloadEvent::Retry,
                ..
            }
        ));
        assert!(matches!(
            &events[16],
            WorkerEvent::Engine(EngineEvent::PacnewCreated { file, .. }) if file == "/etc/bash.bashrc"
        ));
    }

    #[test]
    fn fixture_questions() {
        let questions = roundtrip_test::<Vec<Question>>("questions.json");
        let defaults: Vec<Answer> = questions.iter().map(Question::default_answer).collect();
        assert_eq!(
            defaults,
            [
                Answer::Confirm(false),
                Answer::Confirm(false),
                Answer::Confirm(false),
                Answer::Confirm(false),
                Answer::Provider(0),
                Answer::Confirm(true),
                Answer::Confirm(false),
            ]
        );
    }
}
