//! Dataset files on disk: load, validate, write responses back out.

use metaeval_data::{load_dataset, write_responses, DatasetError, ResponseFile};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn write_json(dir: &tempfile::TempDir, name: &str, value: &Value) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    path
}

fn overall_dataset(instances: u64) -> Value {
    json!({
        "instances": (1..=instances)
            .map(|id| json!({
                "id": id,
                "premise": format!("premise {id}"),
                "prompt": format!("Solve problem {id} step by step."),
                "ratings": {"overall": 3}
            }))
            .collect::<Vec<_>>(),
        "annotations": [
            {"name": "overall", "type": "likert", "range": [1, 5]},
            {"name": "coherence", "type": "binary"},
            {"name": "missing_step", "type": "binary"},
            {"name": "contradiction", "type": "binary"}
        ]
    })
}

#[test]
fn test_counts_and_first_id() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_json(&dir, "overall.json", &overall_dataset(195));

    let ds = load_dataset(&path).unwrap();
    assert_eq!(ds.instances.len(), 195);
    assert_eq!(ds.annotations.len(), 4);
    assert_eq!(ds.first_id(), Some(1));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        load_dataset(dir.path().join("absent.json")),
        Err(DatasetError::Io(_))
    ));
}

#[test]
fn test_malformed_json_is_json_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{\"instances\": [").unwrap();
    assert!(matches!(load_dataset(&path), Err(DatasetError::Json(_))));
}

#[test]
fn test_string_id_is_schema_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_json(
        &dir,
        "bad.json",
        &json!({"instances": [{"id": "1"}], "annotations": []}),
    );
    let err = load_dataset(&path).unwrap_err();
    assert!(err.to_string().contains("$.instances[0].id"));
}

#[test]
fn test_responses_written_in_instance_order() {
    let dir = tempfile::tempdir().unwrap();
    let ds = load_dataset(write_json(&dir, "ds.json", &overall_dataset(3))).unwrap();
    let prompts = ds.prompts("prompt").unwrap();

    let file = ResponseFile::new(
        "gemini-1.5-pro",
        Some("Think step by step.".to_string()),
        256,
        &ds.ids(),
        prompts,
        vec!["one".to_string(), String::new(), "three".to_string()],
    )
    .unwrap();

    let out = dir.path().join("runs").join("responses.json");
    write_responses(&out, &file).unwrap();

    let written: Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(written["model"], "gemini-1.5-pro");
    assert_eq!(written["responses"][1]["id"], 2);
    assert_eq!(written["responses"][1]["response"], "");
    assert_eq!(written["responses"][2]["prompt"], "Solve problem 3 step by step.");

    let reread: ResponseFile = serde_json::from_value(written).unwrap();
    assert_eq!(reread, file);
}
