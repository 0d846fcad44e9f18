use std::fs;
use std::path::Path;

use ldainfer_core::types::{DICT_FILE, MODEL_FILE};
use ldainfer_core::{parse_documents, DocumentStore, InferError, InferOptions, InferenceSession};

const DICT: &str = "0\tcat\t40\n1\tdog\t35\n2\tcar\t50\n3\tbus\t20\n4\tthe\t900\n";
// cat/dog live in topic 0, car/bus in topic 1, "the" is spread out
const MODEL: &str = "0 0:10000 1:1\n1 0:8000 1:2\n2 1:12000 0:1\n3 1:6000\n4 0:500 1:500\n";

fn write_model(dir: &Path) {
    fs::write(dir.join(DICT_FILE), DICT).unwrap();
    fs::write(dir.join(MODEL_FILE), MODEL).unwrap();
}

fn opts() -> InferOptions {
    InferOptions {
        num_vocabs: 5,
        num_topics: 2,
        num_iterations: 30,
        num_local_workers: 2,
        alpha: 0.1,
        ..Default::default()
    }
}

fn count(hist: &[(i32, i32)], topic: i32) -> i32 {
    hist.iter().find(|&&(t, _)| t == topic).map(|&(_, c)| c).unwrap_or(0)
}

#[test]
fn documents_land_in_their_topics() {
    let dir = tempfile::tempdir().unwrap();
    write_model(dir.path());
    let mut session = InferenceSession::init(dir.path(), opts()).unwrap();

    let pets = session.predict(&["cat", "dog", "cat", "dog", "unknown"]).unwrap();
    assert_eq!(pets, vec![(0, 4)]);

    let traffic = session.predict(&["bus", "car", "car"]).unwrap();
    assert_eq!(traffic, vec![(1, 3)]);
    session.clear();
}

#[test]
fn batch_keeps_document_order_across_blocks_and_workers() {
    let dir = tempfile::tempdir().unwrap();
    write_model(dir.path());
    let o = InferOptions { num_blocks: 3, num_local_workers: 3, slice_token_budget: 2, ..opts() };
    let mut session = InferenceSession::init(dir.path(), o).unwrap();

    let docs = parse_documents("cat dog the\ncar bus\n\nthe car car car\ndog\n");
    let out = session.predict_batch(&docs).unwrap();
    assert_eq!(out.len(), 5);

    let sizes: Vec<i32> = out.iter().map(|d| d.iter().map(|&(_, c)| c).sum()).collect();
    assert_eq!(sizes, vec![3, 2, 0, 4, 1]);
    assert!(count(&out[0], 0) >= 2);
    assert_eq!(count(&out[1], 1), 2);
    assert!(count(&out[3], 1) >= 3);
    assert_eq!(out[4], vec![(0, 1)]);
}

#[test]
fn long_documents_are_truncated() {
    let dir = tempfile::tempdir().unwrap();
    write_model(dir.path());
    let o = InferOptions { max_doc_length: 3, ..opts() };
    let mut session = InferenceSession::init(dir.path(), o).unwrap();
    let out = session.predict(&["car", "car", "nope", "car", "car", "car"]).unwrap();
    assert_eq!(out.iter().map(|&(_, c)| c).sum::<i32>(), 3);
}

#[test]
fn encoded_corpus_round_trips_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    write_model(dir.path());
    let o = InferOptions { num_blocks: 2, ..opts() };
    let mut session = InferenceSession::init(dir.path(), o).unwrap();

    let docs = parse_documents("dog cat dog\nthe\nbus car\n");
    let store = session.encode_batch(&docs).unwrap();
    let dump = dir.path().join("dump");
    store.write_dir(&dump).unwrap();

    let back = DocumentStore::read_dir(&dump, 2).unwrap();
    assert_eq!(back.num_docs(0), 2);
    assert_eq!(back.num_docs(1), 1);
    assert_eq!(back.vocabs(), store.vocabs());
    assert_eq!(back.vocab(0).words(), &[0, 1, 4]);
    assert_eq!(back.vocab(0).local_tf(), &[1, 2, 1]);
    assert_eq!(back.vocab(0).global_tf(), &[40, 35, 900]);

    let bytes = fs::read(dump.join("block.1")).unwrap();
    // one doc: count, two offsets, then [cursor, 2, 0, 3, 0]
    assert_eq!(bytes.len(), 8 + 16 + 5 * 4);
}

#[test]
fn duplicate_dictionary_entries_fail_the_load() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(DICT_FILE), "0\tcat\t1\n1\tcat\t2\n").unwrap();
    fs::write(dir.path().join(MODEL_FILE), MODEL).unwrap();
    let err = InferenceSession::init(dir.path(), opts()).err().unwrap();
    assert!(matches!(err, InferError::DuplicateWord { .. }));
}
