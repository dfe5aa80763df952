use attrstore::core::config::Match;
use attrstore::{AttributeVector, BasicType, CollectionType, Config, ErrorKind, QueryTerm, Value};
use tempfile::TempDir;

fn populated(name: &str, config: Config, docs: &[Vec<(Value, i32)>]) -> AttributeVector {
    let attr = AttributeVector::new(name, config).unwrap();
    attr.add_docs(docs.len() as u32).unwrap();
    for (doc, values) in docs.iter().enumerate() {
        attr.set_values(doc as u32, values).unwrap();
    }
    attr.commit().unwrap();
    attr
}

fn assert_same_docs(a: &AttributeVector, b: &AttributeVector) {
    assert_eq!(a.name(), b.name());
    assert_eq!(a.config(), b.config());
    assert_eq!(a.committed_doc_id_limit(), b.committed_doc_id_limit());
    for doc in 0..a.committed_doc_id_limit() {
        assert_eq!(a.get_values(doc), b.get_values(doc), "doc {} of '{}'", doc, a.name());
    }
}

#[test]
fn attributes_survive_a_save_and_load() {
    let dir = TempDir::new().unwrap();
    let attrs = vec![
        populated(
            "year",
            Config::new(BasicType::Int16, CollectionType::Single),
            &[vec![(Value::Int(1999), 1)], vec![], vec![(Value::Int(-4), 1)]],
        ),
        populated(
            "ratings",
            Config::new(BasicType::Float, CollectionType::Array),
            &[vec![(Value::Float(0.5), 1), (Value::Float(4.25), 1)], vec![(Value::Float(1.0), 1)]],
        ),
        populated(
            "labels",
            Config::new(BasicType::String, CollectionType::WeightedSet)
                .with_match(Match::Uncased)
                .with_fast_search(true),
            &[vec![(Value::from("Rust"), 10), (Value::from("storage"), 2)], vec![], vec![(Value::from("rust"), 1)]],
        ),
        populated(
            "thumbnail",
            Config::new(BasicType::Raw, CollectionType::Single),
            &[vec![(Value::Raw(vec![0xff, 0x00, 0x7f]), 1)], vec![]],
        ),
    ];

    for attr in &attrs {
        let path = dir.path().join(format!("{}.attr", attr.name()));
        let header = attr.save_file(&path).unwrap();
        assert_eq!(header.num_docs, attr.committed_doc_id_limit());

        let loaded = AttributeVector::load_file(&path).unwrap();
        assert_same_docs(attr, &loaded);
        assert_eq!(loaded.status().commits, 1);
    }

    let labels = AttributeVector::load_file(dir.path().join("labels.attr")).unwrap();
    let guard = labels.take_guard();
    let mut ctx = labels.create_search_context(&guard, &QueryTerm::word("RUST")).unwrap();
    ctx.fetch_postings();
    assert_eq!(ctx.create_iterator().collect::<Vec<u32>>(), vec![0, 2]);
    assert_eq!(ctx.matches(0), Some(10));
}

#[test]
fn corrupt_and_missing_files_are_rejected() {
    let dir = TempDir::new().unwrap();
    let attr = populated(
        "counts",
        Config::new(BasicType::Int64, CollectionType::Array),
        &[vec![(Value::Int(1), 1), (Value::Int(2), 1)], vec![(Value::Int(3), 1)]],
    );
    let path = dir.path().join("counts.attr");
    attr.save_file(&path).unwrap();

    let mut bytes = std::fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x55;
    let corrupt = dir.path().join("corrupt.attr");
    std::fs::write(&corrupt, &bytes).unwrap();
    let err = AttributeVector::load_file(&corrupt).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::ChecksumMismatch);

    let err = AttributeVector::load_file(dir.path().join("missing.attr")).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Io);
}
