use chunkkit::prelude::*;
use pretty_assertions::assert_eq;
use tempfile::tempdir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Root with one nested chunk holding three children.
fn nested_tree() -> ChunkContainer {
    let mut inner = ChunkContainer::new();
    inner.push(Chunk::new_data(fourcc(b"TEX0"), vec![1; 7]).with_description("alpha"));
    inner.push(Chunk::new_data(fourcc(b"TEX1"), vec![2; 32]));
    inner.push(
        Chunk::new_data(fourcc(b"TEX2"), vec![3; 3])
            .with_description("gamma123")
            .with_version(2),
    );

    let mut root = ChunkContainer::new();
    root.push(Chunk::new_data(fourcc(b"HEAD"), b"header".to_vec()));
    root.push(Chunk::new_container(fourcc(b"LIST"), inner).with_description("textures"));
    root
}

#[test]
fn test_nested_descriptions_round_trip() {
    init_tracing();
    let original = nested_tree();
    let bytes = serialize_chunks(&original).unwrap();
    let parsed = parse_chunk_bytes_with(&bytes, &ReadOptions::strict()).unwrap();

    let list = parsed.find(fourcc(b"LIST")).unwrap();
    let descriptions: Vec<Option<&str>> = list
        .nested()
        .unwrap()
        .children
        .iter()
        .map(Chunk::description)
        .collect();
    assert_eq!(descriptions, vec![Some("alpha"), None, Some("gamma123")]);
    assert_eq!(list.description(), Some("textures"));

    // Byte-identical once re-encoded
    assert_eq!(serialize_chunks(&parsed).unwrap(), bytes);
}

#[test]
fn test_walk_order() {
    let names: Vec<(usize, String)> = nested_tree()
        .walk()
        .into_iter()
        .map(|(depth, chunk)| (depth, tag_name(chunk.context)))
        .collect();
    assert_eq!(
        names,
        vec![
            (0, "HEAD".to_string()),
            (0, "LIST".to_string()),
            (1, "TEX0".to_string()),
            (1, "TEX1".to_string()),
            (1, "TEX2".to_string()),
        ]
    );
}

#[test]
fn test_self_referencing_offset_is_rejected() {
    init_tracing();
    let bytes = serialize_chunks(&nested_tree()).unwrap();

    // Point the first child entry back at the root header
    let mut patched = bytes.clone();
    patched[20..24].copy_from_slice(&0u32.to_le_bytes());
    assert!(matches!(
        parse_chunk_bytes(&patched),
        Err(Error::CyclicChunk { .. })
    ));
}

#[test]
fn test_depth_limit() {
    let mut container = ChunkContainer::new();
    container.push(Chunk::new_data(fourcc(b"LEAF"), vec![0; 4]));
    for _ in 0..5 {
        let mut parent = ChunkContainer::new();
        parent.push(Chunk::new_container(fourcc(b"NODE"), container));
        container = parent;
    }
    let bytes = serialize_chunks(&container).unwrap();

    assert!(parse_chunk_bytes(&bytes).is_ok());
    assert!(matches!(
        parse_chunk_bytes_with(&bytes, &ReadOptions::new().with_max_chunk_depth(2)),
        Err(Error::CyclicChunk { .. })
    ));
}

#[test]
fn test_chunk_file_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tree.bin");

    let original = nested_tree();
    write_chunk_file(&original, &path).unwrap();
    let parsed = read_chunk_file(&path).unwrap();
    assert_eq!(
        serialize_chunks(&parsed).unwrap(),
        serialize_chunks(&original).unwrap()
    );

    assert!(matches!(
        read_chunk_file(dir.path().join("missing.bin")),
        Err(Error::FileAccess { .. })
    ));
}

#[test]
fn test_custom_alignment_is_detected() {
    let options = WriteOptions::new().with_chunk_alignment(256);
    let bytes = serialize_chunks_with(&nested_tree(), &options).unwrap();
    assert_eq!(bytes.len() % 256, 0);

    let parsed = parse_chunk_bytes(&bytes).unwrap();
    assert_eq!(parsed.alignment, Some(256));
    assert_eq!(serialize_chunks_with(&parsed, &options).unwrap(), bytes);
}
