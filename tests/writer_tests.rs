mod test_utils;

use crate::test_utils::{ChunkedReader, Event};
use json_conduit::adapt::TypeDescriptor;
use json_conduit::codec::Charset;
use json_conduit::config::PipelineConfig;
use json_conduit::detector::StreamMode;
use json_conduit::error::StreamError;
use json_conduit::pipeline::spawn_decode_from_reader;
use json_conduit::writer::{drain_stream_to_sink, Framing, StreamWriter};
use tokio::io::{AsyncReadExt, DuplexStream};

fn pipe(framing: Framing) -> (StreamWriter<DuplexStream>, DuplexStream) {
    let (a, b) = tokio::io::duplex(64 * 1024);
    (StreamWriter::new(a, framing, Charset::Utf8), b)
}

async fn read_all(reader: &mut DuplexStream) -> String {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await.unwrap();
    String::from_utf8(buf).unwrap()
}

#[tokio::test]
async fn array_framing_brackets_and_commas() {
    let (mut writer, mut reader) = pipe(Framing::Array);
    writer.write_item(&Event::new(1, "a")).await.unwrap();
    writer.write_item(&Event::new(2, "b")).await.unwrap();
    writer.write_item(&Event::new(3, "c")).await.unwrap();
    writer.close().await.unwrap();
    drop(writer);

    assert_eq!(
        read_all(&mut reader).await,
        r#"[{"id":1,"name":"a"},{"id":2,"name":"b"},{"id":3,"name":"c"}]"#
    );
}

#[tokio::test]
async fn empty_array_still_emits_brackets() {
    let (mut writer, mut reader) = pipe(Framing::Array);
    writer.close().await.unwrap();
    drop(writer);

    assert_eq!(read_all(&mut reader).await, "[]");
}

#[tokio::test]
async fn jsonl_framing_one_line_per_item() {
    let (mut writer, mut reader) = pipe(Framing::Lines);
    writer.write_item(&Event::new(1, "a")).await.unwrap();
    writer.write_item(&Event::new(2, "b")).await.unwrap();
    writer.close().await.unwrap();
    drop(writer);

    assert_eq!(
        read_all(&mut reader).await,
        "{\"id\":1,\"name\":\"a\"}\n{\"id\":2,\"name\":\"b\"}\n"
    );
}

#[tokio::test]
async fn document_framing_is_single_shot() {
    let (mut writer, mut reader) = pipe(Framing::Document);
    writer.write_item(&Event::new(1, "only")).await.unwrap();
    let err = writer.write_item(&Event::new(2, "extra")).await.unwrap_err();
    assert!(matches!(err, StreamError::MalformedJson { .. }));
    writer.close().await.unwrap();
    drop(writer);

    assert_eq!(read_all(&mut reader).await, r#"{"id":1,"name":"only"}"#);
}

#[tokio::test]
async fn finish_is_idempotent() {
    let (mut writer, mut reader) = pipe(Framing::Array);
    writer.write_item(&Event::new(1, "a")).await.unwrap();
    writer.finish().await.unwrap();
    writer.finish().await.unwrap();
    writer.close().await.unwrap();
    drop(writer);

    let text = read_all(&mut reader).await;
    assert_eq!(text.matches(']').count(), 1);
    assert_eq!(text, r#"[{"id":1,"name":"a"}]"#);
}

#[tokio::test]
async fn drain_stream_pumps_a_producer() {
    let items = futures_util::stream::iter(vec![Event::new(1, "a"), Event::new(2, "b")]);
    let (mut writer, mut reader) = pipe(Framing::Array);
    drain_stream_to_sink(items, &mut writer).await.unwrap();
    writer.close().await.unwrap();
    drop(writer);

    assert_eq!(
        read_all(&mut reader).await,
        r#"[{"id":1,"name":"a"},{"id":2,"name":"b"}]"#
    );
}

/// Encoding three items and decoding them back must not depend on how
/// the byte stream is chunked on the way in.
#[tokio::test]
async fn jsonl_round_trip_is_chunk_size_independent() {
    let items = vec![
        Event::new(1, "one"),
        Event::new(2, "two"),
        Event::new(3, "three"),
    ];

    let (mut writer, mut reader) = pipe(Framing::Lines);
    for item in &items {
        writer.write_item(item).await.unwrap();
    }
    writer.close().await.unwrap();
    drop(writer);
    let encoded = read_all(&mut reader).await;

    for chunk_size in [1, 2, 3, 7, 64, 4096] {
        let (chunked, _reads) = ChunkedReader::from_str(&encoded, chunk_size);
        let rx = spawn_decode_from_reader::<_, Event>(
            chunked,
            StreamMode::JsonLines,
            Charset::Utf8,
            TypeDescriptor::pull_sequence::<Event>(),
            &PipelineConfig::default(),
        );
        let decoded = rx.collect().await.unwrap();
        assert_eq!(decoded, items, "chunk size {chunk_size}");
    }
}

/// materialize(parse(stringify(x))) == x over a representative graph.
#[tokio::test]
async fn array_round_trip_preserves_object_graphs() {
    let original = vec![
        serde_json::json!({"id": 7, "tags": ["a", "b"], "nested": {"ok": true, "n": 2.5}}),
        serde_json::json!([1, [2, [3]]]),
        serde_json::json!("plain"),
        serde_json::json!(false),
    ];

    let (mut writer, mut reader) = pipe(Framing::Array);
    for value in &original {
        writer.write_item(value).await.unwrap();
    }
    writer.close().await.unwrap();
    drop(writer);
    let encoded = read_all(&mut reader).await;

    let (chunked, _reads) = ChunkedReader::from_str(&encoded, 5);
    let rx = spawn_decode_from_reader::<_, serde_json::Value>(
        chunked,
        StreamMode::ArrayStream,
        Charset::Utf8,
        TypeDescriptor::pull_sequence::<serde_json::Value>(),
        &PipelineConfig::default(),
    );
    let decoded = rx.collect().await.unwrap();
    assert_eq!(decoded, original);
}
