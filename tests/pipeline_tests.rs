mod test_utils;

use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::test_utils::{ChunkedReader, Event};
use json_conduit::adapt::{decode_item, TypeDescriptor};
use json_conduit::codec::Charset;
use json_conduit::config::PipelineConfig;
use json_conduit::detector::StreamMode;
use json_conduit::error::StreamError;
use json_conduit::pipeline::{spawn_decode_from_reader, DecodePipeline};
use serde::Deserialize;

#[tokio::test]
async fn typed_items_arrive_in_order() {
    let body = r#"[{"id":1,"name":"one"},{"id":2,"name":"two"},{"id":3,"name":"three"}]"#;
    let (reader, _reads) = ChunkedReader::from_str(body, 8);
    let rx = spawn_decode_from_reader::<_, Event>(
        reader,
        StreamMode::ArrayStream,
        Charset::Utf8,
        TypeDescriptor::pull_sequence::<Event>(),
        &PipelineConfig::default(),
    );
    let items = rx.collect().await.unwrap();
    assert_eq!(
        items,
        vec![
            Event::new(1, "one"),
            Event::new(2, "two"),
            Event::new(3, "three"),
        ]
    );
}

#[derive(Debug, PartialEq, Deserialize)]
struct Doc {
    a: String,
    b: i64,
}

#[test]
fn document_pipeline_decodes_a_struct() {
    let mut pipeline = DecodePipeline::new(StreamMode::Document, Charset::Utf8);
    let mut values = pipeline.feed(br#"{"a":"fir"#).unwrap();
    values.extend(pipeline.feed(br#"st","b":1}"#).unwrap());
    values.extend(pipeline.finish().unwrap());
    assert_eq!(values.len(), 1);

    let doc: Doc = decode_item(
        values.remove(0),
        &TypeDescriptor::document::<Doc>(),
    )
    .unwrap();
    assert_eq!(doc, Doc { a: "first".to_string(), b: 1 });
}

#[tokio::test]
async fn null_streamed_element_is_a_hard_error() {
    let (reader, _reads) = ChunkedReader::from_str("[1,null,2]", 3);
    let mut rx = spawn_decode_from_reader::<_, i64>(
        reader,
        StreamMode::ArrayStream,
        Charset::Utf8,
        TypeDescriptor::push_queue::<i64>(),
        &PipelineConfig::default(),
    );
    assert_eq!(rx.pull().await.unwrap(), Some(1));
    let err = rx.pull().await.unwrap_err();
    assert!(matches!(err, StreamError::NullStreamItem));
}

#[tokio::test]
async fn nullable_descriptor_admits_null_elements() {
    let (reader, _reads) = ChunkedReader::from_str("[1,null,2]", 3);
    let rx = spawn_decode_from_reader::<_, Option<i64>>(
        reader,
        StreamMode::ArrayStream,
        Charset::Utf8,
        TypeDescriptor::push_queue::<Option<i64>>().nullable(),
        &PipelineConfig::default(),
    );
    let items = rx.collect().await.unwrap();
    assert_eq!(items, vec![Some(1), None, Some(2)]);
}

#[tokio::test]
async fn malformed_element_surfaces_after_good_ones() {
    let (reader, _reads) = ChunkedReader::from_str("[1][", 3);
    let mut rx = spawn_decode_from_reader::<_, i64>(
        reader,
        StreamMode::ArrayStream,
        Charset::Utf8,
        TypeDescriptor::pull_sequence::<i64>(),
        &PipelineConfig::default(),
    );
    assert_eq!(rx.pull().await.unwrap(), Some(1));
    let err = rx.pull().await.unwrap_err();
    assert!(matches!(err, StreamError::MalformedJson { .. }));
}

#[tokio::test]
async fn truncated_body_surfaces_as_truncation() {
    let (reader, _reads) = ChunkedReader::from_str(r#"[{"id":1,"name":"#, 4);
    let mut rx = spawn_decode_from_reader::<_, Event>(
        reader,
        StreamMode::ArrayStream,
        Charset::Utf8,
        TypeDescriptor::pull_sequence::<Event>(),
        &PipelineConfig::default(),
    );
    let err = rx.pull().await.unwrap_err();
    assert!(matches!(err, StreamError::TruncatedJson(_)));
}

#[tokio::test]
async fn split_multibyte_sequences_decode_through_the_pipeline() {
    let body = r#"["héllo","wörld"]"#;
    // One byte per read: every multi-byte sequence is split.
    let (reader, _reads) = ChunkedReader::from_str(body, 1);
    let rx = spawn_decode_from_reader::<_, String>(
        reader,
        StreamMode::ArrayStream,
        Charset::Utf8,
        TypeDescriptor::pull_sequence::<String>(),
        &PipelineConfig::default(),
    );
    let items = rx.collect().await.unwrap();
    assert_eq!(items, vec!["héllo".to_string(), "wörld".to_string()]);
}

/// An early-exiting consumer must stop the transport read loop; the
/// remaining chunks stay unread.
#[tokio::test]
async fn early_cancel_stops_the_read_loop() {
    let mut body = String::from("[");
    for i in 0..200 {
        if i > 0 {
            body.push(',');
        }
        body.push_str(&format!(r#"{{"id":{i},"name":"item-{i}"}}"#));
    }
    body.push(']');

    let (reader, reads) = ChunkedReader::from_str(&body, 16);
    let total_chunks = body.len() / 16 + 1;

    let config = PipelineConfig {
        queue_capacity: 1,
        ..PipelineConfig::default()
    };
    let mut rx = spawn_decode_from_reader::<_, Event>(
        reader,
        StreamMode::ArrayStream,
        Charset::Utf8,
        TypeDescriptor::pull_sequence::<Event>(),
        &config,
    );

    assert_eq!(rx.pull().await.unwrap(), Some(Event::new(0, "item-0")));
    rx.cancel();

    tokio::time::sleep(Duration::from_millis(100)).await;
    let consumed = reads.load(Ordering::SeqCst);
    assert!(
        consumed < total_chunks / 2,
        "read loop kept draining after cancel: {consumed} of {total_chunks} chunks"
    );

    // And it stays stopped.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(reads.load(Ordering::SeqCst), consumed);
}
