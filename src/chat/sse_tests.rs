use bytes::Bytes;
use futures::stream::StreamExt;

use super::create_sse_stream;
use crate::chat::StreamChunk;

fn text_parser(payload: &str) -> Vec<StreamChunk> {
    if payload == "[END]" {
        return vec![StreamChunk::Done];
    }
    match serde_json::from_str::<serde_json::Value>(payload) {
        Ok(value) => value
            .get("text")
            .and_then(|t| t.as_str())
            .map(|t| vec![StreamChunk::Text(t.to_string())])
            .unwrap_or_default(),
        Err(_) => Vec::new(),
    }
}

async fn collect(chunks: Vec<Result<Bytes, reqwest::Error>>) -> Vec<StreamChunk> {
    let mut stream = create_sse_stream(create_mock_response(chunks), text_parser);
    let mut results = Vec::new();
    while let Some(item) = stream.next().await {
        results.push(item.unwrap());
    }
    results
}

#[tokio::test]
async fn whole_lines_decode_in_order() {
    let data = b"data: {\"text\":\"one\"}\ndata: {\"text\":\"two\"}\ndata: [END]\n";
    let results = collect(vec![Ok(Bytes::from_static(data))]).await;

    assert_eq!(
        results,
        vec![
            StreamChunk::Text("one".into()),
            StreamChunk::Text("two".into()),
            StreamChunk::Done,
        ]
    );
}

#[tokio::test]
async fn decoding_is_insensitive_to_read_boundaries() {
    let data = b"data: {\"text\":\"one\"}\ndata: {\"text\":\"two\"}\ndata: [END]\n";

    // Split the transport at every possible byte position; the decoded
    // sequence must be identical to the whole-line case.
    let expected = collect(vec![Ok(Bytes::copy_from_slice(data))]).await;
    for split in 1..data.len() {
        let chunks = vec![
            Ok(Bytes::copy_from_slice(&data[..split])),
            Ok(Bytes::copy_from_slice(&data[split..])),
        ];
        assert_eq!(collect(chunks).await, expected, "split at {split}");
    }
}

#[tokio::test]
async fn handles_multibyte_utf8_split_across_reads() {
    let event = "data: {\"text\":\"star \u{2728}\"}\ndata: [END]\n";
    let data = event.as_bytes();
    let emoji_start = event.find('\u{2728}').unwrap();
    let split_in_emoji = emoji_start + 1;

    let results = collect(vec![
        Ok(Bytes::copy_from_slice(&data[..split_in_emoji])),
        Ok(Bytes::copy_from_slice(&data[split_in_emoji..])),
    ])
    .await;

    assert_eq!(
        results,
        vec![
            StreamChunk::Text("star \u{2728}".into()),
            StreamChunk::Done,
        ]
    );
}

#[tokio::test]
async fn malformed_frames_are_silently_discarded() {
    let data = b"data: {not json\ndata: {\"text\":\"kept\"}\ndata: [END]\n";
    let results = collect(vec![Ok(Bytes::from_static(data))]).await;

    assert_eq!(
        results,
        vec![StreamChunk::Text("kept".into()), StreamChunk::Done]
    );
}

#[tokio::test]
async fn non_data_lines_are_ignored() {
    let data = b"event: message_start\n: heartbeat\n\ndata: {\"text\":\"hi\"}\ndata: [END]\n";
    let results = collect(vec![Ok(Bytes::from_static(data))]).await;

    assert_eq!(
        results,
        vec![StreamChunk::Text("hi".into()), StreamChunk::Done]
    );
}

#[tokio::test]
async fn done_is_synthesized_when_transport_ends_without_terminal() {
    let data = b"data: {\"text\":\"partial\"}\n";
    let results = collect(vec![Ok(Bytes::from_static(data))]).await;

    assert_eq!(
        results,
        vec![StreamChunk::Text("partial".into()), StreamChunk::Done]
    );
}

#[tokio::test]
async fn done_terminates_exactly_once() {
    // Terminal frame followed by trailing data and transport end: no
    // chunks after the first Done, and no second Done at flush.
    let data = b"data: [END]\ndata: {\"text\":\"late\"}\ndata: [END]\n";
    let results = collect(vec![Ok(Bytes::from_static(data))]).await;

    assert_eq!(results, vec![StreamChunk::Done]);
}

#[tokio::test]
async fn dropping_the_stream_early_is_clean() {
    let data = b"data: {\"text\":\"one\"}\ndata: {\"text\":\"two\"}\ndata: [END]\n";
    let mut stream = create_sse_stream(
        create_mock_response(vec![Ok(Bytes::from_static(data))]),
        text_parser,
    );

    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first, StreamChunk::Text("one".into()));
    drop(stream);
}

fn create_mock_response(chunks: Vec<Result<Bytes, reqwest::Error>>) -> reqwest::Response {
    use http_body_util::StreamBody;
    use reqwest::Body;

    let frame_stream = futures::stream::iter(
        chunks
            .into_iter()
            .map(|chunk| chunk.map(hyper::body::Frame::data)),
    );

    let body = StreamBody::new(frame_stream);
    let body = Body::wrap(body);

    let http_response = http::Response::builder().status(200).body(body).unwrap();

    http_response.into()
}
