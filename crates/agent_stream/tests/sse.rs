use agent_stream::{SseDecoder, StreamEvent, TextChannel};

#[test]
fn framing_parses_deltas_and_stops_at_sentinel() {
    let payload = concat!(
        "data: {\"type\":\"text-delta\",\"id\":\"b1\",\"delta\":\"hel\"}\n\n",
        "data: [DONE]\n\n",
        "data: {\"type\":\"text-delta\",\"id\":\"b1\",\"delta\":\"lo\"}\n\n"
    );

    let events = SseDecoder::decode_all(payload);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], StreamEvent::TextDelta { .. }));
}

#[test]
fn sentinel_terminates_decoding_for_later_chunks() {
    let mut decoder = SseDecoder::default();
    let events = decoder.feed(b"data: [DONE]\n\n");
    assert!(events.is_empty());
    assert!(decoder.is_done());

    let after = decoder.feed(b"data: {\"type\":\"finish\"}\n\n");
    assert!(after.is_empty());
    assert!(decoder.finish().is_empty());
}

#[test]
fn payload_split_at_arbitrary_byte_offset_decodes_identically() {
    let payload = b"data: {\"type\":\"tool-input-available\",\"toolCallId\":\"t1\",\"toolName\":\"bash\",\"input\":{\"command\":\"pwd\"}}\n\n";

    let whole = {
        let mut decoder = SseDecoder::default();
        decoder.feed(payload)
    };

    for offset in 1..payload.len() - 1 {
        let mut decoder = SseDecoder::default();
        let mut events = decoder.feed(&payload[..offset]);
        events.extend(decoder.feed(&payload[offset..]));
        assert_eq!(events, whole, "split at byte {offset} should not change decoding");
    }
}

#[test]
fn carriage_returns_are_normalized_across_chunk_boundaries() {
    let mut decoder = SseDecoder::default();
    let mut events = decoder.feed(b"data: {\"type\":\"finish\"}\r");
    events.extend(decoder.feed(b"\n\r\n"));

    assert_eq!(events, vec![StreamEvent::Finish]);
}

#[test]
fn comment_and_heartbeat_lines_are_dropped() {
    let payload = concat!(
        ": keep-alive\n\n",
        ": comment\ndata: {\"type\":\"finish\"}\n\n"
    );

    let events = SseDecoder::decode_all(payload);
    assert_eq!(events, vec![StreamEvent::Finish]);
}

#[test]
fn multi_line_data_payloads_are_joined_before_parsing() {
    let payload = concat!(
        "data: {\"type\":\"text-delta\",\n",
        "data: \"id\":\"b1\",\"delta\":\"multi\"}\n\n"
    );

    let events = SseDecoder::decode_all(payload);
    assert_eq!(
        events,
        vec![StreamEvent::TextDelta {
            id: "b1".to_string(),
            channel: TextChannel::Reply,
            delta: "multi".to_string(),
        }]
    );
}

#[test]
fn malformed_payload_is_skipped_without_aborting_the_stream() {
    let payload = concat!(
        "data: {broken-json\n\n",
        "data: {\"type\":\"text-delta\",\"delta\":\"missing id\"}\n\n",
        "data: {\"type\":\"finish\"}\n\n"
    );

    let events = SseDecoder::decode_all(payload);
    assert_eq!(events, vec![StreamEvent::Finish]);
}

#[test]
fn finish_flushes_buffered_partial_frame() {
    let mut decoder = SseDecoder::default();
    assert!(decoder
        .feed(b"data: {\"type\":\"tool-output-available\",\"toolCallId\":\"t1\",\"output\":\"ok\"}")
        .is_empty());

    let flushed = decoder.finish();
    assert_eq!(flushed.len(), 1);
    assert!(matches!(
        flushed[0],
        StreamEvent::ToolOutputAvailable { .. }
    ));
    assert!(decoder.is_done());
}

#[test]
fn finish_with_empty_buffer_emits_nothing() {
    let mut decoder = SseDecoder::default();
    assert!(decoder.feed(b"data: {\"type\":\"finish\"}\n\n").len() == 1);
    assert!(decoder.finish().is_empty());
}

#[test]
fn empty_data_frames_are_skipped() {
    let payload = concat!("data: \n\n", "data: {\"type\":\"finish\"}\n\n");

    let events = SseDecoder::decode_all(payload);
    assert_eq!(events, vec![StreamEvent::Finish]);
}
