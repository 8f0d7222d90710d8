//! End-to-end pipeline tests against the public engine API.

use std::sync::Arc;
use std::time::Duration;
use voxbridge::config::Config;
use voxbridge::engine::Engine;
use voxbridge::events::{CollectorSink, EventSink, RecordedEvent};
use voxbridge::provider::{MockProvider, ScriptedResult};
use voxbridge::types::{ChunkMeta, ConnectionId, TranscriptionResult};

/// Builds a chunk of 16kHz mono PCM carrying a pure tone.
fn tone_chunk(sequence: u64, freq: f32, ms: u64) -> ChunkMeta {
    let payload: Vec<u8> = (0..(16_000 * ms / 1000))
        .flat_map(|i| {
            let t = i as f32 / 16_000.0;
            let sample = ((2.0 * std::f32::consts::PI * freq * t).sin() * 12000.0) as i16;
            sample.to_le_bytes()
        })
        .collect();

    ChunkMeta {
        session_id: "sess-e2e".to_string(),
        sequence,
        payload,
        timestamp_ms: sequence * ms,
    }
}

fn engine_with(provider: MockProvider) -> (Arc<Engine>, Arc<CollectorSink>) {
    let sink = Arc::new(CollectorSink::new());
    let engine = Engine::new(
        Config::default(),
        Arc::new(provider),
        Arc::clone(&sink) as Arc<dyn EventSink>,
    );
    (engine, sink)
}

#[tokio::test(start_paused = true)]
async fn race_lock_and_utterance_commit() {
    let provider = MockProvider::new("mock").with_script(
        "es-ES",
        vec![
            ScriptedResult::new(1, TranscriptionResult::interim("hola", "es-ES", 0.8)),
            ScriptedResult::new(1, TranscriptionResult::final_result("hola amigo", "es-ES", 0.95)),
        ],
    );
    let (engine, sink) = engine_with(provider);
    let conn = ConnectionId::new("c1");

    engine.connect(conn.clone()).unwrap();
    engine.submit_chunk(&conn, tone_chunk(0, 200.0, 800)).unwrap();

    // Race settles on a poll tick.
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(sink.locked_language(&conn).as_deref(), Some("es-ES"));

    // Silence window elapses; the shared scanner commits the utterance.
    tokio::time::sleep(Duration::from_millis(4500)).await;

    let utterances = sink.utterances();
    assert_eq!(utterances.len(), 1);
    assert_eq!(utterances[0].text, "hola amigo");
    assert_eq!(utterances[0].language, "es-ES");
    assert_eq!(utterances[0].connection_id, conn);
    assert!(utterances[0].speaker_id.is_some(), "tone audio binds a speaker");

    engine.shutdown().await;
    let events = sink.events();
    assert!(events.iter().any(|e| matches!(
        e,
        RecordedEvent::ConnectionClosed { connection_id } if *connection_id == conn
    )));
}

#[tokio::test(start_paused = true)]
async fn returning_speaker_short_circuits_second_connection() {
    // Only es-ES ever produces results, and only after two chunks.
    let provider = MockProvider::new("mock").with_script(
        "es-ES",
        vec![
            ScriptedResult::new(2, TranscriptionResult::interim("buenos", "es-ES", 0.85)),
            ScriptedResult::new(
                2,
                TranscriptionResult::final_result("buenos dias", "es-ES", 0.95),
            ),
        ],
    );
    let (engine, sink) = engine_with(provider);

    // First connection: lock on confidence, commit, confirm the speaker.
    let first = ConnectionId::new("c1");
    engine.connect(first.clone()).unwrap();
    engine.submit_chunk(&first, tone_chunk(0, 200.0, 800)).unwrap();
    engine.submit_chunk(&first, tone_chunk(1, 200.0, 800)).unwrap();
    tokio::time::sleep(Duration::from_millis(5500)).await;

    let utterances = sink.utterances();
    assert_eq!(utterances.len(), 1);
    let speaker = utterances[0].speaker_id.clone().unwrap();
    assert_eq!(engine.roster().len(), 1);
    engine.disconnect(&first).await.unwrap();

    // Second connection, same voice, one chunk: the script never fires, so
    // the only way es-ES can lock this fast is the fast path recognizing the
    // confirmed profile and short-circuiting to its known language.
    let second = ConnectionId::new("c2");
    engine.connect(second.clone()).unwrap();
    engine.submit_chunk(&second, tone_chunk(0, 200.0, 800)).unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(sink.locked_language(&second).as_deref(), Some("es-ES"));
    assert!(sink.events().iter().any(|e| matches!(
        e,
        RecordedEvent::SpeakerBound { connection_id, speaker_id, .. }
            if *connection_id == second && *speaker_id == speaker
    )));
    assert_eq!(engine.roster().len(), 1, "no duplicate profile for the same voice");

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn provider_failure_degrades_without_poisoning_transcript() {
    // Streaming always fails: every lane degrades to a sentinel.
    let provider = MockProvider::new("mock").with_streaming_failure();
    let (engine, sink) = engine_with(provider);
    let conn = ConnectionId::new("c1");

    engine.connect(conn.clone()).unwrap();
    engine.submit_chunk(&conn, tone_chunk(0, 200.0, 100)).unwrap();

    // Sentinels score zero, so nothing locks on confidence; the hard
    // timeout falls back to the first candidate.
    tokio::time::sleep(Duration::from_millis(11_000)).await;
    assert_eq!(sink.locked_language(&conn).as_deref(), Some("en-US"));

    // No sentinel text ever reaches an utterance.
    tokio::time::sleep(Duration::from_millis(5000)).await;
    assert!(sink.utterances().is_empty());

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn interleaved_connections_stay_isolated() {
    let provider = MockProvider::new("mock").with_script(
        "en-US",
        vec![
            ScriptedResult::new(1, TranscriptionResult::interim("isolated", "en-US", 0.85)),
            ScriptedResult::new(
                1,
                TranscriptionResult::final_result("isolated words", "en-US", 0.95),
            ),
        ],
    );
    let (engine, sink) = engine_with(provider);
    let a = ConnectionId::new("a");
    let b = ConnectionId::new("b");

    engine.connect(a.clone()).unwrap();
    engine.connect(b.clone()).unwrap();

    // Only connection `a` receives audio.
    engine.submit_chunk(&a, tone_chunk(0, 150.0, 800)).unwrap();
    tokio::time::sleep(Duration::from_millis(5500)).await;

    let utterances = sink.utterances();
    assert_eq!(utterances.len(), 1);
    assert_eq!(utterances[0].connection_id, a);
    // `b` saw no audio: still racing, nothing committed.
    assert!(sink.locked_language(&b).is_none());

    engine.shutdown().await;
}
