//! Feeds a recorded ffmpeg stderr transcript through the progress parser the
//! way the runner does: small, arbitrary reads from an async pipe.

use kamyroll::downloader::engine::utils::{ProcessEvent, Progress, ProgressParser, answer};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};

const TRANSCRIPT: &str = "frame=    0 fps=0.0 q=0.0 size=       0kB time=N/A bitrate=N/A speed=N/A    \r\
frame=  240 fps= 60 q=-1.0 size=    2048kB time=00:00:10.00 bitrate=1677.7kbits/s speed=2.5x    \r\
Past duration 0.999992 too large\n\
frame=  720 fps= 60 q=-1.0 size=    6144kB time=00:00:30.00 bitrate=1677.7kbits/s speed=2.5x    \r\
File 'out.mkv' already exists. Overwrite? [y/N] ";

async fn collect(chunk_size: usize, max_duration: Duration) -> (Vec<ProcessEvent>, ProgressParser) {
    let (mut writer, mut reader) = duplex(chunk_size);
    let producer = tokio::spawn(async move {
        writer.write_all(TRANSCRIPT.as_bytes()).await.unwrap();
    });

    let mut parser = ProgressParser::new(max_duration);
    let mut events = Vec::new();
    let mut buf = vec![0u8; chunk_size];
    loop {
        let n = reader.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        events.extend(parser.feed(&buf[..n]));
    }
    events.extend(parser.flush());
    producer.await.unwrap();
    (events, parser)
}

fn progress(events: &[ProcessEvent]) -> Vec<Progress> {
    events
        .iter()
        .filter_map(|event| match event {
            ProcessEvent::Progress { progress, .. } => Some(*progress),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn chunking_does_not_change_the_events() {
    let (whole, _) = collect(TRANSCRIPT.len(), Duration::from_secs(120)).await;
    for chunk_size in [1, 3, 7, 64] {
        let (split, _) = collect(chunk_size, Duration::from_secs(120)).await;
        assert_eq!(split, whole, "chunk size {chunk_size}");
    }
}

#[tokio::test]
async fn transcript_yields_progress_messages_and_a_question() {
    let (events, mut parser) = collect(16, Duration::from_secs(120)).await;

    assert_eq!(
        progress(&events),
        vec![
            Progress {
                maximum: Some(120),
                value: 10
            },
            Progress {
                maximum: Some(120),
                value: 30
            },
        ]
    );
    assert!(events.contains(&ProcessEvent::Message(
        "Past duration 0.999992 too large".to_string()
    )));
    assert_eq!(
        events.last(),
        Some(&ProcessEvent::Question(
            "File 'out.mkv' already exists. Overwrite?".to_string()
        ))
    );
    assert_eq!(answer(false), b"n\n");

    assert_eq!(parser.finish(Some(0)), Ok(Progress::COMPLETE));
}

#[tokio::test]
async fn overrun_drops_back_to_indeterminate() {
    let (events, _) = collect(32, Duration::from_secs(20)).await;
    let updates = progress(&events);

    assert_eq!(updates[0].value, 10);
    assert!(updates[0].is_determinate());
    assert!(!updates[1].is_determinate());
}
